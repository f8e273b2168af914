use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::process::Command;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use bridge_core::{MailboxPort, Router};

use crate::mailbox::MailboxClient;
use crate::session::TmuxSession;
use crate::store::BridgeStore;
use crate::telegram::TelegramFiles;
use crate::transcribe::WhisperTranscriber;

pub type BridgeRouter =
    Router<MailboxClient, TmuxSession, TelegramFiles, WhisperTranscriber, BridgeStore>;

/// The timer-driven poll loop. Each tick runs, in order: session liveness,
/// restart-signal check, mailbox poll + dispatch, outbox flush, retry
/// nudge. No tick-level failure is allowed to terminate the daemon.
pub struct BridgeDaemon {
    router: BridgeRouter,
    store: BridgeStore,
    mailbox: Arc<MailboxClient>,
    assistant_binary: String,
    poll_interval: Duration,
    last_transcript_mtime: Option<SystemTime>,
}

impl BridgeDaemon {
    pub fn new(
        router: BridgeRouter,
        store: BridgeStore,
        mailbox: Arc<MailboxClient>,
        assistant_binary: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            router,
            store,
            mailbox,
            assistant_binary,
            poll_interval,
            last_transcript_mtime: None,
        }
    }

    pub async fn run(mut self) {
        info!(interval_secs = self.poll_interval.as_secs(), "bridge daemon started");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = tokio::signal::ctrl_c() => {
                    info!("bridge daemon stopped");
                    break;
                }
            }
        }
    }

    async fn tick(&mut self) {
        if let Err(e) = self.router.lifecycle_mut().ensure_running().await {
            warn!("session liveness check failed: {e:#}");
        }
        self.check_restart_signal().await;
        self.router.poll_mailbox().await;
        self.flush_outbox().await;
        self.retry_nudge().await;
    }

    /// One-shot restart request left on disk by an external mechanism.
    /// Stray assistant processes outside tmux are killed as well.
    async fn check_restart_signal(&mut self) {
        if self.store.take_restart_signal().is_none() {
            return;
        }
        info!("restart signal detected");
        let _ = Command::new("pkill")
            .args(["-x", &self.assistant_binary])
            .output()
            .await;
        match self.router.lifecycle_mut().restart().await {
            Ok(()) => {
                let alias = self.router.lifecycle().active_alias().to_string();
                if let Err(e) = self
                    .mailbox
                    .send(&format!("✅ Session restarted (project: {})", alias))
                    .await
                {
                    debug!("restart report failed: {e:#}");
                }
            }
            Err(e) => warn!("restart from signal failed: {e:#}"),
        }
    }

    /// Deliver everything the session queued in the outbox file. The file
    /// was already cleared by the drain; a failed send drops the entry.
    async fn flush_outbox(&mut self) {
        let entries = match self.store.drain_outbox() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("outbox read failed: {e:#}");
                return;
            }
        };
        for entry in entries {
            match self.mailbox.send(&entry.text).await {
                Ok(()) => info!(text = %truncate(&entry.text, 80), "outbox entry sent"),
                Err(e) => warn!("outbox send failed, entry dropped: {e:#}"),
            }
        }
    }

    /// Nudge again only when the transcript grew since the last attempt;
    /// keeps an unread transcript from going stale without spamming the
    /// session.
    async fn retry_nudge(&mut self) {
        let Some((mtime, size)) = self.store.transcript_stat() else {
            return;
        };
        if size == 0 {
            return;
        }
        if let Some(last) = self.last_transcript_mtime {
            if mtime <= last {
                return;
            }
        }
        self.last_transcript_mtime = Some(mtime);
        self.router.nudge_wake().await;
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
