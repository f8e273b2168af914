use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::dedup::DedupCache;
use crate::lifecycle::SessionLifecycle;
use crate::message::InboundMessage;
use crate::ports::{AttachmentPort, MailboxPort, NudgeOutcome, SessionPort, StorePort, TranscriberPort};
use crate::registry::ProjectRegistry;

/// Classifies and dispatches inbound mailbox messages. Owns all mutable
/// daemon state (active project via the lifecycle, dedup cache); driven
/// exclusively by the single poll loop.
pub struct Router<M, S, A, T, St> {
    mailbox: Arc<M>,
    attachments: A,
    transcriber: T,
    store: St,
    registry: Arc<ProjectRegistry>,
    lifecycle: SessionLifecycle<S, M>,
    dedup: DedupCache,
    sender_label: String,
    wake_phrase: String,
}

impl<M, S, A, T, St> Router<M, S, A, T, St>
where
    M: MailboxPort,
    S: SessionPort,
    A: AttachmentPort,
    T: TranscriberPort,
    St: StorePort,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mailbox: Arc<M>,
        attachments: A,
        transcriber: T,
        store: St,
        registry: Arc<ProjectRegistry>,
        lifecycle: SessionLifecycle<S, M>,
        sender_label: &str,
        wake_phrase: &str,
    ) -> Self {
        Self {
            mailbox,
            attachments,
            transcriber,
            store,
            registry,
            lifecycle,
            dedup: DedupCache::default(),
            sender_label: sender_label.to_string(),
            wake_phrase: wake_phrase.to_string(),
        }
    }

    pub fn lifecycle(&self) -> &SessionLifecycle<S, M> {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut SessionLifecycle<S, M> {
        &mut self.lifecycle
    }

    /// One mailbox poll: fetch, route, ack. Network failures are swallowed
    /// and retried on the next tick. The ack only goes out after the whole
    /// batch was durably handled; if routing aborts, the unacked messages
    /// redeliver and the dedup cache absorbs the already-handled ones.
    pub async fn poll_mailbox(&mut self) {
        let messages = match self.mailbox.fetch_unread().await {
            Ok(messages) => messages,
            Err(e) => {
                debug!("mailbox poll failed (will retry): {e:#}");
                return;
            }
        };
        if messages.is_empty() {
            return;
        }
        if let Err(e) = self.route_batch(&messages).await {
            warn!("batch aborted before ack: {e:#}");
            return;
        }
        if let Err(e) = self.mailbox.ack_read().await {
            debug!("ack failed, duplicates will be dropped: {e:#}");
        }
    }

    /// Route a batch in arrival order, dropping duplicates first.
    pub async fn route_batch(&mut self, messages: &[InboundMessage]) -> Result<()> {
        for msg in messages {
            if self.dedup.check_and_insert(&msg.text, &msg.timestamp) {
                debug!(text = %msg.text, "skipping duplicate");
                continue;
            }
            info!(text = %msg.text, ts = %msg.timestamp, "inbound message");
            self.dispatch(msg).await?;
        }
        Ok(())
    }

    /// Best-effort wake-up with the configured phrase; used by the poll
    /// loop's retry pass as well as after transcript writes.
    pub async fn nudge_wake(&mut self) -> NudgeOutcome {
        self.lifecycle.nudge(&self.wake_phrase).await
    }

    async fn dispatch(&mut self, msg: &InboundMessage) -> Result<()> {
        match Command::classify(&msg.text, &self.registry) {
            Command::Permission {
                decision,
                request_id,
            } => {
                // Daemon-level: recorded for the external approval
                // mechanism, never forwarded to the transcript.
                match self.store.record_permission(&request_id, decision.as_str()) {
                    Ok(()) => {
                        info!(id = %request_id, decision = decision.as_str(), "permission recorded")
                    }
                    Err(e) => warn!(id = %request_id, "permission write failed: {e:#}"),
                }
                Ok(())
            }
            Command::Restart => self.handle_restart().await,
            Command::SwitchProject { name } => self.lifecycle.switch_project(&name).await,
            Command::ListProjects => {
                let listing = self.registry.format_listing(self.lifecycle.active_alias());
                self.mailbox
                    .send(&format!(
                        "<pre>Projects:\n{}\n\nSwitch: переключи на name</pre>",
                        listing
                    ))
                    .await
            }
            Command::DiffMode { enabled } => {
                self.store.set_diff_mode(enabled)?;
                info!(enabled, "diff mode toggled");
                self.mailbox
                    .send(if enabled {
                        "✅ Diff mode ON — git changes will be reported"
                    } else {
                        "❌ Diff mode OFF"
                    })
                    .await
            }
            Command::Voice { file_id } => self.handle_voice(msg, &file_id).await,
            Command::Photo { file_id, caption } => {
                self.handle_photo(msg, &file_id, caption.as_deref()).await
            }
            Command::Text => {
                self.store
                    .append_transcript(&self.transcript_line(&msg.timestamp, &msg.text))?;
                self.lifecycle.nudge(&self.wake_phrase).await;
                Ok(())
            }
        }
    }

    async fn handle_restart(&mut self) -> Result<()> {
        info!("session restart requested");
        match self.lifecycle.restart().await {
            Ok(()) => {
                self.mailbox
                    .send(&format!(
                        "✅ Session restarted (project: {})",
                        self.lifecycle.active_alias()
                    ))
                    .await
            }
            Err(e) => {
                warn!("restart failed: {e:#}");
                self.mailbox
                    .send(&format!("❌ Restart failed: {e:#}"))
                    .await
            }
        }
    }

    /// Fetch + transcribe a voice attachment. Any failure degrades to an
    /// explicit failure marker in the transcript; the message is never
    /// silently dropped.
    async fn handle_voice(&mut self, msg: &InboundMessage, file_id: &str) -> Result<()> {
        info!(file_id, "voice message");
        let transcript = match self.attachments.fetch(file_id).await {
            Ok(attachment) => match self.transcriber.transcribe(&attachment.bytes).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(file_id, "transcription failed: {e:#}");
                    None
                }
            },
            Err(e) => {
                warn!(file_id, "voice download failed: {e:#}");
                None
            }
        };
        match transcript {
            Some(text) => {
                self.store.append_transcript(
                    &self.transcript_line(&msg.timestamp, &format!("🎤 {}", text)),
                )?;
                self.mailbox
                    .send(&format!("📝 <b>Transcript:</b>\n\n{}", text))
                    .await?;
            }
            None => {
                self.store.append_transcript(
                    &self.transcript_line(&msg.timestamp, "[voice transcription failed]"),
                )?;
                self.mailbox
                    .send("❌ Could not transcribe the voice message")
                    .await?;
            }
        }
        self.lifecycle.nudge(&self.wake_phrase).await;
        Ok(())
    }

    /// Fetch + persist a photo attachment, then reference it from the
    /// transcript so the session can open the local file.
    async fn handle_photo(
        &mut self,
        msg: &InboundMessage,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        info!(file_id, caption = caption.unwrap_or(""), "photo message");
        match self.attachments.fetch(file_id).await {
            Ok(attachment) => {
                let ext = remote_extension(&attachment.remote_path);
                let path = self.store.save_photo(&attachment.bytes, &ext)?;
                let caption_part = caption
                    .map(|c| format!(" (caption: {})", c))
                    .unwrap_or_default();
                self.store.append_transcript(&self.transcript_line(
                    &msg.timestamp,
                    &format!("📷 Photo{}: {}", caption_part, path.display()),
                ))?;
            }
            Err(e) => {
                warn!(file_id, "photo download failed: {e:#}");
                self.store.append_transcript(
                    &self.transcript_line(&msg.timestamp, "[photo download failed]"),
                )?;
            }
        }
        self.lifecycle.nudge(&self.wake_phrase).await;
        Ok(())
    }

    fn transcript_line(&self, timestamp: &str, body: &str) -> String {
        format!("{} [{}]: {}", self.sender_label, timestamp, body)
    }
}

/// Extension of the remote file path, dot included; `.jpg` when absent.
fn remote_extension(remote_path: &str) -> String {
    Path::new(remote_path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".jpg".to_string())
}
