use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::ports::{MailboxPort, NudgeOutcome, SessionPort};
use crate::registry::ProjectRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Restarting,
}

/// Delays and rate limits for the lifecycle manager. Tests shrink these to
/// zero; the defaults match the daemon's observed-good values.
#[derive(Debug, Clone)]
pub struct LifecycleTiming {
    /// Wait after a teardown for processes to die.
    pub kill_wait: Duration,
    /// Wait between teardown and relaunch during a project switch.
    pub switch_wait: Duration,
    /// How long a freshly launched session settles before nudges resume.
    pub settle: Duration,
    /// Minimum gap between externally visible nudges.
    pub nudge_interval: Duration,
    /// Suppression window for duplicate terminal tabs.
    pub terminal_cooldown: Duration,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            kill_wait: Duration::from_secs(2),
            switch_wait: Duration::from_secs(3),
            settle: Duration::from_secs(12),
            nudge_interval: Duration::from_secs(10),
            terminal_cooldown: Duration::from_secs(30),
        }
    }
}

impl LifecycleTiming {
    /// All waits collapsed to zero; rate limits keep their defaults.
    pub fn immediate() -> Self {
        Self {
            kill_wait: Duration::ZERO,
            switch_wait: Duration::ZERO,
            settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Keeps exactly one assistant session alive for the active project.
/// Switching always tears the old session down before the new one starts.
pub struct SessionLifecycle<S, M> {
    session: S,
    mailbox: Arc<M>,
    registry: Arc<ProjectRegistry>,
    state: LifecycleState,
    active: String,
    ready_at: Option<Instant>,
    last_nudge: Option<Instant>,
    last_terminal_attach: Option<Instant>,
    timing: LifecycleTiming,
}

impl<S: SessionPort, M: MailboxPort> SessionLifecycle<S, M> {
    pub fn new(
        session: S,
        mailbox: Arc<M>,
        registry: Arc<ProjectRegistry>,
        initial_alias: &str,
        timing: LifecycleTiming,
    ) -> Self {
        Self {
            session,
            mailbox,
            registry,
            state: LifecycleState::Stopped,
            active: initial_alias.to_string(),
            ready_at: None,
            last_nudge: None,
            last_terminal_attach: None,
            timing,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn active_alias(&self) -> &str {
        &self.active
    }

    fn is_starting(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Starting | LifecycleState::Restarting
        )
    }

    /// Starting -> Running once the settle window has passed.
    fn refresh(&mut self) {
        if self.state == LifecycleState::Starting {
            if let Some(ready_at) = self.ready_at {
                if Instant::now() >= ready_at {
                    self.state = LifecycleState::Running;
                    self.ready_at = None;
                    debug!(project = %self.active, "session settled");
                }
            }
        }
    }

    /// Idempotent liveness check: no-op while running or mid-start,
    /// otherwise launches the active project. Also re-attaches a terminal
    /// when the session is alive but nobody is watching it.
    pub async fn ensure_running(&mut self) -> Result<bool> {
        self.refresh();
        if self.session.is_running().await {
            if self.state == LifecycleState::Stopped {
                // Adopt a session that outlived a previous daemon run
                self.state = LifecycleState::Running;
            }
            if !self.is_starting() && !self.session.has_attached_client().await {
                self.attach_terminal_with_cooldown().await;
            }
            return Ok(true);
        }
        if self.is_starting() {
            return Ok(false);
        }
        self.state = LifecycleState::Stopped;
        self.start_active(true).await?;
        Ok(false)
    }

    /// Tear down and relaunch the active project.
    pub async fn restart(&mut self) -> Result<()> {
        self.state = LifecycleState::Restarting;
        if let Err(e) = self.session.teardown().await {
            warn!("teardown during restart failed: {e:#}");
        }
        sleep(self.timing.kill_wait).await;
        self.start_active(false).await
    }

    /// Resolve `name` and switch to it, reporting progress to the mailbox.
    /// Unknown names and the already-active project change nothing.
    pub async fn switch_project(&mut self, name: &str) -> Result<()> {
        let Some(project) = self.registry.resolve(name) else {
            let listing = self.registry.format_listing(&self.active);
            self.mailbox
                .send(&format!(
                    "❌ Unknown project: {}\n\n<pre>Available:\n{}</pre>",
                    name.trim(),
                    listing
                ))
                .await?;
            return Ok(());
        };
        let (alias, display, dir) = (
            project.alias.clone(),
            project.display_name.clone(),
            project.dir.clone(),
        );
        if alias == self.active {
            self.mailbox
                .send(&format!("ℹ️ Already on {} ({})", alias, display))
                .await?;
            return Ok(());
        }

        let previous = std::mem::replace(&mut self.active, alias.clone());
        info!(from = %previous, to = %alias, "switching project");
        self.mailbox
            .send(&format!(
                "🔄 Switching: {} → {} ({})...",
                previous, alias, display
            ))
            .await
            .ok();

        // Alias and state flip before the teardown so a liveness check
        // landing mid-switch cannot relaunch the previous project.
        self.state = LifecycleState::Restarting;
        if let Err(e) = self.session.teardown().await {
            warn!("teardown during switch failed: {e:#}");
        }
        sleep(self.timing.switch_wait).await;
        self.start_active(false).await?;

        self.mailbox
            .send(&format!(
                "✅ Switched to {} ({})\nSession starting in {}",
                alias,
                display,
                dir.display()
            ))
            .await
            .ok();
        Ok(())
    }

    /// Best-effort wake-up: skipped during startup, rate-limited, and
    /// delegated to the session port's idle heuristic. Never a guarantee.
    pub async fn nudge(&mut self, phrase: &str) -> NudgeOutcome {
        self.refresh();
        if self.is_starting() {
            return NudgeOutcome::Suppressed;
        }
        let now = Instant::now();
        if let Some(last) = self.last_nudge {
            if now.duration_since(last) < self.timing.nudge_interval {
                return NudgeOutcome::Suppressed;
            }
        }
        self.last_nudge = Some(now);
        match self.session.try_nudge(phrase).await {
            Ok(outcome) => {
                debug!(?outcome, "nudge attempt");
                outcome
            }
            Err(e) => {
                debug!("nudge failed: {e:#}");
                NudgeOutcome::NoTarget
            }
        }
    }

    async fn start_active(&mut self, clean_first: bool) -> Result<()> {
        let project = self
            .registry
            .get(&self.active)
            .cloned()
            .ok_or_else(|| anyhow!("active project {:?} is not registered", self.active))?;
        info!(project = %project.alias, dir = %project.dir.display(), "starting session");
        self.state = LifecycleState::Starting;
        if clean_first {
            if let Err(e) = self.session.teardown().await {
                warn!("teardown before start failed: {e:#}");
            }
            sleep(self.timing.kill_wait).await;
        }
        if let Err(e) = self.session.launch(&project).await {
            self.state = LifecycleState::Stopped;
            return Err(e);
        }
        self.attach_terminal_with_cooldown().await;
        self.ready_at = Some(Instant::now() + self.timing.settle);
        Ok(())
    }

    async fn attach_terminal_with_cooldown(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_terminal_attach {
            if now.duration_since(last) < self.timing.terminal_cooldown {
                return;
            }
        }
        self.last_terminal_attach = Some(now);
        if let Err(e) = self.session.attach_terminal().await {
            warn!("terminal attach failed: {e:#}");
        }
    }
}
