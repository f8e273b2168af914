use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use bridge_core::{NudgeOutcome, ProjectEntry, SessionPort};

use crate::tmux::Tmux;

/// Idle-prompt marker scanned for in the pane tail. Only the last few
/// lines count; "thinking" output scrolled above must not cause false
/// positives.
const PROMPT_GLYPH: char = '❯';
const PROMPT_TAIL_LINES: usize = 5;

/// tmux session env does not reach /bin/sh, so PATH is exported inside
/// the shell command itself.
const SESSION_PATH: &str =
    "/opt/homebrew/bin:/opt/homebrew/sbin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

static TTY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\s+(s\d+)\s").unwrap());

/// Drives the assistant session hosted in a tmux window, with a GUI
/// terminal attach via OS scripting and a tty-keystroke fallback for
/// sessions running outside tmux.
pub struct TmuxSession {
    tmux: Tmux,
    assistant_cmd: String,
    assistant_args: String,
    terminal_app: String,
    boot_script: Option<PathBuf>,
}

impl TmuxSession {
    pub fn new(
        tmux: Tmux,
        assistant_cmd: &str,
        assistant_args: &str,
        terminal_app: &str,
        boot_script: Option<PathBuf>,
    ) -> Self {
        Self {
            tmux,
            assistant_cmd: assistant_cmd.to_string(),
            assistant_args: assistant_args.to_string(),
            terminal_app: terminal_app.to_string(),
            boot_script,
        }
    }

    fn assistant_binary(&self) -> &str {
        self.assistant_cmd
            .rsplit('/')
            .next()
            .unwrap_or(&self.assistant_cmd)
    }

    /// Regenerate the session bootstrap context for the project.
    /// Best-effort: a broken script must not block the launch.
    async fn regenerate_boot_context(&self, project: &ProjectEntry) {
        let Some(script) = &self.boot_script else { return };
        match Command::new(script).arg(&project.alias).output().await {
            Ok(output) if output.status.success() => {
                info!(project = %project.alias, "boot context regenerated")
            }
            Ok(output) => warn!(
                project = %project.alias,
                "boot context script failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => warn!(project = %project.alias, "boot context script failed: {e}"),
        }
    }

    /// Assistant process sitting on a real tty outside tmux, if any.
    async fn find_assistant_tty(&self) -> Option<String> {
        let output = Command::new("ps")
            .args(["-eo", "pid,tty,comm"])
            .output()
            .await
            .ok()?;
        let binary = self.assistant_binary();
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| {
                line.contains(binary) && !line.contains("tmux") && !line.contains("bridge")
            })
            .find_map(|line| TTY_RE.captures(line).map(|c| c[1].to_string()))
    }

    async fn osascript(&self, script: &str) -> Result<()> {
        let output = Command::new("osascript")
            .args(["-e", script])
            .output()
            .await
            .context("running osascript")?;
        if !output.status.success() {
            anyhow::bail!(
                "osascript failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl SessionPort for TmuxSession {
    async fn is_running(&self) -> bool {
        self.tmux.has_session().await
    }

    async fn has_attached_client(&self) -> bool {
        self.tmux.has_attached_client().await
    }

    /// Kill the process tree inside the session's pane, then the session.
    /// Assistant instances in regular terminals are left intact.
    async fn teardown(&self) -> Result<()> {
        if let Some(pid) = self.tmux.pane_pid().await {
            let _ = Command::new("pkill")
                .args(["-P", &pid.to_string()])
                .output()
                .await;
        }
        self.tmux.kill_session().await?;
        debug!("tmux session torn down");
        Ok(())
    }

    async fn launch(&self, project: &ProjectEntry) -> Result<()> {
        self.regenerate_boot_context(project).await;

        // Auto-restart loop: if the assistant exits, wait 5s and relaunch.
        // No `read` in the loop so it works headless.
        let shell_command = format!(
            "export PATH={path}; cd {dir} && while true; do {cmd} {args}; \
             echo 'assistant exited, restarting in 5s...'; sleep 5; done",
            path = SESSION_PATH,
            dir = project.dir.display(),
            cmd = self.assistant_cmd,
            args = self.assistant_args,
        );
        self.tmux
            .new_session(&shell_command)
            .await
            .with_context(|| format!("launching session for {}", project.alias))?;
        info!(
            project = %project.alias,
            session = self.tmux.session(),
            "assistant session created"
        );
        Ok(())
    }

    /// Open a new tab in the GUI terminal; the shell profile there
    /// auto-attaches to the tmux session.
    async fn attach_terminal(&self) -> Result<()> {
        Command::new("open")
            .args(["-a", &self.terminal_app])
            .output()
            .await
            .context("activating terminal app")?;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        self.osascript(&format!(
            "tell application \"System Events\" to tell process \"{}\" \
             to keystroke \"t\" using command down",
            self.terminal_app
        ))
        .await?;
        info!(app = %self.terminal_app, "terminal tab opened");
        Ok(())
    }

    async fn try_nudge(&self, phrase: &str) -> Result<NudgeOutcome> {
        if self.tmux.has_session().await {
            let pane = self.tmux.capture_pane().await?;
            let tail: Vec<&str> = pane.trim_end().lines().rev().take(PROMPT_TAIL_LINES).collect();
            if tail.iter().any(|line| line.contains(PROMPT_GLYPH)) {
                self.tmux.send_line(phrase).await?;
                debug!(phrase, "nudge delivered to tmux session");
                return Ok(NudgeOutcome::Sent);
            }
            // Session alive but mid-work: never fall through to the tty
            // channel, it could hit an unrelated window.
            debug!("nudge skipped, no prompt in pane tail");
            return Ok(NudgeOutcome::Busy);
        }

        if let Some(tty) = self.find_assistant_tty().await {
            self.osascript(&format!(
                "tell application \"{app}\" to activate\n\
                 delay 0.5\n\
                 tell application \"System Events\"\n\
                 keystroke \"{phrase}\"\n\
                 delay 0.1\n\
                 key code 36\n\
                 end tell",
                app = self.terminal_app,
                phrase = phrase,
            ))
            .await?;
            debug!(%tty, phrase, "nudge delivered to terminal tty");
            return Ok(NudgeOutcome::Sent);
        }

        Ok(NudgeOutcome::NoTarget)
    }
}
