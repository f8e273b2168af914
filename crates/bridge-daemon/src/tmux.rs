use std::process::Output;

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux command failed: {0}")]
    CommandFailed(String),
    #[error("tmux not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async tmux executor bound to one session name. Each call spawns a new
/// `tmux` process; there is no persistent child handle.
pub struct Tmux {
    bin: String,
    session: String,
}

impl Tmux {
    pub fn new(bin: &str, session: &str) -> Self {
        Self {
            bin: bin.to_string(),
            session: session.to_string(),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub async fn has_session(&self) -> bool {
        matches!(
            self.run_unchecked(&["has-session", "-t", &self.session]).await,
            Ok(output) if output.status.success()
        )
    }

    pub async fn has_attached_client(&self) -> bool {
        match self.run(&["list-clients", "-t", &self.session]).await {
            Ok(stdout) => !stdout.trim().is_empty(),
            Err(_) => false,
        }
    }

    /// PID of the shell running in the session's pane, if any.
    pub async fn pane_pid(&self) -> Option<u32> {
        let stdout = self
            .run(&["list-panes", "-t", &self.session, "-F", "#{pane_pid}"])
            .await
            .ok()?;
        stdout.lines().next()?.trim().parse().ok()
    }

    pub async fn kill_session(&self) -> Result<(), TmuxError> {
        // Missing session is fine; that is the state we want
        self.run_unchecked(&["kill-session", "-t", &self.session])
            .await?;
        Ok(())
    }

    pub async fn new_session(&self, shell_command: &str) -> Result<(), TmuxError> {
        self.run(&["new-session", "-d", "-s", &self.session, shell_command])
            .await?;
        Ok(())
    }

    pub async fn capture_pane(&self) -> Result<String, TmuxError> {
        self.run(&["capture-pane", "-t", &self.session, "-p"]).await
    }

    pub async fn send_line(&self, text: &str) -> Result<(), TmuxError> {
        self.run(&["send-keys", "-t", &self.session, text]).await?;
        self.run(&["send-keys", "-t", &self.session, "C-m"]).await?;
        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        let output = self.run_unchecked(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TmuxError::CommandFailed(format!(
                "exit {}: {}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".into()),
                stderr.trim(),
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_unchecked(&self, args: &[&str]) -> Result<Output, TmuxError> {
        Command::new(&self.bin).args(args).output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TmuxError::NotFound
            } else {
                TmuxError::Io(e)
            }
        })
    }
}
