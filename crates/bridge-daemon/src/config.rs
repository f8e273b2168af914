use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Daemon configuration, read from the environment with a `.env` fallback.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the mailbox API, e.g. `https://karmarent.app/api/admin`.
    pub api_base: String,
    /// Static bearer token for the mailbox API.
    pub api_token: String,
    /// Bot token for the attachment fetch API. Optional: without it voice
    /// and photo messages degrade to failure markers.
    pub bot_token: Option<String>,

    pub assistant_cmd: String,
    pub assistant_args: String,
    pub whisper_cmd: String,
    pub whisper_model: String,
    pub whisper_language: String,
    pub tmux_bin: String,
    pub tmux_session: String,
    pub terminal_app: String,
    /// Bootstrap-context script run before each session launch, if set.
    pub boot_script: Option<PathBuf>,

    pub poll_interval: Duration,
    /// Directory holding the transcript, outbox, flag files and photos.
    pub state_dir: PathBuf,
    /// Where permission decisions are written for the approval mechanism.
    pub approvals_dir: PathBuf,
    /// Directory scanned for auto-discovered projects.
    pub projects_scan_dir: PathBuf,

    /// Label prefixed to transcript lines, e.g. the owner's name.
    pub sender_label: String,
    /// Phrase typed into an idle session to make it check for input.
    pub wake_phrase: String,
    pub home: PathBuf,
}

impl BridgeConfig {
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;

        let api_base = env_or("BRIDGE_API_BASE", "https://karmarent.app/api/admin");
        let api_token = std::env::var("BRIDGE_API_TOKEN")
            .map_err(|_| anyhow!("BRIDGE_API_TOKEN not set. Put it in the environment or .env"))?;
        let bot_token = std::env::var("BRIDGE_BOT_TOKEN").ok().filter(|t| !t.is_empty());

        let poll_secs: u64 = env_or("BRIDGE_POLL_SECS", "3")
            .parse()
            .map_err(|_| anyhow!("BRIDGE_POLL_SECS must be an integer"))?;

        let state_dir = std::env::var("BRIDGE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".bridge"));

        Ok(Self {
            api_base,
            api_token,
            bot_token,
            assistant_cmd: env_or("BRIDGE_ASSISTANT_CMD", "claude"),
            assistant_args: env_or("BRIDGE_ASSISTANT_ARGS", "--dangerously-skip-permissions"),
            whisper_cmd: env_or("BRIDGE_WHISPER_CMD", "whisper"),
            whisper_model: env_or("BRIDGE_WHISPER_MODEL", "tiny"),
            whisper_language: env_or("BRIDGE_WHISPER_LANG", "ru"),
            tmux_bin: env_or("BRIDGE_TMUX_BIN", "tmux"),
            tmux_session: env_or("BRIDGE_TMUX_SESSION", "claude"),
            terminal_app: env_or("BRIDGE_TERMINAL_APP", "Warp"),
            boot_script: std::env::var("BRIDGE_BOOT_SCRIPT").ok().map(PathBuf::from),
            poll_interval: Duration::from_secs(poll_secs),
            approvals_dir: std::env::var("BRIDGE_APPROVALS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/claude-permissions")),
            projects_scan_dir: std::env::var("BRIDGE_PROJECTS_SCAN_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".claude").join("projects")),
            sender_label: env_or("BRIDGE_SENDER_LABEL", "OWNER"),
            wake_phrase: env_or("BRIDGE_WAKE_PHRASE", "check telegram"),
            state_dir,
            home,
        })
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.state_dir.join("inbox")
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.state_dir.join("outbox")
    }

    pub fn diff_flag_path(&self) -> PathBuf {
        self.state_dir.join("diffs-enabled")
    }

    pub fn restart_signal_path(&self) -> PathBuf {
        self.state_dir.join("restart")
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.state_dir.join("photos")
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load variables from a `.env` file next to the working directory or its
/// parents (best-effort). Existing environment variables win.
pub fn load_dotenv() {
    for path in [".env", "../.env", "../../.env"] {
        if let Ok(content) = std::fs::read_to_string(path) {
            parse_env_file(&content);
        }
    }
}

fn parse_env_file(content: &str) {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = parse_key_value(trimmed) {
            if std::env::var(&key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}

fn parse_key_value(line: &str) -> Option<(String, String)> {
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim().trim_matches('"').trim_matches('\'');
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_parsing_strips_quotes() {
        assert_eq!(
            parse_key_value(r#"BRIDGE_API_TOKEN="secret""#),
            Some(("BRIDGE_API_TOKEN".into(), "secret".into()))
        );
        assert_eq!(
            parse_key_value("BRIDGE_WAKE_PHRASE='check telegram'"),
            Some(("BRIDGE_WAKE_PHRASE".into(), "check telegram".into()))
        );
        assert_eq!(parse_key_value("=value"), None);
        assert_eq!(parse_key_value("NOEQUALS"), None);
    }
}
