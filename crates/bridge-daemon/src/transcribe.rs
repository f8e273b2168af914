use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use bridge_core::TranscriberPort;

const WHISPER_TIMEOUT: Duration = Duration::from_secs(120);

/// Local transcription via the whisper CLI: write the audio to a temp
/// `.ogg`, run whisper, read the sibling `.txt` it produces, clean up.
pub struct WhisperTranscriber {
    whisper_cmd: String,
    model: String,
    language: String,
}

impl WhisperTranscriber {
    pub fn new(whisper_cmd: &str, model: &str, language: &str) -> Self {
        Self {
            whisper_cmd: whisper_cmd.to_string(),
            model: model.to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl TranscriberPort for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let output_dir = std::env::temp_dir();
        let audio_path = output_dir.join(format!(
            "voice_{}.ogg",
            chrono::Utc::now().timestamp_millis()
        ));
        tokio::fs::write(&audio_path, audio)
            .await
            .context("writing temp audio file")?;
        debug!(bytes = audio.len(), path = %audio_path.display(), "audio staged");

        let result = self.run_whisper(&audio_path, &output_dir).await;

        let text_path = audio_path.with_extension("txt");
        let transcript = match result {
            Ok(()) => tokio::fs::read_to_string(&text_path)
                .await
                .map(|t| t.trim().to_string())
                .context("reading whisper transcript"),
            Err(e) => Err(e),
        };

        // whisper leaves both files behind
        let _ = tokio::fs::remove_file(&audio_path).await;
        let _ = tokio::fs::remove_file(&text_path).await;

        let transcript = transcript?;
        if transcript.is_empty() {
            return Err(anyhow!("whisper produced an empty transcript"));
        }
        Ok(transcript)
    }
}

impl WhisperTranscriber {
    async fn run_whisper(&self, audio_path: &Path, output_dir: &Path) -> Result<()> {
        // ffmpeg lives under /opt/homebrew/bin on launchd-started daemons
        let current_path = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into());
        let child = Command::new(&self.whisper_cmd)
            .arg(audio_path)
            .args(["--language", &self.language])
            .args(["--model", &self.model])
            .args(["--output_format", "txt"])
            .arg("--output_dir")
            .arg(output_dir)
            .env("PATH", format!("/opt/homebrew/bin:{current_path}"))
            .output();

        let output = tokio::time::timeout(WHISPER_TIMEOUT, child)
            .await
            .map_err(|_| anyhow!("whisper timed out"))?
            .context("spawning whisper")?;

        if !output.status.success() {
            return Err(anyhow!(
                "whisper failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}
