use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use bridge_core::{OutboxEntry, StorePort};

/// Filesystem side of the daemon: the append-only transcript, the outbox
/// queue, flag files, saved photos and permission decisions. Writes are
/// append or whole-file replace only.
#[derive(Clone)]
pub struct BridgeStore {
    transcript_path: PathBuf,
    outbox_path: PathBuf,
    diff_flag_path: PathBuf,
    restart_signal_path: PathBuf,
    photos_dir: PathBuf,
    approvals_dir: PathBuf,
}

impl BridgeStore {
    pub fn new(
        state_dir: &Path,
        transcript_path: PathBuf,
        outbox_path: PathBuf,
        diff_flag_path: PathBuf,
        restart_signal_path: PathBuf,
        photos_dir: PathBuf,
        approvals_dir: PathBuf,
    ) -> Result<Self> {
        fs::create_dir_all(state_dir).context("creating state dir")?;
        fs::create_dir_all(&photos_dir).context("creating photos dir")?;
        Ok(Self {
            transcript_path,
            outbox_path,
            diff_flag_path,
            restart_signal_path,
            photos_dir,
            approvals_dir,
        })
    }

    /// Read and clear the outbox in one step, returning the queued
    /// entries. The file is cleared before the entries are delivered so a
    /// concurrent append from the session lands in the next cycle.
    pub fn drain_outbox(&self) -> Result<Vec<OutboxEntry>> {
        let content = match fs::read_to_string(&self.outbox_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("reading outbox"),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        fs::write(&self.outbox_path, "").context("clearing outbox")?;
        Ok(content.lines().filter_map(OutboxEntry::parse).collect())
    }

    /// One-shot restart request: returns the signal file's content and
    /// removes it.
    pub fn take_restart_signal(&self) -> Option<String> {
        let content = fs::read_to_string(&self.restart_signal_path).ok()?;
        let _ = fs::remove_file(&self.restart_signal_path);
        Some(content.trim().to_string())
    }

    /// Transcript mtime and size, for the mtime-gated retry nudge.
    pub fn transcript_stat(&self) -> Option<(SystemTime, u64)> {
        let meta = fs::metadata(&self.transcript_path).ok()?;
        Some((meta.modified().ok()?, meta.len()))
    }
}

impl StorePort for BridgeStore {
    fn append_transcript(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.transcript_path)
            .context("opening transcript")?;
        writeln!(file, "{}", line).context("appending transcript line")?;
        Ok(())
    }

    fn save_photo(&self, bytes: &[u8], ext: &str) -> Result<PathBuf> {
        let path = self.photos_dir.join(format!(
            "photo_{}{}",
            chrono::Utc::now().timestamp_millis(),
            ext
        ));
        fs::write(&path, bytes).context("saving photo")?;
        Ok(path)
    }

    fn set_diff_mode(&self, enabled: bool) -> Result<()> {
        if enabled {
            fs::write(&self.diff_flag_path, "1").context("setting diff flag")?;
        } else {
            match fs::remove_file(&self.diff_flag_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).context("clearing diff flag"),
            }
        }
        Ok(())
    }

    fn record_permission(&self, request_id: &str, decision: &str) -> Result<()> {
        fs::create_dir_all(&self.approvals_dir).context("creating approvals dir")?;
        fs::write(self.approvals_dir.join(request_id), decision)
            .context("writing permission decision")?;
        Ok(())
    }
}
