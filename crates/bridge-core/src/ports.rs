use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

use crate::message::InboundMessage;
use crate::registry::ProjectEntry;

/// Outcome of a best-effort nudge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeOutcome {
    /// The wake phrase was delivered.
    Sent,
    /// A session exists but did not look idle; nothing was sent.
    Busy,
    /// No session or terminal to deliver to.
    NoTarget,
    /// Suppressed by the rate limit or a startup in progress.
    Suppressed,
}

/// The remote mailbox: ordered unread messages in, acknowledgments and
/// outbound text back.
#[async_trait]
pub trait MailboxPort: Send + Sync {
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>>;
    async fn ack_read(&self) -> Result<()>;
    async fn send(&self, text: &str) -> Result<()>;
}

/// Raw attachment bytes fetched for an opaque file reference.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    /// Remote path the reference resolved to; used for its extension.
    pub remote_path: String,
}

#[async_trait]
pub trait AttachmentPort: Send + Sync {
    async fn fetch(&self, file_id: &str) -> Result<Attachment>;
}

#[async_trait]
pub trait TranscriberPort: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Control over the external assistant session (tmux + GUI terminal in the
/// real daemon). The lifecycle manager drives this; router logic stays
/// testable with a fake implementation.
#[async_trait]
pub trait SessionPort: Send + Sync {
    async fn is_running(&self) -> bool;
    async fn has_attached_client(&self) -> bool;
    /// Kill the session and any stray process tree it owns. Idempotent.
    async fn teardown(&self) -> Result<()>;
    /// Launch the session for a project, wrapped in its auto-restart loop.
    async fn launch(&self, project: &ProjectEntry) -> Result<()>;
    /// Make a visible terminal attach to the session.
    async fn attach_terminal(&self) -> Result<()>;
    /// Deliver the wake phrase if the session looks idle.
    async fn try_nudge(&self, phrase: &str) -> Result<NudgeOutcome>;
}

/// Durable local side effects: the transcript, saved photos, flag files
/// and permission decisions. All writes are append or whole-file replace.
pub trait StorePort: Send + Sync {
    fn append_transcript(&self, line: &str) -> Result<()>;
    fn save_photo(&self, bytes: &[u8], ext: &str) -> Result<PathBuf>;
    fn set_diff_mode(&self, enabled: bool) -> Result<()>;
    fn record_permission(&self, request_id: &str, decision: &str) -> Result<()>;
}
