pub mod command;
pub mod dedup;
pub mod lifecycle;
pub mod message;
pub mod ports;
pub mod registry;
pub mod router;

pub use command::{Command, PermissionDecision};
pub use dedup::DedupCache;
pub use lifecycle::{LifecycleState, LifecycleTiming, SessionLifecycle};
pub use message::{InboundMessage, OutboxEntry};
pub use ports::{
    Attachment, AttachmentPort, MailboxPort, NudgeOutcome, SessionPort, StorePort, TranscriberPort,
};
pub use registry::{ProjectEntry, ProjectRegistry};
pub use router::Router;
