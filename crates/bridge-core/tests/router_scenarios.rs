use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use bridge_core::{
    Attachment, AttachmentPort, InboundMessage, LifecycleTiming, MailboxPort, NudgeOutcome,
    ProjectEntry, ProjectRegistry, Router, SessionLifecycle, SessionPort, StorePort,
    TranscriberPort,
};

#[derive(Default)]
struct FakeMailbox {
    inbound: Mutex<Vec<InboundMessage>>,
    sent: Mutex<Vec<String>>,
    acks: AtomicUsize,
}

impl FakeMailbox {
    fn queue(&self, text: &str, ts: &str) {
        self.inbound
            .lock()
            .unwrap()
            .push(InboundMessage::new(text, ts));
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxPort for FakeMailbox {
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>> {
        Ok(std::mem::take(&mut *self.inbound.lock().unwrap()))
    }

    async fn ack_read(&self) -> Result<()> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct SessionInner {
    running: Mutex<bool>,
    idle: Mutex<bool>,
    attached: Mutex<bool>,
    teardowns: AtomicUsize,
    launches: Mutex<Vec<String>>,
    delivered_nudges: Mutex<Vec<String>>,
    attaches: AtomicUsize,
}

#[derive(Clone)]
struct FakeSession(Arc<SessionInner>);

impl FakeSession {
    fn new() -> Self {
        Self(Arc::new(SessionInner {
            running: Mutex::new(false),
            idle: Mutex::new(true),
            attached: Mutex::new(true),
            teardowns: AtomicUsize::new(0),
            launches: Mutex::new(Vec::new()),
            delivered_nudges: Mutex::new(Vec::new()),
            attaches: AtomicUsize::new(0),
        }))
    }

    fn set_running(&self, running: bool) {
        *self.0.running.lock().unwrap() = running;
    }

    fn teardowns(&self) -> usize {
        self.0.teardowns.load(Ordering::SeqCst)
    }

    fn launches(&self) -> Vec<String> {
        self.0.launches.lock().unwrap().clone()
    }

    fn delivered_nudges(&self) -> usize {
        self.0.delivered_nudges.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionPort for FakeSession {
    async fn is_running(&self) -> bool {
        *self.0.running.lock().unwrap()
    }

    async fn has_attached_client(&self) -> bool {
        *self.0.attached.lock().unwrap()
    }

    async fn teardown(&self) -> Result<()> {
        self.0.teardowns.fetch_add(1, Ordering::SeqCst);
        *self.0.running.lock().unwrap() = false;
        Ok(())
    }

    async fn launch(&self, project: &ProjectEntry) -> Result<()> {
        self.0.launches.lock().unwrap().push(project.alias.clone());
        *self.0.running.lock().unwrap() = true;
        Ok(())
    }

    async fn attach_terminal(&self) -> Result<()> {
        self.0.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn try_nudge(&self, phrase: &str) -> Result<NudgeOutcome> {
        if !*self.0.running.lock().unwrap() {
            return Ok(NudgeOutcome::NoTarget);
        }
        if !*self.0.idle.lock().unwrap() {
            return Ok(NudgeOutcome::Busy);
        }
        self.0
            .delivered_nudges
            .lock()
            .unwrap()
            .push(phrase.to_string());
        Ok(NudgeOutcome::Sent)
    }
}

struct StoreInner {
    transcript: Mutex<Vec<String>>,
    photos: Mutex<Vec<(usize, String)>>,
    diff_flag: Mutex<bool>,
    permissions: Mutex<Vec<(String, String)>>,
    fail_appends: Mutex<bool>,
}

#[derive(Clone)]
struct FakeStore(Arc<StoreInner>);

impl FakeStore {
    fn new() -> Self {
        Self(Arc::new(StoreInner {
            transcript: Mutex::new(Vec::new()),
            photos: Mutex::new(Vec::new()),
            diff_flag: Mutex::new(false),
            permissions: Mutex::new(Vec::new()),
            fail_appends: Mutex::new(false),
        }))
    }

    fn transcript(&self) -> Vec<String> {
        self.0.transcript.lock().unwrap().clone()
    }

    fn diff_flag(&self) -> bool {
        *self.0.diff_flag.lock().unwrap()
    }

    fn permissions(&self) -> Vec<(String, String)> {
        self.0.permissions.lock().unwrap().clone()
    }

    fn fail_appends(&self) {
        *self.0.fail_appends.lock().unwrap() = true;
    }
}

impl StorePort for FakeStore {
    fn append_transcript(&self, line: &str) -> Result<()> {
        if *self.0.fail_appends.lock().unwrap() {
            return Err(anyhow!("disk full"));
        }
        self.0.transcript.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn save_photo(&self, bytes: &[u8], ext: &str) -> Result<PathBuf> {
        let mut photos = self.0.photos.lock().unwrap();
        photos.push((bytes.len(), ext.to_string()));
        Ok(PathBuf::from(format!(
            "/photos/photo_{}{}",
            photos.len(),
            ext
        )))
    }

    fn set_diff_mode(&self, enabled: bool) -> Result<()> {
        *self.0.diff_flag.lock().unwrap() = enabled;
        Ok(())
    }

    fn record_permission(&self, request_id: &str, decision: &str) -> Result<()> {
        self.0
            .permissions
            .lock()
            .unwrap()
            .push((request_id.to_string(), decision.to_string()));
        Ok(())
    }
}

#[derive(Clone)]
struct FakeAttachments {
    result: Option<Attachment>,
}

impl FakeAttachments {
    fn ok(bytes: &[u8], remote_path: &str) -> Self {
        Self {
            result: Some(Attachment {
                bytes: bytes.to_vec(),
                remote_path: remote_path.to_string(),
            }),
        }
    }

    fn failing() -> Self {
        Self { result: None }
    }
}

#[async_trait]
impl AttachmentPort for FakeAttachments {
    async fn fetch(&self, _file_id: &str) -> Result<Attachment> {
        self.result
            .clone()
            .ok_or_else(|| anyhow!("getFile failed"))
    }
}

#[derive(Clone)]
struct FakeTranscriber {
    result: Option<String>,
}

impl FakeTranscriber {
    fn ok(text: &str) -> Self {
        Self {
            result: Some(text.to_string()),
        }
    }

    fn failing() -> Self {
        Self { result: None }
    }
}

#[async_trait]
impl TranscriberPort for FakeTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        self.result
            .clone()
            .ok_or_else(|| anyhow!("whisper exited with status 1"))
    }
}

type TestRouter = Router<FakeMailbox, FakeSession, FakeAttachments, FakeTranscriber, FakeStore>;

struct Harness {
    mailbox: Arc<FakeMailbox>,
    session: FakeSession,
    store: FakeStore,
    router: TestRouter,
}

fn harness_with(attachments: FakeAttachments, transcriber: FakeTranscriber) -> Harness {
    let registry = Arc::new(ProjectRegistry::with_defaults(Path::new("/home/op")));
    let mailbox = Arc::new(FakeMailbox::default());
    let session = FakeSession::new();
    let store = FakeStore::new();
    let lifecycle = SessionLifecycle::new(
        session.clone(),
        mailbox.clone(),
        registry.clone(),
        "bikes",
        LifecycleTiming::immediate(),
    );
    let router = Router::new(
        mailbox.clone(),
        attachments,
        transcriber,
        store.clone(),
        registry,
        lifecycle,
        "DENIS",
        "check telegram",
    );
    Harness {
        mailbox,
        session,
        store,
        router,
    }
}

fn harness() -> Harness {
    harness_with(
        FakeAttachments::ok(b"ogg-bytes", "voice/file_1.oga"),
        FakeTranscriber::ok("deploy the fix"),
    )
}

fn msg(text: &str) -> InboundMessage {
    InboundMessage::new(text, "2026-08-29T10:00:00")
}

#[tokio::test]
async fn duplicate_messages_dispatch_once() {
    let mut h = harness();
    h.router
        .route_batch(&[msg("fix the login bug"), msg("fix the login bug")])
        .await
        .unwrap();
    assert_eq!(h.store.transcript().len(), 1);
}

#[tokio::test]
async fn plain_text_lands_in_transcript_with_sender_and_timestamp() {
    let mut h = harness();
    h.router.route_batch(&[msg("fix the login bug")]).await.unwrap();
    let transcript = h.store.transcript();
    assert_eq!(
        transcript[0],
        "DENIS [2026-08-29T10:00:00]: fix the login bug"
    );
}

#[tokio::test]
async fn switch_to_active_project_acks_without_restart() {
    let mut h = harness();
    h.router
        .route_batch(&[msg("переключи на bikes")])
        .await
        .unwrap();
    assert_eq!(h.session.teardowns(), 0);
    assert!(h.session.launches().is_empty());
    assert!(h.mailbox.sent().iter().any(|m| m.contains("Already on bikes")));
}

#[tokio::test]
async fn switch_scenario_cyrillic_phrase_resolves_and_switches_once() {
    let mut h = harness();
    h.router
        .route_batch(&[msg("переключи на tapyou")])
        .await
        .unwrap();
    assert_eq!(h.router.lifecycle().active_alias(), "tapyou");
    assert_eq!(h.session.teardowns(), 1);
    assert_eq!(h.session.launches(), vec!["tapyou".to_string()]);
    // No transcript write for a daemon-level command
    assert!(h.store.transcript().is_empty());
}

#[tokio::test]
async fn switch_resolves_synonyms() {
    let mut h = harness();
    h.router.route_batch(&[msg("открой тапю")]).await.unwrap();
    assert_eq!(h.router.lifecycle().active_alias(), "tapyou");
}

#[tokio::test]
async fn unknown_slash_project_reports_available_list() {
    let mut h = harness();
    h.router.route_batch(&[msg("/project nowhere")]).await.unwrap();
    let sent = h.mailbox.sent();
    assert!(sent.iter().any(|m| m.contains("Unknown project: nowhere")));
    assert!(sent.iter().any(|m| m.contains("tapyou")));
    assert_eq!(h.router.lifecycle().active_alias(), "bikes");
    assert_eq!(h.session.teardowns(), 0);
}

#[tokio::test]
async fn listing_marks_active_project_without_touching_session() {
    let mut h = harness();
    h.router.route_batch(&[msg("/projects")]).await.unwrap();
    let sent = h.mailbox.sent();
    assert!(sent.iter().any(|m| m.contains("👉 bikes")));
    assert!(h.session.launches().is_empty());
    assert!(h.store.transcript().is_empty());
}

#[tokio::test]
async fn diffs_on_then_off_leaves_flag_absent() {
    let mut h = harness();
    h.router
        .route_batch(&[msg("diffs on"), msg("diffs off")])
        .await
        .unwrap();
    assert!(!h.store.diff_flag());
    assert_eq!(h.mailbox.sent().len(), 2);
    assert!(h.store.transcript().is_empty());
}

#[tokio::test]
async fn permission_callback_is_recorded_not_forwarded() {
    let mut h = harness();
    h.router
        .route_batch(&[msg("[btn] perm_always_perm-1712345678")])
        .await
        .unwrap();
    assert_eq!(
        h.store.permissions(),
        vec![("perm-1712345678".to_string(), "always".to_string())]
    );
    assert!(h.store.transcript().is_empty());
    assert!(h.mailbox.sent().is_empty());
}

#[tokio::test]
async fn restart_command_tears_down_and_relaunches() {
    let mut h = harness();
    h.router.route_batch(&[msg("restart claude")]).await.unwrap();
    assert_eq!(h.session.teardowns(), 1);
    assert_eq!(h.session.launches(), vec!["bikes".to_string()]);
    assert!(h
        .mailbox
        .sent()
        .iter()
        .any(|m| m.contains("restarted") && m.contains("bikes")));
}

#[tokio::test]
async fn voice_success_writes_transcription_and_reports_back() {
    let mut h = harness();
    h.router.route_batch(&[msg("[voice:ABC123]")]).await.unwrap();
    let transcript = h.store.transcript();
    assert_eq!(transcript.len(), 1);
    assert!(transcript[0].contains("🎤 deploy the fix"));
    assert!(h.mailbox.sent().iter().any(|m| m.contains("deploy the fix")));
}

#[tokio::test]
async fn voice_transcription_failure_writes_marker_never_drops() {
    let mut h = harness_with(
        FakeAttachments::ok(b"ogg-bytes", "voice/file_1.oga"),
        FakeTranscriber::failing(),
    );
    h.router.route_batch(&[msg("[voice:ABC123]")]).await.unwrap();
    let transcript = h.store.transcript();
    assert_eq!(transcript.len(), 1);
    assert!(transcript[0].contains("[voice transcription failed]"));
}

#[tokio::test]
async fn voice_download_failure_also_degrades_to_marker() {
    let mut h = harness_with(FakeAttachments::failing(), FakeTranscriber::ok("unused"));
    h.router.route_batch(&[msg("[voice:ABC123]")]).await.unwrap();
    assert!(h.store.transcript()[0].contains("[voice transcription failed]"));
}

#[tokio::test]
async fn photo_is_saved_and_referenced_with_caption() {
    let mut h = harness_with(
        FakeAttachments::ok(b"jpeg-bytes", "photos/file_9.png"),
        FakeTranscriber::ok("unused"),
    );
    h.router
        .route_batch(&[msg("[photo:XYZ|broken build]")])
        .await
        .unwrap();
    let transcript = h.store.transcript();
    assert_eq!(transcript.len(), 1);
    assert!(transcript[0].contains("📷 Photo (caption: broken build): /photos/photo_1.png"));
}

#[tokio::test]
async fn photo_download_failure_writes_marker() {
    let mut h = harness_with(FakeAttachments::failing(), FakeTranscriber::ok("unused"));
    h.router.route_batch(&[msg("[photo:XYZ]")]).await.unwrap();
    assert!(h.store.transcript()[0].contains("[photo download failed]"));
}

#[tokio::test]
async fn nudge_twice_within_interval_delivers_once() {
    let mut h = harness();
    h.session.set_running(true);
    // Adopt the running session so nudges are not suppressed by startup
    h.router.lifecycle_mut().ensure_running().await.unwrap();
    assert_eq!(h.router.nudge_wake().await, NudgeOutcome::Sent);
    assert_eq!(h.router.nudge_wake().await, NudgeOutcome::Suppressed);
    assert_eq!(h.session.delivered_nudges(), 1);
}

#[tokio::test]
async fn batch_is_acked_only_after_durable_handling() {
    let mut h = harness();
    h.mailbox.queue("fix the login bug", "t1");
    h.router.poll_mailbox().await;
    assert_eq!(h.mailbox.acks.load(Ordering::SeqCst), 1);

    h.store.fail_appends();
    h.mailbox.queue("another task", "t2");
    h.router.poll_mailbox().await;
    // Transcript write failed: no ack, message will redeliver
    assert_eq!(h.mailbox.acks.load(Ordering::SeqCst), 1);
}
