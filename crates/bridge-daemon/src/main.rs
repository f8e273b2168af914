mod config;
mod daemon;
mod mailbox;
mod session;
mod store;
mod telegram;
mod tmux;
mod transcribe;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridge_core::{LifecycleTiming, ProjectRegistry, Router, SessionLifecycle};

use config::BridgeConfig;
use daemon::BridgeDaemon;
use mailbox::MailboxClient;
use session::TmuxSession;
use store::BridgeStore;
use telegram::TelegramFiles;
use tmux::Tmux;
use transcribe::WhisperTranscriber;

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "bridge_daemon=info,bridge_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = BridgeConfig::load()?;

    let mut registry = ProjectRegistry::with_defaults(&cfg.home);
    registry.discover(&cfg.projects_scan_dir, &cfg.home);
    let registry = Arc::new(registry);
    info!(projects = registry.entries().len(), "project registry built");

    let mailbox = Arc::new(MailboxClient::new(&cfg.api_base, &cfg.api_token)?);
    let store = BridgeStore::new(
        &cfg.state_dir,
        cfg.transcript_path(),
        cfg.outbox_path(),
        cfg.diff_flag_path(),
        cfg.restart_signal_path(),
        cfg.photos_dir(),
        cfg.approvals_dir.clone(),
    )?;

    let tmux = Tmux::new(&cfg.tmux_bin, &cfg.tmux_session);
    let session = TmuxSession::new(
        tmux,
        &cfg.assistant_cmd,
        &cfg.assistant_args,
        &cfg.terminal_app,
        cfg.boot_script.clone(),
    );
    let transcriber =
        WhisperTranscriber::new(&cfg.whisper_cmd, &cfg.whisper_model, &cfg.whisper_language);
    let attachments = TelegramFiles::new(cfg.bot_token.clone())?;

    let initial_alias = registry
        .entries()
        .first()
        .map(|e| e.alias.clone())
        .unwrap_or_else(|| "bikes".to_string());
    let lifecycle = SessionLifecycle::new(
        session,
        mailbox.clone(),
        registry.clone(),
        &initial_alias,
        LifecycleTiming::default(),
    );
    let router = Router::new(
        mailbox.clone(),
        attachments,
        transcriber,
        store.clone(),
        registry,
        lifecycle,
        &cfg.sender_label,
        &cfg.wake_phrase,
    );

    let assistant_binary = cfg
        .assistant_cmd
        .rsplit('/')
        .next()
        .unwrap_or(&cfg.assistant_cmd)
        .to_string();

    BridgeDaemon::new(router, store, mailbox, assistant_binary, cfg.poll_interval)
        .run()
        .await;
    Ok(())
}
