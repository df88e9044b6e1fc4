pub mod config;
pub mod identify;
pub mod session;
pub mod speech;
pub mod utils;

use crate::config::{default_config_path, load_config, AppConfig};
use crate::identify::IdentifyService;
use crate::session::IdentificationSession;
use crate::speech::{
    BridgeEngine, ChannelNotifier, HostCommand, Notification, SpeechController, SpeechSettings,
};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` level. Safe to call more than once.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything a host shell needs to drive the app: the session, the bridge
/// it feeds engine events into, and the two outbound channels it drains.
pub struct HostApp {
    pub session: IdentificationSession,
    pub engine: Arc<BridgeEngine>,
    pub commands: UnboundedReceiver<HostCommand>,
    pub notifications: UnboundedReceiver<Notification>,
}

impl HostApp {
    /// Feed one JSON event from the host into the narration bridge.
    pub fn handle_host_event(&self, raw: &str) -> anyhow::Result<()> {
        self.engine
            .dispatch_json(raw)
            .map_err(anyhow::Error::msg)
            .context("invalid host event")
    }
}

/// Build the app from the config file in the user's data directory.
pub fn init_host_app_from_default() -> anyhow::Result<HostApp> {
    init_host_app_from_path(&default_config_path())
}

/// Build the app from a config file; a missing or unreadable file means
/// defaults.
pub fn init_host_app_from_path(path: &Path) -> anyhow::Result<HostApp> {
    tracing::info!("[App] Loading config from {}", path.display());
    init_host_app(&load_config(path))
}

pub fn init_host_app(config: &AppConfig) -> anyhow::Result<HostApp> {
    let identifier = IdentifyService::from_config(&config.identify)
        .map_err(anyhow::Error::msg)
        .context("failed to initialize identification provider")?;

    let (engine, commands) = BridgeEngine::new();
    let engine = Arc::new(engine);
    let (notifier, notifications) = ChannelNotifier::new();
    let notifier = Arc::new(notifier);

    let speech = SpeechController::new(
        engine.clone(),
        notifier.clone(),
        SpeechSettings::from(&config.speech),
    );
    let session = IdentificationSession::new(
        Arc::new(identifier),
        speech,
        notifier,
        config.default_language.clone(),
    );

    tracing::info!("[App] Ready");
    Ok(HostApp {
        session,
        engine,
        commands,
        notifications,
    })
}
