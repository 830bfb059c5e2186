// Main entry point - Dependency injection and poll loop setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tracing_subscriber::EnvFilter;

use crate::application::nightscout_client::NightscoutClient;
use crate::application::poll_service::PollService;
use crate::application::token_manager::TokenManager;
use crate::application::transport::Transport;
use crate::infrastructure::config::{load_app_config, AppConfig};
use crate::infrastructure::reqwest_transport::ReqwestTransport;
use crate::presentation::log_renderer::LogRenderer;

const DEFAULT_CONFIG_PATH: &str = "config/owlet";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("owlet=info")))
        .init();

    // Load configuration
    let config_path = std::env::var("OWLET_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_app_config(&config_path)?;
    config.validate()?;
    tracing::info!("Loaded settings from {}: {:?}", config_path, config.nightscout);

    let (settings_tx, settings_rx) = watch::channel(config);
    let settings_tx = Arc::new(settings_tx);

    // Create transport and client (infrastructure + application layers)
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
    let tokens = Arc::new(TokenManager::new(transport.clone()));
    let client = Arc::new(NightscoutClient::new(transport, tokens));

    // Check connectivity once, the loop keeps going either way
    let status_params = settings_rx.borrow().nightscout.clone();
    match client.get_status(&status_params).await {
        Ok(status) => {
            tracing::info!(
                "Connected to {} (version {})",
                status.name.as_deref().unwrap_or("nightscout"),
                status.version.as_deref().unwrap_or("unknown")
            );
            tracing::debug!("Status payload: {}", status.raw);
        }
        Err(e) => tracing::warn!("Status check failed: {}", e),
    }

    // Create renderer and poll service (presentation + application layers)
    let renderer = Arc::new(LogRenderer::new(settings_rx.clone()));
    let service = Arc::new(PollService::new(client, settings_rx, renderer));

    spawn_signal_handlers(service.waker(), settings_tx.clone(), config_path);

    tokio::select! {
        _ = service.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("App was closed due to interrupt");
        }
    }

    Ok(())
}

/// SIGUSR1 refreshes immediately, SIGHUP reloads the settings file.
#[cfg(unix)]
fn spawn_signal_handlers(wake: Arc<Notify>, settings: Arc<watch::Sender<AppConfig>>, config_path: String) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut usr1, mut hup) = match (signal(SignalKind::user_defined1()), signal(SignalKind::hangup())) {
            (Ok(usr1), Ok(hup)) => (usr1, hup),
            _ => {
                tracing::warn!("Could not install signal handlers");
                return;
            }
        };

        loop {
            tokio::select! {
                Some(()) = usr1.recv() => wake.notify_one(),
                Some(()) = hup.recv() => match load_app_config(&config_path).and_then(|c| c.validate().map(|_| c)) {
                    Ok(config) => {
                        tracing::info!("Config was updated successfully");
                        settings.send_replace(config);
                    }
                    Err(e) => tracing::error!("Keeping previous settings, reload failed: {}", e),
                },
                else => break,
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_handlers(_wake: Arc<Notify>, _settings: Arc<watch::Sender<AppConfig>>, _config_path: String) {
    tracing::debug!("Signal handlers are only available on unix");
}
