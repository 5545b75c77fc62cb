//! Live Relay Server
//!
//! # Configuration
//!
//! Loaded from `config.toml` (current directory, `/etc/liverelay/`, or the
//! platform config directory), then overridden by environment variables:
//! - `LIVERELAY_API_HOST` / `LIVERELAY_API_PORT` / `LIVERELAY_MAX_CONNECTIONS`
//! - `LIVERELAY_BASE_URL` / `LIVERELAY_WS_ENDPOINT`
//! - `LIVERELAY_SIGN_COMMAND`
//! - `LIVERELAY_LOG_LEVEL` / `LIVERELAY_LOG_FORMAT`
//! - `RUST_LOG` overrides the filter entirely

use std::sync::Arc;

use liverelay::api::{serve, AppState};
use liverelay::config::Config;
use liverelay::orchestrator::Orchestrator;
use liverelay::relay::RelayHub;
use liverelay::signature::{CommandSigner, Signer, UnavailableSigner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_default();
    init_tracing(&config);

    tracing::info!("Starting live relay v{}", env!("CARGO_PKG_VERSION"));

    let signer: Arc<dyn Signer> = match &config.stream.sign_command {
        Some(command) => {
            tracing::info!(command = %command, "using external signing command");
            Arc::new(CommandSigner::new(command))
        }
        None => {
            tracing::warn!("no signing command configured, stream connections will fail to sign");
            Arc::new(UnavailableSigner)
        }
    };

    let hub = Arc::new(RelayHub::new(config.api.to_hub_config()));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&hub),
        config.stream.to_stream_config(),
        signer,
    ));

    let reaper = orchestrator.start_idle_reaper(config.stream.idle_reap_interval());

    let state = AppState::new(hub, orchestrator, config.api.to_api_config());
    let result = serve(state).await;

    reaper.abort();
    result?;

    tracing::info!("Live relay shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "liverelay={},tower_http=warn",
            config.logging.level
        ))
    });

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
