use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use syncfleet::config::{InstanceRegistry, Settings};
use syncfleet::server::{self, AppState};
use syncfleet::syncthing::aggregator::Aggregator;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let registry = InstanceRegistry::load().await;
    if registry.is_empty() {
        warn!("No instances configured; the dashboard will render empty");
    }

    // Daemon GUIs commonly run on self-signed certificates.
    let http = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .danger_accept_invalid_certs(true)
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "Failed to build HTTP client");
            return;
        }
    };

    let aggregator = Arc::new(Aggregator::new(
        registry.clone(),
        http.clone(),
        settings.batch_deadline,
    ));
    let state = AppState {
        aggregator,
        registry,
        http,
    };

    if let Err(err) = server::run(state, settings.bind).await {
        error!(error = %err, "Server exited with error");
    }
}
