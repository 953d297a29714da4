//! Eureka agent entry point.

use std::sync::Arc;

use log::{error, info};
use tokio::signal;

use eureka_agent::{Config, DiscoveryClient, HttpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting Eureka agent with config: {:?}", cfg);

    let client = Arc::new(DiscoveryClient::new(cfg, Arc::new(HttpTransport::new())));
    info!(
        "Registering {} against {:?}",
        client.instance().instance_id,
        client.endpoints()
    );

    // Watch for termination before registering so a registry that never
    // answers does not make the agent unkillable.
    let watch = client.spawn_shutdown_watch(shutdown_signal());

    client.start().await;

    if let Err(e) = watch.await {
        error!("Shutdown watch failed: {}", e);
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
