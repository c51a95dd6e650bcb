use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ss_events_client::config::Settings;
use ss_events_client::connection::EventStreamClient;
use ss_events_client::notification::LoggingEventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration; missing required settings abort here, before any
    // network activity, with a non-zero exit
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Create the client with the default logging handler; embedders replace
    // it with their own EventHandler implementation
    let client = EventStreamClient::new(settings, Arc::new(LoggingEventHandler))?;
    let shutdown_signal = client.shutdown_signal();

    // Wire process signals to the cooperative shutdown channel
    tokio::spawn(shutdown_signal_handler(shutdown_signal));

    // Run until shutdown
    client.run().await?;

    tracing::info!("Client shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Send shutdown signal to the connection loop
    let _ = shutdown_tx.send(());
}
