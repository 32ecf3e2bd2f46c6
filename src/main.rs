use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use pairwire::config::Settings;
use pairwire::persistence::create_message_store;
use pairwire::server::{create_app, AppState};
use pairwire::shutdown::GracefulShutdown;
use pairwire::tasks::RoomReaperTask;
use pairwire::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.logging);
    tracing::info!("Configuration loaded");

    // Create message store
    let store = create_message_store(&settings.persistence).await?;
    tracing::info!(backend = store.backend_name(), "Message store initialized");

    // Create application state
    let state = AppState::new(settings.clone(), store);
    tracing::info!("Application state initialized");

    // Start room reaper in background
    let reaper = RoomReaperTask::new(
        settings.rooms.clone(),
        state.registry.clone(),
        state.shutdown.child_token(),
    );
    let reaper_handle = tokio::spawn(reaper.run());

    let shutdown = GracefulShutdown::new(state.registry.clone(), state.shutdown.clone());

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown_signal().await;
            shutdown.execute(reason).await;
        })
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = reaper_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "ctrl_c"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "sigterm"
        }
    }
}
