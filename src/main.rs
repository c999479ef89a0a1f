use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use aris_relay::config::Settings;
use aris_relay::connectivity::{ConnectivityProbe, ConnectivitySignal, ConnectivityWatcher};
use aris_relay::queue::DeliveryQueue;
use aris_relay::server::{create_app, AppState};
use aris_relay::shutdown::{GracefulShutdown, ShutdownConfig};
use aris_relay::telemetry::init_telemetry;
use aris_relay::transport::create_transport;
use aris_relay::ui::UiChannel;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (also reads .env)
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        transport = ?settings.transport.kind,
        max_retries = settings.queue.max_retries,
        retry_delay_ms = settings.queue.retry_delay_ms,
        message_timeout_ms = settings.queue.message_timeout_ms,
        "Configuration loaded"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let ui = UiChannel::new();

    // Transport, plus its reconnect supervisor when it keeps a connection
    let transport_set = create_transport(&settings.transport, &settings.reconnect, ui.clone())?;
    let supervisor_handle = transport_set.supervisor.map(|supervisor| {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(supervisor.run(shutdown_rx))
    });

    // Delivery queue
    let connectivity = ConnectivitySignal::new(settings.connectivity.initially_online);
    let queue = DeliveryQueue::new(
        settings.queue.clone(),
        transport_set.transport,
        Arc::new(ui.clone()),
    )
    .with_online(connectivity.is_online());

    // Connectivity tasks
    let watcher = ConnectivityWatcher::new(&connectivity, queue.clone(), shutdown_tx.subscribe());
    let watcher_handle = tokio::spawn(watcher.run());

    let probe_handle = ConnectivityProbe::from_config(
        &settings.connectivity,
        connectivity.clone(),
        shutdown_tx.subscribe(),
    )?
    .map(|probe| tokio::spawn(probe.run()));

    let state = AppState::new(
        settings.clone(),
        queue.clone(),
        connectivity,
        ui,
        transport_set.connection_state,
    );
    tracing::info!("Application state initialized");

    let app = create_app(state.clone());

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal_handler().await;
            // Open SSE connections would otherwise hold the server open
            state.close_streams();
        })
        .await?;

    // Flush what we can, then stop background tasks
    let shutdown = GracefulShutdown::with_config(
        queue,
        shutdown_tx,
        ShutdownConfig::from(&settings.server),
    );
    shutdown.execute("server stopping").await;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = watcher_handle.await;
    if let Some(handle) = supervisor_handle {
        let _ = handle.await;
    }
    if let Some(handle) = probe_handle {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
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
}
