//! Room Tick Server - queue-backed real-time room server
//!
//! This is the main entry point. It:
//! - pulls framed jobs from Disque (or an in-process queue)
//! - runs the aggregated or the direct profile with the bundled echo logic
//! - serves `GET /health`

mod demo;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use room_tick_server::app::AppState;
use room_tick_server::config::{Config, QueueBackend, ServerMode};
use room_tick_server::error::FailureReporter;
use room_tick_server::game::RoomTable;
use room_tick_server::http::{build_router, HealthState};
use room_tick_server::serializer::JsonSerializer;
use room_tick_server::server::Server;
use room_tick_server::session::FixedRoomHooks;
use room_tick_server::transport::{DisqueTransport, MemoryQueue, QueueTransport};
use room_tick_server::util::time::init_server_time;

use crate::demo::{EchoHandler, EchoRoom};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration; a numeric first argument overrides the tick interval
    let config = Config::from_env()?.with_interval_arg(std::env::args().nth(1));

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Room Tick Server");
    info!(
        mode = %config.mode,
        tick_interval_ms = config.tick_interval_ms,
        queue = %config.queue_name,
        "Configuration loaded"
    );

    let transport: Arc<dyn QueueTransport> = match config.queue_backend {
        QueueBackend::Disque => Arc::new(
            DisqueTransport::connect(&config.queue_host, config.queue_port, config.fetch_timeout())
                .await?,
        ),
        QueueBackend::Memory => Arc::new(MemoryQueue::new(config.fetch_timeout())),
    };

    let state = AppState::new(
        transport,
        Arc::new(FixedRoomHooks::new(config.default_room.clone())),
        FailureReporter::logging(),
    );

    let mut server = match config.mode {
        ServerMode::Aggregated => {
            let rooms = Arc::new(RoomTable::new());
            rooms.insert(config.default_room.clone(), EchoRoom::default());
            Server::aggregated(state.clone(), config.server_settings(), rooms, JsonSerializer)
        }
        ServerMode::Direct => Server::direct(
            state.clone(),
            config.server_settings(),
            EchoHandler,
            JsonSerializer,
        ),
    };
    server.begin()?;

    // Build router
    let router = build_router(HealthState {
        app: state,
        mode: server.mode(),
        ticks: server.tick_stats(),
    });

    let listener = TcpListener::bind(config.health_addr).await?;
    info!("Health check: http://{}/health", config.health_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    server.end().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
