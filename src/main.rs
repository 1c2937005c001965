//! Logistics Engine - headless host
//!
//! Runs the deployment & logistics engine outside the game server. It handles:
//! - Driving the vehicle threat state machine at a fixed tick rate
//! - Draining engine events to the log (stand-in for the notification bridge)
//! - Draining statistics records (stand-in for the persistence adapter)

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logistics_engine::config::EngineConfig;
use logistics_engine::notify::{ChannelNotifier, ChannelRecorder, StatRecord};
use logistics_engine::util::time::{init_server_time, uptime_secs, SystemClock};
use logistics_engine::world::InMemoryWorld;
use logistics_engine::{Engine, EngineEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = EngineConfig::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Logistics Engine");
    info!(
        deploy_cooldown_secs = config.deploy_cooldown.as_secs_f32(),
        resupply_cooldown_secs = config.resupply_cooldown.as_secs_f32(),
        threat_tick_hz = config.threat_tick_hz,
        "Engine configuration loaded"
    );

    let (notifier, events_rx) = ChannelNotifier::new();
    let (recorder, records_rx) = ChannelRecorder::new();

    let engine = Engine::new(
        config,
        Arc::new(InMemoryWorld::new()),
        Arc::new(notifier),
        Arc::new(recorder),
        Arc::new(SystemClock),
    );

    tokio::spawn(drain_events(events_rx));
    tokio::spawn(drain_records(records_rx));

    let ticker = engine.clone();
    tokio::select! {
        _ = ticker.run() => {
            warn!("Threat tick loop exited unexpectedly");
        }
        _ = shutdown_signal() => {}
    }

    info!(uptime_secs = uptime_secs(), "Engine shutdown complete");
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

/// Log every engine event as JSON
async fn drain_events(mut rx: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => debug!(target: "engine_events", "{}", json),
            Err(e) => warn!(error = %e, "Failed to serialize engine event"),
        }
    }
}

/// Log statistics records; the game server replaces this with its persistence adapter
async fn drain_records(mut rx: mpsc::UnboundedReceiver<StatRecord>) {
    while let Some(record) = rx.recv().await {
        match record {
            StatRecord::Deploy { player, target, at } => {
                info!(player = %player, target_id = %target, at = %at, "Deploy recorded");
            }
            StatRecord::Resupply {
                player,
                store,
                amount,
                at,
            } => {
                info!(player = %player, store = %store, amount, at = %at, "Resupply recorded");
            }
        }
    }
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
