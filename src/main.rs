//! Car Battle Engine - headless runner
//!
//! Boots the engine, runs a demo match between two built-in tactics and
//! logs the outcome. The real transport layer consumes the same [`Engine`]
//! API this binary does.

use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use car_battle_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = EngineConfig::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Car Battle Engine");

    let engine = Engine::new(config);

    let policy_a = std::env::var("POLICY_A").unwrap_or_else(|_| "aggressive".to_string());
    let policy_b = std::env::var("POLICY_B").unwrap_or_else(|_| "defensive".to_string());

    let snapshot = engine.start_match(&policy_a, &policy_b).await;
    info!(
        policy_a = %policy_a,
        policy_b = %policy_b,
        status = %snapshot.status_message,
        "demo match started"
    );

    // Poll until the match resolves or the operator interrupts
    let outcome = tokio::select! {
        snapshot = wait_for_outcome(&engine) => Some(snapshot),
        _ = shutdown_signal() => None,
    };

    match outcome {
        Some(final_state) => {
            info!(
                winner = ?final_state.winner_id,
                ticks = final_state.tick,
                "demo match finished"
            );
            println!("{}", serde_json::to_string_pretty(&final_state)?);
        }
        None => {
            info!("Received shutdown signal, stopping match");
            engine.stop_match().await;
        }
    }

    engine.reset_match().await;
    info!("Engine shutdown complete");
    Ok(())
}

async fn wait_for_outcome(engine: &Engine) -> car_battle_engine::MatchSnapshot {
    loop {
        let snapshot = engine.state();
        if !snapshot.running {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
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
