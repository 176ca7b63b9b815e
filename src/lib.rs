pub mod exercise;
pub mod pose;
pub mod relay;
pub mod reps;
pub mod settings;
pub mod utils;
pub mod workout;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};

use relay::{LoggingObserver, SessionRelayClient};
use settings::SettingsStore;

const DEFAULT_SETTINGS_FILE: &str = "formcoach-settings.json";

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Headless entry point: loads settings, connects to the relay and lets it
/// drive workouts until Ctrl-C.
pub async fn run() -> Result<()> {
    let level = if env_flag("FORMCOACH_DEBUG") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    // RUST_LOG still wins per target
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    info!("formcoach starting up...");

    let settings_path = std::env::var("FORMCOACH_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = SettingsStore::new(settings_path)?;
    info!("Settings loaded from {}", settings.path().display());

    let mut config = settings.relay();
    if let Ok(url) = std::env::var("FORMCOACH_RELAY_URL") {
        config.url = url;
    }
    if let Some(error) = config.validate().into_iter().next() {
        warn!("Ignoring invalid relay configuration ({error}), using defaults");
        config = settings::RelayConfig::default();
    }

    let client = SessionRelayClient::with_websocket(config, Arc::new(LoggingObserver));
    if let Ok(exercise) = std::env::var("FORMCOACH_EXERCISE") {
        client.set_exercise_type(&exercise);
    }

    client.connect_to_relay_node();
    info!("Waiting for relay commands (Ctrl-C to quit)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    client.stop_workout();
    client.disconnect();

    let snapshot = client.snapshot();
    info!(
        "Final session: {} reps, {}s, {} kcal",
        snapshot.session.stats.total_reps,
        snapshot.session.stats.duration_seconds,
        snapshot.session.stats.calories_burned
    );
    Ok(())
}
