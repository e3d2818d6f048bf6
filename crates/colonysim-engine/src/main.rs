//! Engine binary for the Colonysim settlement economy.
//!
//! Loads configuration, seeds the configured settlements into in-memory
//! providers, wires the orchestrator, and runs the bounded tick loop.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `colonysim-config.yaml` (or the path given as
//!    the first argument), applying environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Create the orchestrator and subscribe the logging listener
//! 4. Register seed settlements
//! 5. Run the simulation loop
//! 6. Log the result

mod error;
mod listener;

use std::path::{Path, PathBuf};

use colonysim_core::config::SimulationConfig;
use colonysim_core::runner::{self, NoOpCallback};
use colonysim_core::{InMemorySettlement, SystemOrchestrator};
use colonysim_types::SettlementId;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::listener::LoggingListener;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "colonysim-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging setup, settlement
/// registration, or a tick fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config)?;
    info!(
        path = %config_path.display(),
        from_file,
        run = config.simulation.name,
        max_ticks = config.simulation.max_ticks,
        tick_minutes = config.simulation.tick_minutes,
        "configuration loaded"
    );

    // 3. Create the orchestrator.
    let mut orchestrator = SystemOrchestrator::new(&config)?;
    orchestrator.add_listener(Box::new(LoggingListener));

    // 4. Register seed settlements.
    for (sequence, seed) in (1_u64..).zip(&config.settlements) {
        let id = SettlementId::from_sequence(sequence);
        orchestrator.register_settlement(Box::new(InMemorySettlement::from_seed(id, seed)))?;
    }
    info!(
        settlements = orchestrator.settlements().len(),
        epoch = %orchestrator.now(),
        "seed settlements registered"
    );

    // 5. Run the simulation.
    let result = runner::run_simulation(
        &mut orchestrator,
        config.simulation.max_ticks,
        config.simulation.tick_interval_ms,
        &mut NoOpCallback,
    )
    .await?;

    // 6. Log results.
    runner::log_simulation_end(&result);
    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        ledger_entries = orchestrator.ledger().entries().len(),
        "colonysim-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `path`, falling back to defaults (with
/// environment overrides still applied) when the file does not exist.
fn load_config(path: &Path) -> Result<(SimulationConfig, bool), EngineError> {
    if path.exists() {
        return Ok((SimulationConfig::from_file(path)?, true));
    }
    let mut config = SimulationConfig::default();
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok((config, false))
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &SimulationConfig) -> Result<(), EngineError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level).map_err(|e| {
            EngineError::LogFilter {
                filter: config.logging.level.clone(),
                message: e.to_string(),
            }
        })?,
    };

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let (config, from_file) = load_config(Path::new("does-not-exist.yaml")).unwrap();
        assert!(!from_file);
        assert!(config.settlements.is_empty());
    }

    #[test]
    fn shipped_config_seeds_settlements() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join(DEFAULT_CONFIG);
        let (config, from_file) = load_config(&path).unwrap();
        assert!(from_file);
        assert_eq!(config.settlements.len(), 4);
    }
}
