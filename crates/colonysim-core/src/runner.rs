//! Bounded tick loop.
//!
//! [`run_simulation`] wraps [`SystemOrchestrator::orchestrate_system`] with
//! the run boundaries: stop after `max_ticks`, stop early once every
//! settlement has been unregistered, and pause for `tick_interval_ms` of
//! real time between ticks. Simulated time is unaffected by the pause.

use tracing::{info, warn};

use colonysim_types::SystemStatus;

use crate::orchestrator::{OrchestratorError, SystemOrchestrator};

/// Errors that can occur during the run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying orchestrator error.
        #[from]
        source: OrchestratorError,
    },
}

/// Why the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationEndReason {
    /// The configured number of ticks completed.
    MaxTicksReached,
    /// No settlements remained registered after a tick.
    NoSettlements,
}

/// Result of a run.
#[derive(Debug)]
pub struct SimulationResult {
    /// Why the run stopped.
    pub end_reason: SimulationEndReason,
    /// Status of the last tick, if any tick ran.
    pub final_status: Option<SystemStatus>,
    /// Ticks executed by this call.
    pub total_ticks: u64,
}

/// Hook invoked after each completed tick.
pub trait TickCallback: Send {
    /// Called with the tick's status and the orchestrator after the tick.
    fn on_tick(&mut self, status: &SystemStatus, orchestrator: &SystemOrchestrator);
}

/// A tick callback that does nothing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _status: &SystemStatus, _orchestrator: &SystemOrchestrator) {}
}

/// Run ticks until `max_ticks` complete or no settlements remain.
///
/// A `max_ticks` of zero returns immediately without ticking.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails.
pub async fn run_simulation(
    orchestrator: &mut SystemOrchestrator,
    max_ticks: u64,
    tick_interval_ms: u64,
    callback: &mut dyn TickCallback,
) -> Result<SimulationResult, RunnerError> {
    let mut last_status: Option<SystemStatus> = None;
    let mut total_ticks: u64 = 0;

    info!(
        max_ticks,
        tick_interval_ms,
        settlements = orchestrator.settlements().len(),
        "simulation starting"
    );

    while total_ticks < max_ticks {
        let status = orchestrator.orchestrate_system()?;
        total_ticks = total_ticks.saturating_add(1);

        callback.on_tick(&status, orchestrator);

        if status.settlement_count == 0 {
            info!(tick = status.tick, "no settlements remain");
            return Ok(SimulationResult {
                end_reason: SimulationEndReason::NoSettlements,
                final_status: Some(status),
                total_ticks,
            });
        }

        last_status = Some(status);

        if tick_interval_ms > 0 && total_ticks < max_ticks {
            tokio::time::sleep(tokio::time::Duration::from_millis(tick_interval_ms)).await;
        }
    }

    info!(total_ticks, max_ticks, "tick limit reached");
    Ok(SimulationResult {
        end_reason: SimulationEndReason::MaxTicksReached,
        final_status: last_status,
        total_ticks,
    })
}

/// Log how the run ended and its final status.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_status.as_ref().map(|s| s.tick),
        "simulation ended"
    );

    if let Some(ref status) = result.final_status {
        info!(
            tick = status.tick,
            settlements = status.settlement_count,
            active_transfers = status.active_transfers,
            conflicts = status.conflict_count,
            objectives = status.objectives.len(),
            overall_score = status.health.overall_score,
            "final system status"
        );
    } else {
        warn!("simulation ended with no ticks executed");
    }
}
