//! Arbitration, allocation, logistics, and orchestration for the Colonysim
//! multi-settlement economy.
//!
//! The core runs a deterministic tick: settlements report their state
//! through a [`SettlementProvider`], competing requests are arbitrated and
//! shared out, surpluses are shipped to settlements in need, and each
//! settlement picks its next strategic action.
//!
//! # Modules
//!
//! - [`clock`] -- Simulated clock; the only source of time in the core.
//! - [`config`] -- Configuration loading from `colonysim-config.yaml`.
//! - [`context`] -- [`SharedContext`]: mission queue, request tracking, and
//!   the event bus.
//! - [`sequence`] -- Deterministic ID minting.
//! - [`analysis`] -- [`StateAnalyzer`]: derived metrics per settlement.
//! - [`scoring`] -- [`MissionScorer`]: desirability of candidate actions.
//! - [`strategy`] -- [`StrategySelector`]: next action per settlement.
//! - [`settlement`] -- [`SettlementManager`] and the provider seam.
//! - [`arbitration`] -- [`PriorityArbitrator`]: admission limits, conflicts,
//!   and crises.
//! - [`allocation`] -- [`ResourceAllocator`]: fair-share grants and transfer
//!   discovery.
//! - [`logistics`] -- [`LogisticsCoordinator`]: shipment scheduling and
//!   tracking.
//! - [`system_state`] -- [`SystemState`]: totals, health, dependencies, and
//!   objectives.
//! - [`orchestrator`] -- [`SystemOrchestrator`]: the tick driver.
//! - [`runner`] -- Bounded async tick loop.
//! - [`numeric`] -- Unit and ratio conversions.
//!
//! [`SettlementProvider`]: settlement::SettlementProvider
//! [`SharedContext`]: context::SharedContext
//! [`StateAnalyzer`]: analysis::StateAnalyzer
//! [`MissionScorer`]: scoring::MissionScorer
//! [`StrategySelector`]: strategy::StrategySelector
//! [`SettlementManager`]: settlement::SettlementManager
//! [`PriorityArbitrator`]: arbitration::PriorityArbitrator
//! [`ResourceAllocator`]: allocation::ResourceAllocator
//! [`LogisticsCoordinator`]: logistics::LogisticsCoordinator
//! [`SystemState`]: system_state::SystemState
//! [`SystemOrchestrator`]: orchestrator::SystemOrchestrator

pub mod allocation;
pub mod analysis;
pub mod arbitration;
pub mod clock;
pub mod config;
pub mod context;
pub mod logistics;
pub mod numeric;
pub mod orchestrator;
pub mod runner;
pub mod scoring;
pub mod sequence;
pub mod settlement;
pub mod strategy;
pub mod system_state;

pub use config::SimulationConfig;
pub use context::{EventListener, ListenerError, SharedContext};
pub use orchestrator::{OrchestratorError, SystemOrchestrator};
pub use runner::{RunnerError, SimulationResult, TickCallback, run_simulation};
pub use settlement::{InMemorySettlement, SettlementProvider};
