//! Configuration loading and typed config structures for the settlement
//! economy core.
//!
//! The canonical configuration lives in `colonysim-config.yaml` at the
//! project root. Every section is optional; missing fields fall back to the
//! defaults defined here.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::TimeDelta;
use rust_decimal::Decimal;
use serde::Deserialize;

use colonysim_types::{
    Capabilities, CelestialBody, ProductionRate, ResourceKind, RouteClass, SystemSurvey,
};

/// Environment variable overriding `simulation.max_ticks`.
pub const ENV_MAX_TICKS: &str = "COLONYSIM_MAX_TICKS";

/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "COLONYSIM_LOG_LEVEL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {variable}")]
    InvalidOverride {
        /// The environment variable name.
        variable: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `colonysim-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Run length and simulated time.
    #[serde(default)]
    pub simulation: RunConfig,

    /// Priority arbitration limits.
    #[serde(default)]
    pub arbitration: ArbitrationConfig,

    /// Optimal stock levels and transfer pricing.
    #[serde(default)]
    pub economy: EconomyConfig,

    /// Route capacities, transit times, and shipment pricing.
    #[serde(default)]
    pub logistics: LogisticsConfig,

    /// Action selection thresholds.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Seed settlements loaded by the engine binary.
    #[serde(default)]
    pub settlements: Vec<SettlementSeed>,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `COLONYSIM_MAX_TICKS` overrides `simulation.max_ticks`
    /// - `COLONYSIM_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] if an override is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides read through `lookup` (normally the process
    /// environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if `COLONYSIM_MAX_TICKS`
    /// is not an unsigned integer.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_TICKS) {
            self.simulation.max_ticks =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        variable: ENV_MAX_TICKS,
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }
        Ok(())
    }
}

/// Run length and simulated time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Human-readable run name.
    #[serde(default = "default_run_name")]
    pub name: String,

    /// Simulated time at tick 0 (RFC 3339).
    #[serde(default = "default_epoch")]
    pub epoch: String,

    /// Simulated minutes covered by one tick.
    #[serde(default = "default_tick_minutes")]
    pub tick_minutes: u32,

    /// Number of ticks the engine runs before stopping.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Real-time pause between ticks, in milliseconds.
    #[serde(default)]
    pub tick_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: default_run_name(),
            epoch: default_epoch(),
            tick_minutes: default_tick_minutes(),
            max_ticks: default_max_ticks(),
            tick_interval_ms: 0,
        }
    }
}

/// Priority arbitration limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArbitrationConfig {
    /// How long a declared crisis elevates a settlement, in simulated minutes.
    #[serde(default = "default_crisis_window_minutes")]
    pub crisis_window_minutes: u32,

    /// Per-tick admission limit per resource.
    #[serde(default = "default_system_limits")]
    pub system_limits: BTreeMap<ResourceKind, u64>,

    /// Limit for resources absent from `system_limits`.
    #[serde(default = "default_limit")]
    pub default_limit: u64,
}

impl ArbitrationConfig {
    /// Admission limit for `resource`.
    pub fn limit_for(&self, resource: ResourceKind) -> u64 {
        self.system_limits
            .get(&resource)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Crisis window as a duration.
    pub fn crisis_window(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.crisis_window_minutes))
    }
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            crisis_window_minutes: default_crisis_window_minutes(),
            system_limits: default_system_limits(),
            default_limit: default_limit(),
        }
    }
}

/// Optimal stock levels and transfer pricing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EconomyConfig {
    /// Target stock per resource. Resources absent here take no part in gap
    /// and surplus analysis.
    #[serde(default = "default_optimal_levels")]
    pub optimal_levels: BTreeMap<ResourceKind, u64>,

    /// Stock below this fraction of optimal is a gap.
    #[serde(default = "default_gap_ratio")]
    pub gap_ratio: f64,

    /// Stock below this fraction of optimal is a critical gap.
    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,

    /// Stock above this fraction of optimal is a surplus.
    #[serde(default = "default_surplus_ratio")]
    pub surplus_ratio: f64,

    /// Life-support stock below this fraction of optimal is a crisis.
    #[serde(default = "default_crisis_ratio")]
    pub crisis_ratio: f64,

    /// Fixed part of a transfer candidate's cost.
    #[serde(default = "default_transfer_base_cost")]
    pub base_cost: Decimal,

    /// Multiplier on the variable part of a transfer candidate's cost.
    #[serde(default = "default_quantity_scaling")]
    pub quantity_scaling: Decimal,
}

impl EconomyConfig {
    /// Optimal level for `resource`, if it is tracked.
    pub fn optimal_level(&self, resource: ResourceKind) -> Option<u64> {
        self.optimal_levels.get(&resource).copied()
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            optimal_levels: default_optimal_levels(),
            gap_ratio: default_gap_ratio(),
            critical_ratio: default_critical_ratio(),
            surplus_ratio: default_surplus_ratio(),
            crisis_ratio: default_crisis_ratio(),
            base_cost: default_transfer_base_cost(),
            quantity_scaling: default_quantity_scaling(),
        }
    }
}

/// Per route-class numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RouteClassTable {
    /// Both settlements on one body.
    pub same_body: u64,
    /// Planet and one of its moons.
    pub planet_moon: u64,
    /// Everything else.
    pub inter_body: u64,
}

impl RouteClassTable {
    /// Value for `class`.
    pub const fn get(&self, class: RouteClass) -> u64 {
        match class {
            RouteClass::SameBody => self.same_body,
            RouteClass::PlanetMoon => self.planet_moon,
            RouteClass::InterBody => self.inter_body,
        }
    }
}

/// Route capacities, transit times, and shipment pricing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogisticsConfig {
    /// Maximum units per shipment.
    #[serde(default = "default_capacities")]
    pub capacities: RouteClassTable,

    /// Transit time in simulated minutes.
    #[serde(default = "default_transit_minutes")]
    pub transit_minutes: RouteClassTable,

    /// Shipments in flight per route before new ones queue.
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,

    /// Gap between a queued shipment's start and the completion it waits on.
    #[serde(default = "default_congestion_delay_minutes")]
    pub congestion_delay_minutes: u32,

    /// Fixed part of a shipment's cost.
    #[serde(default = "default_shipment_base_cost")]
    pub base_cost: Decimal,

    /// Cost per unit shipped.
    #[serde(default = "default_per_unit_cost")]
    pub per_unit_cost: Decimal,
}

impl LogisticsConfig {
    /// Maximum units per shipment on a route of `class`.
    pub const fn capacity(&self, class: RouteClass) -> u64 {
        self.capacities.get(class)
    }

    /// Transit duration on a route of `class`.
    pub fn transit(&self, class: RouteClass) -> TimeDelta {
        let minutes = i64::try_from(self.transit_minutes.get(class)).unwrap_or(i64::MAX);
        TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::MAX)
    }

    /// Congestion delay as a duration.
    pub fn congestion_delay(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.congestion_delay_minutes))
    }
}

impl Default for LogisticsConfig {
    fn default() -> Self {
        Self {
            capacities: default_capacities(),
            transit_minutes: default_transit_minutes(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
            congestion_delay_minutes: default_congestion_delay_minutes(),
            base_cost: default_shipment_base_cost(),
            per_unit_cost: default_per_unit_cost(),
        }
    }
}

/// Action selection thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategyConfig {
    /// Minimum acquisition capability for resource acquisition.
    #[serde(default = "default_acquisition_threshold")]
    pub acquisition_threshold: f64,

    /// Minimum scouting capability for system scouting.
    #[serde(default = "default_scouting_threshold")]
    pub scouting_threshold: f64,

    /// Minimum expansion readiness for settlement expansion to be viable.
    #[serde(default = "default_expansion_threshold")]
    pub expansion_threshold: f64,

    /// Minimum building capability for infrastructure building.
    #[serde(default = "default_building_threshold")]
    pub building_threshold: f64,

    /// Expansion readiness at which expansion becomes a candidate.
    #[serde(default = "default_expansion_candidate_readiness")]
    pub expansion_candidate_readiness: f64,

    /// Construction material stock below which the material is needed.
    #[serde(default = "default_material_stock_threshold")]
    pub material_stock_threshold: u64,

    /// Units requested per resource by an acquisition action.
    #[serde(default = "default_acquisition_quantity")]
    pub acquisition_quantity: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            acquisition_threshold: default_acquisition_threshold(),
            scouting_threshold: default_scouting_threshold(),
            expansion_threshold: default_expansion_threshold(),
            building_threshold: default_building_threshold(),
            expansion_candidate_readiness: default_expansion_candidate_readiness(),
            material_stock_threshold: default_material_stock_threshold(),
            acquisition_quantity: default_acquisition_quantity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// A settlement the engine seeds at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SettlementSeed {
    /// Display name.
    pub name: String,

    /// Body the settlement sits on.
    pub body: CelestialBody,

    /// Starting inventory.
    #[serde(default)]
    pub inventory: BTreeMap<ResourceKind, u64>,

    /// Starting population.
    #[serde(default)]
    pub population: u64,

    /// Habitat capacity.
    #[serde(default)]
    pub population_capacity: u64,

    /// Whether the power grid starts online.
    #[serde(default = "default_true")]
    pub power_online: bool,

    /// Production and consumption per resource.
    #[serde(default)]
    pub production: BTreeMap<ResourceKind, ProductionRate>,

    /// Capability flags.
    #[serde(default)]
    pub capabilities: Capabilities,

    /// Positional advantage, 0 to 1.
    #[serde(default)]
    pub location_advantage: f64,

    /// Known star systems.
    #[serde(default)]
    pub known_systems: Vec<SystemSurvey>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_run_name() -> String {
    "colonysim".to_owned()
}

fn default_epoch() -> String {
    "2150-01-01T00:00:00Z".to_owned()
}

const fn default_tick_minutes() -> u32 {
    60
}

const fn default_max_ticks() -> u64 {
    24
}

const fn default_crisis_window_minutes() -> u32 {
    60
}

fn default_system_limits() -> BTreeMap<ResourceKind, u64> {
    BTreeMap::from([
        (ResourceKind::Energy, 1000),
        (ResourceKind::Minerals, 800),
        (ResourceKind::Food, 600),
        (ResourceKind::Water, 700),
        (ResourceKind::Steel, 400),
        (ResourceKind::Electronics, 200),
    ])
}

const fn default_limit() -> u64 {
    500
}

fn default_optimal_levels() -> BTreeMap<ResourceKind, u64> {
    BTreeMap::from([
        (ResourceKind::Minerals, 100),
        (ResourceKind::Energy, 100),
        (ResourceKind::Food, 100),
        (ResourceKind::Water, 100),
        (ResourceKind::Steel, 50),
        (ResourceKind::Electronics, 30),
    ])
}

const fn default_gap_ratio() -> f64 {
    0.7
}

const fn default_critical_ratio() -> f64 {
    0.3
}

const fn default_surplus_ratio() -> f64 {
    1.2
}

const fn default_crisis_ratio() -> f64 {
    0.1
}

const fn default_transfer_base_cost() -> Decimal {
    Decimal::TEN
}

const fn default_quantity_scaling() -> Decimal {
    Decimal::TEN
}

const fn default_capacities() -> RouteClassTable {
    RouteClassTable {
        same_body: 1000,
        planet_moon: 500,
        inter_body: 200,
    }
}

const fn default_transit_minutes() -> RouteClassTable {
    RouteClassTable {
        same_body: 10,
        planet_moon: 120,
        inter_body: 259_200,
    }
}

const fn default_max_concurrent_transfers() -> usize {
    5
}

const fn default_congestion_delay_minutes() -> u32 {
    60
}

const fn default_shipment_base_cost() -> Decimal {
    Decimal::from_parts(50, 0, 0, false, 0)
}

const fn default_per_unit_cost() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 1)
}

const fn default_acquisition_threshold() -> f64 {
    0.3
}

const fn default_scouting_threshold() -> f64 {
    0.5
}

const fn default_expansion_threshold() -> f64 {
    0.7
}

const fn default_building_threshold() -> f64 {
    0.4
}

const fn default_expansion_candidate_readiness() -> f64 {
    0.8
}

const fn default_material_stock_threshold() -> u64 {
    500
}

const fn default_acquisition_quantity() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
