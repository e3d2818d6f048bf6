//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the run so
//! that `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: colonysim_core::config::ConfigError,
    },

    /// Orchestrator setup or settlement registration failed.
    #[error("orchestrator error: {source}")]
    Orchestrator {
        /// The underlying orchestrator error.
        #[from]
        source: colonysim_core::OrchestratorError,
    },

    /// The tick loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: colonysim_core::RunnerError,
    },

    /// The logging filter could not be built.
    #[error("invalid log filter {filter:?}: {message}")]
    LogFilter {
        /// The rejected filter directive.
        filter: String,
        /// Parser message.
        message: String,
    },
}
