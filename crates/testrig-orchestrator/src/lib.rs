//! # Testrig Orchestrator
//!
//! Drives a test run through its lifecycle:
//! - environment validation and service startup
//! - the selected phases (unit, integration, benchmark, load)
//! - coverage and report aggregation
//! - cleanup, which runs exactly once on every path

pub mod config;
pub mod environment;
pub mod options;
pub mod orchestrator;
pub mod runner;
pub mod service_config;
pub mod state;

pub use config::OrchestratorConfig;
pub use environment::{validate_environment, EnvironmentReport};
pub use options::{PhaseSelection, RunOptions};
pub use orchestrator::{
    RunSummary, TestOrchestrator, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS,
};
pub use runner::{CoverageArtifacts, PhaseRunner};
pub use service_config::ServiceConfigDocument;
pub use state::{OrchestratorState, StateMachine, StateTransition};
