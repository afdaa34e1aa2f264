//! The plan pipeline: a table of generation stages, the executor that runs them from the
//! task queue, the request-facing orchestrator that schedules them, and the readiness gate
//! pollers use to see how far a plan has come.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod readiness;
pub mod stage;

pub use config::CraftConfig;
pub use error::PipelineError;
pub use orchestrator::{AssemblyProcedure, PipelineOrchestrator};
pub use readiness::ReadinessGate;
pub use stage::{Stage, StageInput, StageRunner, STAGES};
