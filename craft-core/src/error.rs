use craft_infer::GenerationError;
use craft_manual::ManualError;
use craft_sched::SchedError;
use craft_store::StoreError;
use craft_types::{GeometryError, JoinError, PlanId, StageKind, StepError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid plan id: {0}")]
    InvalidPlanId(String),
    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),
    #[error("{what} for plan {plan} is not available yet")]
    NotReady { plan: PlanId, what: String },
    #[error("procedure number must be 1 or greater, got {0}")]
    InvalidProcedure(i64),
    #[error("procedure number {requested} exceeds the {count} assembly steps")]
    ProcedureOutOfRange { requested: i64, count: usize },
    #[error("no part geometry found for assembly step {0}")]
    NoGeometry(u32),
    #[error("{stage}: missing input {input}")]
    MissingInput { stage: StageKind, input: String },
    #[error("{stage}: unexpected output shape: {detail}")]
    InvalidOutput { stage: StageKind, detail: String },
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Steps(#[from] StepError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Manual(#[from] ManualError),
    #[error(transparent)]
    Queue(#[from] SchedError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Errors caused by the caller's request rather than by the pipeline or storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidPlanId(_)
                | PipelineError::UnsupportedImage(_)
                | PipelineError::NotReady { .. }
                | PipelineError::InvalidProcedure(_)
                | PipelineError::ProcedureOutOfRange { .. }
                | PipelineError::NoGeometry(_)
        )
    }

    /// Client errors that name something absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::NotReady { .. } | PipelineError::NoGeometry(_)
        )
    }
}
