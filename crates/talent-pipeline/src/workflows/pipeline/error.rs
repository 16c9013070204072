use super::actions::ValidationErrors;
use super::domain::{ApplicationId, StageId};
use super::store::RepositoryError;

/// Error raised by the pipeline engine.
///
/// Everything except `Storage` is detected before the first write of a call.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    ValidationFailed(ValidationErrors),
    #[error("stage '{0}' does not exist in this pipeline")]
    UnknownStage(String),
    #[error("application is at terminal stage '{stage}' and cannot move")]
    TerminalStageViolation { stage: String },
    #[error("submitted order does not match the current stage set (missing {missing:?}, unexpected {unexpected:?}, duplicated {duplicated:?})")]
    StageSetMismatch {
        missing: Vec<StageId>,
        unexpected: Vec<StageId>,
        duplicated: Vec<StageId>,
    },
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("application {id} changed since it was read (current stage '{stage}')")]
    StaleApplication { id: ApplicationId, stage: String },
    #[error("global default stages have not been seeded")]
    MissingDefaults,
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl PipelineError {
    /// Errors a client can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PipelineError::Storage(_) | PipelineError::MissingDefaults)
    }
}
