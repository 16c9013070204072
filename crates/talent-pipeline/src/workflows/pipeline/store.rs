use super::audit::{ActionLogEntry, NewActionLogEntry, NewStageLogEntry, StageLogEntry};
use super::domain::{
    Application, ApplicationId, NewApplication, Owner, PipelineStage, StageId, StageTemplate,
};

/// Operations available inside one storage transaction.
///
/// Every write made through a transaction becomes visible only when the surrounding
/// [`PipelineStore::atomically`] call returns `Ok`.
pub trait PipelineTransaction {
    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;

    /// Create an application positioned at `initial`.
    fn insert_application(
        &mut self,
        application: NewApplication,
        initial: &PipelineStage,
    ) -> Result<Application, RepositoryError>;

    /// Compare-and-swap write: `application.version` must match the stored row. The stored
    /// copy is returned with its version incremented.
    fn update_application(
        &mut self,
        application: Application,
    ) -> Result<Application, RepositoryError>;

    /// Stages of `owner` ordered by position.
    fn stages(&self, owner: Owner) -> Result<Vec<PipelineStage>, RepositoryError>;

    fn insert_stages(
        &mut self,
        owner: Owner,
        templates: &[StageTemplate],
    ) -> Result<Vec<PipelineStage>, RepositoryError>;

    fn set_positions(
        &mut self,
        owner: Owner,
        positions: &[(StageId, u32)],
    ) -> Result<(), RepositoryError>;

    fn append_action_log(
        &mut self,
        entry: NewActionLogEntry,
    ) -> Result<ActionLogEntry, RepositoryError>;

    fn append_stage_log(
        &mut self,
        entry: NewStageLogEntry,
    ) -> Result<StageLogEntry, RepositoryError>;

    fn action_logs(&self, id: ApplicationId) -> Result<Vec<ActionLogEntry>, RepositoryError>;

    fn stage_logs(&self, id: ApplicationId) -> Result<Vec<StageLogEntry>, RepositoryError>;
}

/// Storage abstraction so the pipeline engine can be exercised in isolation.
pub trait PipelineStore: Send + Sync {
    /// Run `work` as one all-or-nothing unit.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn PipelineTransaction) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("application {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        id: ApplicationId,
        expected: u64,
        found: u64,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
