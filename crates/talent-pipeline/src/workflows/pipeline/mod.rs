//! Job application pipeline: per-company stage catalogs, the action capability table,
//! and the transactional executor that moves applications between stages.
//!
//! Every mutating action re-validates against the stored application inside one
//! [`PipelineStore::atomically`] call, appends to the action log (and the stage log when
//! the stage changes), and hands a message to the [`MessageDispatcher`] once committed.

pub mod actions;
pub mod audit;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod executor;
pub mod memory;
pub mod messaging;
pub mod owner;
pub mod resolver;
pub mod router;
pub mod seed;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use actions::{
    ActionCommand, ActionKey, ActionKind, ActionRequest, ActionSubmission, FieldError,
    PipelineAction, ValidationErrors,
};
pub use audit::{write_timeline_csv, ActionLogEntry, ApplicationHistory, StageLogEntry};
pub use catalog::{positions_are_dense, StageCatalog};
pub use domain::{
    default_stage_templates, derive_status, ActorContext, ActorRole, Application,
    ApplicationId, ApplicationStatus, CompanyId, JobId, NewApplication, Owner, Party,
    PipelineStage, StageId, StageTemplate, TerminalFamily, UserId,
};
pub use error::PipelineError;
pub use executor::{ExecutionOutcome, PipelineActionExecutor};
pub use memory::InMemoryPipelineStore;
pub use messaging::{DispatchError, MessageDispatcher, OutboundMessage, Recipient};
pub use owner::StageOwnerResolver;
pub use resolver::PipelineActionResolver;
pub use router::pipeline_router;
pub use seed::{load_stage_seed, parse_stage_seed, StageSeedError};
pub use service::{ActionMenu, PipelineService};
pub use store::{PipelineStore, PipelineTransaction, RepositoryError};
