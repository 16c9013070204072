use std::sync::Arc;

use serde::Serialize;

use super::actions::{ActionKey, ActionRequest, ActionSubmission, PipelineAction};
use super::audit::{record_stage_change, ActionLogEntry, ApplicationHistory, NewStageLogEntry};
use super::catalog::{ensure_stages, StageCatalog};
use super::domain::{
    ActorContext, Application, ApplicationId, ApplicationStatus, NewApplication, Owner, Party,
    PipelineStage, StageId, StageTemplate,
};
use super::error::PipelineError;
use super::executor::{ensure_permitted, ExecutionOutcome, PipelineActionExecutor};
use super::messaging::MessageDispatcher;
use super::owner::StageOwnerResolver;
use super::resolver::PipelineActionResolver;
use super::store::PipelineStore;

/// Actions a caller may take on one application right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionMenu {
    pub application_id: ApplicationId,
    pub stage: String,
    pub status: ApplicationStatus,
    pub actions: Vec<PipelineAction>,
}

/// Facade composing the stage catalog, resolver, and executor for the HTTP layer and CLI.
pub struct PipelineService<S, D> {
    store: Arc<S>,
    catalog: StageCatalog<S>,
    executor: PipelineActionExecutor<S, D>,
    owners: StageOwnerResolver,
    resolver: PipelineActionResolver,
}

impl<S, D> PipelineService<S, D>
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<D>) -> Self {
        Self {
            catalog: StageCatalog::new(Arc::clone(&store)),
            executor: PipelineActionExecutor::new(Arc::clone(&store), dispatcher),
            store,
            owners: StageOwnerResolver,
            resolver: PipelineActionResolver,
        }
    }

    pub fn catalog(&self) -> &StageCatalog<S> {
        &self.catalog
    }

    /// Seed the global stage set used to provision every company.
    pub fn seed_defaults(
        &self,
        templates: &[StageTemplate],
    ) -> Result<Vec<PipelineStage>, PipelineError> {
        self.catalog.seed_defaults(templates)
    }

    /// Create an application at the first active stage of its job owner's pipeline.
    pub fn open_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, PipelineError> {
        self.store.atomically(|tx| -> Result<_, PipelineError> {
            let stages = ensure_stages(tx, application.job_owner)?;
            let initial = stages
                .iter()
                .find(|stage| stage.active && !stage.is_terminal)
                .ok_or_else(|| PipelineError::UnknownStage("initial stage".to_string()))?;

            let created = tx.insert_application(application, initial)?;
            record_stage_change(
                tx,
                NewStageLogEntry {
                    application_id: created.id,
                    from_stage: None,
                    to_stage: created.stage.clone(),
                    changed_by: None,
                },
            )?;

            tracing::info!(
                application_id = %created.id,
                job_id = %created.job_id,
                owner = %created.job_owner,
                stage = %created.stage,
                "application opened"
            );
            Ok(created)
        })
    }

    pub fn application(&self, id: ApplicationId) -> Result<Application, PipelineError> {
        self.store
            .atomically(|tx| -> Result<_, PipelineError> { Ok(tx.application(id)?) })?
            .ok_or(PipelineError::ApplicationNotFound(id))
    }

    /// Legal actions for the caller. Callers with no standing on the application get none.
    pub fn actions_for(
        &self,
        actor: &ActorContext,
        id: ApplicationId,
    ) -> Result<ActionMenu, PipelineError> {
        let application = self.application(id)?;
        let party = actor.party();
        let stages = self.catalog.ensure(self.owners.for_application(&application))?;

        let actions = if actor.may_act(&application, party) {
            self.resolver
                .for_application(&application, &stages, party)?
        } else {
            Vec::new()
        };

        Ok(ActionMenu {
            application_id: application.id,
            stage: application.stage,
            status: application.status,
            actions,
        })
    }

    /// Execute against the latest stored state of the application.
    pub fn execute(
        &self,
        actor: &ActorContext,
        id: ApplicationId,
        request: ActionRequest,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let snapshot = self.application(id)?;
        self.executor.execute(actor, &snapshot, request)
    }

    /// Execute against a snapshot the caller read earlier.
    pub fn execute_against(
        &self,
        actor: &ActorContext,
        snapshot: &Application,
        request: ActionRequest,
    ) -> Result<ExecutionOutcome, PipelineError> {
        self.executor.execute(actor, snapshot, request)
    }

    /// Parse a loosely typed submission and execute it.
    ///
    /// Callers without standing are refused before their payload is inspected, so field
    /// errors are only reported to someone allowed to act.
    pub fn submit(
        &self,
        actor: &ActorContext,
        id: ApplicationId,
        submission: ActionSubmission,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let snapshot = self.application(id)?;
        if let Some(key) = ActionKey::parse(&submission.action) {
            ensure_permitted(actor, &snapshot, key)?;
        }
        let request = ActionRequest::from_submission(submission)?;
        self.executor.execute(actor, &snapshot, request)
    }

    /// Application as seen by a caller with standing on either side.
    pub fn view(&self, actor: &ActorContext, id: ApplicationId) -> Result<Application, PipelineError> {
        let application = self.application(id)?;
        standing(actor, &application)?;
        Ok(application)
    }

    /// Stage catalog the caller manages, provisioned on first access.
    pub fn stages(&self, actor: &ActorContext) -> Result<Vec<PipelineStage>, PipelineError> {
        self.catalog.ensure(self.owners.resolve(actor))
    }

    /// Reorder the caller's company catalog. The global defaults cannot be reordered.
    pub fn reorder(
        &self,
        actor: &ActorContext,
        ordered: &[StageId],
    ) -> Result<Vec<PipelineStage>, PipelineError> {
        match self.owners.resolve(actor) {
            Owner::Company(company) => self.catalog.reorder(company, ordered),
            Owner::Global => Err(PipelineError::Forbidden(
                "only company users can reorder pipeline stages".to_string(),
            )),
        }
    }

    /// Audit trail of an application. The employer side sees everything; the applicant sees
    /// their stage trail and actions minus internal feedback recordings.
    pub fn history(
        &self,
        actor: &ActorContext,
        id: ApplicationId,
    ) -> Result<ApplicationHistory, PipelineError> {
        let application = self.application(id)?;
        let party = standing(actor, &application)?;
        let history = self.store.atomically(|tx| -> Result<_, PipelineError> {
            Ok(ApplicationHistory {
                actions: tx.action_logs(id)?,
                stages: tx.stage_logs(id)?,
            })
        })?;

        Ok(match party {
            Party::Employer => history,
            Party::Applicant => history.without_feedback(),
        })
    }

    /// Interview feedback and test results recorded for an application. Employer side only.
    pub fn feedback(
        &self,
        actor: &ActorContext,
        id: ApplicationId,
    ) -> Result<Vec<ActionLogEntry>, PipelineError> {
        let application = self.application(id)?;
        if !actor.may_act(&application, Party::Employer) {
            return Err(PipelineError::Forbidden(format!(
                "{} may not read feedback on application {}",
                actor.role.label(),
                id
            )));
        }
        Ok(self.history(actor, id)?.feedback())
    }
}

/// Side the caller acts for on `application`, employer first.
fn standing(actor: &ActorContext, application: &Application) -> Result<Party, PipelineError> {
    [Party::Employer, Party::Applicant]
        .into_iter()
        .find(|party| actor.may_act(application, *party))
        .ok_or_else(|| {
            PipelineError::Forbidden(format!(
                "{} has no standing on application {}",
                actor.role.label(),
                application.id
            ))
        })
}
