use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::config::AppEnvironment;
use crate::workflows::pipeline::actions::{ActionCommand, ActionRequest, ClosureDetails};
use crate::workflows::pipeline::audit::{
    ActionLogEntry, NewActionLogEntry, NewStageLogEntry, StageLogEntry,
};
use crate::workflows::pipeline::domain::{
    default_stage_templates, ActorContext, Application, ApplicationId, CompanyId, JobId,
    NewApplication, Owner, PipelineStage, StageId, StageTemplate, UserId,
};
use crate::workflows::pipeline::memory::InMemoryPipelineStore;
use crate::workflows::pipeline::messaging::{DispatchError, MessageDispatcher, OutboundMessage};
use crate::workflows::pipeline::service::PipelineService;
use crate::workflows::pipeline::store::{PipelineStore, PipelineTransaction, RepositoryError};
use crate::workflows::pipeline::router::pipeline_router;

pub(super) const COMPANY: CompanyId = CompanyId(40);
pub(super) const RECRUITER: UserId = UserId(7);
pub(super) const APPLICANT: UserId = UserId(501);

pub(super) fn recruiter() -> ActorContext {
    ActorContext::company(RECRUITER, COMPANY)
}

pub(super) fn applicant() -> ActorContext {
    ActorContext::graduate(APPLICANT)
}

pub(super) fn new_application() -> NewApplication {
    NewApplication {
        job_id: JobId(88),
        job_owner: Owner::Company(COMPANY),
        applicant_id: APPLICANT,
    }
}

pub(super) fn seeded_store() -> Arc<InMemoryPipelineStore> {
    let store = Arc::new(InMemoryPipelineStore::default());
    store
        .atomically(|tx| tx.insert_stages(Owner::Global, &default_stage_templates()))
        .expect("defaults seed");
    store
}

pub(super) type TestService = PipelineService<InMemoryPipelineStore, RecordingDispatcher>;

pub(super) fn build_service() -> (
    TestService,
    Arc<InMemoryPipelineStore>,
    Arc<RecordingDispatcher>,
) {
    let store = seeded_store();
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = PipelineService::new(store.clone(), dispatcher.clone());
    (service, store, dispatcher)
}

/// Open an application and walk it forward with `move_next` until it reaches `slug`.
pub(super) fn application_at<S, D>(service: &PipelineService<S, D>, slug: &str) -> Application
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    let mut application = service
        .open_application(new_application())
        .expect("application opens");
    while application.stage != slug {
        application = service
            .execute(
                &recruiter(),
                application.id,
                ActionRequest::new(ActionCommand::MoveNext { note: None }),
            )
            .expect("move_next succeeds")
            .application;
    }
    application
}

pub(super) fn reject_request() -> ActionRequest {
    ActionRequest::new(ActionCommand::Reject(ClosureDetails {
        reason: Some("Position filled".to_string()),
    }))
}

pub(super) fn log_counts(store: &InMemoryPipelineStore, id: ApplicationId) -> (usize, usize) {
    store
        .atomically(|tx| -> Result<_, RepositoryError> {
            Ok((tx.action_logs(id)?.len(), tx.stage_logs(id)?.len()))
        })
        .expect("logs readable")
}

pub(super) fn stored_application(store: &InMemoryPipelineStore, id: ApplicationId) -> Application {
    store
        .atomically(|tx| tx.application(id))
        .expect("application readable")
        .expect("application present")
}

pub(super) fn stage_ids(stages: &[PipelineStage]) -> Vec<StageId> {
    stages.iter().map(|stage| stage.id).collect()
}

pub(super) fn templates_of(stages: &[PipelineStage]) -> Vec<StageTemplate> {
    stages.iter().map(StageTemplate::from).collect()
}

#[derive(Default)]
pub(super) struct RecordingDispatcher {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingDispatcher {
    pub(super) fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .expect("dispatcher mutex poisoned")
            .clone()
    }
}

impl MessageDispatcher for RecordingDispatcher {
    fn dispatch(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        self.messages
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(message);
        Ok(())
    }
}

pub(super) struct OfflineDispatcher;

impl MessageDispatcher for OfflineDispatcher {
    fn dispatch(&self, _message: OutboundMessage) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("smtp relay offline".to_string()))
    }
}

/// Write that [`FailingStore`] refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FailurePoint {
    ActionLog,
    StageLog,
    Positions,
}

/// Wraps the in-memory store and fails one kind of write once `armed` is set.
pub(super) struct FailingStore {
    inner: InMemoryPipelineStore,
    fail_on: FailurePoint,
    armed: Mutex<bool>,
}

impl FailingStore {
    pub(super) fn new(fail_on: FailurePoint) -> Self {
        let inner = InMemoryPipelineStore::default();
        inner
            .atomically(|tx| tx.insert_stages(Owner::Global, &default_stage_templates()))
            .expect("defaults seed");
        Self {
            inner,
            fail_on,
            armed: Mutex::new(false),
        }
    }

    pub(super) fn arm(&self) {
        *self.armed.lock().expect("arm mutex poisoned") = true;
    }

    fn is_armed(&self) -> bool {
        *self.armed.lock().expect("arm mutex poisoned")
    }
}

impl PipelineStore for FailingStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn PipelineTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let fail_on = self.is_armed().then_some(self.fail_on);
        self.inner.atomically(|tx| {
            let mut failing = FailingTransaction { inner: tx, fail_on };
            work(&mut failing)
        })
    }
}

struct FailingTransaction<'a> {
    inner: &'a mut dyn PipelineTransaction,
    fail_on: Option<FailurePoint>,
}

impl FailingTransaction<'_> {
    fn check(&self, point: FailurePoint) -> Result<(), RepositoryError> {
        if self.fail_on == Some(point) {
            return Err(RepositoryError::Unavailable(format!("{point:?} write refused")));
        }
        Ok(())
    }
}

impl PipelineTransaction for FailingTransaction<'_> {
    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.inner.application(id)
    }

    fn insert_application(
        &mut self,
        application: NewApplication,
        initial: &PipelineStage,
    ) -> Result<Application, RepositoryError> {
        self.inner.insert_application(application, initial)
    }

    fn update_application(
        &mut self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        self.inner.update_application(application)
    }

    fn stages(&self, owner: Owner) -> Result<Vec<PipelineStage>, RepositoryError> {
        self.inner.stages(owner)
    }

    fn insert_stages(
        &mut self,
        owner: Owner,
        templates: &[StageTemplate],
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        self.inner.insert_stages(owner, templates)
    }

    fn set_positions(
        &mut self,
        owner: Owner,
        positions: &[(StageId, u32)],
    ) -> Result<(), RepositoryError> {
        self.inner.set_positions(owner, positions)?;
        self.check(FailurePoint::Positions)
    }

    fn append_action_log(
        &mut self,
        entry: NewActionLogEntry,
    ) -> Result<ActionLogEntry, RepositoryError> {
        self.check(FailurePoint::ActionLog)?;
        self.inner.append_action_log(entry)
    }

    fn append_stage_log(
        &mut self,
        entry: NewStageLogEntry,
    ) -> Result<StageLogEntry, RepositoryError> {
        self.check(FailurePoint::StageLog)?;
        self.inner.append_stage_log(entry)
    }

    fn action_logs(&self, id: ApplicationId) -> Result<Vec<ActionLogEntry>, RepositoryError> {
        self.inner.action_logs(id)
    }

    fn stage_logs(&self, id: ApplicationId) -> Result<Vec<StageLogEntry>, RepositoryError> {
        self.inner.stage_logs(id)
    }
}

pub(super) fn router_for(service: TestService) -> axum::Router {
    pipeline_router(Arc::new(service), AppEnvironment::Test)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
