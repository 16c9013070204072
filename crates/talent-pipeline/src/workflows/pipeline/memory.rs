use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;

use super::audit::{ActionLogEntry, NewActionLogEntry, NewStageLogEntry, StageLogEntry};
use super::domain::{
    derive_status, Application, ApplicationId, NewApplication, Owner, PipelineStage, StageId,
    StageTemplate,
};
use super::store::{PipelineStore, PipelineTransaction, RepositoryError};

/// Process-local store. A transaction reads the shared state directly and copies it on its
/// first write; the copy replaces the shared state only on success, so failed work leaves
/// nothing behind.
#[derive(Debug, Default)]
pub struct InMemoryPipelineStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    applications: BTreeMap<ApplicationId, Application>,
    stages: Vec<PipelineStage>,
    action_logs: Vec<ActionLogEntry>,
    stage_logs: Vec<StageLogEntry>,
    application_sequence: u64,
    stage_sequence: u64,
    action_log_sequence: u64,
    stage_log_sequence: u64,
}

fn next_id(sequence: &mut u64) -> u64 {
    *sequence += 1;
    *sequence
}

impl PipelineStore for InMemoryPipelineStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn PipelineTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self.state.lock().map_err(|_| {
            E::from(RepositoryError::Unavailable(
                "pipeline store mutex poisoned".to_string(),
            ))
        })?;

        let (value, written) = {
            let mut tx = CopyOnWrite::new(&guard);
            let value = work(&mut tx)?;
            (value, tx.written)
        };
        if let Some(state) = written {
            *guard = state;
        }
        Ok(value)
    }
}

/// Transaction view over the committed state; reads are served from the working copy once
/// one exists.
struct CopyOnWrite<'a> {
    committed: &'a StoreState,
    written: Option<StoreState>,
}

impl<'a> CopyOnWrite<'a> {
    fn new(committed: &'a StoreState) -> Self {
        Self {
            committed,
            written: None,
        }
    }

    fn current(&self) -> &StoreState {
        self.written.as_ref().unwrap_or(self.committed)
    }

    fn working(&mut self) -> &mut StoreState {
        let committed = self.committed;
        self.written.get_or_insert_with(|| committed.clone())
    }
}

impl PipelineTransaction for CopyOnWrite<'_> {
    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.current().application(id)
    }

    fn insert_application(
        &mut self,
        application: NewApplication,
        initial: &PipelineStage,
    ) -> Result<Application, RepositoryError> {
        self.working().insert_application(application, initial)
    }

    fn update_application(
        &mut self,
        application: Application,
    ) -> Result<Application, RepositoryError> {
        self.working().update_application(application)
    }

    fn stages(&self, owner: Owner) -> Result<Vec<PipelineStage>, RepositoryError> {
        self.current().stages(owner)
    }

    fn insert_stages(
        &mut self,
        owner: Owner,
        templates: &[StageTemplate],
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        self.working().insert_stages(owner, templates)
    }

    fn set_positions(
        &mut self,
        owner: Owner,
        positions: &[(StageId, u32)],
    ) -> Result<(), RepositoryError> {
        self.working().set_positions(owner, positions)
    }

    fn append_action_log(
        &mut self,
        entry: NewActionLogEntry,
    ) -> Result<ActionLogEntry, RepositoryError> {
        self.working().append_action_log(entry)
    }

    fn append_stage_log(
        &mut self,
        entry: NewStageLogEntry,
    ) -> Result<StageLogEntry, RepositoryError> {
        self.working().append_stage_log(entry)
    }

    fn action_logs(&self, id: ApplicationId) -> Result<Vec<ActionLogEntry>, RepositoryError> {
        self.current().action_logs(id)
    }

    fn stage_logs(&self, id: ApplicationId) -> Result<Vec<StageLogEntry>, RepositoryError> {
        self.current().stage_logs(id)
    }
}

impl PipelineTransaction for StoreState {
    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.applications.get(&id).cloned())
    }

    fn insert_application(
        &mut self,
        application: NewApplication,
        initial: &PipelineStage,
    ) -> Result<Application, RepositoryError> {
        let id = ApplicationId(next_id(&mut self.application_sequence));
        let now = Utc::now();
        let record = Application {
            id,
            job_id: application.job_id,
            job_owner: application.job_owner,
            applicant_id: application.applicant_id,
            stage: initial.slug.clone(),
            status: derive_status(&initial.slug, initial.is_terminal),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.applications.insert(id, record.clone());
        Ok(record)
    }

    fn update_application(
        &mut self,
        mut application: Application,
    ) -> Result<Application, RepositoryError> {
        let stored = self
            .applications
            .get_mut(&application.id)
            .ok_or(RepositoryError::NotFound)?;

        if stored.version != application.version {
            return Err(RepositoryError::VersionConflict {
                id: application.id,
                expected: application.version,
                found: stored.version,
            });
        }

        application.version += 1;
        application.updated_at = Utc::now();
        *stored = application.clone();
        Ok(application)
    }

    fn stages(&self, owner: Owner) -> Result<Vec<PipelineStage>, RepositoryError> {
        let mut stages: Vec<PipelineStage> = self
            .stages
            .iter()
            .filter(|stage| stage.owner == owner)
            .cloned()
            .collect();
        stages.sort_by_key(|stage| (stage.position, stage.id));
        Ok(stages)
    }

    fn insert_stages(
        &mut self,
        owner: Owner,
        templates: &[StageTemplate],
    ) -> Result<Vec<PipelineStage>, RepositoryError> {
        let mut slugs: HashSet<String> = self
            .stages
            .iter()
            .filter(|stage| stage.owner == owner)
            .map(|stage| stage.slug.clone())
            .collect();

        let mut inserted = Vec::with_capacity(templates.len());
        for template in templates {
            if !slugs.insert(template.slug.clone()) {
                return Err(RepositoryError::Conflict(format!(
                    "stage '{}' already exists for {owner}",
                    template.slug
                )));
            }

            let stage = PipelineStage {
                id: StageId(next_id(&mut self.stage_sequence)),
                owner,
                slug: template.slug.clone(),
                name: template.name.clone(),
                position: template.position,
                is_terminal: template.is_terminal,
                active: template.active,
            };
            self.stages.push(stage.clone());
            inserted.push(stage);
        }

        Ok(inserted)
    }

    fn set_positions(
        &mut self,
        owner: Owner,
        positions: &[(StageId, u32)],
    ) -> Result<(), RepositoryError> {
        for (id, position) in positions {
            let stage = self
                .stages
                .iter_mut()
                .find(|stage| stage.owner == owner && stage.id == *id)
                .ok_or(RepositoryError::NotFound)?;
            stage.position = *position;
        }
        Ok(())
    }

    fn append_action_log(
        &mut self,
        entry: NewActionLogEntry,
    ) -> Result<ActionLogEntry, RepositoryError> {
        let stored = ActionLogEntry {
            id: next_id(&mut self.action_log_sequence),
            application_id: entry.application_id,
            user_id: entry.user_id,
            action_key: entry.action_key,
            event: entry.event,
            payload: entry.payload,
            created_at: Utc::now(),
        };
        self.action_logs.push(stored.clone());
        Ok(stored)
    }

    fn append_stage_log(
        &mut self,
        entry: NewStageLogEntry,
    ) -> Result<StageLogEntry, RepositoryError> {
        let stored = StageLogEntry {
            id: next_id(&mut self.stage_log_sequence),
            application_id: entry.application_id,
            from_stage: entry.from_stage,
            to_stage: entry.to_stage,
            changed_by: entry.changed_by,
            created_at: Utc::now(),
        };
        self.stage_logs.push(stored.clone());
        Ok(stored)
    }

    fn action_logs(&self, id: ApplicationId) -> Result<Vec<ActionLogEntry>, RepositoryError> {
        Ok(self
            .action_logs
            .iter()
            .filter(|entry| entry.application_id == id)
            .cloned()
            .collect())
    }

    fn stage_logs(&self, id: ApplicationId) -> Result<Vec<StageLogEntry>, RepositoryError> {
        Ok(self
            .stage_logs
            .iter()
            .filter(|entry| entry.application_id == id)
            .cloned()
            .collect())
    }
}
