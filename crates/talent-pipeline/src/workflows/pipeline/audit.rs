use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::actions::ActionKey;
use super::domain::{ApplicationId, UserId};
use super::store::{PipelineTransaction, RepositoryError};

/// One row per action attempt that reached the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: u64,
    pub application_id: ApplicationId,
    pub user_id: Option<UserId>,
    pub action_key: String,
    pub event: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActionLogEntry {
    pub application_id: ApplicationId,
    pub user_id: Option<UserId>,
    pub action_key: String,
    pub event: String,
    pub payload: Value,
}

/// One row per realized stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLogEntry {
    pub id: u64,
    pub application_id: ApplicationId,
    pub from_stage: Option<String>,
    pub to_stage: String,
    pub changed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStageLogEntry {
    pub application_id: ApplicationId,
    pub from_stage: Option<String>,
    pub to_stage: String,
    pub changed_by: Option<UserId>,
}

/// Append an action entry inside the caller's transaction.
pub fn record_action(
    tx: &mut dyn PipelineTransaction,
    entry: NewActionLogEntry,
) -> Result<ActionLogEntry, RepositoryError> {
    let stored = tx.append_action_log(entry)?;
    tracing::debug!(
        application_id = %stored.application_id,
        action = %stored.action_key,
        event = %stored.event,
        "action log appended"
    );
    Ok(stored)
}

/// Append a stage transition inside the caller's transaction.
pub fn record_stage_change(
    tx: &mut dyn PipelineTransaction,
    entry: NewStageLogEntry,
) -> Result<StageLogEntry, RepositoryError> {
    let stored = tx.append_stage_log(entry)?;
    tracing::debug!(
        application_id = %stored.application_id,
        from = stored.from_stage.as_deref().unwrap_or("-"),
        to = %stored.to_stage,
        "stage log appended"
    );
    Ok(stored)
}

/// Both audit trails of a single application, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationHistory {
    pub actions: Vec<ActionLogEntry>,
    pub stages: Vec<StageLogEntry>,
}

impl ApplicationHistory {
    /// Stage implied by the stage trail.
    pub fn current_stage(&self) -> Option<&str> {
        self.stages.last().map(|entry| entry.to_stage.as_str())
    }

    /// The same history with internal feedback recordings removed.
    pub fn without_feedback(mut self) -> Self {
        self.actions.retain(|entry| {
            !ActionKey::parse(&entry.action_key).is_some_and(ActionKey::records_feedback)
        });
        self
    }

    /// Entries written by the internal feedback-recording actions.
    pub fn feedback(&self) -> Vec<ActionLogEntry> {
        self.actions
            .iter()
            .filter(|entry| {
                ActionKey::parse(&entry.action_key).is_some_and(ActionKey::records_feedback)
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct TimelineRow<'a> {
    #[serde(rename = "Entry ID")]
    id: u64,
    #[serde(rename = "Application ID")]
    application_id: u64,
    #[serde(rename = "User ID")]
    user_id: Option<u64>,
    #[serde(rename = "Action")]
    action_key: &'a str,
    #[serde(rename = "Event")]
    event: &'a str,
    #[serde(rename = "Payload")]
    payload: String,
    #[serde(rename = "Created At")]
    created_at: String,
}

/// Export an action timeline for analytics tooling.
pub fn write_timeline_csv<W: Write>(
    writer: W,
    entries: &[ActionLogEntry],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in entries {
        csv_writer.serialize(TimelineRow {
            id: entry.id,
            application_id: entry.application_id.0,
            user_id: entry.user_id.map(|user| user.0),
            action_key: &entry.action_key,
            event: &entry.event,
            payload: entry.payload.to_string(),
            created_at: entry.created_at.to_rfc3339(),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
