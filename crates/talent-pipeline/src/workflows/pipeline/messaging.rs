use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::actions::ActionKey;
use super::domain::{ApplicationId, JobId, Owner, UserId};

/// Counterpart addressed by an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "party", rename_all = "snake_case")]
pub enum Recipient {
    Applicant { user_id: UserId },
    /// Whoever staffs the job posting on the employer side.
    Employer { owner: Owner, job_id: JobId },
}

/// Event handed to the messaging collaborator after a committed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub application_id: ApplicationId,
    pub action: ActionKey,
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
}

/// Outbound delivery hook (mail, in-app inbox, SMS adapters).
pub trait MessageDispatcher: Send + Sync {
    fn dispatch(&self, message: OutboundMessage) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("message transport unavailable: {0}")]
    Transport(String),
}

/// Values substituted into `{placeholder}` markers.
pub type TemplateVars = BTreeMap<&'static str, String>;

/// Subject and body used when the caller supplies no custom message.
pub fn default_template(key: ActionKey) -> (&'static str, &'static str) {
    match key {
        ActionKey::MoveNext | ActionKey::Transition => (
            "Your application moved to {stage_name}",
            "Your application for job #{job_id} is now at the {stage_name} stage.{note}",
        ),
        ActionKey::RequestMoreInfo => (
            "Additional information requested",
            "Please provide the following for job #{job_id}: {requested}.{deadline}{note}",
        ),
        ActionKey::ScheduleInterview => (
            "Interview scheduled",
            "Your interview for job #{job_id} is scheduled on {date} at {time}.{location}",
        ),
        ActionKey::RescheduleInterview => (
            "Interview rescheduled",
            "Your interview for job #{job_id} has moved to {date} at {time}.{location}{reason}",
        ),
        ActionKey::SendExamInstructions => (
            "Assessment instructions",
            "Your assessment for job #{job_id} takes place on {exam_date}. {instructions}{link}",
        ),
        ActionKey::RescheduleTest => (
            "Assessment rescheduled",
            "Your assessment for job #{job_id} has moved to {exam_date}.{reason}",
        ),
        ActionKey::SendOffer => (
            "Job offer: {job_title}",
            "We are pleased to offer you the {job_title} position starting {start_date}.{salary}{message}",
        ),
        ActionKey::Hire => (
            "Welcome aboard",
            "Congratulations! You have been hired for job #{job_id}.{start_date}{note}",
        ),
        ActionKey::Reject => (
            "Application update",
            "Thank you for your interest in job #{job_id}. We will not be moving forward with your application.{reason}",
        ),
        ActionKey::RejectWithdraw => (
            "Application withdrawn",
            "Your application for job #{job_id} has been withdrawn by the employer.{reason}",
        ),
        ActionKey::AcceptOffer => (
            "Offer accepted",
            "Applicant #{applicant_id} accepted the offer for job #{job_id}.{note}",
        ),
        ActionKey::DeclineOffer => (
            "Offer declined",
            "Applicant #{applicant_id} declined the offer for job #{job_id}.{reason}",
        ),
        ActionKey::Withdraw => (
            "Application withdrawn by applicant",
            "Applicant #{applicant_id} withdrew from job #{job_id}.{reason}",
        ),
        ActionKey::RecordInterviewFeedback
        | ActionKey::RecordTestResults
        | ActionKey::ViewFeedback => ("Pipeline update", "Application #{application_id} was updated."),
    }
}

/// Replace every `{name}` marker with its value; unknown markers render empty.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Some(value) = vars.get(name) {
                    rendered.push_str(value);
                }
                rest = &after[end + 1..];
            }
            None => {
                rendered.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

/// Render `" Label: value"` for optional trailing details, or nothing.
pub(crate) fn detail(label: &str, value: Option<&str>) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => format!(" {label}: {}", value.trim()),
        _ => String::new(),
    }
}
