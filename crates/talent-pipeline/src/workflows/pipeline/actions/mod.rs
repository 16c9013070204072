//! Action vocabulary shared by the resolver and the executor.
//!
//! [`ActionKey`] names every operation the pipeline understands, [`PipelineAction`] is what
//! the resolver hands to clients, and [`ActionRequest`] is the validated, strongly typed form
//! of a submitted action that the executor consumes.

mod payload;
mod request;

pub use payload::{
    ClosureDetails, ExamInstructions, ExamReschedule, FieldError, HireDetails, InterviewFeedback,
    InterviewSchedule, MoreInfoRequest, OfferDetails, TestResults, ValidationErrors,
};
pub use request::{ActionCommand, ActionRequest, ActionSubmission};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::domain::Party;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    MoveNext,
    Transition,
    RequestMoreInfo,
    ScheduleInterview,
    RescheduleInterview,
    RecordInterviewFeedback,
    SendExamInstructions,
    RecordTestResults,
    RescheduleTest,
    SendOffer,
    Hire,
    Reject,
    RejectWithdraw,
    AcceptOffer,
    DeclineOffer,
    Withdraw,
    ViewFeedback,
}

impl ActionKey {
    pub const ALL: [Self; 17] = [
        Self::MoveNext,
        Self::Transition,
        Self::RequestMoreInfo,
        Self::ScheduleInterview,
        Self::RescheduleInterview,
        Self::RecordInterviewFeedback,
        Self::SendExamInstructions,
        Self::RecordTestResults,
        Self::RescheduleTest,
        Self::SendOffer,
        Self::Hire,
        Self::Reject,
        Self::RejectWithdraw,
        Self::AcceptOffer,
        Self::DeclineOffer,
        Self::Withdraw,
        Self::ViewFeedback,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MoveNext => "move_next",
            Self::Transition => "transition",
            Self::RequestMoreInfo => "request_more_info",
            Self::ScheduleInterview => "schedule_interview",
            Self::RescheduleInterview => "reschedule_interview",
            Self::RecordInterviewFeedback => "record_interview_feedback",
            Self::SendExamInstructions => "send_exam_instructions",
            Self::RecordTestResults => "record_test_results",
            Self::RescheduleTest => "reschedule_test",
            Self::SendOffer => "send_offer",
            Self::Hire => "hire",
            Self::Reject => "reject",
            Self::RejectWithdraw => "reject_withdraw",
            Self::AcceptOffer => "accept_offer",
            Self::DeclineOffer => "decline_offer",
            Self::Withdraw => "withdraw",
            Self::ViewFeedback => "view_feedback",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|key| key.as_str() == raw)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::MoveNext => "Move to next stage",
            Self::Transition => "Move to stage",
            Self::RequestMoreInfo => "Request more information",
            Self::ScheduleInterview => "Schedule interview",
            Self::RescheduleInterview => "Reschedule interview",
            Self::RecordInterviewFeedback => "Record interview feedback",
            Self::SendExamInstructions => "Send exam instructions",
            Self::RecordTestResults => "Record test results",
            Self::RescheduleTest => "Reschedule test",
            Self::SendOffer => "Send offer",
            Self::Hire => "Hire",
            Self::Reject => "Reject",
            Self::RejectWithdraw => "Withdraw application",
            Self::AcceptOffer => "Accept offer",
            Self::DeclineOffer => "Decline offer",
            Self::Withdraw => "Withdraw",
            Self::ViewFeedback => "View feedback",
        }
    }

    pub const fn kind(self) -> ActionKind {
        match self {
            Self::MoveNext | Self::Transition => ActionKind::Transition,
            Self::ViewFeedback => ActionKind::Query,
            _ => ActionKind::Action,
        }
    }

    /// Side of the relationship entitled to perform the action.
    pub const fn party(self) -> Party {
        match self {
            Self::AcceptOffer | Self::DeclineOffer | Self::Withdraw => Party::Applicant,
            _ => Party::Employer,
        }
    }

    /// Internal actions are recorded but never messaged to the counterpart.
    pub const fn is_internal(self) -> bool {
        matches!(
            self,
            Self::RecordInterviewFeedback | Self::RecordTestResults | Self::ViewFeedback
        )
    }

    pub const fn records_feedback(self) -> bool {
        matches!(self, Self::RecordInterviewFeedback | Self::RecordTestResults)
    }

    /// Field hints rendered by clients next to the action button.
    pub fn payload_template(self) -> Option<Value> {
        let template = match self {
            Self::MoveNext | Self::AcceptOffer => json!({ "note": "optional" }),
            Self::Transition => json!({ "to": "stage slug", "note": "optional" }),
            Self::RequestMoreInfo => json!({
                "requested": ["document or field name"],
                "note": "optional",
                "deadline": "optional YYYY-MM-DD",
            }),
            Self::ScheduleInterview => json!({
                "date": "YYYY-MM-DD",
                "time": "HH:MM",
                "receiver": "user id",
                "location": "optional",
            }),
            Self::RescheduleInterview => json!({
                "date": "YYYY-MM-DD",
                "time": "HH:MM",
                "receiver": "user id",
                "reason": "optional",
            }),
            Self::RecordInterviewFeedback => json!({
                "rating": "1-5",
                "feedback": "text",
                "recommendation": "optional",
            }),
            Self::SendExamInstructions => json!({
                "exam_date": "YYYY-MM-DD",
                "instructions": "text",
                "receiver": "user id",
                "link": "optional",
            }),
            Self::RecordTestResults => json!({
                "score": "0-100",
                "passed": "true|false",
                "remarks": "optional",
            }),
            Self::RescheduleTest => json!({
                "exam_date": "YYYY-MM-DD",
                "receiver": "user id",
                "reason": "optional",
            }),
            Self::SendOffer => json!({
                "job_title": "text",
                "start_date": "YYYY-MM-DD",
                "receiver": "optional user id",
                "salary": "optional",
                "message": "optional",
            }),
            Self::Hire => json!({ "start_date": "optional YYYY-MM-DD", "note": "optional" }),
            Self::Reject | Self::RejectWithdraw | Self::DeclineOffer | Self::Withdraw => {
                json!({ "reason": "optional" })
            }
            Self::ViewFeedback => return None,
        };
        Some(template)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Bare stage move.
    Transition,
    /// Business action that may also move the stage.
    Action,
    /// Read-only lookup; never executed.
    Query,
}

/// Legal action as presented to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineAction {
    pub key: ActionKey,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_template: Option<Value>,
}

impl PipelineAction {
    pub fn new(key: ActionKey) -> Self {
        Self {
            key,
            label: key.label().to_string(),
            kind: key.kind(),
            to: None,
            payload_template: key.payload_template(),
        }
    }

    pub fn targeting(mut self, slug: &str, name: &str) -> Self {
        self.to = Some(slug.to_string());
        self.label = format!("Move to {name}");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_their_wire_names() {
        for key in ActionKey::ALL {
            assert_eq!(ActionKey::parse(key.as_str()), Some(key));
            let encoded = serde_json::to_value(key).expect("serializes");
            assert_eq!(encoded, Value::String(key.as_str().to_string()));
        }
        assert_eq!(ActionKey::parse("promote"), None);
    }

    #[test]
    fn descriptor_serializes_kind_as_type() {
        let action = PipelineAction::new(ActionKey::MoveNext).targeting("screening", "Screening");
        let encoded = serde_json::to_value(&action).expect("serializes");
        assert_eq!(encoded["type"], "transition");
        assert_eq!(encoded["to"], "screening");
        assert_eq!(encoded["label"], "Move to Screening");
    }
}
