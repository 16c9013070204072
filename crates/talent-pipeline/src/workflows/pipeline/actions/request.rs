use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::payload::{
    ClosureDetails, ExamInstructions, ExamReschedule, HireDetails, InterviewFeedback,
    InterviewSchedule, MoreInfoRequest, OfferDetails, PayloadReader, TestResults,
};
use super::ActionKey;
use crate::workflows::pipeline::error::PipelineError;

/// Action as submitted over the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSubmission {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_message: Option<String>,
    /// Stage the client believes the application is in; rejected as stale when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
}

impl ActionSubmission {
    pub fn new(action: ActionKey) -> Self {
        Self {
            action: action.as_str().to_string(),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        if let Value::Object(map) = payload {
            self.payload = Some(map);
        }
        self
    }

    /// Payload object with the top-level convenience fields folded in.
    fn merged_fields(&self) -> Map<String, Value> {
        let mut fields = self.payload.clone().unwrap_or_default();
        if let Some(note) = &self.note {
            fields.insert("note".to_string(), Value::String(note.clone()));
        }
        if !self.requested.is_empty() {
            let requested = self
                .requested
                .iter()
                .cloned()
                .map(Value::String)
                .collect::<Vec<_>>();
            fields.insert("requested".to_string(), Value::Array(requested));
        }
        if let Some(to) = &self.to {
            fields.insert("to".to_string(), Value::String(to.clone()));
        }
        fields
    }
}

/// One mutating operation with its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionCommand {
    MoveNext {
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Transition {
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    RequestMoreInfo(MoreInfoRequest),
    ScheduleInterview(InterviewSchedule),
    RescheduleInterview(InterviewSchedule),
    RecordInterviewFeedback(InterviewFeedback),
    SendExamInstructions(ExamInstructions),
    RecordTestResults(TestResults),
    RescheduleTest(ExamReschedule),
    SendOffer(OfferDetails),
    Hire(HireDetails),
    Reject(ClosureDetails),
    RejectWithdraw(ClosureDetails),
    AcceptOffer {
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    DeclineOffer(ClosureDetails),
    Withdraw(ClosureDetails),
}

impl ActionCommand {
    pub const fn key(&self) -> ActionKey {
        match self {
            ActionCommand::MoveNext { .. } => ActionKey::MoveNext,
            ActionCommand::Transition { .. } => ActionKey::Transition,
            ActionCommand::RequestMoreInfo(_) => ActionKey::RequestMoreInfo,
            ActionCommand::ScheduleInterview(_) => ActionKey::ScheduleInterview,
            ActionCommand::RescheduleInterview(_) => ActionKey::RescheduleInterview,
            ActionCommand::RecordInterviewFeedback(_) => ActionKey::RecordInterviewFeedback,
            ActionCommand::SendExamInstructions(_) => ActionKey::SendExamInstructions,
            ActionCommand::RecordTestResults(_) => ActionKey::RecordTestResults,
            ActionCommand::RescheduleTest(_) => ActionKey::RescheduleTest,
            ActionCommand::SendOffer(_) => ActionKey::SendOffer,
            ActionCommand::Hire(_) => ActionKey::Hire,
            ActionCommand::Reject(_) => ActionKey::Reject,
            ActionCommand::RejectWithdraw(_) => ActionKey::RejectWithdraw,
            ActionCommand::AcceptOffer { .. } => ActionKey::AcceptOffer,
            ActionCommand::DeclineOffer(_) => ActionKey::DeclineOffer,
            ActionCommand::Withdraw(_) => ActionKey::Withdraw,
        }
    }

    /// Structured payload stored in the action log.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn parse(key: ActionKey, fields: &Map<String, Value>) -> Result<Self, PipelineError> {
        let mut reader = PayloadReader::new(fields);
        let command = match key {
            ActionKey::MoveNext => {
                let note = reader.optional_text("note");
                reader.finish(|| Some(ActionCommand::MoveNext { note }))
            }
            ActionKey::Transition => {
                let to = reader.required_text("to");
                let note = reader.optional_text("note");
                reader.finish(|| Some(ActionCommand::Transition { to: to?, note }))
            }
            ActionKey::RequestMoreInfo => {
                let requested = reader.required_list("requested");
                let note = reader.optional_text("note");
                let deadline = reader.optional_date("deadline");
                reader.finish(|| {
                    Some(ActionCommand::RequestMoreInfo(MoreInfoRequest {
                        requested: requested?,
                        note,
                        deadline,
                    }))
                })
            }
            ActionKey::ScheduleInterview | ActionKey::RescheduleInterview => {
                let date = reader.required_date("date");
                let time = reader.required_time("time");
                let receiver = reader.required_user("receiver");
                let location = reader.optional_text("location");
                let reason = reader.optional_text("reason");
                reader.finish(|| {
                    let schedule = InterviewSchedule {
                        date: date?,
                        time: time?,
                        receiver: receiver?,
                        location,
                        reason,
                    };
                    Some(if key == ActionKey::ScheduleInterview {
                        ActionCommand::ScheduleInterview(schedule)
                    } else {
                        ActionCommand::RescheduleInterview(schedule)
                    })
                })
            }
            ActionKey::RecordInterviewFeedback => {
                let rating = reader.required_whole_number("rating", 1, 5);
                let feedback = reader.required_text("feedback");
                let recommendation = reader.optional_text("recommendation");
                reader.finish(|| {
                    Some(ActionCommand::RecordInterviewFeedback(InterviewFeedback {
                        rating: rating?,
                        feedback: feedback?,
                        recommendation,
                    }))
                })
            }
            ActionKey::SendExamInstructions => {
                let exam_date = reader.required_date("exam_date");
                let instructions = reader.required_text("instructions");
                let receiver = reader.required_user("receiver");
                let link = reader.optional_text("link");
                reader.finish(|| {
                    Some(ActionCommand::SendExamInstructions(ExamInstructions {
                        exam_date: exam_date?,
                        instructions: instructions?,
                        receiver: receiver?,
                        link,
                    }))
                })
            }
            ActionKey::RecordTestResults => {
                let score = reader.required_number("score", 0.0, 100.0);
                let passed = reader.required_bool("passed");
                let remarks = reader.optional_text("remarks");
                reader.finish(|| {
                    Some(ActionCommand::RecordTestResults(TestResults {
                        score: score?,
                        passed: passed?,
                        remarks,
                    }))
                })
            }
            ActionKey::RescheduleTest => {
                let exam_date = reader.required_date("exam_date");
                let receiver = reader.required_user("receiver");
                let reason = reader.optional_text("reason");
                reader.finish(|| {
                    Some(ActionCommand::RescheduleTest(ExamReschedule {
                        exam_date: exam_date?,
                        receiver: receiver?,
                        reason,
                    }))
                })
            }
            ActionKey::SendOffer => {
                let job_title = reader.required_text("job_title");
                let start_date = reader.required_date("start_date");
                let receiver = reader.optional_user("receiver");
                let salary = reader.optional_text("salary");
                let message = reader.optional_text("message");
                reader.finish(|| {
                    Some(ActionCommand::SendOffer(OfferDetails {
                        job_title: job_title?,
                        start_date: start_date?,
                        receiver,
                        salary,
                        message,
                    }))
                })
            }
            ActionKey::Hire => {
                let start_date = reader.optional_date("start_date");
                let note = reader.optional_text("note");
                reader.finish(|| Some(ActionCommand::Hire(HireDetails { start_date, note })))
            }
            ActionKey::AcceptOffer => {
                let note = reader.optional_text("note");
                reader.finish(|| Some(ActionCommand::AcceptOffer { note }))
            }
            ActionKey::Reject
            | ActionKey::RejectWithdraw
            | ActionKey::DeclineOffer
            | ActionKey::Withdraw => {
                let reason = reader
                    .optional_text("reason")
                    .or_else(|| reader.optional_text("note"));
                reader.finish(|| {
                    let details = ClosureDetails { reason };
                    Some(match key {
                        ActionKey::Reject => ActionCommand::Reject(details),
                        ActionKey::RejectWithdraw => ActionCommand::RejectWithdraw(details),
                        ActionKey::DeclineOffer => ActionCommand::DeclineOffer(details),
                        _ => ActionCommand::Withdraw(details),
                    })
                })
            }
            ActionKey::ViewFeedback => {
                return Err(PipelineError::UnsupportedAction(format!(
                    "{} is read-only and cannot be executed",
                    key.as_str()
                )))
            }
        };

        command.map_err(PipelineError::ValidationFailed)
    }
}

/// Validated action ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub command: ActionCommand,
    pub custom_message: Option<String>,
    pub expected_stage: Option<String>,
}

impl ActionRequest {
    pub fn new(command: ActionCommand) -> Self {
        Self {
            command,
            custom_message: None,
            expected_stage: None,
        }
    }

    pub fn with_custom_message(mut self, message: &str) -> Self {
        self.custom_message = Some(message.to_string());
        self
    }

    pub fn expecting_stage(mut self, stage: &str) -> Self {
        self.expected_stage = Some(stage.to_string());
        self
    }

    pub const fn key(&self) -> ActionKey {
        self.command.key()
    }

    /// Validate a wire submission. Unknown keys are unsupported; payload problems are reported
    /// field by field.
    pub fn from_submission(submission: ActionSubmission) -> Result<Self, PipelineError> {
        let key = ActionKey::parse(&submission.action).ok_or_else(|| {
            PipelineError::UnsupportedAction(format!(
                "'{}' is not a pipeline action",
                submission.action
            ))
        })?;

        let fields = submission.merged_fields();
        let command = ActionCommand::parse(key, &fields)?;

        let custom_message = submission
            .custom_message
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty());
        let expected_stage = submission
            .expected_stage
            .map(|stage| stage.trim().to_string())
            .filter(|stage| !stage.is_empty());

        Ok(Self {
            command,
            custom_message,
            expected_stage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pipeline::domain::UserId;
    use chrono::NaiveDate;
    use serde_json::json;

    fn submit(action: ActionKey, payload: Value) -> Result<ActionRequest, PipelineError> {
        ActionRequest::from_submission(ActionSubmission::new(action).with_payload(payload))
    }

    #[test]
    fn schedule_interview_requires_date_time_and_receiver() {
        match submit(ActionKey::ScheduleInterview, json!({})) {
            Err(PipelineError::ValidationFailed(errors)) => {
                assert!(errors.has_field("date"));
                assert!(errors.has_field("time"));
                assert!(errors.has_field("receiver"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn schedule_interview_parses_typed_fields() {
        let request = submit(
            ActionKey::ScheduleInterview,
            json!({ "date": "2025-02-03", "time": "09:30", "receiver": "42", "location": "HQ" }),
        )
        .expect("valid payload");

        match request.command {
            ActionCommand::ScheduleInterview(schedule) => {
                assert_eq!(
                    schedule.date,
                    NaiveDate::from_ymd_opt(2025, 2, 3).expect("valid date")
                );
                assert_eq!(schedule.receiver, UserId(42));
                assert_eq!(schedule.location.as_deref(), Some("HQ"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn malformed_values_report_field_messages() {
        match submit(
            ActionKey::SendOffer,
            json!({ "job_title": "Engineer", "start_date": "next monday" }),
        ) {
            Err(PipelineError::ValidationFailed(errors)) => {
                assert_eq!(errors.errors().len(), 1);
                assert_eq!(errors.errors()[0].field, "start_date");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn top_level_fields_fold_into_payload() {
        let submission = ActionSubmission {
            action: "request_more_info".to_string(),
            requested: vec!["Transcript".to_string(), " ".to_string()],
            note: Some("Please upload by Friday".to_string()),
            custom_message: Some("   ".to_string()),
            ..ActionSubmission::default()
        };

        let request = ActionRequest::from_submission(submission).expect("valid");
        assert!(request.custom_message.is_none());
        match request.command {
            ActionCommand::RequestMoreInfo(info) => {
                assert_eq!(info.requested, vec!["Transcript".to_string()]);
                assert_eq!(info.note.as_deref(), Some("Please upload by Friday"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_and_read_only_keys_are_unsupported() {
        for action in ["promote", "view_feedback"] {
            let submission = ActionSubmission {
                action: action.to_string(),
                ..ActionSubmission::default()
            };
            assert!(matches!(
                ActionRequest::from_submission(submission),
                Err(PipelineError::UnsupportedAction(_))
            ));
        }
    }

    #[test]
    fn test_scores_are_bounded() {
        match submit(
            ActionKey::RecordTestResults,
            json!({ "score": 140, "passed": true }),
        ) {
            Err(PipelineError::ValidationFailed(errors)) => assert!(errors.has_field("score")),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn interview_ratings_must_be_whole_numbers() {
        match submit(
            ActionKey::RecordInterviewFeedback,
            json!({ "rating": 4.5, "feedback": "Solid answers" }),
        ) {
            Err(PipelineError::ValidationFailed(errors)) => {
                assert!(errors.has_field("rating"));
                assert!(errors.to_string().contains("whole number"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        let request = submit(
            ActionKey::RecordInterviewFeedback,
            json!({ "rating": "4", "feedback": "Solid answers" }),
        )
        .expect("integral rating accepted");
        match request.command {
            ActionCommand::RecordInterviewFeedback(feedback) => assert_eq!(feedback.rating, 4),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn command_payload_is_tagged_with_action_key() {
        let command = ActionCommand::Reject(ClosureDetails {
            reason: Some("Position filled".to_string()),
        });
        let payload = command.payload();
        assert_eq!(payload["action"], "reject");
        assert_eq!(payload["reason"], "Position filled");
    }
}
