use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use super::actions::{ActionCommand, ActionKey, ActionRequest, PipelineAction};
use super::audit::{record_action, record_stage_change, NewActionLogEntry, NewStageLogEntry};
use super::catalog::ensure_stages;
use super::domain::{
    derive_status, ActorContext, Application, ApplicationStatus, PipelineStage,
    TerminalFamily,
};
use super::error::PipelineError;
use super::messaging::{
    default_template, detail, render, MessageDispatcher, OutboundMessage, Recipient, TemplateVars,
};
use super::resolver::{locate_stage, PipelineActionResolver};
use super::store::PipelineStore;

/// Result of a committed action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub message: String,
    pub application: Application,
    pub stage_changed: bool,
    /// Actions available to the caller after the change.
    pub actions: Vec<PipelineAction>,
}

/// Validates and applies pipeline actions atomically.
///
/// Stage changes, status derivation, and both audit appends share one store transaction.
/// The counterpart is notified only after that transaction commits.
pub struct PipelineActionExecutor<S, D> {
    store: Arc<S>,
    dispatcher: Arc<D>,
    resolver: PipelineActionResolver,
}

impl<S, D> PipelineActionExecutor<S, D>
where
    S: PipelineStore + 'static,
    D: MessageDispatcher + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<D>) -> Self {
        Self {
            store,
            dispatcher,
            resolver: PipelineActionResolver,
        }
    }

    /// Apply `request` to the application as the caller last saw it.
    ///
    /// `snapshot` carries the version the caller read. A newer stored version means
    /// someone else moved the application first and the call fails with
    /// [`PipelineError::StaleApplication`]. Permission is decided on the stored row, never on
    /// the snapshot.
    pub fn execute(
        &self,
        actor: &ActorContext,
        snapshot: &Application,
        request: ActionRequest,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let key = request.key();
        let committed = self
            .store
            .atomically(|tx| -> Result<Committed, PipelineError> {
                let mut application = tx
                    .application(snapshot.id)?
                    .ok_or(PipelineError::ApplicationNotFound(snapshot.id))?;
                ensure_permitted(actor, &application, key)?;

                let moved_elsewhere = request
                    .expected_stage
                    .as_deref()
                    .is_some_and(|expected| expected != application.stage);
                if application.version != snapshot.version || moved_elsewhere {
                    return Err(PipelineError::StaleApplication {
                        id: application.id,
                        stage: application.stage,
                    });
                }

                let stages = ensure_stages(tx, application.job_owner)?;
                let current = locate_stage(&stages, &application.stage)?.clone();
                self.check_available(&application, &stages, &current, key)?;

                let plan = self.plan(&request.command, &application, &stages, &current)?;

                let from_stage = application.stage.clone();
                let previous_status = application.status;
                let target = plan.target.as_ref().filter(|stage| stage.slug != from_stage);
                if let Some(stage) = target {
                    application.stage = stage.slug.clone();
                    application.status = derive_status(&stage.slug, stage.is_terminal);
                }
                if let Some(status) = plan.status {
                    application.status = status;
                }

                let stage_changed = target.is_some();
                if stage_changed || application.status != previous_status {
                    application = tx.update_application(application)?;
                }
                if stage_changed {
                    record_stage_change(
                        tx,
                        NewStageLogEntry {
                            application_id: application.id,
                            from_stage: Some(from_stage.clone()),
                            to_stage: application.stage.clone(),
                            changed_by: actor.user_id,
                        },
                    )?;
                }

                record_action(
                    tx,
                    NewActionLogEntry {
                        application_id: application.id,
                        user_id: actor.user_id,
                        action_key: key.as_str().to_string(),
                        event: plan.event.to_string(),
                        payload: json!({
                            "command": request.command.payload(),
                            "from_stage": from_stage,
                            "to_stage": application.stage,
                            "status": application.status,
                            "custom_message": request.custom_message,
                            "recipient": plan.recipient,
                        }),
                    },
                )?;

                let outbound = plan.recipient.clone().map(|recipient| {
                    compose_message(&application, key, recipient, &plan.vars, &request)
                });
                let actions =
                    self.resolver
                        .for_application(&application, &stages, actor.party())?;

                Ok(Committed {
                    outcome: ExecutionOutcome {
                        message: plan.summary,
                        application,
                        stage_changed,
                        actions,
                    },
                    from_stage,
                    outbound,
                })
            })
            .inspect_err(|err| {
                if err.is_client_error() {
                    tracing::debug!(application_id = %snapshot.id, action = key.as_str(), error = %err, "pipeline action refused");
                } else {
                    tracing::error!(application_id = %snapshot.id, action = key.as_str(), error = %err, "pipeline action failed");
                }
            })?;

        let outcome = committed.outcome;
        tracing::info!(
            application_id = %outcome.application.id,
            action = key.as_str(),
            from = %committed.from_stage,
            to = %outcome.application.stage,
            status = outcome.application.status.label(),
            "pipeline action executed"
        );

        if let Some(message) = committed.outbound {
            if let Err(err) = self.dispatcher.dispatch(message) {
                tracing::error!(
                    application_id = %outcome.application.id,
                    action = key.as_str(),
                    error = %err,
                    "failed to dispatch pipeline message"
                );
            }
        }

        Ok(outcome)
    }

    fn check_available(
        &self,
        application: &Application,
        stages: &[PipelineStage],
        current: &PipelineStage,
        key: ActionKey,
    ) -> Result<(), PipelineError> {
        if current.is_terminal {
            return Err(PipelineError::TerminalStageViolation {
                stage: current.slug.clone(),
            });
        }
        // Explicit transitions are validated against the target stage instead.
        if key == ActionKey::Transition {
            return Ok(());
        }

        let available = self
            .resolver
            .for_application(application, stages, key.party())?;
        if available.iter().any(|action| action.key == key) {
            Ok(())
        } else {
            Err(PipelineError::UnsupportedAction(format!(
                "'{}' is not available at stage '{}'",
                key.as_str(),
                current.slug
            )))
        }
    }

    fn plan(
        &self,
        command: &ActionCommand,
        application: &Application,
        stages: &[PipelineStage],
        current: &PipelineStage,
    ) -> Result<ActionPlan, PipelineError> {
        let applicant = Recipient::Applicant {
            user_id: application.applicant_id,
        };
        let employer = Recipient::Employer {
            owner: application.job_owner,
            job_id: application.job_id,
        };

        let mut vars = TemplateVars::new();
        vars.insert("job_id", application.job_id.to_string());
        vars.insert("application_id", application.id.to_string());
        vars.insert("applicant_id", application.applicant_id.to_string());
        vars.insert("stage_name", current.name.clone());

        let plan = match command {
            ActionCommand::MoveNext { note } => {
                let next = self.resolver.next_stage(stages, current).ok_or_else(|| {
                    PipelineError::UnknownStage(format!("stage after '{}'", current.slug))
                })?;
                vars.insert("stage_name", next.name.clone());
                vars.insert("note", detail("Note", note.as_deref()));
                ActionPlan::new("stage advanced", format!("Moved to {}.", next.name))
                    .moving_to(next)
                    .notifying(applicant, vars)
            }
            ActionCommand::Transition { to, note } => {
                let target = stages
                    .iter()
                    .find(|stage| stage.active && stage.slug == to.trim())
                    .ok_or_else(|| PipelineError::UnknownStage(to.clone()))?;
                if target.slug == current.slug {
                    return Ok(ActionPlan::new(
                        "stage unchanged",
                        format!("Already at {}.", target.name),
                    ));
                }
                vars.insert("stage_name", target.name.clone());
                vars.insert("note", detail("Note", note.as_deref()));
                ActionPlan::new("stage changed", format!("Moved to {}.", target.name))
                    .moving_to(target)
                    .notifying(applicant, vars)
            }
            ActionCommand::RequestMoreInfo(request) => {
                vars.insert("requested", request.requested.join(", "));
                let deadline = request.deadline.map(|date| date.to_string());
                vars.insert("deadline", detail("Deadline", deadline.as_deref()));
                vars.insert("note", detail("Note", request.note.as_deref()));
                ActionPlan::new(
                    "more information requested",
                    format!("Requested {}.", request.requested.join(", ")),
                )
                .notifying(applicant, vars)
            }
            ActionCommand::ScheduleInterview(schedule)
            | ActionCommand::RescheduleInterview(schedule) => {
                let rescheduled = matches!(command, ActionCommand::RescheduleInterview(_));
                vars.insert("date", schedule.date.to_string());
                vars.insert("time", schedule.time.format("%H:%M").to_string());
                vars.insert("location", detail("Location", schedule.location.as_deref()));
                vars.insert("reason", detail("Reason", schedule.reason.as_deref()));
                let (event, verb) = if rescheduled {
                    ("interview rescheduled", "rescheduled")
                } else {
                    ("interview scheduled", "scheduled")
                };
                ActionPlan::new(
                    event,
                    format!(
                        "Interview {verb} for {} at {}.",
                        schedule.date,
                        schedule.time.format("%H:%M")
                    ),
                )
                .notifying(
                    Recipient::Applicant {
                        user_id: schedule.receiver,
                    },
                    vars,
                )
            }
            ActionCommand::RecordInterviewFeedback(feedback) => ActionPlan::new(
                "interview feedback recorded",
                format!("Interview feedback recorded (rating {}/5).", feedback.rating),
            ),
            ActionCommand::SendExamInstructions(exam) => {
                vars.insert("exam_date", exam.exam_date.to_string());
                vars.insert("instructions", exam.instructions.clone());
                vars.insert("link", detail("Link", exam.link.as_deref()));
                ActionPlan::new(
                    "exam instructions sent",
                    format!("Exam instructions sent for {}.", exam.exam_date),
                )
                .notifying(
                    Recipient::Applicant {
                        user_id: exam.receiver,
                    },
                    vars,
                )
            }
            ActionCommand::RecordTestResults(results) => ActionPlan::new(
                "test results recorded",
                format!(
                    "Test results recorded ({}, score {}).",
                    if results.passed { "passed" } else { "failed" },
                    results.score
                ),
            ),
            ActionCommand::RescheduleTest(reschedule) => {
                vars.insert("exam_date", reschedule.exam_date.to_string());
                vars.insert("reason", detail("Reason", reschedule.reason.as_deref()));
                ActionPlan::new(
                    "test rescheduled",
                    format!("Test rescheduled to {}.", reschedule.exam_date),
                )
                .notifying(
                    Recipient::Applicant {
                        user_id: reschedule.receiver,
                    },
                    vars,
                )
            }
            ActionCommand::SendOffer(offer) => {
                vars.insert("job_title", offer.job_title.clone());
                vars.insert("start_date", offer.start_date.to_string());
                vars.insert("salary", detail("Salary", offer.salary.as_deref()));
                vars.insert("message", detail("Message", offer.message.as_deref()));
                let receiver = offer.receiver.unwrap_or(application.applicant_id);
                ActionPlan::new(
                    "offer sent",
                    format!("Offer for {} sent.", offer.job_title),
                )
                .notifying(Recipient::Applicant { user_id: receiver }, vars)
            }
            ActionCommand::Hire(hire) => {
                let target = self.resolver.terminal_target(stages, TerminalFamily::Hired)?;
                let start_date = hire.start_date.map(|date| date.to_string());
                vars.insert("start_date", detail("Start date", start_date.as_deref()));
                vars.insert("note", detail("Note", hire.note.as_deref()));
                ActionPlan::new("applicant hired", format!("Moved to {}.", target.name))
                    .moving_to(target)
                    .notifying(applicant, vars)
            }
            ActionCommand::Reject(closure) | ActionCommand::RejectWithdraw(closure) => {
                let family = if matches!(command, ActionCommand::Reject(_)) {
                    TerminalFamily::Rejected
                } else {
                    TerminalFamily::Withdrawn
                };
                let target = self.resolver.terminal_target(stages, family)?;
                vars.insert("reason", detail("Reason", closure.reason.as_deref()));
                let event = match family {
                    TerminalFamily::Rejected => "application rejected",
                    _ => "application withdrawn by employer",
                };
                ActionPlan::new(event, format!("Moved to {}.", target.name))
                    .moving_to(target)
                    .notifying(applicant, vars)
            }
            ActionCommand::AcceptOffer { note } => {
                vars.insert("note", detail("Note", note.as_deref()));
                ActionPlan::new("offer accepted", "Offer accepted.".to_string())
                    .with_status(ApplicationStatus::OfferAccepted)
                    .notifying(employer, vars)
            }
            ActionCommand::DeclineOffer(closure) => {
                let target = self
                    .resolver
                    .terminal_target(stages, TerminalFamily::Declined)?;
                vars.insert("reason", detail("Reason", closure.reason.as_deref()));
                ActionPlan::new("offer declined", "Offer declined.".to_string())
                    .moving_to(target)
                    .with_status(ApplicationStatus::OfferDeclined)
                    .notifying(employer, vars)
            }
            ActionCommand::Withdraw(closure) => {
                let target = self
                    .resolver
                    .terminal_target(stages, TerminalFamily::Withdrawn)?;
                vars.insert("reason", detail("Reason", closure.reason.as_deref()));
                ActionPlan::new("application withdrawn", "Application withdrawn.".to_string())
                    .moving_to(target)
                    .notifying(employer, vars)
            }
        };

        Ok(plan)
    }
}

/// Refuse callers without standing on `application` for the side `key` belongs to.
pub(crate) fn ensure_permitted(
    actor: &ActorContext,
    application: &Application,
    key: ActionKey,
) -> Result<(), PipelineError> {
    if actor.may_act(application, key.party()) {
        Ok(())
    } else {
        Err(PipelineError::Forbidden(format!(
            "{} may not perform '{}' on application {}",
            actor.role.label(),
            key.as_str(),
            application.id
        )))
    }
}

/// What an action will change, decided before any write.
struct ActionPlan {
    event: &'static str,
    summary: String,
    target: Option<PipelineStage>,
    status: Option<ApplicationStatus>,
    recipient: Option<Recipient>,
    vars: TemplateVars,
}

impl ActionPlan {
    fn new(event: &'static str, summary: String) -> Self {
        Self {
            event,
            summary,
            target: None,
            status: None,
            recipient: None,
            vars: TemplateVars::new(),
        }
    }

    fn moving_to(mut self, stage: &PipelineStage) -> Self {
        self.target = Some(stage.clone());
        self
    }

    fn with_status(mut self, status: ApplicationStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn notifying(mut self, recipient: Recipient, vars: TemplateVars) -> Self {
        self.recipient = Some(recipient);
        self.vars = vars;
        self
    }
}

struct Committed {
    outcome: ExecutionOutcome,
    from_stage: String,
    outbound: Option<OutboundMessage>,
}

fn compose_message(
    application: &Application,
    key: ActionKey,
    recipient: Recipient,
    vars: &TemplateVars,
    request: &ActionRequest,
) -> OutboundMessage {
    let (subject, body) = default_template(key);
    let body = match request.custom_message.as_deref() {
        Some(custom) => custom.to_string(),
        None => render(body, vars),
    };

    OutboundMessage {
        application_id: application.id,
        action: key,
        recipient,
        subject: render(subject, vars),
        body,
    }
}
