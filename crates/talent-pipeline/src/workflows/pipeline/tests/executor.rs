use super::common::*;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use std::sync::Arc;
use std::thread;

use crate::workflows::pipeline::actions::{
    ActionCommand, ActionKey, ActionRequest, ActionSubmission, ClosureDetails, HireDetails,
    InterviewFeedback, InterviewSchedule, OfferDetails,
};
use crate::workflows::pipeline::domain::{
    ActorContext, ApplicationStatus, CompanyId, Owner, UserId,
};
use crate::workflows::pipeline::error::PipelineError;
use crate::workflows::pipeline::messaging::Recipient;
use crate::workflows::pipeline::service::PipelineService;
use crate::workflows::pipeline::store::RepositoryError;

fn move_next() -> ActionRequest {
    ActionRequest::new(ActionCommand::MoveNext { note: None })
}

fn offer(receiver: Option<UserId>) -> ActionRequest {
    ActionRequest::new(ActionCommand::SendOffer(OfferDetails {
        job_title: "Engineer".to_string(),
        start_date: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date"),
        receiver,
        salary: None,
        message: Some("We would love to have you.".to_string()),
    }))
}

#[test]
fn move_next_advances_one_stage_and_logs_once() {
    let (service, store, dispatcher) = build_service();
    let application = service
        .open_application(new_application())
        .expect("application opens");
    assert_eq!(application.stage, "applied");
    assert_eq!(log_counts(&store, application.id), (0, 1));

    let outcome = service
        .execute(&recruiter(), application.id, move_next())
        .expect("move_next succeeds");

    assert!(outcome.stage_changed);
    assert_eq!(outcome.application.stage, "screening");
    assert_eq!(outcome.application.status, ApplicationStatus::Pending);
    assert_eq!(outcome.application.version, application.version + 1);
    assert_eq!(log_counts(&store, application.id), (1, 2));

    let history = service.history(&recruiter(), application.id).expect("history loads");
    let transition = history.stages.last().expect("stage entry");
    assert_eq!(transition.from_stage.as_deref(), Some("applied"));
    assert_eq!(transition.to_stage, "screening");
    assert_eq!(transition.changed_by, Some(RECRUITER));
    assert_eq!(history.current_stage(), Some("screening"));

    let messages = dispatcher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].recipient,
        Recipient::Applicant { user_id: APPLICANT }
    );
    assert!(messages[0].body.contains("Screening"));
}

#[test]
fn send_offer_records_and_notifies_without_moving() {
    let (service, store, dispatcher) = build_service();
    let application = application_at(&service, "offer");
    let (actions_before, stages_before) = log_counts(&store, application.id);

    let outcome = service
        .execute(&recruiter(), application.id, offer(Some(UserId(900))))
        .expect("offer sent");

    assert!(!outcome.stage_changed);
    assert_eq!(outcome.application.stage, "offer");
    assert_eq!(outcome.application.version, application.version);
    assert_eq!(
        log_counts(&store, application.id),
        (actions_before + 1, stages_before)
    );

    let entry = service
        .history(&recruiter(), application.id)
        .expect("history loads")
        .actions
        .pop()
        .expect("action entry");
    assert_eq!(entry.action_key, "send_offer");
    assert_eq!(entry.event, "offer sent");
    assert_eq!(entry.payload["command"]["job_title"], "Engineer");
    assert_eq!(entry.payload["command"]["start_date"], "2025-01-01");

    let message = dispatcher.messages().pop().expect("offer dispatched");
    assert_eq!(message.action, ActionKey::SendOffer);
    assert_eq!(
        message.recipient,
        Recipient::Applicant {
            user_id: UserId(900)
        }
    );
    assert_eq!(message.subject, "Job offer: Engineer");
    assert!(message.body.contains("We would love to have you."));
}

#[test]
fn send_offer_defaults_to_the_applicant() {
    let (service, _, dispatcher) = build_service();
    let application = application_at(&service, "offer");

    service
        .execute(&recruiter(), application.id, offer(None))
        .expect("offer sent");

    let message = dispatcher.messages().pop().expect("offer dispatched");
    assert_eq!(message.recipient, Recipient::Applicant { user_id: APPLICANT });
}

#[test]
fn hire_moves_to_terminal_hired_stage() {
    let (service, store, _) = build_service();
    let application = application_at(&service, "offer");
    let (actions_before, stages_before) = log_counts(&store, application.id);

    let outcome = service
        .execute(
            &recruiter(),
            application.id,
            ActionRequest::new(ActionCommand::Hire(HireDetails {
                start_date: NaiveDate::from_ymd_opt(2025, 2, 3),
                note: None,
            })),
        )
        .expect("hire succeeds");

    assert_eq!(outcome.application.stage, "hired");
    assert_eq!(outcome.application.status, ApplicationStatus::Hired);
    assert_eq!(
        log_counts(&store, application.id),
        (actions_before + 1, stages_before + 1)
    );
    assert_eq!(
        outcome
            .actions
            .iter()
            .map(|action| action.key)
            .collect::<Vec<_>>(),
        vec![ActionKey::ViewFeedback]
    );
}

#[test]
fn terminal_stage_refuses_further_moves_without_writes() {
    let (service, store, dispatcher) = build_service();
    let application = service
        .open_application(new_application())
        .expect("application opens");
    service
        .execute(&recruiter(), application.id, reject_request())
        .expect("reject succeeds");
    let counts = log_counts(&store, application.id);
    let sent = dispatcher.messages().len();

    let result = service.execute(&recruiter(), application.id, move_next());

    assert!(matches!(
        result,
        Err(PipelineError::TerminalStageViolation { stage }) if stage == "rejected"
    ));
    assert_eq!(log_counts(&store, application.id), counts);
    assert_eq!(dispatcher.messages().len(), sent);
}

#[test]
fn only_the_owning_company_or_peso_may_act_for_the_employer() {
    let (service, store, _) = build_service();
    let application = service
        .open_application(new_application())
        .expect("application opens");

    for outsider in [
        ActorContext::company(UserId(9), CompanyId(77)),
        ActorContext::guest(),
        applicant(),
    ] {
        assert!(matches!(
            service.execute(&outsider, application.id, move_next()),
            Err(PipelineError::Forbidden(_))
        ));
    }
    assert_eq!(log_counts(&store, application.id), (0, 1));

    service
        .execute(&ActorContext::peso(UserId(3)), application.id, move_next())
        .expect("peso may act");
}

#[test]
fn applicant_withdrawal_notifies_the_employer() {
    let (service, _, dispatcher) = build_service();
    let application = application_at(&service, "interview");

    assert!(matches!(
        service.execute(
            &ActorContext::graduate(UserId(999)),
            application.id,
            ActionRequest::new(ActionCommand::Withdraw(ClosureDetails::default())),
        ),
        Err(PipelineError::Forbidden(_))
    ));

    let outcome = service
        .execute(
            &applicant(),
            application.id,
            ActionRequest::new(ActionCommand::Withdraw(ClosureDetails {
                reason: Some("Accepted another role".to_string()),
            })),
        )
        .expect("withdraw succeeds");

    assert_eq!(outcome.application.stage, "withdrawn");
    assert_eq!(outcome.application.status, ApplicationStatus::Declined);

    let message = dispatcher.messages().pop().expect("employer notified");
    assert_eq!(
        message.recipient,
        Recipient::Employer {
            owner: Owner::Company(COMPANY),
            job_id: application.job_id,
        }
    );
    assert!(message.body.contains("Accepted another role"));
}

#[test]
fn offer_responses_stamp_offer_statuses() {
    let (service, _, _) = build_service();
    let accepted = application_at(&service, "offer");

    let outcome = service
        .execute(
            &applicant(),
            accepted.id,
            ActionRequest::new(ActionCommand::AcceptOffer { note: None }),
        )
        .expect("offer accepted");
    assert_eq!(outcome.application.stage, "offer");
    assert_eq!(outcome.application.status, ApplicationStatus::OfferAccepted);
    assert_eq!(outcome.application.version, accepted.version + 1);
    assert!(!outcome.stage_changed);

    assert!(matches!(
        service.execute(
            &applicant(),
            accepted.id,
            ActionRequest::new(ActionCommand::AcceptOffer { note: None }),
        ),
        Err(PipelineError::UnsupportedAction(_))
    ));

    let declined = application_at(&service, "offer");
    let outcome = service
        .execute(
            &applicant(),
            declined.id,
            ActionRequest::new(ActionCommand::DeclineOffer(ClosureDetails::default())),
        )
        .expect("offer declined");
    assert_eq!(outcome.application.stage, "declined");
    assert_eq!(outcome.application.status, ApplicationStatus::OfferDeclined);
}

#[test]
fn internal_feedback_is_logged_but_not_sent() {
    let (service, _, dispatcher) = build_service();
    let application = application_at(&service, "interview");
    let sent = dispatcher.messages().len();

    let outcome = service
        .execute(
            &recruiter(),
            application.id,
            ActionRequest::new(ActionCommand::RecordInterviewFeedback(InterviewFeedback {
                rating: 4,
                feedback: "Strong systems background".to_string(),
                recommendation: Some("advance".to_string()),
            })),
        )
        .expect("feedback recorded");

    assert!(!outcome.stage_changed);
    assert_eq!(dispatcher.messages().len(), sent);

    let feedback = service.feedback(&recruiter(), application.id).expect("feedback loads");
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].action_key, "record_interview_feedback");
    assert_eq!(
        feedback[0].payload["command"]["feedback"],
        "Strong systems background"
    );
}

#[test]
fn stage_specific_actions_are_refused_elsewhere() {
    let (service, store, _) = build_service();
    let application = service
        .open_application(new_application())
        .expect("application opens");

    let result = service.execute(
        &recruiter(),
        application.id,
        ActionRequest::new(ActionCommand::ScheduleInterview(InterviewSchedule {
            date: NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date"),
            time: NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
            receiver: APPLICANT,
            location: None,
            reason: None,
        })),
    );

    assert!(matches!(result, Err(PipelineError::UnsupportedAction(_))));
    assert_eq!(log_counts(&store, application.id), (0, 1));
}

#[test]
fn explicit_transitions_validate_the_target() {
    let (service, _, _) = build_service();
    let application = service
        .open_application(new_application())
        .expect("application opens");

    assert!(matches!(
        service.execute(
            &recruiter(),
            application.id,
            ActionRequest::new(ActionCommand::Transition {
                to: "archived".to_string(),
                note: None,
            }),
        ),
        Err(PipelineError::UnknownStage(slug)) if slug == "archived"
    ));

    let outcome = service
        .execute(
            &recruiter(),
            application.id,
            ActionRequest::new(ActionCommand::Transition {
                to: "interview".to_string(),
                note: Some("Fast-tracked".to_string()),
            }),
        )
        .expect("transition succeeds");
    assert_eq!(outcome.application.stage, "interview");
}

#[test]
fn storage_failure_rolls_back_every_write() {
    let store = Arc::new(FailingStore::new(FailurePoint::ActionLog));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = PipelineService::new(store.clone(), dispatcher.clone());
    let application = service
        .open_application(new_application())
        .expect("application opens");

    store.arm();
    let result = service.execute(&recruiter(), application.id, move_next());

    assert!(matches!(
        result,
        Err(PipelineError::Storage(RepositoryError::Unavailable(_)))
    ));
    let history = service.history(&recruiter(), application.id).expect("history loads");
    assert!(history.actions.is_empty());
    assert_eq!(history.stages.len(), 1);
    assert_eq!(
        service
            .application(application.id)
            .expect("application loads"),
        application
    );
    assert!(dispatcher.messages().is_empty());
}

#[test]
fn stale_snapshots_are_rejected() {
    let (service, store, _) = build_service();
    let snapshot = service
        .open_application(new_application())
        .expect("application opens");

    service
        .execute_against(&recruiter(), &snapshot, move_next())
        .expect("first move wins");

    let result = service.execute_against(&recruiter(), &snapshot, move_next());
    assert!(matches!(
        result,
        Err(PipelineError::StaleApplication { stage, .. }) if stage == "screening"
    ));
    assert_eq!(stored_application(&store, snapshot.id).stage, "screening");

    let result = service.execute(
        &recruiter(),
        snapshot.id,
        move_next().expecting_stage("applied"),
    );
    assert!(matches!(result, Err(PipelineError::StaleApplication { .. })));
}

#[test]
fn concurrent_moves_from_one_snapshot_apply_once() {
    let (service, store, _) = build_service();
    let service = Arc::new(service);
    let snapshot = service
        .open_application(new_application())
        .expect("application opens");

    let results: Vec<Result<_, PipelineError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let snapshot = snapshot.clone();
                scope.spawn(move || service.execute_against(&recruiter(), &snapshot, move_next()))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| matches!(err, PipelineError::StaleApplication { .. })));

    assert_eq!(stored_application(&store, snapshot.id).stage, "screening");
    assert_eq!(log_counts(&store, snapshot.id), (1, 2));
}

#[test]
fn dispatch_failures_do_not_undo_the_commit() {
    let store = seeded_store();
    let service = PipelineService::new(store.clone(), Arc::new(OfflineDispatcher));
    let application = service
        .open_application(new_application())
        .expect("application opens");

    let outcome = service
        .execute(&recruiter(), application.id, move_next())
        .expect("commit survives dispatch failure");

    assert_eq!(outcome.application.stage, "screening");
    assert_eq!(log_counts(&store, application.id), (1, 2));
}

#[test]
fn custom_message_replaces_the_template_body() {
    let (service, _, dispatcher) = build_service();
    let application = service
        .open_application(new_application())
        .expect("application opens");

    service
        .execute(
            &recruiter(),
            application.id,
            reject_request().with_custom_message("Thanks for your time."),
        )
        .expect("reject succeeds");

    let message = dispatcher.messages().pop().expect("message dispatched");
    assert_eq!(message.body, "Thanks for your time.");
    assert_eq!(message.subject, "Application update");
}

#[test]
fn stage_log_tracks_the_application_stage() {
    let (service, _, _) = build_service();
    let application = application_at(&service, "interview");
    service
        .execute(&recruiter(), application.id, reject_request())
        .expect("reject succeeds");

    let history = service.history(&recruiter(), application.id).expect("history loads");
    let stored = service
        .application(application.id)
        .expect("application loads");
    assert_eq!(history.current_stage(), Some(stored.stage.as_str()));
    assert_eq!(
        history
            .stages
            .iter()
            .map(|entry| entry.to_stage.as_str())
            .collect::<Vec<_>>(),
        vec!["applied", "screening", "assessment", "interview", "rejected"]
    );
    assert_eq!(stored.status, ApplicationStatus::Rejected);
}

#[test]
fn permission_is_decided_on_the_stored_application() {
    let (service, store, dispatcher) = build_service();
    let application = application_at(&service, "screening");
    let (actions_before, stages_before) = log_counts(&store, application.id);
    let rival = ActorContext::company(UserId(13), CompanyId(666));

    let mut forged = application.clone();
    forged.job_owner = Owner::Company(CompanyId(666));
    let result = service.execute_against(&rival, &forged, reject_request());

    assert!(matches!(result, Err(PipelineError::Forbidden(_))));
    assert_eq!(stored_application(&store, application.id), application);
    assert_eq!(
        log_counts(&store, application.id),
        (actions_before, stages_before)
    );

    let mut impersonated = application.clone();
    impersonated.applicant_id = UserId(900);
    let result = service.execute_against(
        &ActorContext::graduate(UserId(900)),
        &impersonated,
        ActionRequest::new(ActionCommand::Withdraw(ClosureDetails { reason: None })),
    );
    assert!(matches!(result, Err(PipelineError::Forbidden(_))));
    assert_eq!(stored_application(&store, application.id).stage, "screening");
    assert_eq!(dispatcher.messages().len(), 1);
}

#[test]
fn callers_without_standing_are_refused_before_payload_checks() {
    let (service, store, _) = build_service();
    let application = application_at(&service, "interview");
    let rival = ActorContext::company(UserId(13), CompanyId(666));
    let submission = ActionSubmission::new(ActionKey::ScheduleInterview)
        .with_payload(json!({ "date": "next tuesday" }));

    assert!(matches!(
        service.submit(&rival, application.id, submission.clone()),
        Err(PipelineError::Forbidden(_))
    ));
    assert!(matches!(
        service.submit(&recruiter(), application.id, submission),
        Err(PipelineError::ValidationFailed(errors)) if errors.has_field("date")
    ));
    assert_eq!(log_counts(&store, application.id).0, 0);
}

#[test]
fn transition_to_the_current_stage_changes_nothing_and_sends_nothing() {
    let (service, store, dispatcher) = build_service();
    let application = application_at(&service, "assessment");
    let sent = dispatcher.messages().len();
    let (actions_before, stages_before) = log_counts(&store, application.id);

    let outcome = service
        .execute(
            &recruiter(),
            application.id,
            ActionRequest::new(ActionCommand::Transition {
                to: "assessment".to_string(),
                note: None,
            }),
        )
        .expect("transition accepted");

    assert!(!outcome.stage_changed);
    assert_eq!(outcome.message, "Already at Assessment.");
    assert_eq!(outcome.application, application);
    assert_eq!(dispatcher.messages().len(), sent);
    assert_eq!(
        log_counts(&store, application.id),
        (actions_before + 1, stages_before)
    );
}

#[test]
fn audit_reads_are_scoped_to_the_caller() {
    let (service, _, _) = build_service();
    let application = application_at(&service, "interview");
    service
        .execute(
            &recruiter(),
            application.id,
            ActionRequest::new(ActionCommand::RecordInterviewFeedback(InterviewFeedback {
                rating: 2,
                feedback: "Weak communicator".to_string(),
                recommendation: None,
            })),
        )
        .expect("feedback recorded");

    let full = service
        .history(&recruiter(), application.id)
        .expect("employer history");
    assert_eq!(full.feedback().len(), 1);

    let own = service
        .history(&applicant(), application.id)
        .expect("applicant history");
    assert!(own.feedback().is_empty());
    assert_eq!(own.actions.len(), full.actions.len() - 1);
    assert_eq!(own.stages, full.stages);

    assert!(matches!(
        service.feedback(&applicant(), application.id),
        Err(PipelineError::Forbidden(_))
    ));
    for outsider in [
        ActorContext::guest(),
        ActorContext::company(UserId(13), CompanyId(666)),
    ] {
        assert!(matches!(
            service.history(&outsider, application.id),
            Err(PipelineError::Forbidden(_))
        ));
        assert!(matches!(
            service.feedback(&outsider, application.id),
            Err(PipelineError::Forbidden(_))
        ));
        assert!(matches!(
            service.view(&outsider, application.id),
            Err(PipelineError::Forbidden(_))
        ));
    }
    assert_eq!(
        service.view(&applicant(), application.id).expect("own application"),
        service.application(application.id).expect("stored")
    );
}
