use crate::infra::{build_pipeline, load_stage_templates, ApiPipelineService, LoggingOutbox};
use chrono::Utc;
use clap::Args;
use serde_json::json;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use talent_pipeline::config::PipelineConfig;
use talent_pipeline::error::AppError;
use talent_pipeline::workflows::pipeline::{
    write_timeline_csv, ActionKey, ActionMenu, ActionSubmission, ActorContext, ApplicationHistory,
    ApplicationId, CompanyId, ExecutionOutcome, JobId, NewApplication, Owner, PipelineStage, UserId,
};

#[derive(Args, Debug, Default)]
pub(crate) struct StagesArgs {
    /// CSV seed (slug,name,position,is_terminal[,active]) to validate and print instead of the defaults
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Optional stage seed used in place of the built-in catalog
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
    /// Company that owns the demo job posting
    #[arg(long, default_value_t = 1)]
    pub(crate) company_id: u64,
    /// Applicant user id
    #[arg(long, default_value_t = 100)]
    pub(crate) applicant_id: u64,
    /// Have the applicant decline the offer instead of accepting it
    #[arg(long)]
    pub(crate) decline: bool,
    /// Write the resulting action timeline as CSV to this path
    #[arg(long)]
    pub(crate) timeline: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct AuditExportArgs {
    /// Application history JSON as served by GET /api/v1/applications/:id/history (stdin when omitted)
    #[arg(long)]
    pub(crate) history: Option<PathBuf>,
    /// Destination CSV file (stdout when omitted)
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_stages(args: StagesArgs) -> Result<(), AppError> {
    let templates = load_stage_templates(&PipelineConfig {
        stage_seed: args.seed,
    })?;
    let (service, _) = build_pipeline(&templates)?;
    let stages = service.stages(&ActorContext::guest())?;
    render_stages(&stages);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        seed,
        company_id,
        applicant_id,
        decline,
        timeline,
    } = args;

    let templates = load_stage_templates(&PipelineConfig { stage_seed: seed })?;
    let (service, outbox) = build_pipeline(&templates)?;

    let company = CompanyId(company_id);
    let recruiter = ActorContext::company(UserId(1), company);
    let applicant = ActorContext::graduate(UserId(applicant_id));

    println!("Application pipeline demo ({})", Utc::now().format("%Y-%m-%d %H:%M UTC"));
    let stages = service.stages(&recruiter)?;
    println!("\nCompany {company} pipeline");
    render_stages(&stages);

    let application = service.open_application(NewApplication {
        job_id: JobId(1),
        job_owner: Owner::Company(company),
        applicant_id: UserId(applicant_id),
    })?;
    println!(
        "\nOpened application #{} for applicant {} at '{}'",
        application.id, application.applicant_id, application.stage
    );

    let mut stage = application.stage.clone();
    while stage != "offer" {
        let menu = service.actions_for(&recruiter, application.id)?;
        render_menu("Recruiter", &menu);
        if !offers(&menu, ActionKey::MoveNext) {
            println!("\nNo offer stage reachable from '{stage}'; stopping.");
            return finish(&service, &outbox, &recruiter, application.id, timeline);
        }
        let outcome = service.submit(
            &recruiter,
            application.id,
            ActionSubmission::new(ActionKey::MoveNext),
        )?;
        render_outcome(&outcome);
        stage = outcome.application.stage;
    }

    let outcome = service.submit(
        &recruiter,
        application.id,
        ActionSubmission::new(ActionKey::SendOffer).with_payload(json!({
            "job_title": "Junior Developer",
            "start_date": Utc::now().date_naive().to_string(),
            "message": "We look forward to working with you."
        })),
    )?;
    render_outcome(&outcome);

    let menu = service.actions_for(&applicant, application.id)?;
    render_menu("Applicant", &menu);
    let response = if decline {
        ActionSubmission::new(ActionKey::DeclineOffer)
            .with_payload(json!({ "reason": "Accepted another role" }))
    } else {
        ActionSubmission::new(ActionKey::AcceptOffer)
    };
    let outcome = service.submit(&applicant, application.id, response)?;
    render_outcome(&outcome);

    if !decline {
        let outcome = service.submit(
            &recruiter,
            application.id,
            ActionSubmission::new(ActionKey::Hire),
        )?;
        render_outcome(&outcome);
    }

    finish(&service, &outbox, &recruiter, application.id, timeline)
}

pub(crate) fn run_audit_export(args: AuditExportArgs) -> Result<(), AppError> {
    let history: ApplicationHistory = match &args.history {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw)?;
            serde_json::from_str(&raw)?
        }
    };

    match &args.output {
        Some(path) => {
            write_timeline_csv(File::create(path)?, &history.actions)?;
            println!(
                "Wrote {} timeline rows to {}",
                history.actions.len(),
                path.display()
            );
        }
        None => write_timeline_csv(io::stdout().lock(), &history.actions)?,
    }
    Ok(())
}

fn finish(
    service: &ApiPipelineService,
    outbox: &LoggingOutbox,
    recruiter: &ActorContext,
    application_id: ApplicationId,
    timeline: Option<PathBuf>,
) -> Result<(), AppError> {
    let messages = outbox.messages();
    println!("\nMessages dispatched: {}", messages.len());
    for message in &messages {
        println!("- [{}] {}", message.action.as_str(), message.subject);
    }

    let history = service.history(recruiter, application_id)?;
    println!("\nStage trail");
    for entry in &history.stages {
        println!(
            "- {} -> {} at {}",
            entry.from_stage.as_deref().unwrap_or("(new)"),
            entry.to_stage,
            entry.created_at.format("%H:%M:%S")
        );
    }

    if let Some(path) = timeline {
        let mut file = File::create(&path)?;
        write_timeline_csv(&mut file, &history.actions)?;
        file.flush()?;
        println!("\nTimeline written to {}", path.display());
    }
    Ok(())
}

fn offers(menu: &ActionMenu, key: ActionKey) -> bool {
    menu.actions.iter().any(|action| action.key == key)
}

fn render_stages(stages: &[PipelineStage]) {
    for stage in stages {
        let mut flags = Vec::new();
        if stage.is_terminal {
            flags.push("terminal");
        }
        if !stage.active {
            flags.push("inactive");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        println!("{:>2}. {} [{}]{}", stage.position, stage.name, stage.slug, flags);
    }
}

fn render_menu(party: &str, menu: &ActionMenu) {
    let labels: Vec<&str> = menu
        .actions
        .iter()
        .map(|action| action.label.as_str())
        .collect();
    println!(
        "\n{party} options at '{}' ({}): {}",
        menu.stage,
        menu.status.label(),
        labels.join(", ")
    );
}

fn render_outcome(outcome: &ExecutionOutcome) {
    let marker = if outcome.stage_changed { "->" } else { "==" };
    println!(
        "  {} {} '{}' [{}]",
        outcome.message,
        marker,
        outcome.application.stage,
        outcome.application.status.label()
    );
}
