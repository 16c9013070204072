use crate::demo::{
    run_audit_export, run_demo, run_stages, AuditExportArgs, DemoArgs, StagesArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use talent_pipeline::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Talent Pipeline",
    about = "Run and demonstrate the job application pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the stage catalog new companies are provisioned with
    Stages(StagesArgs),
    /// Walk one application from submission to hire
    Demo(DemoArgs),
    /// Audit trail tooling
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Convert an application history document into a CSV timeline
    Export(AuditExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override PIPELINE_STAGE_SEED with a CSV stage seed
    #[arg(long)]
    pub(crate) stage_seed: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Stages(args) => run_stages(args),
        Command::Demo(args) => run_demo(args),
        Command::Audit {
            command: AuditCommand::Export(args),
        } => run_audit_export(args),
    }
}
