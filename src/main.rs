// Entrypoint for the grade poster.
// - Keeps `main` small: parse options, set up logging, then hand over to
//   `run`, which returns on the first fatal error.

use anyhow::Result;
use bpaf::*;
use canvas_grade_poster::{
    config::Overrides, logging, roster, ui, ApiClient, DryRunApi, GradingApi, Roster, RunError,
    RunSummary, Runner, Settings,
};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Parse the command line into settings overrides.
fn options() -> Overrides {
    let base_url = long("base-url")
        .help("Canvas API base URL")
        .argument::<String>("URL")
        .optional();
    let course_id = long("course")
        .help("Canvas course id")
        .argument::<u64>("ID")
        .optional();
    let assignment_id = long("assignment")
        .help("Canvas assignment id")
        .argument::<u64>("ID")
        .optional();
    let assignment_name = long("assignment-name")
        .help("Assignment name used in messages")
        .argument::<String>("NAME")
        .optional();
    let log_dir = long("log-dir")
        .help("Directory for the rotating log file")
        .argument::<PathBuf>("DIR")
        .optional();
    let dry_run = long("dry-run")
        .help("Validate and log every request without sending anything")
        .switch();
    let continue_on_upload_error = long("continue-on-upload-error")
        .help("Skip a student whose attachment fails to upload instead of stopping")
        .switch();
    let assume_yes = short('y')
        .long("yes")
        .help("Do not ask for confirmation")
        .switch();
    let csv_path = positional::<PathBuf>("CSV")
        .help("Grades file with user_id, Grades and Comments columns")
        .optional();

    construct!(Overrides {
        base_url,
        course_id,
        assignment_id,
        assignment_name,
        log_dir,
        dry_run,
        continue_on_upload_error,
        assume_yes,
        csv_path,
    })
    .to_options()
    .descr("Post grades and feedback from a CSV file to Canvas")
    .run()
}

fn execute<A: GradingApi>(
    api: &A,
    settings: &Settings,
    roster: &Roster,
) -> Result<RunSummary, RunError> {
    Runner::new(api, settings.upload_policy)
        .dry_run(settings.dry_run)
        .with_progress(ui::progress_bar(roster.len()))
        .run(roster)
}

fn run(overrides: Overrides) -> Result<()> {
    let settings = Settings::from_env(overrides)?;
    info!("Access token successfully retrieved.");

    let roster = roster::load(&settings.csv_path)?;

    if !ui::confirm_run(&settings, &roster)? {
        info!("Run cancelled, nothing was posted");
        return Ok(());
    }

    let summary = if settings.dry_run {
        execute(&DryRunApi::new(&settings), &settings, &roster)?
    } else {
        let api = ApiClient::new(&settings)?;
        execute(&api, &settings, &roster)?
    };

    ui::print_summary(&summary);
    let message = ui::completion_message(&settings.assignment_name, settings.dry_run);
    if settings.dry_run {
        info!("{message}");
    } else {
        info!(outcome = "success", "{message}");
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv().ok();
    let overrides = options();

    let log_dir = overrides.log_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    if let Err(e) = logging::init(&log_dir) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    info!("Starting program...");

    match run(overrides) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
