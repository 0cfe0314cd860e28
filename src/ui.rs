// UI layer: the few things the user sees outside the log. A confirmation
// before a live run, a progress bar while rows are processed, and the
// final tally.

use crate::config::Settings;
use crate::roster::{PostFlag, Roster};
use crate::runner::RunSummary;
use anyhow::Result;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

/// Ask before touching live grades. Skipped for dry runs, `--yes`, and
/// when nobody is at the terminal.
pub fn confirm_run(settings: &Settings, roster: &Roster) -> Result<bool> {
    if settings.dry_run || settings.assume_yes || !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    let to_post = roster
        .rows()
        .iter()
        .filter(|r| r.post_flag == Some(PostFlag::Yes))
        .count();
    let prompt = format!(
        "Post {} of {} rows to course {} assignment {} ({})?",
        to_post,
        roster.len(),
        settings.course_id,
        settings.assignment_id,
        settings.assignment_name
    );
    let answer = Confirm::new().with_prompt(prompt).default(false).interact()?;
    Ok(answer)
}

/// One tick per row.
pub fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Lines printed after the run.
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let posted_label = if summary.dry_run {
        "Would post:          "
    } else {
        "Posted:              "
    };
    let mut lines = vec![
        format!("Rows processed:      {}", summary.total),
        format!("{posted_label}{}", summary.posted),
        format!("Failed to post:      {}", summary.failed),
        format!("Skipped (post = N):  {}", summary.skipped),
    ];
    if summary.upload_failed > 0 {
        lines.push(format!("Upload failed:       {}", summary.upload_failed));
    }
    lines.push(format!("Not posted (total):  {}", summary.not_posted()));
    lines
}

/// Closing line for the log and the terminal.
pub fn completion_message(assignment_name: &str, dry_run: bool) -> String {
    if dry_run {
        format!("Dry run for {assignment_name} finished; nothing was posted to Canvas.")
    } else {
        format!("Submission comments and grades for {assignment_name} posted to Canvas!")
    }
}

pub fn print_summary(summary: &RunSummary) {
    for line in summary_lines(summary) {
        println!("{line}");
    }
}
