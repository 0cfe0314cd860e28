// Run orchestrator: walks the roster once, in order, deciding per row
// whether to skip, upload then post, or post directly.

use crate::api::{GradingApi, Submission, SubmissionResult};
use crate::error::{RunError, UploadError};
use crate::roster::{GradeRow, PostFlag, Roster};
use indicatif::ProgressBar;
use tracing::{error, info, info_span, warn};

/// What a failed attachment upload does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadFailurePolicy {
    /// Stop the whole run.
    #[default]
    AbortRun,
    /// Log it, leave the student ungraded, move on.
    SkipRow,
}

/// How one row ended.
#[derive(Debug)]
pub enum RowOutcome {
    Skipped,
    Submitted(SubmissionResult),
    UploadFailed(UploadError),
}

#[derive(Debug, Default)]
pub struct RunSummary {
    /// Nothing was sent; `posted` counts rows that would have been.
    pub dry_run: bool,
    pub total: usize,
    pub posted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub upload_failed: usize,
    pub results: Vec<SubmissionResult>,
}

impl RunSummary {
    /// Rows that did not end up posted, for whatever reason.
    pub fn not_posted(&self) -> usize {
        self.total - self.posted
    }

    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::Submitted(result) => {
                if result.success {
                    self.posted += 1;
                } else {
                    self.failed += 1;
                }
                self.results.push(result);
            }
            RowOutcome::UploadFailed(_) => self.upload_failed += 1,
        }
    }
}

pub struct Runner<'a, A: GradingApi> {
    api: &'a A,
    policy: UploadFailurePolicy,
    progress: ProgressBar,
    dry_run: bool,
}

impl<'a, A: GradingApi> Runner<'a, A> {
    pub fn new(api: &'a A, policy: UploadFailurePolicy) -> Self {
        Runner {
            api,
            policy,
            progress: ProgressBar::hidden(),
            dry_run: false,
        }
    }

    /// Word outcomes as "would post" rather than "posted".
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Advance `progress` once per row.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Process every row. Returns early only on a fatal row error.
    pub fn run(&self, roster: &Roster) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary {
            dry_run: self.dry_run,
            total: roster.len(),
            ..RunSummary::default()
        };
        info!("Number of students to process: {}", summary.total);

        for row in roster.rows() {
            let span = info_span!("row", index = row.index, user_id = %row.user_id);
            let _enter = span.enter();

            // Row logs go to the same terminal as the bar.
            let outcome = match self.progress.suspend(|| self.process_row(row)) {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.progress.abandon();
                    return Err(e);
                }
            };
            self.progress.inc(1);
            summary.record(outcome);
        }
        self.progress.finish_and_clear();

        if self.dry_run {
            info!("Dry run: {} submissions would be posted", summary.posted);
            return Ok(summary);
        }
        info!("Total submissions posted: {}", summary.posted);
        if summary.not_posted() > 0 {
            error!(
                failed = summary.failed,
                skipped = summary.skipped,
                upload_failed = summary.upload_failed,
                "Total submissions not posted: {}",
                summary.not_posted()
            );
        }
        Ok(summary)
    }

    /// Decide what to do with one row and do it.
    pub fn process_row(&self, row: &GradeRow) -> Result<RowOutcome, RunError> {
        let student = row.display_name();
        let user_id = &row.user_id;

        match row.post_flag {
            None => {
                error!(student, %user_id, "post flag is missing");
                return Err(RunError::MissingPostFlag {
                    row: row.index,
                    user_id: user_id.to_string(),
                });
            }
            Some(PostFlag::No) => {
                info!("Skipping {student}: {user_id} as post flag is 'N'.");
                return Ok(RowOutcome::Skipped);
            }
            Some(PostFlag::Yes) => {}
        }

        let file_id = match row.file_path.as_deref() {
            Some(path) if path.exists() => match self.api.upload_comment_file(user_id, path) {
                Ok(id) => Some(id),
                Err(e) => {
                    error!(student, %user_id, path = %path.display(), "file upload failed: {e}");
                    return match self.policy {
                        UploadFailurePolicy::AbortRun => Err(RunError::Upload {
                            row: row.index,
                            user_id: user_id.to_string(),
                            source: e,
                        }),
                        UploadFailurePolicy::SkipRow => Ok(RowOutcome::UploadFailed(e)),
                    };
                }
            },
            Some(path) => {
                warn!(path = %path.display(), "No valid file found for {student}, {user_id}");
                None
            }
            None => {
                info!("No file path provided for {student}, {user_id}. Skipping file upload.");
                None
            }
        };

        info!("Processing student: Name: {student}: UserId: {user_id}");
        let submission = Submission {
            user_id: user_id.clone(),
            grade: row.grade.clone(),
            comment: row.comment.clone(),
            file_id,
        };
        let result = self.api.post_submission(&submission);

        if result.success && self.dry_run {
            info!("Dry run: grade and comments would be posted for {student}: {user_id}");
        } else if result.success {
            info!(outcome = "success", "Grade and comments posted for {student}: {user_id}!");
        } else {
            match result.http_status {
                Some(status) => error!(
                    status,
                    "Failed to post grades and comment for {student}, {user_id}"
                ),
                None => error!("Request failed for {student}: {user_id}: {}", result.detail),
            }
        }
        Ok(RowOutcome::Submitted(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FileId;
    use crate::roster::UserId;
    use indicatif::ProgressDrawTarget;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    /// Answers every post with a fixed status and counts calls.
    struct Fixed {
        status: Option<u16>,
        posts: RefCell<Vec<Submission>>,
        uploads: RefCell<usize>,
    }

    impl Fixed {
        fn new(status: Option<u16>) -> Self {
            Fixed {
                status,
                posts: RefCell::new(Vec::new()),
                uploads: RefCell::new(0),
            }
        }
    }

    impl GradingApi for Fixed {
        fn upload_comment_file(&self, _: &UserId, path: &Path) -> Result<FileId, UploadError> {
            *self.uploads.borrow_mut() += 1;
            Err(UploadError::NotFound(path.to_path_buf()))
        }

        fn post_submission(&self, submission: &Submission) -> SubmissionResult {
            self.posts.borrow_mut().push(submission.clone());
            SubmissionResult {
                user_id: submission.user_id.clone(),
                success: self.status == Some(200),
                http_status: self.status,
                detail: String::new(),
            }
        }
    }

    fn row(index: usize, flag: Option<PostFlag>) -> GradeRow {
        GradeRow {
            index,
            student: Some(format!("student{index}")),
            user_id: UserId::new(format!("{}", 500 + index)),
            grade: "90".into(),
            comment: "ok".into(),
            post_flag: flag,
            file_path: None,
        }
    }

    #[test]
    fn skipped_rows_are_never_posted() {
        let api = Fixed::new(Some(200));
        let roster = Roster::new(vec![row(0, Some(PostFlag::No)), row(1, Some(PostFlag::Yes))]);
        let summary = Runner::new(&api, UploadFailurePolicy::AbortRun).run(&roster).unwrap();

        assert_eq!(api.posts.borrow().len(), 1);
        assert_eq!(api.posts.borrow()[0].user_id, UserId::new("501"));
        assert_eq!(summary.posted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.not_posted(), 1);
    }

    #[test]
    fn non_200_is_a_failure() {
        for status in [Some(201), Some(401), Some(500), None] {
            let api = Fixed::new(status);
            let roster = Roster::new(vec![row(0, Some(PostFlag::Yes))]);
            let summary = Runner::new(&api, UploadFailurePolicy::AbortRun).run(&roster).unwrap();
            assert_eq!(summary.posted, 0, "status {status:?}");
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.results[0].http_status, status);
        }
    }

    #[test]
    fn missing_post_flag_aborts() {
        let api = Fixed::new(Some(200));
        let roster = Roster::new(vec![
            row(0, Some(PostFlag::Yes)),
            row(1, None),
            row(2, Some(PostFlag::Yes)),
        ]);
        let err = Runner::new(&api, UploadFailurePolicy::SkipRow).run(&roster).unwrap_err();
        assert!(matches!(err, RunError::MissingPostFlag { row: 1, .. }));
        assert_eq!(api.posts.borrow().len(), 1);
    }

    #[test]
    fn absent_attachment_posts_without_file() {
        let api = Fixed::new(Some(200));
        let mut r = row(0, Some(PostFlag::Yes));
        r.file_path = Some(PathBuf::from("no/such/feedback.pdf"));
        let summary = Runner::new(&api, UploadFailurePolicy::AbortRun)
            .run(&Roster::new(vec![r]))
            .unwrap();
        assert_eq!(*api.uploads.borrow(), 0);
        assert_eq!(api.posts.borrow()[0].file_id, None);
        assert_eq!(summary.posted, 1);
    }

    #[test]
    fn progress_ends_at_row_count() {
        let api = Fixed::new(Some(200));
        let roster = Roster::new(vec![
            row(0, Some(PostFlag::Yes)),
            row(1, Some(PostFlag::No)),
            row(2, Some(PostFlag::Yes)),
        ]);
        let bar = ProgressBar::with_draw_target(Some(3), ProgressDrawTarget::hidden());
        Runner::new(&api, UploadFailurePolicy::AbortRun)
            .with_progress(bar.clone())
            .run(&roster)
            .unwrap();
        assert_eq!(bar.position(), 3);
        assert!(bar.is_finished());
    }

    #[test]
    fn dry_run_is_marked_on_the_summary() {
        let api = Fixed::new(Some(200));
        let roster = Roster::new(vec![row(0, Some(PostFlag::Yes))]);
        let summary = Runner::new(&api, UploadFailurePolicy::AbortRun)
            .dry_run(true)
            .run(&roster)
            .unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.posted, 1);

        let summary = Runner::new(&api, UploadFailurePolicy::AbortRun).run(&roster).unwrap();
        assert!(!summary.dry_run);
    }

    #[test]
    fn default_policy_aborts() {
        assert_eq!(UploadFailurePolicy::default(), UploadFailurePolicy::AbortRun);
    }
}
