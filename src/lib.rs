// Library root
// -----------
// Posts grades and feedback from a CSV file to a Canvas assignment. The
// binary (`main.rs`) wires these modules together for a single run.
//
// Module responsibilities:
// - `roster`: loads and validates the grades CSV.
// - `config`: resolves the token, course and assignment for the run.
// - `api`: talks to Canvas (comment file upload, grade posting).
// - `runner`: walks the rows and tallies the outcome.
// - `ui`: confirmation prompt, progress bar and the final summary.
// - `logging`: console and rotating file output.
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod roster;
pub mod runner;
pub mod ui;

pub use api::{ApiClient, DryRunApi, FileId, GradingApi, Submission, SubmissionResult};
pub use config::{Overrides, Settings};
pub use error::{ConfigError, LoadError, RunError, UploadError};
pub use roster::{GradeRow, PostFlag, Roster, UserId};
pub use runner::{RowOutcome, RunSummary, Runner, UploadFailurePolicy};
