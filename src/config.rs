// Run configuration. Built once at startup from command-line overrides,
// environment variables and the defaults below, then passed by reference
// to every component. Nothing mutates it after `Settings::resolve`.

use crate::error::ConfigError;
use crate::roster::UserId;
use crate::runner::UploadFailurePolicy;
use std::fmt;
use std::path::PathBuf;

pub const TOKEN_VAR: &str = "CANVAS_AUTH_TOKEN";
pub const BASE_URL_VAR: &str = "CANVAS_API_BASE";
pub const COURSE_VAR: &str = "CANVAS_COURSE_ID";
pub const ASSIGNMENT_VAR: &str = "CANVAS_ASSIGNMENT_ID";

pub const DEFAULT_BASE_URL: &str = "https://uta.instructure.com/api/v1";
pub const DEFAULT_COURSE_ID: u64 = 197600;
pub const DEFAULT_ASSIGNMENT_ID: u64 = 1746394;
pub const DEFAULT_ASSIGNMENT_NAME: &str = "P11";
pub const DEFAULT_CSV: &str = "Grades.csv";

/// Bearer token. `Debug` is redacted so settings can be logged.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Values given on the command line. `None` falls through to the
/// environment, then to the built-in default.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub csv_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub course_id: Option<u64>,
    pub assignment_id: Option<u64>,
    pub assignment_name: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub continue_on_upload_error: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub course_id: u64,
    pub assignment_id: u64,
    pub assignment_name: String,
    pub csv_path: PathBuf,
    pub log_dir: PathBuf,
    pub dry_run: bool,
    pub upload_policy: UploadFailurePolicy,
    pub assume_yes: bool,
    token: AccessToken,
}

impl Settings {
    /// Resolve settings against the process environment.
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve settings against an arbitrary variable lookup.
    pub fn resolve<F>(overrides: Overrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = env(TOKEN_VAR)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken(TOKEN_VAR))?;

        let base_url = match overrides.base_url.or_else(|| env(BASE_URL_VAR)) {
            Some(url) => parse_base_url(url)?,
            None => DEFAULT_BASE_URL.to_string(),
        };

        let course_id = match overrides.course_id {
            Some(id) => id,
            None => env(COURSE_VAR)
                .map(|v| parse_id("course id", v))
                .transpose()?
                .unwrap_or(DEFAULT_COURSE_ID),
        };
        let assignment_id = match overrides.assignment_id {
            Some(id) => id,
            None => env(ASSIGNMENT_VAR)
                .map(|v| parse_id("assignment id", v))
                .transpose()?
                .unwrap_or(DEFAULT_ASSIGNMENT_ID),
        };

        let upload_policy = if overrides.continue_on_upload_error {
            UploadFailurePolicy::SkipRow
        } else {
            UploadFailurePolicy::AbortRun
        };

        Ok(Settings {
            base_url,
            course_id,
            assignment_id,
            assignment_name: overrides
                .assignment_name
                .unwrap_or_else(|| DEFAULT_ASSIGNMENT_NAME.to_string()),
            csv_path: overrides.csv_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CSV)),
            log_dir: overrides.log_dir.unwrap_or_else(|| PathBuf::from(".")),
            dry_run: overrides.dry_run,
            upload_policy,
            assume_yes: overrides.assume_yes,
            token: AccessToken(token),
        })
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// `PUT` target for a student's submission.
    pub fn submission_url(&self, user_id: &UserId) -> String {
        format!(
            "{}/courses/{}/assignments/{}/submissions/{}",
            self.base_url, self.course_id, self.assignment_id, user_id
        )
    }

    /// `POST` target that starts a comment file upload.
    pub fn comment_files_url(&self, user_id: &UserId) -> String {
        format!("{}/comments/files", self.submission_url(user_id))
    }
}

fn parse_base_url(value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(ConfigError::InvalidValue { field: "base url", value });
    }
    Ok(trimmed.to_string())
}

fn parse_id(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue { field, value })
}
