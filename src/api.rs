// API client module: a small blocking HTTP client for the Canvas
// submissions API. Two operations matter here: the two-step comment file
// upload and the grade/comment `PUT`. Both sit behind `GradingApi` so the
// run loop can be driven without a network.

use crate::config::Settings;
use crate::error::UploadError;
use crate::roster::UserId;
use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::{debug, error, info};

const STAGE_INIT: &str = "upload initiation";
const STAGE_TRANSFER: &str = "file transfer";

pub const FIELD_COMMENT: &str = "comment[text_comment]";
pub const FIELD_GRADE: &str = "submission[posted_grade]";
pub const FIELD_FILE_IDS: &str = "comment[file_ids][]";

/// Remote id of an uploaded comment file. Only ever echoed back to Canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        FileId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grade and comment for one student, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub user_id: UserId,
    pub grade: String,
    pub comment: String,
    pub file_id: Option<FileId>,
}

impl Submission {
    /// Form body of the submission `PUT`.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            (FIELD_COMMENT, self.comment.clone()),
            (FIELD_GRADE, self.grade.clone()),
        ];
        if let Some(id) = &self.file_id {
            fields.push((FIELD_FILE_IDS, id.to_string()));
        }
        fields
    }
}

/// What happened to one posting attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub user_id: UserId,
    pub success: bool,
    /// `None` when the request never got a response.
    pub http_status: Option<u16>,
    pub detail: String,
}

/// The two remote operations a run needs.
pub trait GradingApi {
    /// Upload `path` as a comment file for `user_id` and return its id.
    fn upload_comment_file(&self, user_id: &UserId, path: &Path) -> Result<FileId, UploadError>;

    /// Post grade and comment. Never fails: every outcome is a result.
    fn post_submission(&self, submission: &Submission) -> SubmissionResult;
}

/// Response of the upload initiation call.
#[derive(Deserialize, Debug)]
struct UploadTicket {
    upload_url: String,
    #[serde(default)]
    upload_params: serde_json::Map<String, Value>,
}

/// Blocking Canvas client holding the HTTP client and the run settings.
pub struct ApiClient {
    client: Client,
    settings: Settings,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            settings: settings.clone(),
        })
    }

    fn start_upload(
        &self,
        user_id: &UserId,
        path: &Path,
        name: &str,
        size: u64,
    ) -> Result<UploadTicket, UploadError> {
        let url = self.settings.comment_files_url(user_id);
        let form = [
            ("name", name.to_string()),
            ("size", size.to_string()),
            ("content_type", content_type_for(path).to_string()),
        ];

        let res = self
            .client
            .post(&url)
            .bearer_auth(self.settings.token().expose())
            .form(&form)
            .send()
            .map_err(|source| UploadError::Request { stage: STAGE_INIT, source })?;
        let res = ensure_success(res, STAGE_INIT)?;
        let ticket: UploadTicket = res.json().map_err(|e| UploadError::InvalidResponse {
            stage: STAGE_INIT,
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), "file upload started");
        Ok(ticket)
    }

    fn transfer(
        &self,
        ticket: UploadTicket,
        path: &Path,
        name: &str,
        size: u64,
    ) -> Result<Value, UploadError> {
        let file = File::open(path).map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // Storage targets reject chunked bodies, so the part must be sized.
        let part = multipart::Part::reader_with_length(file, size)
            .file_name(name.to_string())
            .mime_str(content_type_for(path))
            .map_err(|source| UploadError::Request { stage: STAGE_TRANSFER, source })?;

        // Canvas expects the returned params first and the file last.
        let mut form = multipart::Form::new();
        for (key, value) in ticket.upload_params {
            form = form.text(key, param_text(value));
        }
        let form = form.part("file", part);

        // The upload target is pre-signed; it gets no bearer header.
        let res = self
            .client
            .post(&ticket.upload_url)
            .multipart(form)
            .send()
            .map_err(|source| UploadError::Request { stage: STAGE_TRANSFER, source })?;
        let res = ensure_success(res, STAGE_TRANSFER)?;
        let body = res
            .text()
            .map_err(|source| UploadError::Request { stage: STAGE_TRANSFER, source })?;
        Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
    }
}

impl GradingApi for ApiClient {
    fn upload_comment_file(&self, user_id: &UserId, path: &Path) -> Result<FileId, UploadError> {
        info!(%user_id, "uploading file");
        if !path.exists() {
            error!(path = %path.display(), "file does not exist");
            return Err(UploadError::NotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("attachment")
            .to_string();

        let size = std::fs::metadata(path)
            .map_err(|source| UploadError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let ticket = self.start_upload(user_id, path, &name, size)?;
        let body = self.transfer(ticket, path, &name, size)?;
        let id = extract_file_id(&body)
            .ok_or_else(|| UploadError::MissingFileId(path.to_path_buf()))?;
        info!(path = %path.display(), file_id = %id, outcome = "success", "file uploaded");
        Ok(id)
    }

    fn post_submission(&self, submission: &Submission) -> SubmissionResult {
        let url = self.settings.submission_url(&submission.user_id);
        debug!(%url, "posting submission");

        let sent = self
            .client
            .put(&url)
            .bearer_auth(self.settings.token().expose())
            .form(&submission.form_fields())
            .send();

        match sent {
            Ok(res) => {
                let status = res.status();
                let body = res.text().unwrap_or_default();
                if status == StatusCode::OK {
                    SubmissionResult {
                        user_id: submission.user_id.clone(),
                        success: true,
                        http_status: Some(status.as_u16()),
                        detail: "posted".into(),
                    }
                } else {
                    debug!(%url, response = %body, "submission rejected");
                    SubmissionResult {
                        user_id: submission.user_id.clone(),
                        success: false,
                        http_status: Some(status.as_u16()),
                        detail: body,
                    }
                }
            }
            Err(e) => {
                debug!(%url, "failed request");
                SubmissionResult {
                    user_id: submission.user_id.clone(),
                    success: false,
                    http_status: None,
                    detail: e.to_string(),
                }
            }
        }
    }
}

/// Stand-in used by `--dry-run`: logs what would be sent, touches nothing.
pub struct DryRunApi<'a> {
    settings: &'a Settings,
}

impl<'a> DryRunApi<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        DryRunApi { settings }
    }
}

impl GradingApi for DryRunApi<'_> {
    fn upload_comment_file(&self, user_id: &UserId, path: &Path) -> Result<FileId, UploadError> {
        if !path.exists() {
            return Err(UploadError::NotFound(path.to_path_buf()));
        }
        info!(
            url = %self.settings.comment_files_url(user_id),
            path = %path.display(),
            content_type = content_type_for(path),
            "dry run: would upload file"
        );
        Ok(FileId::new("dry-run"))
    }

    fn post_submission(&self, submission: &Submission) -> SubmissionResult {
        info!(
            url = %self.settings.submission_url(&submission.user_id),
            fields = ?submission.form_fields(),
            "dry run: would post submission"
        );
        SubmissionResult {
            user_id: submission.user_id.clone(),
            success: true,
            http_status: None,
            detail: "dry run".into(),
        }
    }
}

fn ensure_success(res: Response, stage: &'static str) -> Result<Response, UploadError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().unwrap_or_default();
    error!(stage, status, "upload step failed");
    Err(UploadError::Status { stage, status, body })
}

/// Upload params are echoed back as text fields.
fn param_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Pull the file id out of the transfer response.
pub fn extract_file_id(body: &Value) -> Option<FileId> {
    match body.get("id")? {
        Value::Number(n) => Some(FileId::new(n.to_string())),
        Value::String(s) if !s.trim().is_empty() => Some(FileId::new(s.trim())),
        _ => None,
    }
}

/// MIME type declared for an attachment, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("java") | Some("py") | Some("c") | Some("cpp") | Some("h") => {
            "text/plain"
        }
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/pdf",
    }
}
