//! REST API types for frontend integration.
//!
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ImportError;
use crate::import::ImportSummary;
use crate::models::{CandidateRecord, ClassRef, ValidationIssue};
use crate::upload::{BulkUploadResult, FileInfo, PipelineOutput};

/// Response sent after an upload has been validated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning", "blocked"
    pub status: UploadStatus,

    /// Rows, issues and counts
    pub result: BulkUploadResult,

    /// Details about the parsed file
    pub file_info: FileInfo,
}

/// Whether an upload can be imported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// No issues at all
    Ready,
    /// Only warnings; every row is importable
    Warning,
    /// At least one row has errors
    Blocked,
}

impl UploadStatus {
    pub fn of(result: &BulkUploadResult) -> Self {
        if result.error_count() > 0 {
            UploadStatus::Blocked
        } else if result.warning_count() > 0 {
            UploadStatus::Warning
        } else {
            UploadStatus::Ready
        }
    }
}

impl From<PipelineOutput> for UploadResponse {
    fn from(output: PipelineOutput) -> Self {
        UploadResponse {
            job_id: Uuid::new_v4().to_string(),
            status: UploadStatus::of(&output.result),
            result: output.result,
            file_info: output.file_info,
        }
    }
}

/// Body of `POST /api/students/template`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    #[serde(default)]
    pub known_classes: Vec<ClassRef>,
}

/// Body of `POST /api/students/errors`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorsRequest {
    pub errors: Vec<ValidationIssue>,
}

/// Body of `POST /api/students/import`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub records: Vec<CandidateRecord>,
    /// Overrides the configured batch size
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Response of a completed import
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub job_id: String,
    pub status: String,
    pub summary: ImportSummary,
}

impl From<ImportSummary> for ImportResponse {
    fn from(summary: ImportSummary) -> Self {
        ImportResponse {
            job_id: Uuid::new_v4().to_string(),
            status: "imported".to_string(),
            summary,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

/// Error response for a halted import; reports what was committed.
pub fn import_error_response(error: &ImportError) -> Value {
    let mut body = error_response(&error.to_string());
    body["imported"] = json!(error.imported());
    body
}
