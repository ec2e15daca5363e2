//! Error types for the Rollbook upload pipeline.
//!
//! - [`ParseError`] - Whole-file parsing failures (fatal, nothing is validated)
//! - [`ReferenceError`] - Invalid reference data (known classes, existing students)
//! - [`ExportError`] - Writing a template or error report failed
//! - [`ImportBatchError`] - Failure reported by the import collaborator
//! - [`ImportError`] - Batch import driver halted
//! - [`ConfigError`] - Invalid environment configuration
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP surface errors
//!
//! Per-row validation problems are not errors: they are
//! [`ValidationIssue`](crate::models::ValidationIssue) values.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::parser::FileFormat;

// =============================================================================
// Parse Errors
// =============================================================================

/// Errors that abort parsing of an uploaded file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Format could not be determined from content type or extension.
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Content does not look like the declared format.
    #[error("File declared as {declared} but its content looks like {detected}")]
    FormatMismatch { declared: FileFormat, detected: String },

    /// Zero rows, not even a header.
    #[error("File is empty")]
    EmptyFile,

    /// A header row but nothing after it.
    #[error("File has a header row but no data rows")]
    NoDataRows,

    /// Malformed CSV.
    #[error("Invalid CSV at line {line}: {message}")]
    Csv { line: u64, message: String },

    /// Unreadable workbook.
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    /// Text could not be decoded.
    #[error("Failed to decode content: {0}")]
    Encoding(String),
}

// =============================================================================
// Reference Data Errors
// =============================================================================

/// Errors loading caller-supplied reference data.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// Schema validation failed.
    #[error("Invalid {kind}: {errors:?}")]
    Schema { kind: &'static str, errors: Vec<String> },

    /// JSON error.
    #[error("Reference JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("Reference IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors producing or writing an exported CSV.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization failed.
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    /// Writing the export file failed.
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Import Errors
// =============================================================================

/// Failure raised by the import collaborator for one batch.
#[derive(Debug, Error)]
pub enum ImportBatchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Collaborator answered with a non-success status.
    #[error("Import endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other collaborator failure.
    #[error("{0}")]
    Other(String),
}

/// Reasons the batch import driver stopped.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Batch size must be at least 1.
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    /// A batch call failed; earlier batches stay committed.
    #[error("Batch {batch} of {total_batches} failed after {imported} records were imported: {source}")]
    Batch {
        batch: usize,
        total_batches: usize,
        imported: usize,
        #[source]
        source: ImportBatchError,
    },

    /// A batch call returned `false`; earlier batches stay committed.
    #[error("Batch {batch} of {total_batches} was rejected after {imported} records were imported")]
    Rejected {
        batch: usize,
        total_batches: usize,
        imported: usize,
    },

    /// No import endpoint configured.
    #[error("No import endpoint configured (set ROLLBOOK_IMPORT_URL or pass --endpoint)")]
    MissingEndpoint,
}

impl ImportError {
    /// Records committed before the driver stopped.
    pub fn imported(&self) -> usize {
        match self {
            ImportError::Batch { imported, .. } | ImportError::Rejected { imported, .. } => *imported,
            _ => 0,
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors reading settings from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be used.
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Reference data error.
    #[error("Reference data error: {0}")]
    Reference(#[from] ReferenceError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Import error.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Upload contains blocking errors and cannot be imported.
    #[error("{0} rows have blocking errors; fix the file before importing")]
    BlockingErrors(usize),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for reference data operations.
pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for batch import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
