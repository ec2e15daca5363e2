//! # Rollbook - bulk student upload validation and import
//!
//! Rollbook reads student rosters from Excel or CSV files, checks every row
//! against the school's classes and existing students, reports what is wrong,
//! and imports the valid records in throttled batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │ XLSX/XLS/CSV│──▶│  Parser  │──▶│ Validator │──▶│ Aggregator │──▶│ Importer │
//! │   upload    │   │(auto-enc)│   │ (5 rules) │   │  (result)  │   │ (batches)│
//! └─────────────┘   └──────────┘   └───────────┘   └─────┬──────┘   └──────────┘
//!                                                        ▼
//!                                             Reporter (template / error CSV)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rollbook::{process_file, ReferenceData, ValidationOptions};
//!
//! let output = process_file(Path::new("roster.csv"), &reference, &ValidationOptions::default())?;
//! println!("{} rows, {} errors", output.result.processed_count(), output.result.error_count());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, issues, candidate records, reference data
//! - [`parser`] - CSV and Excel parsing with auto-detection
//! - [`validation`] - Row rules, identity keys, reference JSON schemas
//! - [`upload`] - Parse → validate → aggregate pipeline
//! - [`report`] - Template and error report CSV exports
//! - [`import`] - Sequential batch import driver
//! - [`config`] - Settings from the environment
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Upload pipeline
pub mod upload;

// Exports
pub mod report;

// Import
pub mod import;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ExportError, ImportBatchError, ImportError, ParseError, PipelineError, ReferenceError,
    ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CandidateRecord, CellValue, ClassRef, Column, ExistingStudent, Guardian, RawRow, ReferenceData, Severity,
    ValidationIssue,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_content, detect_delimiter, detect_encoding, parse_bytes, parse_file, ContentKind,
    FileFormat, ParsedFile,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    load_existing_students, load_known_classes, validate_reference_json, IdentityKey, ReferenceKind,
    RowOutcome, ValidationOptions, Validator,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use upload::{process_file, process_upload, BulkUploadResult, FileInfo, PipelineOutput};

// =============================================================================
// Re-exports - Exports
// =============================================================================

pub use report::{export_template, export_validation_errors, ExportFile, ExportKind};

// =============================================================================
// Re-exports - Import
// =============================================================================

pub use import::{
    import_in_batches, BatchImporter, HttpImporter, ImportOptions, ImportProgress, ImportSummary,
};

// =============================================================================
// Re-exports - Config
// =============================================================================

pub use config::Settings;

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
