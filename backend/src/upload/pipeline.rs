//! High-level pipeline API for student uploads.
//!
//! Combines parsing, validation and aggregation in one call, logging each
//! stage to the log broadcaster.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollbook::upload::process_file;
//! use rollbook::validation::ValidationOptions;
//!
//! let output = process_file(Path::new("roster.xlsx"), &reference, &ValidationOptions::default())?;
//! println!("{} importable, {} errors", output.result.valid_data().len(), output.result.error_count());
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use super::result::BulkUploadResult;
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::error::PipelineError;
use crate::models::ReferenceData;
use crate::parser::{parse_bytes, parse_file, FileFormat, ParsedFile};
use crate::validation::{ValidationOptions, Validator};

/// How many issues are echoed to the log per upload.
const LOGGED_ISSUES: usize = 5;

/// Uploaded file information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub format: FileFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of a complete upload pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub file_info: FileInfo,
    pub result: BulkUploadResult,
}

/// Parse, validate and aggregate an upload held in memory.
pub fn process_upload(
    bytes: &[u8],
    declared: FileFormat,
    reference: &ReferenceData,
    options: &ValidationOptions,
) -> Result<PipelineOutput, PipelineError> {
    log_info(format!("📖 Reading {} upload ({} bytes)...", declared, bytes.len()));
    let parsed = parse_bytes(bytes, declared).map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    Ok(validate_parsed(parsed, reference, options))
}

/// Parse, validate and aggregate a file on disk.
pub fn process_file(
    path: &Path,
    reference: &ReferenceData,
    options: &ValidationOptions,
) -> Result<PipelineOutput, PipelineError> {
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = parse_file(path).map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    Ok(validate_parsed(parsed, reference, options))
}

/// Validate already-parsed rows.
pub fn validate_parsed(
    parsed: ParsedFile,
    reference: &ReferenceData,
    options: &ValidationOptions,
) -> PipelineOutput {
    print_file_info(&parsed);

    log_info(format!(
        "✔️  Validating against {} classes and {} existing students (identity: {})...",
        reference.known_classes.len(),
        reference.existing_students.len(),
        options.identity_key
    ));
    let validator = Validator::new(reference, options.clone());
    let outcomes = validator.validate_rows(&parsed.rows);
    let result = BulkUploadResult::from_outcomes(outcomes);
    print_validation_result(&result);

    PipelineOutput {
        file_info: FileInfo {
            format: parsed.format,
            encoding: parsed.encoding,
            delimiter: parsed.delimiter,
            row_count: parsed.rows.len(),
            headers: parsed.headers,
        },
        result,
    }
}

/// Print file details
fn print_file_info(parsed: &ParsedFile) {
    if let Some(ref encoding) = parsed.encoding {
        log_success(format!("Detected encoding: {}", encoding));
    }
    if let Some(delimiter) = parsed.delimiter {
        log_success(format!("Detected separator: '{}'", format_delimiter(delimiter)));
    }
    log_success(format!("Read {} rows", parsed.rows.len()));

    log_info(format!("📋 File has {} columns:", parsed.headers.len()));
    for (i, col) in parsed.headers.iter().enumerate() {
        log_info_indent(format!("[{:2}] {}", i + 1, col), 1);
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

/// Print validation result
fn print_validation_result(result: &BulkUploadResult) {
    if result.errors().is_empty() {
        log_success(format!("All {} rows valid!", result.processed_count()));
        return;
    }

    log_success(format!("Valid: {}", result.valid_data().len()));
    if result.rows_with_errors() > 0 {
        log_error(format!(
            "Blocked: {} rows ({} errors)",
            result.rows_with_errors(),
            result.error_count()
        ));
    }
    if result.warning_count() > 0 {
        log_warning(format!("{} warnings", result.warning_count()));
    }

    // Group by field so large files stay readable
    let mut by_field: HashMap<&str, Vec<usize>> = HashMap::new();
    for issue in result.errors() {
        by_field.entry(issue.field.as_str()).or_default().push(issue.row);
    }
    let mut fields: Vec<_> = by_field.into_iter().collect();
    fields.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(b.0)));

    for (field, rows) in fields.iter().take(LOGGED_ISSUES) {
        let row_sample: Vec<String> = rows.iter().take(5).map(|r| r.to_string()).collect();
        let more = if rows.len() > 5 {
            format!("... +{}", rows.len() - 5)
        } else {
            String::new()
        };
        log_warning(format!("• {} (rows: {}{})", field, row_sample.join(", "), more));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassRef;

    fn reference() -> ReferenceData {
        ReferenceData::new(Vec::new(), vec![ClassRef::new("5", "A")])
    }

    #[test]
    fn test_process_upload() {
        let csv = "firstName,lastName,grade,section\nAna,Doe,5,A\n,Doe,5,A\nBen,Roe,5,B\n";
        let output =
            process_upload(csv.as_bytes(), FileFormat::Csv, &reference(), &ValidationOptions::default()).unwrap();

        assert_eq!(output.file_info.row_count, 3);
        assert_eq!(output.file_info.delimiter, Some(','));
        assert_eq!(output.result.processed_count(), 3);
        assert_eq!(output.result.valid_data().len(), 1);
        assert_eq!(output.result.error_count(), 2);
        assert_eq!(output.result.errors()[0].row, 3);
        assert_eq!(output.result.errors()[1].row, 4);
    }

    #[test]
    fn test_parse_failure_aborts() {
        let err = process_upload(b"", FileFormat::Csv, &reference(), &ValidationOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_format_delimiter() {
        assert_eq!(format_delimiter('\t'), "TAB");
        assert_eq!(format_delimiter(';'), ";");
    }
}
