//! Aggregation of per-row validation outcomes.
//!
//! ```text
//! RowOutcome { row 2, issues: [],        record: Some } ─┐
//! RowOutcome { row 3, issues: [error],   record: None } ─┼─▶ BulkUploadResult
//! RowOutcome { row 4, issues: [warning], record: Some } ─┘     processedCount 3
//!                                                              validData [2, 4]
//!                                                              errors [3:error, 4:warning]
//! ```
//!
//! The counts are derived from the issue list when the result is built and
//! cannot be set independently.

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{CandidateRecord, ValidationIssue};
use crate::validation::RowOutcome;

/// Outcome of validating one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUploadResult {
    processed_count: usize,
    valid_data: Vec<CandidateRecord>,
    errors: Vec<ValidationIssue>,
    error_count: usize,
    warning_count: usize,
    rows_with_errors: usize,
}

impl BulkUploadResult {
    /// Build the result from outcomes in row order.
    pub fn from_outcomes(outcomes: Vec<RowOutcome>) -> Self {
        let processed_count = outcomes.len();
        let mut valid_data = Vec::new();
        let mut errors = Vec::new();
        let mut rows_with_errors = 0;

        for outcome in outcomes {
            if outcome.has_errors() {
                rows_with_errors += 1;
            }
            if let Some(record) = outcome.record {
                valid_data.push(record);
            }
            errors.extend(outcome.issues);
        }

        let error_count = errors.iter().filter(|i| i.is_error()).count();
        let warning_count = errors.len() - error_count;

        Self {
            processed_count,
            valid_data,
            errors,
            error_count,
            warning_count,
            rows_with_errors,
        }
    }

    /// Rows seen, valid or not.
    pub fn processed_count(&self) -> usize {
        self.processed_count
    }

    /// Importable records, in row order.
    pub fn valid_data(&self) -> &[CandidateRecord] {
        &self.valid_data
    }

    /// Every issue (errors and warnings), row-ascending, rule order within a row.
    pub fn errors(&self) -> &[ValidationIssue] {
        &self.errors
    }

    /// Number of error-severity issues.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Number of warning-severity issues.
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Rows blocked by at least one error.
    pub fn rows_with_errors(&self) -> usize {
        self.rows_with_errors
    }

    /// Whether the caller should stop before importing.
    pub fn has_blocking_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Take the importable records.
    pub fn into_valid_data(self) -> Vec<CandidateRecord> {
        self.valid_data
    }

    /// Records to hand to the importer.
    ///
    /// Fails with [`PipelineError::BlockingErrors`] while any row has an
    /// error, unless `skip_invalid` is set.
    pub fn into_importable(self, skip_invalid: bool) -> PipelineResult<Vec<CandidateRecord>> {
        if self.has_blocking_errors() && !skip_invalid {
            return Err(PipelineError::BlockingErrors(self.rows_with_errors));
        }
        Ok(self.valid_data)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkUploadResultWire<'a> {
    processed_count: usize,
    valid_data: &'a [CandidateRecord],
    errors: &'a [ValidationIssue],
    error_count: usize,
    warning_count: usize,
}

impl Serialize for BulkUploadResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BulkUploadResultWire {
            processed_count: self.processed_count,
            valid_data: &self.valid_data,
            errors: &self.errors,
            error_count: self.error_count,
            warning_count: self.warning_count,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;

    fn record(row_number: usize) -> CandidateRecord {
        CandidateRecord {
            row_number,
            first_name: "Ana".into(),
            last_name: "Doe".into(),
            email: None,
            phone: None,
            date_of_birth: None,
            gender: None,
            grade: "5".into(),
            section: "A".into(),
            class_id: None,
            admission_number: None,
            address: None,
            guardians: Vec::new(),
        }
    }

    fn outcomes() -> Vec<RowOutcome> {
        vec![
            RowOutcome {
                row_number: 2,
                issues: vec![],
                record: Some(record(2)),
            },
            RowOutcome {
                row_number: 3,
                issues: vec![
                    ValidationIssue::error(3, "firstName", CellValue::Blank, "firstName is required"),
                    ValidationIssue::warning(3, "phone", CellValue::from_text("x"), "bad phone"),
                ],
                record: None,
            },
            RowOutcome {
                row_number: 4,
                issues: vec![ValidationIssue::warning(4, "phone", CellValue::from_text("y"), "bad phone")],
                record: Some(record(4)),
            },
        ]
    }

    #[test]
    fn test_counts_are_derived() {
        let result = BulkUploadResult::from_outcomes(outcomes());

        assert_eq!(result.processed_count(), 3);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 2);
        assert_eq!(result.rows_with_errors(), 1);
        assert_eq!(
            result.processed_count(),
            result.valid_data().len() + result.rows_with_errors()
        );
        assert!(result.has_blocking_errors());
    }

    #[test]
    fn test_order_preserved() {
        let result = BulkUploadResult::from_outcomes(outcomes());

        let rows: Vec<usize> = result.valid_data().iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![2, 4]);
        let issue_rows: Vec<usize> = result.errors().iter().map(|i| i.row).collect();
        assert_eq!(issue_rows, vec![3, 3, 4]);
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_value(BulkUploadResult::from_outcomes(outcomes())).unwrap();

        assert_eq!(json["processedCount"], 3);
        assert_eq!(json["errorCount"], 1);
        assert_eq!(json["warningCount"], 2);
        assert_eq!(json["validData"][1]["rowNumber"], 4);
        assert_eq!(json["errors"][0]["field"], "firstName");
    }

    #[test]
    fn test_blocking_errors_refuse_import() {
        let err = BulkUploadResult::from_outcomes(outcomes())
            .into_importable(false)
            .unwrap_err();
        assert!(matches!(err, PipelineError::BlockingErrors(1)));
    }

    #[test]
    fn test_skip_invalid_imports_valid_rows() {
        let records = BulkUploadResult::from_outcomes(outcomes())
            .into_importable(true)
            .unwrap();
        let rows: Vec<usize> = records.iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![2, 4]);
    }

    #[test]
    fn test_warnings_do_not_block_import() {
        let mut outcomes = outcomes();
        outcomes.remove(1);
        let records = BulkUploadResult::from_outcomes(outcomes)
            .into_importable(false)
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_empty_upload() {
        let result = BulkUploadResult::from_outcomes(Vec::new());
        assert_eq!(result.processed_count(), 0);
        assert!(!result.has_blocking_errors());
    }
}
