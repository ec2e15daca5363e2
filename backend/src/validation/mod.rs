//! Row validation for student uploads.
//!
//! Every row goes through the same five rules, in order, without
//! short-circuiting so one pass reports everything wrong with a row:
//!
//! 1. Required fields (`firstName`, `lastName`, `grade`, `section`) → error
//! 2. Formats: email → error; phone and date of birth → warning
//! 3. Class reference (grade + section must be a known class) → error
//! 4. Duplicates against existing students and other rows of the upload → error
//! 5. Guardian sub-records → warning
//!
//! Validation never fails. Problems are returned as [`ValidationIssue`]s and a
//! [`CandidateRecord`] is built only for rows without error-severity issues.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollbook::validation::{Validator, ValidationOptions};
//!
//! let validator = Validator::new(&reference, ValidationOptions::default());
//! for outcome in validator.validate_rows(&parsed.rows) {
//!     println!("row {}: {} issues", outcome.row_number, outcome.issues.len());
//! }
//! ```

pub mod identity;
pub mod reference;
pub mod rules;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{CandidateRecord, RawRow, ReferenceData, ValidationIssue};

pub use identity::{Identity, IdentityKey, UploadIndex};
pub use reference::{
    is_valid, load_existing_students, load_known_classes, load_reference_file, validate, validate_reference_json,
    ReferenceKind,
};
pub use rules::{is_valid_email, is_valid_phone, parse_date, RowFields};

/// Options for the validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    /// Fields that make two students the same person
    pub identity_key: IdentityKey,

    /// Separator inside guardian columns
    pub guardian_delimiter: char,

    /// Date used for the "born in the future" check (defaults to today)
    pub today: Option<NaiveDate>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            identity_key: IdentityKey::Any,
            guardian_delimiter: ';',
            today: None,
        }
    }
}

/// Validation verdict for one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row_number: usize,
    /// Issues in rule order.
    pub issues: Vec<ValidationIssue>,
    /// Present iff no issue is an error.
    pub record: Option<CandidateRecord>,
}

impl RowOutcome {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_error)
    }
}

/// Applies the rule set against caller-owned reference data.
pub struct Validator<'a> {
    reference: &'a ReferenceData,
    options: ValidationOptions,
    existing: rules::ExistingIndex,
    today: NaiveDate,
}

impl<'a> Validator<'a> {
    pub fn new(reference: &'a ReferenceData, options: ValidationOptions) -> Self {
        let mut existing = rules::ExistingIndex::new();
        for (idx, student) in reference.existing_students.iter().enumerate() {
            let identities = options.identity_key.identities(
                Some(&student.first_name),
                Some(&student.last_name),
                student.email.as_deref(),
                student.date_of_birth,
            );
            for identity in identities {
                // First record wins so messages are stable.
                existing.entry(identity).or_insert(idx);
            }
        }

        let today = options
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());

        Self {
            reference,
            options,
            existing,
            today,
        }
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Identities each row carries, for in-upload duplicate detection.
    pub fn index_rows(&self, rows: &[RawRow]) -> UploadIndex {
        let mut index = UploadIndex::new();
        for row in rows {
            let fields = RowFields::read(row, self.today);
            for identity in self.identities(&fields) {
                index.insert(identity, row.row_number);
            }
        }
        index
    }

    /// Validate a whole upload. Outcomes come back in row order.
    pub fn validate_rows(&self, rows: &[RawRow]) -> Vec<RowOutcome> {
        let index = self.index_rows(rows);
        let mut outcomes: Vec<RowOutcome> = rows.iter().map(|row| self.validate_row(row, &index)).collect();
        outcomes.sort_by_key(|o| o.row_number);
        outcomes
    }

    /// Validate one row against the reference data and the upload index.
    pub fn validate_row(&self, row: &RawRow, index: &UploadIndex) -> RowOutcome {
        let fields = RowFields::read(row, self.today);
        let mut issues = Vec::new();

        rules::check_required(row, &mut issues);
        rules::check_formats(row, &fields, self.today, &mut issues);
        let class = rules::check_class(row, &fields, self.reference, &mut issues);
        rules::check_duplicates(
            row,
            &self.identities(&fields),
            &self.existing,
            &self.reference.existing_students,
            index,
            &mut issues,
        );
        let guardians = rules::check_guardians(row, self.options.guardian_delimiter, &mut issues);

        let blocked = issues.iter().any(ValidationIssue::is_error);
        let record = match (blocked, fields) {
            (
                false,
                RowFields {
                    first_name: Some(first_name),
                    last_name: Some(last_name),
                    grade: Some(grade),
                    section: Some(section),
                    email,
                    phone,
                    date_of_birth,
                    gender,
                    admission_number,
                    address,
                },
            ) => Some(CandidateRecord {
                row_number: row.row_number,
                first_name,
                last_name,
                email,
                phone: phone.filter(|p| is_valid_phone(p)),
                date_of_birth,
                gender,
                grade,
                section,
                class_id: class.and_then(|c| c.id.clone()),
                admission_number,
                address,
                guardians,
            }),
            _ => None,
        };

        RowOutcome {
            row_number: row.row_number,
            issues,
            record,
        }
    }

    fn identities(&self, fields: &RowFields) -> Vec<Identity> {
        self.options.identity_key.identities(
            fields.first_name.as_deref(),
            fields.last_name.as_deref(),
            fields.identity_email(),
            fields.date_of_birth,
        )
    }
}
