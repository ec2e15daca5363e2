//! Domain models for the Rollbook upload pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`CellValue`] - Raw spreadsheet cell (text, number or blank)
//! - [`RawRow`] - One parsed row, header → cell, with its file row number
//! - [`ValidationIssue`] - A field-level problem tagged error or warning
//! - [`CandidateRecord`] - A student row ready for import
//! - [`ExistingStudent`] / [`ClassRef`] - Caller-owned reference data
//! - [`Column`] - The columns the upload template defines

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Cells and rows
// =============================================================================

/// A raw cell as read from the spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    /// Number cell (Excel numeric cells only; CSV is always text).
    Number(f64),
    /// Text cell.
    Text(String),
    /// Empty cell.
    #[default]
    Blank,
}

impl CellValue {
    /// Build a cell from text, mapping whitespace-only strings to `Blank`.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            CellValue::Blank
        } else {
            CellValue::Text(text)
        }
    }

    /// Whether the cell is blank after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Blank => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Trimmed text rendering. Integral numbers render without decimals.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Blank => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
        }
    }

    /// Trimmed text, or `None` when blank.
    pub fn non_blank(&self) -> Option<String> {
        if self.is_blank() {
            None
        } else {
            Some(self.as_text())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// One spreadsheet row prior to validation.
///
/// Keys are normalized headers (see [`normalize_header`]). `row_number` is the
/// 1-indexed position in the source file, so the first data row is `2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub row_number: usize,
    pub cells: IndexMap<String, CellValue>,
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: IndexMap::new(),
        }
    }

    /// Insert a cell under a normalized header.
    pub fn insert(&mut self, header: &str, value: CellValue) {
        self.cells.insert(normalize_header(header), value);
    }

    /// Get a cell by header, case-insensitively.
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(&normalize_header(header))
    }

    /// Get the cell for a template column, trying every accepted alias.
    pub fn column(&self, column: Column) -> &CellValue {
        column
            .aliases()
            .iter()
            .find_map(|alias| self.cells.get(*alias))
            .unwrap_or(&CellValue::Blank)
    }

    /// Whether any of the column's aliases appear as a header.
    pub fn has_column(&self, column: Column) -> bool {
        column.aliases().iter().any(|alias| self.cells.contains_key(*alias))
    }

    /// Whether every cell is blank.
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_blank)
    }
}

/// Normalize a header cell: trimmed and lowercased.
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

// =============================================================================
// Template columns
// =============================================================================

/// Columns of the student upload template, in template order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    FirstName,
    LastName,
    Email,
    Phone,
    DateOfBirth,
    Gender,
    Grade,
    Section,
    AdmissionNumber,
    Address,
    GuardianNames,
    GuardianPhones,
    GuardianRelations,
}

impl Column {
    /// All columns in template order.
    pub const ALL: [Column; 13] = [
        Column::FirstName,
        Column::LastName,
        Column::Email,
        Column::Phone,
        Column::DateOfBirth,
        Column::Gender,
        Column::Grade,
        Column::Section,
        Column::AdmissionNumber,
        Column::Address,
        Column::GuardianNames,
        Column::GuardianPhones,
        Column::GuardianRelations,
    ];

    /// Header as written in the template and used as the issue field name.
    pub fn header(&self) -> &'static str {
        match self {
            Column::FirstName => "firstName",
            Column::LastName => "lastName",
            Column::Email => "email",
            Column::Phone => "phone",
            Column::DateOfBirth => "dateOfBirth",
            Column::Gender => "gender",
            Column::Grade => "grade",
            Column::Section => "section",
            Column::AdmissionNumber => "admissionNumber",
            Column::Address => "address",
            Column::GuardianNames => "guardianNames",
            Column::GuardianPhones => "guardianPhones",
            Column::GuardianRelations => "guardianRelations",
        }
    }

    /// Normalized header spellings accepted for this column.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Column::FirstName => &["firstname", "first name", "first_name"],
            Column::LastName => &["lastname", "last name", "last_name", "surname"],
            Column::Email => &["email", "e-mail", "email address"],
            Column::Phone => &["phone", "phone number", "phone_number", "mobile"],
            Column::DateOfBirth => &["dateofbirth", "date of birth", "date_of_birth", "dob"],
            Column::Gender => &["gender"],
            Column::Grade => &["grade", "grade level", "grade_level"],
            Column::Section => &["section"],
            Column::AdmissionNumber => &["admissionnumber", "admission number", "admission_number"],
            Column::Address => &["address"],
            Column::GuardianNames => &["guardiannames", "guardian names", "guardian_names", "guardians"],
            Column::GuardianPhones => &["guardianphones", "guardian phones", "guardian_phones"],
            Column::GuardianRelations => {
                &["guardianrelations", "guardian relations", "guardian_relations"]
            }
        }
    }

    /// Header row expected by the parser, in template order.
    pub fn template_headers() -> Vec<&'static str> {
        Self::ALL.iter().map(Column::header).collect()
    }
}

// =============================================================================
// Validation issues
// =============================================================================

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the row from import.
    Error,
    /// Surfaced to the operator; the row is still imported.
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level problem found in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Row number in the source file (header is row 1).
    pub row: usize,
    /// Column the issue refers to.
    pub field: String,
    /// Offending value as read.
    pub value: CellValue,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(row: usize, field: &str, value: CellValue, message: impl Into<String>) -> Self {
        Self::new(row, field, value, Severity::Error, message)
    }

    pub fn warning(row: usize, field: &str, value: CellValue, message: impl Into<String>) -> Self {
        Self::new(row, field, value, Severity::Warning, message)
    }

    fn new(
        row: usize,
        field: &str,
        value: CellValue,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        debug_assert!(row >= 1, "issue rows are 1-indexed");
        Self {
            row: row.max(1),
            field: field.to_string(),
            value,
            severity,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row {}, field '{}' ({}): {}",
            self.row, self.field, self.severity, self.message
        )
    }
}

// =============================================================================
// Candidate records
// =============================================================================

/// A guardian attached to a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guardian {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// A student row that passed every error-severity rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    /// Source row, kept so import failures can point back at the file.
    pub row_number: usize,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub grade: String,
    pub section: String,
    /// Identifier of the matched class, when the caller supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guardians: Vec<Guardian>,
}

// =============================================================================
// Reference data
// =============================================================================

/// An already-persisted student, used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingStudent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

impl ExistingStudent {
    /// Human-readable label for duplicate messages.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("{} {} ({})", self.first_name, self.last_name, id),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

/// A class (grade + section) that uploads may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub grade: String,
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ClassRef {
    pub fn new(grade: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            id: None,
            grade: grade.into(),
            section: section.into(),
            name: None,
        }
    }

    /// Whether this class is the given grade/section, ignoring case and padding.
    pub fn matches(&self, grade: &str, section: &str) -> bool {
        self.grade.trim().eq_ignore_ascii_case(grade.trim())
            && self.section.trim().eq_ignore_ascii_case(section.trim())
    }

    /// Display label, e.g. `Grade 5-A`.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.grade.trim(), self.section.trim()))
    }
}

/// Read-only reference inputs to validation, owned by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceData {
    #[serde(default)]
    pub existing_students: Vec<ExistingStudent>,
    #[serde(default)]
    pub known_classes: Vec<ClassRef>,
}

impl ReferenceData {
    pub fn new(existing_students: Vec<ExistingStudent>, known_classes: Vec<ClassRef>) -> Self {
        Self {
            existing_students,
            known_classes,
        }
    }

    /// Find the class matching a grade/section pair.
    pub fn find_class(&self, grade: &str, section: &str) -> Option<&ClassRef> {
        self.known_classes.iter().find(|c| c.matches(grade, section))
    }
}

// =============================================================================
// Tests
// =============================================================================
