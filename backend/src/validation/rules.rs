//! The upload rule set.
//!
//! Rules run in a fixed order and never short-circuit; each appends its
//! issues to the row's list so issues come out in rule order.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::identity::{Identity, UploadIndex};
use crate::models::{CellValue, ClassRef, Column, ExistingStudent, Guardian, RawRow, ReferenceData, ValidationIssue};
use crate::parser::excel_serial_to_date;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9 +\-()]+$").expect("valid phone regex"));

/// Date layouts accepted in text cells.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Digits, spaces and `+ - ( )` only, with at least one digit.
pub fn is_valid_phone(phone: &str) -> bool {
    let phone = phone.trim();
    PHONE_RE.is_match(phone) && phone.chars().any(|c| c.is_ascii_digit())
}

/// Parse a date-of-birth cell: ISO, day-first or an Excel serial.
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Blank => None,
        CellValue::Number(serial) => excel_serial_to_date(*serial),
        CellValue::Text(text) => {
            let text = text.trim();
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        }
    }
}

/// Values read once per row and shared by the rules.
#[derive(Debug, Clone)]
pub struct RowFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Parsed and plausible; `None` when blank or rejected.
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub grade: Option<String>,
    pub section: Option<String>,
    pub admission_number: Option<String>,
    pub address: Option<String>,
}

impl RowFields {
    pub fn read(row: &RawRow, today: NaiveDate) -> Self {
        let text = |column: Column| row.column(column).non_blank();
        Self {
            first_name: text(Column::FirstName),
            last_name: text(Column::LastName),
            email: text(Column::Email),
            phone: text(Column::Phone),
            date_of_birth: parse_date(row.column(Column::DateOfBirth)).filter(|d| *d <= today),
            gender: text(Column::Gender),
            grade: text(Column::Grade),
            section: text(Column::Section),
            admission_number: text(Column::AdmissionNumber),
            address: text(Column::Address),
        }
    }

    /// Email usable as an identity (present and well-formed).
    pub fn identity_email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| is_valid_email(e))
    }
}

// =============================================================================
// Rule 1: required fields
// =============================================================================

const REQUIRED: [Column; 4] = [Column::FirstName, Column::LastName, Column::Grade, Column::Section];

pub fn check_required(row: &RawRow, issues: &mut Vec<ValidationIssue>) {
    for column in REQUIRED {
        let value = row.column(column);
        if value.is_blank() {
            issues.push(ValidationIssue::error(
                row.row_number,
                column.header(),
                value.clone(),
                format!("{} is required", column.header()),
            ));
        }
    }
}

// =============================================================================
// Rule 2: formats
// =============================================================================

pub fn check_formats(row: &RawRow, fields: &RowFields, today: NaiveDate, issues: &mut Vec<ValidationIssue>) {
    if let Some(email) = &fields.email {
        if !is_valid_email(email) {
            issues.push(ValidationIssue::error(
                row.row_number,
                Column::Email.header(),
                row.column(Column::Email).clone(),
                format!("'{}' is not a valid email address", email),
            ));
        }
    }

    if let Some(phone) = &fields.phone {
        if !is_valid_phone(phone) {
            issues.push(ValidationIssue::warning(
                row.row_number,
                Column::Phone.header(),
                row.column(Column::Phone).clone(),
                format!(
                    "'{}' is not a valid phone number (digits, spaces, + - ( ) only); it will not be imported",
                    phone
                ),
            ));
        }
    }

    let dob = row.column(Column::DateOfBirth);
    if !dob.is_blank() {
        match parse_date(dob) {
            None => issues.push(ValidationIssue::warning(
                row.row_number,
                Column::DateOfBirth.header(),
                dob.clone(),
                format!(
                    "'{}' is not a recognised date (use YYYY-MM-DD); it will not be imported",
                    dob
                ),
            )),
            Some(date) if date > today => issues.push(ValidationIssue::warning(
                row.row_number,
                Column::DateOfBirth.header(),
                dob.clone(),
                format!("{} is in the future; it will not be imported", date.format("%Y-%m-%d")),
            )),
            Some(_) => {}
        }
    }
}

// =============================================================================
// Rule 3: class reference
// =============================================================================

/// Returns the matched class, if any.
pub fn check_class<'r>(
    row: &RawRow,
    fields: &RowFields,
    reference: &'r ReferenceData,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'r ClassRef> {
    // Blank grade/section was already reported as missing.
    let (grade, section) = match (&fields.grade, &fields.section) {
        (Some(grade), Some(section)) => (grade, section),
        _ => return None,
    };

    let class = reference.find_class(grade, section);
    if class.is_none() {
        issues.push(ValidationIssue::error(
            row.row_number,
            Column::Section.header(),
            CellValue::Text(format!("{}-{}", grade, section)),
            format!("Class grade {} section {} does not exist", grade, section),
        ));
    }
    class
}

// =============================================================================
// Rule 4: duplicates
// =============================================================================

/// Existing students keyed by identity.
pub type ExistingIndex = HashMap<Identity, usize>;

/// Reports at most one duplicate per row, preferring clashes with
/// existing students over clashes inside the upload.
pub fn check_duplicates(
    row: &RawRow,
    identities: &[Identity],
    existing: &ExistingIndex,
    existing_students: &[ExistingStudent],
    upload: &UploadIndex,
    issues: &mut Vec<ValidationIssue>,
) {
    let clash_existing = identities
        .iter()
        .find_map(|id| existing.get(id).map(|idx| (id, &existing_students[*idx])));

    if let Some((identity, student)) = clash_existing {
        issues.push(ValidationIssue::error(
            row.row_number,
            identity.field(),
            identity_value(row, identity),
            format!(
                "Duplicate {}: already enrolled as existing student {}",
                identity,
                student.label()
            ),
        ));
        return;
    }

    let clash_upload = identities.iter().find_map(|id| {
        let others = upload.other_rows(id, row.row_number);
        (!others.is_empty()).then_some((id, others))
    });

    if let Some((identity, others)) = clash_upload {
        let rows: Vec<String> = others.iter().map(|r| r.to_string()).collect();
        issues.push(ValidationIssue::error(
            row.row_number,
            identity.field(),
            identity_value(row, identity),
            format!(
                "Duplicate {}: also appears in row {} of this upload",
                identity,
                rows.join(", ")
            ),
        ));
    }
}

fn identity_value(row: &RawRow, identity: &Identity) -> CellValue {
    match identity {
        Identity::Email(_) => row.column(Column::Email).clone(),
        Identity::NameAndDob { .. } => CellValue::Text(format!(
            "{} {} {}",
            row.column(Column::FirstName),
            row.column(Column::LastName),
            row.column(Column::DateOfBirth)
        )),
    }
}

// =============================================================================
// Rule 5: guardians
// =============================================================================

/// Parse guardian columns; malformed sub-records become warnings and are dropped.
pub fn check_guardians(row: &RawRow, delimiter: char, issues: &mut Vec<ValidationIssue>) -> Vec<Guardian> {
    let names_cell = row.column(Column::GuardianNames);
    let phones_cell = row.column(Column::GuardianPhones);
    let relations_cell = row.column(Column::GuardianRelations);

    let names = split_list(names_cell, delimiter);
    let phones = split_list(phones_cell, delimiter);
    let relations = split_list(relations_cell, delimiter);

    let count = names.len().max(phones.len()).max(relations.len());
    let mut guardians = Vec::with_capacity(count);

    for i in 0..count {
        let name = names.get(i).filter(|n| !n.is_empty());
        let Some(name) = name else {
            issues.push(ValidationIssue::warning(
                row.row_number,
                Column::GuardianNames.header(),
                names_cell.clone(),
                format!("Guardian {} has no name and was skipped", i + 1),
            ));
            continue;
        };

        let phone = match phones.get(i).filter(|p| !p.is_empty()) {
            Some(phone) if is_valid_phone(phone) => Some(phone.clone()),
            Some(phone) => {
                issues.push(ValidationIssue::warning(
                    row.row_number,
                    Column::GuardianPhones.header(),
                    phones_cell.clone(),
                    format!("Guardian {} phone '{}' is malformed and was dropped", i + 1, phone),
                ));
                None
            }
            None => None,
        };

        guardians.push(Guardian {
            name: name.clone(),
            phone,
            relation: relations.get(i).filter(|r| !r.is_empty()).cloned(),
        });
    }

    guardians
}

fn split_list(cell: &CellValue, delimiter: char) -> Vec<String> {
    match cell.non_blank() {
        Some(text) => text.split(delimiter).map(|s| s.trim().to_string()).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> RawRow {
        let mut row = RawRow::new(2);
        for (header, value) in cells {
            row.insert(header, CellValue::from_text(*value));
        }
        row
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("ana.lopez@school.edu"));
        assert!(is_valid_email(" a+b@x.co "));
        assert!(!is_valid_email("ana.lopez"));
        assert!(!is_valid_email("ana@school"));
        assert!(!is_valid_email("ana lopez@school.edu"));
    }

    #[test]
    fn test_phone_pattern() {
        assert!(is_valid_phone("+1 (555) 010-2030"));
        assert!(is_valid_phone("0803 123 4567"));
        assert!(!is_valid_phone("555-CALL-NOW"));
        assert!(!is_valid_phone("()-+"));
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2012, 4, 15);
        assert_eq!(parse_date(&CellValue::from_text("2012-04-15")), expected);
        assert_eq!(parse_date(&CellValue::from_text("15/04/2012")), expected);
        assert_eq!(parse_date(&CellValue::Number(41014.0)), expected);
        assert_eq!(parse_date(&CellValue::from_text("April 15")), None);
    }

    #[test]
    fn test_required_reports_each_missing_field() {
        let mut issues = Vec::new();
        check_required(&row(&[("firstName", "Ana"), ("grade", " ")]), &mut issues);

        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["lastName", "grade", "section"]);
        assert!(issues.iter().all(|i| i.is_error()));
    }

    #[test]
    fn test_guardians_partial_data() {
        let mut issues = Vec::new();
        let r = row(&[
            ("guardianNames", "Maria Lopez; ;Luis Lopez"),
            ("guardianPhones", "+1 555 0101;;call me"),
            ("guardianRelations", "Mother;;Father"),
        ]);
        let guardians = check_guardians(&r, ';', &mut issues);

        assert_eq!(guardians.len(), 2);
        assert_eq!(guardians[0].phone.as_deref(), Some("+1 555 0101"));
        assert_eq!(guardians[1].name, "Luis Lopez");
        assert_eq!(guardians[1].phone, None);
        assert_eq!(guardians[1].relation.as_deref(), Some("Father"));

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].field, "guardianNames");
        assert_eq!(issues[1].field, "guardianPhones");
        assert!(issues.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn test_guardians_absent() {
        let mut issues = Vec::new();
        let guardians = check_guardians(&row(&[("firstName", "Ana")]), ';', &mut issues);
        assert!(guardians.is_empty());
        assert!(issues.is_empty());
    }
}
