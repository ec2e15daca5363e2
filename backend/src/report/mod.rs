//! CSV exports: the upload template and the validation error report.
//!
//! Both exports are pure functions of their input. [`ExportFile`] wraps the
//! bytes with a dated filename so callers (CLI, HTTP) can save or serve them.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ExportResult;
use crate::models::{ClassRef, Column, ValidationIssue};

/// Columns of the error report.
pub const ERROR_REPORT_HEADERS: [&str; 5] = ["row", "field", "value", "severity", "message"];

/// What an export contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Template,
    Errors,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Template => "template",
            ExportKind::Errors => "errors",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `students_<kind>_<YYYY-MM-DD>.csv`
pub fn export_filename(kind: ExportKind, date: NaiveDate) -> String {
    format!("students_{}_{}.csv", kind, date.format("%Y-%m-%d"))
}

/// Header row plus one example row per known class.
///
/// Example rows use distinct names and emails, so the template re-uploads
/// cleanly against the same classes.
pub fn export_template(classes: &[ClassRef]) -> ExportResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(Column::template_headers())?;

    for (i, class) in classes.iter().enumerate() {
        let n = i + 1;
        let record: Vec<String> = Column::ALL.iter().map(|col| example_value(*col, n, class)).collect();
        writer.write_record(&record)?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

fn example_value(column: Column, n: usize, class: &ClassRef) -> String {
    match column {
        Column::FirstName => "Student".to_string(),
        Column::LastName => format!("Example{}", n),
        Column::Email => format!("student{}@example.com", n),
        Column::Phone => "+1 555 0100".to_string(),
        Column::DateOfBirth => "2012-01-15".to_string(),
        Column::Gender => "F".to_string(),
        Column::Grade => class.grade.trim().to_string(),
        Column::Section => class.section.trim().to_string(),
        Column::AdmissionNumber => format!("ADM-{:04}", n),
        Column::Address => "1 School Road".to_string(),
        Column::GuardianNames => format!("Parent Example{}", n),
        Column::GuardianPhones => "+1 555 0101".to_string(),
        Column::GuardianRelations => "Mother".to_string(),
    }
}

/// One line per issue, in the order given.
pub fn export_validation_errors(issues: &[ValidationIssue]) -> ExportResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ERROR_REPORT_HEADERS)?;

    for issue in issues {
        writer.write_record([
            issue.row.to_string(),
            issue.field.clone(),
            issue.value.as_text(),
            issue.severity.as_str().to_string(),
            issue.message.clone(),
        ])?;
    }

    writer.into_inner().map_err(|e| e.into_error().into())
}

/// A generated CSV ready to be saved or served.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub kind: ExportKind,
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportFile {
    fn csv(kind: ExportKind, date: NaiveDate, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            filename: export_filename(kind, date),
            content_type: "text/csv; charset=utf-8",
            bytes,
        }
    }

    pub fn template_file(classes: &[ClassRef], date: NaiveDate) -> ExportResult<Self> {
        Ok(Self::csv(ExportKind::Template, date, export_template(classes)?))
    }

    pub fn errors_file(issues: &[ValidationIssue], date: NaiveDate) -> ExportResult<Self> {
        Ok(Self::csv(ExportKind::Errors, date, export_validation_errors(issues)?))
    }

    /// `Content-Disposition` value for HTTP downloads.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }

    /// Write into `dir` under the export's filename.
    pub fn write_to(&self, dir: &Path) -> ExportResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, ReferenceData};
    use crate::parser::{parse_bytes, FileFormat};
    use crate::validation::{ValidationOptions, Validator};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    fn classes() -> Vec<ClassRef> {
        vec![ClassRef::new("5", "A"), ClassRef::new("5", "B"), ClassRef::new("6", "A")]
    }

    #[test]
    fn test_filename() {
        assert_eq!(export_filename(ExportKind::Template, date()), "students_template_2024-09-02.csv");
        assert_eq!(export_filename(ExportKind::Errors, date()), "students_errors_2024-09-02.csv");
    }

    #[test]
    fn test_template_headers() {
        let bytes = export_template(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text.trim_end(),
            "firstName,lastName,email,phone,dateOfBirth,gender,grade,section,admissionNumber,address,guardianNames,guardianPhones,guardianRelations"
        );
    }

    #[test]
    fn test_template_rows_validate_cleanly() {
        let classes = classes();
        let bytes = export_template(&classes).unwrap();

        let parsed = parse_bytes(&bytes, FileFormat::Csv).unwrap();
        assert_eq!(parsed.rows.len(), classes.len());

        let reference = ReferenceData::new(Vec::new(), classes);
        let options = ValidationOptions {
            today: Some(date()),
            ..Default::default()
        };
        let outcomes = Validator::new(&reference, options).validate_rows(&parsed.rows);
        assert!(outcomes.iter().all(|o| o.issues.is_empty() && o.record.is_some()));
    }

    #[test]
    fn test_error_report_round_trip() {
        let issues = vec![
            ValidationIssue::error(3, "email", CellValue::from_text("ana@"), "'ana@' is not a valid email address"),
            ValidationIssue::warning(3, "phone", CellValue::from_text("abc, 12"), "phone looks wrong"),
            ValidationIssue::error(7, "grade", CellValue::Number(5.0), "class \"5-Z\" does not exist"),
        ];
        let bytes = export_validation_errors(&issues).unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, ERROR_REPORT_HEADERS);

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), issues.len());
        for (record, issue) in records.iter().zip(&issues) {
            assert_eq!(record[0], issue.row.to_string());
            assert_eq!(&record[1], issue.field);
            assert_eq!(record[2], issue.value.as_text());
            assert_eq!(&record[3], issue.severity.as_str());
            assert_eq!(&record[4], issue.message);
        }
        assert_eq!(&records[1][2], "abc, 12");
        assert_eq!(&records[2][2], "5");
    }

    #[test]
    fn test_exports_are_deterministic() {
        assert_eq!(export_template(&classes()).unwrap(), export_template(&classes()).unwrap());
    }

    #[test]
    fn test_write_to() {
        let dir = tempfile::tempdir().unwrap();
        let file = ExportFile::errors_file(&[], date()).unwrap();
        let path = file.write_to(dir.path()).unwrap();

        assert_eq!(path, dir.path().join("students_errors_2024-09-02.csv"));
        assert_eq!(std::fs::read_to_string(path).unwrap().trim_end(), "row,field,value,severity,message");
        assert_eq!(file.content_disposition(), "attachment; filename=\"students_errors_2024-09-02.csv\"");
    }
}
