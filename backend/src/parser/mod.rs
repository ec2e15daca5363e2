//! Tabular parser for student uploads (CSV and Excel).
//!
//! Converts raw file bytes into [`RawRow`]s in file order. The first row is
//! always the header row; header cells are matched case-insensitively with
//! surrounding whitespace trimmed.
//!
//! Parsing is all-or-nothing: an unreadable file, a file without rows, or
//! content that does not match the declared format yields a [`ParseError`]
//! and no rows at all.
//!
//! CSV text is decoded with encoding auto-detection (UTF-8, Latin-1,
//! Windows-1252) and delimiter sniffing, since school exports rarely agree
//! on either. Excel workbooks are read from their first worksheet.

use calamine::{open_workbook_from_rs, DataType, Reader, Xls, Xlsx};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

use crate::error::{ParseError, ParseResult};
use crate::models::{normalize_header, CellValue, RawRow};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// How many leading bytes are inspected when sniffing binary content.
const SNIFF_LEN: usize = 8192;

// =============================================================================
// File formats
// =============================================================================

/// Declared format of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Map a reported content type (parameters such as `charset` ignored).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        match mime.as_str() {
            "text/csv" | "application/csv" | "text/comma-separated-values" => Some(Self::Csv),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some(Self::Xlsx),
            "application/vnd.ms-excel" => Some(Self::Xls),
            _ => None,
        }
    }

    /// Map a file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            _ => None,
        }
    }

    /// Resolve from a content type first, then the file name.
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>) -> Option<Self> {
        content_type
            .and_then(Self::from_content_type)
            .or_else(|| file_name.and_then(|n| Self::from_extension(Path::new(n))))
    }

    pub fn is_excel(&self) -> bool {
        matches!(self, Self::Xlsx | Self::Xls)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Xls => "application/vnd.ms-excel",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => f.write_str("CSV"),
            Self::Xlsx => f.write_str("Excel (.xlsx)"),
            Self::Xls => f.write_str("Excel (.xls)"),
        }
    }
}

/// What the leading bytes of a file look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Empty,
    /// Zip container (`.xlsx`).
    Zip,
    /// OLE compound document (`.xls`).
    Ole,
    /// Other binary data.
    Binary,
    Text,
}

impl ContentKind {
    fn describe(&self) -> &'static str {
        match self {
            Self::Empty => "an empty file",
            Self::Zip => "an .xlsx workbook",
            Self::Ole => "an .xls workbook",
            Self::Binary => "binary data",
            Self::Text => "plain text",
        }
    }
}

/// Sniff the content kind from magic numbers and NUL bytes.
pub fn detect_content(bytes: &[u8]) -> ContentKind {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        ContentKind::Empty
    } else if bytes.starts_with(ZIP_MAGIC) {
        ContentKind::Zip
    } else if bytes.starts_with(OLE_MAGIC) {
        ContentKind::Ole
    } else if bytes[..bytes.len().min(SNIFF_LEN)].contains(&0) {
        ContentKind::Binary
    } else {
        ContentKind::Text
    }
}

// =============================================================================
// Parse result
// =============================================================================

/// Result of parsing with metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    /// Format the rows were actually read as
    pub format: FileFormat,
    /// Detected encoding (CSV only)
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only)
    pub delimiter: Option<char>,
    /// Normalized column headers, in file order
    pub headers: Vec<String>,
    /// Data rows, header excluded
    pub rows: Vec<RawRow>,
}

impl ParsedFile {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Parse an upload whose format was declared by the caller.
///
/// # Example
/// ```ignore
/// use rollbook::parser::{parse_bytes, FileFormat};
///
/// let csv = "firstName,lastName,grade,section\nAna,Lopez,5,A";
/// let parsed = parse_bytes(csv.as_bytes(), FileFormat::Csv).unwrap();
///
/// assert_eq!(parsed.rows.len(), 1);
/// assert_eq!(parsed.rows[0].row_number, 2);
/// ```
pub fn parse_bytes(bytes: &[u8], declared: FileFormat) -> ParseResult<ParsedFile> {
    let kind = detect_content(bytes);

    match (declared, kind) {
        (_, ContentKind::Empty) => Err(ParseError::EmptyFile),
        (FileFormat::Csv, ContentKind::Text) => parse_csv_bytes(bytes),
        (FileFormat::Csv, other) => Err(ParseError::FormatMismatch {
            declared,
            detected: other.describe().to_string(),
        }),
        // Either Excel flavour is accepted; the container decides the reader.
        (_, ContentKind::Zip) => parse_workbook::<Xlsx<_>>(bytes, FileFormat::Xlsx),
        (_, ContentKind::Ole) => parse_workbook::<Xls<_>>(bytes, FileFormat::Xls),
        (_, other) => Err(ParseError::FormatMismatch {
            declared,
            detected: other.describe().to_string(),
        }),
    }
}

/// Parse a file from disk, declaring the format from its extension.
pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<ParsedFile> {
    let path = path.as_ref();
    let format = FileFormat::from_extension(path)
        .ok_or_else(|| ParseError::UnsupportedFormat(path.display().to_string()))?;
    let bytes = std::fs::read(path)?;
    parse_bytes(&bytes, format)
}

// =============================================================================
// CSV
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> ParseResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            // chardet guessed wrong; Windows-1252 is the usual culprit
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => {
            let codec = encoding_rs::Encoding::for_label(other.as_bytes())
                .ok_or_else(|| ParseError::Encoding(format!("unknown encoding '{}'", other)))?;
            codec.decode(bytes).0.into_owned()
        }
    };
    Ok(decoded)
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Comma wins ties, so single-column files stay comma-delimited.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

fn parse_csv_bytes(bytes: &[u8]) -> ParseResult<ParsedFile> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    let (headers, rows) = parse_csv_str(&content, delimiter)?;

    Ok(ParsedFile {
        format: FileFormat::Csv,
        encoding: Some(encoding),
        delimiter: Some(delimiter),
        headers,
        rows,
    })
}

/// Parse decoded CSV text with an explicit delimiter.
///
/// Returns normalized headers and the data rows; blank lines are skipped but
/// row numbers keep counting them.
pub fn parse_csv_str(content: &str, delimiter: char) -> ParseResult<(Vec<String>, Vec<RawRow>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header_record = match records.next() {
        Some(record) => record.map_err(csv_error)?,
        None => return Err(ParseError::EmptyFile),
    };
    let headers: Vec<String> = header_record.iter().map(normalize_header).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::EmptyFile);
    }

    // Quoted cells may span lines, so rows are counted per record. Empty
    // lines, which the reader drops, still take a row.
    let header_line = start_line(&header_record).unwrap_or(1);
    let mut row_number = header_line;
    let mut end_line = header_line + embedded_newlines(&header_record);

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(csv_error)?;
        let line = start_line(&record).unwrap_or(end_line + 1);
        row_number += 1 + line.saturating_sub(end_line + 1);
        end_line = line + embedded_newlines(&record);

        let cells = headers.iter().enumerate().map(|(i, header)| {
            let value = record.get(i).map(|v| CellValue::from_text(v.trim())).unwrap_or_default();
            (header, value)
        });

        if let Some(row) = build_row(row_number, cells) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(ParseError::NoDataRows);
    }

    Ok((headers, rows))
}

fn start_line(record: &csv::StringRecord) -> Option<usize> {
    record.position().map(|p| p.line() as usize)
}

fn embedded_newlines(record: &csv::StringRecord) -> usize {
    record.iter().map(|field| field.matches('\n').count()).sum()
}

fn csv_error(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    ParseError::Csv {
        line,
        message: err.to_string(),
    }
}

// =============================================================================
// Excel
// =============================================================================

fn parse_workbook<R>(bytes: &[u8], format: FileFormat) -> ParseResult<ParsedFile>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: fmt::Display,
{
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook: R =
        open_workbook_from_rs(cursor).map_err(|e: R::Error| ParseError::Workbook(e.to_string()))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| ParseError::Workbook(e.to_string()))?,
        None => return Err(ParseError::EmptyFile),
    };
    if range.is_empty() {
        return Err(ParseError::EmptyFile);
    }

    // Sheets may start below row 1; keep row numbers as the user sees them.
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows_iter = range.rows();

    let headers: Vec<String> = match rows_iter.next() {
        Some(cells) => cells.iter().map(|c| normalize_header(&c.to_string())).collect(),
        None => return Err(ParseError::EmptyFile),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::EmptyFile);
    }

    let mut rows = Vec::new();
    for (idx, cells) in rows_iter.enumerate() {
        let row_number = first_row + idx + 2;
        let values = headers.iter().enumerate().map(|(i, header)| {
            let value = cells.get(i).map(excel_cell_value).unwrap_or_default();
            (header, value)
        });
        if let Some(row) = build_row(row_number, values) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(ParseError::NoDataRows);
    }

    Ok(ParsedFile {
        format,
        encoding: None,
        delimiter: None,
        headers,
        rows,
    })
}

fn excel_cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty | DataType::Error(_) => CellValue::Blank,
        DataType::String(s) => CellValue::from_text(s.trim()),
        DataType::Float(f) => CellValue::Number(*f),
        DataType::Int(i) => CellValue::Number(*i as f64),
        DataType::Bool(b) => CellValue::Text(b.to_string()),
        DataType::DateTime(serial) => match excel_serial_to_date(*serial) {
            Some(date) => CellValue::Text(date.format("%Y-%m-%d").to_string()),
            None => CellValue::Number(*serial),
        },
        other => CellValue::from_text(other.to_string().trim()),
    }
}

/// Convert an Excel date serial (1900 date system) to a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    // 1899-12-30 absorbs Excel's phantom 1900-02-29.
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

// =============================================================================
// Shared
// =============================================================================

/// Build a row from header/value pairs, or `None` if every cell is blank.
fn build_row<'a>(
    row_number: usize,
    cells: impl Iterator<Item = (&'a String, CellValue)>,
) -> Option<RawRow> {
    let mut row = RawRow::new(row_number);
    for (header, value) in cells {
        // Unlabelled columns carry nothing the validator can use.
        if header.is_empty() {
            continue;
        }
        row.cells.insert(header.clone(), value);
    }
    if row.is_blank() {
        None
    } else {
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_csv(text: &str) -> ParseResult<ParsedFile> {
        parse_bytes(text.as_bytes(), FileFormat::Csv)
    }

    #[test]
    fn test_simple_csv() {
        let parsed = parse_csv("firstName,lastName,grade,section\nAna,Lopez,5,A\nBen,Okafor,6,B").unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.headers, vec!["firstname", "lastname", "grade", "section"]);
        assert_eq!(parsed.rows[0].row_number, 2);
        assert_eq!(parsed.rows[0].get("firstName").unwrap().as_text(), "Ana");
        assert_eq!(parsed.rows[1].row_number, 3);
        assert_eq!(parsed.rows[1].get("SECTION").unwrap().as_text(), "B");
    }

    #[test]
    fn test_headers_trimmed_and_case_insensitive() {
        let parsed = parse_csv("  FirstName , LASTNAME \nAna,Lopez").unwrap();
        assert_eq!(parsed.headers, vec!["firstname", "lastname"]);
        assert_eq!(parsed.rows[0].get("lastname").unwrap().as_text(), "Lopez");
    }

    #[test]
    fn test_quoted_values() {
        let csv = "firstName,address\n\"Ana\",\"12 Main St, Springfield\"";
        let parsed = parse_csv(csv).unwrap();
        assert_eq!(
            parsed.rows[0].get("address").unwrap().as_text(),
            "12 Main St, Springfield"
        );
    }

    #[test]
    fn test_blank_rows_skipped_row_numbers_kept() {
        let csv = "firstName,lastName\nAna,Lopez\n\n,\nBen,Okafor\n";
        let parsed = parse_csv(csv).unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].row_number, 2);
        assert_eq!(parsed.rows[1].row_number, 5);
    }

    #[test]
    fn test_multiline_cell_keeps_row_numbers() {
        let csv = "firstName,lastName,address,grade,section\n\
                   Ana,Lopez,\"1 Main St\nApt 2\",5,A\n\
                   Ben,,x,5,A\n\
                   \n\
                   Cara,Diaz,\"a\nb\nc\",6,B\n\
                   Dan,Eze,y,6,B\n";
        let parsed = parse_csv(csv).unwrap();

        let rows: Vec<usize> = parsed.rows.iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![2, 3, 5, 6]);
        assert_eq!(parsed.rows[0].get("address").unwrap().as_text(), "1 Main St\nApt 2");
    }

    #[test]
    fn test_missing_and_extra_values() {
        let parsed = parse_csv("a,b,c\n1,,3,4").unwrap();
        let row = &parsed.rows[0];

        assert_eq!(row.get("a").unwrap().as_text(), "1");
        assert!(row.get("b").unwrap().is_blank());
        assert_eq!(row.cells.len(), 3);
    }

    #[test]
    fn test_empty_file_error() {
        assert!(matches!(parse_csv(""), Err(ParseError::EmptyFile)));
        assert!(matches!(parse_csv("  \n\n"), Err(ParseError::EmptyFile)));
    }

    #[test]
    fn test_header_only_error() {
        assert!(matches!(
            parse_csv("firstName,lastName\n"),
            Err(ParseError::NoDataRows)
        ));
    }

    #[test]
    fn test_csv_declared_but_binary() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"rest of archive");
        let err = parse_bytes(&bytes, FileFormat::Csv).unwrap_err();
        assert!(matches!(err, ParseError::FormatMismatch { declared: FileFormat::Csv, .. }));

        let err = parse_bytes(b"abc\0def", FileFormat::Csv).unwrap_err();
        assert!(matches!(err, ParseError::FormatMismatch { .. }));
    }

    #[test]
    fn test_excel_declared_but_text() {
        let err = parse_bytes(b"firstName\nAna", FileFormat::Xlsx).unwrap_err();
        assert!(matches!(err, ParseError::FormatMismatch { declared: FileFormat::Xlsx, .. }));
    }

    #[test]
    fn test_corrupt_workbook_is_an_error() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            parse_bytes(&bytes, FileFormat::Xlsx),
            Err(ParseError::Workbook(_))
        ));
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"firstName\nAna");
        let parsed = parse_bytes(&bytes, FileFormat::Csv).unwrap();
        assert_eq!(parsed.headers, vec!["firstname"]);
    }

    #[test]
    fn test_semicolon_export() {
        let parsed = parse_csv("firstName;lastName\nAna;Lopez").unwrap();
        assert_eq!(parsed.delimiter, Some(';'));
        assert_eq!(parsed.rows[0].get("lastname").unwrap().as_text(), "Lopez");
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a;b;c"), ';');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
        assert_eq!(detect_delimiter("a,b;c"), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Zoé" in ISO-8859-1
        let bytes: &[u8] = &[0x5A, 0x6F, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Zoé");
    }

    #[test]
    fn test_format_from_content_type() {
        assert_eq!(FileFormat::from_content_type("text/csv; charset=utf-8"), Some(FileFormat::Csv));
        assert_eq!(
            FileFormat::from_content_type(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            ),
            Some(FileFormat::Xlsx)
        );
        assert_eq!(FileFormat::from_content_type("application/vnd.ms-excel"), Some(FileFormat::Xls));
        assert_eq!(FileFormat::from_content_type("image/png"), None);
        assert_eq!(
            FileFormat::detect(Some("application/octet-stream"), Some("roster.XLSX")),
            Some(FileFormat::Xlsx)
        );
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45292.0), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(excel_serial_to_date(0.0), None);
    }

    #[test]
    fn test_parse_file_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.txt");
        std::fs::write(&path, "firstName\nAna").unwrap();
        assert!(matches!(parse_file(&path), Err(ParseError::UnsupportedFormat(_))));

        let path = dir.path().join("roster.csv");
        std::fs::write(&path, "firstName\nAna").unwrap();
        assert_eq!(parse_file(&path).unwrap().row_count(), 1);
    }
}
