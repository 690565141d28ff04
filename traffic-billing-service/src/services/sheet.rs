//! Header-addressed access to uploaded workbooks.
//!
//! Both uploads are read the same way: the first worksheet, first row as
//! headers, every later row as data. Columns are looked up by header name
//! (case-insensitive, trimmed) so the order of columns in the export does
//! not matter.

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::io::Cursor;
use std::str::FromStr;

pub type Workbook = Sheets<Cursor<Vec<u8>>>;

/// Opens an in-memory XLSX/XLS/XLSB/ODS workbook.
pub fn open_workbook(bytes: Vec<u8>, label: &str) -> Result<Workbook, AppError> {
    open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| AppError::bad_request(format!("{} is not a readable spreadsheet: {}", label, e)))
}

pub struct SheetTable {
    label: String,
    headers: Vec<String>,
    rows: Vec<Vec<Data>>,
}

impl SheetTable {
    /// Reads the first worksheet of an uploaded workbook.
    pub fn from_upload(bytes: Vec<u8>, label: &str) -> Result<Self, AppError> {
        let mut workbook = open_workbook(bytes, label)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| AppError::bad_request(format!("{} contains no sheets", label)))?
            .map_err(|e| AppError::bad_request(format!("Failed to read {}: {}", label, e)))?;
        Ok(Self::from_range(&range, label))
    }

    pub fn from_range(range: &Range<Data>, label: &str) -> Self {
        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|header| {
                header
                    .iter()
                    .map(|cell| cell_text(Some(cell)).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            label: label.to_string(),
            headers,
            rows: rows.map(|row| row.to_vec()).collect(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Header text as it appears in the sheet.
    pub fn header(&self, col: usize) -> &str {
        self.headers.get(col).map(|h| h.trim()).unwrap_or_default()
    }

    /// Index of the first header matching any of `names`.
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| {
            self.headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
        })
    }

    pub fn require_column(&self, names: &[&str]) -> Result<usize, AppError> {
        self.column(names).ok_or_else(|| {
            AppError::bad_request(format!(
                "{} is missing required column '{}'",
                self.label, names[0]
            ))
        })
    }

    /// Data rows paired with their 1-based spreadsheet row number.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[Data])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx + 2, row.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cell at `col`, or `None` past the end of a short row.
pub fn cell(row: &[Data], col: Option<usize>) -> Option<&Data> {
    col.and_then(|c| row.get(c))
}

/// Trimmed, non-empty text for a cell. Integral numbers print without a
/// fractional part, so numeric and textual ids compare equal.
pub fn cell_text(cell: Option<&Data>) -> Option<String> {
    let text = match cell? {
        Data::Empty => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::DateTime(dt) => serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::Error(e) => format!("#{:?}", e),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Numeric value of a cell. Text has thousands separators stripped first;
/// anything else that does not parse is an error.
pub fn cell_decimal(cell: Option<&Data>) -> Result<Option<Decimal>, String> {
    match cell {
        None | Some(Data::Empty) => Ok(None),
        Some(Data::Int(n)) => Ok(Some(Decimal::from(*n))),
        Some(Data::Float(n)) => float_to_decimal(*n)
            .map(Some)
            .ok_or_else(|| format!("{} is out of range", n)),
        Some(Data::String(s)) => parse_amount(s),
        Some(other) => Err(format!("'{}' is not a number", other)),
    }
}

/// Parses currency text such as `"1,200.50"`.
pub fn parse_amount(text: &str) -> Result<Option<Decimal>, String> {
    let normalized: String = text.trim().chars().filter(|c| *c != ',').collect();
    if normalized.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .map(Some)
        .map_err(|_| format!("'{}' is not a number", text.trim()))
}

/// Calendar date of a cell: a spreadsheet date, a date serial, or ISO text
/// optionally followed by a time of day.
pub fn cell_date(cell: Option<&Data>) -> Result<Option<NaiveDate>, String> {
    match cell {
        None | Some(Data::Empty) => Ok(None),
        Some(Data::DateTime(dt)) => serial_to_date(dt.as_f64())
            .map(Some)
            .ok_or_else(|| format!("{} is not a valid date serial", dt.as_f64())),
        Some(Data::Float(n)) => serial_to_date(*n)
            .map(Some)
            .ok_or_else(|| format!("{} is not a valid date serial", n)),
        Some(Data::Int(n)) => serial_to_date(*n as f64)
            .map(Some)
            .ok_or_else(|| format!("{} is not a valid date serial", n)),
        Some(Data::String(s)) | Some(Data::DateTimeIso(s)) => parse_date(s),
        Some(other) => Err(format!("'{}' is not a date", other)),
    }
}

pub fn parse_date(text: &str) -> Result<Option<NaiveDate>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(Some(date));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(datetime.date()));
        }
    }

    Err(format!("'{}' is not a date (expected YYYY-MM-DD)", text))
}

/// Converts an Excel serial (1900 date system) to a date, dropping any time
/// of day.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn float_to_decimal(n: f64) -> Option<Decimal> {
    Decimal::from_str(&n.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(n))
}
