use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::io::Cursor;

use crate::ingest::IngestError;

/// One spreadsheet cell, reduced to the shapes the normalizer cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Cell::DateTime(_))
    }

    /// Text rendering used for string fields and header labels.
    pub fn to_text(&self) -> Option<String> {
        let s = match self {
            Cell::Empty => return None,
            Cell::Text(s) => s.trim().to_string(),
            Cell::Int(n) => n.to_string(),
            Cell::Float(f) => {
                if !f.is_finite() {
                    return None;
                }
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    format!("{}", f)
                }
            }
            Cell::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Cell::DateTime(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.date().format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        };
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based spreadsheet row number.
    pub line: usize,
    pub cells: Vec<Cell>,
}

impl SheetRow {
    pub fn cell(&self, idx: usize) -> &Cell {
        self.cells.get(idx).unwrap_or(&Cell::Empty)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<Cell>,
    pub rows: Vec<SheetRow>,
}

impl Table {
    /// Builds a table from text headers and rows; the first data row is line 2.
    #[cfg(test)]
    pub fn from_cells(headers: Vec<Cell>, rows: Vec<Vec<Cell>>) -> Self {
        Table {
            headers,
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, cells)| SheetRow { line: i + 2, cells })
                .collect(),
        }
    }

    pub fn header_labels(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|c| c.to_text().unwrap_or_default())
            .collect()
    }

    pub fn has_date_headers(&self) -> bool {
        self.headers.iter().any(Cell::is_date)
    }
}

/// Excel's 1900 date system, with the Lotus leap-year bug folded into the epoch.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let secs = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    epoch
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(secs))
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn convert(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(n) => Cell::Int(*n),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Cell::DateTime)
            .unwrap_or(Cell::Float(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// Reads the first worksheet of an `.xlsx`/`.xls` workbook held in memory.
/// The first used row is the header row.
pub fn read_table(bytes: &[u8]) -> Result<Table, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| IngestError::Unreadable(e.to_string()))?;
    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(IngestError::NoWorksheet);
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IngestError::Unreadable(e.to_string()))?;

    let (start_row, _) = range.start().unwrap_or((0, 0));
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Table::default());
    };
    let headers = header_row.iter().map(convert).collect::<Vec<_>>();

    // start_row is 0-based; the header sits on 1-based line start_row + 1.
    let first_data_line = start_row as usize + 2;
    let body = rows
        .enumerate()
        .map(|(i, r)| SheetRow {
            line: first_data_line + i,
            cells: r.iter().map(convert).collect(),
        })
        .collect();

    Ok(Table {
        headers,
        rows: body,
    })
}
