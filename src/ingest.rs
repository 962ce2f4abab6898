use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::columns::{missing_required, resolve_columns};
use crate::normalize::{round2, FieldValue, Normalizer, Record};
use crate::schema::{EntityKind, ATTENDANCE_SCHEMA};
use crate::sheet::{read_table, Cell, Table};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}")]
    Unreadable(String),

    #[error("workbook contains no worksheets")]
    NoWorksheet,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    #[error("Could not identify ticket number column")]
    NoTicketColumn,
}

#[derive(Debug, Clone)]
pub struct PreviewOptions {
    /// Fallback period for a daily matrix whose header dates cannot be read.
    pub today: NaiveDate,
    /// Explicit period label for a daily matrix upload.
    pub period: Option<String>,
}

impl PreviewOptions {
    pub fn new(today: NaiveDate) -> Self {
        PreviewOptions {
            today,
            period: None,
        }
    }
}

/// Result of parsing an upload, shown to the operator before anything is saved.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub success: bool,
    pub message: String,
    pub data: Vec<Record>,
    pub errors: Vec<String>,
}

impl Preview {
    fn failed(e: IngestError) -> Self {
        let errors = match &e {
            IngestError::Unreadable(_) | IngestError::NoWorksheet => {
                vec![format!("File processing error: {}", e)]
            }
            _ => Vec::new(),
        };
        let message = match &e {
            IngestError::Unreadable(_) | IngestError::NoWorksheet => {
                format!("Error reading Excel file: {}", e)
            }
            _ => e.to_string(),
        };
        Preview {
            success: false,
            message,
            data: Vec::new(),
            errors,
        }
    }

    fn processed(data: Vec<Record>, errors: Vec<String>) -> Self {
        Preview {
            success: true,
            message: format!("Processed {} records successfully", data.len()),
            data,
            errors,
        }
    }
}

pub fn preview_bytes(bytes: &[u8], kind: EntityKind, opts: &PreviewOptions) -> Preview {
    match read_table(bytes) {
        Ok(table) => preview_table(&table, kind, opts),
        Err(e) => Preview::failed(e),
    }
}

pub fn preview_table(table: &Table, kind: EntityKind, opts: &PreviewOptions) -> Preview {
    if kind == EntityKind::Attendance && table.has_date_headers() {
        return preview_daily_matrix(table, opts);
    }

    let schema = kind.schema();
    let labels = table.header_labels();
    let columns = resolve_columns(&labels, schema);
    let missing = missing_required(&columns, schema);
    if !missing.is_empty() {
        return Preview::failed(IngestError::MissingColumns(missing));
    }

    let mut normalizer = Normalizer::new(schema, &columns);
    for row in table.rows.iter().filter(|r| !r.is_blank()) {
        normalizer.push(row);
    }
    let (data, errors) = normalizer.finish();
    Preview::processed(data, errors)
}

fn identifier_columns(table: &Table) -> (Option<usize>, Option<usize>) {
    let mut ticket = None;
    let mut name = None;
    for (idx, cell) in table.headers.iter().enumerate() {
        let Cell::Text(s) = cell else {
            continue;
        };
        let lower = s.to_lowercase();
        if ticket.is_none() && (lower.contains("ticket") || lower.contains("id")) {
            ticket = Some(idx);
        } else if name.is_none() && lower.contains("name") {
            name = Some(idx);
        }
    }
    (ticket, name)
}

/// Layout where each date-typed header column is one day and cells hold
/// attendance marks. The period label comes from the header dates.
fn preview_daily_matrix(table: &Table, opts: &PreviewOptions) -> Preview {
    let (Some(ticket_col), name_col) = identifier_columns(table) else {
        return Preview::failed(IngestError::NoTicketColumn);
    };

    let day_dates = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| match c {
            Cell::DateTime(dt) => Some((idx, dt.date())),
            _ => None,
        })
        .collect::<Vec<_>>();
    let day_cols = day_dates.iter().map(|(idx, _)| *idx).collect::<Vec<_>>();

    let mut warnings = Vec::new();
    let period = match &opts.period {
        Some(p) => p.clone(),
        None => {
            let first = day_dates.iter().map(|(_, d)| *d).min().unwrap_or(opts.today);
            let spans_months = day_dates
                .iter()
                .any(|(_, d)| (d.year(), d.month()) != (first.year(), first.month()));
            if spans_months {
                warnings.push(format!(
                    "Header dates span more than one month; records were assigned to {}",
                    first.format("%B")
                ));
            }
            first.format("%B").to_string()
        }
    };

    let total = day_cols.len() as i64;
    let columns = Default::default();
    let mut normalizer = Normalizer::new(&ATTENDANCE_SCHEMA, &columns);
    for w in warnings {
        normalizer.push_error(w);
    }

    for row in table.rows.iter().filter(|r| !r.is_blank()) {
        let Some(ticket_no) = row.cell(ticket_col).to_text() else {
            normalizer.push_error(format!("Row {}: Missing ticket number", row.line));
            continue;
        };
        if total == 0 {
            normalizer.push_error(format!(
                "Row {}: No date columns found for attendance",
                row.line
            ));
            continue;
        }
        let present = day_cols
            .iter()
            .filter(|idx| {
                row.cell(**idx)
                    .to_text()
                    .map(|s| s.trim().to_uppercase().starts_with('P'))
                    .unwrap_or(false)
            })
            .count() as i64;

        let mut rec = Record::new();
        rec.set("ticket_no", Some(FieldValue::Text(ticket_no)));
        if let Some(col) = name_col {
            rec.set("student_name", row.cell(col).to_text().map(FieldValue::Text));
        }
        rec.set("month", Some(FieldValue::Text(period.clone())));
        rec.set("total_days", Some(FieldValue::Integer(total)));
        rec.set("present_days", Some(FieldValue::Integer(present)));
        rec.set("absent_days", Some(FieldValue::Integer(total - present)));
        rec.set(
            "attendance_percentage",
            Some(FieldValue::Number(round2(present as f64 / total as f64 * 100.0))),
        );
        normalizer.accept(row.line, rec);
    }

    let (data, errors) = normalizer.finish();
    Preview::processed(data, errors)
}
