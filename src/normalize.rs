use chrono::{Datelike, NaiveDate};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::columns::ColumnMap;
use crate::schema::{EntityKind, EntitySchema, FieldKind};
use crate::sheet::{Cell, SheetRow};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn to_sql(&self) -> rusqlite::types::Value {
        use rusqlite::types::Value as Sql;
        match self {
            FieldValue::Text(s) => Sql::Text(s.clone()),
            FieldValue::Integer(n) => Sql::Integer(*n),
            FieldValue::Number(f) => Sql::Real(*f),
            FieldValue::Date(d) => Sql::Text(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Number(f) => serializer.serialize_f64(*f),
            FieldValue::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
        }
    }
}

/// A normalized row: logical field -> coerced value. A present key holding
/// `None` is an explicit null, which differs from an absent key on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<&'static str, Option<FieldValue>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &'static str, value: Option<FieldValue>) {
        self.values.insert(key, value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key).and_then(|v| v.as_ref())
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(FieldValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(FieldValue::Number(f)) => Some(*f),
            Some(FieldValue::Integer(n)) => Some(*n as f64),
            _ => None,
        }
    }

    /// Natural key rendered for duplicate detection, `None` if any part is null.
    pub fn natural_key(&self, schema: &EntitySchema) -> Option<Vec<String>> {
        schema
            .key
            .iter()
            .map(|k| self.text(k).map(|s| s.to_string()))
            .collect()
    }

    /// Rebuilds a record from JSON sent back by the host, applying the same
    /// coercions as spreadsheet cells. Unknown keys are ignored.
    pub fn from_json(schema: &EntitySchema, obj: &serde_json::Map<String, Value>) -> Self {
        let mut rec = Record::new();
        for field in schema.fields {
            let Some(raw) = obj.get(field.key) else {
                continue;
            };
            let cell = json_to_cell(raw);
            rec.set(field.key, coerce(field.kind, &cell));
        }
        rec
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn json_to_cell(v: &Value) -> Cell {
    match v {
        Value::Null => Cell::Empty,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(Cell::Int)
            .or_else(|| n.as_f64().map(Cell::Float))
            .unwrap_or(Cell::Empty),
        Value::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

pub fn coerce(kind: FieldKind, cell: &Cell) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => cell.to_text().map(FieldValue::Text),
        FieldKind::Integer => coerce_integer(cell).map(FieldValue::Integer),
        FieldKind::Percent => coerce_percent(cell).map(FieldValue::Number),
        FieldKind::Date => coerce_date(cell).map(FieldValue::Date),
    }
}

pub fn coerce_integer(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Int(n) => Some(*n),
        Cell::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Cell::Text(s) => {
            let t = s.trim();
            t.parse::<i64>().ok().or_else(|| {
                t.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

pub fn coerce_percent(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Int(n) => Some(*n as f64),
        Cell::Float(f) if f.is_finite() => Some(*f),
        Cell::Text(s) => {
            let t = s.trim();
            let t = t.strip_suffix('%').unwrap_or(t).trim();
            t.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

const FOUR_DIGIT_YEAR_FORMATS: &[&str] = &["%d-%m-%Y", "%m/%d/%Y", "%d/%m/%Y", "%d-%b-%Y"];
const TWO_DIGIT_YEAR_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d-%b-%y"];

pub fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    // chrono's %Y also takes one or two digits; "25-12-01" is not year 25.
    let iso = |v: &str| {
        NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .ok()
            .filter(|d| d.year() >= 1000)
    };
    if let Some(d) = iso(t) {
        return Some(d);
    }
    // Date cells rendered as text carry a time component.
    if let Some(d) = t.split_once(' ').and_then(|(day, _)| iso(day)) {
        return Some(d);
    }
    FOUR_DIGIT_YEAR_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
        .find(|d| d.year() >= 1000)
        .or_else(|| {
            TWO_DIGIT_YEAR_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
        })
}

pub fn coerce_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(s) => parse_date_text(s),
        _ => None,
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Fills `absent_days` and `attendance_percentage` from the day counts when
/// they are missing. Explicit values are never overwritten.
///
/// Returns false when the counts are too large to subtract; nothing is
/// derived in that case.
pub fn derive_attendance(rec: &mut Record) -> bool {
    let total = rec.integer("total_days");
    let present = rec.integer("present_days");
    let (Some(total), Some(present)) = (total, present) else {
        return true;
    };
    let Some(absent) = total.checked_sub(present) else {
        return false;
    };
    if rec.integer("absent_days").is_none() {
        rec.set("absent_days", Some(FieldValue::Integer(absent)));
    }
    if rec.number("attendance_percentage").is_none() && total > 0 {
        let pct = round2(present as f64 / total as f64 * 100.0);
        rec.set("attendance_percentage", Some(FieldValue::Number(pct)));
    }
    true
}

pub fn percentage_out_of_range(rec: &Record) -> Option<f64> {
    rec.number("attendance_percentage")
        .filter(|p| !(0.0..=100.0).contains(p))
}

fn format_percent(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("{:.1}", p)
    } else {
        format!("{}", p)
    }
}

pub fn range_warning(line: usize, pct: f64) -> String {
    format!(
        "Row {}: Attendance percentage ({}) is not within valid range (0-100)",
        line,
        format_percent(pct)
    )
}

pub fn duplicate_message(schema: &EntitySchema, line: usize, key: &[String]) -> String {
    match schema.kind {
        EntityKind::Student => format!(
            "Row {}: Duplicate Ticket No '{}' in uploaded data",
            line, key[0]
        ),
        EntityKind::Attendance => format!(
            "Row {}: Duplicate record for Ticket No '{}' and Month '{}' in uploaded data",
            line, key[0], key[1]
        ),
    }
}

/// Accumulates normalized records and row errors for one upload.
pub struct Normalizer<'a> {
    schema: &'static EntitySchema,
    columns: &'a ColumnMap,
    seen: HashSet<Vec<String>>,
    records: Vec<Record>,
    errors: Vec<String>,
}

impl<'a> Normalizer<'a> {
    pub fn new(schema: &'static EntitySchema, columns: &'a ColumnMap) -> Self {
        Normalizer {
            schema,
            columns,
            seen: HashSet::new(),
            records: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn extract(&self, row: &SheetRow) -> Record {
        let mut rec = Record::new();
        for field in self.schema.fields {
            let Some(col) = self.columns.get(field.key) else {
                continue;
            };
            rec.set(field.key, coerce(field.kind, row.cell(col.index)));
        }
        rec
    }

    pub fn push(&mut self, row: &SheetRow) {
        let mut rec = self.extract(row);
        if self.schema.kind == EntityKind::Attendance && !derive_attendance(&mut rec) {
            self.errors.push(format!(
                "Row {}: Total Days and Present Days are out of range",
                row.line
            ));
            return;
        }
        self.accept(row.line, rec);
    }

    /// Runs the required-field and duplicate checks on an already built record.
    pub fn accept(&mut self, line: usize, rec: Record) {
        let missing = self
            .schema
            .required_fields
            .iter()
            .filter(|k| rec.get(k).is_none())
            .map(|k| self.schema.label(k))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            self.errors.push(format!(
                "Row {}: Missing required fields: {}",
                line,
                missing.join(", ")
            ));
            return;
        }

        let Some(key) = rec.natural_key(self.schema) else {
            self.errors
                .push(format!("Row {}: Missing required fields: Ticket No", line));
            return;
        };
        if self.seen.contains(&key) {
            self.errors
                .push(duplicate_message(self.schema, line, &key));
            return;
        }

        if let Some(pct) = percentage_out_of_range(&rec) {
            self.errors.push(range_warning(line, pct));
        }
        self.seen.insert(key);
        self.records.push(rec);
    }

    pub fn push_error(&mut self, message: String) {
        self.errors.push(message);
    }

    pub fn finish(self) -> (Vec<Record>, Vec<String>) {
        (self.records, self.errors)
    }
}
