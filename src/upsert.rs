use anyhow::{bail, Context};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::now_timestamp;
use crate::normalize::{derive_attendance, Record};
use crate::schema::{EntityKind, EntitySchema};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// What the host sees after confirming a preview.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<UpsertSummary>,
}

/// Rebuilds records from the JSON array echoed back by the host.
pub fn records_from_json(
    schema: &EntitySchema,
    value: &serde_json::Value,
) -> Result<Vec<Record>, String> {
    let Some(items) = value.as_array() else {
        return Err("records must be an array".to_string());
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_object()
                .map(|obj| Record::from_json(schema, obj))
                .ok_or_else(|| format!("records[{}] must be an object", i))
        })
        .collect()
}

fn key_clause(schema: &EntitySchema) -> String {
    schema
        .key
        .iter()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn write_one(
    tx: &rusqlite::Transaction<'_>,
    schema: &EntitySchema,
    rec: &Record,
    now: &str,
) -> anyhow::Result<bool> {
    let Some(key) = rec.natural_key(schema) else {
        let labels = schema
            .key
            .iter()
            .map(|k| schema.label(k))
            .collect::<Vec<_>>()
            .join(", ");
        bail!("record is missing {}", labels);
    };

    let exists = tx
        .query_row(
            &format!("SELECT 1 FROM {} WHERE {}", schema.table, key_clause(schema)),
            params_from_iter(key.iter()),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();

    let present = schema
        .stored_fields()
        .filter(|f| rec.contains(f.key))
        .map(|f| {
            let v = rec
                .get(f.key)
                .map(|v| v.to_sql())
                .unwrap_or(rusqlite::types::Value::Null);
            (f.key, v)
        })
        .collect::<Vec<_>>();

    if exists {
        let mut sets = Vec::new();
        let mut values = Vec::new();
        for (k, v) in present.iter().filter(|(k, _)| !schema.key.contains(k)) {
            sets.push(format!("{} = ?", k));
            values.push(v.clone());
        }
        sets.push("updated_at = ?".to_string());
        values.push(rusqlite::types::Value::Text(now.to_string()));
        for k in &key {
            values.push(rusqlite::types::Value::Text(k.clone()));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            schema.table,
            sets.join(", "),
            key_clause(schema)
        );
        tx.execute(&sql, params_from_iter(values.iter()))?;
        return Ok(false);
    }

    let mut cols = present.iter().map(|(k, _)| *k).collect::<Vec<_>>();
    let mut values = present.into_iter().map(|(_, v)| v).collect::<Vec<_>>();
    if schema.kind == EntityKind::Attendance {
        cols.push("created_at");
        values.push(rusqlite::types::Value::Text(now.to_string()));
    }
    cols.push("updated_at");
    values.push(rusqlite::types::Value::Text(now.to_string()));
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        schema.table,
        cols.join(", "),
        vec!["?"; cols.len()].join(", ")
    );
    tx.execute(&sql, params_from_iter(values.iter()))?;
    Ok(true)
}

/// Inserts or merges `records` by natural key in one transaction. Nothing is
/// written unless every record succeeds.
pub fn upsert_records(
    conn: &Connection,
    schema: &EntitySchema,
    records: &[Record],
) -> anyhow::Result<UpsertSummary> {
    let tx = conn.unchecked_transaction()?;
    let now = now_timestamp();
    let mut summary = UpsertSummary::default();

    for (i, rec) in records.iter().enumerate() {
        let mut rec = rec.clone();
        let written = if schema.kind == EntityKind::Attendance && !derive_attendance(&mut rec) {
            Err(anyhow::anyhow!("Total Days and Present Days are out of range"))
        } else {
            write_one(&tx, schema, &rec, &now)
        };
        match written.with_context(|| format!("{} record {}", schema.kind.as_str(), i + 1)) {
            Ok(true) => summary.inserted += 1,
            Ok(false) => summary.updated += 1,
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    tracing::warn!(table = schema.table, error = %rb, "rollback failed");
                }
                tracing::warn!(table = schema.table, error = %e, "batch rolled back");
                return Err(e);
            }
        }
    }

    tx.commit()?;
    Ok(summary)
}

/// Upserts a confirmed batch and renders the operator-facing outcome.
pub fn confirm(conn: &Connection, kind: EntityKind, records: &[Record]) -> ConfirmOutcome {
    if records.is_empty() {
        return ConfirmOutcome {
            success: false,
            message: "No data to save".to_string(),
            summary: None,
        };
    }
    let schema = kind.schema();
    match upsert_records(conn, schema, records) {
        Ok(summary) => {
            tracing::info!(
                table = schema.table,
                inserted = summary.inserted,
                updated = summary.updated,
                "upsert committed"
            );
            let noun = match kind {
                EntityKind::Student => "students",
                EntityKind::Attendance => "attendance records",
            };
            ConfirmOutcome {
                success: true,
                message: format!("Successfully saved {} {} to database", summary.total(), noun),
                summary: Some(summary),
            }
        }
        Err(e) => ConfirmOutcome {
            success: false,
            message: format!("Database error: {:#}", e),
            summary: None,
        },
    }
}
