use serde::Serialize;
use std::collections::BTreeMap;

use crate::schema::EntitySchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub index: usize,
    /// Header text as it appears in the file.
    pub header: String,
}

pub type ColumnMap = BTreeMap<&'static str, ResolvedColumn>;

pub fn normalize_header(s: &str) -> String {
    s.trim().to_lowercase().replace('_', " ").trim().to_string()
}

/// Maps each logical field of `schema` to the header that best matches one of
/// its synonyms.
///
/// Synonyms are tried in listed order. For a synonym, an exact match anywhere
/// in the header row wins over a substring match; among equal candidates the
/// leftmost header wins. Empty headers never match. Fields with no match are
/// left out of the map.
pub fn resolve_columns(headers: &[String], schema: &EntitySchema) -> ColumnMap {
    let normalized = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (i, normalize_header(h)))
        .filter(|(_, n)| !n.is_empty())
        .collect::<Vec<_>>();

    let mut out = ColumnMap::new();
    for field in schema.fields {
        for synonym in field.synonyms {
            let wanted = normalize_header(synonym);
            let exact = normalized.iter().find(|(_, n)| *n == wanted);
            let hit = exact.or_else(|| {
                normalized
                    .iter()
                    .find(|(_, n)| n.contains(wanted.as_str()) || wanted.contains(n.as_str()))
            });
            if let Some((idx, _)) = hit {
                out.insert(
                    field.key,
                    ResolvedColumn {
                        index: *idx,
                        header: headers[*idx].clone(),
                    },
                );
                break;
            }
        }
    }
    out
}

pub fn missing_required(columns: &ColumnMap, schema: &EntitySchema) -> Vec<&'static str> {
    schema
        .required_columns
        .iter()
        .copied()
        .filter(|k| !columns.contains_key(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ATTENDANCE_SCHEMA, STUDENT_SCHEMA};

    fn headers(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_case_space_and_underscores() {
        assert_eq!(normalize_header("  Ticket_No "), "ticket no");
        assert_eq!(normalize_header("DATE_OF_BIRTH"), "date of birth");
    }

    #[test]
    fn resolves_roster_headers_with_original_labels() {
        let h = headers(&["Ticket No", "Name", "PNO", "Mobile"]);
        let map = resolve_columns(&h, &STUDENT_SCHEMA);
        assert_eq!(map["ticket_no"].header, "Ticket No");
        assert_eq!(map["name"].header, "Name");
        assert_eq!(map["pno"].header, "PNO");
        assert_eq!(map["mobile"].index, 3);
        assert!(missing_required(&map, &STUDENT_SCHEMA).is_empty());
        assert!(!map.contains_key("dob"));
    }

    #[test]
    fn exact_match_beats_earlier_substring_match() {
        // "student name" contains "name", but the exact "name" header wins.
        let h = headers(&["Student Name", "Name"]);
        let map = resolve_columns(&h, &STUDENT_SCHEMA);
        assert_eq!(map["name"].index, 1);
    }

    #[test]
    fn substring_ties_break_leftmost() {
        let h = headers(&["Mobile Number (home)", "Mobile Number (work)"]);
        let map = resolve_columns(&h, &STUDENT_SCHEMA);
        assert_eq!(map["mobile"].index, 0);
    }

    #[test]
    fn empty_headers_are_ignored() {
        let h = headers(&["", "Ticket", "  "]);
        let map = resolve_columns(&h, &STUDENT_SCHEMA);
        assert_eq!(map["ticket_no"].index, 1);
        assert!(!map.contains_key("pno"));
        assert_eq!(missing_required(&map, &STUDENT_SCHEMA), vec!["pno", "name"]);
    }

    #[test]
    fn attendance_percentage_column_is_optional() {
        let h = headers(&["Ticket No", "Month", "Total Days", "Present Days"]);
        let map = resolve_columns(&h, &ATTENDANCE_SCHEMA);
        assert!(missing_required(&map, &ATTENDANCE_SCHEMA).is_empty());
        assert!(!map.contains_key("attendance_percentage"));
        assert!(!map.contains_key("absent_days"));
    }

    #[test]
    fn every_synonym_resolves_its_field() {
        for schema in [&STUDENT_SCHEMA, &ATTENDANCE_SCHEMA] {
            for field in schema.fields {
                for syn in field.synonyms {
                    let map = resolve_columns(&headers(&[syn]), schema);
                    assert!(
                        map.contains_key(field.key),
                        "{} did not resolve from {:?}",
                        field.key,
                        syn
                    );
                }
            }
        }
    }
}
