use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRow {
    pub ticket_no: String,
    pub pno: String,
    pub name: String,
    pub medical_policy: Option<String>,
    pub father_name: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub qualification_trade: Option<String>,
    pub passing_year: Option<i64>,
    pub college_name: Option<String>,
    pub ssc_percentage: Option<f64>,
    pub hsc_percentage: Option<f64>,
    pub aadhaar_no: Option<String>,
    pub pan_no: Option<String>,
    pub email_id: Option<String>,
    pub blood_group: Option<String>,
    pub current_address_route: Option<String>,
    pub batch: Option<String>,
    pub updated_at: Option<String>,
}

impl StudentRow {
    /// Profile returned by ticket search. Identity document numbers, the
    /// medical policy and the batch are left out.
    pub fn search_profile(&self, attendance: &[AttendanceRow]) -> serde_json::Value {
        json!({
            "ticket_no": self.ticket_no,
            "pno": self.pno,
            "name": self.name,
            "father_name": self.father_name,
            "dob": self.dob,
            "gender": self.gender,
            "mobile": self.mobile,
            "address": self.address,
            "qualification_trade": self.qualification_trade,
            "passing_year": self.passing_year,
            "college_name": self.college_name,
            "ssc_percentage": self.ssc_percentage,
            "hsc_percentage": self.hsc_percentage,
            "email_id": self.email_id,
            "blood_group": self.blood_group,
            "current_address_route": self.current_address_route,
            "attendance_records": attendance.iter().map(|a| json!({
                "month": a.month,
                "total_days": a.total_days,
                "present_days": a.present_days,
                "absent_days": a.absent_days,
                "attendance_percentage": a.attendance_percentage,
            })).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRow {
    pub attendance_id: i64,
    pub ticket_no: String,
    pub month: String,
    pub total_days: i64,
    pub present_days: i64,
    pub absent_days: i64,
    pub attendance_percentage: f64,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub student_name: Option<String>,
}

const STUDENT_COLUMNS: &str = "ticket_no, pno, name, medical_policy, father_name, dob, gender,
    mobile, address, qualification_trade, passing_year, college_name, ssc_percentage,
    hsc_percentage, aadhaar_no, pan_no, email_id, blood_group, current_address_route,
    batch, updated_at";

const ATTENDANCE_SELECT: &str = "SELECT a.attendance_id, a.ticket_no, a.month, a.total_days,
    a.present_days, a.absent_days, a.attendance_percentage, a.created_at, a.updated_at, s.name
    FROM attendance a LEFT JOIN students s ON s.ticket_no = a.ticket_no";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        ticket_no: r.get(0)?,
        pno: r.get(1)?,
        name: r.get(2)?,
        medical_policy: r.get(3)?,
        father_name: r.get(4)?,
        dob: r.get(5)?,
        gender: r.get(6)?,
        mobile: r.get(7)?,
        address: r.get(8)?,
        qualification_trade: r.get(9)?,
        passing_year: r.get(10)?,
        college_name: r.get(11)?,
        ssc_percentage: r.get(12)?,
        hsc_percentage: r.get(13)?,
        aadhaar_no: r.get(14)?,
        pan_no: r.get(15)?,
        email_id: r.get(16)?,
        blood_group: r.get(17)?,
        current_address_route: r.get(18)?,
        batch: r.get(19)?,
        updated_at: r.get(20)?,
    })
}

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok(AttendanceRow {
        attendance_id: r.get(0)?,
        ticket_no: r.get(1)?,
        month: r.get(2)?,
        total_days: r.get(3)?,
        present_days: r.get(4)?,
        absent_days: r.get(5)?,
        attendance_percentage: r.get(6)?,
        created_at: r.get(7)?,
        updated_at: r.get(8)?,
        student_name: r.get(9)?,
    })
}

fn query_students(
    conn: &Connection,
    tail: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<StudentRow>> {
    let sql = format!("SELECT {} FROM students {}", STUDENT_COLUMNS, tail);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_attendance(
    conn: &Connection,
    tail: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<AttendanceRow>> {
    let sql = format!("{} {}", ATTENDANCE_SELECT, tail);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, attendance_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<StudentRow>> {
    query_students(conn, "ORDER BY ticket_no", []).context("list students")
}

/// First students in storage order, as shown on the dashboard.
pub fn first_students(conn: &Connection, limit: usize) -> anyhow::Result<Vec<StudentRow>> {
    query_students(conn, "ORDER BY rowid LIMIT ?", [limit as i64]).context("first students")
}

pub fn get_student(conn: &Connection, ticket_no: &str) -> anyhow::Result<Option<StudentRow>> {
    let sql = format!("SELECT {} FROM students WHERE ticket_no = ?", STUDENT_COLUMNS);
    conn.query_row(&sql, [ticket_no], student_from_row)
        .optional()
        .context("get student")
}

pub fn list_attendance(conn: &Connection) -> anyhow::Result<Vec<AttendanceRow>> {
    query_attendance(conn, "ORDER BY a.month, a.ticket_no", []).context("list attendance")
}

pub fn attendance_for_student(
    conn: &Connection,
    ticket_no: &str,
) -> anyhow::Result<Vec<AttendanceRow>> {
    query_attendance(conn, "WHERE a.ticket_no = ? ORDER BY a.month", [ticket_no])
        .context("attendance for student")
}

pub fn attendance_for_month(conn: &Connection, month: &str) -> anyhow::Result<Vec<AttendanceRow>> {
    query_attendance(conn, "WHERE a.month = ? ORDER BY a.ticket_no", [month])
        .context("attendance for month")
}

pub fn recent_attendance(conn: &Connection, limit: usize) -> anyhow::Result<Vec<AttendanceRow>> {
    query_attendance(
        conn,
        "ORDER BY a.created_at DESC, a.attendance_id DESC LIMIT ?",
        [limit as i64],
    )
    .context("recent attendance")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub students: i64,
    pub attendance: i64,
}

pub fn counts(conn: &Connection) -> anyhow::Result<TableCounts> {
    let students = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    let attendance = conn.query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))?;
    Ok(TableCounts {
        students,
        attendance,
    })
}

/// Deletes every attendance record and then every student in one transaction.
pub fn clear_all(conn: &Connection) -> anyhow::Result<TableCounts> {
    let tx = conn.unchecked_transaction()?;
    let attendance = tx.execute("DELETE FROM attendance", [])? as i64;
    let students = tx.execute("DELETE FROM students", [])? as i64;
    tx.commit()?;
    Ok(TableCounts {
        students,
        attendance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO students(ticket_no, pno, name, aadhaar_no, pan_no, batch)
               VALUES('T2', 'P2', 'Ravi', '1111', 'ABCDE', 'B1');
             INSERT INTO students(ticket_no, pno, name) VALUES('T1', 'P1', 'Asha');
             INSERT INTO attendance(ticket_no, month, total_days, present_days, absent_days, attendance_percentage, created_at)
               VALUES('T2', 'March', 20, 18, 2, 90.0, '2025-03-31 10:00:00');
             INSERT INTO attendance(ticket_no, month, total_days, present_days, absent_days, attendance_percentage, created_at)
               VALUES('T2', 'February', 20, 10, 10, 50.0, '2025-02-28 10:00:00');
             INSERT INTO attendance(ticket_no, month, total_days, present_days, absent_days, attendance_percentage, created_at)
               VALUES('T1', 'March', 20, 20, 0, 100.0, '2025-03-31 09:00:00');",
        )
        .unwrap();
    }

    #[test]
    fn lists_are_ordered_and_joined_with_names() {
        let conn = open_in_memory().unwrap();
        seed(&conn);
        let students = list_students(&conn).unwrap();
        assert_eq!(students[0].ticket_no, "T1");
        let first = first_students(&conn, 5).unwrap();
        assert_eq!(first[0].ticket_no, "T2");

        let all = list_attendance(&conn).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].month, "February");
        assert_eq!(all[0].student_name.as_deref(), Some("Ravi"));

        let mine = attendance_for_student(&conn, "T2").unwrap();
        assert_eq!(
            mine.iter().map(|a| a.month.as_str()).collect::<Vec<_>>(),
            vec!["February", "March"]
        );
        assert_eq!(attendance_for_month(&conn, "March").unwrap().len(), 2);

        let recent = recent_attendance(&conn, 2).unwrap();
        assert_eq!(recent[0].ticket_no, "T2");
        assert_eq!(recent[0].month, "March");
    }

    #[test]
    fn search_profile_hides_identity_documents() {
        let conn = open_in_memory().unwrap();
        seed(&conn);
        let s = get_student(&conn, "T2").unwrap().expect("student");
        let att = attendance_for_student(&conn, "T2").unwrap();
        let profile = s.search_profile(&att);
        assert!(profile.get("aadhaar_no").is_none());
        assert!(profile.get("pan_no").is_none());
        assert!(profile.get("batch").is_none());
        assert_eq!(profile["attendance_records"].as_array().unwrap().len(), 2);
        assert!(get_student(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn clear_all_empties_both_tables() {
        let conn = open_in_memory().unwrap();
        seed(&conn);
        let removed = clear_all(&conn).unwrap();
        assert_eq!(removed, TableCounts { students: 2, attendance: 3 });
        assert_eq!(counts(&conn).unwrap(), TableCounts { students: 0, attendance: 0 });
    }
}
