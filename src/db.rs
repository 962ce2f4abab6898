use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "rosterd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            ticket_no TEXT PRIMARY KEY,
            pno TEXT NOT NULL,
            name TEXT NOT NULL,
            medical_policy TEXT,
            father_name TEXT,
            dob TEXT,
            gender TEXT,
            mobile TEXT,
            address TEXT,
            qualification_trade TEXT,
            passing_year INTEGER,
            college_name TEXT,
            ssc_percentage REAL,
            hsc_percentage REAL,
            aadhaar_no TEXT,
            pan_no TEXT,
            email_id TEXT,
            blood_group TEXT,
            current_address_route TEXT,
            batch TEXT
        )",
        [],
    )?;
    ensure_students_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            attendance_id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_no TEXT NOT NULL,
            month TEXT NOT NULL,
            total_days INTEGER NOT NULL,
            present_days INTEGER NOT NULL,
            absent_days INTEGER NOT NULL,
            attendance_percentage REAL NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(ticket_no) REFERENCES students(ticket_no) ON DELETE CASCADE,
            UNIQUE(ticket_no, month)
        )",
        [],
    )?;
    ensure_attendance_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_month ON attendance(month)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// UTC timestamp in the `YYYY-MM-DD HH:MM:SS` shape stored in `created_at`.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_attendance_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attendance", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE attendance ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_has_bookkeeping_columns() {
        let conn = open_in_memory().expect("open");
        init_schema(&conn).expect("re-init");
        assert!(table_has_column(&conn, "students", "updated_at").unwrap());
        assert!(table_has_column(&conn, "attendance", "updated_at").unwrap());
        assert!(table_has_column(&conn, "attendance", "created_at").unwrap());
        assert!(!table_has_column(&conn, "attendance", "student_name").unwrap());
    }

    #[test]
    fn attendance_requires_an_existing_student() {
        let conn = open_in_memory().expect("open");
        let res = conn.execute(
            "INSERT INTO attendance(ticket_no, month, total_days, present_days, absent_days, attendance_percentage, created_at)
             VALUES('nobody', 'January', 20, 18, 2, 90.0, '2025-01-01 00:00:00')",
            [],
        );
        assert!(res.is_err());
    }

    #[test]
    fn deleting_a_student_cascades_to_attendance() {
        let conn = open_in_memory().expect("open");
        conn.execute(
            "INSERT INTO students(ticket_no, pno, name) VALUES('T1', 'P1', 'Asha')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO attendance(ticket_no, month, total_days, present_days, absent_days, attendance_percentage, created_at)
             VALUES('T1', 'January', 20, 18, 2, 90.0, '2025-01-01 00:00:00')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM students", []).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }
}
