use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

pub const DB_FILE_NAME: &str = "tahlil.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            level TEXT NOT NULL,
            section TEXT NOT NULL,
            gender TEXT NOT NULL,
            birth_date TEXT,
            is_repeater INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_level ON students(level, section)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_sort ON students(sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            student_id TEXT NOT NULL,
            label TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY(student_id, label),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_label ON grades(label)",
        [],
    )?;

    // Raw header strings in first-discovery order. Resolution iterates this
    // order, so it must survive restarts unchanged.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_labels(
            label TEXT PRIMARY KEY,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[allow(dead_code)]
pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub name: String,
    pub level: String,
    pub section: String,
    pub gender: String,
    pub birth_date: Option<String>,
    pub is_repeater: bool,
    pub sort_order: i64,
    pub grades: HashMap<String, f64>,
}

/// Load students in roster order with their grade cells attached. `level`
/// and `section` narrow the cohort; `None` means no constraint.
pub fn load_students(
    conn: &Connection,
    level: Option<&str>,
    section: Option<&str>,
) -> rusqlite::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, level, section, gender, birth_date, is_repeater, sort_order
         FROM students
         WHERE (?1 IS NULL OR level = ?1) AND (?2 IS NULL OR section = ?2)
         ORDER BY sort_order",
    )?;
    let mut students: Vec<StudentRow> = stmt
        .query_map((level, section), |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                name: r.get(1)?,
                level: r.get(2)?,
                section: r.get(3)?,
                gender: r.get(4)?,
                birth_date: r.get(5)?,
                is_repeater: r.get::<_, i64>(6)? != 0,
                sort_order: r.get(7)?,
                grades: HashMap::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if students.is_empty() {
        return Ok(students);
    }

    let mut by_id: HashMap<String, usize> = HashMap::new();
    for (idx, s) in students.iter().enumerate() {
        by_id.insert(s.id.clone(), idx);
    }

    let mut grades_stmt = conn.prepare("SELECT student_id, label, value FROM grades")?;
    let rows = grades_stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, f64>(2)?,
        ))
    })?;
    for row in rows {
        let (student_id, label, value) = row?;
        if let Some(&idx) = by_id.get(&student_id) {
            students[idx].grades.insert(label, value);
        }
    }

    Ok(students)
}

/// Raw subject labels in discovery order.
pub fn load_subject_labels(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT label FROM subject_labels ORDER BY sort_order")?;
    let labels = stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>();
    labels
}

/// Append any labels not seen before, keeping existing positions untouched.
pub fn register_subject_labels(conn: &Connection, labels: &[String]) -> rusqlite::Result<()> {
    let mut next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM subject_labels",
        [],
        |r| r.get(0),
    )?;
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO subject_labels(label, sort_order) VALUES(?, ?)")?;
    for label in labels {
        let inserted = stmt.execute((label, next))?;
        if inserted > 0 {
            next += 1;
        }
    }
    Ok(())
}

pub fn clear_roster(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM grades", [])?;
    conn.execute("DELETE FROM students", [])?;
    conn.execute("DELETE FROM subject_labels", [])?;
    Ok(())
}
