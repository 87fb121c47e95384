use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Upload rows arrive with whatever the spreadsheet had in the gender
/// column; collapse to the three values the views filter on.
fn normalize_gender(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw else {
        return "غير محدد";
    };
    if raw.contains("ذكر") {
        "ذكر"
    } else if raw.contains("أنثى") || raw.contains("انثى") {
        "أنثى"
    } else {
        "غير محدد"
    }
}

/// Repeater flag: a JSON bool, or the legacy spreadsheet markers.
fn normalize_repeater(v: Option<&serde_json::Value>) -> bool {
    match v {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            t == "نعم" || t == "م"
        }
        _ => false,
    }
}

/// Grade cells: numbers pass through, numeric strings parse, everything
/// else is dropped. A dropped cell stays missing, never coerced to zero.
fn parse_grade(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn handle_students_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let Some(rows) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing rows", None);
    };
    let subjects: Vec<String> = req
        .params
        .get("subjects")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();
    let replace = req
        .params
        .get("mode")
        .and_then(|v| v.as_str())
        .map(|m| m.eq_ignore_ascii_case("replace"))
        .unwrap_or(false);

    let tx = match conn.unchecked_transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if replace {
        if let Err(e) = db::clear_roster(&tx) {
            return err(&req.id, "db_query_failed", e.to_string(), None);
        }
    }

    if let Err(e) = db::register_subject_labels(&tx, &subjects) {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    let mut sort_order: i64 = match tx.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students",
        [],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let now = chrono::Utc::now().to_rfc3339();
    let mut imported = 0usize;
    let mut skipped = 0usize;

    for row in rows {
        let Some(name) = row.get("name").and_then(|v| v.as_str()) else {
            skipped += 1;
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            skipped += 1;
            continue;
        }

        let id = row
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let level = row
            .get("level")
            .and_then(|v| v.as_str())
            .unwrap_or("غير محدد");
        let section = row
            .get("section")
            .and_then(|v| v.as_str())
            .unwrap_or("الكل");
        let gender = normalize_gender(row.get("gender").and_then(|v| v.as_str()));
        let birth_date = row.get("birthDate").and_then(|v| v.as_str());
        let is_repeater = normalize_repeater(row.get("isRepeater"));

        let inserted = tx.execute(
            "INSERT OR REPLACE INTO students
                (id, name, level, section, gender, birth_date, is_repeater, sort_order, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                name,
                level,
                section,
                gender,
                birth_date,
                is_repeater as i64,
                sort_order,
                &now,
            ),
        );
        if let Err(e) = inserted {
            return err(&req.id, "db_query_failed", e.to_string(), None);
        }
        sort_order += 1;

        if let Some(grades) = row.get("grades").and_then(|v| v.as_object()) {
            // Headers seen only in grade cells still join the label set,
            // after everything the upload listed explicitly.
            let unlisted: Vec<String> = grades
                .keys()
                .filter(|k| !k.trim().is_empty())
                .map(|k| k.to_string())
                .collect();
            if let Err(e) = db::register_subject_labels(&tx, &unlisted) {
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }

            for (label, value) in grades {
                let Some(parsed) = parse_grade(value) else {
                    continue;
                };
                let res = tx.execute(
                    "INSERT OR REPLACE INTO grades(student_id, label, value) VALUES (?, ?, ?)",
                    (&id, label, parsed),
                );
                if let Err(e) = res {
                    return err(&req.id, "db_query_failed", e.to_string(), None);
                }
            }
        }

        imported += 1;
    }

    let subject_count: i64 = match tx.query_row("SELECT COUNT(*) FROM subject_labels", [], |r| {
        r.get(0)
    }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "imported": imported,
            "skipped": skipped,
            "subjectCount": subject_count,
        }),
    )
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let level = req.params.get("level").and_then(|v| v.as_str());
    let section = req.params.get("section").and_then(|v| v.as_str());

    let students = match db::load_students(conn, level, section) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "level": s.level,
                "section": s.section,
                "gender": s.gender,
                "birthDate": s.birth_date,
                "isRepeater": s.is_repeater,
                "grades": s.grades,
            })
        })
        .collect();

    ok(&req.id, json!({ "students": rows, "total": rows.len() }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::load_subject_labels(conn) {
        Ok(labels) => ok(&req.id, json!({ "subjects": labels })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_cohort_levels(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let students = match db::load_students(conn, None, None) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Levels in first-seen roster order, sections sorted within each.
    let mut levels: Vec<String> = Vec::new();
    for s in &students {
        if !levels.contains(&s.level) {
            levels.push(s.level.clone());
        }
    }
    let out: Vec<serde_json::Value> = levels
        .iter()
        .map(|level| {
            let mut sections: Vec<String> = Vec::new();
            for s in students.iter().filter(|s| &s.level == level) {
                if !sections.contains(&s.section) {
                    sections.push(s.section.clone());
                }
            }
            sections.sort();
            json!({ "level": level, "sections": sections })
        })
        .collect();

    ok(&req.id, json!({ "levels": out }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.import" => Some(handle_students_import(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "cohorts.levels" => Some(handle_cohort_levels(state, req)),
        _ => None,
    }
}
