use crate::db::{self, StudentRow};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats;
use crate::subjects::Subject;
use rusqlite::Connection;
use serde_json::json;

const LEVELS_ORDER: [&str; 4] = [
    "السنة الأولى متوسط",
    "السنة الثانية متوسط",
    "السنة الثالثة متوسط",
    "السنة الرابعة متوسط",
];

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn load_roster(
    conn: &Connection,
    req: &Request,
) -> Result<(Vec<StudentRow>, Vec<String>), serde_json::Value> {
    let students = db::load_students(conn, None, None)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let labels = db::load_subject_labels(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    Ok((students, labels))
}

fn term_average_or_zero(student: &StudentRow, average_key: Option<&str>) -> f64 {
    average_key
        .and_then(|k| student.grades.get(k))
        .copied()
        .unwrap_or(0.0)
}

fn pass_rate_rows(items: &[(f64, String)]) -> Vec<serde_json::Value> {
    items
        .iter()
        .map(|(rate, name)| json!({ "name": name, "passRate": rate }))
        .collect()
}

// -------------------------------------------------------------------------
// reports.quarterly: the headline model behind the end-of-term report:
// global numbers, per-level lines, strongest/weakest subjects.
// -------------------------------------------------------------------------

fn handle_quarterly(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let average_key = labels.last().map(|s| s.as_str());

    let all_averages: Vec<f64> = students
        .iter()
        .map(|s| term_average_or_zero(s, average_key))
        .collect();
    let global_avg = stats::mean(&all_averages);
    let passed_count = all_averages.iter().filter(|v| **v >= 10.0).count();
    let success_rate = stats::percentage(passed_count, students.len());

    let level_stats: Vec<serde_json::Value> = LEVELS_ORDER
        .iter()
        .filter_map(|level| {
            let level_students: Vec<&StudentRow> =
                students.iter().filter(|s| s.level == *level).collect();
            if level_students.is_empty() {
                return None;
            }
            let avgs: Vec<f64> = level_students
                .iter()
                .map(|s| term_average_or_zero(s, average_key))
                .collect();
            let passed = avgs.iter().filter(|v| **v >= 10.0).count();
            Some(json!({
                "name": level.replace("السنة ", "").replace(" متوسط", ""),
                "fullName": level,
                "total": level_students.len(),
                "avg": stats::mean(&avgs),
                "passRate": stats::percentage(passed, level_students.len()),
            }))
        })
        .collect();

    // Strong/weak subjects rank the raw columns, term average excluded.
    let mut subject_list: Vec<(f64, String)> = labels
        .iter()
        .filter(|label| Some(label.as_str()) != average_key)
        .map(|label| {
            let s = stats::analyze_subject(students.iter().map(|s| &s.grades), label, 0.0);
            (s.pass_percentage, label.clone())
        })
        .collect();
    subject_list.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let top_subjects = pass_rate_rows(&subject_list[..subject_list.len().min(3)]);
    let bottom_subjects: Vec<serde_json::Value> = {
        let mut rev: Vec<(f64, String)> = subject_list.clone();
        rev.reverse();
        pass_rate_rows(&rev[..rev.len().min(3)])
    };

    let best_level_name = level_stats
        .iter()
        .max_by(|a, b| {
            let ar = a["passRate"].as_f64().unwrap_or(0.0);
            let br = b["passRate"].as_f64().unwrap_or(0.0);
            ar.partial_cmp(&br).unwrap_or(std::cmp::Ordering::Equal)
        })
        .and_then(|l| l["name"].as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "-".to_string());

    ok(
        &req.id,
        json!({
            "total": students.len(),
            "globalAvg": global_avg,
            "successRate": success_rate,
            "levelStats": level_stats,
            "topSubjects": top_subjects,
            "bottomSubjects": bottom_subjects,
            "distribution": [
                { "name": "تعثر (<10)", "value": students.len() - passed_count },
                { "name": "نجاح (≥10)", "value": passed_count },
            ],
            "bestLevelName": best_level_name,
        }),
    )
}

// -------------------------------------------------------------------------
// reports.institutionSubjects: whole-school aggregation per raw column,
// keyed by label in discovery order.
// -------------------------------------------------------------------------

fn handle_institution_subjects(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let all_grades: Vec<f64> = students
        .iter()
        .flat_map(|s| s.grades.values())
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    let global_avg = stats::mean(&all_grades);

    let mut subjects = serde_json::Map::new();
    for label in &labels {
        let s = stats::analyze_subject(students.iter().map(|s| &s.grades), label, global_avg);
        subjects.insert(
            label.clone(),
            serde_json::to_value(&s).unwrap_or_else(|_| json!({})),
        );
    }

    ok(
        &req.id,
        json!({
            "globalAverage": global_avg,
            "subjects": subjects,
        }),
    )
}

// -------------------------------------------------------------------------
// reports.officialTableExport: the spreadsheet re-export model, with the
// Arabic column keys the workbook writer expects. File writing itself
// belongs to the caller.
// -------------------------------------------------------------------------

fn handle_official_table_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = req
        .params
        .get("level")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    let cohort: Vec<&StudentRow> = students
        .iter()
        .filter(|s| level.map(|l| s.level == l).unwrap_or(true))
        .collect();
    let all_grades: Vec<f64> = cohort
        .iter()
        .flat_map(|s| s.grades.values())
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    let global_average = stats::mean(&all_grades);

    let mut rows: Vec<serde_json::Value> = Vec::new();
    for subject in Subject::OFFICIAL_ORDER {
        let Some(raw_key) = subject.resolve(labels.iter().map(|l| l.as_str())) else {
            continue;
        };
        let s = stats::analyze_subject(cohort.iter().map(|s| &s.grades), raw_key, global_average);
        rows.push(json!({
            "المواد التعليمية": subject.official_name(),
            "عدد المتحصلين على معدل ≥ 10": s.count_above10,
            "نسبة عدد المتحصلين على معدل ≥ 10": format!("{:.1}%", s.pass_percentage),
            "معدل المادة": format!("{:.2}", s.average),
        }));
    }

    ok(
        &req.id,
        json!({
            "fileName": format!("تحليل_المواد_{}", level.unwrap_or("الكل")),
            "sheetName": "تحليل نتائج المواد",
            "rows": rows,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.quarterly" => Some(handle_quarterly(state, req)),
        "reports.institutionSubjects" => Some(handle_institution_subjects(state, req)),
        "reports.officialTableExport" => Some(handle_official_table_export(state, req)),
        _ => None,
    }
}
