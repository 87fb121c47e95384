mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, student_row, temp_dir};

#[test]
fn official_table_rows_follow_registry_order_and_skip_unmatched() {
    let workspace = temp_dir("tahlil-official-table");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Alternate spellings only, and no Amazigh column at all.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({
            "subjects": ["رياضيات", "اللغة عربية", "لغة فرنسية", "معدل الفصل 1"],
            "rows": [
                student_row("أ", "السنة الأولى متوسط", "01", "ذكر", false, json!({
                    "رياضيات": 12.0, "اللغة عربية": 14.0, "لغة فرنسية": 8.0, "معدل الفصل 1": 11.0
                })),
                student_row("ب", "السنة الأولى متوسط", "01", "أنثى", false, json!({
                    "رياضيات": 8.0, "اللغة عربية": 10.0, "لغة فرنسية": 16.0, "معدل الفصل 1": 12.0
                })),
            ]
        }),
    );

    let table = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "analytics.officialTable",
        json!({ "level": "السنة الأولى متوسط" }),
    );
    let rows = table["rows"].as_array().expect("rows");

    // Four columns resolve; Amazigh and the rest are silently absent.
    let names: Vec<&str> = rows
        .iter()
        .map(|r| r["displayName"].as_str().expect("displayName"))
        .collect();
    assert_eq!(
        names,
        vec!["اللغة العربية", "الرياضيات", "اللغة الفرنسية", "معدل الفصل 1"]
    );

    // Each row analyzes the raw header it resolved, not the official name.
    let math = &rows[1];
    assert_eq!(math["name"].as_str(), Some("رياضيات"));
    assert_eq!(math["average"].as_f64(), Some(10.0));
    assert_eq!(math["countAbove10"].as_u64(), Some(1));
    assert_eq!(math["passPercentage"].as_f64(), Some(50.0));
    assert_eq!(math["count10to12"].as_u64(), Some(1));
    assert_eq!(math["count8to9"].as_u64(), Some(1));
    assert!(math.get("comparison").and_then(|v| v.as_str()).is_some());

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn empty_cohort_still_produces_full_zero_rows() {
    let workspace = temp_dir("tahlil-official-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({
            "subjects": ["الرياضيات"],
            "rows": [student_row("أ", "السنة الأولى متوسط", "01", "ذكر", false, json!({
                "الرياضيات": 15.0
            }))]
        }),
    );

    // A level with no students: the column resolves, the stats zero out.
    let table = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "analytics.officialTable",
        json!({ "level": "السنة الرابعة متوسط" }),
    );
    let rows = table["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["average"].as_f64(), Some(0.0));
    assert_eq!(rows[0]["stdDev"].as_f64(), Some(0.0));
    assert_eq!(rows[0]["cv"].as_f64(), Some(0.0));
    assert_eq!(rows[0]["mode"].as_f64(), Some(0.0));
    assert_eq!(rows[0]["passPercentage"].as_f64(), Some(0.0));
    assert_eq!(table["cohortSize"].as_u64(), Some(0));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}
