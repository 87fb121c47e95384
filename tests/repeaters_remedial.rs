mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, student_row, temp_dir};

#[test]
fn repeater_rows_sort_ascending_with_improvement_rate() {
    let workspace = temp_dir("tahlil-repeaters");
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
            "subjects": ["الرياضيات", "اللغة العربية", "معدل الفصل 1"],
            "rows": [
                student_row("معيد ١", "السنة الأولى متوسط", "01", "ذكر", true, json!({
                    "الرياضيات": 12.0, "اللغة العربية": 14.0, "معدل الفصل 1": 13.0
                })),
                student_row("معيد ٢", "السنة الأولى متوسط", "01", "أنثى", true, json!({
                    "الرياضيات": 6.0, "اللغة العربية": 8.0, "معدل الفصل 1": 7.0
                })),
                student_row("غير معيد", "السنة الأولى متوسط", "01", "ذكر", false, json!({
                    "الرياضيات": 10.0, "معدل الفصل 1": 10.0
                })),
            ]
        }),
    );

    let result = request_ok(&mut stdin, &mut reader, "3", "analytics.repeaters", json!({}));
    assert_eq!(result["totalRepeaters"].as_u64(), Some(2));
    assert_eq!(result["passingRepeaters"].as_u64(), Some(1));
    assert_eq!(result["failingRepeaters"].as_u64(), Some(1));
    assert_eq!(result["improvementRate"].as_f64(), Some(50.0));

    // Weakest first; the standing is the mean over every cell on the row.
    let rows = result["repeaters"].as_array().expect("repeaters");
    assert_eq!(rows[0]["name"].as_str(), Some("معيد ٢"));
    assert_eq!(rows[0]["average"].as_f64(), Some(7.0));
    assert_eq!(rows[0]["isPassingNow"].as_bool(), Some(false));
    assert_eq!(rows[1]["name"].as_str(), Some("معيد ١"));
    assert_eq!(rows[1]["average"].as_f64(), Some(13.0));
    assert_eq!(rows[1]["isPassingNow"].as_bool(), Some(true));

    // Section filter with no repeaters: empty but well-formed.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "analytics.repeaters",
        json!({ "section": "09" }),
    );
    assert_eq!(empty["totalRepeaters"].as_u64(), Some(0));
    assert_eq!(empty["improvementRate"].as_f64(), Some(0.0));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn remedial_group_ranks_subject_failures() {
    let workspace = temp_dir("tahlil-remedial");
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
            "subjects": ["الرياضيات", "اللغة العربية", "اللغة الفرنسية"],
            "rows": [
                student_row("أ", "السنة الأولى متوسط", "01", "ذكر", false, json!({
                    "الرياضيات": 6.0, "اللغة العربية": 12.0, "اللغة الفرنسية": 9.0
                })),
                student_row("ب", "السنة الأولى متوسط", "01", "أنثى", false, json!({
                    "الرياضيات": 7.0, "اللغة العربية": 9.0, "اللغة الفرنسية": 11.0
                })),
            ]
        }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "3", "students.list", json!({}));
    let ids: Vec<String> = listed["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| s["id"].as_str().expect("id").to_string())
        .collect();

    let group = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "analytics.remedialGroup",
        json!({ "studentIds": ids }),
    );
    assert_eq!(group["totalStudents"].as_u64(), Some(2));
    // Member averages: 9.0 and 9.0.
    assert_eq!(group["globalAverage"].as_f64(), Some(9.0));

    // Mathematics fails both members, the languages fail one each; the
    // ranking leads with mathematics.
    let failures = group["subjectFailures"].as_array().expect("failures");
    assert_eq!(failures[0]["subject"].as_str(), Some("الرياضيات"));
    assert_eq!(failures[0]["count"].as_u64(), Some(2));
    assert_eq!(failures[0]["percentage"].as_f64(), Some(100.0));
    assert_eq!(failures.len(), 3);
    assert!(failures[1]["count"].as_u64() == Some(1));
    assert!(failures[2]["count"].as_u64() == Some(1));

    let detailed = group["detailedSubjectStats"].as_array().expect("detailed");
    assert_eq!(detailed.len(), 3);
    let math = detailed
        .iter()
        .find(|d| d["name"].as_str() == Some("الرياضيات"))
        .expect("math");
    assert_eq!(math["average"].as_f64(), Some(6.5));
    assert_eq!(math["countAbove10"].as_u64(), Some(0));
    assert_eq!(math["passPercentage"].as_f64(), Some(0.0));

    // An empty selection produces the zero model, not an error.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "analytics.remedialGroup",
        json!({ "studentIds": [] }),
    );
    assert_eq!(empty["totalStudents"].as_u64(), Some(0));
    assert_eq!(empty["globalAverage"].as_f64(), Some(0.0));
    assert_eq!(
        empty["detailedSubjectStats"].as_array().map(|a| a.len()),
        Some(0)
    );

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}
