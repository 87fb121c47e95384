mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, standard_subjects, student_row, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("tahlil-router-smoke");
    let bundle_out = workspace.join("smoke-backup.tahlilbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.import",
        json!({
            "subjects": standard_subjects(),
            "rows": [
                student_row("أحمد بن علي", "السنة الأولى متوسط", "01", "ذكر", false, json!({
                    "الرياضيات": 12.5, "اللغة العربية": 11.0, "معدل الفصل 1": 11.75
                })),
                student_row("فاطمة زهراء", "السنة الرابعة متوسط", "02", "أنثى", true, json!({
                    "الرياضيات": 9.0, "اللغة العربية": 13.0, "معدل الفصل 1": 10.5
                })),
            ]
        }),
    );
    assert_eq!(imported.get("imported").and_then(|v| v.as_u64()), Some(2));

    let _ = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let subjects = request_ok(&mut stdin, &mut reader, "5", "subjects.list", json!({}));
    assert_eq!(
        subjects
            .get("subjects")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(15)
    );
    let _ = request_ok(&mut stdin, &mut reader, "6", "cohorts.levels", json!({}));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "analytics.officialTable",
        json!({ "level": "السنة الأولى متوسط" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "analytics.sectionCompare",
        json!({ "level": "السنة الأولى متوسط", "subject": "الرياضيات" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "analytics.performanceMatrix",
        json!({ "level": "السنة الأولى متوسط" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "analytics.genderBreakdown",
        json!({}),
    );
    let _ = request_ok(&mut stdin, &mut reader, "11", "analytics.levelSummary", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "analytics.examCandidates",
        json!({}),
    );
    let _ = request_ok(&mut stdin, &mut reader, "13", "analytics.repeaters", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "analytics.remedialGroup",
        json!({ "studentIds": [] }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "analytics.orientation",
        json!({ "mode": "y4_only" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "16", "reports.quarterly", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "reports.institutionSubjects",
        json!({}),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "reports.officialTableExport",
        json!({}),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );

    let unknown = request(&mut stdin, &mut reader, "21", "nope.unknown", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
