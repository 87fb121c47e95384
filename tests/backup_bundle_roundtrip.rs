mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, student_row, temp_dir};

#[test]
fn bundle_export_then_import_restores_the_roster() {
    let source = temp_dir("tahlil-backup-src");
    let restored = temp_dir("tahlil-backup-dst");
    let bundle = source.join("term1.tahlilbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({
            "subjects": ["الرياضيات", "معدل الفصل 1"],
            "rows": [
                student_row("أ", "السنة الأولى متوسط", "01", "ذكر", false, json!({
                    "الرياضيات": 12.0, "معدل الفصل 1": 11.0
                })),
            ]
        }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": source.to_string_lossy(),
            "outPath": bundle.to_string_lossy()
        }),
    );
    assert_eq!(
        exported["bundleFormat"].as_str(),
        Some("tahlil-workspace-v1")
    );
    assert_eq!(exported["entryCount"].as_u64(), Some(3));
    let digest = exported["dbSha256"].as_str().expect("digest");
    assert_eq!(digest.len(), 64);

    // Restore into a fresh workspace and read it back.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": restored.to_string_lossy(),
            "inPath": bundle.to_string_lossy()
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": restored.to_string_lossy() }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "6", "students.list", json!({}));
    assert_eq!(listed["total"].as_u64(), Some(1));
    assert_eq!(listed["students"][0]["name"].as_str(), Some("أ"));
    let subjects = request_ok(&mut stdin, &mut reader, "7", "subjects.list", json!({}));
    assert_eq!(
        subjects["subjects"].as_array().map(|a| a.len()),
        Some(2)
    );

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(restored);
}

#[test]
fn bare_sqlite_file_imports_as_legacy_backup() {
    let source = temp_dir("tahlil-backup-legacy-src");
    let restored = temp_dir("tahlil-backup-legacy-dst");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({
            "subjects": ["الرياضيات"],
            "rows": [student_row("ب", "السنة الثانية متوسط", "02", "أنثى", false, json!({
                "الرياضيات": 16.0
            }))]
        }),
    );

    // Hand the raw database file over as the input, the way old backups
    // were taken.
    let raw_db = source.join("tahlil.sqlite3");
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": restored.to_string_lossy(),
            "inPath": raw_db.to_string_lossy()
        }),
    );
    assert_eq!(
        imported["bundleFormatDetected"].as_str(),
        Some("legacy-sqlite3")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": restored.to_string_lossy() }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    assert_eq!(listed["total"].as_u64(), Some(1));
    assert_eq!(listed["students"][0]["name"].as_str(), Some("ب"));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(restored);
}
