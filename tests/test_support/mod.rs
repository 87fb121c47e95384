#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_tahlild");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tahlild");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// The fifteen raw headers of a typical upload, in the column order they
/// appear: official-ish spellings with the term average last.
pub fn standard_subjects() -> serde_json::Value {
    json!([
        "اللغة العربية",
        "اللغة الأمازيغية",
        "الرياضيات",
        "اللغة الفرنسية",
        "اللغة الإنجليزية",
        "التربية الإسلامية",
        "التاريخ والجغرافيا",
        "التربية المدنية",
        "العلوم الفيزيائية والتكنولوجيا",
        "علوم الطبيعة والحياة",
        "التربية التشكيلية",
        "التربية الموسيقية",
        "التربية البدنية والرياضية",
        "المعلوماتية",
        "معدل الفصل 1"
    ])
}

pub fn student_row(
    name: &str,
    level: &str,
    section: &str,
    gender: &str,
    repeater: bool,
    grades: serde_json::Value,
) -> serde_json::Value {
    json!({
        "name": name,
        "level": level,
        "section": section,
        "gender": gender,
        "isRepeater": repeater,
        "grades": grades,
    })
}
