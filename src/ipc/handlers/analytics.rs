use crate::db::{self, StudentRow};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats;
use crate::subjects::Subject;
use rusqlite::Connection;
use serde_json::json;

/// The four middle-school years, in promotion order. Institution-wide
/// breakdowns always report over this fixed list.
const LEVELS_ORDER: [&str; 4] = [
    "السنة الأولى متوسط",
    "السنة الثانية متوسط",
    "السنة الثالثة متوسط",
    "السنة الرابعة متوسط",
];

const THIRD_YEAR: &str = "السنة الثالثة متوسط";

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn opt_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
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

fn subject_by_official_name(name: &str) -> Option<Subject> {
    Subject::OFFICIAL_ORDER
        .into_iter()
        .find(|s| s.official_name() == name)
}

/// The term-average column is by convention the last header discovered in
/// the upload.
fn term_average_key(labels: &[String]) -> Option<&str> {
    labels.last().map(|s| s.as_str())
}

/// Term-average value for one student; missing reads as 0, matching how
/// the roster-wide views treat students without the column.
fn term_average_or_zero(student: &StudentRow, average_key: Option<&str>) -> f64 {
    average_key
        .and_then(|k| student.grades.get(k))
        .copied()
        .unwrap_or(0.0)
}

/// Mean of the term-average column over a cohort, missing cells as zero.
fn mean_term_average(list: &[&StudentRow], average_key: Option<&str>) -> f64 {
    let avgs: Vec<f64> = list
        .iter()
        .map(|s| term_average_or_zero(s, average_key))
        .collect();
    stats::mean(&avgs)
}

/// How many students in `list` sit an optional subject: resolved column
/// present with a grade above zero.
fn enrolled_count(list: &[&StudentRow], key: Option<&str>) -> usize {
    let Some(key) = key else { return 0 };
    list.iter()
        .filter(|s| s.grades.get(key).copied().unwrap_or(0.0) > 0.0)
        .count()
}

fn all_numeric_grades(students: &[&StudentRow]) -> Vec<f64> {
    students
        .iter()
        .flat_map(|s| s.grades.values())
        .copied()
        .filter(|v| v.is_finite())
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// -------------------------------------------------------------------------
// analytics.officialTable: the per-subject statistics table over a cohort,
// rows in official curriculum order, unresolved subjects silently skipped.
// -------------------------------------------------------------------------

fn handle_official_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = opt_str(req, "level");
    let cohort: Vec<&StudentRow> = students
        .iter()
        .filter(|s| level.map(|l| s.level == l).unwrap_or(true))
        .collect();

    let global_average = stats::mean(&all_numeric_grades(&cohort));

    let mut rows: Vec<serde_json::Value> = Vec::new();
    for subject in Subject::OFFICIAL_ORDER {
        let Some(raw_key) = subject.resolve(labels.iter().map(|l| l.as_str())) else {
            continue;
        };
        let subject_stats = stats::analyze_subject(
            cohort.iter().map(|s| &s.grades),
            raw_key,
            global_average,
        );
        let mut row = serde_json::to_value(&subject_stats)
            .unwrap_or_else(|_| json!({}));
        row["displayName"] = json!(subject.official_name());
        rows.push(row);
    }

    ok(
        &req.id,
        json!({
            "globalAverage": global_average,
            "cohortSize": cohort.len(),
            "rows": rows,
        }),
    )
}

// -------------------------------------------------------------------------
// analytics.sectionCompare: one official subject across a level's sections.
// -------------------------------------------------------------------------

fn handle_section_compare(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(level) = opt_str(req, "level") else {
        return err(&req.id, "bad_params", "missing level", None);
    };
    let Some(subject_name) = opt_str(req, "subject") else {
        return err(&req.id, "bad_params", "missing subject", None);
    };
    let Some(subject) = subject_by_official_name(subject_name) else {
        return err(
            &req.id,
            "bad_params",
            "subject must be an official subject name",
            Some(json!({ "subject": subject_name })),
        );
    };

    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level_students: Vec<&StudentRow> =
        students.iter().filter(|s| s.level == level).collect();

    let mut sections: Vec<String> = Vec::new();
    for s in &level_students {
        if !sections.contains(&s.section) {
            sections.push(s.section.clone());
        }
    }
    sections.sort();

    let Some(raw_key) = subject.resolve(labels.iter().map(|l| l.as_str())) else {
        return ok(
            &req.id,
            json!({ "sections": [], "levelSubjectAverage": 0.0 }),
        );
    };

    let mut section_rows: Vec<serde_json::Value> = Vec::new();
    let mut section_averages: Vec<f64> = Vec::new();
    for sec in &sections {
        let grades: Vec<f64> = level_students
            .iter()
            .filter(|s| &s.section == sec)
            .filter_map(|s| s.grades.get(raw_key))
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let avg = stats::mean(&grades);
        let pass_rate = stats::percentage(grades.iter().filter(|g| **g >= 10.0).count(), grades.len());
        let std_dev = stats::std_deviation(&grades);
        let cv = if avg != 0.0 { std_dev / avg * 100.0 } else { 0.0 };

        let rounded_avg = round2(avg);
        section_averages.push(rounded_avg);
        section_rows.push(json!({
            "section": format!("قسم {}", sec),
            "average": rounded_avg,
            "passRate": round1(pass_rate),
            "cv": round1(cv),
            "count": grades.len(),
        }));
    }

    ok(
        &req.id,
        json!({
            "rawLabel": raw_key,
            "sections": section_rows,
            "levelSubjectAverage": stats::mean(&section_averages),
        }),
    )
}

// -------------------------------------------------------------------------
// analytics.performanceMatrix: subject-by-section average heatmap over the
// 14 teaching subjects.
// -------------------------------------------------------------------------

fn handle_performance_matrix(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(level) = opt_str(req, "level") else {
        return err(&req.id, "bad_params", "missing level", None);
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level_students: Vec<&StudentRow> =
        students.iter().filter(|s| s.level == level).collect();

    let mut sections: Vec<String> = Vec::new();
    for s in &level_students {
        if !sections.contains(&s.section) {
            sections.push(s.section.clone());
        }
    }
    sections.sort();

    let mut rows: Vec<serde_json::Value> = Vec::new();
    for subject in Subject::teaching_subjects() {
        let Some(raw_key) = subject.resolve(labels.iter().map(|l| l.as_str())) else {
            continue;
        };
        let mut cells = serde_json::Map::new();
        for sec in &sections {
            let grades: Vec<f64> = level_students
                .iter()
                .filter(|s| &s.section == sec)
                .filter_map(|s| s.grades.get(raw_key))
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            let avg = if grades.is_empty() {
                0.0
            } else {
                stats::mean(&grades)
            };
            cells.insert(sec.clone(), json!(avg));
        }
        rows.push(json!({
            "subject": subject.official_name(),
            "sections": cells,
        }));
    }

    ok(&req.id, json!({ "sections": sections, "rows": rows }))
}

// -------------------------------------------------------------------------
// analytics.genderBreakdown: male/female cohort stats, the fixed per-level
// institution table, and the per-subject comparison.
// -------------------------------------------------------------------------

fn gender_cell(
    students: &[&StudentRow],
    gender: &str,
    total: usize,
    average_key: Option<&str>,
) -> serde_json::Value {
    let of_gender: Vec<&&StudentRow> = students.iter().filter(|s| s.gender == gender).collect();
    let count = of_gender.len();
    let passed = of_gender
        .iter()
        .filter(|s| term_average_or_zero(s, average_key) >= 10.0)
        .count();
    json!({
        "count": count,
        "percentage": stats::percentage(count, total),
        "passed": passed,
        "passedPercentage": stats::percentage(passed, count),
    })
}

fn handle_gender_breakdown(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let average_key = term_average_key(&labels);
    let level = opt_str(req, "level");

    let filtered: Vec<&StudentRow> = students
        .iter()
        .filter(|s| level.map(|l| s.level == l).unwrap_or(true))
        .collect();
    let males: Vec<&StudentRow> = filtered
        .iter()
        .copied()
        .filter(|s| s.gender == "ذكر")
        .collect();
    let females: Vec<&StudentRow> = filtered
        .iter()
        .copied()
        .filter(|s| s.gender == "أنثى")
        .collect();

    // Missing term averages read as zero here, as the dashboard does for
    // its headline gender cards.
    let male_pass = males
        .iter()
        .filter(|s| term_average_or_zero(s, average_key) >= 10.0)
        .count();
    let female_pass = females
        .iter()
        .filter(|s| term_average_or_zero(s, average_key) >= 10.0)
        .count();

    // Institution-wide table always spans the whole roster over the four
    // fixed levels, independent of the level filter.
    let all: Vec<&StudentRow> = students.iter().collect();
    let level_breakdown: Vec<serde_json::Value> = LEVELS_ORDER
        .iter()
        .filter_map(|level_name| {
            let level_students: Vec<&StudentRow> = students
                .iter()
                .filter(|s| s.level == *level_name)
                .collect();
            if level_students.is_empty() {
                return None;
            }
            let total = level_students.len();
            Some(json!({
                "levelName": level_name,
                "total": total,
                "female": gender_cell(&level_students, "أنثى", total, average_key),
                "male": gender_cell(&level_students, "ذكر", total, average_key),
            }))
        })
        .collect();
    let institution_totals = json!({
        "total": all.len(),
        "female": gender_cell(&all, "أنثى", all.len(), average_key),
        "male": gender_cell(&all, "ذكر", all.len(), average_key),
    });

    let mut subject_comparison: Vec<serde_json::Value> = Vec::new();
    for subject in Subject::OFFICIAL_ORDER {
        let Some(raw_key) = subject.resolve(labels.iter().map(|l| l.as_str())) else {
            continue;
        };
        let male_stats = stats::analyze_subject(males.iter().map(|s| &s.grades), raw_key, 0.0);
        let female_stats =
            stats::analyze_subject(females.iter().map(|s| &s.grades), raw_key, 0.0);
        subject_comparison.push(json!({
            "name": subject.official_name(),
            "maleAvg": male_stats.average,
            "femaleAvg": female_stats.average,
            "malePassCount": male_stats.count_above10,
            "femalePassCount": female_stats.count_above10,
            "malePassRate": male_stats.pass_percentage,
            "femalePassRate": female_stats.pass_percentage,
            "gap": male_stats.average - female_stats.average,
        }));
    }

    ok(
        &req.id,
        json!({
            "maleCount": males.len(),
            "femaleCount": females.len(),
            "maleAvg": mean_term_average(&males, average_key),
            "femaleAvg": mean_term_average(&females, average_key),
            "malePassRate": stats::percentage(male_pass, males.len()),
            "femalePassRate": stats::percentage(female_pass, females.len()),
            "levelBreakdown": level_breakdown,
            "institutionTotals": institution_totals,
            "subjectComparison": subject_comparison,
        }),
    )
}

// -------------------------------------------------------------------------
// analytics.levelSummary: institution overview: the global term-average
// distribution plus per-level enrollment and band tables.
// -------------------------------------------------------------------------

fn handle_level_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let average_key = term_average_key(&labels);

    let student_averages: Vec<f64> = students
        .iter()
        .map(|s| term_average_or_zero(s, average_key))
        .collect();
    let total_students = students.len();
    let global_average = stats::mean(&student_averages);
    let passed_count = student_averages.iter().filter(|v| **v >= 10.0).count();

    // Enrollment counts for the optional subjects go through the resolver;
    // a grade above zero means the student sits the subject.
    let amazigh_key = Subject::Amazigh.resolve(labels.iter().map(|l| l.as_str()));
    let art_key = Subject::ArtEducation.resolve(labels.iter().map(|l| l.as_str()));
    let music_key = Subject::MusicEducation.resolve(labels.iter().map(|l| l.as_str()));

    let mut levels_summary: Vec<serde_json::Value> = Vec::new();
    let mut totals = (0usize, 0usize, 0usize, 0usize, 0usize, 0usize);
    let mut totals_bands = stats::BandCounts::default();
    for level_name in LEVELS_ORDER {
        let level_students: Vec<&StudentRow> = students
            .iter()
            .filter(|s| s.level == level_name)
            .collect();
        if level_students.is_empty() {
            continue;
        }
        let level_averages: Vec<f64> = level_students
            .iter()
            .map(|s| term_average_or_zero(s, average_key))
            .collect();
        let females = level_students
            .iter()
            .filter(|s| s.gender == "أنثى")
            .count();
        let amazigh = enrolled_count(&level_students, amazigh_key);
        let art = enrolled_count(&level_students, art_key);
        let music = enrolled_count(&level_students, music_key);
        let passed = level_averages.iter().filter(|v| **v >= 10.0).count();
        let bands = stats::band_counts(&level_averages);

        totals.0 += level_students.len();
        totals.1 += females;
        totals.2 += amazigh;
        totals.3 += art;
        totals.4 += music;
        totals.5 += passed;
        totals_bands.below8 += bands.below8;
        totals_bands.v8to9 += bands.v8to9;
        totals_bands.v9to10 += bands.v9to10;
        totals_bands.v10to12 += bands.v10to12;
        totals_bands.v12to14 += bands.v12to14;
        totals_bands.v14to16 += bands.v14to16;
        totals_bands.v16to18 += bands.v16to18;
        totals_bands.above18 += bands.above18;

        levels_summary.push(json!({
            "name": level_name,
            "total": level_students.len(),
            "females": females,
            "amazigh": amazigh,
            "art": art,
            "music": music,
            "passed": passed,
            "distribution": bands,
        }));
    }

    ok(
        &req.id,
        json!({
            "totalStudents": total_students,
            "globalAverage": global_average,
            "passedCount": passed_count,
            "failedCount": total_students - passed_count,
            "successPercentage": stats::percentage(passed_count, total_students),
            "distribution": stats::band_counts(&student_averages),
            "levels": levels_summary,
            "totals": {
                "total": totals.0,
                "females": totals.1,
                "amazigh": totals.2,
                "art": totals.3,
                "music": totals.4,
                "passed": totals.5,
                "distribution": totals_bands,
            },
        }),
    )
}

// -------------------------------------------------------------------------
// analytics.examCandidates: the 4th-year certificate-exam cohort, with the
// borderline band and that view's merged-top distribution.
// -------------------------------------------------------------------------

fn handle_exam_candidates(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let average_key = term_average_key(&labels);

    let candidates: Vec<&StudentRow> = students
        .iter()
        .filter(|s| s.level.contains("الرابعة") || s.level.contains('4'))
        .collect();
    let avgs: Vec<f64> = candidates
        .iter()
        .map(|s| term_average_or_zero(s, average_key))
        .collect();

    let total = candidates.len();
    let passed = avgs.iter().filter(|v| **v >= 10.0).count();
    let borderline = avgs.iter().filter(|v| **v >= 9.0 && **v < 10.0).count();

    let mut performers: Vec<serde_json::Value> = candidates
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "section": s.section,
                "average": term_average_or_zero(s, average_key),
            })
        })
        .collect();
    performers.sort_by(|a, b| {
        let av = a["average"].as_f64().unwrap_or(0.0);
        let bv = b["average"].as_f64().unwrap_or(0.0);
        bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
    });
    performers.truncate(10);

    let borderline_students: Vec<serde_json::Value> = candidates
        .iter()
        .filter(|s| {
            let avg = term_average_or_zero(s, average_key);
            (9.0..10.0).contains(&avg)
        })
        .map(|s| {
            json!({
                "name": s.name,
                "section": s.section,
                "average": term_average_or_zero(s, average_key),
            })
        })
        .collect();

    // This view merges the two top bands into a single 16-and-up bucket.
    let bands = stats::band_counts(&avgs);
    let distribution = json!([
        { "name": "اقل من 8", "value": bands.below8 },
        { "name": "8.00-8.99", "value": bands.v8to9 },
        { "name": "9.00-9.99", "value": bands.v9to10 },
        { "name": "10.00-11.99", "value": bands.v10to12 },
        { "name": "12.00-13.99", "value": bands.v12to14 },
        { "name": "14.00-15.99", "value": bands.v14to16 },
        { "name": "16.00 فما فوق", "value": bands.v16to18 + bands.above18 },
    ]);

    ok(
        &req.id,
        json!({
            "total": total,
            "passed": passed,
            "borderline": borderline,
            "successRate": stats::percentage(passed, total),
            "potentialRate": stats::percentage(passed + borderline, total),
            "average": stats::mean(&avgs),
            "highPerformers": performers,
            "borderlineStudents": borderline_students,
            "distribution": distribution,
        }),
    )
}

// -------------------------------------------------------------------------
// analytics.repeaters: repeating students, current standing, improvement
// rate.
// -------------------------------------------------------------------------

fn handle_repeaters(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, _labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = opt_str(req, "level");
    let section = opt_str(req, "section");

    // A repeater's standing is the mean over every numeric cell on their
    // row, term average column included.
    let mut repeaters: Vec<(f64, &StudentRow)> = students
        .iter()
        .filter(|s| {
            s.is_repeater
                && level.map(|l| s.level == l).unwrap_or(true)
                && section.map(|sec| s.section == sec).unwrap_or(true)
        })
        .map(|s| {
            let grades: Vec<f64> = s
                .grades
                .values()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            (stats::mean(&grades), s)
        })
        .collect();
    repeaters.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let total = repeaters.len();
    let passing = repeaters.iter().filter(|(avg, _)| *avg >= 10.0).count();

    let rows: Vec<serde_json::Value> = repeaters
        .iter()
        .map(|(avg, s)| {
            json!({
                "id": s.id,
                "name": s.name,
                "level": s.level,
                "section": s.section,
                "average": avg,
                "isPassingNow": *avg >= 10.0,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "totalRepeaters": total,
            "passingRepeaters": passing,
            "failingRepeaters": total - passing,
            "improvementRate": stats::percentage(passing, total),
            "repeaters": rows,
        }),
    )
}

// -------------------------------------------------------------------------
// analytics.remedialGroup: stats over a hand-picked set of students, with
// the per-subject failure ranking used to build support groups.
// -------------------------------------------------------------------------

fn handle_remedial_group(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(ids) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing studentIds", None);
    };
    let ids: Vec<&str> = ids.iter().filter_map(|v| v.as_str()).collect();

    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group: Vec<&StudentRow> = students
        .iter()
        .filter(|s| ids.contains(&s.id.as_str()))
        .collect();

    let member_averages: Vec<f64> = group
        .iter()
        .map(|s| {
            let grades: Vec<f64> = s
                .grades
                .values()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            stats::mean(&grades)
        })
        .collect();
    let global_average = stats::mean(&member_averages);

    // Per raw label, not per official subject: a support group is built
    // against the columns as uploaded.
    let mut detailed: Vec<serde_json::Value> = Vec::new();
    let mut failures: Vec<(usize, f64, String)> = Vec::new();
    for label in &labels {
        let grades: Vec<f64> = group
            .iter()
            .filter_map(|s| s.grades.get(label))
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let count_above10 = grades.iter().filter(|g| **g >= 10.0).count();
        let average = stats::mean(&grades);
        let pass_percentage = stats::percentage(count_above10, grades.len());
        if average > 0.0 || count_above10 > 0 {
            detailed.push(json!({
                "name": label,
                "countAbove10": count_above10,
                "passPercentage": pass_percentage,
                "average": average,
            }));
            let failing = group.len() - count_above10;
            if failing > 0 {
                failures.push((failing, 100.0 - pass_percentage, label.clone()));
            }
        }
    }
    failures.sort_by(|a, b| b.0.cmp(&a.0));
    let subject_failures: Vec<serde_json::Value> = failures
        .iter()
        .map(|(count, percentage, label)| {
            json!({ "subject": label, "count": count, "percentage": percentage })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "totalStudents": group.len(),
            "globalAverage": global_average,
            "detailedSubjectStats": detailed,
            "subjectFailures": subject_failures,
        }),
    )
}

// -------------------------------------------------------------------------
// analytics.orientation: stream predictions for the final year, optionally
// blending the previous year's marks.
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrientationMode {
    Y4Only,
    Y3Y4Weighted,
}

/// Orientation source sheets abbreviate some headers; widen those three
/// subjects with the abbreviations on top of the registry rules. Local to
/// this view; the official resolver stays strict.
fn orientation_matches(subject: Subject, raw: &str) -> bool {
    if subject.matches(raw) {
        return true;
    }
    let r = raw.trim();
    match subject {
        Subject::NaturalSciences => r.contains("ع.ط.ح"),
        Subject::PhysicsTechnology => r.contains("ع.ف.ت"),
        Subject::HistoryGeography => r.contains("ت.ج"),
        _ => false,
    }
}

/// Grade for one orientation subject, scanning the student's cells in
/// discovery order so a repeated run binds the same column. Missing reads
/// as 0 for the composite formulas.
fn orientation_grade(student: &StudentRow, labels: &[String], subject: Subject) -> f64 {
    labels
        .iter()
        .find(|label| {
            student.grades.contains_key(label.as_str()) && orientation_matches(subject, label)
        })
        .and_then(|label| student.grades.get(label.as_str()))
        .copied()
        .unwrap_or(0.0)
}

fn handle_orientation(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (students, labels) = match load_roster(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let average_key = term_average_key(&labels);

    let mode = match req.params.get("mode").and_then(|v| v.as_str()) {
        None | Some("y3_y4_weighted") => OrientationMode::Y3Y4Weighted,
        Some("y4_only") => OrientationMode::Y4Only,
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "mode must be one of: y4_only, y3_y4_weighted",
                Some(json!({ "mode": other })),
            )
        }
    };
    let level = opt_str(req, "level").unwrap_or("السنة الرابعة متوسط");

    let cohort: Vec<&StudentRow> = students.iter().filter(|s| s.level == level).collect();

    let weighted = |s: &StudentRow, subject: Subject| -> f64 {
        let y4 = orientation_grade(s, &labels, subject);
        if mode == OrientationMode::Y3Y4Weighted {
            // Previous-year rows are matched by name; transfer files carry
            // no shared id across years.
            if let Some(y3_student) = students
                .iter()
                .find(|prev| prev.name == s.name && prev.level == THIRD_YEAR)
            {
                let y3 = orientation_grade(y3_student, &labels, subject);
                return (y3 + y4 * 2.0) / 3.0;
            }
        }
        y4
    };

    let mut rows: Vec<serde_json::Value> = Vec::new();
    let mut science = (0usize, 0usize, 0usize); // total, male, female
    let mut arts = (0usize, 0usize, 0usize);
    let mut remedial = (0usize, 0usize, 0usize);
    let mut successful = (0usize, 0usize, 0usize);

    for s in &cohort {
        let current_year_avg = term_average_or_zero(s, average_key);

        let math = weighted(s, Subject::Mathematics);
        let sciences = weighted(s, Subject::NaturalSciences);
        let physics = weighted(s, Subject::PhysicsTechnology);
        let arabic = weighted(s, Subject::Arabic);
        let french = weighted(s, Subject::French);
        let english = weighted(s, Subject::English);
        let history = weighted(s, Subject::HistoryGeography);

        let science_group_avg = (math * 4.0 + sciences * 4.0 + physics * 4.0 + arabic * 2.0) / 14.0;
        let arts_group_avg = (arabic * 5.0 + french * 4.0 + english * 3.0 + history * 2.0) / 14.0;

        let has_history = students
            .iter()
            .any(|prev| prev.name == s.name && prev.level == THIRD_YEAR);

        let prediction = if current_year_avg < 10.0 {
            "استدراك / إعادة"
        } else if science_group_avg >= arts_group_avg + 0.5 {
            "جذع مشترك علوم وتكنولوجيا"
        } else if arts_group_avg >= science_group_avg + 0.5 {
            "جذع مشترك آداب"
        } else if science_group_avg >= arts_group_avg {
            "علوم (توجيه مرن)"
        } else {
            "آداب (توجيه مرن)"
        };

        let is_male = s.gender == "ذكر";
        let is_female = s.gender == "أنثى";
        let bump = |cell: &mut (usize, usize, usize)| {
            cell.0 += 1;
            if is_male {
                cell.1 += 1;
            }
            if is_female {
                cell.2 += 1;
            }
        };
        if prediction.contains("علوم") {
            bump(&mut science);
        }
        if prediction.contains("آداب") {
            bump(&mut arts);
        }
        if prediction == "استدراك / إعادة" {
            bump(&mut remedial);
        }
        if current_year_avg >= 10.0 {
            bump(&mut successful);
        }

        rows.push(json!({
            "id": s.id,
            "name": s.name,
            "section": s.section,
            "gender": s.gender,
            "currentYearAvg": current_year_avg,
            "scienceGroupAvg": science_group_avg,
            "artsGroupAvg": arts_group_avg,
            "prediction": prediction,
            "hasHistory": has_history,
        }));
    }

    let cell = |c: (usize, usize, usize)| json!({ "total": c.0, "male": c.1, "female": c.2 });
    ok(
        &req.id,
        json!({
            "level": level,
            "mode": match mode {
                OrientationMode::Y4Only => "y4_only",
                OrientationMode::Y3Y4Weighted => "y3_y4_weighted",
            },
            "total": cohort.len(),
            "science": cell(science),
            "arts": cell(arts),
            "remedial": cell(remedial),
            "successful": cell(successful),
            "students": rows,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.officialTable" => Some(handle_official_table(state, req)),
        "analytics.sectionCompare" => Some(handle_section_compare(state, req)),
        "analytics.performanceMatrix" => Some(handle_performance_matrix(state, req)),
        "analytics.genderBreakdown" => Some(handle_gender_breakdown(state, req)),
        "analytics.levelSummary" => Some(handle_level_summary(state, req)),
        "analytics.examCandidates" => Some(handle_exam_candidates(state, req)),
        "analytics.repeaters" => Some(handle_repeaters(state, req)),
        "analytics.remedialGroup" => Some(handle_remedial_group(state, req)),
        "analytics.orientation" => Some(handle_orientation(state, req)),
        _ => None,
    }
}
