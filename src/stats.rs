use serde::Serialize;
use std::collections::HashMap;

/// Arithmetic mean; 0 for an empty slice. Every degenerate case in this
/// module collapses to a zero-valued default so callers always receive a
/// fully populated record.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / (values.len() as f64)
}

/// Population standard deviation (sum of squared deviations over n, not
/// n-1); 0 for an empty slice.
pub fn std_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let square_diffs: Vec<f64> = values.iter().map(|v| (v - avg).powi(2)).collect();
    mean(&square_diffs).sqrt()
}

/// Most frequent value; the first-encountered value wins frequency ties
/// (stable scan, counts only ever displace the running mode when strictly
/// greater). 0 for an empty slice.
pub fn mode(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut frequency: HashMap<u64, usize> = HashMap::new();
    let mut max_freq = 0usize;
    let mut mode = values[0];
    for &v in values {
        let count = frequency.entry(v.to_bits()).or_insert(0);
        *count += 1;
        if *count > max_freq {
            max_freq = *count;
            mode = v;
        }
    }
    mode
}

/// `part / total * 100`, 0 when `total` is 0.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64) / (total as f64) * 100.0
}

/// Grade-distribution histogram over the eight fixed bands of the 0–20
/// scale. Bands are half-open and contiguous; the top band is unbounded
/// above so dirty data past 20 still lands somewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandCounts {
    #[serde(rename = "below8")]
    pub below8: usize,
    #[serde(rename = "v8to9")]
    pub v8to9: usize,
    #[serde(rename = "v9to10")]
    pub v9to10: usize,
    #[serde(rename = "v10to12")]
    pub v10to12: usize,
    #[serde(rename = "v12to14")]
    pub v12to14: usize,
    #[serde(rename = "v14to16")]
    pub v14to16: usize,
    #[serde(rename = "v16to18")]
    pub v16to18: usize,
    #[serde(rename = "above18")]
    pub above18: usize,
}

impl BandCounts {
    #[allow(dead_code)]
    pub fn total(&self) -> usize {
        self.below8
            + self.v8to9
            + self.v9to10
            + self.v10to12
            + self.v12to14
            + self.v14to16
            + self.v16to18
            + self.above18
    }
}

pub fn band_counts(values: &[f64]) -> BandCounts {
    let mut bands = BandCounts::default();
    for &v in values {
        if v < 8.0 {
            bands.below8 += 1;
        } else if v < 9.0 {
            bands.v8to9 += 1;
        } else if v < 10.0 {
            bands.v9to10 += 1;
        } else if v < 12.0 {
            bands.v10to12 += 1;
        } else if v < 14.0 {
            bands.v12to14 += 1;
        } else if v < 16.0 {
            bands.v14to16 += 1;
        } else if v < 18.0 {
            bands.v16to18 += 1;
        } else {
            bands.above18 += 1;
        }
    }
    bands
}

/// Qualitative position of a subject mean against a reference average.
///
/// The equal branch uses exact float equality, faithful to the source
/// system; on real spreadsheet data it essentially never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    #[serde(rename = "أعلى من المعدل العام")]
    AboveReference,
    #[serde(rename = "أقل من المعدل العام")]
    BelowReference,
    #[serde(rename = "مساوي للمعدل العام")]
    EqualReference,
}

impl Comparison {
    pub fn classify(average: f64, reference: f64) -> Comparison {
        if average > reference {
            Comparison::AboveReference
        } else if average < reference {
            Comparison::BelowReference
        } else {
            Comparison::EqualReference
        }
    }
}

/// Aggregation result for one (cohort, raw subject label) pair. Field names
/// on the wire match the dashboard's `SubjectStats` shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub name: String,
    pub average: f64,
    pub pass_percentage: f64,
    pub std_dev: f64,
    pub cv: f64,
    pub mode: f64,
    #[serde(rename = "countBelow8")]
    pub count_below8: usize,
    #[serde(rename = "count8to9")]
    pub count_8to9: usize,
    #[serde(rename = "count9to10")]
    pub count_9to10: usize,
    #[serde(rename = "count10to12")]
    pub count_10to12: usize,
    #[serde(rename = "count12to14")]
    pub count_12to14: usize,
    #[serde(rename = "count14to16")]
    pub count_14to16: usize,
    #[serde(rename = "count16to18")]
    pub count_16to18: usize,
    #[serde(rename = "countAbove18")]
    pub count_above18: usize,
    #[serde(rename = "countAbove10")]
    pub count_above10: usize,
    pub comparison: Comparison,
}

/// Pull the valid grade list for one raw label out of a cohort of grade
/// maps: present and finite, nothing else. Absent cells are absent, never
/// zero.
pub fn valid_grades<'a, I>(cohort: I, raw_label: &str) -> Vec<f64>
where
    I: IntoIterator<Item = &'a HashMap<String, f64>>,
{
    cohort
        .into_iter()
        .filter_map(|grades| grades.get(raw_label))
        .copied()
        .filter(|v| v.is_finite())
        .collect()
}

/// Full statistics for one raw subject label over a cohort.
///
/// Degenerate inputs (empty cohort, label absent everywhere) produce the
/// documented all-zero record rather than an error; dependent tables render
/// every row either way.
pub fn analyze_subject<'a, I>(cohort: I, raw_label: &str, reference_average: f64) -> SubjectStats
where
    I: IntoIterator<Item = &'a HashMap<String, f64>>,
{
    let grades = valid_grades(cohort, raw_label);

    let average = mean(&grades);
    let std_dev = std_deviation(&grades);
    let cv = if average != 0.0 {
        std_dev / average * 100.0
    } else {
        0.0
    };
    let mode = mode(&grades);

    let bands = band_counts(&grades);
    let count_above10 = grades.iter().filter(|g| **g >= 10.0).count();
    let pass_percentage = percentage(count_above10, grades.len());

    SubjectStats {
        name: raw_label.to_string(),
        average,
        pass_percentage,
        std_dev,
        cv,
        mode,
        count_below8: bands.below8,
        count_8to9: bands.v8to9,
        count_9to10: bands.v9to10,
        count_10to12: bands.v10to12,
        count_12to14: bands.v12to14,
        count_14to16: bands.v14to16,
        count_16to18: bands.v16to18,
        count_above18: bands.above18,
        count_above10,
        comparison: Comparison::classify(average, reference_average),
    }
}
