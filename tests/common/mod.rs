//! Shared fixtures for the integration tests

#![allow(dead_code)]

use marketing_classifiers::utils::{Dataset, Feature, LabelSet, BANK_MARKETING_COLUMNS};
use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use tempfile::NamedTempFile;

/// `(name, class-0 base, class-1 base, jitter width)`; the gap between the
/// classes is wider than the jitter
const NUMERIC: [(&str, i64, i64, i64); 7] = [
    ("age", 20, 70, 16),
    ("balance", 0, 5000, 1000),
    ("day", 1, 21, 8),
    ("duration", 50, 2050, 400),
    ("campaign", 1, 11, 3),
    ("pdays", -1, 299, 50),
    ("previous", 0, 20, 4),
];

/// Two categories per class; every class-0 category sorts before every
/// class-1 category
const CATEGORICAL: [(&str, [&str; 2], [&str; 2]); 9] = [
    ("job", ["admin.", "blue-collar"], ["student", "technician"]),
    ("marital", ["divorced", "married"], ["single", "widowed"]),
    ("education", ["primary", "secondary"], ["tertiary", "unknown"]),
    ("default", ["n", "no"], ["y", "yes"]),
    ("housing", ["n", "no"], ["y", "yes"]),
    ("loan", ["n", "no"], ["y", "yes"]),
    ("contact", ["cellular", "none"], ["telephone", "unknown"]),
    ("month", ["apr", "aug"], ["may", "nov"]),
    ("poutcome", ["failure", "other"], ["success", "unknown"]),
];

/// Bank marketing shaped text (`;` separated, quoted strings) in which every
/// feature separates the classes; rows alternate no / yes
pub fn separable_bank_csv(n_rows: usize, seed: u64) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let header: Vec<String> = BANK_MARKETING_COLUMNS.iter().map(|c| format!("\"{}\"", c)).collect();
    let mut out = header.join(";");
    out.push('\n');

    for i in 0..n_rows {
        let class = i % 2;
        let fields: Vec<String> = BANK_MARKETING_COLUMNS
            .iter()
            .map(|&col| {
                if col == "y" {
                    return if class == 1 { "\"yes\"".to_string() } else { "\"no\"".to_string() };
                }
                if let Some(&(_, base0, base1, width)) = NUMERIC.iter().find(|(n, ..)| *n == col) {
                    let base = if class == 1 { base1 } else { base0 };
                    return (base + rng.gen_range(0..width)).to_string();
                }
                let (_, zero, one) = CATEGORICAL
                    .iter()
                    .find(|(n, ..)| *n == col)
                    .copied()
                    .unwrap_or(("", ["a", "b"], ["c", "d"]));
                let pool = if class == 1 { one } else { zero };
                format!("\"{}\"", pool[rng.gen_range(0..2)])
            })
            .collect();
        out.push_str(&fields.join(";"));
        out.push('\n');
    }
    out
}

pub fn write_temp_csv(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// One feature that separates the classes plus `n_noise` uniform noise
/// features; the dominant feature sits at index `dominant`
pub fn dominant_feature_dataset(n_rows: usize, n_noise: usize, dominant: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let labels: Array1<f64> = (0..n_rows).map(|_| if rng.gen_bool(0.4) { 1.0 } else { 0.0 }).collect();

    let mut features: Vec<Feature> = (0..n_noise)
        .map(|j| {
            let values = (0..n_rows).map(|_| rng.gen_range(0.0..10.0)).collect();
            Feature::numeric(format!("noise_{}", j), values)
        })
        .collect();
    let signal = labels.iter().map(|&y| y * 10.0 + rng.gen_range(0.0..3.0)).collect();
    features.insert(dominant.min(n_noise), Feature::numeric("signal", signal));

    Dataset::new(features, "y", LabelSet::default(), labels).unwrap()
}
