//! Data loading utilities
//!
//! Reads a delimited text file into a [`Dataset`] whose column types are
//! decided once, here, and carried through the rest of the pipeline.

use crate::error::{ClassifyError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Category assigned to empty tokens in categorical columns
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Header of the bank marketing dataset, in file order; `y` is the label.
pub const BANK_MARKETING_COLUMNS: [&str; 17] = [
    "age", "job", "marital", "education", "default", "balance", "housing", "loan",
    "contact", "day", "month", "duration", "campaign", "pdays", "previous", "poutcome", "y",
];

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// Column values, tagged with their type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Categorical(_) => ColumnKind::Categorical,
        }
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Categorical(v) => {
                Column::Categorical(rows.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// A named feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub column: Column,
}

impl Feature {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self { name: name.into(), column: Column::Numeric(values) }
    }

    pub fn categorical<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            column: Column::Categorical(values.into_iter().map(Into::into).collect()),
        }
    }
}

/// The two label tokens, in canonical (negative, positive) order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub negative: String,
    pub positive: String,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self { negative: "no".to_string(), positive: "yes".to_string() }
    }
}

impl LabelSet {
    /// Token for an encoded label (0.0 = negative, 1.0 = positive)
    pub fn token(&self, label: f64) -> &str {
        if label >= 0.5 { &self.positive } else { &self.negative }
    }
}

/// Per-column summary used by the `info` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    /// Distinct categories (categorical columns)
    pub n_categories: Option<usize>,
    /// Value range (numeric columns)
    pub range: Option<(f64, f64)>,
}

/// Tabular dataset: feature columns plus a binary label column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    features: Vec<Feature>,
    label_name: String,
    label_set: LabelSet,
    labels: Array1<f64>,
}

impl Dataset {
    /// Assemble a dataset, checking that every column has one value per label
    pub fn new(
        features: Vec<Feature>,
        label_name: impl Into<String>,
        label_set: LabelSet,
        labels: Array1<f64>,
    ) -> Result<Self> {
        let n = labels.len();
        for feature in &features {
            if feature.column.len() != n {
                return Err(ClassifyError::FormatError(format!(
                    "column '{}' has {} rows, label column has {}",
                    feature.name,
                    feature.column.len(),
                    n
                )));
            }
        }
        if let Some(bad) = labels.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(ClassifyError::FormatError(format!(
                "labels must be encoded as 0/1, found {}",
                bad
            )));
        }
        Ok(Self { features, label_name: label_name.into(), label_set, labels })
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature(&self, idx: usize) -> Option<&Feature> {
        self.features.get(idx)
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.features.get(idx).map(|f| &f.column)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    pub fn label_set(&self) -> &LabelSet {
        &self.label_set
    }

    /// Labels encoded as 0.0 (negative) / 1.0 (positive)
    pub fn labels(&self) -> &Array1<f64> {
        &self.labels
    }

    /// (negative count, positive count)
    pub fn class_counts(&self) -> (usize, usize) {
        let positive = self.labels.iter().filter(|&&v| v == 1.0).count();
        (self.labels.len() - positive, positive)
    }

    /// Restrict to a subset of rows, keeping their order
    pub fn select_rows(&self, rows: &[usize]) -> Result<Dataset> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_rows()) {
            return Err(ClassifyError::InvalidArgument(format!(
                "row {} out of range for {} rows",
                bad,
                self.n_rows()
            )));
        }
        Ok(Dataset {
            features: self
                .features
                .iter()
                .map(|f| Feature { name: f.name.clone(), column: f.column.select(rows) })
                .collect(),
            label_name: self.label_name.clone(),
            label_set: self.label_set.clone(),
            labels: rows.iter().map(|&i| self.labels[i]).collect(),
        })
    }

    pub fn summary(&self) -> Vec<ColumnSummary> {
        self.features
            .iter()
            .map(|f| match &f.column {
                Column::Numeric(values) => {
                    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    ColumnSummary {
                        name: f.name.clone(),
                        kind: ColumnKind::Numeric,
                        n_categories: None,
                        range: if values.is_empty() { None } else { Some((min, max)) },
                    }
                }
                Column::Categorical(values) => {
                    let distinct: BTreeSet<&str> = values.iter().map(|s| s.as_str()).collect();
                    ColumnSummary {
                        name: f.name.clone(),
                        kind: ColumnKind::Categorical,
                        n_categories: Some(distinct.len()),
                        range: None,
                    }
                }
            })
            .collect()
    }
}

/// Options controlling how a file is parsed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Field delimiter (None = sniff from the header line)
    pub delimiter: Option<u8>,
    /// Label token treated as the positive class
    pub positive_label: String,
    /// Exact header required, if any
    pub expected_header: Option<Vec<String>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            positive_label: "yes".to_string(),
            expected_header: None,
        }
    }
}

impl LoadOptions {
    /// Options enforcing the 17-column bank marketing schema
    pub fn bank_marketing() -> Self {
        Self {
            expected_header: Some(BANK_MARKETING_COLUMNS.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_positive_label(mut self, label: impl Into<String>) -> Self {
        self.positive_label = label.into();
        self
    }
}

/// Loader for delimited text files
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    options: LoadOptions,
}

impl DataLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    /// Load a file from disk
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)?;
        let dataset = self.from_reader(file)?;
        let (negative, positive) = dataset.class_counts();
        info!(
            path = %path.display(),
            rows = dataset.n_rows(),
            features = dataset.n_features(),
            negative,
            positive,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Parse from any reader
    pub fn from_reader<R: Read>(&self, mut reader: R) -> Result<Dataset> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| ClassifyError::FormatError(format!("input is not valid UTF-8 text: {}", e)))?;
        self.parse_str(&text)
    }

    /// Parse delimited text held in memory
    pub fn parse_str(&self, text: &str) -> Result<Dataset> {
        let header_line = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| ClassifyError::FormatError("input is empty".to_string()))?;
        let delimiter = self.options.delimiter.unwrap_or_else(|| sniff_delimiter(header_line));
        debug!(delimiter = %(delimiter as char), "Parsing delimited text");

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let header: Vec<String> = reader.headers()?.iter().map(clean_token).collect();
        if header.len() < 2 {
            return Err(ClassifyError::FormatError(format!(
                "need at least one feature column and a label column, found {} column(s)",
                header.len()
            )));
        }
        if let Some(expected) = &self.options.expected_header {
            if &header != expected {
                return Err(ClassifyError::FormatError(format!(
                    "header mismatch: expected {} columns [{}], found {} columns [{}]",
                    expected.len(),
                    expected.join(", "),
                    header.len(),
                    header.join(", ")
                )));
            }
        }

        let n_cols = header.len();
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); n_cols];
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != n_cols {
                return Err(ClassifyError::FormatError(format!(
                    "row {} has {} fields, header has {}",
                    row_idx + 2,
                    record.len(),
                    n_cols
                )));
            }
            for (col, field) in record.iter().enumerate() {
                raw[col].push(clean_token(field));
            }
        }

        let n_rows = raw[0].len();
        if n_rows == 0 {
            return Err(ClassifyError::FormatError("no data rows".to_string()));
        }

        let label_tokens = raw.pop().unwrap_or_default();
        let label_name = header[n_cols - 1].clone();
        let (label_set, labels) = encode_labels(&label_name, &label_tokens, &self.options.positive_label)?;

        let features = header
            .into_iter()
            .zip(raw)
            .map(|(name, tokens)| infer_column(&name, tokens).map(|column| Feature { name, column }))
            .collect::<Result<Vec<_>>>()?;

        Dataset::new(features, label_name, label_set, labels)
    }
}

/// Pick `;` when the header uses it, otherwise `,`
fn sniff_delimiter(header_line: &str) -> u8 {
    if header_line.contains(';') {
        b';'
    } else if header_line.contains('\t') && !header_line.contains(',') {
        b'\t'
    } else {
        b','
    }
}

/// Trim whitespace and strip one level of enclosing quotes
fn clean_token(raw: &str) -> String {
    let t = raw.trim();
    let stripped = ['"', '\'']
        .iter()
        .find_map(|&q| {
            if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
                Some(&t[1..t.len() - 1])
            } else {
                None
            }
        })
        .unwrap_or(t);
    stripped.trim().to_string()
}

fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn infer_column(name: &str, tokens: Vec<String>) -> Result<Column> {
    let non_empty: Vec<&String> = tokens.iter().filter(|t| !t.is_empty()).collect();
    let all_numeric = !non_empty.is_empty() && non_empty.iter().all(|t| parse_number(t).is_some());

    if all_numeric {
        if let Some(row) = tokens.iter().position(|t| t.is_empty()) {
            return Err(ClassifyError::FormatError(format!(
                "numeric column '{}' has a missing value at row {}",
                name,
                row + 2
            )));
        }
        let values = tokens.iter().filter_map(|t| parse_number(t)).collect();
        return Ok(Column::Numeric(values));
    }

    Ok(Column::Categorical(
        tokens
            .into_iter()
            .map(|t| if t.is_empty() { UNKNOWN_CATEGORY.to_string() } else { t })
            .collect(),
    ))
}

fn encode_labels(name: &str, tokens: &[String], positive: &str) -> Result<(LabelSet, Array1<f64>)> {
    let distinct: BTreeSet<&str> = tokens.iter().map(|s| s.as_str()).collect();
    if distinct.len() != 2 {
        return Err(ClassifyError::FormatError(format!(
            "label column '{}' must be binary, found {} distinct value(s): [{}]",
            name,
            distinct.len(),
            distinct.iter().cloned().collect::<Vec<_>>().join(", ")
        )));
    }

    let positive_token = distinct
        .iter()
        .find(|t| t.eq_ignore_ascii_case(positive))
        .ok_or_else(|| {
            ClassifyError::FormatError(format!(
                "label column '{}' does not contain the positive label '{}'",
                name, positive
            ))
        })?
        .to_string();
    let negative_token = distinct
        .iter()
        .find(|t| **t != positive_token)
        .map(|t| t.to_string())
        .unwrap_or_default();

    let labels = tokens
        .iter()
        .map(|t| if *t == positive_token { 1.0 } else { 0.0 })
        .collect();
    Ok((LabelSet { negative: negative_token, positive: positive_token }, labels))
}
