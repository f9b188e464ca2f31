//! Categorical encoding
//!
//! Turns a [`Dataset`] into a numeric matrix in one of two layouts:
//! ordinal codes (one column per feature) for the statistical and tree
//! models, or full one-hot indicators for the neural network.
//!
//! Category order is lexicographic, so codes do not depend on row order.

use crate::error::{ClassifyError, Result};
use crate::utils::{Column, ColumnKind, Dataset, UNKNOWN_CATEGORY};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Encoding a model requires for its input matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// One column per feature; categories mapped to `0..k-1`
    OrdinalCodes,
    /// `k` indicator columns per categorical feature, no baseline dropped
    OneHot,
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::OrdinalCodes => write!(f, "ordinal-codes"),
            Encoding::OneHot => write!(f, "one-hot"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeatureSpec {
    name: String,
    kind: ColumnKind,
    categories: Vec<String>,
    index: HashMap<String, usize>,
}

impl FeatureSpec {
    fn code(&self, token: &str) -> Option<usize> {
        self.index
            .get(token)
            .or_else(|| self.index.get(UNKNOWN_CATEGORY))
            .copied()
    }
}

/// Encoded feature matrix with its aligned label vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedMatrix {
    /// One row per observation, in dataset row order
    pub x: Array2<f64>,
    /// Labels, 0.0 = negative, 1.0 = positive
    pub y: Array1<f64>,
    /// Name of every encoded column
    pub columns: Vec<String>,
    /// Original feature index of every encoded column
    pub source_feature: Vec<usize>,
    /// Number of original features
    pub n_features: usize,
    pub encoding: Encoding,
}

impl EncodedMatrix {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.x.ncols()
    }

    /// Encoded columns that originate from `feature`
    pub fn columns_of(&self, feature: usize) -> Vec<usize> {
        self.source_feature
            .iter()
            .enumerate()
            .filter(|(_, &f)| f == feature)
            .map(|(i, _)| i)
            .collect()
    }

    /// Rows in the given order
    pub fn select_rows(&self, rows: &[usize]) -> EncodedMatrix {
        EncodedMatrix {
            x: self.x.select(Axis(0), rows),
            y: rows.iter().map(|&i| self.y[i]).collect(),
            columns: self.columns.clone(),
            source_feature: self.source_feature.clone(),
            n_features: self.n_features,
            encoding: self.encoding,
        }
    }

    /// Keep the encoded columns of the included original features
    pub fn select_features(&self, included: &[bool]) -> Result<EncodedMatrix> {
        if included.len() != self.n_features {
            return Err(ClassifyError::InvalidArgument(format!(
                "feature subset has {} entries, matrix has {} features",
                included.len(),
                self.n_features
            )));
        }
        if !included.iter().any(|&b| b) {
            return Err(ClassifyError::InvalidArgument(
                "feature subset is empty".to_string(),
            ));
        }
        let keep: Vec<usize> = self
            .source_feature
            .iter()
            .enumerate()
            .filter(|(_, &f)| included[f])
            .map(|(i, _)| i)
            .collect();

        Ok(EncodedMatrix {
            x: self.x.select(Axis(1), &keep),
            y: self.y.clone(),
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            source_feature: keep.iter().map(|&i| self.source_feature[i]).collect(),
            n_features: self.n_features,
            encoding: self.encoding,
        })
    }
}

/// Encoder fitted on a dataset's categorical vocabularies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEncoder {
    specs: Vec<FeatureSpec>,
}

impl FeatureEncoder {
    /// Record the sorted categories of every categorical column
    pub fn fit(dataset: &Dataset) -> Self {
        let specs = dataset
            .features()
            .iter()
            .map(|feature| {
                let categories: Vec<String> = match &feature.column {
                    Column::Numeric(_) => Vec::new(),
                    Column::Categorical(values) => values
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                };
                let index = categories
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.clone(), i))
                    .collect();
                FeatureSpec {
                    name: feature.name.clone(),
                    kind: feature.column.kind(),
                    categories,
                    index,
                }
            })
            .collect();
        Self { specs }
    }

    /// Fit and transform in one step
    pub fn fit_transform(dataset: &Dataset, encoding: Encoding) -> Result<(Self, EncodedMatrix)> {
        let encoder = Self::fit(dataset);
        let encoded = encoder.transform(dataset, encoding)?;
        Ok((encoder, encoded))
    }

    pub fn n_features(&self) -> usize {
        self.specs.len()
    }

    /// Sorted categories of a categorical feature
    pub fn categories(&self, feature: usize) -> Option<&[String]> {
        self.specs
            .get(feature)
            .filter(|s| s.kind == ColumnKind::Categorical)
            .map(|s| s.categories.as_slice())
    }

    /// Ordinal code of a token (unseen tokens fall back to `unknown` when present)
    pub fn code_of(&self, feature: usize, token: &str) -> Option<usize> {
        self.specs.get(feature).and_then(|s| s.code(token))
    }

    /// Number of matrix columns the given encoding produces
    pub fn n_encoded_columns(&self, encoding: Encoding) -> usize {
        self.specs
            .iter()
            .map(|s| match (s.kind, encoding) {
                (ColumnKind::Categorical, Encoding::OneHot) => s.categories.len(),
                _ => 1,
            })
            .sum()
    }

    /// Encode a dataset with the same column layout as the fitted one
    pub fn transform(&self, dataset: &Dataset, encoding: Encoding) -> Result<EncodedMatrix> {
        if dataset.n_features() != self.specs.len() {
            return Err(ClassifyError::InvalidArgument(format!(
                "encoder fitted on {} features, dataset has {}",
                self.specs.len(),
                dataset.n_features()
            )));
        }

        let n_rows = dataset.n_rows();
        let n_cols = self.n_encoded_columns(encoding);
        let mut x = Array2::zeros((n_rows, n_cols));
        let mut columns = Vec::with_capacity(n_cols);
        let mut source_feature = Vec::with_capacity(n_cols);

        let mut col = 0;
        for (f_idx, (spec, feature)) in self.specs.iter().zip(dataset.features()).enumerate() {
            if spec.name != feature.name || spec.kind != feature.column.kind() {
                return Err(ClassifyError::InvalidArgument(format!(
                    "feature {} is '{}' ({}), encoder expects '{}' ({})",
                    f_idx,
                    feature.name,
                    feature.column.kind(),
                    spec.name,
                    spec.kind
                )));
            }

            match (&feature.column, encoding) {
                (Column::Numeric(values), _) => {
                    for (row, &v) in values.iter().enumerate() {
                        x[[row, col]] = v;
                    }
                    columns.push(spec.name.clone());
                    source_feature.push(f_idx);
                    col += 1;
                }
                (Column::Categorical(values), Encoding::OrdinalCodes) => {
                    for (row, token) in values.iter().enumerate() {
                        x[[row, col]] = self.lookup(spec, token)? as f64;
                    }
                    columns.push(spec.name.clone());
                    source_feature.push(f_idx);
                    col += 1;
                }
                (Column::Categorical(values), Encoding::OneHot) => {
                    for (row, token) in values.iter().enumerate() {
                        let code = self.lookup(spec, token)?;
                        x[[row, col + code]] = 1.0;
                    }
                    for category in &spec.categories {
                        columns.push(format!("{}={}", spec.name, category));
                        source_feature.push(f_idx);
                    }
                    col += spec.categories.len();
                }
            }
        }

        Ok(EncodedMatrix {
            x,
            y: dataset.labels().clone(),
            columns,
            source_feature,
            n_features: self.specs.len(),
            encoding,
        })
    }

    fn lookup(&self, spec: &FeatureSpec, token: &str) -> Result<usize> {
        spec.code(token).ok_or_else(|| {
            ClassifyError::InvalidArgument(format!(
                "category '{}' of feature '{}' was not seen when the encoder was fitted",
                token, spec.name
            ))
        })
    }

    /// Recover a category from its ordinal code
    pub fn decode_ordinal(&self, feature: usize, code: f64) -> Result<&str> {
        let categories = self.categorical_spec(feature)?;
        let idx = code.round();
        if idx < 0.0 || idx as usize >= categories.len() {
            return Err(ClassifyError::InvalidArgument(format!(
                "code {} out of range for {} categories",
                code,
                categories.len()
            )));
        }
        Ok(&categories[idx as usize])
    }

    /// Recover a category from its indicator block by argmax
    pub fn decode_one_hot(&self, feature: usize, indicators: ArrayView1<f64>) -> Result<&str> {
        let categories = self.categorical_spec(feature)?;
        if indicators.len() != categories.len() {
            return Err(ClassifyError::ShapeError {
                expected: format!("{} indicator columns", categories.len()),
                actual: format!("{}", indicators.len()),
            });
        }
        let best = indicators
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        Ok(&categories[best])
    }

    fn categorical_spec(&self, feature: usize) -> Result<&[String]> {
        self.categories(feature).ok_or_else(|| {
            ClassifyError::InvalidArgument(format!("feature {} is not categorical", feature))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{Feature, LabelSet};
    use ndarray::array;

    fn sample_dataset() -> Dataset {
        Dataset::new(
            vec![
                Feature::numeric("age", vec![30.0, 41.0, 25.0, 58.0]),
                Feature::categorical("job", vec!["services", "admin.", "unknown", "services"]),
                Feature::categorical("loan", vec!["no", "yes", "no", "no"]),
            ],
            "y",
            LabelSet::default(),
            array![0.0, 1.0, 0.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_ordinal_codes_are_lexicographic() {
        let ds = sample_dataset();
        let (encoder, enc) = FeatureEncoder::fit_transform(&ds, Encoding::OrdinalCodes).unwrap();

        assert_eq!(enc.n_cols(), 3);
        assert_eq!(encoder.categories(1).unwrap(), &["admin.", "services", "unknown"]);
        assert_eq!(enc.x.column(1).to_vec(), vec![1.0, 0.0, 2.0, 1.0]);
        assert_eq!(enc.x.column(0).to_vec(), vec![30.0, 41.0, 25.0, 58.0]);
        assert_eq!(enc.y.to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(encoder.decode_ordinal(1, 2.0).unwrap(), "unknown");
    }

    #[test]
    fn test_one_hot_full_indicator() {
        let ds = sample_dataset();
        let (encoder, enc) = FeatureEncoder::fit_transform(&ds, Encoding::OneHot).unwrap();

        // age + 3 job categories + 2 loan categories
        assert_eq!(enc.n_cols(), 6);
        assert_eq!(enc.columns[1], "job=admin.");
        assert_eq!(enc.columns_of(1), vec![1, 2, 3]);
        for row in enc.x.rows() {
            assert_eq!(row.slice(ndarray::s![1..4]).sum(), 1.0);
            assert_eq!(row.slice(ndarray::s![4..6]).sum(), 1.0);
        }
        assert_eq!(encoder.n_encoded_columns(Encoding::OneHot), 6);
    }

    #[test]
    fn test_one_hot_round_trip_recovers_every_category() {
        let ds = sample_dataset();
        let (encoder, enc) = FeatureEncoder::fit_transform(&ds, Encoding::OneHot).unwrap();

        for (f_idx, feature) in ds.features().iter().enumerate() {
            if let Column::Categorical(values) = &feature.column {
                let cols = enc.columns_of(f_idx);
                for (row, original) in values.iter().enumerate() {
                    let block = enc.x.row(row).select(Axis(0), &cols);
                    let decoded = encoder.decode_one_hot(f_idx, block.view()).unwrap();
                    assert_eq!(decoded, original);
                }
            }
        }
    }

    #[test]
    fn test_unseen_category_maps_to_unknown() {
        let ds = sample_dataset();
        let encoder = FeatureEncoder::fit(&ds);
        assert_eq!(encoder.code_of(1, "entrepreneur"), encoder.code_of(1, "unknown"));
        // loan has no "unknown" category
        assert_eq!(encoder.code_of(2, "maybe"), None);
    }

    #[test]
    fn test_select_features() {
        let ds = sample_dataset();
        let (_, enc) = FeatureEncoder::fit_transform(&ds, Encoding::OneHot).unwrap();

        let sub = enc.select_features(&[false, true, false]).unwrap();
        assert_eq!(sub.n_cols(), 3);
        assert_eq!(sub.source_feature, vec![1, 1, 1]);

        assert!(enc.select_features(&[false, false, false]).is_err());
        assert!(enc.select_features(&[true]).is_err());
    }
}
