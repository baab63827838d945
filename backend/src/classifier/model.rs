use std::cmp::Ordering;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Table;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model artifact is inconsistent: {0}")]
    Malformed(String),
    #[error("input columns {got:?} do not match model features {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },
}

/// A fitted logistic-regression classifier, loaded once at startup and
/// shared read-only across requests.
///
/// The artifact is JSON: ordered feature names, ordered class labels,
/// one coefficient row per decision score (a single row for the
/// two-class case) and matching intercepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierModel {
    feature_names: Vec<String>,
    classes: Vec<String>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl ClassifierModel {
    pub fn new(
        feature_names: Vec<String>,
        classes: Vec<String>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let model = Self {
            feature_names,
            classes,
            coefficients,
            intercepts,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.classes.len() < 2 {
            return Err(ModelError::Malformed(
                "model must declare at least two classes".to_string(),
            ));
        }
        let expected_rows = if self.classes.len() == 2 {
            1
        } else {
            self.classes.len()
        };
        if self.coefficients.len() != expected_rows {
            return Err(ModelError::Malformed(format!(
                "expected {expected_rows} coefficient rows for {} classes, got {}",
                self.classes.len(),
                self.coefficients.len()
            )));
        }
        if self.intercepts.len() != expected_rows {
            return Err(ModelError::Malformed(format!(
                "expected {expected_rows} intercepts, got {}",
                self.intercepts.len()
            )));
        }
        if let Some(row) = self
            .coefficients
            .iter()
            .find(|row| row.len() != self.feature_names.len())
        {
            return Err(ModelError::Malformed(format!(
                "coefficient row has {} entries but the model declares {} features",
                row.len(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    /// Predict one class label per table row, in row order. The table's
    /// column names and order must match the features the model was
    /// fitted on.
    pub fn predict(&self, table: &Table) -> Result<Vec<String>, ModelError> {
        if table.column_names() != self.feature_names.as_slice() {
            return Err(ModelError::SchemaMismatch {
                expected: self.feature_names.clone(),
                got: table.column_names().to_vec(),
            });
        }

        let n_rows = table.n_rows();
        let n_features = self.feature_names.len();

        let x = Array2::from_shape_vec(
            (n_rows, n_features),
            table.rows().iter().flatten().copied().collect(),
        )
        .map_err(|e| ModelError::Malformed(e.to_string()))?;
        let w = Array2::from_shape_vec(
            (self.coefficients.len(), n_features),
            self.coefficients.iter().flatten().copied().collect(),
        )
        .map_err(|e| ModelError::Malformed(e.to_string()))?;
        let b = Array1::from_vec(self.intercepts.clone());

        let scores = x.dot(&w.t()) + &b;

        let labels = scores
            .outer_iter()
            .map(|row| {
                let idx = if self.classes.len() == 2 {
                    usize::from(row[0] > 0.0)
                } else {
                    row.iter()
                        .enumerate()
                        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
                        .map(|(i, _)| i)
                        .unwrap_or(0)
                };
                self.classes[idx].clone()
            })
            .collect();

        Ok(labels)
    }
}
