use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{PredictorError, PredictorResult};

/// How a feature vector is turned into a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStrategy {
    /// Build a one-row matrix and call the estimator's `predict`.
    #[default]
    Estimator,
    /// Dot product straight against the exported coefficients.
    #[serde(alias = "dot-product", alias = "dot", alias = "manual")]
    DotProduct,
}

impl fmt::Display for PredictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionStrategy::Estimator => f.write_str("estimator"),
            PredictionStrategy::DotProduct => f.write_str("dot_product"),
        }
    }
}

impl FromStr for PredictionStrategy {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "estimator" => Ok(PredictionStrategy::Estimator),
            "dot_product" | "dot" | "manual" => Ok(PredictionStrategy::DotProduct),
            other => Err(PredictorError::ConfigError(format!(
                "unknown prediction strategy '{}' (expected 'estimator' or 'dot_product')",
                other
            ))),
        }
    }
}

/// Exported weights of a fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub features: Vec<String>,
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl Coefficients {
    /// `Σ row[i] * coef[i] + intercept`
    pub fn apply(&self, row: &[f64]) -> PredictorResult<f64> {
        if row.len() != self.coef.len() {
            return Err(PredictorError::PredictionError(format!(
                "expected {} features, got {}",
                self.coef.len(),
                row.len()
            )));
        }

        let value = row
            .iter()
            .zip(&self.coef)
            .fold(self.intercept, |acc, (x, w)| acc + x * w);

        finite(value)
    }
}

/// A fitted model that predicts one value per row of a feature matrix.
pub trait Regressor: Send + Sync + fmt::Debug {
    /// Name of the estimator type, reported by the health endpoint.
    fn model_class(&self) -> &str;

    /// Number of features the model was fit with.
    fn n_features(&self) -> usize;

    fn predict(&self, x: ArrayView2<'_, f64>) -> PredictorResult<Array1<f64>>;
}

/// Ordinary least squares model rebuilt from exported coefficients.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    class: String,
    coef: Array1<f64>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new(class: impl Into<String>, coefficients: &Coefficients) -> Self {
        Self {
            class: class.into(),
            coef: Array1::from(coefficients.coef.clone()),
            intercept: coefficients.intercept,
        }
    }
}

impl Regressor for LinearRegression {
    fn model_class(&self) -> &str {
        &self.class
    }

    fn n_features(&self) -> usize {
        self.coef.len()
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> PredictorResult<Array1<f64>> {
        if x.ncols() != self.coef.len() {
            return Err(PredictorError::PredictionError(format!(
                "X has {} features, but {} is expecting {} features as input",
                x.ncols(),
                self.class,
                self.coef.len()
            )));
        }
        Ok(x.dot(&self.coef) + self.intercept)
    }
}

/// Predict a single row through a [`Regressor`].
pub fn predict_one(model: &dyn Regressor, row: &[f64]) -> PredictorResult<f64> {
    let x = Array2::from_shape_vec((1, row.len()), row.to_vec())
        .map_err(|e| PredictorError::PredictionError(e.to_string()))?;
    let y = model.predict(x.view())?;
    let value = y
        .iter()
        .next()
        .copied()
        .ok_or_else(|| PredictorError::PredictionError("model returned no prediction".to_string()))?;
    finite(value)
}

fn finite(value: f64) -> PredictorResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PredictorError::PredictionError(format!("non-finite prediction {}", value)))
    }
}
