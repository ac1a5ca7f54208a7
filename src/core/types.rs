use serde::{Deserialize, Serialize};

use crate::ml::PredictionStrategy;

/// Body returned by the prediction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub consumo_estimado: f64,
}

/// Service health and loaded model metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_class: String,
    pub features_order: Vec<String>,
    pub n_features_model: usize,
    pub strategy: PredictionStrategy,
}
