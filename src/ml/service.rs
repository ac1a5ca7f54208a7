use serde_json::Value;
use tracing::debug;

use crate::core::{HealthReport, PredictorResult};
use crate::ml::bundle::ModelBundle;
use crate::ml::model::{predict_one, Coefficients, PredictionStrategy, Regressor};
use crate::ml::schema::FeatureSchema;
use crate::track_performance;

/// Turns input records into energy consumption estimates.
#[derive(Debug)]
pub struct PredictionService {
    schema: FeatureSchema,
    coefficients: Coefficients,
    estimator: Box<dyn Regressor>,
    strategy: PredictionStrategy,
}

impl PredictionService {
    pub fn new(
        bundle: ModelBundle,
        strategy: PredictionStrategy,
        reject_unknown_fields: bool,
    ) -> PredictorResult<Self> {
        let schema = bundle.schema()?.with_unknown_fields_rejected(reject_unknown_fields);
        let estimator = Box::new(bundle.estimator());

        Ok(Self {
            schema,
            coefficients: bundle.coefficients,
            estimator,
            strategy,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn strategy(&self) -> PredictionStrategy {
        self.strategy
    }

    /// Validate and order `record`, then apply the model.
    pub fn predict_record(&self, record: &Value) -> PredictorResult<f64> {
        track_performance!("predict_record");

        let row = self.schema.order(record)?;
        let value = match self.strategy {
            PredictionStrategy::Estimator => predict_one(self.estimator.as_ref(), &row)?,
            PredictionStrategy::DotProduct => self.coefficients.apply(&row)?,
        };

        debug!(strategy = %self.strategy, prediction = value, "Record scored");
        Ok(value)
    }

    /// Score several records, stopping at the first invalid one.
    pub fn predict_batch(&self, records: &[Value]) -> PredictorResult<Vec<f64>> {
        records.iter().map(|record| self.predict_record(record)).collect()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            model_class: self.estimator.model_class().to_string(),
            features_order: self.schema.names(),
            n_features_model: self.estimator.n_features(),
            strategy: self.strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PredictorError;
    use crate::ml::schema::DEFAULT_FEATURES;
    use serde_json::json;

    fn bundle() -> ModelBundle {
        ModelBundle::from_value(&json!({
            "coef": [0.8, -0.1, 0.02, 0.001, 0.5, 1.0, 1.0, 1.0, 0.3, 0.05, -0.2],
            "intercept": 2.5
        }))
        .unwrap()
    }

    fn record() -> Value {
        json!({
            "Dia_De_Semana": 5,
            "Hora_Del_Dia": 20,
            "Presencia_Movimiento": 0,
            "Uso_Electrodomesticos": 1.5,
            "Consumo_Energetico_Iluminacion": 0.5,
            "Consumo_Energetico_HVAC": 2.0,
            "Ocupacion": 2,
            "Nivel_Iluminacion": 100,
            "Humedad": 50,
            "Temperatura_Exterior": 10,
            "Temperatura_Interior": 20
        })
    }

    fn expected() -> f64 {
        2.5 + 0.8 * 20.0 - 0.1 * 10.0 + 0.02 * 50.0 + 0.001 * 100.0 + 0.5 * 2.0
            + 2.0 + 0.5 + 1.5 + 0.3 * 0.0 + 0.05 * 20.0 - 0.2 * 5.0
    }

    #[test]
    fn test_both_strategies_match_hand_computation() {
        for strategy in [PredictionStrategy::Estimator, PredictionStrategy::DotProduct] {
            let service = PredictionService::new(bundle(), strategy, false).unwrap();
            let value = service.predict_record(&record()).unwrap();
            assert!((value - expected()).abs() < 1e-9, "{:?} gave {}", strategy, value);
        }
    }

    #[test]
    fn test_validation_error_propagates() {
        let service = PredictionService::new(bundle(), PredictionStrategy::Estimator, false).unwrap();
        let mut bad = record();
        bad["Hora_Del_Dia"] = json!(99);
        let err = service.predict_record(&bad).unwrap_err();
        assert!(matches!(err, PredictorError::ValidationError(_)));
    }

    #[test]
    fn test_batch() {
        let service = PredictionService::new(bundle(), PredictionStrategy::DotProduct, false).unwrap();
        let values = service.predict_batch(&[record(), record()]).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], values[1]);
    }

    #[test]
    fn test_health_report() {
        let service = PredictionService::new(bundle(), PredictionStrategy::Estimator, false).unwrap();
        let health = service.health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.model_class, "LinearRegression");
        assert_eq!(health.n_features_model, 11);
        assert_eq!(health.features_order, DEFAULT_FEATURES.to_vec());
    }
}
