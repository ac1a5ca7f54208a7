use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::core::{PredictorError, PredictorResult};
use crate::ml::model::{Coefficients, LinearRegression};
use crate::ml::schema::{FeatureSchema, DEFAULT_FEATURES};

const DEFAULT_MODEL_CLASS: &str = "LinearRegression";
const MODEL_KEYS: [&str; 3] = ["model", "pipeline", "estimator"];

/// A loaded model file: the weights plus the feature order they apply to.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    pub model_class: String,
    pub coefficients: Coefficients,
}

impl ModelBundle {
    /// Load a model file.
    ///
    /// Accepts the flat weights layout (`features`/`coef`/`intercept`), the same
    /// weights wrapped under `model`, `pipeline` or `estimator`, and as a last
    /// resort the first object value that carries `coef` and `intercept`. A
    /// `features` list in the file is respected; otherwise the default order
    /// is assumed.
    pub fn load(path: &Path) -> PredictorResult<Self> {
        if !path.exists() {
            return Err(PredictorError::ModelNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|e| PredictorError::ModelFormatError(format!("{}: {}", path.display(), e)))?;

        let bundle = Self::from_value(&value)?;
        info!(
            path = %path.display(),
            model_class = %bundle.model_class,
            n_features = bundle.coefficients.coef.len(),
            "Model loaded"
        );
        Ok(bundle)
    }

    pub fn from_value(value: &Value) -> PredictorResult<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| PredictorError::ModelFormatError("expected a JSON object".to_string()))?;

        let estimator = find_estimator(root).ok_or_else(|| {
            PredictorError::ModelFormatError("no estimator with 'coef' and 'intercept' found".to_string())
        })?;

        let coef = parse_coef(&estimator["coef"])?;
        let intercept = parse_intercept(&estimator["intercept"])?;

        let features = match root.get("features").or_else(|| estimator.get("features")) {
            Some(list) => parse_features(list)?,
            None => {
                debug!("No feature list in model file, using default order");
                DEFAULT_FEATURES.iter().map(|name| name.to_string()).collect()
            }
        };

        let model_class = root
            .get("model_class")
            .or_else(|| estimator.get("model_class"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MODEL_CLASS)
            .to_string();

        let bundle = Self {
            model_class,
            coefficients: Coefficients {
                features,
                coef,
                intercept,
            },
        };
        bundle.validate()?;
        Ok(bundle)
    }

    fn validate(&self) -> PredictorResult<()> {
        let Coefficients { features, coef, intercept } = &self.coefficients;

        if coef.is_empty() {
            return Err(PredictorError::ModelFormatError("'coef' is empty".to_string()));
        }
        if coef.len() != features.len() {
            return Err(PredictorError::ModelFormatError(format!(
                "{} coefficients for {} features",
                coef.len(),
                features.len()
            )));
        }
        if !intercept.is_finite() || coef.iter().any(|w| !w.is_finite()) {
            return Err(PredictorError::ModelFormatError("weights must be finite".to_string()));
        }
        // Rejects duplicate names.
        FeatureSchema::for_features(features.as_slice())?;
        Ok(())
    }

    pub fn schema(&self) -> PredictorResult<FeatureSchema> {
        FeatureSchema::for_features(self.coefficients.features.as_slice())
    }

    pub fn estimator(&self) -> LinearRegression {
        LinearRegression::new(self.model_class.clone(), &self.coefficients)
    }

    /// Write the canonical weights file (`features`, `coef`, `intercept`).
    pub fn export(&self, path: &Path) -> PredictorResult<()> {
        let contents = serde_json::to_string_pretty(&self.coefficients)?;
        fs::write(path, contents)?;
        info!(path = %path.display(), "Weights exported");
        Ok(())
    }
}

fn has_weights(fields: &Map<String, Value>) -> bool {
    fields.contains_key("coef") && fields.contains_key("intercept")
}

fn find_estimator(root: &Map<String, Value>) -> Option<&Map<String, Value>> {
    if has_weights(root) {
        return Some(root);
    }

    MODEL_KEYS
        .iter()
        .filter_map(|key| root.get(*key))
        .chain(root.values())
        .filter_map(Value::as_object)
        .find(|fields| has_weights(fields))
}

fn parse_coef(value: &Value) -> PredictorResult<Vec<f64>> {
    let outer = value
        .as_array()
        .ok_or_else(|| PredictorError::ModelFormatError("'coef' must be an array".to_string()))?;

    // A single-output estimator may store coef as a one-row matrix.
    let flat = match outer.as_slice() {
        [Value::Array(row)] => row,
        _ => outer,
    };

    flat.iter()
        .map(|w| {
            w.as_f64()
                .ok_or_else(|| PredictorError::ModelFormatError(format!("non-numeric coefficient {}", w)))
        })
        .collect()
}

fn parse_intercept(value: &Value) -> PredictorResult<f64> {
    let scalar = match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };
    scalar
        .as_f64()
        .ok_or_else(|| PredictorError::ModelFormatError(format!("'intercept' must be a number, got {}", value)))
}

fn parse_features(value: &Value) -> PredictorResult<Vec<String>> {
    value
        .as_array()
        .ok_or_else(|| PredictorError::ModelFormatError("'features' must be an array".to_string()))?
        .iter()
        .map(|name| {
            name.as_str()
                .map(str::to_string)
                .ok_or_else(|| PredictorError::ModelFormatError(format!("feature name {} is not a string", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn eleven_weights() -> Vec<f64> {
        (1..=11).map(|i| i as f64 / 10.0).collect()
    }

    #[test]
    fn test_flat_weights_file() {
        let value = json!({
            "features": ["Humedad", "Ocupacion"],
            "coef": [0.5, 1.5],
            "intercept": -2.0
        });
        let bundle = ModelBundle::from_value(&value).unwrap();
        assert_eq!(bundle.model_class, "LinearRegression");
        assert_eq!(
            bundle.coefficients,
            Coefficients {
                features: vec!["Humedad".into(), "Ocupacion".into()],
                coef: vec![0.5, 1.5],
                intercept: -2.0,
            }
        );
    }

    #[test]
    fn test_default_feature_order_when_absent() {
        let value = json!({ "coef": eleven_weights(), "intercept": 3.0 });
        let bundle = ModelBundle::from_value(&value).unwrap();
        assert_eq!(bundle.coefficients.features, DEFAULT_FEATURES.to_vec());
    }

    #[test]
    fn test_wrapped_estimator() {
        let value = json!({
            "pipeline": { "coef": [[2.0, 4.0]], "intercept": [1.0], "model_class": "Ridge" },
            "features": ["Humedad", "Ocupacion"]
        });
        let bundle = ModelBundle::from_value(&value).unwrap();
        assert_eq!(bundle.model_class, "Ridge");
        assert_eq!(bundle.coefficients.coef, vec![2.0, 4.0]);
        assert_eq!(bundle.coefficients.intercept, 1.0);
    }

    #[test]
    fn test_estimator_under_other_key() {
        let value = json!({
            "version": 2,
            "regresion": { "coef": eleven_weights(), "intercept": 0.0 }
        });
        let bundle = ModelBundle::from_value(&value).unwrap();
        assert_eq!(bundle.coefficients.coef.len(), 11);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let value = json!({ "coef": [1.0, 2.0], "intercept": 0.0 });
        let err = ModelBundle::from_value(&value).unwrap_err();
        assert_eq!(err.to_string(), "Invalid model file: 2 coefficients for 11 features");
    }

    #[test]
    fn test_no_estimator_rejected() {
        let err = ModelBundle::from_value(&json!({ "features": ["a"] })).unwrap_err();
        assert!(matches!(err, PredictorError::ModelFormatError(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ModelBundle::load(Path::new("/nonexistent/weights.json")).unwrap_err();
        assert!(matches!(err, PredictorError::ModelNotFound(_)));
    }

    #[test]
    fn test_load_and_export() {
        let mut source = NamedTempFile::new().unwrap();
        write!(
            source,
            "{}",
            json!({ "model": { "coef": eleven_weights(), "intercept": [5.5] } })
        )
        .unwrap();

        let bundle = ModelBundle::load(source.path()).unwrap();
        let target = NamedTempFile::new().unwrap();
        bundle.export(target.path()).unwrap();

        let exported: Value = serde_json::from_str(&fs::read_to_string(target.path()).unwrap()).unwrap();
        assert_eq!(exported["intercept"], json!(5.5));
        assert_eq!(exported["features"][0], json!("Temperatura_Interior"));

        let reloaded = ModelBundle::load(target.path()).unwrap();
        assert_eq!(reloaded.coefficients, bundle.coefficients);
    }
}
