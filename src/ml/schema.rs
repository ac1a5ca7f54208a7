//! Feature schema of the energy model.
//!
//! Maps a loosely typed JSON record onto the exact, ordered feature vector the
//! regression was fit with. Values are coerced leniently (numbers, numeric
//! strings, booleans) and every rejected field is reported, not just the first.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::core::{FieldError, FieldErrorKind, PredictorError, PredictorResult};

/// Feature order used when the model was fit.
pub const DEFAULT_FEATURES: [&str; 11] = [
    "Temperatura_Interior",
    "Temperatura_Exterior",
    "Humedad",
    "Nivel_Iluminacion",
    "Ocupacion",
    "Consumo_Energetico_HVAC",
    "Consumo_Energetico_Iluminacion",
    "Uso_Electrodomesticos",
    "Presencia_Movimiento",
    "Hora_Del_Dia",
    "Dia_De_Semana",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Float,
    Integer,
}

/// Type and bounds of one input feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unit: Option<&'static str>,
}

impl FeatureSpec {
    fn real(name: &str, unit: Option<&'static str>) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Float,
            min: None,
            max: None,
            unit,
        }
    }

    fn integer(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: FeatureKind::Integer,
            min: Some(min),
            max: Some(max),
            unit: None,
        }
    }

    /// Constraints for a feature name. Names outside the default schema are
    /// unconstrained reals.
    pub fn for_name(name: &str) -> Self {
        match name {
            "Temperatura_Interior" | "Temperatura_Exterior" => Self::real(name, Some("°C")),
            "Humedad" => Self::real(name, Some("%")),
            "Nivel_Iluminacion" => Self::real(name, Some("lux")),
            "Ocupacion" => Self::real(name, Some("people")),
            "Presencia_Movimiento" => Self::integer(name, 0.0, 1.0),
            "Hora_Del_Dia" => Self::integer(name, 0.0, 23.0),
            "Dia_De_Semana" => Self::integer(name, 1.0, 7.0),
            _ => Self::real(name, None),
        }
    }

    /// Coerce a raw JSON value into this feature's numeric value.
    pub fn coerce(&self, value: &Value) -> Result<f64, FieldError> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        };

        let number = match (self.kind, number) {
            (FeatureKind::Float, Some(v)) => v,
            (FeatureKind::Float, None) => {
                return Err(self.error(FieldErrorKind::FloatParsing, "Input should be a valid number".to_string()));
            }
            (FeatureKind::Integer, Some(v)) if v.fract() == 0.0 => v,
            (FeatureKind::Integer, Some(_)) => {
                return Err(self.error(
                    FieldErrorKind::IntFromFloat,
                    "Input should be a valid integer, got a number with a fractional part".to_string(),
                ));
            }
            (FeatureKind::Integer, None) => {
                return Err(self.error(FieldErrorKind::IntParsing, "Input should be a valid integer".to_string()));
            }
        };

        if let Some(min) = self.min {
            if number < min {
                return Err(self.error(
                    FieldErrorKind::GreaterThanEqual,
                    format!("Input should be greater than or equal to {}", min),
                ));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                return Err(self.error(
                    FieldErrorKind::LessThanEqual,
                    format!("Input should be less than or equal to {}", max),
                ));
            }
        }

        Ok(number)
    }

    fn error(&self, kind: FieldErrorKind, message: String) -> FieldError {
        FieldError::new(self.name.clone(), kind, message)
    }
}

/// Ordered set of features a model consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    specs: Vec<FeatureSpec>,
    reject_unknown_fields: bool,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            specs: DEFAULT_FEATURES.iter().map(|name| FeatureSpec::for_name(name)).collect(),
            reject_unknown_fields: false,
        }
    }
}

impl FeatureSchema {
    /// Build a schema for an arbitrary ordered list of feature names.
    pub fn for_features<S: AsRef<str>>(names: &[S]) -> PredictorResult<Self> {
        if names.is_empty() {
            return Err(PredictorError::ModelFormatError("feature list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(PredictorError::ModelFormatError(format!("duplicate feature '{}'", name)));
            }
            specs.push(FeatureSpec::for_name(name));
        }

        Ok(Self {
            specs,
            reject_unknown_fields: false,
        })
    }

    /// Report fields outside the schema instead of ignoring them.
    pub fn with_unknown_fields_rejected(mut self, reject: bool) -> Self {
        self.reject_unknown_fields = reject;
        self
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|spec| spec.name.clone()).collect()
    }

    /// Produce the feature vector for `record`, in schema order.
    pub fn order(&self, record: &Value) -> PredictorResult<Vec<f64>> {
        let fields = record.as_object().ok_or_else(|| {
            PredictorError::InputError(format!("expected a JSON object, got {}", json_type(record)))
        })?;

        let mut row = Vec::with_capacity(self.specs.len());
        let mut errors = Vec::new();

        for spec in &self.specs {
            match fields.get(&spec.name) {
                Some(value) => match spec.coerce(value) {
                    Ok(v) => row.push(v),
                    Err(err) => errors.push(err),
                },
                None => errors.push(FieldError::new(
                    spec.name.clone(),
                    FieldErrorKind::Missing,
                    "Field required",
                )),
            }
        }

        if self.reject_unknown_fields {
            errors.extend(self.unknown_fields(fields));
        }

        if errors.is_empty() {
            Ok(row)
        } else {
            Err(PredictorError::ValidationError(errors))
        }
    }

    fn unknown_fields(&self, fields: &Map<String, Value>) -> Vec<FieldError> {
        fields
            .keys()
            .filter(|key| !self.specs.iter().any(|spec| &spec.name == *key))
            .map(|key| FieldError::new(key.clone(), FieldErrorKind::ExtraForbidden, "Extra inputs are not permitted"))
            .collect()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
