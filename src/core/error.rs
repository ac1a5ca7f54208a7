use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Invalid model file: {0}")]
    ModelFormatError(String),

    #[error("Invalid input record: {}", FieldErrors(.0))]
    ValidationError(Vec<FieldError>),

    #[error("Error preparing input data: {0}")]
    InputError(String),

    #[error("Prediction failed: {0}")]
    PredictionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl PredictorError {
    /// HTTP status an error surfaces as when it escapes a request handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictorError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictorError::InputError(_) | PredictorError::JsonError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Kind of problem found with a single input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    FloatParsing,
    IntParsing,
    IntFromFloat,
    GreaterThanEqual,
    LessThanEqual,
    ExtraForbidden,
}

/// One rejected field of an input record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

struct FieldErrors<'a>(&'a [FieldError]);

impl fmt::Display for FieldErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

pub type PredictorResult<T> = Result<T, PredictorError>;
