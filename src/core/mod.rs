pub mod error;
pub mod types;

pub use error::{FieldError, FieldErrorKind, PredictorError, PredictorResult};
pub use types::{HealthReport, PredictionResponse};
