// Energy consumption model

pub mod bundle;
pub mod model;
pub mod schema;
pub mod service;

// Expose key types and functions
pub use bundle::ModelBundle;
pub use model::{Coefficients, LinearRegression, PredictionStrategy, Regressor};
pub use schema::{FeatureKind, FeatureSchema, FeatureSpec, DEFAULT_FEATURES};
pub use service::PredictionService;
