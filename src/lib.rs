//! GoroGrid energy consumption prediction service.
//!
//! Loads the exported weights of a linear regression once at startup and
//! serves predictions over HTTP. See [`ml::FeatureSchema`] for how input
//! records are validated and ordered.

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod ml;
pub mod monitoring;
