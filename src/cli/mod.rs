use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::{ApiServer, ApiServerConfig, AppState};
use crate::config::Settings;
use crate::ml::{ModelBundle, PredictionService, PredictionStrategy};
use crate::track_performance;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./gorogrid.toml when present)
    #[arg(short, long, global = true, env = "GOROGRID_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that loads the model
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ModelArgs {
    /// Model weights file
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Prediction strategy (estimator, dot_product)
    #[arg(short, long)]
    pub strategy: Option<PredictionStrategy>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the prediction API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Predict one record, or a JSON array of records, from a file or stdin (-)
    Predict {
        /// Input JSON file, `-` for stdin
        input: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Normalise a model file into the canonical weights layout
    Export {
        /// Model file in any supported layout
        #[arg(short, long)]
        input: PathBuf,
        /// Destination weights file
        #[arg(short, long, default_value = "weights.json")]
        output: PathBuf,
    },
    /// Show the feature order and constraints of the loaded model
    Features {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

impl ModelArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.model {
            settings.model.path = path.clone();
        }
        if let Some(strategy) = self.strategy {
            settings.model.strategy = strategy;
        }
    }
}

/// Load the model described by `settings` and build the prediction service.
pub fn build_service(settings: &Settings) -> Result<PredictionService> {
    let bundle = ModelBundle::load(&settings.model.path)
        .with_context(|| format!("Error loading model {}", settings.model.path.display()))?;
    let service = PredictionService::new(
        bundle,
        settings.model.strategy,
        settings.model.reject_unknown_fields,
    )?;
    Ok(service)
}

pub async fn run(cli: Cli, mut settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port, model } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            model.apply(&mut settings);
            settings.validate()?;

            let service = build_service(&settings)?;
            info!(
                model = %settings.model.path.display(),
                strategy = %settings.model.strategy,
                "Prediction service ready"
            );

            let state = AppState::new(service, settings.static_dir.clone());
            let server = ApiServer::new(ApiServerConfig::from(&settings.server), state);
            server.start().await
        }
        Commands::Predict { input, model } => {
            track_performance!("cli_predict");
            model.apply(&mut settings);
            let service = build_service(&settings)?;

            let payload = read_input(&input)?;
            let output = predict_payload(&service, &payload)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Commands::Export { input, output } => {
            let bundle = ModelBundle::load(&input)
                .with_context(|| format!("Error loading model {}", input.display()))?;
            bundle.export(&output)?;
            println!("Weights exported to {}", output.display());
            Ok(())
        }
        Commands::Features { model } => {
            model.apply(&mut settings);
            let service = build_service(&settings)?;
            println!("{}", serde_json::to_string_pretty(service.schema().specs())?);
            Ok(())
        }
        Commands::ShowConfig => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

fn read_input(input: &Path) -> Result<Value> {
    let contents = if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?
    };
    serde_json::from_str(&contents).context("Input is not valid JSON")
}

/// A single record yields one response object, an array yields a list.
pub fn predict_payload(service: &PredictionService, payload: &Value) -> Result<Value> {
    match payload {
        Value::Array(records) => {
            let values = service.predict_batch(records)?;
            Ok(values
                .into_iter()
                .map(|value| json!({ "consumo_estimado": value }))
                .collect())
        }
        record => {
            let value = service.predict_record(record)?;
            Ok(json!({ "consumo_estimado": value }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn service() -> PredictionService {
        let bundle = ModelBundle::from_value(&json!({
            "features": ["Ocupacion"],
            "coef": [3.0],
            "intercept": 0.5
        }))
        .unwrap();
        PredictionService::new(bundle, PredictionStrategy::DotProduct, false).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "gorogrid", "serve", "--port", "9000", "--model", "modelo_params.json", "--strategy", "dot-product",
        ])
        .unwrap();

        match cli.command {
            Commands::Serve { host, port, model } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(9000));
                assert_eq!(model.model, Some(PathBuf::from("modelo_params.json")));
                assert_eq!(model.strategy, Some(PredictionStrategy::DotProduct));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_model_args_override_settings() {
        let mut settings = Settings::default();
        let args = ModelArgs {
            model: Some(PathBuf::from("other.json")),
            strategy: None,
        };
        args.apply(&mut settings);
        assert_eq!(settings.model.path, PathBuf::from("other.json"));
        assert_eq!(settings.model.strategy, PredictionStrategy::Estimator);
    }

    #[test]
    fn test_predict_single_and_batch() {
        let service = service();

        let single = predict_payload(&service, &json!({ "Ocupacion": 2 })).unwrap();
        assert_eq!(single, json!({ "consumo_estimado": 6.5 }));

        let batch = predict_payload(&service, &json!([{ "Ocupacion": 1 }, { "Ocupacion": 0 }])).unwrap();
        assert_eq!(
            batch,
            json!([{ "consumo_estimado": 3.5 }, { "consumo_estimado": 0.5 }])
        );
    }

    #[test]
    fn test_predict_batch_reports_invalid_record() {
        let service = service();
        let err = predict_payload(&service, &json!([{ "Ocupacion": 1 }, {}])).unwrap_err();
        assert!(err.to_string().contains("Ocupacion: Field required"));
    }
}
