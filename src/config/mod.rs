use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{PredictorError, PredictorResult};
use crate::ml::PredictionStrategy;
use crate::monitoring::LogLevel;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "gorogrid.toml";

/// Prefix of environment overrides, e.g. `GOROGRID_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "GOROGRID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub static_dir: PathBuf,
    pub log_level: LogLevel,
    pub server: ServerSettings,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: u64,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub strategy: PredictionStrategy,
    pub reject_unknown_fields: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_bytes: 16 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("weights.json"),
            strategy: PredictionStrategy::default(),
            reject_unknown_fields: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static"),
            log_level: LogLevel::default(),
            server: ServerSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `gorogrid.toml` (or `path`, which must then exist), then
    /// `GOROGRID_*` variables.
    pub fn load(path: Option<&Path>) -> PredictorResult<Self> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> PredictorResult<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).format(FileFormat::Toml).required(false),
        };

        let defaults = Config::try_from(&Settings::default()).map_err(config_error)?;

        let settings: Settings = Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(env)
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PredictorResult<()> {
        if self.server.port == 0 {
            return Err(PredictorError::ConfigError("server.port must be non-zero".to_string()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(PredictorError::ConfigError(
                "server.max_body_bytes must be non-zero".to_string(),
            ));
        }
        if self.server.cors_allowed_origins.is_empty() {
            return Err(PredictorError::ConfigError(
                "server.cors_allowed_origins must list at least one origin (or \"*\")".to_string(),
            ));
        }
        if let Some(origin) = self
            .server
            .cors_allowed_origins
            .iter()
            .find(|origin| *origin != "*" && !origin.starts_with("http://") && !origin.starts_with("https://"))
        {
            return Err(PredictorError::ConfigError(format!(
                "invalid CORS origin '{}' (expected scheme://host[:port] or \"*\")",
                origin
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> PredictorResult<String> {
        toml::to_string_pretty(self).map_err(|e| PredictorError::ConfigError(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> PredictorResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

/// `GOROGRID_SERVER__PORT=9000`, `GOROGRID_SERVER__CORS_ALLOWED_ORIGINS=https://a.io,https://b.io`
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("server.cors_allowed_origins")
}

fn config_error(err: config::ConfigError) -> PredictorError {
    PredictorError::ConfigError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[server]
port = 9100

[model]
path = "models/modelo_params.json"
strategy = "dot_product"
"#
        )
        .unwrap();

        let settings = Settings::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.model.path, PathBuf::from("models/modelo_params.json"));
        assert_eq!(settings.model.strategy, PredictionStrategy::DotProduct);
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert!(!settings.model.reject_unknown_fields);
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let mut map = config::Map::new();
        for (key, value) in vars {
            map.insert(key.to_string(), value.to_string());
        }
        environment().source(Some(map))
    }

    #[test]
    fn test_env_overrides_scalars() {
        let settings = Settings::load_with_env(
            None,
            env(&[
                ("GOROGRID_SERVER__PORT", "9000"),
                ("GOROGRID_MODEL__STRATEGY", "dot_product"),
                ("GOROGRID_MODEL__REJECT_UNKNOWN_FIELDS", "true"),
                ("GOROGRID_LOG_LEVEL", "warn"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.model.strategy, PredictionStrategy::DotProduct);
        assert!(settings.model.reject_unknown_fields);
        assert_eq!(settings.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_env_overrides_origin_list() {
        let single = Settings::load_with_env(
            None,
            env(&[("GOROGRID_SERVER__CORS_ALLOWED_ORIGINS", "https://a.io")]),
        )
        .unwrap();
        assert_eq!(single.server.cors_allowed_origins, vec!["https://a.io".to_string()]);

        let several = Settings::load_with_env(
            None,
            env(&[("GOROGRID_SERVER__CORS_ALLOWED_ORIGINS", "https://a.io,https://b.io")]),
        )
        .unwrap();
        assert_eq!(
            several.server.cors_allowed_origins,
            vec!["https://a.io".to_string(), "https://b.io".to_string()]
        );
    }

    #[test]
    fn test_strategy_alias_from_env() {
        let settings =
            Settings::load_with_env(None, env(&[("GOROGRID_MODEL__STRATEGY", "manual")])).unwrap();
        assert_eq!(settings.model.strategy, PredictionStrategy::DotProduct);
    }

    #[test]
    fn test_env_beats_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9100").unwrap();

        let settings =
            Settings::load_with_env(Some(file.path()), env(&[("GOROGRID_SERVER__PORT", "9200")])).unwrap();
        assert_eq!(settings.server.port, 9200);
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let err = Settings::load(Some(Path::new("/nonexistent/gorogrid.toml"))).unwrap_err();
        assert!(matches!(err, PredictorError::ConfigError(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gorogrid.toml");

        let mut settings = Settings::default();
        settings.server.cors_allowed_origins = vec!["https://app.gorogrid.io".to_string()];
        settings.model.reject_unknown_fields = true;
        settings.save(&path).unwrap();

        let reloaded = Settings::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_bad_cors_origin_rejected() {
        let mut settings = Settings::default();
        settings.server.cors_allowed_origins = vec!["app.gorogrid.io".to_string()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }
}
