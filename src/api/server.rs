use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::api::AppState;
use crate::config::ServerSettings;
use crate::core::{FieldError, PredictionResponse, PredictorError};
use crate::log_error;

const PREDICT_ENDPOINT: &str = "/predecir";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: u64,
    pub cors_allowed_origins: Vec<String>,
}

impl From<&ServerSettings> for ApiServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_body_bytes: settings.max_body_bytes,
            cors_allowed_origins: settings.cors_allowed_origins.clone(),
        }
    }
}

/// Prediction API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .with_context(|| format!("Invalid server address {}:{}", self.config.host, self.config.port))
    }

    /// Serve until Ctrl-C.
    pub async fn start(&self) -> Result<()> {
        let addr = self.address()?;
        let routes = self.routes();

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!(error = %err, "Failed to listen for shutdown signal");
                }
            })
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("Starting GoroGrid API server on {}", bound);
        server.await;
        info!("GoroGrid API server stopped");

        Ok(())
    }

    /// All routes with error recovery, CORS and request tracing applied.
    ///
    /// Errors are recovered before CORS so `{"detail": ...}` responses carry the
    /// CORS headers too; the outer recover answers rejected origins.
    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        self.api_routes()
            .recover(handle_rejection)
            .with(self.cors())
            .recover(handle_rejection)
            .with(warp::trace::request())
    }

    fn api_routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let state = self.state.clone();

        // GET /
        let index = warp::path::end()
            .and(warp::get())
            .and(with_state(state.clone()))
            .and_then(serve_index);

        // GET /static/*
        let static_files = warp::path("static").and(warp::fs::dir(self.state.static_dir.as_ref().clone()));

        // GET /health
        let health = warp::path!("health")
            .and(warp::get())
            .and(with_state(state.clone()))
            .and_then(health_handler);

        // GET /stats
        let stats = warp::path!("stats")
            .and(warp::get())
            .and(with_state(state.clone()))
            .and_then(stats_handler);

        // POST /predecir
        let predict = warp::path!("predecir")
            .and(warp::post())
            .and(warp::body::content_length_limit(self.config.max_body_bytes))
            .and(warp::body::json())
            .and(with_state(state))
            .and_then(predict_handler);

        index.or(static_files).or(health).or(stats).or(predict)
    }

    fn cors(&self) -> warp::cors::Cors {
        let builder = warp::cors()
            .allow_methods(vec!["GET", "POST", "OPTIONS"])
            .allow_headers(vec!["content-type", "authorization"]);

        let origins = &self.config.cors_allowed_origins;
        let builder = if origins.iter().any(|origin| origin == "*") {
            builder.allow_any_origin()
        } else {
            builder.allow_origins(origins.iter().map(String::as_str))
        };

        builder.build()
    }
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn serve_index(state: AppState) -> Result<impl Reply, Rejection> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Ok(warp::reply::html(html)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "UI entry point unavailable");
            Err(warp::reject::custom(ApiRejection::IndexMissing))
        }
    }
}

async fn health_handler(state: AppState) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    let report = state.service.health();
    state.record("/health", true, started.elapsed()).await;
    Ok(warp::reply::json(&report))
}

async fn stats_handler(state: AppState) -> Result<impl Reply, Rejection> {
    let snapshot = state.tracker.lock().await.snapshot();
    Ok(warp::reply::json(&snapshot))
}

async fn predict_handler(payload: Value, state: AppState) -> Result<impl Reply, Rejection> {
    let started = Instant::now();
    let result = state.service.predict_record(&payload);
    state.record(PREDICT_ENDPOINT, result.is_ok(), started.elapsed()).await;

    match result {
        Ok(consumo_estimado) => Ok(warp::reply::json(&PredictionResponse { consumo_estimado })),
        Err(err) => {
            if err.status_code().is_server_error() {
                log_error!(&err, "Prediction request failed");
            }
            Err(warp::reject::custom(ApiRejection::Predictor(err)))
        }
    }
}

/// Custom rejections raised by the handlers
#[derive(Debug)]
enum ApiRejection {
    IndexMissing,
    Predictor(PredictorError),
}

impl warp::reject::Reject for ApiRejection {}

fn field_errors_detail(errors: &[FieldError]) -> Value {
    errors
        .iter()
        .map(|err| {
            json!({
                "loc": ["body", err.field],
                "msg": err.message,
                "type": err.kind,
            })
        })
        .collect()
}

/// Global error handler: every failure is answered with `{"detail": ...}`.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, json!("Not Found"))
    } else if let Some(rejection) = err.find::<ApiRejection>() {
        match rejection {
            ApiRejection::IndexMissing => (StatusCode::NOT_FOUND, json!("Missing static/index.html")),
            ApiRejection::Predictor(PredictorError::ValidationError(errors)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, field_errors_detail(errors))
            }
            ApiRejection::Predictor(err) => (err.status_code(), json!(err.to_string())),
        }
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::UNPROCESSABLE_ENTITY, json!(format!("Invalid JSON body: {}", e)))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, json!("Payload Too Large"))
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, json!("Length Required"))
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, json!("Unsupported Media Type"))
    } else if err.find::<warp::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, json!("Origin not allowed"))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, json!("Method Not Allowed"))
    } else {
        error!(rejection = ?err, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, json!("Internal Server Error"))
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "detail": detail })),
        status,
    ))
}
