pub mod server;

pub use server::{ApiServer, ApiServerConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::ml::PredictionService;

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub tracker: Arc<Mutex<RequestTracker>>,
    pub static_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(service: PredictionService, static_dir: PathBuf) -> Self {
        Self {
            service: Arc::new(service),
            tracker: Arc::new(Mutex::new(RequestTracker::new())),
            static_dir: Arc::new(static_dir),
        }
    }

    pub async fn record(&self, endpoint: &str, success: bool, response_time: Duration) {
        let mut tracker = self.tracker.lock().await;
        tracker.record_request(endpoint, success, response_time);
    }
}

/// Request counters for one endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Mean over successful requests
    pub avg_response_ms: f64,
    pub peak_response_ms: f64,
}

/// Snapshot returned by the stats endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub endpoints: BTreeMap<String, EndpointMetrics>,
}

/// In-memory request tracker
#[derive(Debug, Default)]
pub struct RequestTracker {
    stats: RequestStats,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one handled request
    pub fn record_request(&mut self, endpoint: &str, success: bool, response_time: Duration) {
        let metrics = self.stats.endpoints.entry(endpoint.to_string()).or_default();
        let elapsed_ms = response_time.as_secs_f64() * 1000.0;

        metrics.total_requests += 1;

        if success {
            metrics.successful_requests += 1;

            metrics.avg_response_ms = (metrics.avg_response_ms * (metrics.successful_requests - 1) as f64
                + elapsed_ms)
                / metrics.successful_requests as f64;

            if elapsed_ms > metrics.peak_response_ms {
                metrics.peak_response_ms = elapsed_ms;
            }
        } else {
            metrics.failed_requests += 1;
        }

        self.stats.total_requests += 1;
        if success {
            self.stats.successful_requests += 1;
        }
    }

    pub fn snapshot(&self) -> RequestStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tracking() {
        let mut tracker = RequestTracker::new();

        tracker.record_request("/predecir", true, Duration::from_millis(10));
        tracker.record_request("/predecir", true, Duration::from_millis(30));
        tracker.record_request("/predecir", false, Duration::from_millis(500));
        tracker.record_request("/health", true, Duration::from_millis(1));

        let stats = tracker.snapshot();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.successful_requests, 3);

        let predict = &stats.endpoints["/predecir"];
        assert_eq!(predict.total_requests, 3);
        assert_eq!(predict.failed_requests, 1);
        assert!((predict.avg_response_ms - 20.0).abs() < 1e-6);
        assert!((predict.peak_response_ms - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_snapshot() {
        let stats = RequestTracker::new().snapshot();
        assert_eq!(stats, RequestStats::default());
    }
}
