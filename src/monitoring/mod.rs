mod telemetry;

pub use telemetry::{init_telemetry, log_error, LogLevel, PerformanceTracker, TelemetryConfig};

/// Convenience macro for performance tracking
#[macro_export]
macro_rules! track_performance {
    ($name:expr) => {
        let _tracker = $crate::monitoring::PerformanceTracker::new($name);
    };
}

/// Convenience macro for logging errors
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        $crate::monitoring::log_error($error, $context);
    };
}
