//! Queue telemetry.
//!
//! Counts submissions and bytes moved per command queue and records how long
//! the host blocks waiting for the device.

#[cfg(feature = "telemetry")]
pub mod metrics;

#[cfg(feature = "telemetry")]
pub mod export;

#[cfg(feature = "telemetry")]
pub use metrics::{MetricsSnapshot, QueueMetrics};

#[cfg(feature = "telemetry")]
pub use export::{ConsoleExporter, JsonExporter, MetricsExporter};

// Stub implementations when telemetry is disabled
#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use std::time::Duration;

    #[derive(Debug, Default)]
    pub struct QueueMetrics;

    impl QueueMetrics {
        pub fn new() -> Self {
            Self
        }
        pub fn record_launch(&self) {}
        pub fn record_upload(&self, _: usize) {}
        pub fn record_download(&self, _: usize) {}
        pub fn record_flush(&self) {}
        pub fn record_wait(&self, _: Duration) {}
        pub fn snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
        pub fn reset(&self) {}
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct MetricsSnapshot {
        pub uptime: Duration,
        pub kernel_launches: u64,
        pub transfers: u64,
        pub bytes_to_device: u64,
        pub bytes_from_device: u64,
        pub flushes: u64,
        pub avg_wait_ns: u64,
        pub p50_wait_ns: u64,
        pub p99_wait_ns: u64,
        pub max_wait_ns: u64,
    }

    impl MetricsSnapshot {
        pub fn transfer_rate(&self) -> f64 {
            0.0
        }
    }
}

#[cfg(not(feature = "telemetry"))]
pub use metrics::{MetricsSnapshot, QueueMetrics};
