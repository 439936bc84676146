//! Metrics export to the console or a JSON file.

use super::metrics::MetricsSnapshot;
use crate::error::{Error, Result};
use crate::util::format_bytes;
use std::path::PathBuf;

pub trait MetricsExporter: Send + Sync {
    fn export(&self, snapshot: &MetricsSnapshot) -> Result<()>;
}

/// Writes snapshots as pretty-printed JSON.
#[derive(Debug)]
pub struct JsonExporter {
    output_path: PathBuf,
}

impl JsonExporter {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }
}

impl MetricsExporter for JsonExporter {
    fn export(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let io_error = |source: std::io::Error| Error::Io {
            path: self.output_path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(&SerializableSnapshot::from(snapshot))
            .map_err(|e| io_error(e.into()))?;
        std::fs::write(&self.output_path, json).map_err(io_error)?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct SerializableSnapshot {
    uptime_secs: f64,
    kernel_launches: u64,
    transfers: u64,
    bytes_to_device: u64,
    bytes_from_device: u64,
    flushes: u64,
    avg_wait_us: f64,
    p50_wait_us: f64,
    p99_wait_us: f64,
    max_wait_us: f64,
    transfer_rate_mb_s: f64,
}

impl From<&MetricsSnapshot> for SerializableSnapshot {
    fn from(snapshot: &MetricsSnapshot) -> Self {
        Self {
            uptime_secs: snapshot.uptime.as_secs_f64(),
            kernel_launches: snapshot.kernel_launches,
            transfers: snapshot.transfers,
            bytes_to_device: snapshot.bytes_to_device,
            bytes_from_device: snapshot.bytes_from_device,
            flushes: snapshot.flushes,
            avg_wait_us: snapshot.avg_wait_ns as f64 / 1_000.0,
            p50_wait_us: snapshot.p50_wait_ns as f64 / 1_000.0,
            p99_wait_us: snapshot.p99_wait_ns as f64 / 1_000.0,
            max_wait_us: snapshot.max_wait_ns as f64 / 1_000.0,
            transfer_rate_mb_s: snapshot.transfer_rate() / (1024.0 * 1024.0),
        }
    }
}

/// Prints snapshots to stdout.
#[derive(Debug)]
pub struct ConsoleExporter {
    verbose: bool,
}

impl ConsoleExporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl MetricsExporter for ConsoleExporter {
    fn export(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        println!("=== Queue Metrics ===");
        println!("Uptime: {:.2}s", snapshot.uptime.as_secs_f64());
        println!("Kernel launches: {}", snapshot.kernel_launches);
        println!("Transfers: {}", snapshot.transfers);
        println!("To device: {}", format_bytes(snapshot.bytes_to_device));
        println!("From device: {}", format_bytes(snapshot.bytes_from_device));
        println!("Flushes: {}", snapshot.flushes);

        if self.verbose {
            println!("\nBlocking waits:");
            println!("  Average: {:.2}μs", snapshot.avg_wait_ns as f64 / 1_000.0);
            println!("  P50: {:.2}μs", snapshot.p50_wait_ns as f64 / 1_000.0);
            println!("  P99: {:.2}μs", snapshot.p99_wait_ns as f64 / 1_000.0);
            println!("  Max: {:.2}μs", snapshot.max_wait_ns as f64 / 1_000.0);
        }

        println!("=====================");
        Ok(())
    }
}

impl Default for ConsoleExporter {
    fn default() -> Self {
        Self::new(false)
    }
}
