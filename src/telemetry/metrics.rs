//! Per-queue submission metrics.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one command queue.
#[derive(Debug)]
pub struct QueueMetrics {
    kernel_launches: AtomicU64,
    transfers: AtomicU64,
    bytes_to_device: AtomicU64,
    bytes_from_device: AtomicU64,
    flushes: AtomicU64,

    // Host time spent blocked in reads and flushes, 1ns..1h.
    wait_latency: RwLock<Option<Histogram<u64>>>,

    start_time: Instant,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            kernel_launches: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            bytes_to_device: AtomicU64::new(0),
            bytes_from_device: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            wait_latency: RwLock::new(Histogram::new_with_max(3_600_000_000_000, 3).ok()),
            start_time: Instant::now(),
        }
    }

    pub fn record_launch(&self) {
        self.kernel_launches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, bytes: usize) {
        self.transfers.fetch_add(1, Ordering::Relaxed);
        self.bytes_to_device.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: usize) {
        self.transfers.fetch_add(1, Ordering::Relaxed);
        self.bytes_from_device.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one blocking wait on the queue.
    pub fn record_wait(&self, waited: Duration) {
        if let Some(mut guard) = self.wait_latency.try_write() {
            if let Some(hist) = guard.as_mut() {
                let _ = hist.record(waited.as_nanos() as u64);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.wait_latency.read();
        let (avg, p50, p99, max) = match guard.as_ref() {
            Some(h) if h.len() > 0 => (
                h.mean() as u64,
                h.value_at_quantile(0.50),
                h.value_at_quantile(0.99),
                h.max(),
            ),
            _ => (0, 0, 0, 0),
        };

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            kernel_launches: self.kernel_launches.load(Ordering::Relaxed),
            transfers: self.transfers.load(Ordering::Relaxed),
            bytes_to_device: self.bytes_to_device.load(Ordering::Relaxed),
            bytes_from_device: self.bytes_from_device.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            avg_wait_ns: avg,
            p50_wait_ns: p50,
            p99_wait_ns: p99,
            max_wait_ns: max,
        }
    }

    pub fn reset(&self) {
        self.kernel_launches.store(0, Ordering::Relaxed);
        self.transfers.store(0, Ordering::Relaxed);
        self.bytes_to_device.store(0, Ordering::Relaxed);
        self.bytes_from_device.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);

        if let Some(hist) = self.wait_latency.write().as_mut() {
            hist.reset();
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics of one queue at a point in time.
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
    /// Bytes moved in either direction per second of queue lifetime.
    pub fn transfer_rate(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        (self.bytes_to_device + self.bytes_from_device) as f64 / seconds
    }
}
