//! Rendering of recorded command timings.

use crate::driver::ProfilingInfo;
use std::fmt;

/// Timestamps of one profiled command, device clock nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "telemetry", derive(serde::Serialize))]
pub struct ProfileEntry {
    pub label: String,
    pub queued: u64,
    pub submit: u64,
    pub start: u64,
    pub end: u64,
}

impl ProfileEntry {
    pub(crate) fn new(label: impl Into<String>, info: ProfilingInfo) -> Self {
        Self {
            label: label.into(),
            queued: info.queued,
            submit: info.submit,
            start: info.start,
            end: info.end,
        }
    }

    /// Execution time on the device.
    pub fn duration_ns(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Every profiled command of one queue, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "telemetry", derive(serde::Serialize))]
pub struct ProfileReport {
    entries: Vec<ProfileEntry>,
}

impl ProfileReport {
    pub(crate) fn new(entries: Vec<ProfileEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ProfileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest start among the entries; the origin of the rendered deltas.
    pub fn origin(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.start).min()
    }

    /// Sum of device execution times.
    pub fn total_device_ns(&self) -> u64 {
        self.entries.iter().map(ProfileEntry::duration_ns).sum()
    }

    #[cfg(feature = "telemetry")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn delta_us(at: u64, origin: u64) -> f64 {
    (at as f64 - origin as f64) / 1_000.0
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(origin) = self.origin() else {
            return writeln!(f, "No profiled events");
        };

        writeln!(f, "Profile of {} event(s), times in us from first start:", self.entries.len())?;
        let width = self.entries.iter().map(|e| e.label.len()).max().unwrap_or(0);
        for entry in &self.entries {
            writeln!(
                f,
                "  {:<width$}  queued {:>10.3}  submit {:>10.3}  start {:>10.3}  end {:>10.3}  ({:.3})",
                entry.label,
                delta_us(entry.queued, origin),
                delta_us(entry.submit, origin),
                delta_us(entry.start, origin),
                delta_us(entry.end, origin),
                entry.duration_ns() as f64 / 1_000.0,
                width = width,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(queued: u64, submit: u64, start: u64, end: u64) -> ProfilingInfo {
        ProfilingInfo {
            queued,
            submit,
            start,
            end,
        }
    }

    #[test]
    fn test_empty_report() {
        let report = ProfileReport::default();
        assert!(report.is_empty());
        assert_eq!(report.origin(), None);
        assert_eq!(report.to_string(), "No profiled events\n");
    }

    #[test]
    fn test_deltas_from_first_start() {
        let report = ProfileReport::new(vec![
            ProfileEntry::new("add_numbers", info(1_000, 1_500, 2_000, 6_000)),
            ProfileEntry::new("BufferRead", info(1_200, 6_100, 6_500, 7_000)),
        ]);

        assert_eq!(report.origin(), Some(2_000));
        assert_eq!(report.total_device_ns(), 4_500);

        let text = report.to_string();
        assert!(text.starts_with("Profile of 2 event(s)"));
        assert!(text.contains("add_numbers"));
        assert!(text.contains("-1.000"));
        assert!(text.contains("5.000"));
        assert_eq!(text.lines().count(), 3);
    }

    #[cfg(feature = "telemetry")]
    #[test]
    fn test_json() {
        let report = ProfileReport::new(vec![ProfileEntry::new("k", info(0, 1, 2, 3))]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["entries"][0]["label"], "k");
        assert_eq!(value["entries"][0]["end"], 3);
    }
}
