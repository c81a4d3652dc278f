//! Outcome accounting and throughput statistics for a bulk run
//!
//! The aggregator is fed one finished task at a time and produces a
//! [`Summary`] that renders as the end-of-run report.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::downloader::core::{DownloadTask, FailureReason, TaskOutcome};

const MIB: f64 = 1024.0 * 1024.0;

/// Shortest elapsed time used for rate calculations
pub const MIN_ELAPSED: Duration = Duration::from_secs(1);

/// Megabytes per second for `bytes` transferred over `elapsed`
///
/// Elapsed time is floored at [`MIN_ELAPSED`] so instantaneous completions
/// do not produce absurd rates.
pub fn transfer_rate(bytes: u64, elapsed: Duration) -> f64 {
    (bytes as f64 / MIB) / elapsed.max(MIN_ELAPSED).as_secs_f64()
}

/// One successful transfer
#[derive(Debug, Clone, Serialize)]
pub struct SuccessRecord {
    pub url: String,
    pub bytes: u64,
    pub elapsed_secs: f64,
    /// MB/s for this file
    pub rate: f64,
}

/// One failed task
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub url: String,
    pub reason: FailureReason,
}

/// Accumulates per-task outcomes for the final report
#[derive(Debug, Default)]
pub struct SummaryAggregator {
    successes: Vec<SuccessRecord>,
    failures: Vec<FailureRecord>,
    skipped: Vec<String>,
    total_bytes: u64,
    total_time: Duration,
}

impl SummaryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task that reached a terminal outcome
    ///
    /// Returns the per-file rate for successful transfers.
    pub fn record(&mut self, task: &DownloadTask, elapsed: Duration) -> Option<f64> {
        match &task.outcome {
            TaskOutcome::Success { bytes } => {
                let elapsed = elapsed.max(MIN_ELAPSED);
                let rate = transfer_rate(*bytes, elapsed);
                self.total_bytes += bytes;
                self.total_time += elapsed;
                self.successes.push(SuccessRecord {
                    url: task.url.clone(),
                    bytes: *bytes,
                    elapsed_secs: elapsed.as_secs_f64(),
                    rate,
                });
                Some(rate)
            }
            TaskOutcome::Failed { reason } => {
                self.failures.push(FailureRecord {
                    url: task.url.clone(),
                    reason: reason.clone(),
                });
                None
            }
            TaskOutcome::Skipped => {
                self.skipped.push(task.url.clone());
                None
            }
            TaskOutcome::Pending => None,
        }
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    /// Produce the report for everything recorded so far
    pub fn summary(&self) -> Summary {
        let average_rate = if self.successes.is_empty() {
            None
        } else {
            Some(transfer_rate(self.total_bytes, self.total_time))
        };

        Summary {
            successes: self.successes.clone(),
            failures: self.failures.clone(),
            skipped: self.skipped.clone(),
            total_bytes: self.total_bytes,
            total_time_secs: self.total_time.as_secs_f64(),
            average_rate,
        }
    }
}

/// Final report of a bulk run
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub successes: Vec<SuccessRecord>,
    pub failures: Vec<FailureRecord>,
    pub skipped: Vec<String>,
    pub total_bytes: u64,
    pub total_time_secs: f64,
    /// MB/s across all successful transfers
    pub average_rate: Option<f64>,
}

impl Summary {
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn skip_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(80);
        writeln!(f, "\n\nDownload Summary ")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "  Successes: {} files, {} bytes ", self.success_count(), self.total_bytes)?;
        for success in &self.successes {
            writeln!(f, "           - {}  {:.2}MB", success.url, success.bytes as f64 / MIB)?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "  Failures: {} files", self.failure_count())?;
            for failure in &self.failures {
                writeln!(f, "          - {}  ({})", failure.url, failure.reason)?;
            }
        }
        if !self.skipped.is_empty() {
            writeln!(f, "  Skipped: {} files", self.skip_count())?;
            for url in &self.skipped {
                writeln!(f, "          - {}", url)?;
            }
        }
        if let Some(rate) = self.average_rate {
            writeln!(f, "  Average Rate: {:.2}MB/sec", rate)?;
        }
        writeln!(f, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn task(url: &str, outcome: TaskOutcome) -> DownloadTask {
        let mut task = DownloadTask::new(url, Path::new("."));
        task.finish(outcome);
        task
    }

    #[test]
    fn test_totals_for_mixed_outcomes() {
        let hundred_mb = 100 * 1024 * 1024;
        let mut aggregator = SummaryAggregator::new();
        aggregator.record(&task("https://example.com/a.zip", TaskOutcome::Success { bytes: hundred_mb }), Duration::from_secs(10));
        aggregator.record(
            &task("https://example.com/b.zip", TaskOutcome::Failed { reason: FailureReason::Forbidden }),
            Duration::from_secs(1),
        );
        aggregator.record(&task("https://example.com/c.zip", TaskOutcome::Skipped), Duration::from_millis(5));

        let summary = aggregator.summary();
        assert_eq!(summary.success_count(), 1);
        assert_eq!(summary.failure_count(), 1);
        assert_eq!(summary.skip_count(), 1);
        assert_eq!(summary.total_bytes, hundred_mb);
        assert_eq!(summary.average_rate, Some(10.0));
    }

    #[test]
    fn test_elapsed_is_floored_at_one_second() {
        assert_eq!(transfer_rate(5 * 1024 * 1024, Duration::from_millis(10)), 5.0);

        let mut aggregator = SummaryAggregator::new();
        let rate = aggregator.record(&task("https://example.com/a.zip", TaskOutcome::Success { bytes: 1024 * 1024 }), Duration::ZERO);
        assert_eq!(rate, Some(1.0));
        assert_eq!(aggregator.summary().total_time_secs, 1.0);
    }

    #[test]
    fn test_no_rate_without_successes() {
        let mut aggregator = SummaryAggregator::new();
        aggregator.record(&task("https://example.com/c.zip", TaskOutcome::Skipped), Duration::from_secs(3));

        let summary = aggregator.summary();
        assert_eq!(summary.average_rate, None);
        assert!(!summary.to_string().contains("Average Rate"));
    }

    #[test]
    fn test_report_lists_every_outcome() {
        let mut aggregator = SummaryAggregator::new();
        aggregator.record(&task("https://example.com/a.zip", TaskOutcome::Success { bytes: 2 * 1024 * 1024 }), Duration::from_secs(2));
        aggregator.record(
            &task("https://example.com/b.zip", TaskOutcome::Failed { reason: FailureReason::Unauthorized }),
            Duration::from_secs(1),
        );
        aggregator.record(&task("https://example.com/c.zip", TaskOutcome::Skipped), Duration::from_secs(1));

        let report = aggregator.summary().to_string();
        assert!(report.contains("Successes: 1 files, 2097152 bytes"));
        assert!(report.contains("https://example.com/a.zip  2.00MB"));
        assert!(report.contains("Failures: 1 files"));
        assert!(report.contains("https://example.com/b.zip  (unauthorized"));
        assert!(report.contains("Skipped: 1 files"));
        assert!(report.contains("Average Rate: 1.00MB/sec"));

        let json = aggregator.summary().to_json().unwrap();
        assert!(json.contains("\"kind\": \"unauthorized\""));
    }
}
