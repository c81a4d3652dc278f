//! Core types used throughout the downloader system
//!
//! This module contains the fundamental types that all other modules depend on.
//! By organizing these in a core module, we make the dependency relationships clear.

pub mod error;
pub mod files;
pub mod http;
pub mod progress;
pub mod summary;

// Re-export main types for convenience
pub use error::{DownloadError, ErrorSeverity, FailureReason, FileOperation, Result};
pub use progress::{
    ConsoleProgressReporter, IntoProgressCallback, NullProgressReporter, ProgressCallback, ProgressEvent,
    ProgressReporter,
};
pub use summary::{Summary, SummaryAggregator};

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Relative byte-count window used in place of checksums
pub const DEFAULT_SIZE_TOLERANCE: f64 = 0.01;

/// Fallback name when a URL has no usable final path segment
const FALLBACK_FILENAME: &str = "downloaded_file";

/// Whether `declared` lies within `tolerance` of `actual`
///
/// Holds when `actual*(1-t) < declared < actual*(1+t)` and the same window
/// measured from `declared` also contains `actual`, which keeps the relation
/// symmetric at the window edges. Exact equality is always accepted so empty
/// files compare equal.
pub fn within_tolerance(declared: u64, actual: u64, tolerance: f64) -> bool {
    if declared == actual {
        return true;
    }
    let smaller = declared.min(actual) as f64;
    let difference = declared.abs_diff(actual) as f64;
    difference < smaller * tolerance
}

/// Local file name for a URL: its final path segment, without query or fragment
pub fn filename_from_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let name = without_query.rsplit('/').next().unwrap_or(without_query);

    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        name.to_string()
    }
}

/// Terminal state of a download task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Pending,
    Skipped,
    Success { bytes: u64 },
    Failed { reason: FailureReason },
}

/// One URL to fetch and where it lands on disk
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub local_path: PathBuf,
    /// Size declared by the preflight probe, when one was made
    pub remote_expected_size: Option<u64>,
    pub outcome: TaskOutcome,
}

impl DownloadTask {
    /// Create a pending task saving into `output_dir`
    pub fn new<S: Into<String>>(url: S, output_dir: &Path) -> Self {
        let url = url.into();
        let local_path = output_dir.join(filename_from_url(&url));
        Self {
            url,
            local_path,
            remote_expected_size: None,
            outcome: TaskOutcome::Pending,
        }
    }

    pub(crate) fn finish(&mut self, outcome: TaskOutcome) {
        self.outcome = outcome;
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) {
        self.outcome = TaskOutcome::Failed { reason };
    }
}

/// Per-task redirect bookkeeping, bounding re-authentication to one attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectContext {
    pub reauthenticated: bool,
}

/// Byte counts from one completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferResult {
    pub bytes_written: u64,
    /// Content-Length the server declared, if any
    pub declared_size: Option<u64>,
}

impl TransferResult {
    /// Judge completeness by byte count
    pub fn verify(&self, tolerance: f64) -> TaskOutcome {
        let declared = self.declared_size.unwrap_or(self.bytes_written);
        if within_tolerance(declared, self.bytes_written, tolerance) {
            TaskOutcome::Success { bytes: self.bytes_written }
        } else {
            TaskOutcome::Failed {
                reason: FailureReason::SizeMismatch {
                    declared,
                    written: self.bytes_written,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_accepts_equal_values() {
        for size in [0u64, 1, 100, 8192, 5_000_000_000] {
            assert!(within_tolerance(size, size, DEFAULT_SIZE_TOLERANCE));
        }
    }

    #[test]
    fn test_tolerance_rejects_large_divergence() {
        assert!(!within_tolerance(100, 90, DEFAULT_SIZE_TOLERANCE));
        assert!(!within_tolerance(90, 100, DEFAULT_SIZE_TOLERANCE));
        assert!(!within_tolerance(0, 1000, DEFAULT_SIZE_TOLERANCE));
    }

    #[test]
    fn test_tolerance_is_symmetric() {
        let pairs = [(1000u64, 1005u64), (1000, 1010), (1000, 1011), (99, 100), (100_000, 99_200)];
        for (a, b) in pairs {
            assert_eq!(
                within_tolerance(a, b, DEFAULT_SIZE_TOLERANCE),
                within_tolerance(b, a, DEFAULT_SIZE_TOLERANCE),
                "asymmetric for ({a}, {b})"
            );
        }
        assert!(within_tolerance(1000, 1005, DEFAULT_SIZE_TOLERANCE));
        assert!(!within_tolerance(1000, 1010, DEFAULT_SIZE_TOLERANCE));
        assert!(!within_tolerance(1000, 1011, DEFAULT_SIZE_TOLERANCE));
    }

    #[test]
    fn test_filename_ignores_query_and_fragment() {
        assert_eq!(
            filename_from_url("https://datapool.asf.alaska.edu/SLC/SA/S1A_IW_SLC.zip?token=abc"),
            "S1A_IW_SLC.zip"
        );
        assert_eq!(filename_from_url("https://example.com/a/b/c.tif#part"), "c.tif");
        assert_eq!(filename_from_url("https://example.com/"), FALLBACK_FILENAME);
    }

    #[test]
    fn test_task_local_path_in_output_dir() {
        let task = DownloadTask::new("https://example.com/data/granule.zip?x=1", Path::new("/tmp/out"));
        assert_eq!(task.local_path, PathBuf::from("/tmp/out/granule.zip"));
        assert_eq!(task.outcome, TaskOutcome::Pending);
    }

    #[test]
    fn test_transfer_verification() {
        let exact = TransferResult { bytes_written: 100, declared_size: Some(100) };
        assert_eq!(exact.verify(DEFAULT_SIZE_TOLERANCE), TaskOutcome::Success { bytes: 100 });

        let undeclared = TransferResult { bytes_written: 4096, declared_size: None };
        assert_eq!(undeclared.verify(DEFAULT_SIZE_TOLERANCE), TaskOutcome::Success { bytes: 4096 });

        let short = TransferResult { bytes_written: 90, declared_size: Some(100) };
        assert_eq!(
            short.verify(DEFAULT_SIZE_TOLERANCE),
            TaskOutcome::Failed {
                reason: FailureReason::SizeMismatch { declared: 100, written: 90 }
            }
        );
    }
}
