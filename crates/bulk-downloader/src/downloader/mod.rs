//! Downloader module
//!
//! Core types, configuration, the per-file engine and the batch loop.

pub mod batch;
pub mod config;
pub mod core;
pub mod engine;

// Re-export main types for convenience
pub use batch::BulkDownloader;
pub use config::{DownloadConfig, IdentityProviderConfig};
pub use self::core::{
    ConsoleProgressReporter, DownloadError, DownloadTask, ErrorSeverity, FailureReason, FileOperation,
    IntoProgressCallback, NullProgressReporter, ProgressCallback, ProgressEvent, ProgressReporter, Result, Summary,
    SummaryAggregator, TaskOutcome,
};
pub use engine::DownloadEngine;
