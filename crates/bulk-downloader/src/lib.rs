//! Bulk Downloader Library
//!
//! Downloads lists of files from data archives guarded by a cookie-based
//! identity provider (NASA Earthdata Login in front of the ASF datapool by
//! default). A session is validated or minted once, then every file is
//! fetched in order with redirect-driven re-authentication, checked for
//! completeness by byte count, and summarised at the end.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bulk_downloader::{
//!     BulkDownloader, ConsoleProgressReporter, Credentials, DownloadConfig,
//!     IntoProgressCallback, StaticCredentials, UrlColumn, sources,
//! };
//!
//! # async fn example() -> bulk_downloader::Result<()> {
//! let resolution = sources::resolve(&["granules.metalink"], &UrlColumn::Detect).await;
//! resolution.ensure_downloads()?;
//!
//! let config = DownloadConfig::default().with_output_dir("downloads");
//! let downloader = BulkDownloader::new(config)
//!     .with_progress(ConsoleProgressReporter::new().into_callback());
//!
//! let mut credentials = StaticCredentials::new(Credentials::new("user", "password"));
//! let summary = downloader.run(&resolution.list.urls, &mut credentials).await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Persistent sessions**: Netscape cookie store reused across runs
//! - **Re-authentication**: one transparent re-login per file when bounced to the identity provider
//! - **Idempotent reruns**: complete local files are skipped after a HEAD probe
//! - **Atomic writes**: files only appear under their final name once fully written
//! - **Source lists**: metalink and comma-separated inputs

pub mod auth;
pub mod downloader;
pub mod sources;

// Re-export commonly used types for convenience
pub use auth::{CookieJar, CredentialProvider, Credentials, Session, StaticCredentials};
pub use downloader::{
    BulkDownloader, ConsoleProgressReporter, DownloadConfig, DownloadEngine, DownloadError, DownloadTask,
    FailureReason, IdentityProviderConfig, IntoProgressCallback, NullProgressReporter, ProgressCallback,
    ProgressEvent, ProgressReporter, Result, Summary, TaskOutcome,
};
pub use sources::{SourceList, SourceWarning, UrlColumn};
