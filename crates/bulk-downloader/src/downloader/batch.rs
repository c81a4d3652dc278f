//! Bulk download orchestration
//!
//! One session is established up front, then every URL runs through the
//! engine strictly in list order while the aggregator records outcomes.

use std::time::Instant;
use tracing::{Instrument, error, info, info_span};

use crate::auth::{CredentialProvider, Session};
use crate::downloader::config::DownloadConfig;
use crate::downloader::core::summary::MIN_ELAPSED;
use crate::downloader::core::{
    DownloadError, DownloadTask, FailureReason, ProgressCallback, Result, Summary, SummaryAggregator, TaskOutcome,
};
use crate::downloader::engine::DownloadEngine;

/// Downloads a list of URLs with one authenticated session
pub struct BulkDownloader {
    config: DownloadConfig,
    progress: Option<ProgressCallback>,
}

impl BulkDownloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config, progress: None }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Check the output directory, establish a session and download every URL
    pub async fn run(&self, urls: &[String], credentials: &mut dyn CredentialProvider) -> Result<Summary> {
        self.config.validate()?;

        let session = Session::load(&self.config).await?;
        session.establish(credentials).await?;
        info!("Session established, downloading {} files", urls.len());

        self.download_all(&session, urls).await
    }

    /// Download every URL with an already established session
    pub async fn download_all(&self, session: &Session, urls: &[String]) -> Result<Summary> {
        let mut engine = DownloadEngine::new(session);
        if let Some(progress) = &self.progress {
            engine = engine.with_progress(progress.clone());
        }

        let mut aggregator = SummaryAggregator::new();
        let total = urls.len();

        for (index, url) in urls.iter().enumerate() {
            let mut task = DownloadTask::new(url.as_str(), &self.config.output_dir);
            let started = Instant::now();

            engine
                .run(&mut task, index + 1, total)
                .instrument(info_span!("download", url = %url))
                .await?;
            let elapsed = started.elapsed();

            // Looping on the very first file means the session can never work.
            if index == 0
                && aggregator.success_count() == 0
                && task.outcome == (TaskOutcome::Failed { reason: FailureReason::AuthenticationLoop })
            {
                error!("Endless authentication loop on the first download, giving up");
                return Err(DownloadError::AuthenticationLoop { url: url.clone() });
            }

            if let Some(rate) = aggregator.record(&task, elapsed) {
                if let TaskOutcome::Success { bytes } = task.outcome {
                    info!(
                        "Downloaded {} bytes in {:.2} secs, Average Rate: {:.2} MB/sec",
                        bytes,
                        elapsed.max(MIN_ELAPSED).as_secs_f64(),
                        rate
                    );
                }
            }
        }

        Ok(aggregator.summary())
    }
}
