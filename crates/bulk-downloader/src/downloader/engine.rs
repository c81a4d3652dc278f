//! Per-URL download state machine
//!
//! `CHECK_LOCAL -> (SKIP | FETCH) -> redirect handling -> WRITE -> VERIFY`
//!
//! Every per-file problem ends the task in [`TaskOutcome::Failed`] and the
//! caller moves on. [`DownloadEngine::run`] only returns an error for
//! conditions that make every remaining download pointless.

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Response, StatusCode};
use std::io;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::Session;
use crate::downloader::config::{DownloadConfig, IdentityProviderConfig};
use crate::downloader::core::error::{error_chain, is_certificate_error};
use crate::downloader::core::http::declared_size;
use crate::downloader::core::{
    DownloadError, DownloadTask, FailureReason, ProgressCallback, ProgressEvent, RedirectContext, Result, TaskOutcome,
    TransferResult, files, within_tolerance,
};

/// Human readable redirect the server embeds in some 401 pages
static REDIRECT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"id="redir_link"\s+href="(\S+)""#).expect("redirect link pattern is valid"));

/// Extract the approval link from a 401 response body
pub fn find_redirect_link(body: &str) -> Option<String> {
    REDIRECT_LINK
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|link| link.as_str().to_string())
}

/// Append the re-authentication marker unless the URL already carries it
pub fn with_reauth_marker(mut url: Url, identity_provider: &IdentityProviderConfig) -> Url {
    let (key, value) = &identity_provider.reauth_marker;
    if !url.query_pairs().any(|(existing, _)| existing == key.as_str()) {
        url.query_pairs_mut().append_pair(key, value);
    }
    url
}

/// What the local-file check decided
#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalCheck {
    Fetch,
    Skip { local_size: u64 },
    Fail(FailureReason),
}

/// Downloads single tasks with an established session
pub struct DownloadEngine<'a> {
    session: &'a Session,
    progress: Option<ProgressCallback>,
}

impl<'a> DownloadEngine<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session, progress: None }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn config(&self) -> &DownloadConfig {
        self.session.config()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    fn fail(&self, task: &mut DownloadTask, reason: FailureReason) {
        warn!("There was a problem downloading {}: {}", task.url, reason);
        self.emit(ProgressEvent::Failed {
            url: task.url.clone(),
            error: reason.to_string(),
        });
        task.fail(reason);
    }

    /// Drive one task to a terminal outcome
    ///
    /// `position` is the 1-based place of the task in a batch of `total`.
    pub async fn run(&self, task: &mut DownloadTask, position: usize, total: usize) -> Result<()> {
        let requested = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                self.fail(task, FailureReason::InvalidUrl { message: e.to_string() });
                return Ok(());
            }
        };

        match self.check_local(task, &requested).await {
            LocalCheck::Fetch => {}
            LocalCheck::Skip { local_size } => {
                info!("Download file {} exists, skipping download of {}", task.local_path.display(), task.url);
                self.emit(ProgressEvent::Skipped {
                    url: task.url.clone(),
                    local_size,
                });
                task.finish(TaskOutcome::Skipped);
                return Ok(());
            }
            LocalCheck::Fail(reason) => {
                self.fail(task, reason);
                return Ok(());
            }
        }

        let Some(response) = self.fetch(task, &requested).await? else {
            return Ok(());
        };

        // Chunked responses carry no length; fall back to the preflight HEAD
        let declared = declared_size(response.headers()).or(task.remote_expected_size);
        self.emit(ProgressEvent::DownloadStarted {
            url: task.url.clone(),
            index: position,
            total_files: total,
            total_size: declared,
        });

        let transfer = match self.write(task, response, declared).await {
            Ok(transfer) => transfer,
            Err(reason) => {
                self.fail(task, reason);
                return Ok(());
            }
        };

        match transfer.verify(self.config().size_tolerance) {
            TaskOutcome::Success { bytes } => {
                self.emit(ProgressEvent::DownloadComplete {
                    url: task.url.clone(),
                    final_size: bytes,
                });
                task.finish(TaskOutcome::Success { bytes });
            }
            TaskOutcome::Failed { reason } => self.fail(task, reason),
            other => task.finish(other),
        }
        Ok(())
    }

    /// Decide whether an existing local copy can be kept
    async fn check_local(&self, task: &mut DownloadTask, url: &Url) -> LocalCheck {
        let local_size = match files::existing_file_size(&task.local_path).await {
            Ok(Some(size)) => size,
            Ok(None) => return LocalCheck::Fetch,
            Err(e) => return LocalCheck::Fail(FailureReason::local_file(&task.local_path, &e)),
        };

        debug!("Found {} ({} bytes), probing remote size", task.local_path.display(), local_size);
        let response = match self.session.client().head(url.clone()).send().await {
            Ok(response) => response,
            Err(e) if is_certificate_error(&e) => {
                error!("Could not validate SSL certificate for {}. You may be able to overcome this using --insecure", url);
                return LocalCheck::Fail(FailureReason::from_transport(&e));
            }
            Err(e) => {
                warn!("Could not get file HEAD for {}: {}", url, error_chain(&e));
                return LocalCheck::Fetch;
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Your user may not have permission to download {}", url);
            return LocalCheck::Fetch;
        }
        if !status.is_success() {
            warn!("Unknown error, could not get file HEAD for {}: HTTP {}", url, status);
            return LocalCheck::Fetch;
        }
        if self.config().identity_provider.is_authorize_url(response.url()) {
            debug!("HEAD for {} bounced to the identity provider, fetching", url);
            return LocalCheck::Fetch;
        }

        let Some(remote_size) = declared_size(response.headers()) else {
            debug!("No remote size declared for {}, fetching", url);
            return LocalCheck::Fetch;
        };
        task.remote_expected_size = Some(remote_size);

        if within_tolerance(remote_size, local_size, self.config().size_tolerance) {
            return LocalCheck::Skip { local_size };
        }

        info!(
            "Found {} but it wasn't fully downloaded ({} of {} bytes). Removing file and downloading again.",
            task.local_path.display(),
            local_size,
            remote_size
        );
        match files::remove_stale_file(&task.local_path).await {
            Ok(()) => LocalCheck::Fetch,
            Err(e) => LocalCheck::Fail(FailureReason::local_file(&task.local_path, &e)),
        }
    }

    /// Issue the GET, re-authenticating at most once
    ///
    /// Returns `None` once the task has been failed.
    async fn fetch(&self, task: &mut DownloadTask, requested: &Url) -> Result<Option<Response>> {
        let identity_provider = &self.config().identity_provider;
        let mut redirects = RedirectContext::default();

        loop {
            let response = match self.session.client().get(requested.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    if is_certificate_error(&e) {
                        error!("Remote location may not be accepting your SSL configuration");
                    }
                    self.fail(task, FailureReason::from_transport(&e));
                    return Ok(None);
                }
            };

            let status = response.status();
            if !status.is_success() {
                if status == StatusCode::UNAUTHORIZED {
                    let body = response.text().await.unwrap_or_default();
                    if let Some(redirect) = find_redirect_link(&body) {
                        error!("Found approval redirect for {}: {}", task.url, redirect);
                        return Err(DownloadError::EntitlementRedirect {
                            url: task.url.clone(),
                            redirect,
                        });
                    }
                }
                self.fail(task, FailureReason::from_status(status));
                return Ok(None);
            }

            if response.url() == requested {
                return Ok(Some(response));
            }

            if !identity_provider.is_authorize_url(response.url()) {
                info!("'Temporary' redirect download @ remote archive: {}", response.url());
                self.emit(ProgressEvent::Redirected {
                    url: task.url.clone(),
                    target: response.url().to_string(),
                });
                return Ok(Some(response));
            }

            if redirects.reauthenticated {
                warn!("Entering seemingly endless authentication loop for {}, aborting", task.url);
                self.fail(task, FailureReason::AuthenticationLoop);
                return Ok(None);
            }

            let redirect = with_reauth_marker(response.url().clone(), identity_provider);
            drop(response);
            info!("Need to obtain new cookie from {} while downloading {}", redirect, task.url);
            self.emit(ProgressEvent::Reauthenticating {
                url: task.url.clone(),
                redirect: redirect.to_string(),
            });

            if let Err(reason) = self.session.reauthenticate_via(&redirect).await {
                self.fail(task, reason);
                return Ok(None);
            }
            redirects.reauthenticated = true;
            debug!("Attempting download of {} again with new cookies", task.url);
        }
    }

    /// Stream the body into a temporary sibling, then rename it into place
    async fn write(
        &self,
        task: &DownloadTask,
        response: Response,
        declared: Option<u64>,
    ) -> std::result::Result<TransferResult, FailureReason> {
        let local_error = |e: &dyn std::fmt::Display| FailureReason::local_file(&task.local_path, e);

        let temp_path = files::create_temp_path(&task.local_path).map_err(|e| local_error(&e))?;
        let mut file = tokio::fs::File::create(&temp_path).await.map_err(|e| local_error(&e))?;

        let stream = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));
        let mut reader = StreamReader::new(Box::pin(stream));
        let mut buffer = vec![0u8; self.config().chunk_size];
        let mut written: u64 = 0;
        let started = Instant::now();

        loop {
            let read = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => return Err(classify_read_error(e)),
            };
            file.write_all(&buffer[..read]).await.map_err(|e| local_error(&e))?;
            written += read as u64;

            let elapsed = started.elapsed().as_secs_f64();
            self.emit(ProgressEvent::DownloadProgress {
                url: task.url.clone(),
                downloaded: written,
                total: declared,
                speed_bps: if elapsed > 0.0 { written as f64 / elapsed } else { 0.0 },
            });
        }

        file.flush().await.map_err(|e| local_error(&e))?;
        drop(file);

        files::atomic_replace(temp_path, &task.local_path).map_err(|e| local_error(&e))?;
        debug!("Wrote {} bytes to {}", written, task.local_path.display());

        Ok(TransferResult {
            bytes_written: written,
            declared_size: declared,
        })
    }
}

/// Recover the transport error hidden inside a body read failure
fn classify_read_error(error: io::Error) -> FailureReason {
    match error.get_ref().and_then(|inner| inner.downcast_ref::<reqwest::Error>()) {
        Some(transport) => FailureReason::from_transport(transport),
        None => FailureReason::Transport {
            message: error_chain(&error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_link_extraction() {
        let body = r#"<html><body><a id="redir_link"   href="https://urs.earthdata.nasa.gov/approve_app?client_id=abc">here</a></body></html>"#;
        assert_eq!(
            find_redirect_link(body).as_deref(),
            Some("https://urs.earthdata.nasa.gov/approve_app?client_id=abc")
        );
        assert_eq!(find_redirect_link("<html>Unauthorized</html>"), None);
    }

    #[test]
    fn test_reauth_marker_is_added_once() {
        let idp = IdentityProviderConfig::default();
        let bare = Url::parse("https://urs.earthdata.nasa.gov/oauth/authorize?client_id=x").unwrap();
        let marked = with_reauth_marker(bare, &idp);
        assert_eq!(marked.as_str(), "https://urs.earthdata.nasa.gov/oauth/authorize?client_id=x&app_type=401");

        let again = with_reauth_marker(marked.clone(), &idp);
        assert_eq!(again, marked);
    }

    #[test]
    fn test_read_error_without_transport_cause() {
        let reason = classify_read_error(io::Error::new(io::ErrorKind::UnexpectedEof, "body ended early"));
        assert_eq!(
            reason,
            FailureReason::Transport {
                message: "body ended early".to_string()
            }
        );
    }
}
