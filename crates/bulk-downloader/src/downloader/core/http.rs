//! HTTP utilities
//!
//! Centralized construction of reqwest clients. Every client built here
//! shares the session's cookie jar, so cookies set anywhere in a redirect
//! chain are visible to the next request.

use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Client, redirect};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::CookieJar;
use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{DownloadError, Result};

/// Redirect hops followed before reqwest gives up
const MAX_REDIRECTS: usize = 10;

/// Builder for creating configured HTTP clients
pub struct HttpClientBuilder {
    connect_timeout: Duration,
    user_agent: String,
    accept_invalid_certs: bool,
    cookie_jar: Option<Arc<CookieJar>>,
    follow_redirects: bool,
}

impl HttpClientBuilder {
    /// Create a new HTTP client builder from download configuration
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            user_agent: config.user_agent.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
            cookie_jar: None,
            follow_redirects: true,
        }
    }

    /// Attach the shared cookie jar
    pub fn with_cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Return 3xx responses to the caller instead of following them
    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Build the HTTP client with the configured settings
    pub fn build(self) -> Result<Client> {
        let policy = if self.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };

        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .redirect(policy)
            .danger_accept_invalid_certs(self.accept_invalid_certs);

        if let Some(jar) = self.cookie_jar {
            builder = builder.cookie_provider(jar);
        }

        builder.build().map_err(|e| DownloadError::HttpClient { source: e })
    }
}

/// Content-Length as the server declared it
///
/// Read straight from the header: `Response::content_length` reports the body
/// size hint, which is zero for HEAD responses.
pub fn declared_size(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_declared_size_reads_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_size(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static(" 4096 "));
        assert_eq!(declared_size(&headers), Some(4096));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("not-a-number"));
        assert_eq!(declared_size(&headers), None);
    }

    #[test]
    fn test_builder_produces_both_client_kinds() {
        let config = DownloadConfig::default();
        let jar = Arc::new(CookieJar::new());

        assert!(HttpClientBuilder::from_config(&config).with_cookie_jar(jar.clone()).build().is_ok());
        assert!(
            HttpClientBuilder::from_config(&config)
                .with_cookie_jar(jar)
                .without_redirects()
                .build()
                .is_ok()
        );
    }
}
