//! Identity-provider session: validation, credential exchange and persistence

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::CookieJar;
use crate::downloader::config::{DownloadConfig, IdentityProviderConfig};
use crate::downloader::core::error::is_certificate_error;
use crate::downloader::core::http::HttpClientBuilder;
use crate::downloader::core::{DownloadError, FailureReason, Result};

/// Username and password for the identity provider
///
/// Only ever held in memory for the duration of one exchange.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of credentials when the stored session is not usable
#[async_trait]
pub trait CredentialProvider: Send {
    /// Credentials for the given attempt (1-based), or `None` to give up
    async fn credentials(&mut self, attempt: usize) -> Option<Credentials>;
}

/// Hands out one fixed set of credentials, then declines
#[derive(Debug)]
pub struct StaticCredentials {
    credentials: Option<Credentials>,
}

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    /// A provider that never has credentials to offer
    pub fn none() -> Self {
        Self { credentials: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&mut self, _attempt: usize) -> Option<Credentials> {
        self.credentials.take()
    }
}

/// How the profile probe response was judged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    LoggedIn,
    /// Redirect into a staging deployment, accepted as logged in
    StagingRedirect,
    Redirected { status: u16, location: Option<String> },
    NotLoggedIn,
    UnexpectedStatus { status: u16 },
}

impl ProbeVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, ProbeVerdict::LoggedIn | ProbeVerdict::StagingRedirect)
    }
}

/// Judge a profile probe response
pub fn classify_probe(
    status: StatusCode,
    location: Option<&str>,
    logged_in: bool,
    identity_provider: &IdentityProviderConfig,
) -> ProbeVerdict {
    if !logged_in {
        return ProbeVerdict::NotLoggedIn;
    }

    if status.is_redirection() && status != StatusCode::TEMPORARY_REDIRECT {
        let staging = identity_provider.is_staging()
            && match (location, identity_provider.redirect_host()) {
                (Some(location), Some(host)) => location.contains(&host),
                _ => false,
            };
        return if staging {
            ProbeVerdict::StagingRedirect
        } else {
            ProbeVerdict::Redirected {
                status: status.as_u16(),
                location: location.map(str::to_string),
            }
        };
    }

    if status == StatusCode::OK || status == StatusCode::TEMPORARY_REDIRECT {
        ProbeVerdict::LoggedIn
    } else {
        ProbeVerdict::UnexpectedStatus { status: status.as_u16() }
    }
}

/// Cookie-backed session with the identity provider
///
/// Owns the cookie jar shared by a redirect-following client (transfers,
/// re-authentication) and a non-following client (the validation probe).
pub struct Session {
    config: DownloadConfig,
    jar: Arc<CookieJar>,
    client: Client,
    probe_client: Client,
}

impl Session {
    /// Load the persisted cookie store; a missing store yields an empty session
    pub async fn load(config: &DownloadConfig) -> Result<Self> {
        let jar = Arc::new(CookieJar::load(&config.cookie_store_path).await?);
        Self::with_jar(config, jar)
    }

    fn with_jar(config: &DownloadConfig, jar: Arc<CookieJar>) -> Result<Self> {
        let client = HttpClientBuilder::from_config(config)
            .with_cookie_jar(jar.clone())
            .build()?;
        let probe_client = HttpClientBuilder::from_config(config)
            .with_cookie_jar(jar.clone())
            .without_redirects()
            .build()?;

        Ok(Self {
            config: config.clone(),
            jar,
            client,
            probe_client,
        })
    }

    /// Client that follows redirects and carries the session cookies
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Probe the profile page and report whether the session is usable
    ///
    /// A usable session is persisted. Transport failures are fatal since no
    /// download could succeed either.
    pub async fn validate(&self) -> Result<bool> {
        let idp = &self.config.identity_provider;
        if self.jar.is_empty() {
            debug!("Cookie store is empty, session needs credentials");
            return Ok(false);
        }

        debug!("Validating session cookies against {}", idp.profile_url);
        let response = self
            .probe_client
            .head(&idp.profile_url)
            .send()
            .await
            .map_err(|e| {
                error!("Session probe to {} failed: {}", idp.profile_url, e);
                DownloadError::ProbeFailed {
                    url: idp.profile_url.clone(),
                    certificate: is_certificate_error(&e),
                    source: e,
                }
            })?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok());
        let verdict = classify_probe(response.status(), location, self.jar.contains(&idp.login_cookie), idp);

        match &verdict {
            ProbeVerdict::LoggedIn => debug!("Session cookies are valid"),
            ProbeVerdict::StagingRedirect => info!("Accepting redirect into staging deployment as a valid session"),
            ProbeVerdict::Redirected { status, location } => {
                info!("Redirect ({}) to {:?} occurred, cookie is not valid", status, location)
            }
            ProbeVerdict::NotLoggedIn => info!("No '{}' cookie, need to log in", idp.login_cookie),
            ProbeVerdict::UnexpectedStatus { status } => warn!("Session probe answered HTTP {}", status),
        }

        if verdict.is_valid() {
            self.persist().await?;
        }
        Ok(verdict.is_valid())
    }

    /// Exchange credentials for a fresh set of cookies
    ///
    /// The session's jar is only replaced when the exchange yields the
    /// login-confirmation cookie.
    pub async fn refresh(&self, credentials: &Credentials) -> Result<()> {
        let idp = &self.config.identity_provider;
        let fresh = Arc::new(CookieJar::new());
        let client = HttpClientBuilder::from_config(&self.config)
            .with_cookie_jar(fresh.clone())
            .build()?;

        info!("Requesting a new download cookie for user '{}'", credentials.username());
        let response = client
            .get(&idp.authorize_url)
            .query(&[
                ("client_id", idp.client_id.as_str()),
                ("redirect_uri", idp.redirect_uri.as_str()),
                ("response_type", "code"),
                ("state", ""),
            ])
            .basic_auth(credentials.username(), Some(credentials.password()))
            .send()
            .await
            .map_err(|e| DownloadError::IdentityProviderUnreachable {
                url: idp.authorize_url.clone(),
                source: e,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Username and password combination was not accepted");
            return Err(DownloadError::CredentialsRejected);
        }
        if !status.is_success() {
            error!("Identity provider refused to issue a download cookie (HTTP {})", status);
            return Err(DownloadError::NotEntitled { status: status.as_u16() });
        }
        if !fresh.contains(&idp.login_cookie) {
            error!("Identity provider answered {} without the login cookie", status);
            return Err(DownloadError::LoginCookieMissing {
                status: status.as_u16(),
                cookie: idp.login_cookie.clone(),
            });
        }

        self.jar.replace_with(&fresh);
        self.persist().await?;
        info!("Obtained {} cookies from the identity provider", self.jar.len());
        Ok(())
    }

    /// Validate, and keep asking for credentials until the session is usable
    pub async fn establish(&self, provider: &mut dyn CredentialProvider) -> Result<()> {
        let mut attempt = 0;
        while !self.validate().await? {
            attempt += 1;
            let Some(credentials) = provider.credentials(attempt).await else {
                error!("No credentials supplied after {} attempt(s)", attempt - 1);
                return Err(DownloadError::CredentialsDeclined);
            };

            match self.refresh(&credentials).await {
                Ok(()) => {}
                Err(DownloadError::CredentialsRejected) => {
                    warn!("Login attempt {} was rejected, asking again", attempt);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Follow a redirect back into the identity provider with the current cookies
    ///
    /// Returns the names of cookies the provider issued. Failures only affect
    /// the file that triggered the redirect.
    pub async fn reauthenticate_via(&self, redirect: &Url) -> std::result::Result<Vec<String>, FailureReason> {
        let before = self.jar.names();
        debug!("Re-authenticating via {}", redirect);

        let response = self
            .client
            .get(redirect.clone())
            .send()
            .await
            .map_err(|e| FailureReason::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Re-authentication via {} failed with HTTP {}", redirect, status);
            return Err(FailureReason::Reauthentication { status: status.as_u16() });
        }

        let issued: Vec<String> = self
            .jar
            .names()
            .into_iter()
            .filter(|name| !before.contains(name))
            .collect();
        for name in &issued {
            info!("Saved new cookie: {}", name);
        }

        if let Err(e) = self.persist().await {
            warn!("Could not save refreshed cookies: {}", e);
            return Err(FailureReason::local_file(&self.config.cookie_store_path, &e));
        }
        Ok(issued)
    }

    /// Write the jar to the cookie store, promoting session cookies first
    pub async fn persist(&self) -> Result<()> {
        self.jar.promote_session_cookies(self.config.session_cookie_lifetime);
        self.jar.save(&self.config.cookie_store_path).await?;
        debug!(
            "Saved {} cookies to {}",
            self.jar.len(),
            self.config.cookie_store_path.display()
        );
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookie_store_path", &self.config.cookie_store_path)
            .field("cookies", &self.jar.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_requires_login_cookie() {
        let idp = IdentityProviderConfig::default();
        assert_eq!(classify_probe(StatusCode::OK, None, false, &idp), ProbeVerdict::NotLoggedIn);
        assert_eq!(classify_probe(StatusCode::OK, None, true, &idp), ProbeVerdict::LoggedIn);
        assert!(classify_probe(StatusCode::TEMPORARY_REDIRECT, None, true, &idp).is_valid());
    }

    #[test]
    fn test_probe_redirect_is_invalid_outside_staging() {
        let idp = IdentityProviderConfig::default();
        let location = "https://vertex.daac.asf.alaska.edu/services/urs4_token_request?code=x";
        let verdict = classify_probe(StatusCode::FOUND, Some(location), true, &idp);
        assert_eq!(
            verdict,
            ProbeVerdict::Redirected {
                status: 302,
                location: Some(location.to_string())
            }
        );
        assert!(!verdict.is_valid());
    }

    #[test]
    fn test_probe_redirect_into_staging_is_valid() {
        let idp = IdentityProviderConfig {
            redirect_uri: "https://vertex.daac.asf.alaska.edu/services/test/urs4_token_request".to_string(),
            ..IdentityProviderConfig::default()
        };
        let verdict = classify_probe(
            StatusCode::FOUND,
            Some("https://vertex.daac.asf.alaska.edu/landing"),
            true,
            &idp,
        );
        assert_eq!(verdict, ProbeVerdict::StagingRedirect);

        let elsewhere = classify_probe(StatusCode::FOUND, Some("https://example.com/"), true, &idp);
        assert!(!elsewhere.is_valid());
    }

    #[test]
    fn test_probe_error_status_is_invalid() {
        let idp = IdentityProviderConfig::default();
        assert_eq!(
            classify_probe(StatusCode::SERVICE_UNAVAILABLE, None, true, &idp),
            ProbeVerdict::UnexpectedStatus { status: 503 }
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("scientist", "hunter2");
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("scientist"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_static_credentials_are_handed_out_once() {
        let mut provider = StaticCredentials::new(Credentials::new("user", "pass"));
        assert_eq!(provider.credentials(1).await.map(|c| c.username().to_string()), Some("user".to_string()));
        assert!(provider.credentials(2).await.is_none());
        assert!(StaticCredentials::none().credentials(1).await.is_none());
    }
}
