//! Configuration types for the downloader system

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::downloader::core::{DEFAULT_SIZE_TOLERANCE, DownloadError, Result, files};

/// File name of the persisted cookie store inside the home directory
pub const COOKIE_STORE_FILENAME: &str = ".bulk_download_cookiejar.txt";

/// Fixed endpoints and names of the identity provider
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    /// OAuth-style authorize endpoint of the identity provider
    pub authorize_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Page that only answers for an authenticated user, used as the session probe
    pub profile_url: String,
    /// Cookie the provider only sets after a successful login
    pub login_cookie: String,
    /// Query parameter appended to re-authentication redirects
    pub reauth_marker: (String, String),
    /// Substring of `redirect_uri` identifying a staging deployment
    pub staging_marker: String,
}

impl IdentityProviderConfig {
    /// Whether `url` points at the authorize endpoint
    pub fn is_authorize_url(&self, url: &url::Url) -> bool {
        url.as_str().starts_with(&self.authorize_url)
    }

    /// Whether the configured redirect URI belongs to a staging deployment
    pub fn is_staging(&self) -> bool {
        self.redirect_uri.contains(&self.staging_marker)
    }

    /// Host of the redirect URI, if it parses
    pub fn redirect_host(&self) -> Option<String> {
        url::Url::parse(&self.redirect_uri)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://urs.earthdata.nasa.gov/oauth/authorize".to_string(),
            client_id: "BO_n7nTIlMljdvU6kRRB3g".to_string(),
            redirect_uri: "https://vertex.daac.asf.alaska.edu/services/urs4_token_request".to_string(),
            profile_url: "https://urs.earthdata.nasa.gov/profile".to_string(),
            login_cookie: "urs_user_already_logged".to_string(),
            reauth_marker: ("app_type".to_string(), "401".to_string()),
            staging_marker: "test".to_string(),
        }
    }
}

/// Configuration for download operations
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory downloaded files are written into
    pub output_dir: PathBuf,
    /// Location of the persisted cookie store
    pub cookie_store_path: PathBuf,
    pub identity_provider: IdentityProviderConfig,
    /// Skip TLS certificate validation
    pub accept_invalid_certs: bool,
    /// Read size while streaming a body to disk
    pub chunk_size: usize,
    /// Relative byte-count tolerance for completeness checks
    pub size_tolerance: f64,
    /// Lifetime given to session cookies when they are persisted
    pub session_cookie_lifetime: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl DownloadConfig {
    /// Set the output directory
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the cookie store location
    pub fn with_cookie_store<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cookie_store_path = path.into();
        self
    }

    /// Replace the identity provider endpoints
    pub fn with_identity_provider(mut self, identity_provider: IdentityProviderConfig) -> Self {
        self.identity_provider = identity_provider;
        self
    }

    /// Disable TLS certificate validation
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.accept_invalid_certs = insecure;
        self
    }

    /// Validate configuration values and the output directory
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DownloadError::Configuration {
                message: "chunk_size must be at least 1".to_string(),
                field: Some("chunk_size".to_string()),
            });
        }

        if !(self.size_tolerance > 0.0 && self.size_tolerance < 1.0) {
            return Err(DownloadError::Configuration {
                message: format!("size_tolerance must be between 0 and 1, got {}", self.size_tolerance),
                field: Some("size_tolerance".to_string()),
            });
        }

        if url::Url::parse(&self.identity_provider.authorize_url).is_err() {
            return Err(DownloadError::Configuration {
                message: format!("authorize_url '{}' is not a valid URL", self.identity_provider.authorize_url),
                field: Some("identity_provider.authorize_url".to_string()),
            });
        }

        files::ensure_writable_dir(&self.output_dir)
    }
}

/// Default cookie store: a dot-file in the user's home directory
pub fn default_cookie_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join(COOKIE_STORE_FILENAME)
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            cookie_store_path: default_cookie_store_path(),
            identity_provider: IdentityProviderConfig::default(),
            accept_invalid_certs: false,
            chunk_size: 8192,
            size_tolerance: DEFAULT_SIZE_TOLERANCE,
            session_cookie_lifetime: Duration::from_secs(60 * 60 * 24 * 30), // 30 days
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("bulk-downloader/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = DownloadConfig::default();
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.size_tolerance, 0.01);
        assert!(!config.accept_invalid_certs);
        assert!(config.cookie_store_path.ends_with(COOKIE_STORE_FILENAME));
        assert_eq!(config.identity_provider.login_cookie, "urs_user_already_logged");
    }

    #[test]
    fn test_validate_checks_output_dir() {
        let dir = tempdir().unwrap();
        let config = DownloadConfig::default().with_output_dir(dir.path());
        assert!(config.validate().is_ok());

        let missing = DownloadConfig::default().with_output_dir(dir.path().join("nope"));
        assert!(matches!(missing.validate(), Err(DownloadError::WorkingDirectoryNotWritable { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_tolerance() {
        let dir = tempdir().unwrap();
        let mut config = DownloadConfig::default().with_output_dir(dir.path());
        config.size_tolerance = 0.0;
        assert!(matches!(config.validate(), Err(DownloadError::Configuration { .. })));
    }

    #[test]
    fn test_identity_provider_helpers() {
        let idp = IdentityProviderConfig::default();
        let redirect = url::Url::parse("https://urs.earthdata.nasa.gov/oauth/authorize?client_id=x").unwrap();
        assert!(idp.is_authorize_url(&redirect));
        let data = url::Url::parse("https://datapool.asf.alaska.edu/SLC/SA/a.zip").unwrap();
        assert!(!idp.is_authorize_url(&data));

        assert!(!idp.is_staging());
        assert_eq!(idp.redirect_host().as_deref(), Some("vertex.daac.asf.alaska.edu"));

        let staging = IdentityProviderConfig {
            redirect_uri: "https://vertex-test.daac.asf.alaska.edu/services/urs4_token_request".to_string(),
            ..IdentityProviderConfig::default()
        };
        assert!(staging.is_staging());
    }
}
