//! Error types for the bulk downloader with context and remediation information
//!
//! Two closed enumerations cover every branch of the download flow:
//! [`DownloadError`] for run-level conditions (most of them fatal) and
//! [`FailureReason`] for per-file failures that are recorded in the summary
//! while the run carries on with the next task.

use std::error::Error;
use std::path::PathBuf;
use thiserror::Error;

/// Remediation text shown whenever the account lacks data access.
pub const ENTITLEMENT_REMEDIATION: &str = "New users: you must first log into Vertex and accept the EULA. \
In addition, your Study Area must be set at Earthdata https://urs.earthdata.nasa.gov";

/// Run-level errors raised by the session and the download engine
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The working directory cannot receive downloaded files
    #[error("Cannot write to output directory '{path}'")]
    WorkingDirectoryNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The authenticated probe could not reach the server at all
    #[error("Could not reach '{url}' to validate the session cookies")]
    ProbeFailed {
        url: String,
        certificate: bool,
        #[source]
        source: reqwest::Error,
    },

    /// The identity provider answered 401 to the credential exchange
    #[error("Username and password combination was not accepted by the identity provider")]
    CredentialsRejected,

    /// The credential provider had nothing more to offer
    #[error("No credentials supplied, cannot obtain a download cookie")]
    CredentialsDeclined,

    /// The identity provider refused the exchange for a reason other than bad credentials
    #[error("Identity provider refused to issue a download cookie (HTTP {status})")]
    NotEntitled { status: u16 },

    /// The exchange succeeded but the login-confirmation cookie never showed up
    #[error("Identity provider answered HTTP {status} but did not issue the '{cookie}' cookie")]
    LoginCookieMissing { status: u16, cookie: String },

    /// The identity provider could not be contacted during the credential exchange
    #[error("Problem communicating with the identity provider at '{url}'")]
    IdentityProviderUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A 401 body carried a human readable redirect, meaning the account needs attention
    #[error("Server requires an out-of-band approval before '{url}' can be downloaded: {redirect}")]
    EntitlementRedirect { url: String, redirect: String },

    /// The very first download bounced back to the identity provider twice
    #[error("Endless authentication loop while downloading '{url}'")]
    AuthenticationLoop { url: String },

    /// Input files were given but none of them produced a URL
    #[error("{input_files} input file(s) were given but they contained no downloads")]
    NoDownloads { input_files: usize },

    /// Cookie store could not be read or written
    #[error("Cookie store operation failed on '{path}'")]
    CookieStore {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// File system I/O errors with file context
    #[error("File operation failed on '{path}'")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client construction failed
    #[error("Failed to create HTTP client")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
    Move,
    Metadata,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Metadata => write!(f, "reading metadata"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    /// Whether this error must terminate the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DownloadError::CredentialsRejected)
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::WorkingDirectoryNotWritable { .. } => "working_directory",
            DownloadError::ProbeFailed { .. } => "probe_failed",
            DownloadError::CredentialsRejected => "credentials_rejected",
            DownloadError::CredentialsDeclined => "credentials_declined",
            DownloadError::NotEntitled { .. } => "not_entitled",
            DownloadError::LoginCookieMissing { .. } => "login_cookie_missing",
            DownloadError::IdentityProviderUnreachable { .. } => "identity_provider_unreachable",
            DownloadError::EntitlementRedirect { .. } => "entitlement_redirect",
            DownloadError::AuthenticationLoop { .. } => "authentication_loop",
            DownloadError::NoDownloads { .. } => "no_downloads",
            DownloadError::CookieStore { .. } => "cookie_store",
            DownloadError::FileSystem { .. } => "file_system",
            DownloadError::HttpClient { .. } => "http_client",
            DownloadError::Configuration { .. } => "configuration",
        }
    }

    /// Get severity level for error prioritization
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DownloadError::CredentialsRejected => ErrorSeverity::Medium,
            DownloadError::CredentialsDeclined => ErrorSeverity::High,
            DownloadError::Configuration { .. } => ErrorSeverity::High,
            DownloadError::NoDownloads { .. } => ErrorSeverity::High,
            DownloadError::HttpClient { .. } => ErrorSeverity::High,
            DownloadError::FileSystem { .. } => ErrorSeverity::High,
            DownloadError::CookieStore { .. } => ErrorSeverity::High,
            DownloadError::AuthenticationLoop { .. } => ErrorSeverity::High,
            DownloadError::WorkingDirectoryNotWritable { .. }
            | DownloadError::ProbeFailed { .. }
            | DownloadError::NotEntitled { .. }
            | DownloadError::LoginCookieMissing { .. }
            | DownloadError::IdentityProviderUnreachable { .. }
            | DownloadError::EntitlementRedirect { .. } => ErrorSeverity::Critical,
        }
    }

    /// Get user-facing remediation for resolving the error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            DownloadError::WorkingDirectoryNotWritable { .. } => {
                Some("Check permissions on the output directory or choose another one with --output-dir")
            }
            DownloadError::ProbeFailed { certificate: true, .. } => {
                Some("Could not validate the SSL certificate. You may be able to overcome this using the --insecure flag")
            }
            DownloadError::ProbeFailed { .. } => Some("Check your network connection and try again"),
            DownloadError::CredentialsRejected => Some("Please try your username and password again"),
            DownloadError::NotEntitled { .. }
            | DownloadError::LoginCookieMissing { .. }
            | DownloadError::EntitlementRedirect { .. } => Some(ENTITLEMENT_REMEDIATION),
            DownloadError::IdentityProviderUnreachable { .. } => Some("Try cookie generation later"),
            _ => None,
        }
    }

    /// Create a detailed error report for the terminal
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Category: {}\n", self.category()));
        report.push_str(&format!("Severity: {:?}\n", self.severity()));

        if let Some(source) = self.source() {
            report.push_str(&format!("Root cause: {}\n", source));
        }

        if let Some(suggestion) = self.suggestion() {
            report.push_str(&format!("\n{}\n", suggestion));
        }

        report
    }
}

/// Error severity levels for prioritization
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Why a single task ended in `Failed`; the run continues with the next task
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("unauthorized: your user does not have permission to download this type of data")]
    Unauthorized,

    #[error("forbidden: you may need to log in to this app and agree to a EULA")]
    Forbidden,

    #[error("HTTP error {status}")]
    HttpStatus { status: u16 },

    #[error("could not validate SSL certificate: {message}")]
    Certificate { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("size mismatch: server declared {declared} bytes, wrote {written} bytes")]
    SizeMismatch { declared: u64, written: u64 },

    #[error("endless authentication loop")]
    AuthenticationLoop,

    #[error("re-authentication request failed with HTTP {status}")]
    Reauthentication { status: u16 },

    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("local file error on '{path}': {message}")]
    LocalFile { path: String, message: String },
}

impl FailureReason {
    /// Classify a transport-level reqwest error
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if is_certificate_error(error) {
            FailureReason::Certificate { message: error_chain(error) }
        } else {
            FailureReason::Transport { message: error_chain(error) }
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            401 => FailureReason::Unauthorized,
            403 => FailureReason::Forbidden,
            other => FailureReason::HttpStatus { status: other },
        }
    }

    pub fn local_file(path: &std::path::Path, error: &dyn std::fmt::Display) -> Self {
        FailureReason::LocalFile {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }
}

/// True when a cause of the transport error is a TLS certificate problem
///
/// The outer reqwest message embeds the request URL, so only the causes
/// underneath it are inspected.
pub fn is_certificate_error(error: &reqwest::Error) -> bool {
    chain_has_certificate_cause(error.source())
}

fn chain_has_certificate_cause(mut current: Option<&(dyn Error + 'static)>) -> bool {
    while let Some(err) = current {
        if describes_certificate(&err.to_string()) {
            return true;
        }
        current = err.source();
    }
    false
}

fn describes_certificate(message: &str) -> bool {
    let text = message.to_ascii_lowercase();
    text.contains("certificate") || text.contains("ssl routines") || text.contains("tls handshake")
}

/// Flatten an error and its causes into one line
pub fn error_chain(error: &dyn Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut current = error.source();
    while let Some(err) = current {
        let text = err.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        current = err.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
        assert!(ErrorSeverity::High < ErrorSeverity::Critical);
    }

    #[test]
    fn test_only_rejected_credentials_are_recoverable() {
        assert!(!DownloadError::CredentialsRejected.is_fatal());
        assert!(DownloadError::CredentialsDeclined.is_fatal());
        assert!(DownloadError::NotEntitled { status: 403 }.is_fatal());
        assert!(
            DownloadError::EntitlementRedirect {
                url: "https://example.com/a.zip".to_string(),
                redirect: "https://example.com/eula".to_string(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_entitlement_errors_point_at_remediation() {
        let error = DownloadError::LoginCookieMissing {
            status: 200,
            cookie: "urs_user_already_logged".to_string(),
        };
        assert_eq!(error.severity(), ErrorSeverity::Critical);
        assert_eq!(error.suggestion(), Some(ENTITLEMENT_REMEDIATION));
        assert!(error.detailed_report().contains("accept the EULA"));
    }

    #[test]
    fn test_failure_reason_from_status() {
        assert_eq!(FailureReason::from_status(reqwest::StatusCode::UNAUTHORIZED), FailureReason::Unauthorized);
        assert_eq!(FailureReason::from_status(reqwest::StatusCode::FORBIDDEN), FailureReason::Forbidden);
        assert_eq!(
            FailureReason::from_status(reqwest::StatusCode::NOT_FOUND),
            FailureReason::HttpStatus { status: 404 }
        );
    }

    #[derive(Debug)]
    struct Wrapped {
        message: &'static str,
        cause: std::io::Error,
    }

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.cause)
        }
    }

    #[test]
    fn test_certificate_cause_is_found_below_the_outer_error() {
        let rejected = Wrapped {
            message: "client error (Connect)",
            cause: std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid peer certificate: UnknownIssuer"),
        };
        assert!(chain_has_certificate_cause(Some(&rejected)));

        let openssl = Wrapped {
            message: "client error (Connect)",
            cause: std::io::Error::other("error:0A000086:SSL routines:tls_post_process_server_certificate:verify failed"),
        };
        assert!(chain_has_certificate_cause(Some(&openssl)));
    }

    #[test]
    fn test_refused_connection_is_not_a_certificate_error() {
        let refused = Wrapped {
            message: "tcp connect error",
            cause: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection refused (os error 111)"),
        };
        assert!(!chain_has_certificate_cause(Some(&refused)));
        assert!(!chain_has_certificate_cause(None));
    }

    #[tokio::test]
    async fn test_url_text_does_not_make_a_certificate_error() {
        let client = reqwest::Client::new();
        for url in ["http://127.0.0.1:1/ssl/a.zip", "http://127.0.0.1:1/certificates/b.zip"] {
            let error = client.head(url).send().await.unwrap_err();
            assert!(!is_certificate_error(&error), "{url} misclassified");
            assert!(matches!(FailureReason::from_transport(&error), FailureReason::Transport { .. }));
        }
    }

    #[test]
    fn test_size_mismatch_message() {
        let reason = FailureReason::SizeMismatch { declared: 100, written: 90 };
        assert!(reason.to_string().contains("declared 100 bytes"));
    }
}
