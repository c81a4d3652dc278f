//! Identity-provider authentication
//!
//! The session artifact is a cookie jar: credentials are exchanged once for
//! cookies, which are persisted and reused across runs until they stop
//! validating.

pub mod cookies;
pub mod session;

pub use cookies::{CookieJar, StoredCookie};
pub use session::{CredentialProvider, Credentials, ProbeVerdict, Session, StaticCredentials, classify_probe};
