//! Cookie jar shared by every HTTP client of a session
//!
//! Implements [`reqwest::cookie::CookieStore`] so cookies set anywhere in a
//! redirect chain are captured, and reads/writes the Netscape `cookies.txt`
//! format so a session survives between runs.

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use url::Url;

use crate::downloader::core::{DownloadError, FileOperation, Result, files};

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File\n# This file was generated by bulk-downloader. Edit at your own risk.\n\n";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// A single cookie as held by the jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Domain without a leading dot
    pub domain: String,
    /// Only sent to exactly `domain`, never to its subdomains
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    /// Unix timestamp; `None` marks a session cookie
    pub expires: Option<i64>,
}

impl StoredCookie {
    fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires, Some(at) if at <= now)
    }

    fn same_identity(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn matches(&self, url: &Url, now: i64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.is_expired(now) {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let domain_ok = if self.host_only {
            host.eq_ignore_ascii_case(&self.domain)
        } else {
            domain_matches(host, &self.domain)
        };
        domain_ok && path_matches(url.path(), &self.path)
    }

    fn to_netscape_line(&self) -> String {
        let domain = if self.host_only {
            self.domain.clone()
        } else {
            format!(".{}", self.domain)
        };
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            domain,
            bool_field(!self.host_only),
            self.path,
            bool_field(self.secure),
            self.expires.map(|at| at.to_string()).unwrap_or_default(),
            self.name,
            self.value
        )
    }

    fn from_netscape_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            return None;
        }
        let raw_domain = fields[0];
        let host_only = !raw_domain.starts_with('.') && fields[1] != "TRUE";
        let expires = match fields[4].trim() {
            "" | "0" => None,
            value => Some(value.parse().ok()?),
        };

        Some(Self {
            name: fields[5].to_string(),
            value: fields[6..].join("\t"),
            domain: raw_domain.trim_start_matches('.').to_ascii_lowercase(),
            host_only,
            path: fields[2].to_string(),
            secure: fields[3] == "TRUE",
            expires,
        })
    }
}

/// Thread-safe cookie jar
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<StoredCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a jar from disk; a missing file yields an empty jar
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let jar = Self::from_netscape(&text);
                debug!("Loaded {} cookies from {}", jar.len(), path.display());
                Ok(jar)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cookie store at {}, starting empty", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(DownloadError::CookieStore {
                path: path.to_path_buf(),
                operation: FileOperation::Read,
                source: e,
            }),
        }
    }

    /// Write the jar to disk, replacing any previous copy atomically
    pub async fn save(&self, path: &Path) -> Result<()> {
        files::write_atomically(path, self.to_netscape().as_bytes())
            .await
            .map_err(|e| match e {
                DownloadError::FileSystem { path, operation, source } => {
                    DownloadError::CookieStore { path, operation, source }
                }
                other => other,
            })
    }

    /// Parse Netscape `cookies.txt` text; malformed and expired lines are dropped
    pub fn from_netscape(text: &str) -> Self {
        let now = unix_now();
        let mut cookies = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let line = match raw.strip_prefix(HTTP_ONLY_PREFIX) {
                Some(rest) => rest,
                None if raw.trim().is_empty() || raw.starts_with('#') => continue,
                None => raw,
            };
            match StoredCookie::from_netscape_line(line) {
                Some(cookie) if cookie.is_expired(now) => {}
                Some(cookie) => cookies.push(cookie),
                None => warn!("Ignoring malformed cookie store line {}", number + 1),
            }
        }
        Self {
            cookies: RwLock::new(cookies),
        }
    }

    /// Render the jar in Netscape `cookies.txt` format
    pub fn to_netscape(&self) -> String {
        let mut out = String::from(NETSCAPE_HEADER);
        for cookie in self.read().iter() {
            out.push_str(&cookie.to_netscape_line());
            out.push('\n');
        }
        out
    }

    /// Names of all cookies currently held
    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|c| c.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        let now = unix_now();
        self.read().iter().any(|c| c.name == name && !c.is_expired(now))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Add a cookie, replacing one with the same name, domain and path
    pub fn insert(&self, cookie: StoredCookie) {
        let mut cookies = self.write();
        cookies.retain(|existing| !existing.same_identity(&cookie));
        cookies.push(cookie);
    }

    /// Swap this jar's contents for a copy of `other`'s
    pub fn replace_with(&self, other: &CookieJar) {
        let fresh = other.read().clone();
        *self.write() = fresh;
    }

    /// Give session cookies a concrete expiry so they survive a restart
    pub fn promote_session_cookies(&self, lifetime: Duration) {
        let expires = unix_now() + lifetime.as_secs() as i64;
        for cookie in self.write().iter_mut().filter(|c| c.expires.is_none()) {
            cookie.expires = Some(expires);
        }
    }

    /// Apply one `Set-Cookie` header received from `url`
    pub fn store_response_cookie(&self, header: &str, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        let parsed = match cookie::Cookie::parse(header.to_string()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Ignoring unparseable Set-Cookie from {}: {}", host, e);
                return;
            }
        };

        let (domain, host_only) = match parsed.domain() {
            Some(domain) => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                if !domain_matches(host, &domain) {
                    debug!("Rejecting cookie {} for foreign domain {}", parsed.name(), domain);
                    return;
                }
                (domain, false)
            }
            None => (host.to_ascii_lowercase(), true),
        };

        let now = unix_now();
        let expires = match (parsed.max_age(), parsed.expires_datetime()) {
            (Some(max_age), _) => Some(now + max_age.whole_seconds()),
            (None, Some(at)) => Some(at.unix_timestamp()),
            (None, None) => None,
        };

        let stored = StoredCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            host_only,
            path: parsed
                .path()
                .filter(|p| p.starts_with('/'))
                .map(str::to_string)
                .unwrap_or_else(|| default_path(url.path())),
            secure: parsed.secure().unwrap_or(false),
            expires,
        };

        if stored.is_expired(now) {
            self.write().retain(|existing| !existing.same_identity(&stored));
        } else {
            self.insert(stored);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<StoredCookie>> {
        self.cookies.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<StoredCookie>> {
        self.cookies.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            if let Ok(text) = header.to_str() {
                self.store_response_cookie(text, url);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let now = unix_now();
        let pairs: Vec<String> = self
            .read()
            .iter()
            .filter(|c| c.matches(url, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        HeaderValue::from_str(&pairs.join("; ")).ok()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn bool_field(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Directory of the request path, as browsers default it
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => request_path[..index].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_set_cookie_is_sent_back_to_matching_hosts() {
        let jar = CookieJar::new();
        jar.store_response_cookie(
            "urs_user_already_logged=yes; Domain=.earthdata.nasa.gov; Path=/; Secure",
            &url("https://urs.earthdata.nasa.gov/oauth/authorize"),
        );
        jar.store_response_cookie("asf-urs=abc123; Path=/", &url("https://auth.asf.alaska.edu/login"));

        let header = jar.cookies(&url("https://urs.earthdata.nasa.gov/profile")).unwrap();
        assert_eq!(header.to_str().unwrap(), "urs_user_already_logged=yes");

        assert!(jar.cookies(&url("http://urs.earthdata.nasa.gov/profile")).is_none());
        assert!(jar.cookies(&url("https://datapool.asf.alaska.edu/a.zip")).is_none());
        assert!(jar.cookies(&url("https://auth.asf.alaska.edu/anything")).is_some());
        assert!(jar.contains("asf-urs"));
    }

    #[test]
    fn test_foreign_domain_is_rejected() {
        let jar = CookieJar::new();
        jar.store_response_cookie("evil=1; Domain=example.org", &url("https://urs.earthdata.nasa.gov/"));
        assert!(jar.is_empty());
    }

    #[test]
    fn test_default_path_is_request_directory() {
        let jar = CookieJar::new();
        jar.store_response_cookie("scoped=1", &url("https://host.example/oauth/authorize"));
        assert!(jar.cookies(&url("https://host.example/oauth/token")).is_some());
        assert!(jar.cookies(&url("https://host.example/profile")).is_none());
    }

    #[test]
    fn test_max_age_zero_removes_cookie() {
        let jar = CookieJar::new();
        let origin = url("https://host.example/");
        jar.store_response_cookie("token=abc; Path=/", &origin);
        assert!(jar.contains("token"));

        jar.store_response_cookie("token=; Path=/; Max-Age=0", &origin);
        assert!(!jar.contains("token"));
    }

    #[test]
    fn test_netscape_round_trip_keeps_attributes() {
        let jar = CookieJar::new();
        jar.store_response_cookie(
            "urs_user_already_logged=yes; Domain=earthdata.nasa.gov; Path=/; Secure",
            &url("https://urs.earthdata.nasa.gov/"),
        );
        jar.store_response_cookie("host=1; Path=/; Max-Age=3600", &url("https://vertex.example/"));
        jar.promote_session_cookies(Duration::from_secs(60));

        let text = jar.to_netscape();
        assert!(text.starts_with("# Netscape HTTP Cookie File"));
        assert!(text.contains(".earthdata.nasa.gov\tTRUE\t/\tTRUE\t"));
        assert!(text.contains("vertex.example\tFALSE\t/\tFALSE\t"));

        let restored = CookieJar::from_netscape(&text);
        assert_eq!(*restored.read(), *jar.read());
    }

    #[test]
    fn test_netscape_parsing_accepts_http_only_and_skips_junk() {
        let far_future = unix_now() + 86_400;
        let text = format!(
            "# comment\n\n#HttpOnly_.asf.alaska.edu\tTRUE\t/\tFALSE\t{far_future}\tasf-urs\tvalue\n\
             not a cookie line\n\
             .asf.alaska.edu\tTRUE\t/\tFALSE\t1\texpired\tgone\n"
        );
        let jar = CookieJar::from_netscape(&text);
        assert_eq!(jar.names(), vec!["asf-urs".to_string()]);
    }

    #[test]
    fn test_promote_only_touches_session_cookies() {
        let jar = CookieJar::new();
        let origin = url("https://host.example/");
        jar.store_response_cookie("session=1; Path=/", &origin);
        jar.store_response_cookie("lasting=1; Path=/; Max-Age=10", &origin);

        jar.promote_session_cookies(Duration::from_secs(30 * 24 * 60 * 60));

        let cookies = jar.read().clone();
        let session = cookies.iter().find(|c| c.name == "session").unwrap();
        let lasting = cookies.iter().find(|c| c.name == "lasting").unwrap();
        assert!(session.expires.unwrap() >= unix_now() + 29 * 24 * 60 * 60);
        assert!(lasting.expires.unwrap() <= unix_now() + 10);
    }

    #[tokio::test]
    async fn test_load_missing_store_is_empty_and_save_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".bulk_download_cookiejar.txt");
        assert!(CookieJar::load(&path).await.unwrap().is_empty());

        let jar = CookieJar::new();
        jar.store_response_cookie("asf-urs=abc; Path=/; Max-Age=600", &url("https://auth.asf.alaska.edu/"));
        jar.save(&path).await.unwrap();

        let loaded = CookieJar::load(&path).await.unwrap();
        assert_eq!(loaded.names(), vec!["asf-urs".to_string()]);
    }
}
