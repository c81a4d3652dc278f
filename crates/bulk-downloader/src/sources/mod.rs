//! Source list resolution
//!
//! Turns the command-line inputs (bare URLs, metalink documents, delimited
//! text files) into one ordered list of download URLs. Problems with
//! individual records never abort resolution; they are returned as
//! [`SourceWarning`]s next to the URLs that could be read.

pub mod delimited;
pub mod metalink;

pub use delimited::{UrlColumn, parse_delimited};
pub use metalink::parse_metalink;

use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use crate::downloader::core::{DownloadError, Result};

/// A soft problem found while reading a source list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceWarning {
    /// File (or input argument) the problem was found in
    pub source: String,
    /// Line or record number, when the problem is tied to one
    pub record: Option<usize>,
    pub message: String,
}

impl SourceWarning {
    pub fn new<S: Into<String>, M: Into<String>>(source: S, record: Option<usize>, message: M) -> Self {
        Self {
            source: source.into(),
            record,
            message: message.into(),
        }
    }
}

impl fmt::Display for SourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record {
            Some(record) => write!(f, "{} (record {}): {}", self.source, record, self.message),
            None => write!(f, "{}: {}", self.source, self.message),
        }
    }
}

/// URLs read from one or more sources, in order, with any warnings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList {
    pub urls: Vec<String>,
    pub warnings: Vec<SourceWarning>,
}

impl SourceList {
    pub(crate) fn warn(&mut self, warning: SourceWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn append(&mut self, other: SourceList) {
        self.urls.extend(other.urls);
        self.warnings.extend(other.warnings);
    }
}

/// Supported source list formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Metalink,
    Delimited,
}

impl SourceFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "metalink" | "meta4" => Some(SourceFormat::Metalink),
            "csv" => Some(SourceFormat::Delimited),
            _ => None,
        }
    }
}

/// Result of resolving every input argument
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub list: SourceList,
    /// How many inputs were treated as source files rather than URLs
    pub input_files: usize,
}

impl Resolution {
    /// Fail when source files were given but none of them yielded a URL
    pub fn ensure_downloads(&self) -> Result<()> {
        if self.input_files > 0 && self.list.urls.is_empty() {
            return Err(DownloadError::NoDownloads {
                input_files: self.input_files,
            });
        }
        Ok(())
    }
}

/// Whether `input` is an absolute http(s) URL rather than a path
pub fn is_download_url(input: &str) -> bool {
    let lower = input.trim().to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://")) && url::Url::parse(input.trim()).is_ok()
}

/// Resolve inputs in argument order
///
/// URL arguments are taken as they are; anything else is read as a source
/// file whose format follows its extension.
pub async fn resolve<S: AsRef<str>>(inputs: &[S], column: &UrlColumn) -> Resolution {
    let mut resolution = Resolution::default();

    for input in inputs {
        let input = input.as_ref();
        if is_download_url(input) {
            resolution.list.urls.push(input.trim().to_string());
            continue;
        }

        let path = Path::new(input);
        let Some(format) = SourceFormat::from_path(path) else {
            resolution
                .list
                .warn(SourceWarning::new(input, None, "not a URL or a recognised source file, ignoring"));
            continue;
        };
        resolution.input_files += 1;

        let document = match tokio::fs::read_to_string(path).await {
            Ok(document) => document,
            Err(e) => {
                resolution
                    .list
                    .warn(SourceWarning::new(input, None, format!("could not read source file: {}", e)));
                continue;
            }
        };

        let parsed = match format {
            SourceFormat::Metalink => parse_metalink(&document, input),
            SourceFormat::Delimited => parse_delimited(&document, input, column),
        };
        debug!("Read {} URLs from {}", parsed.urls.len(), input);
        resolution.list.append(parsed);
    }

    resolution
}
