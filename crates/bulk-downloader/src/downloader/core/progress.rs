//! Progress tracking and reporting for download operations

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Progress callback for download operations
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted during download operations
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    DownloadStarted {
        url: String,
        index: usize,
        total_files: usize,
        total_size: Option<u64>,
    },
    DownloadProgress {
        url: String,
        downloaded: u64,
        total: Option<u64>,
        speed_bps: f64,
    },
    DownloadComplete {
        url: String,
        final_size: u64,
    },
    Skipped {
        url: String,
        local_size: u64,
    },
    Redirected {
        url: String,
        target: String,
    },
    Reauthenticating {
        url: String,
        redirect: String,
    },
    Failed {
        url: String,
        error: String,
    },
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_download_started(&self, _url: &str, _index: usize, _total_files: usize, _total_size: Option<u64>) {}
    fn on_download_progress(&self, _url: &str, _downloaded: u64, _total: Option<u64>, _speed_bps: f64) {}
    fn on_download_complete(&self, _url: &str, _final_size: u64) {}
    fn on_skipped(&self, _url: &str, _local_size: u64) {}
    fn on_redirected(&self, _url: &str, _target: &str) {}
    fn on_reauthenticating(&self, _url: &str, _redirect: &str) {}
    fn on_failed(&self, _url: &str, _error: &str) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::DownloadStarted { url, index, total_files, total_size } => {
                self.on_download_started(&url, index, total_files, total_size);
            }
            ProgressEvent::DownloadProgress { url, downloaded, total, speed_bps } => {
                self.on_download_progress(&url, downloaded, total, speed_bps);
            }
            ProgressEvent::DownloadComplete { url, final_size } => {
                self.on_download_complete(&url, final_size);
            }
            ProgressEvent::Skipped { url, local_size } => {
                self.on_skipped(&url, local_size);
            }
            ProgressEvent::Redirected { url, target } => {
                self.on_redirected(&url, &target);
            }
            ProgressEvent::Reauthenticating { url, redirect } => {
                self.on_reauthenticating(&url, &redirect);
            }
            ProgressEvent::Failed { url, error } => {
                self.on_failed(&url, &error);
            }
        })
    }
}

/// Format the in-place progress line for one chunk report
pub fn format_progress_line(downloaded: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => {
            let percent = (downloaded as f64 / total as f64) * 100.0;
            format!(" > Downloaded {} of {} bytes ({:.2}%)", downloaded, total, percent)
        }
        _ => format!(" > Downloaded {} of unknown size", downloaded),
    }
}

/// Console reporter that rewrites a single status line while bytes arrive
///
/// Redraws are throttled so an 8 KiB chunk cadence does not flood the terminal;
/// the final state of each file is always drawn by `on_download_complete`.
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    refresh_rate: Duration,
    last_draw: Mutex<Option<Instant>>,
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        Self::with_refresh_rate(Duration::from_millis(100))
    }

    pub fn with_refresh_rate(refresh_rate: Duration) -> Self {
        Self {
            refresh_rate,
            last_draw: Mutex::new(None),
        }
    }

    fn should_draw(&self) -> bool {
        let mut last = self.last_draw.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < self.refresh_rate => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    fn reset(&self) {
        *self.last_draw.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn on_download_started(&self, url: &str, index: usize, total_files: usize, _total_size: Option<u64>) {
        self.reset();
        println!("({}/{}) Downloading {}", index, total_files, url);
    }

    fn on_download_progress(&self, _url: &str, downloaded: u64, total: Option<u64>, _speed_bps: f64) {
        if !self.should_draw() {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "\r\x1b[K{}", format_progress_line(downloaded, total));
        let _ = stdout.flush();
    }

    fn on_download_complete(&self, _url: &str, final_size: u64) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "\r\x1b[K{}", format_progress_line(final_size, Some(final_size)));
        let _ = stdout.flush();
    }

    fn on_skipped(&self, url: &str, _local_size: u64) {
        println!(" > Download file exists! Skipping download of {}", url);
    }

    fn on_redirected(&self, _url: &str, target: &str) {
        println!(" > 'Temporary' Redirect download @ Remote archive:\n > {}", target);
    }

    fn on_reauthenticating(&self, _url: &str, redirect: &str) {
        println!(" > Need to obtain new cookie from {}", redirect);
    }

    fn on_failed(&self, url: &str, error: &str) {
        eprintln!("\r\x1b[K > There was a problem downloading {}: {}", url, error);
    }
}

/// Null progress reporter that does nothing
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}
