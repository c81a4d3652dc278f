mod prompt;

use anyhow::Context;
use bulk_downloader::{
    BulkDownloader, ConsoleProgressReporter, DownloadConfig, DownloadError, IntoProgressCallback,
    NullProgressReporter, UrlColumn, sources,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::prompt::PromptCredentials;

/// Bulk download data files from the Alaska Satellite Facility archive
#[derive(Parser, Debug)]
#[command(name = "bulk-download", version, about)]
struct Cli {
    /// URLs to download, or .metalink / .meta4 / .csv files listing them
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Skip TLS certificate validation
    #[arg(long)]
    insecure: bool,

    /// Earthdata Login username
    #[arg(long)]
    username: Option<String>,

    /// Earthdata Login password
    #[arg(long)]
    password: Option<String>,

    /// Cookie store location [default: ~/.bulk_download_cookiejar.txt]
    #[arg(long)]
    cookie_jar: Option<PathBuf>,

    /// Directory to save downloads into
    #[arg(long, short = 'o', default_value = ".")]
    output_dir: PathBuf,

    /// CSV column holding the URL: a header name, a zero-based index, or "auto"
    #[arg(long, default_value = "auto")]
    url_column: UrlColumn,

    /// Log protocol details
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors and hide progress
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = cli.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,bulk_downloader={level},bulk_download={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let resolution = sources::resolve(&cli.inputs, &cli.url_column).await;
    resolution.ensure_downloads()?;
    debug!(
        "Resolved {} URLs ({} warnings)",
        resolution.list.urls.len(),
        resolution.list.warnings.len()
    );

    let mut config = DownloadConfig::default()
        .with_output_dir(&cli.output_dir)
        .with_insecure(cli.insecure);
    if let Some(cookie_jar) = &cli.cookie_jar {
        config = config.with_cookie_store(cookie_jar);
    }

    let progress = if cli.quiet || cli.json {
        NullProgressReporter.into_callback()
    } else {
        ConsoleProgressReporter::new().into_callback()
    };

    let downloader = BulkDownloader::new(config).with_progress(progress);
    let mut credentials = PromptCredentials::new(cli.username, cli.password);
    let summary = downloader
        .run(&resolution.list.urls, &mut credentials)
        .await
        .context("Bulk download aborted")?;

    if cli.json {
        println!("{}", summary.to_json().context("Failed to serialize summary")?);
    } else {
        println!("{}", summary);
    }
    info!(
        "Finished: {} downloaded, {} failed, {} skipped",
        summary.success_count(),
        summary.failure_count(),
        summary.skip_count()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<DownloadError>() {
                Some(download_error) => eprintln!("\n{}", download_error.detailed_report()),
                None => eprintln!("\nError: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_inputs_and_flags() {
        let cli = Cli::try_parse_from([
            "bulk-download",
            "granules.metalink",
            "https://datapool.asf.alaska.edu/SLC/SA/a.zip",
            "--insecure",
            "--url-column",
            "URL",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.inputs.len(), 2);
        assert!(cli.insecure);
        assert!(cli.json);
        assert_eq!(cli.url_column, UrlColumn::Named("URL".to_string()));
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn test_cli_requires_an_input() {
        assert!(Cli::try_parse_from(["bulk-download"]).is_err());
        assert!(Cli::try_parse_from(["bulk-download", "a.csv", "-v", "-q"]).is_err());
    }
}
