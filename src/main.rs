//! springer-dl - batch book downloader
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use springer_dl::{BatchDownloader, Config};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Download the books listed in a folder of metadata CSV files
#[derive(Parser, Debug, Clone)]
#[command(
    name = "springer-dl",
    version,
    about = "Download the books listed in a folder of metadata CSV files",
    long_about = "Reads every CSV file in FOLDER and downloads the PDF of each row's DOI.\n\n\
                  Each X.csv gets a sibling X/ directory holding \
                  {year}_{contentType}_{title}.pdf files.",
    after_help = "EXAMPLES:\n    \
        springer-dl exports/\n    \
        springer-dl exports/ --epub\n    \
        springer-dl exports/ --max-files 1 --max-rows 8 --debug\n    \
        springer-dl exports/ --config springer-dl.json"
)]
struct Cli {
    /// Folder containing the metadata CSV files
    #[arg(value_name = "FOLDER")]
    folder: PathBuf,

    /// Also download the EPUB edition when available
    #[arg(long)]
    epub: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// JSON configuration file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum CSV files processed at once
    #[arg(long, value_name = "NUM")]
    max_files: Option<usize>,

    /// Maximum downloads running at once within one CSV file
    #[arg(long, value_name = "NUM")]
    max_rows: Option<usize>,
}

impl Cli {
    fn to_config(&self) -> springer_dl::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if self.epub {
            config.include_epub = true;
        }
        if let Some(max_files) = self.max_files {
            config.concurrency.max_concurrent_files = max_files;
        }
        if let Some(max_rows) = self.max_rows {
            config.concurrency.max_concurrent_rows = max_rows;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.to_config().context("Invalid configuration")?;
    let downloader = BatchDownloader::new(config).context("Cannot start downloader")?;

    let summary = downloader
        .download_folder(&cli.folder)
        .await
        .with_context(|| format!("Cannot process folder {}", cli.folder.display()))?;

    let failed = summary.failed_files().count();
    if failed > 0 {
        info!(files = failed, "Some CSV files could not be processed");
    }
    if summary.total_skipped() > 0 {
        info!(records = summary.total_skipped(), "Some records were skipped");
    }

    Ok(())
}

fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("springer_dl=debug,warn")
        } else {
            EnvFilter::new("springer_dl=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
