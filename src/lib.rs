//! # springer-dl
//!
//! Batch downloader for academic book files listed in CSV metadata exports.
//!
//! Each CSV row names a book or chapter by DOI. For every row the PDF (and
//! optionally the EPUB) is fetched and written to a folder named after the CSV
//! file, under `{year}_{contentType}_{title}.{ext}`. Files are processed a few
//! at a time, and rows within a file a few at a time; the run reports how many
//! files were written.
//!
//! ## Quick Start
//!
//! ```no_run
//! use springer_dl::{BatchDownloader, Config};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         include_epub: true,
//!         ..Default::default()
//!     };
//!
//!     let downloader = BatchDownloader::new(config)?;
//!     let summary = downloader.download_folder(Path::new("exports")).await?;
//!
//!     println!("Downloaded {} files", summary.total_downloaded());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Batch coordination across CSV files and rows
pub mod coordinator;
/// Error types
pub mod error;
/// HTTP fetching
pub mod fetcher;
/// Per-row download processing
pub mod processor;
/// Metadata records and derived download targets
pub mod record;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{ConcurrencyConfig, Config, SourceConfig};
pub use coordinator::{BatchDownloader, discover_csv_files, output_dir_for};
pub use error::{Error, FetchError, RecordError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use processor::RowProcessor;
pub use record::{Doi, DownloadTarget, MetadataRecord};
pub use types::{BatchSummary, Event, FileSummary, Format};
