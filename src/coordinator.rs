//! Batch coordination across CSV files and rows
//!
//! Work fans out twice:
//! - an outer pool runs up to `max_concurrent_files` CSV files at once
//! - inside each file, an inner pool runs up to `max_concurrent_rows` rows at once
//!
//! Both pools are `buffer_unordered` streams. Counts flow back as return
//! values: each row yields how many files it wrote, each CSV folds its rows
//! into a [`FileSummary`], and the batch folds the files into a
//! [`BatchSummary`]. Nothing is accumulated through shared state.

use crate::config::Config;
use crate::error::{Error, RecordError, Result};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::processor::RowProcessor;
use crate::record::MetadataRecord;
use crate::types::{BatchSummary, Event, FileSummary};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Downloads every book listed in a set of metadata CSV files
///
/// Cheap to clone; all fields are shared.
#[derive(Clone)]
pub struct BatchDownloader {
    config: Arc<Config>,
    processor: RowProcessor,
    event_tx: broadcast::Sender<Event>,
}

impl BatchDownloader {
    /// Create a downloader that fetches over HTTP
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.source)?);
        Self::with_fetcher(config, fetcher)
    }

    /// Create a downloader that fetches through a custom [`Fetcher`]
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let processor = RowProcessor::new(fetcher, config.source.clone(), event_tx.clone());
        Ok(Self {
            config: Arc::new(config),
            processor,
            event_tx,
        })
    }

    /// Subscribe to batch events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discover the CSV files in `folder` and download all of them
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputFolder`] if the folder cannot be listed. Failures
    /// of individual files, rows or downloads are reported in the summary.
    pub async fn download_folder(&self, folder: &Path) -> Result<BatchSummary> {
        let csv_files = discover_csv_files(folder).await?;
        if csv_files.is_empty() {
            warn!(folder = %folder.display(), "No CSV files found");
        } else {
            info!(
                folder = %folder.display(),
                files = csv_files.len(),
                "Found CSV files"
            );
        }
        Ok(self.run(&csv_files).await)
    }

    /// Download every record of every CSV file
    ///
    /// Waits for every file to finish before returning. The summary lists the
    /// files in the order given, and its
    /// [`total_downloaded`](BatchSummary::total_downloaded) is the exact sum of
    /// the per-row counts.
    ///
    /// Whether EPUB editions are fetched alongside the PDFs is taken from
    /// [`Config::include_epub`]; set it before building the downloader.
    pub async fn run(&self, csv_files: &[PathBuf]) -> BatchSummary {
        let mut files: Vec<(usize, FileSummary)> = stream::iter(csv_files.iter().enumerate())
            .map(|(index, csv)| async move { (index, self.process_csv(csv).await) })
            .buffer_unordered(self.config.concurrency.max_concurrent_files)
            .collect()
            .await;
        files.sort_by_key(|(index, _)| *index);

        let summary = BatchSummary {
            files: files.into_iter().map(|(_, file)| file).collect(),
        };
        let downloaded = summary.total_downloaded();
        info!("Downloaded {} files", downloaded);
        self.emit_event(Event::BatchFinished { downloaded });
        summary
    }

    /// Process a single CSV file into its sibling output directory
    ///
    /// Never fails: an unusable file is reported through
    /// [`FileSummary::error`] with a count of zero.
    pub async fn process_csv(&self, csv: &Path) -> FileSummary {
        let output_dir = output_dir_for(csv);
        let mut summary = FileSummary {
            csv: csv.to_path_buf(),
            output_dir: output_dir.clone(),
            ..Default::default()
        };

        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            error!(
                csv = %csv.display(),
                output_dir = %output_dir.display(),
                error = %e,
                "Cannot create output directory, skipping file"
            );
            summary.error = Some(format!(
                "cannot create output directory '{}': {}",
                output_dir.display(),
                e
            ));
            self.finish_file(&summary);
            return summary;
        }

        let records = match read_records(csv).await {
            Ok(records) => records,
            Err(e) => {
                error!(csv = %csv.display(), error = %e, "Cannot read CSV, skipping file");
                summary.error = Some(e.to_string());
                self.finish_file(&summary);
                return summary;
            }
        };

        info!(
            csv = %csv.display(),
            records = records.len(),
            output_dir = %output_dir.display(),
            "Processing CSV"
        );
        self.emit_event(Event::FileStarted {
            csv: csv.to_path_buf(),
            output_dir: output_dir.clone(),
        });
        summary.records = records.len();

        let include_epub = self.config.include_epub;
        let outcomes: Vec<RowOutcome> = stream::iter(records)
            .map(|record| {
                let output_dir = &output_dir;
                async move {
                    match record {
                        Ok(record) => match self
                            .processor
                            .process(&record, output_dir, include_epub)
                            .await
                        {
                            Ok(written) => RowOutcome::Processed(written),
                            Err(e) => self.skip_record(csv, Some(&record), e),
                        },
                        Err(e) => self.skip_record(csv, None, e),
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max_concurrent_rows)
            .collect()
            .await;

        let (downloaded, skipped) = tally_outcomes(&outcomes);
        summary.downloaded = downloaded;
        summary.skipped = skipped;
        self.finish_file(&summary);
        summary
    }

    fn skip_record(
        &self,
        csv: &Path,
        record: Option<&MetadataRecord>,
        e: RecordError,
    ) -> RowOutcome {
        let title = record.map(MetadataRecord::display_title).unwrap_or("<unreadable>");
        error!(csv = %csv.display(), title, error = %e, "Skipping record");
        self.emit_event(Event::RecordSkipped {
            csv: csv.to_path_buf(),
            reason: e.to_string(),
        });
        RowOutcome::Skipped
    }

    fn finish_file(&self, summary: &FileSummary) {
        info!(
            csv = %summary.csv.display(),
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            "Finished CSV"
        );
        self.emit_event(Event::FileFinished {
            csv: summary.csv.clone(),
            downloaded: summary.downloaded,
        });
    }

    fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

/// Result of one row in the inner pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    /// Row was valid; carries the number of files written
    Processed(usize),
    /// Row was malformed and never fetched
    Skipped,
}

/// Fold row outcomes into (files downloaded, rows skipped)
fn tally_outcomes(outcomes: &[RowOutcome]) -> (usize, usize) {
    outcomes
        .iter()
        .fold((0, 0), |(downloaded, skipped), outcome| match outcome {
            RowOutcome::Processed(written) => (downloaded + written, skipped),
            RowOutcome::Skipped => (downloaded, skipped + 1),
        })
}

/// Output directory for a CSV: the same path with its extension removed
///
/// `lists/books.csv` becomes `lists/books`.
pub fn output_dir_for(csv: &Path) -> PathBuf {
    csv.with_extension("")
}

/// List the CSV files directly inside `folder`, sorted by path
///
/// Matching is on the `.csv` extension, case-insensitively. Subdirectories
/// are not descended into.
///
/// # Errors
///
/// Returns [`Error::InputFolder`] if the folder cannot be read.
pub async fn discover_csv_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let input_error = |source| Error::InputFolder {
        path: folder.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(folder).await.map_err(input_error)?;
    let mut csv_files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(input_error)? {
        let path = entry.path();
        // Follows symlinks, unlike DirEntry::file_type
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if is_file && is_csv_file(&path) {
            csv_files.push(path);
        } else {
            debug!(path = %path.display(), "Ignoring non-CSV entry");
        }
    }

    csv_files.sort();
    Ok(csv_files)
}

fn is_csv_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Read and parse every row of a metadata CSV
///
/// Header-based, `"` quoted, with whitespace around fields trimmed; a quoted
/// field may follow spaces after the delimiter. Every row must have as many
/// fields as the header. The outer
/// `Result` fails only if the file or its header row cannot be read; rows the
/// reader cannot decode come back as per-row errors.
async fn read_records(
    csv: &Path,
) -> Result<Vec<std::result::Result<MetadataRecord, RecordError>>> {
    let content = tokio::fs::read(csv).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read CSV '{}': {}", csv.display(), e),
        ))
    })?;
    parse_records(&content)
}

fn parse_records(
    content: &[u8],
) -> Result<Vec<std::result::Result<MetadataRecord, RecordError>>> {
    let content = skip_initial_space(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .quote(b'"')
        .trim(csv::Trim::All)
        .from_reader(content.as_slice());

    // Surface a broken header row as a file-level error
    reader.headers()?;

    Ok(reader
        .deserialize::<MetadataRecord>()
        .map(|row| row.map_err(|e| RecordError::Unparseable(e.to_string())))
        .collect())
}

/// Drop spaces and tabs that open a field, outside quoted regions
///
/// The csv reader only recognizes a quoted field when the `"` is the first
/// byte after the delimiter, and trims only after splitting. Without this
/// pass `a, "b, c"` splits into three fields instead of two.
fn skip_initial_space(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut in_quotes = false;
    let mut field_start = true;
    let mut after_closing_quote = false;

    for &byte in content {
        if in_quotes {
            out.push(byte);
            if byte == b'"' {
                in_quotes = false;
                after_closing_quote = true;
            }
            continue;
        }

        match byte {
            b' ' | b'\t' if field_start => continue,
            b'"' if field_start || after_closing_quote => in_quotes = true,
            _ => {}
        }
        out.push(byte);
        field_start = matches!(byte, b',' | b'\n' | b'\r');
        after_closing_quote = false;
    }

    out
}
