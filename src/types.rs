//! Core types and events for springer-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File format of a download target
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Portable Document Format, always requested
    Pdf,
    /// EPUB e-book, requested only when enabled
    Epub,
}

impl Format {
    /// File extension used both in the download URL and the destination filename
    pub fn extension(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Epub => "epub",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Pdf => write!(f, "PDF"),
            Format::Epub => write!(f, "EPUB"),
        }
    }
}

/// Event emitted during a batch run
///
/// Events are informational. Totals are computed from returned values, never
/// from the event stream, so a lagging or absent subscriber changes nothing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Started processing a CSV file
    FileStarted {
        /// CSV file being processed
        csv: PathBuf,
        /// Directory receiving the downloads
        output_dir: PathBuf,
    },

    /// A row was skipped because it could not be turned into download targets
    RecordSkipped {
        /// CSV file the row came from
        csv: PathBuf,
        /// Why the row was skipped
        reason: String,
    },

    /// A target was fetched and written to disk
    Downloaded {
        /// Title as it appeared in the row
        title: String,
        /// Format of the written file
        format: Format,
        /// Where the file was written
        path: PathBuf,
    },

    /// A target could not be fetched or written
    DownloadFailed {
        /// Title as it appeared in the row
        title: String,
        /// Format that failed
        format: Format,
        /// Error message
        error: String,
    },

    /// Finished processing a CSV file
    FileFinished {
        /// CSV file that was processed
        csv: PathBuf,
        /// Files written for this CSV
        downloaded: usize,
    },

    /// Finished the whole batch
    BatchFinished {
        /// Files written across every CSV
        downloaded: usize,
    },
}

/// Outcome of processing one CSV file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    /// The CSV file
    pub csv: PathBuf,
    /// Directory the downloads were written to
    pub output_dir: PathBuf,
    /// Data rows read from the CSV
    pub records: usize,
    /// Rows skipped as malformed
    pub skipped: usize,
    /// Files successfully written
    pub downloaded: usize,
    /// Set when the file could not be processed at all (unreadable CSV,
    /// output directory could not be created)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a batch run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// One entry per CSV file, in input order
    pub files: Vec<FileSummary>,
}

impl BatchSummary {
    /// Total number of files written across every CSV
    pub fn total_downloaded(&self) -> usize {
        self.files.iter().map(|f| f.downloaded).sum()
    }

    /// Total number of rows skipped as malformed
    pub fn total_skipped(&self) -> usize {
        self.files.iter().map(|f| f.skipped).sum()
    }

    /// CSV files that could not be processed at all
    pub fn failed_files(&self) -> impl Iterator<Item = &FileSummary> {
        self.files.iter().filter(|f| f.error.is_some())
    }
}
