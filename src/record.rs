//! Metadata records and the download targets derived from them
//!
//! A record is one CSV row. Everything needed to fetch and store a book is
//! computed from it on demand: the DOI is parsed into its two segments, the
//! URLs are built from the configured base URLs, and the destination filename
//! is `{year}_{contentType}_{titleWithoutSpaces}.{ext}`.

use crate::config::SourceConfig;
use crate::error::RecordError;
use crate::types::Format;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Header names of the required CSV columns
pub mod columns {
    /// Book or chapter title
    pub const TITLE: &str = "Item Title";
    /// DOI in `prefix/suffix` form
    pub const DOI: &str = "Item DOI";
    /// Year of publication
    pub const YEAR: &str = "Publication Year";
    /// Content type, e.g. "Book" or "Chapter"
    pub const CONTENT_TYPE: &str = "Content Type";
}

/// One row of a metadata CSV
///
/// Fields are optional at the deserialization layer so that a row with a
/// missing or empty column becomes a per-row [`RecordError`] instead of
/// failing the whole file. Columns not listed here are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MetadataRecord {
    /// `Item Title`
    #[serde(rename = "Item Title", default)]
    pub title: Option<String>,
    /// `Item DOI`
    #[serde(rename = "Item DOI", default)]
    pub doi: Option<String>,
    /// `Publication Year`
    #[serde(rename = "Publication Year", default)]
    pub year: Option<String>,
    /// `Content Type`
    #[serde(rename = "Content Type", default)]
    pub content_type: Option<String>,
}

impl MetadataRecord {
    /// Build a record with all four fields present
    pub fn new(
        title: impl Into<String>,
        doi: impl Into<String>,
        year: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            doi: Some(doi.into()),
            year: Some(year.into()),
            content_type: Some(content_type.into()),
        }
    }

    /// Title as it appears in the row, for logs and events
    pub fn display_title(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or("<untitled>")
    }

    /// Parse the `Item DOI` field
    pub fn doi(&self) -> Result<Doi, RecordError> {
        Doi::parse(required(&self.doi, columns::DOI)?)
    }

    /// Destination filename for the given format
    ///
    /// Surrounding quotes are stripped from the title and every space is
    /// removed, so the same record always maps to the same file.
    pub fn filename(&self, format: Format) -> Result<String, RecordError> {
        let title = required(&self.title, columns::TITLE)?;
        let year = required(&self.year, columns::YEAR)?;
        let content_type = required(&self.content_type, columns::CONTENT_TYPE)?;

        let title: String = title
            .trim()
            .trim_matches('"')
            .chars()
            .filter(|c| *c != ' ')
            .collect();
        if title.is_empty() {
            return Err(RecordError::MissingField {
                field: columns::TITLE,
            });
        }

        let name = format!("{year}_{content_type}_{title}.{}", format.extension());
        Ok(name.replace(['/', '\\'], "-"))
    }

    /// Every target this record should be fetched as
    ///
    /// PDF is always included; EPUB follows when `include_epub` is set. The
    /// whole record is validated before any target is produced, so a malformed
    /// row yields no targets at all.
    pub fn targets(
        &self,
        source: &SourceConfig,
        destination: &Path,
        include_epub: bool,
    ) -> Result<Vec<DownloadTarget>, RecordError> {
        let doi = self.doi()?;
        let formats: &[Format] = if include_epub {
            &[Format::Pdf, Format::Epub]
        } else {
            &[Format::Pdf]
        };

        formats
            .iter()
            .map(|&format| -> Result<DownloadTarget, RecordError> {
                Ok(DownloadTarget {
                    format,
                    url: doi.url(source, format)?,
                    path: destination.join(self.filename(format)?),
                })
            })
            .collect()
    }
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, RecordError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RecordError::MissingField { field }),
    }
}

/// A DOI split into its registrant prefix and item suffix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Doi {
    prefix: String,
    suffix: String,
}

impl Doi {
    /// Split `prefix/suffix` into its two segments
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedDoi`] unless the value splits on `/`
    /// into exactly two non-empty segments.
    pub fn parse(raw: &str) -> Result<Self, RecordError> {
        let raw = raw.trim();
        let malformed = || RecordError::MalformedDoi {
            doi: raw.to_string(),
        };

        let (prefix, suffix) = raw.split_once('/').ok_or_else(malformed)?;
        if prefix.is_empty() || suffix.is_empty() || suffix.contains('/') {
            return Err(malformed());
        }

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Registrant prefix, e.g. `10.1007`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Item suffix, e.g. `978-3-030-12345-6_1`
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Download URL for this DOI in the given format
    ///
    /// The DOI becomes a single path segment with its separator written as
    /// `%2f`: `{base}/{prefix}%2f{suffix}.{ext}`.
    pub fn url(&self, source: &SourceConfig, format: Format) -> Result<Url, RecordError> {
        let base = match format {
            Format::Pdf => &source.pdf_base_url,
            Format::Epub => &source.epub_base_url,
        };
        let url = format!(
            "{}/{}%2f{}.{}",
            base.as_str().trim_end_matches('/'),
            escape_segment(&self.prefix),
            escape_segment(&self.suffix),
            format.extension()
        );
        Url::parse(&url).map_err(|_| RecordError::MalformedDoi {
            doi: self.to_string(),
        })
    }
}

impl std::fmt::Display for Doi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.prefix, self.suffix)
    }
}

/// Escape the characters that would otherwise end the path component
fn escape_segment(segment: &str) -> String {
    segment.replace('?', "%3F").replace('#', "%23")
}

/// A single file to fetch: where from, and where to put it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Format of the file
    pub format: Format,
    /// URL to fetch
    pub url: Url,
    /// Destination path (created or overwritten)
    pub path: PathBuf,
}
