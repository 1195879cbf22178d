//! Configuration types for springer-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Where download targets are fetched from
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL for PDF downloads (default: "https://link.springer.com/content/pdf")
    #[serde(default = "default_pdf_base_url")]
    pub pdf_base_url: Url,

    /// Base URL for EPUB downloads (default: "https://link.springer.com/download/epub")
    #[serde(default = "default_epub_base_url")]
    pub epub_base_url: Url,

    /// User-Agent header sent with every request (default: "springer-dl/<version>")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pdf_base_url: default_pdf_base_url(),
            epub_base_url: default_epub_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// Worker pool sizes
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum CSV files processed at once (default: 2)
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Maximum rows fetched at once within a single CSV file (default: 4)
    #[serde(default = "default_max_concurrent_rows")]
    pub max_concurrent_rows: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            max_concurrent_rows: default_max_concurrent_rows(),
        }
    }
}

/// Main configuration for [`BatchDownloader`](crate::BatchDownloader)
///
/// Every field carries a serde default, so a partial JSON document (or `{}`)
/// deserializes into a usable configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Download source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Worker pool sizes
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Also attempt an EPUB download for every record (default: false)
    #[serde(default)]
    pub include_epub: bool,
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read, is not valid JSON
    /// for this structure, or fails [`validate`](Self::validate).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("invalid config '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the coordinator cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a pool size is zero or a base URL cannot
    /// carry a path (e.g. `mailto:` or `data:` URLs).
    pub fn validate(&self) -> Result<()> {
        if self.concurrency.max_concurrent_files == 0 {
            return Err(Error::config("max_concurrent_files", "must be at least 1"));
        }
        if self.concurrency.max_concurrent_rows == 0 {
            return Err(Error::config("max_concurrent_rows", "must be at least 1"));
        }
        for (key, url) in [
            ("pdf_base_url", &self.source.pdf_base_url),
            ("epub_base_url", &self.source.epub_base_url),
        ] {
            if url.cannot_be_a_base() {
                return Err(Error::config(
                    key,
                    format!("'{url}' cannot be used as a base URL"),
                ));
            }
        }
        Ok(())
    }
}

#[allow(clippy::expect_used)]
fn default_pdf_base_url() -> Url {
    Url::parse("https://link.springer.com/content/pdf").expect("static URL is valid")
}

#[allow(clippy::expect_used)]
fn default_epub_base_url() -> Url {
    Url::parse("https://link.springer.com/download/epub").expect("static URL is valid")
}

fn default_user_agent() -> String {
    format!("springer-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_concurrent_files() -> usize {
    2
}

fn default_max_concurrent_rows() -> usize {
    4
}
