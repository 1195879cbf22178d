//! Common test utilities for springer-dl integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use springer_dl::{Config, FetchError, Fetcher, SourceConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use wiremock::MockServer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Header row shared by every fixture CSV
pub const HEADER: &str = "Item Title,Item DOI,Publication Year,Content Type";

/// Write a CSV with the standard header and the given data lines
pub fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::from(HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Configuration pointing both base URLs at a mock server
pub fn config_for(server: &MockServer) -> Config {
    Config {
        source: SourceConfig {
            pdf_base_url: Url::parse(&format!("{}/content/pdf", server.uri())).unwrap(),
            epub_base_url: Url::parse(&format!("{}/download/epub", server.uri())).unwrap(),
            ..SourceConfig::default()
        },
        ..Config::default()
    }
}

/// Server path of the PDF for a DOI
pub fn pdf_route(prefix: &str, suffix: &str) -> String {
    format!("/content/pdf/{prefix}%2f{suffix}.pdf")
}

/// Server path of the EPUB for a DOI
pub fn epub_route(prefix: &str, suffix: &str) -> String {
    format!("/download/epub/{prefix}%2f{suffix}.epub")
}

/// Answer GET `route` with `status` and `body`
pub async fn mount(server: &MockServer, route: &str, status: u16, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Sorted file names in a directory
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Scripted answer for one URL
enum Scripted {
    Body(Vec<u8>),
    TransportError,
}

/// In-memory fetcher with per-URL outcomes that records peak concurrency
///
/// URLs without a registered outcome answer 404.
pub struct ScriptedFetcher {
    outcomes: HashMap<String, Scripted>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            outcomes: HashMap::new(),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.outcomes
            .insert(url.to_string(), Scripted::Body(body.to_vec()));
        self
    }

    pub fn with_transport_error(mut self, url: &str) -> Self {
        self.outcomes
            .insert(url.to_string(), Scripted::TransportError);
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(url.to_string());

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.outcomes.get(url.as_str()) {
            Some(Scripted::Body(body)) => Ok(body.clone()),
            Some(Scripted::TransportError) => Err(FetchError::Transport {
                url: url.to_string(),
                message: "connection reset by peer".to_string(),
            }),
            None => Err(FetchError::NotFound {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
