//! Row processing: one metadata record in, zero to two files out.

use crate::config::SourceConfig;
use crate::error::{Error, RecordError};
use crate::fetcher::Fetcher;
use crate::record::{DownloadTarget, MetadataRecord};
use crate::types::Event;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Fetches every target of a record and writes the bodies to disk
///
/// Cheap to clone; the fetcher and configuration are shared.
#[derive(Clone)]
pub struct RowProcessor {
    fetcher: Arc<dyn Fetcher>,
    source: Arc<SourceConfig>,
    event_tx: broadcast::Sender<Event>,
}

impl RowProcessor {
    /// Create a processor that fetches through `fetcher` and reports on `event_tx`
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        source: SourceConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            fetcher,
            source: Arc::new(source),
            event_tx,
        }
    }

    /// Download one record into `destination`
    ///
    /// Returns the number of files written: 0, 1, or 2 when `include_epub` is
    /// set. A failed PDF does not stop the EPUB attempt and vice versa; fetch
    /// and write failures are logged and count as zero.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] if the record is missing a required field or
    /// its DOI is malformed. Nothing is fetched in that case.
    pub async fn process(
        &self,
        record: &MetadataRecord,
        destination: &Path,
        include_epub: bool,
    ) -> Result<usize, RecordError> {
        let targets = record.targets(&self.source, destination, include_epub)?;
        let title = record.display_title();

        let mut written = 0;
        for target in &targets {
            debug!(title, format = %target.format, url = %target.url, "Downloading");
            match self.download_target(target).await {
                Ok(()) => {
                    debug!(title, path = %target.path.display(), "done");
                    written += 1;
                    self.emit_event(Event::Downloaded {
                        title: title.to_string(),
                        format: target.format,
                        path: target.path.clone(),
                    });
                }
                Err(e) => {
                    error!(title, format = %target.format, error = %e, "failed");
                    self.emit_event(Event::DownloadFailed {
                        title: title.to_string(),
                        format: target.format,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(written)
    }

    /// Fetch one target and write the full body to its path
    ///
    /// The body is written to a sibling `.part` file and renamed over the
    /// destination, so a failed fetch or write leaves any earlier file intact.
    async fn download_target(&self, target: &DownloadTarget) -> Result<(), Error> {
        let body = self.fetcher.fetch(&target.url).await?;

        let partial = partial_path(&target.path);
        let written: std::io::Result<()> = async {
            tokio::fs::write(&partial, &body).await?;
            tokio::fs::rename(&partial, &target.path).await
        }
        .await;

        if let Err(e) = written {
            tokio::fs::remove_file(&partial).await.ok();
            return Err(Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to write '{}': {}", target.path.display(), e),
            )));
        }
        Ok(())
    }

    fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

/// Unique sibling path a download is staged in before the rename
///
/// Rows that derive the same filename each get their own staging file.
fn partial_path(path: &Path) -> PathBuf {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".{}-{seq}.part", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpFetcher;
    use tempfile::TempDir;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PDF_PATH: &str = "/content/pdf/10.1007%2f978-3-030-12345-6_1.pdf";
    const EPUB_PATH: &str = "/download/epub/10.1007%2f978-3-030-12345-6_1.epub";

    fn sample() -> MetadataRecord {
        MetadataRecord::new("Sample Book", "10.1007/978-3-030-12345-6_1", "2020", "Chapter")
    }

    fn processor_for(server: &MockServer) -> (RowProcessor, broadcast::Receiver<Event>) {
        let source = SourceConfig {
            pdf_base_url: Url::parse(&format!("{}/content/pdf", server.uri())).unwrap(),
            epub_base_url: Url::parse(&format!("{}/download/epub", server.uri())).unwrap(),
            ..SourceConfig::default()
        };
        let fetcher = Arc::new(HttpFetcher::new(&source).unwrap());
        let (event_tx, event_rx) = broadcast::channel(64);
        (RowProcessor::new(fetcher, source, event_tx), event_rx)
    }

    async fn mount(server: &MockServer, route: &str, status: u16, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn pdf_only_success_writes_one_file() {
        let server = MockServer::start().await;
        mount(&server, PDF_PATH, 200, b"pdf-bytes").await;
        let (processor, _events) = processor_for(&server);
        let dir = TempDir::new().unwrap();

        let written = processor.process(&sample(), dir.path(), false).await.unwrap();

        assert_eq!(written, 1);
        let pdf = dir.path().join("2020_Chapter_SampleBook.pdf");
        assert_eq!(std::fs::read(&pdf).unwrap(), b"pdf-bytes");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn pdf_and_epub_success_writes_two_files() {
        let server = MockServer::start().await;
        mount(&server, PDF_PATH, 200, b"pdf-bytes").await;
        mount(&server, EPUB_PATH, 200, b"epub-bytes").await;
        let (processor, _events) = processor_for(&server);
        let dir = TempDir::new().unwrap();

        let written = processor.process(&sample(), dir.path(), true).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            std::fs::read(dir.path().join("2020_Chapter_SampleBook.pdf")).unwrap(),
            b"pdf-bytes"
        );
        assert_eq!(
            std::fs::read(dir.path().join("2020_Chapter_SampleBook.epub")).unwrap(),
            b"epub-bytes"
        );
    }

    #[tokio::test]
    async fn missing_pdf_writes_nothing() {
        let server = MockServer::start().await;
        mount(&server, PDF_PATH, 404, b"").await;
        let (processor, _events) = processor_for(&server);
        let dir = TempDir::new().unwrap();

        let written = processor.process(&sample(), dir.path(), false).await.unwrap();

        assert_eq!(written, 0);
        assert!(!dir.path().join("2020_Chapter_SampleBook.pdf").exists());
    }

    #[tokio::test]
    async fn missing_pdf_does_not_stop_epub() {
        let server = MockServer::start().await;
        mount(&server, PDF_PATH, 404, b"").await;
        mount(&server, EPUB_PATH, 200, b"epub-bytes").await;
        let (processor, mut events) = processor_for(&server);
        let dir = TempDir::new().unwrap();

        let written = processor.process(&sample(), dir.path(), true).await.unwrap();

        assert_eq!(written, 1);
        assert!(!dir.path().join("2020_Chapter_SampleBook.pdf").exists());
        assert!(dir.path().join("2020_Chapter_SampleBook.epub").exists());

        match events.recv().await.unwrap() {
            Event::DownloadFailed { format, error, .. } => {
                assert_eq!(format, crate::types::Format::Pdf);
                assert!(error.contains("404"));
            }
            other => panic!("expected DownloadFailed, got {other:?}"),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::Downloaded { .. }
        ));
    }

    #[tokio::test]
    async fn rerun_overwrites_instead_of_duplicating() {
        let server = MockServer::start().await;
        mount(&server, PDF_PATH, 200, b"second").await;
        let (processor, _events) = processor_for(&server);
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("2020_Chapter_SampleBook.pdf");
        std::fs::write(&pdf, b"first, and longer than the second body").unwrap();

        assert_eq!(processor.process(&sample(), dir.path(), false).await.unwrap(), 1);
        assert_eq!(processor.process(&sample(), dir.path(), false).await.unwrap(), 1);

        assert_eq!(std::fs::read(&pdf).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn failed_rename_keeps_destination_and_cleans_up() {
        let server = MockServer::start().await;
        mount(&server, PDF_PATH, 200, b"pdf-bytes").await;
        let (processor, _events) = processor_for(&server);
        let dir = TempDir::new().unwrap();
        // A non-empty directory cannot be replaced by a file
        let occupied = dir.path().join("2020_Chapter_SampleBook.pdf");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("keep"), b"earlier").unwrap();

        let written = processor.process(&sample(), dir.path(), false).await.unwrap();

        assert_eq!(written, 0);
        assert_eq!(std::fs::read(occupied.join("keep")).unwrap(), b"earlier");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn partial_paths_are_siblings_and_unique() {
        let target = Path::new("out/2020_Chapter_SampleBook.pdf");
        let first = partial_path(target);
        let second = partial_path(target);

        assert_ne!(first, second);
        assert_eq!(first.parent(), target.parent());
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("2020_Chapter_SampleBook.pdf."));
        assert!(name.ends_with(".part"));
    }

    #[tokio::test]
    async fn malformed_doi_fails_without_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (processor, _events) = processor_for(&server);
        let dir = TempDir::new().unwrap();
        let record = MetadataRecord::new("Sample Book", "10.1007", "2020", "Chapter");

        let err = processor.process(&record, dir.path(), true).await.unwrap_err();

        assert!(matches!(err, RecordError::MalformedDoi { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn write_failure_counts_as_zero() {
        let server = MockServer::start().await;
        mount(&server, PDF_PATH, 200, b"pdf-bytes").await;
        let (processor, _events) = processor_for(&server);
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");

        let written = processor.process(&sample(), &missing, false).await.unwrap();

        assert_eq!(written, 0);
        assert!(!missing.exists());
    }
}
