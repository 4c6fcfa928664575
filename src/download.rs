//! Streaming downloads with per-transfer progress and timeout.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::stats::FileStats;

/// Trait for receiving download progress updates.
///
/// Implement this trait to receive callbacks during download operations.
/// All methods have default no-op implementations for convenience.
/// Transfers are identified by their display name.
pub trait DownloadProgress: Send + Sync {
    /// Called once the response headers arrived. `total` is the advertised
    /// content length, if any.
    fn on_file_start(&self, _name: &str, _total: Option<u64>) {}

    /// Called for every chunk written, with the size of that chunk.
    fn on_progress(&self, _name: &str, _bytes_delta: u64) {}

    /// Called when a transfer completes successfully.
    fn on_file_complete(&self, _name: &str, _stats: &FileStats) {}

    /// Called when a transfer fails.
    fn on_error(&self, _name: &str, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Lifecycle of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Destination created, nothing sent yet.
    Idle,
    /// Request sent, waiting for headers.
    Requesting,
    /// Body is being written to disk.
    Streaming,
    /// End of stream reached and flushed.
    Completed,
    /// Network error, bad status, short body or timeout.
    Failed,
}

impl TransferState {
    /// Whether the transfer has settled.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Requesting | Self::Failed)
                | (Self::Requesting, Self::Streaming | Self::Failed)
                | (Self::Streaming, Self::Completed | Self::Failed)
        )
    }
}

/// Bookkeeping for one in-flight download.
#[derive(Debug)]
pub struct Transfer {
    name: String,
    url: String,
    destination: PathBuf,
    bytes: u64,
    total: Option<u64>,
    deadline: Option<Instant>,
    state: TransferState,
    started: Instant,
}

impl Transfer {
    /// Creates a transfer in the [`TransferState::Idle`] state.
    #[must_use]
    pub fn new(name: &str, url: &str, destination: &Path) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            destination: destination.to_path_buf(),
            bytes: 0,
            total: None,
            deadline: None,
            state: TransferState::Idle,
            started: Instant::now(),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Destination path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Advertised content length.
    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    /// When the armed timer fires, if armed.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TransferState {
        self.state
    }

    /// Moves to `next` if the transition is legal. Returns whether it moved.
    pub fn advance(&mut self, next: TransferState) -> bool {
        if self.state.can_advance_to(next) {
            log::debug!("{}: {:?} -> {:?}", self.name, self.state, next);
            self.state = next;
            true
        } else {
            log::debug!(
                "{}: ignoring transition {:?} -> {:?}",
                self.name,
                self.state,
                next
            );
            false
        }
    }

    /// Adds a received chunk to the byte counter.
    pub const fn record_chunk(&mut self, len: u64) {
        self.bytes = self.bytes.saturating_add(len);
    }

    fn into_stats(self) -> FileStats {
        FileStats {
            path: self.destination,
            size: self.bytes,
            elapsed: self.started.elapsed(),
        }
    }
}

/// A one-shot deadline for a streaming transfer.
///
/// Dropping the timer cancels it; nothing fires after the owning transfer
/// settles.
#[derive(Debug)]
pub struct TransferTimer {
    deadline: tokio::time::Instant,
    budget: Duration,
}

impl TransferTimer {
    /// Arms a timer that expires `budget` from now.
    #[must_use]
    pub fn arm(budget: Duration) -> Self {
        Self {
            deadline: tokio::time::Instant::now() + budget,
            budget,
        }
    }

    /// Resolves when the deadline passes.
    pub async fn expired(&self) {
        tokio::time::sleep_until(self.deadline).await;
    }

    /// The deadline as a std instant.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline.into_std()
    }

    /// The budget the timer was armed with.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }
}

/// Downloads resolved track URLs to disk.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    http: reqwest::Client,
    config: DownloadConfig,
    fs: F,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub const fn new(http: reqwest::Client, config: DownloadConfig) -> Self {
        Self {
            http,
            config,
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(http: reqwest::Client, config: DownloadConfig, fs: F) -> Self {
        Self { http, config, fs }
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Creates the download directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created.
    pub async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.as_os_str().is_empty() {
            self.fs.create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Downloads `url` into `destination`.
    ///
    /// The destination is created (or truncated) before the request is sent,
    /// so a failed transfer still leaves an empty or partial file behind.
    /// The configured timeout starts when the request is sent and covers
    /// waiting for headers as well as the whole body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the destination cannot be written,
    /// [`Error::Transfer`] for network errors, non-success status or a body
    /// shorter than advertised, and [`Error::Timeout`] if the transfer did
    /// not finish in time.
    pub async fn download(
        &self,
        name: &str,
        url: &str,
        destination: &Path,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<FileStats> {
        let mut transfer = Transfer::new(name, url, destination);

        match self.run(&mut transfer, progress).await {
            Ok(()) => {
                transfer.advance(TransferState::Completed);
                let stats = transfer.into_stats();
                progress.on_file_complete(name, &stats);
                Ok(stats)
            }
            Err(e) => {
                transfer.advance(TransferState::Failed);
                log::warn!("{name}: failed after {} bytes: {e}", transfer.bytes());
                progress.on_error(name, &e.to_string());
                Err(e)
            }
        }
    }

    async fn run(&self, transfer: &mut Transfer, progress: &Arc<dyn DownloadProgress>) -> Result<()> {
        let mut file = self.fs.create_file(transfer.destination()).await?;
        let url = transfer.url().to_string();

        let timer = TransferTimer::arm(self.config.timeout());
        transfer.deadline = Some(timer.deadline());
        transfer.advance(TransferState::Requesting);

        let outcome = tokio::select! {
            res = self.exchange(&mut file, transfer, progress.as_ref()) => res,
            () = timer.expired() => Err(Error::Timeout {
                url: url.clone(),
                after: timer.budget(),
            }),
        };
        drop(timer);

        if outcome.is_err() {
            // Keep whatever already reached the file.
            if let Err(e) = file.flush().await {
                log::debug!("{}: flush after failure: {e}", transfer.name());
            }
        }
        outcome
    }

    /// Sends the request and streams the answer into `file`.
    async fn exchange(
        &self,
        file: &mut tokio::fs::File,
        transfer: &mut Transfer,
        progress: &dyn DownloadProgress,
    ) -> Result<()> {
        let url = transfer.url().to_string();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transfer(format!("Unable to download file: {e}"), &url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transfer(
                format!("Initial error downloading file: HTTP {status}"),
                &url,
            ));
        }

        transfer.total = response.content_length();
        transfer.advance(TransferState::Streaming);
        log::info!("Downloading {} to {}", transfer.name(), transfer.destination().display());
        progress.on_file_start(transfer.name(), transfer.total());

        pump(response.bytes_stream(), file, transfer, progress).await
    }
}

/// Writes every chunk of `body` to `file`, advancing the transfer's counter
/// and reporting each chunk's size.
async fn pump<S>(
    body: S,
    file: &mut tokio::fs::File,
    transfer: &mut Transfer,
    progress: &dyn DownloadProgress,
) -> Result<()>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    futures::pin_mut!(body);

    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|e| Error::transfer(format!("Unable to download file: {e}"), transfer.url()))?;
        file.write_all(&chunk).await?;
        let len = chunk.len() as u64;
        transfer.record_chunk(len);
        progress.on_progress(transfer.name(), len);
    }
    file.flush().await?;

    if let Some(total) = transfer.total()
        && transfer.bytes() != total
    {
        return Err(Error::transfer(
            format!("Stream ended after {} of {total} bytes", transfer.bytes()),
            transfer.url(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn no_progress_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoProgress>();
    }

    #[test]
    fn happy_path_transitions() {
        let mut t = Transfer::new("a", "http://x/a.mp3", Path::new("a.mp3"));
        assert_eq!(t.state(), TransferState::Idle);
        assert!(t.advance(TransferState::Requesting));
        assert!(t.advance(TransferState::Streaming));
        assert!(t.advance(TransferState::Completed));
        assert!(t.state().is_terminal());
    }

    #[test]
    fn terminal_states_do_not_move() {
        let mut t = Transfer::new("a", "http://x/a.mp3", Path::new("a.mp3"));
        t.advance(TransferState::Requesting);
        t.advance(TransferState::Failed);
        assert!(!t.advance(TransferState::Streaming));
        assert!(!t.advance(TransferState::Completed));
        assert_eq!(t.state(), TransferState::Failed);
    }

    #[test]
    fn cannot_skip_requesting() {
        let mut t = Transfer::new("a", "http://x/a.mp3", Path::new("a.mp3"));
        assert!(!t.advance(TransferState::Streaming));
        assert!(!t.advance(TransferState::Completed));
        assert!(t.advance(TransferState::Failed));
    }

    #[test]
    fn byte_counter_accumulates() {
        let mut t = Transfer::new("a", "http://x/a.mp3", Path::new("a.mp3"));
        t.record_chunk(10);
        t.record_chunk(0);
        t.record_chunk(5);
        assert_eq!(t.bytes(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expires_after_budget() {
        let timer = TransferTimer::arm(Duration::from_secs(60));
        let start = tokio::time::Instant::now();
        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(timer.budget(), Duration::from_secs(60));
    }

    #[derive(Default)]
    struct Recording {
        deltas: Mutex<Vec<u64>>,
    }

    impl DownloadProgress for Recording {
        fn on_progress(&self, _name: &str, bytes_delta: u64) {
            self.deltas.lock().unwrap().push(bytes_delta);
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = reqwest::Result<Bytes>> {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(*p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn pump_reports_deltas_not_totals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        let mut transfer = Transfer::new("a", "http://x/a.mp3", &path);
        transfer.total = Some(9);
        let progress = Recording::default();

        pump(chunks(&[b"abc", b"defg", b"hi"]), &mut file, &mut transfer, &progress)
            .await
            .unwrap();

        assert_eq!(*progress.deltas.lock().unwrap(), vec![3, 4, 2]);
        assert_eq!(transfer.bytes(), 9);
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghi");
    }

    #[tokio::test]
    async fn pump_rejects_short_body() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        let mut transfer = Transfer::new("a", "http://x/a.mp3", &path);
        transfer.total = Some(100);

        let err = pump(chunks(&[b"abc"]), &mut file, &mut transfer, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn pump_without_length_accepts_any_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        let mut transfer = Transfer::new("a", "http://x/a.mp3", &path);

        pump(chunks(&[b"abc", b"d"]), &mut file, &mut transfer, &NoProgress)
            .await
            .unwrap();
        assert_eq!(transfer.bytes(), 4);
    }

    #[tokio::test]
    async fn unreachable_host_leaves_placeholder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"stale").unwrap();

        // A port that was free a moment ago and is closed now.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{port}/a.mp3");

        let downloader = Downloader::new(reqwest::Client::new(), DownloadConfig::default());
        let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        let err = downloader
            .download("a", &url, &path, &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transfer { .. }));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    // =========================================================================
    // Mock file system
    // =========================================================================

    /// A file system whose files can never be created.
    struct ReadOnlyFileSystem;

    #[async_trait::async_trait]
    impl FileSystem for ReadOnlyFileSystem {
        async fn create_dir_all(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }

        async fn create_file(&self, _path: &Path) -> std::io::Result<tokio::fs::File> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ))
        }
    }

    #[derive(Default)]
    struct ErrorCount(Mutex<Vec<String>>);

    impl DownloadProgress for ErrorCount {
        fn on_error(&self, name: &str, _error: &str) {
            self.0.lock().unwrap().push(name.to_string());
        }
    }

    #[tokio::test]
    async fn unwritable_destination_fails_before_request() {
        let downloader = Downloader::with_fs(
            reqwest::Client::new(),
            DownloadConfig::default(),
            ReadOnlyFileSystem,
        );
        let errors = Arc::new(ErrorCount::default());
        let progress: Arc<dyn DownloadProgress> = errors.clone();

        let err = downloader
            .download("a", "http://127.0.0.1:9/a.mp3", Path::new("a.mp3"), &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(*errors.0.lock().unwrap(), vec!["a".to_string()]);
    }
}
