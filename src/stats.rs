//! Transfer and session statistics.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Statistics for one completed transfer.
#[derive(Debug, Clone)]
pub struct FileStats {
    /// Where the file was written.
    pub path: PathBuf,
    /// Bytes written to disk.
    pub size: u64,
    /// Time from request to end of stream.
    pub elapsed: Duration,
}

impl FileStats {
    /// Average speed in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_sec(self.size, self.elapsed)
    }
}

/// A track that did not make it to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFailure {
    /// Display name (or id when the name is unknown).
    pub name: String,
    /// Rendered error.
    pub reason: String,
}

/// Statistics for an entire download session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Number of tracks written successfully.
    pub files_downloaded: usize,
    /// Total bytes downloaded.
    pub total_bytes: u64,
    /// Total elapsed time for the session.
    pub elapsed: Duration,
    /// One entry per failed track, in completion order.
    pub failures: Vec<TrackFailure>,
}

impl SessionStats {
    /// Returns the average download speed in bytes per second.
    #[must_use]
    pub fn average_speed(&self) -> u64 {
        bytes_per_sec(self.total_bytes, self.elapsed)
    }

    /// True when every attempted track was downloaded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bytes_per_sec(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Builder for accumulating session statistics during downloads.
pub struct SessionStatsBuilder {
    files_downloaded: usize,
    total_bytes: u64,
    start_time: Instant,
    failures: Vec<TrackFailure>,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    /// Creates a new session stats builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files_downloaded: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            failures: Vec::new(),
        }
    }

    /// Records a completed download.
    pub fn add_download(&mut self, file_stats: &FileStats) {
        self.files_downloaded += 1;
        self.total_bytes += file_stats.size;
    }

    /// Records a failed track.
    pub fn add_failure(&mut self, name: impl Into<String>, error: &crate::Error) {
        self.failures.push(TrackFailure {
            name: name.into(),
            reason: error.to_string(),
        });
    }

    /// Builds the final session statistics.
    #[must_use]
    pub fn build(self) -> SessionStats {
        SessionStats {
            files_downloaded: self.files_downloaded,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
            failures: self.failures,
        }
    }
}
