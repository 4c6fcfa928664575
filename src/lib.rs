//! mustang-dl - A library for downloading tracks from NetEase Cloud Music.
//!
//! Requests to the service's `weapi` endpoints are wrapped in an encrypted
//! envelope ([`EnvelopeCodec`]); resolved track URLs are streamed to disk by
//! a [`Downloader`] that reports progress per transfer.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use mustang_dl::{
//!     DownloadConfig, DownloadProgress, Downloader, EnvelopeCodec, NeteaseClient, NoProgress,
//!     Session, Target,
//! };
//!
//! # async fn example() -> mustang_dl::Result<()> {
//! let config = DownloadConfig::default();
//! let http = mustang_dl::build_http_client(&config)?;
//! let api = NeteaseClient::new(http.clone(), "http://music.163.com", EnvelopeCodec::default());
//! let session = Session::new(api, Downloader::new(http, config), Path::new("downloads"));
//!
//! let progress: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
//! let stats = session.run(&Target::Album(32311), &progress).await?;
//! println!("Downloaded {} tracks, {} failed", stats.files_downloaded, stats.failures.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod envelope;
pub mod error;
pub mod format;
pub mod fs;
pub mod naming;
pub mod session;
pub mod stats;

// Re-export main types for convenience
pub use api::model::{Album, Artist, Playlist, Track};
pub use api::{NeteaseClient, build_http_client};
pub use config::{ApiConfig, AppConfig, DownloadConfig, PathConfig};
pub use download::{DownloadProgress, Downloader, NoProgress, Transfer, TransferState};
pub use envelope::{CodecParams, Envelope, EnvelopeCodec, EphemeralKey, SealedRequest};
pub use error::{Error, Result};
pub use format::{format_bytes, format_duration};
pub use fs::{FileSystem, TokioFileSystem};
pub use session::{Session, Target, TargetKind};
pub use stats::{FileStats, SessionStats, TrackFailure};
