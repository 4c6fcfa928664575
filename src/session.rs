//! Single-track, album and playlist download sessions.
//!
//! A session resolves each track's playable URL and downloads it. Tracks of a
//! collection run concurrently; a failing track is recorded in
//! [`SessionStats::failures`] and never stops its siblings.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use futures::{StreamExt, stream};

use crate::api::NeteaseClient;
use crate::api::model::Track;
use crate::download::{DownloadProgress, Downloader};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::naming::FileNamer;
use crate::stats::{FileStats, SessionStats, SessionStatsBuilder};

/// What to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// One or more songs by id.
    Songs(Vec<u64>),
    /// Every track of an album.
    Album(u64),
    /// Every track of a playlist.
    Playlist(u64),
}

/// Kind selector accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetKind {
    /// `s`
    #[default]
    Song,
    /// `a`
    Album,
    /// `p`
    Playlist,
}

impl FromStr for TargetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s" | "song" => Ok(Self::Song),
            "a" | "album" => Ok(Self::Album),
            "p" | "playlist" => Ok(Self::Playlist),
            other => Err(Error::Config(format!(
                "unknown type '{other}' (expected s, a or p)"
            ))),
        }
    }
}

impl Target {
    /// Builds a target from a kind and an id string. Songs accept several ids
    /// joined with `.` (`"123.456"`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an id is not a number, or if several ids
    /// are given for an album or playlist.
    pub fn parse(kind: TargetKind, ids: &str) -> Result<Self> {
        let parsed = ids
            .split('.')
            .map(|part| {
                part.trim()
                    .parse::<u64>()
                    .map_err(|_| Error::Config(format!("invalid id '{part}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        match (kind, parsed.as_slice()) {
            (TargetKind::Song, _) => Ok(Self::Songs(parsed)),
            (TargetKind::Album, [id]) => Ok(Self::Album(*id)),
            (TargetKind::Playlist, [id]) => Ok(Self::Playlist(*id)),
            _ => Err(Error::Config(format!(
                "expected exactly one id for {kind:?}, got '{ids}'"
            ))),
        }
    }
}

/// Ties the API client and the downloader to one download directory.
pub struct Session<F: FileSystem = TokioFileSystem> {
    api: NeteaseClient,
    downloader: Downloader<F>,
    download_dir: PathBuf,
}

impl<F: FileSystem> Session<F> {
    /// Creates a session writing into `download_dir`.
    #[must_use]
    pub fn new(api: NeteaseClient, downloader: Downloader<F>, download_dir: &Path) -> Self {
        Self {
            api,
            downloader,
            download_dir: download_dir.to_path_buf(),
        }
    }

    /// Returns the API client.
    #[must_use]
    pub const fn api(&self) -> &NeteaseClient {
        &self.api
    }

    /// Downloads `target`.
    ///
    /// A single song propagates its failure. Collections only fail when
    /// the collection itself cannot be fetched; track failures are reported
    /// in the returned stats.
    ///
    /// # Errors
    ///
    /// Returns an error if the download directory cannot be created, the
    /// album or playlist cannot be fetched, or a lone song fails.
    pub async fn run(
        &self,
        target: &Target,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<SessionStats> {
        self.downloader.ensure_dir(&self.download_dir).await?;

        match target {
            Target::Songs(ids) if ids.len() == 1 => {
                let mut builder = SessionStatsBuilder::new();
                let stats = self.download_song(ids[0], progress).await?;
                builder.add_download(&stats);
                Ok(builder.build())
            }
            Target::Songs(ids) => {
                // Ordered, so duplicate titles are numbered in command-line order.
                let concurrency = self.downloader.config().concurrent_files.max(1);
                let lookups: Vec<_> = stream::iter(ids)
                    .map(|&id| async move { (id, self.api.song_detail(id).await) })
                    .buffered(concurrency)
                    .collect()
                    .await;

                let mut tracks = Vec::with_capacity(ids.len());
                let mut failed = SessionStatsBuilder::new();
                for (id, lookup) in lookups {
                    match lookup {
                        Ok(track) => tracks.push(track),
                        Err(e) => {
                            log::warn!("Song {id}: {e}");
                            progress.on_error(&id.to_string(), &e.to_string());
                            failed.add_failure(id.to_string(), &e);
                        }
                    }
                }
                let mut stats = self.download_tracks(&tracks, progress).await;
                stats.failures.extend(failed.build().failures);
                Ok(stats)
            }
            Target::Album(id) => self.download_album(*id, progress).await,
            Target::Playlist(id) => self.download_playlist(*id, progress).await,
        }
    }

    /// Resolves and downloads a single song.
    ///
    /// # Errors
    ///
    /// Returns the first failure: unknown id, rejection, or transfer error.
    pub async fn download_song(
        &self,
        id: u64,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<FileStats> {
        let track = self.api.song_detail(id).await?;
        log::info!("Resolved song {}", track.name);
        let (name, path) = FileNamer::new(&self.download_dir).claim(&track.name, track.id);
        self.fetch_track(&track, &name, &path, progress).await
    }

    /// Downloads every track of an album.
    ///
    /// # Errors
    ///
    /// Returns an error only if the album itself cannot be fetched.
    pub async fn download_album(
        &self,
        id: u64,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<SessionStats> {
        let album = self.api.album(id).await?;
        log::info!(
            "Album {} by {}: {} track(s)",
            album.name,
            album.artist.name,
            album.tracks.len()
        );
        Ok(self.download_tracks(&album.tracks, progress).await)
    }

    /// Downloads every track of a playlist.
    ///
    /// # Errors
    ///
    /// Returns an error only if the playlist itself cannot be fetched.
    pub async fn download_playlist(
        &self,
        id: u64,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<SessionStats> {
        let playlist = self.api.playlist(id).await?;
        log::info!(
            "Playlist {} by {}: {} track(s)",
            playlist.name,
            playlist.author.name,
            playlist.tracks.len()
        );
        Ok(self.download_tracks(&playlist.tracks, progress).await)
    }

    /// Resolves and downloads `tracks` concurrently and waits for all of them.
    pub async fn download_tracks(
        &self,
        tracks: &[Track],
        progress: &Arc<dyn DownloadProgress>,
    ) -> SessionStats {
        let mut builder = SessionStatsBuilder::new();
        if tracks.is_empty() {
            return builder.build();
        }

        let mut namer = FileNamer::new(&self.download_dir);
        let jobs: Vec<_> = tracks
            .iter()
            .map(|track| {
                let (name, path) = namer.claim(&track.name, track.id);
                (track, name, path)
            })
            .collect();

        let concurrency = self.downloader.config().concurrent_files.max(1);
        let results: Vec<_> = stream::iter(jobs)
            .map(|(track, name, path)| async move {
                let result = self.fetch_track(track, &name, &path, progress).await;
                (name, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (name, result) in results {
            match result {
                Ok(file_stats) => builder.add_download(&file_stats),
                Err(e) => builder.add_failure(name, &e),
            }
        }

        builder.build()
    }

    /// Resolves one track's URL and downloads it to `path`.
    async fn fetch_track(
        &self,
        track: &Track,
        name: &str,
        path: &Path,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<FileStats> {
        if track.need_pay || track.offline {
            log::debug!(
                "{name}: flagged need_pay={} offline={}, trying anyway",
                track.need_pay,
                track.offline
            );
        }

        let bitrate = self.downloader.config().bitrate;
        let url = match self.api.song_url(track.id, bitrate).await {
            Ok(url) => url,
            Err(e) => {
                log::warn!("{name}: {e}");
                progress.on_error(name, &e.to_string());
                return Err(e);
            }
        };

        self.downloader.download(name, &url, path, progress).await
    }
}
