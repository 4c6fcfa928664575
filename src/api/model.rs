//! Response records and their mapping to tracks, albums and playlists.

use serde::{Deserialize, Serialize};

/// Cover art sizes the web client requests.
const COVER_SMALL: &str = "140y140";
const COVER_NORMAL: &str = "250y250";
const COVER_BIG: &str = "400y400";

// ============================================================================
// Request payloads
// ============================================================================

/// Payload for `/song/enhance/player/url`.
#[derive(Debug, Clone, Serialize)]
pub struct SongUrlRequest {
    /// Track ids to resolve.
    pub ids: Vec<u64>,
    /// Requested bitrate.
    pub br: u32,
    /// Always empty for anonymous access.
    pub csrf_token: String,
}

/// Payload for `/v1/album/{id}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlbumRequest {
    /// Always empty for anonymous access.
    pub csrf_token: String,
}

/// Payload for `/v3/playlist/detail`.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistRequest {
    /// Playlist id.
    pub id: u64,
    /// Maximum number of tracks returned.
    pub n: u32,
    /// Always empty for anonymous access.
    pub csrf_token: String,
}

// ============================================================================
// Domain records
// ============================================================================

/// An artist credit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Artist {
    /// Artist id.
    #[serde(default)]
    pub id: u64,
    /// Artist name.
    #[serde(default)]
    pub name: String,
}

/// Cover art URLs in the three sizes the web client uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    /// 140×140.
    pub small: String,
    /// 250×250.
    pub normal: String,
    /// 400×400.
    pub big: String,
}

impl CoverArt {
    /// Builds sized HTTPS URLs from a raw `picUrl`.
    #[must_use]
    pub fn from_pic_url(pic_url: &str) -> Self {
        let base = pic_url.replacen("http://", "https://", 1);
        Self {
            small: format!("{base}?param={COVER_SMALL}"),
            normal: format!("{base}?param={COVER_NORMAL}"),
            big: format!("{base}?param={COVER_BIG}"),
        }
    }
}

/// Album a track belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRef {
    /// Album id.
    pub id: u64,
    /// Album title.
    pub name: String,
    /// Cover art, if the service sent one.
    pub cover: Option<CoverArt>,
}

/// A single track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Track id.
    pub id: u64,
    /// Title.
    pub name: String,
    /// Credited artists.
    pub artists: Vec<Artist>,
    /// Track costs money to stream (`fee > 0`).
    pub need_pay: bool,
    /// Track is currently unavailable (`privilege.st < 0`).
    pub offline: bool,
    /// Album, when known.
    pub album: Option<AlbumRef>,
}

/// An album with its tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    /// Album id.
    pub id: u64,
    /// Title.
    pub name: String,
    /// Cover art.
    pub cover: Option<CoverArt>,
    /// Album artist.
    pub artist: Artist,
    /// Best effort: copied from the first track. Tracks may differ.
    pub need_pay: bool,
    /// Best effort: copied from the first track. Tracks may differ.
    pub offline: bool,
    /// Tracks in album order.
    pub tracks: Vec<Track>,
}

/// Playlist owner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Creator {
    /// User id.
    #[serde(rename = "userId", default)]
    pub id: u64,
    /// Display name.
    #[serde(rename = "nickname", default)]
    pub name: String,
    /// Avatar URL.
    #[serde(rename = "avatarUrl", default)]
    pub avatar: Option<String>,
}

/// A playlist with its tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    /// Playlist id.
    pub id: u64,
    /// Title.
    pub name: String,
    /// Owner.
    pub author: Creator,
    /// Tracks in playlist order.
    pub tracks: Vec<Track>,
}

// ============================================================================
// Raw responses
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct RawPrivilege {
    #[serde(default)]
    pub st: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbumRef {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "picUrl", default)]
    pub pic_url: Option<String>,
}

impl From<RawAlbumRef> for AlbumRef {
    fn from(raw: RawAlbumRef) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            cover: raw.pic_url.as_deref().map(CoverArt::from_pic_url),
        }
    }
}

/// A song as sent by the detail, album and playlist endpoints. The legacy
/// detail endpoint uses `artists`/`album` where the newer ones use `ar`/`al`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawSong {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "ar", alias = "artists", default)]
    pub artists: Vec<Artist>,
    #[serde(rename = "al", alias = "album", default)]
    pub album: Option<RawAlbumRef>,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub privilege: Option<RawPrivilege>,
}

impl RawSong {
    /// Maps to a [`Track`]. `privilege` overrides the song's own privilege
    /// block (playlists send them in a parallel array).
    pub fn into_track(self, privilege: Option<RawPrivilege>) -> Track {
        let st = privilege.or(self.privilege).unwrap_or_default().st;
        Track {
            id: self.id,
            name: self.name,
            artists: self.artists,
            need_pay: self.fee > 0,
            offline: st < 0,
            album: self.album.map(AlbumRef::from),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SongDetailResponse {
    #[serde(default)]
    pub songs: Vec<RawSong>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SongUrlEntry {
    pub id: u64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SongUrlResponse {
    #[serde(default)]
    pub data: Vec<SongUrlEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbum {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "picUrl", default)]
    pub pic_url: Option<String>,
    #[serde(default = "unknown_artist")]
    pub artist: Artist,
}

fn unknown_artist() -> Artist {
    Artist {
        id: 0,
        name: String::new(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumResponse {
    pub album: RawAlbum,
    #[serde(default)]
    pub songs: Vec<RawSong>,
}

impl AlbumResponse {
    pub fn into_album(self) -> Album {
        let cover = self.album.pic_url.as_deref().map(CoverArt::from_pic_url);
        let album_ref = AlbumRef {
            id: self.album.id,
            name: self.album.name.clone(),
            cover: cover.clone(),
        };
        let tracks: Vec<Track> = self
            .songs
            .into_iter()
            .map(|song| {
                let mut track = song.into_track(None);
                track.album = Some(album_ref.clone());
                track
            })
            .collect();
        let (need_pay, offline) = tracks
            .first()
            .map_or((false, false), |t| (t.need_pay, t.offline));

        Album {
            id: self.album.id,
            name: self.album.name,
            cover,
            artist: self.album.artist,
            need_pay,
            offline,
            tracks,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPlaylist {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<RawSong>,
    pub creator: Creator,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistResponse {
    pub playlist: RawPlaylist,
    #[serde(default)]
    pub privileges: Vec<RawPrivilege>,
}

impl PlaylistResponse {
    pub fn into_playlist(self, id: u64) -> Playlist {
        let privileges = self.privileges;
        let tracks = self
            .playlist
            .tracks
            .into_iter()
            .enumerate()
            .map(|(i, song)| song.into_track(privileges.get(i).copied()))
            .collect();

        Playlist {
            id,
            name: self.playlist.name,
            author: self.playlist.creator,
            tracks,
        }
    }
}
