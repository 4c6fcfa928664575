//! Output file names for tracks.
//!
//! Track titles come straight from the service and may contain path
//! separators or characters Windows refuses. Two tracks in one session may
//! also share a title (live and studio versions, remixes without suffixes).
//! [`FileNamer`] turns titles into safe, session-unique `.mp3` names.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Extension given to every downloaded track.
pub const TRACK_EXTENSION: &str = "mp3";

/// Upper bound on the stem length in characters; leaves room for a suffix
/// and extension inside common 255-byte limits.
const MAX_STEM_CHARS: usize = 180;

/// Device names Windows reserves regardless of extension.
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Appends `_` to a reserved device name, keeping anything after the first dot.
fn escape_reserved(name: &str) -> Option<String> {
    let split = name.find('.').unwrap_or(name.len());
    let stem = name[..split].trim_end();
    RESERVED_STEMS
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
        .then(|| format!("{stem}_{}", &name[split..]))
}

/// Replaces characters that are unsafe in file names with `_`.
///
/// Control characters, path separators and `<>:"|?*` are replaced; trailing
/// dots and spaces are trimmed. Reserved device names (`CON`, `NUL`, `COM1`,
/// ...) get a `_` after the device name. Returns `None` if nothing printable remains.
#[must_use]
pub fn sanitize(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STEM_CHARS)
        .collect();

    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_' || c == '.') {
        None
    } else {
        Some(escape_reserved(trimmed).unwrap_or_else(|| trimmed.to_string()))
    }
}

/// Hands out unique file names inside one download directory.
#[derive(Debug)]
pub struct FileNamer {
    dir: PathBuf,
    taken: HashSet<String>,
}

impl FileNamer {
    /// Creates a namer for files placed in `dir`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            taken: HashSet::new(),
        }
    }

    /// Claims a name for a track and returns `(display_name, path)`.
    ///
    /// The display name is the final stem, so it is unique among the names
    /// this namer returned. Collisions are compared case-insensitively and
    /// resolved with ` (2)`, ` (3)`, ... suffixes.
    pub fn claim(&mut self, title: &str, id: u64) -> (String, PathBuf) {
        let base = sanitize(title).unwrap_or_else(|| format!("track-{id}"));

        let mut stem = base.clone();
        let mut n = 1;
        while !self.taken.insert(stem.to_lowercase()) {
            n += 1;
            stem = format!("{base} ({n})");
        }
        if n > 1 {
            log::warn!("File name collision for \"{base}\", using \"{stem}\"");
        }

        let path = self.dir.join(format!("{stem}.{TRACK_EXTENSION}"));
        (stem, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_titles_pass_through() {
        assert_eq!(sanitize("晴天").as_deref(), Some("晴天"));
        assert_eq!(sanitize("Song 2").as_deref(), Some("Song 2"));
    }

    #[test]
    fn separators_are_replaced() {
        assert_eq!(sanitize("AC/DC: Live?").as_deref(), Some("AC_DC_ Live_"));
        assert_eq!(sanitize("..\\..\\etc").as_deref(), Some(".._.._etc"));
    }

    #[test]
    fn trailing_dots_are_trimmed() {
        assert_eq!(sanitize("Wait...").as_deref(), Some("Wait"));
        assert_eq!(sanitize("  padded  ").as_deref(), Some("padded"));
    }

    #[test]
    fn reserved_device_names_are_escaped() {
        assert_eq!(sanitize("CON").as_deref(), Some("CON_"));
        assert_eq!(sanitize("nul").as_deref(), Some("nul_"));
        assert_eq!(sanitize("Com1.live").as_deref(), Some("Com1_.live"));
        assert_eq!(sanitize("Console").as_deref(), Some("Console"));
        assert_eq!(sanitize("LPT10").as_deref(), Some("LPT10"));

        let mut namer = FileNamer::new(Path::new("out"));
        assert_eq!(namer.claim("aux", 1).1, PathBuf::from("out/aux_.mp3"));
    }

    #[test]
    fn empty_or_unprintable_titles_fall_back() {
        assert_eq!(sanitize(""), None);
        assert_eq!(sanitize("///"), None);
        assert_eq!(sanitize("\u{0}\u{1}"), None);

        let mut namer = FileNamer::new(Path::new("out"));
        let (name, path) = namer.claim("", 42);
        assert_eq!(name, "track-42");
        assert_eq!(path, PathBuf::from("out/track-42.mp3"));
    }

    #[test]
    fn collisions_get_numbered() {
        let mut namer = FileNamer::new(Path::new("out"));
        assert_eq!(namer.claim("Intro", 1).0, "Intro");
        assert_eq!(namer.claim("Intro", 2).0, "Intro (2)");
        assert_eq!(namer.claim("intro", 3).0, "intro (3)");
        assert_eq!(namer.claim("Outro", 4).1, PathBuf::from("out/Outro.mp3"));
    }

    #[test]
    fn long_titles_are_capped() {
        let title = "a".repeat(1000);
        assert_eq!(sanitize(&title).unwrap().chars().count(), MAX_STEM_CHARS);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sanitized_names_have_no_separators(title in ".{0,300}") {
                if let Some(name) = sanitize(&title) {
                    prop_assert!(!name.contains('/'));
                    prop_assert!(!name.contains('\\'));
                    prop_assert!(!name.chars().any(char::is_control));
                    prop_assert!(!name.ends_with('.'));
                    prop_assert!(!name.is_empty());
                }
            }

            #[test]
            fn claimed_names_are_unique(titles in proptest::collection::vec("[a-cA-C]{0,2}", 1..40)) {
                let mut namer = FileNamer::new(Path::new("d"));
                let mut seen = HashSet::new();
                for (i, t) in titles.iter().enumerate() {
                    let (name, _) = namer.claim(t, i as u64);
                    prop_assert!(seen.insert(name.to_lowercase()));
                }
            }
        }
    }
}
