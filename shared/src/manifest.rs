/// Per-release track manifest (`tracks.txt`).
///
/// The same file is handed to yt-dlp as `--download-archive`, so it also
/// collects `youtube <id>` lines for every finished track. Those lines survive
/// a rewrite of the manifest, which is what makes re-runs skip finished work.
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{MetadataEntry, UNKNOWN_TRACK_TITLE};

/// File name of the manifest inside a release directory.
pub const MANIFEST_FILE: &str = "tracks.txt";

static ARCHIVE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^youtube ([A-Za-z0-9_-]{11})$").unwrap());

static VIDEO_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[?&]v=|youtu\.be/|/shorts/)([A-Za-z0-9_-]{11})").unwrap());

/// Render one numbered `<n>. <title>\n<url>\n\n` block.
pub fn numbered_block(index: usize, title: &str, url: &str) -> String {
    format!("{}. {}\n{}\n\n", index, title, url)
}

/// Extract an 11-character video id from a watch/short url.
pub fn video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE.captures(url).map(|c| c[1].to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTrack {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackManifest {
    pub title: String,
    pub source_url: String,
    pub tracks: Vec<ManifestTrack>,
}

impl TrackManifest {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            tracks: Vec::new(),
        }
    }

    /// Add tracks from a metadata listing, in order.
    pub fn with_entries(mut self, entries: &[MetadataEntry]) -> Self {
        for entry in entries {
            self.tracks.push(ManifestTrack {
                title: entry
                    .title
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TRACK_TITLE.to_string()),
                url: entry.url.clone().unwrap_or_default(),
            });
        }
        self
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}\n{}\n\n", self.title, self.source_url);
        for (i, track) in self.tracks.iter().enumerate() {
            out.push_str(&numbered_block(i + 1, &track.title, &track.url));
        }
        out
    }

    /// Write the manifest into `dir`, keeping archive lines already recorded there.
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = Self::path_in(dir);
        let archived = match std::fs::read_to_string(&path) {
            Ok(existing) => existing
                .lines()
                .filter(|l| ARCHIVE_LINE_RE.is_match(l))
                .map(|l| format!("{}\n", l))
                .collect::<String>(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };

        let mut body = self.render();
        body.push_str(&archived);
        std::fs::write(&path, body)?;
        Ok(path)
    }

    /// Source url recorded in the header of the manifest in `dir`, if any.
    pub fn source_url_in(dir: &Path) -> Option<String> {
        let content = std::fs::read_to_string(Self::path_in(dir)).ok()?;
        content
            .lines()
            .nth(1)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
    }

    /// Video ids recorded as finished in the manifest at `path`.
    pub fn archived_ids(path: &Path) -> HashSet<String> {
        std::fs::read_to_string(path)
            .map(|content| {
                content
                    .lines()
                    .filter_map(|l| ARCHIVE_LINE_RE.captures(l).map(|c| c[1].to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when every track of this manifest is already archived in `dir`.
    pub fn is_complete_in(&self, dir: &Path) -> bool {
        if self.tracks.is_empty() {
            return false;
        }
        let archived = Self::archived_ids(&Self::path_in(dir));
        self.tracks.iter().all(|t| {
            video_id(&t.url)
                .map(|id| archived.contains(&id))
                .unwrap_or(false)
        })
    }
}
