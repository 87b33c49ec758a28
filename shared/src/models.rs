/// Data model shared across all Discog crates.
use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::HarvestError;

/// Title placeholder for releases discovered without a metadata call.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Title placeholder for manifest tracks without a title.
pub const UNKNOWN_TRACK_TITLE: &str = "Unknown Track";

/// One downloadable release (album, single or playlist) of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub url: String,
    pub title: String,
}

impl ReleaseDescriptor {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }

    /// Descriptor found by scraping: the title is not known yet.
    pub fn untitled(url: impl Into<String>) -> Self {
        Self::new(url, UNKNOWN_TITLE)
    }

    pub fn has_known_title(&self) -> bool {
        !self.title.is_empty() && self.title != UNKNOWN_TITLE
    }
}

/// Ordered, url-unique list of releases.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<ReleaseDescriptor>,
    seen: HashSet<String>,
}

impl PartialEq for Catalog {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Catalog {}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a release. Returns false if its url is already present.
    pub fn push(&mut self, release: ReleaseDescriptor) -> bool {
        if !self.seen.insert(release.url.clone()) {
            return false;
        }
        self.entries.push(release);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReleaseDescriptor> {
        self.entries.iter()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.entries.iter().map(|r| r.url.as_str()).collect()
    }
}

impl Extend<ReleaseDescriptor> for Catalog {
    fn extend<I: IntoIterator<Item = ReleaseDescriptor>>(&mut self, iter: I) {
        for release in iter {
            self.push(release);
        }
    }
}

impl FromIterator<ReleaseDescriptor> for Catalog {
    fn from_iter<I: IntoIterator<Item = ReleaseDescriptor>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        catalog.extend(iter);
        catalog
    }
}

impl IntoIterator for Catalog {
    type Item = ReleaseDescriptor;
    type IntoIter = std::vec::IntoIter<ReleaseDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a ReleaseDescriptor;
    type IntoIter = std::slice::Iter<'a, ReleaseDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Browser whose cookies are handed to the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSelection {
    Firefox,
    Chrome,
    Edge,
    Opera,
    #[default]
    None,
}

impl CredentialSelection {
    pub const ALL: [CredentialSelection; 5] = [
        CredentialSelection::Firefox,
        CredentialSelection::Chrome,
        CredentialSelection::Edge,
        CredentialSelection::Opera,
        CredentialSelection::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSelection::Firefox => "firefox",
            CredentialSelection::Chrome => "chrome",
            CredentialSelection::Edge => "edge",
            CredentialSelection::Opera => "opera",
            CredentialSelection::None => "none",
        }
    }

    pub fn is_none(&self) -> bool {
        *self == CredentialSelection::None
    }
}

impl std::fmt::Display for CredentialSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CredentialSelection {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CredentialSelection::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| HarvestError::Config(format!(
                "Unsupported browser '{}' (expected one of: firefox, chrome, edge, opera, none)",
                s.trim()
            )))
    }
}

// ====== METADATA ======

/// One entry of a metadata listing (a release or a track).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataEntry {
    pub title: Option<String>,
    pub url: Option<String>,
}

/// Typed view of a flat yt-dlp JSON dump.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogMetadata {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub uploader: Option<String>,
    pub entries: Vec<MetadataEntry>,
}

impl CatalogMetadata {
    /// Parse the output of `yt-dlp --flat-playlist -J`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawInfo = serde_json::from_str(json)?;
        Ok(raw.into())
    }

    /// Title if it is usable as a name (yt-dlp sometimes reports "null").
    pub fn usable_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "null")
    }

    /// Channel display name, preferring `channel` over `uploader`.
    pub fn channel_name(&self) -> Option<&str> {
        self.channel
            .as_deref()
            .or(self.uploader.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Result of a metadata query. Failures are never raised, only reported here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataLookup {
    Unavailable,
    Found(CatalogMetadata),
}

impl MetadataLookup {
    pub fn found(&self) -> Option<&CatalogMetadata> {
        match self {
            MetadataLookup::Found(meta) => Some(meta),
            MetadataLookup::Unavailable => None,
        }
    }

    pub fn into_found(self) -> Option<CatalogMetadata> {
        match self {
            MetadataLookup::Found(meta) => Some(meta),
            MetadataLookup::Unavailable => None,
        }
    }

    /// Entries of the listing, empty when unavailable.
    pub fn entries(&self) -> &[MetadataEntry] {
        self.found().map(|m| m.entries.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    /// yt-dlp emits `null` for entries it could not extract.
    #[serde(default)]
    entries: Option<Vec<Option<RawEntry>>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

impl RawEntry {
    fn resolved_url(&self) -> Option<String> {
        let direct = [&self.webpage_url, &self.url]
            .into_iter()
            .flatten()
            .find(|u| u.starts_with("http://") || u.starts_with("https://"));
        if let Some(url) = direct {
            return Some(url.clone());
        }

        let id = self.id.as_deref().filter(|id| !id.is_empty())?;
        if self.kind.as_deref() == Some("playlist") {
            Some(format!("https://www.youtube.com/playlist?list={}", id))
        } else {
            Some(format!("https://www.youtube.com/watch?v={}", id))
        }
    }
}

impl From<RawInfo> for CatalogMetadata {
    fn from(raw: RawInfo) -> Self {
        let entries = raw
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|e| MetadataEntry {
                url: e.resolved_url(),
                title: e.title,
            })
            .collect();

        CatalogMetadata {
            title: raw.title,
            channel: raw.channel,
            uploader: raw.uploader,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_rejects_duplicate_urls() {
        let mut catalog = Catalog::new();
        assert!(catalog.push(ReleaseDescriptor::new("https://a", "A")));
        assert!(!catalog.push(ReleaseDescriptor::new("https://a", "A again")));
        assert!(catalog.push(ReleaseDescriptor::untitled("https://b")));

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.urls(), vec!["https://a", "https://b"]);
        assert_eq!(catalog.iter().next().map(|r| r.title.as_str()), Some("A"));
    }

    #[test]
    fn test_credential_parse() {
        assert_eq!("Firefox".parse::<CredentialSelection>().unwrap(), CredentialSelection::Firefox);
        assert_eq!(" none ".parse::<CredentialSelection>().unwrap(), CredentialSelection::None);
        assert!("safari".parse::<CredentialSelection>().is_err());
        assert!(CredentialSelection::None.is_none());
        assert_eq!(CredentialSelection::Edge.to_string(), "edge");
    }

    #[test]
    fn test_metadata_from_flat_dump() {
        let json = r#"{
            "title": "Artist - Releases",
            "channel": "Artist",
            "entries": [
                {"_type": "url", "id": "OLAK5uy_abcdefghijk", "title": "First", "url": "https://www.youtube.com/playlist?list=OLAK5uy_abcdefghijk"},
                {"_type": "playlist", "id": "OLAK5uy_zzzzzzzzzzz", "title": "Second"},
                {"_type": "url", "id": "dQw4w9WgXcQ", "title": "Track", "url": "dQw4w9WgXcQ", "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}
            ]
        }"#;
        let meta = CatalogMetadata::from_json(json).unwrap();

        assert_eq!(meta.usable_title(), Some("Artist - Releases"));
        assert_eq!(meta.channel_name(), Some("Artist"));
        assert_eq!(meta.entries.len(), 3);
        assert_eq!(
            meta.entries[1].url.as_deref(),
            Some("https://www.youtube.com/playlist?list=OLAK5uy_zzzzzzzzzzz")
        );
        assert_eq!(
            meta.entries[2].url.as_deref(),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_null_title_is_not_usable() {
        let meta = CatalogMetadata::from_json(r#"{"title": "null", "uploader": "Someone"}"#).unwrap();
        assert_eq!(meta.usable_title(), None);
        assert_eq!(meta.channel_name(), Some("Someone"));
        assert!(meta.entries.is_empty());
    }
}
