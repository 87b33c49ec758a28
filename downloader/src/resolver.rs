/// Catalog resolution: metadata first, browser scraping as the last resort.
///
/// Strategy order is fixed: `<root>/releases`, then album/single playlists
/// from `<root>/playlists`, then the scraper. The first strategy that yields
/// at least one release wins and the rest are never consulted.
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use discog_shared::errors::{HarvestError, HarvestResult};
use discog_shared::index::write_index;
use discog_shared::models::{Catalog, CredentialSelection, MetadataEntry, ReleaseDescriptor, UNKNOWN_TITLE};
use discog_shared::naming::sanitize_channel_name;

use crate::metadata::MetadataClient;
use crate::scraper::{channel_handle, channel_root_url, ChannelScraper};

static RELEASE_PLAYLIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)album|single").unwrap());

/// Which strategy produced a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    Releases,
    Playlists,
    Scraper,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStrategy::Releases => write!(f, "releases tab"),
            ResolutionStrategy::Playlists => write!(f, "playlists tab"),
            ResolutionStrategy::Scraper => write!(f, "page scraper"),
        }
    }
}

/// Result of resolving one channel.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub catalog: Catalog,
    pub strategy: ResolutionStrategy,
    /// Name read from the channel page by the scraper.
    pub channel_name: Option<String>,
    /// `channel`/`uploader` reported by the metadata queries.
    pub metadata_channel: Option<String>,
    /// Index file written for this catalog, if any.
    pub index_path: Option<PathBuf>,
}

impl Resolution {
    /// Final channel name: scraped name, then metadata, then the url itself.
    pub fn resolve_channel_name(&self, channel_url: &str) -> HarvestResult<String> {
        resolve_channel_name(
            self.channel_name.as_deref(),
            self.metadata_channel.as_deref(),
            channel_url,
        )
    }
}

pub fn resolve_channel_name(
    scraped: Option<&str>,
    metadata: Option<&str>,
    channel_url: &str,
) -> HarvestResult<String> {
    scraped
        .map(sanitize_channel_name)
        .filter(|n| !n.is_empty())
        .or_else(|| metadata.map(sanitize_channel_name).filter(|n| !n.is_empty()))
        .or_else(|| channel_handle(channel_url).map(|h| sanitize_channel_name(&h)).filter(|n| !n.is_empty()))
        .ok_or_else(|| HarvestError::ChannelUnresolved(channel_url.to_string()))
}

/// Build a catalog from metadata entries. Entries without a url are dropped.
fn catalog_from_entries(entries: &[MetadataEntry], keep: impl Fn(Option<&str>) -> bool) -> Catalog {
    entries
        .iter()
        .filter(|e| keep(e.title.as_deref()))
        .filter_map(|e| {
            let url = e.url.as_deref().filter(|u| !u.is_empty())?;
            let title = e
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(UNKNOWN_TITLE);
            Some(ReleaseDescriptor::new(url, title))
        })
        .collect()
}

pub struct CatalogResolver {
    metadata: Arc<dyn MetadataClient>,
    scraper: Arc<dyn ChannelScraper>,
}

impl CatalogResolver {
    pub fn new(metadata: Arc<dyn MetadataClient>, scraper: Arc<dyn ChannelScraper>) -> Self {
        Self { metadata, scraper }
    }

    /// Resolve the catalog of `channel_url` and write its index into `output_dir`.
    pub async fn resolve(
        &self,
        channel_url: &str,
        credential: Option<CredentialSelection>,
        output_dir: &Path,
    ) -> HarvestResult<Resolution> {
        let root = channel_root_url(channel_url);

        let releases = self.metadata.fetch(&format!("{}/releases", root), credential).await;
        let mut metadata_channel = releases.found().and_then(|m| m.channel_name()).map(String::from);
        let mut resolution = {
            let catalog = catalog_from_entries(releases.entries(), |_| true);
            (!catalog.is_empty()).then_some((catalog, ResolutionStrategy::Releases, None))
        };

        if resolution.is_none() {
            debug!("No releases tab data for {}, trying playlists", root);
            let playlists = self.metadata.fetch(&format!("{}/playlists", root), credential).await;
            metadata_channel =
                metadata_channel.or_else(|| playlists.found().and_then(|m| m.channel_name()).map(String::from));
            let catalog = catalog_from_entries(playlists.entries(), |title| {
                title.map(|t| RELEASE_PLAYLIST_RE.is_match(t)).unwrap_or(false)
            });
            if !catalog.is_empty() {
                resolution = Some((catalog, ResolutionStrategy::Playlists, None));
            }
        }

        let (catalog, strategy, channel_name) = match resolution {
            Some(found) => found,
            None => {
                info!("Metadata queries found nothing for {}, falling back to the page scraper", root);
                let outcome = self.scraper.scrape(&root).await;
                (outcome.links, ResolutionStrategy::Scraper, outcome.channel_name)
            }
        };

        let index_path = if catalog.is_empty() {
            warn!("No releases found for {}", root);
            None
        } else {
            info!("Found {} releases for {} via {}", catalog.len(), root, strategy);
            Some(write_index(output_dir, &catalog).await?)
        };

        Ok(Resolution {
            catalog,
            strategy,
            channel_name,
            metadata_channel,
            index_path,
        })
    }
}

// ====== RELOCATION ======

/// Working directory for a channel whose final name is not known yet.
///
/// Always a fresh `.pending-<uuid>` folder, so no existing channel folder is
/// written to before the final name has been settled.
pub fn provisional_dir(releases_root: &Path) -> PathBuf {
    releases_root.join(format!(".pending-{}", Uuid::new_v4()))
}

/// Move `provisional` to `target`, merging into `target` if it already exists.
///
/// Files from `provisional` replace same-named files in `target`.
pub fn relocate(provisional: &Path, target: &Path) -> io::Result<PathBuf> {
    if provisional == target {
        return Ok(target.to_path_buf());
    }
    if !provisional.exists() {
        std::fs::create_dir_all(target)?;
        return Ok(target.to_path_buf());
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !target.exists() {
        std::fs::rename(provisional, target)?;
    } else {
        merge_dir(provisional, target)?;
        std::fs::remove_dir_all(provisional)?;
    }
    info!("Moved {:?} to {:?}", provisional, target);
    Ok(target.to_path_buf())
}

fn merge_dir(from: &Path, into: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = into.join(entry.file_name());
        if entry.file_type()?.is_dir() && dest.is_dir() {
            merge_dir(&entry.path(), &dest)?;
        } else if !dest.is_dir() {
            std::fs::rename(entry.path(), &dest)?;
        } else {
            warn!("Not replacing directory {:?} with file {:?}", dest, entry.path());
        }
    }
    Ok(())
}
