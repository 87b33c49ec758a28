/// Top-level flows behind the `discog` commands.
///
/// `harvest_channel` ties resolution and bulk download together: the catalog
/// is resolved into a provisional directory, the channel name is settled,
/// the directory is moved to its final place and only then do downloads start.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use discog_shared::config::HarvestConfig;
use discog_shared::errors::{HarvestError, HarvestResult};
use discog_shared::index::{IndexPatcher, INDEX_FILE};
use discog_shared::models::CredentialSelection;
use discog_shared::worker_pool::PoolReport;

use crate::credential::CredentialProvider;
use crate::fetch::{FetchTool, YtDlpFetcher};
use crate::metadata::{MetadataClient, YtDlpMetadataClient};
use crate::orchestrator::DownloadOrchestrator;
use crate::resolver::{provisional_dir, relocate, CatalogResolver, ResolutionStrategy};
use crate::scraper::{CatalogScraper, ChannelScraper, WebDriverLauncher};

/// Summary of one channel run.
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel_name: String,
    pub directory: PathBuf,
    pub strategy: ResolutionStrategy,
    pub releases: usize,
    pub pool: PoolReport,
}

pub struct Harvester {
    resolver: CatalogResolver,
    orchestrator: DownloadOrchestrator,
    releases_dir: PathBuf,
    songs_dir: PathBuf,
    playlists_dir: PathBuf,
}

impl Harvester {
    pub fn new(
        resolver: CatalogResolver,
        orchestrator: DownloadOrchestrator,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            resolver,
            orchestrator,
            releases_dir: config.releases_dir.clone(),
            songs_dir: config.songs_dir.clone(),
            playlists_dir: config.playlists_dir.clone(),
        }
    }

    /// Wire the yt-dlp and WebDriver backends from configuration.
    pub fn from_config(config: &HarvestConfig, selection: CredentialSelection) -> Self {
        let metadata: Arc<dyn MetadataClient> = Arc::new(YtDlpMetadataClient::new(&config.ytdlp_bin));
        let fetcher: Arc<dyn FetchTool> = Arc::new(YtDlpFetcher::new(&config.ytdlp_bin));
        let scraper: Arc<dyn ChannelScraper> = Arc::new(CatalogScraper::new(Arc::new(
            WebDriverLauncher::new(&config.webdriver_url),
        )));

        let resolver = CatalogResolver::new(metadata.clone(), scraper);
        let orchestrator = DownloadOrchestrator::new(metadata, fetcher, CredentialProvider::new(selection))
            .with_width(config.max_concurrent_jobs)
            .with_probe_interval(config.probe_interval);
        Self::new(resolver, orchestrator, config)
    }

    /// Resolve a channel's catalog and download every release of it.
    pub async fn harvest_channel(&self, url: &str) -> HarvestResult<ChannelReport> {
        let provisional = provisional_dir(&self.releases_dir);
        let credential = self.orchestrator.credential().active();

        let resolution = match self.resolver.resolve(url, credential, &provisional).await {
            Ok(resolution) => resolution,
            Err(e) => {
                discard_pending(&provisional);
                return Err(e);
            }
        };

        let channel_name = match resolution.resolve_channel_name(url) {
            Ok(name) => name,
            Err(e) => {
                discard_pending(&provisional);
                return Err(e);
            }
        };
        if resolution.catalog.is_empty() {
            discard_pending(&provisional);
            return Err(HarvestError::EmptyCatalog(url.to_string()));
        }
        let directory = match relocate(&provisional, &self.releases_dir.join(&channel_name)) {
            Ok(directory) => directory,
            Err(e) => {
                discard_pending(&provisional);
                return Err(e.into());
            }
        };

        info!(
            "Channel '{}': {} releases via {}",
            channel_name,
            resolution.catalog.len(),
            resolution.strategy
        );
        let patcher = IndexPatcher::spawn(directory.join(INDEX_FILE));
        let releases = resolution.catalog.len();
        let pool = self
            .orchestrator
            .download_catalog(resolution.catalog, &directory, Some(patcher))
            .await;

        Ok(ChannelReport {
            channel_name,
            directory,
            strategy: resolution.strategy,
            releases,
            pool,
        })
    }

    pub async fn download_song(&self, url: &str) -> HarvestResult<()> {
        self.orchestrator.download_song(url, &self.songs_dir).await
    }

    pub async fn download_playlist(&self, url: &str) -> HarvestResult<PoolReport> {
        self.orchestrator.download_playlist(url, &self.playlists_dir).await
    }
}

/// Remove a `.pending-*` directory left by a run that could not be named.
fn discard_pending(dir: &Path) {
    let pending = dir
        .file_name()
        .map(|n| n.to_string_lossy().starts_with(".pending-"))
        .unwrap_or(false);
    if pending && dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!("Could not remove {:?}: {}", dir, e);
        }
    }
}
