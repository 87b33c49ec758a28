/// Concurrent download of a resolved catalog, plus single song/playlist modes.
///
/// Each release job runs through the same steps: optional credential probe,
/// metadata fetch, title fallback, directory claim, manifest write, index
/// patch and finally the fetch itself. Jobs never share mutable state except
/// through the filesystem and the [`IndexPatcher`].
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use discog_shared::config::DEFAULT_PROBE_INTERVAL;
use discog_shared::errors::HarvestResult;
use discog_shared::index::IndexPatcher;
use discog_shared::manifest::{video_id, TrackManifest};
use discog_shared::models::{Catalog, CatalogMetadata, CredentialSelection, ReleaseDescriptor};
use discog_shared::naming::{claim_release_dir, dir_name_for, fallback_title};
use discog_shared::worker_pool::{PoolReport, WorkerPool, DEFAULT_POOL_WIDTH};

use crate::credential::{CredentialProvider, ProbeOutcome};
use crate::fetch::{FetchRequest, FetchTool};
use crate::metadata::MetadataClient;

/// Folder title for playlists without a usable title.
pub const UNKNOWN_PLAYLIST_TITLE: &str = "Unknown_Playlist";

pub struct DownloadOrchestrator {
    metadata: Arc<dyn MetadataClient>,
    fetcher: Arc<dyn FetchTool>,
    credential: CredentialProvider,
    width: usize,
    probe_interval: usize,
}

/// Everything a release job needs, shared by all workers of one batch.
struct ReleaseJobs {
    metadata: Arc<dyn MetadataClient>,
    fetcher: Arc<dyn FetchTool>,
    credential: CredentialProvider,
    probe_interval: usize,
    root: PathBuf,
    index: Option<IndexPatcher>,
}

impl DownloadOrchestrator {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        fetcher: Arc<dyn FetchTool>,
        credential: CredentialProvider,
    ) -> Self {
        Self {
            metadata,
            fetcher,
            credential,
            width: DEFAULT_POOL_WIDTH,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn with_probe_interval(mut self, interval: usize) -> Self {
        self.probe_interval = interval.max(1);
        self
    }

    pub fn credential(&self) -> &CredentialProvider {
        &self.credential
    }

    /// Download every release of `catalog` into its own directory under `root`.
    pub async fn download_catalog(
        &self,
        catalog: Catalog,
        root: &Path,
        index: Option<IndexPatcher>,
    ) -> PoolReport {
        info!(
            "Downloading {} releases into {:?} with {} workers",
            catalog.len(),
            root,
            self.width
        );

        let ctx = Arc::new(ReleaseJobs {
            metadata: self.metadata.clone(),
            fetcher: self.fetcher.clone(),
            credential: self.credential,
            probe_interval: self.probe_interval,
            root: root.to_path_buf(),
            index,
        });

        let jobs = catalog.into_iter().map(|release| (release.url.clone(), release));
        WorkerPool::new(self.width)
            .run(jobs, move |index, release| {
                let ctx = ctx.clone();
                async move { ctx.process(index, release).await }
            })
            .await
    }

    /// Fetch one song into `dir`. No manifest, no playlist expansion.
    pub async fn download_song(&self, url: &str, dir: &Path) -> HarvestResult<()> {
        tokio::fs::create_dir_all(dir).await?;
        self.fetcher
            .fetch(&FetchRequest {
                url: url.to_string(),
                output_dir: dir.to_path_buf(),
                archive: None,
                credential: self.credential.active(),
                expand_playlist: false,
            })
            .await?;
        Ok(())
    }

    /// Download a playlist into `root/<title>`, one pool job per track.
    ///
    /// The credential is decided once for the whole run.
    pub async fn download_playlist(&self, url: &str, root: &Path) -> HarvestResult<PoolReport> {
        let credential = self.credential.active();
        let meta = self
            .metadata
            .fetch(url, credential)
            .await
            .into_found()
            .unwrap_or_default();
        let title = meta
            .usable_title()
            .map(String::from)
            .unwrap_or_else(|| UNKNOWN_PLAYLIST_TITLE.to_string());

        let name = dir_name_for(&title).unwrap_or_else(|| UNKNOWN_PLAYLIST_TITLE.to_string());
        let dir = root.join(&name);
        tokio::fs::create_dir_all(&dir).await?;
        let manifest = TrackManifest::new(&name, url).with_entries(&meta.entries);
        let archive = manifest.write_to(&dir)?;

        if manifest.is_complete_in(&dir) {
            info!("All {} tracks of '{}' already downloaded, skipping", manifest.tracks.len(), title);
            return Ok(PoolReport::default());
        }

        let archived = TrackManifest::archived_ids(&archive);
        let tracks: Vec<String> = manifest
            .tracks
            .iter()
            .map(|t| t.url.clone())
            .filter(|u| !u.is_empty())
            .filter(|u| video_id(u).map_or(true, |id| !archived.contains(&id)))
            .collect();
        let expand_playlist = manifest.tracks.is_empty();
        let targets = if expand_playlist { vec![url.to_string()] } else { tracks };

        info!("Downloading playlist '{}' ({} jobs) into {:?}", title, targets.len(), dir);
        let fetcher = self.fetcher.clone();
        let jobs = targets.into_iter().map(|u| (u.clone(), u));
        let report = WorkerPool::new(self.width)
            .run(jobs, move |_, track_url| {
                let fetcher = fetcher.clone();
                let request = FetchRequest {
                    url: track_url,
                    output_dir: dir.clone(),
                    archive: Some(archive.clone()),
                    credential,
                    expand_playlist,
                };
                async move {
                    fetcher
                        .fetch(&request)
                        .await
                        .with_context(|| format!("fetching {}", request.url))
                }
            })
            .await;
        Ok(report)
    }
}

impl ReleaseJobs {
    async fn process(&self, index: usize, release: ReleaseDescriptor) -> anyhow::Result<()> {
        let (credential, probed) = self.decide_credential(index, &release.url).await;

        let meta = match probed {
            Some(meta) => meta,
            None => self
                .metadata
                .fetch(&release.url, credential)
                .await
                .into_found()
                .unwrap_or_default(),
        };

        let fetched_title = meta.usable_title().map(String::from);
        let title = fetched_title
            .clone()
            .or_else(|| release.has_known_title().then(|| release.title.clone()))
            .unwrap_or_else(|| fallback_title(Utc::now()));

        let name = dir_name_for(&title).unwrap_or_else(|| fallback_title(Utc::now()));
        let dir = claim_release_dir(&self.root, &name, &release.url)
            .with_context(|| format!("creating directory for '{}'", title))?;
        let manifest = TrackManifest::new(&name, &release.url).with_entries(&meta.entries);
        let archive = manifest
            .write_to(&dir)
            .with_context(|| format!("writing manifest in {:?}", dir))?;

        if let (Some(patcher), Some(known), false) = (&self.index, &fetched_title, release.has_known_title()) {
            if let Err(e) = patcher.patch_title(&release.url, known).await {
                warn!("Could not record title '{}' for {}: {}", known, release.url, e);
            }
        }

        if manifest.is_complete_in(&dir) {
            info!("Release '{}' already complete in {:?}, skipping", title, dir);
            return Ok(());
        }

        info!("Release #{} '{}' -> {:?}", index + 1, title, dir);
        self.fetcher
            .fetch(&FetchRequest {
                url: release.url.clone(),
                output_dir: dir,
                archive: Some(archive),
                credential,
                expand_playlist: true,
            })
            .await
            .with_context(|| format!("fetching '{}'", title))
    }

    /// Per-job credential: every n-th job re-checks it first and drops it for
    /// this job only if the check fails.
    async fn decide_credential(
        &self,
        index: usize,
        url: &str,
    ) -> (Option<CredentialSelection>, Option<CatalogMetadata>) {
        let credential = self.credential.active();
        if credential.is_none() || index % self.probe_interval != 0 {
            return (credential, None);
        }
        match self.credential.probe(self.metadata.as_ref(), url).await {
            ProbeOutcome::Valid(meta) => (credential, Some(meta)),
            ProbeOutcome::Stale => (None, None),
        }
    }
}
