/// Channel-level release index (`albums.txt`) and its single-writer patcher.
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::{HarvestError, HarvestResult};
use crate::manifest::numbered_block;
use crate::models::{Catalog, UNKNOWN_TITLE};

/// File name of the index inside a channel directory.
pub const INDEX_FILE: &str = "albums.txt";

/// Render the numbered index for a catalog.
pub fn render_index(catalog: &Catalog) -> String {
    catalog
        .iter()
        .enumerate()
        .map(|(i, r)| numbered_block(i + 1, &r.title, &r.url))
        .collect()
}

/// Write `albums.txt` into `dir`, replacing any previous index.
pub async fn write_index(dir: &Path, catalog: &Catalog) -> HarvestResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(INDEX_FILE);
    tokio::fs::write(&path, render_index(catalog)).await?;
    debug!("Wrote index with {} entries to {:?}", catalog.len(), path);
    Ok(path)
}

/// Replace the `<n>. Unknown` line right before the line equal to `url`.
///
/// Returns `None` when there is nothing to patch.
pub fn patch_unknown_title(content: &str, url: &str, title: &str) -> Option<String> {
    let mut lines: Vec<String> = content.lines().map(String::from).collect();
    let pos = lines.iter().position(|l| l.trim() == url)?;
    if pos == 0 {
        return None;
    }

    let header = &lines[pos - 1];
    let (number, current) = header.split_once(". ")?;
    if number.parse::<usize>().is_err() || current != UNKNOWN_TITLE {
        return None;
    }

    lines[pos - 1] = format!("{}. {}", number, title);
    let mut patched = lines.join("\n");
    if content.ends_with('\n') {
        patched.push('\n');
    }
    Some(patched)
}

struct PatchRequest {
    url: String,
    title: String,
    reply: oneshot::Sender<HarvestResult<bool>>,
}

/// Serializes title patches of one index file through a single task.
///
/// Concurrent jobs call [`IndexPatcher::patch_title`]; the owning task performs
/// each read-modify-write in turn, so no update is lost.
#[derive(Clone)]
pub struct IndexPatcher {
    tx: mpsc::Sender<PatchRequest>,
}

impl IndexPatcher {
    /// Spawn the writer task for the index at `path`.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::channel::<PatchRequest>(32);

        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                let result = Self::apply(&path, &req.url, &req.title).await;
                if let Err(e) = &result {
                    warn!("Failed to patch index {:?} for {}: {}", path, req.url, e);
                }
                let _ = req.reply.send(result);
            }
            debug!("Index patcher for {:?} stopped", path);
        });

        Self { tx }
    }

    async fn apply(path: &Path, url: &str, title: &str) -> HarvestResult<bool> {
        let content = tokio::fs::read_to_string(path).await?;
        match patch_unknown_title(&content, url, title) {
            Some(patched) => {
                tokio::fs::write(path, patched).await?;
                debug!("Patched index title for {} -> {}", url, title);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record the now-known title of `url`. Returns whether a line changed.
    pub async fn patch_title(&self, url: &str, title: &str) -> HarvestResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PatchRequest {
                url: url.to_string(),
                title: title.to_string(),
                reply,
            })
            .await
            .map_err(|_| HarvestError::IndexPatch("patcher task stopped".into()))?;

        rx.await
            .map_err(|_| HarvestError::IndexPatch("patcher dropped the request".into()))?
    }
}
