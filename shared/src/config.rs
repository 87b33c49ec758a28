/// Runtime configuration: environment settings and the persisted browser choice.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::HarvestResult;
use crate::models::CredentialSelection;
use crate::worker_pool::DEFAULT_POOL_WIDTH;

/// Probe the credential on every n-th release job.
pub const DEFAULT_PROBE_INTERVAL: usize = 5;

/// Settings read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub releases_dir: PathBuf,
    pub songs_dir: PathBuf,
    pub playlists_dir: PathBuf,
    pub ytdlp_bin: String,
    pub webdriver_url: String,
    pub max_concurrent_jobs: usize,
    pub probe_interval: usize,
    pub browser_config: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            releases_dir: PathBuf::from("YouTube_Releases"),
            songs_dir: PathBuf::from("YouTube_Songs"),
            playlists_dir: PathBuf::from("YouTube_Playlists"),
            ytdlp_bin: "yt-dlp".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            max_concurrent_jobs: DEFAULT_POOL_WIDTH,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            browser_config: PathBuf::from("browser.json"),
        }
    }
}

impl HarvestConfig {
    /// Read configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| get(key).map(PathBuf::from).unwrap_or(default);
        let count = |key: &str, default: usize| {
            get(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };

        Self {
            releases_dir: path("RELEASES_DIR", defaults.releases_dir),
            songs_dir: path("SONGS_DIR", defaults.songs_dir),
            playlists_dir: path("PLAYLISTS_DIR", defaults.playlists_dir),
            ytdlp_bin: get("YTDLP_BIN").unwrap_or(defaults.ytdlp_bin),
            webdriver_url: get("WEBDRIVER_URL").unwrap_or(defaults.webdriver_url),
            max_concurrent_jobs: count("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            probe_interval: count("CREDENTIAL_PROBE_INTERVAL", defaults.probe_interval),
            browser_config: path("BROWSER_CONFIG", defaults.browser_config),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BrowserFile {
    browser: String,
}

/// Persisted credential selection (`{"browser": "<name>"}`).
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the selection. Missing, malformed or unknown values mean `none`.
    pub fn load(&self) -> CredentialSelection {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => {
                debug!("No browser config at {:?}, using none", self.path);
                return CredentialSelection::None;
            }
        };

        match serde_json::from_str::<BrowserFile>(&content) {
            Ok(file) => file.browser.parse().unwrap_or_else(|e| {
                warn!("{} in {:?}, using none", e, self.path);
                CredentialSelection::None
            }),
            Err(e) => {
                warn!("Malformed browser config {:?}: {}", self.path, e);
                CredentialSelection::None
            }
        }
    }

    pub fn save(&self, selection: CredentialSelection) -> HarvestResult<()> {
        let body = serde_json::to_string(&BrowserFile {
            browser: selection.as_str().to_string(),
        })?;
        std::fs::write(&self.path, body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = HarvestConfig::from_lookup(|_| None);
        assert_eq!(config.releases_dir, PathBuf::from("YouTube_Releases"));
        assert_eq!(config.max_concurrent_jobs, 5);
        assert_eq!(config.probe_interval, 5);
        assert_eq!(config.ytdlp_bin, "yt-dlp");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RELEASES_DIR", "/data/releases"),
            ("MAX_CONCURRENT_JOBS", "8"),
            ("CREDENTIAL_PROBE_INTERVAL", "0"),
            ("YTDLP_BIN", "/opt/yt-dlp"),
        ]
        .into_iter()
        .collect();
        let config = HarvestConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.releases_dir, PathBuf::from("/data/releases"));
        assert_eq!(config.max_concurrent_jobs, 8);
        // zero is not a usable interval
        assert_eq!(config.probe_interval, 5);
        assert_eq!(config.ytdlp_bin, "/opt/yt-dlp");
    }

    #[test]
    fn test_credential_store_roundtrip_and_fallbacks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path().join("browser.json"));
        assert_eq!(store.load(), CredentialSelection::None);

        store.save(CredentialSelection::Firefox).unwrap();
        assert_eq!(store.load(), CredentialSelection::Firefox);
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            r#"{"browser":"firefox"}"#
        );

        std::fs::write(store.path(), r#"{"browser":"netscape"}"#).unwrap();
        assert_eq!(store.load(), CredentialSelection::None);

        std::fs::write(store.path(), "not json").unwrap();
        assert_eq!(store.load(), CredentialSelection::None);
    }
}
