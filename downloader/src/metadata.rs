/// Structured catalog metadata from a flat `yt-dlp -J` query.
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use discog_shared::errors::MetadataError;
use discog_shared::models::{CatalogMetadata, CredentialSelection, MetadataLookup};

/// Source of catalog metadata for a URL.
///
/// Implementations never fail: anything that goes wrong is reported as
/// [`MetadataLookup::Unavailable`].
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn fetch(&self, url: &str, credential: Option<CredentialSelection>) -> MetadataLookup;
}

/// Append `--cookies-from-browser <name>` when a browser credential is in use.
pub fn push_cookie_args(args: &mut Vec<String>, credential: Option<CredentialSelection>) {
    if let Some(browser) = credential.filter(|c| !c.is_none()) {
        args.push("--cookies-from-browser".to_string());
        args.push(browser.as_str().to_string());
    }
}

/// Metadata client backed by the `yt-dlp` binary.
pub struct YtDlpMetadataClient {
    binary: String,
}

impl YtDlpMetadataClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Arguments for a flat, non-recursive JSON dump of `url`.
    pub fn build_args(url: &str, credential: Option<CredentialSelection>) -> Vec<String> {
        let mut args = vec!["--flat-playlist".to_string(), "-J".to_string()];
        push_cookie_args(&mut args, credential);
        args.push(url.to_string());
        args
    }

    async fn query(
        &self,
        url: &str,
        credential: Option<CredentialSelection>,
    ) -> Result<CatalogMetadata, MetadataError> {
        let output = Command::new(&self.binary)
            .args(Self::build_args(url, credential))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MetadataError::SpawnFailed {
                program: self.binary.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MetadataError::Exited {
                code: output.status.code(),
                stderr: stderr.lines().last().unwrap_or_default().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        CatalogMetadata::from_json(&stdout).map_err(|e| MetadataError::InvalidJson(e.to_string()))
    }
}

impl Default for YtDlpMetadataClient {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl MetadataClient for YtDlpMetadataClient {
    async fn fetch(&self, url: &str, credential: Option<CredentialSelection>) -> MetadataLookup {
        match self.query(url, credential).await {
            Ok(meta) => {
                debug!("Metadata for {}: {} entries", url, meta.entries.len());
                MetadataLookup::Found(meta)
            }
            Err(e) => {
                debug!("Metadata unavailable for {}: {}", url, e);
                MetadataLookup::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_without_credential() {
        let args = YtDlpMetadataClient::build_args("https://www.youtube.com/@artist/releases", None);
        assert_eq!(args, vec!["--flat-playlist", "-J", "https://www.youtube.com/@artist/releases"]);

        let none = YtDlpMetadataClient::build_args("u", Some(CredentialSelection::None));
        assert!(!none.contains(&"--cookies-from-browser".to_string()));
    }

    #[test]
    fn test_build_args_with_credential() {
        let args = YtDlpMetadataClient::build_args("u", Some(CredentialSelection::Chrome));
        assert_eq!(args, vec!["--flat-playlist", "-J", "--cookies-from-browser", "chrome", "u"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let client = YtDlpMetadataClient::new("/nonexistent/discog-yt-dlp");
        let lookup = client.fetch("https://www.youtube.com/@artist", None).await;
        assert_eq!(lookup, MetadataLookup::Unavailable);
    }
}
