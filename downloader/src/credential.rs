/// Browser credential selection and its liveness probe.
use tracing::{info, warn};

use discog_shared::models::{CatalogMetadata, CredentialSelection, MetadataLookup};

use crate::metadata::MetadataClient;

/// Outcome of a credential liveness probe for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Credential works; the probe's metadata can be reused.
    Valid(CatalogMetadata),
    /// Credential no longer works for this job.
    Stale,
}

/// Resolves the configured browser profile into an optional cookie source.
///
/// The selection is fixed at construction. Probes only inform the caller's
/// per-job decision and never change the configured value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialProvider {
    selection: CredentialSelection,
}

impl CredentialProvider {
    pub fn new(selection: CredentialSelection) -> Self {
        Self { selection }
    }

    pub fn has_credential(&self) -> bool {
        !self.selection.is_none()
    }

    /// Credential to pass along, if one is configured.
    pub fn active(&self) -> Option<CredentialSelection> {
        self.has_credential().then_some(self.selection)
    }

    /// Re-check the credential with a trial metadata fetch of `url`.
    pub async fn probe(&self, client: &dyn MetadataClient, url: &str) -> ProbeOutcome {
        let Some(credential) = self.active() else {
            return ProbeOutcome::Stale;
        };

        info!("Reloading cookies from {} for {}", credential, url);
        match client.fetch(url, Some(credential)).await {
            MetadataLookup::Found(meta) => ProbeOutcome::Valid(meta),
            MetadataLookup::Unavailable => {
                warn!("Cookies from {} are no longer valid, continuing without cookies for {}", credential, url);
                ProbeOutcome::Stale
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedClient {
        answer: MetadataLookup,
        calls: Mutex<Vec<Option<CredentialSelection>>>,
    }

    #[async_trait]
    impl MetadataClient for ScriptedClient {
        async fn fetch(&self, _url: &str, credential: Option<CredentialSelection>) -> MetadataLookup {
            self.calls.lock().unwrap().push(credential);
            self.answer.clone()
        }
    }

    #[test]
    fn test_none_means_no_credential() {
        let provider = CredentialProvider::new(CredentialSelection::None);
        assert!(!provider.has_credential());
        assert_eq!(provider.active(), None);

        let firefox = CredentialProvider::new(CredentialSelection::Firefox);
        assert_eq!(firefox.active(), Some(CredentialSelection::Firefox));
    }

    #[tokio::test]
    async fn test_probe_uses_configured_browser() {
        let client = ScriptedClient {
            answer: MetadataLookup::Found(CatalogMetadata::default()),
            calls: Mutex::new(Vec::new()),
        };
        let provider = CredentialProvider::new(CredentialSelection::Opera);

        assert!(matches!(provider.probe(&client, "u").await, ProbeOutcome::Valid(_)));
        assert_eq!(*client.calls.lock().unwrap(), vec![Some(CredentialSelection::Opera)]);
    }

    #[tokio::test]
    async fn test_failed_probe_is_stale_but_keeps_selection() {
        let client = ScriptedClient {
            answer: MetadataLookup::Unavailable,
            calls: Mutex::new(Vec::new()),
        };
        let provider = CredentialProvider::new(CredentialSelection::Edge);

        assert_eq!(provider.probe(&client, "u").await, ProbeOutcome::Stale);
        assert_eq!(provider.active(), Some(CredentialSelection::Edge));
    }
}
