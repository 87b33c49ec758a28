//! Shared types, naming rules, manifests and the worker pool for Discog.
pub mod config;
pub mod errors;
pub mod index;
pub mod manifest;
pub mod models;
pub mod naming;
pub mod worker_pool;

pub use errors::{HarvestError, HarvestResult};
pub use models::{Catalog, CatalogMetadata, CredentialSelection, MetadataEntry, MetadataLookup, ReleaseDescriptor};
