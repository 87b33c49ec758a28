//! Discog downloader: channel catalog resolution and concurrent downloads.
pub mod credential;
pub mod fetch;
pub mod harvester;
pub mod metadata;
pub mod orchestrator;
pub mod resolver;
pub mod scraper;

pub use harvester::{ChannelReport, Harvester};
