/// Unified error types for the Discog system.
use thiserror::Error;

/// Top-level error type for the Discog system.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot determine channel for {0}")]
    ChannelUnresolved(String),

    #[error("No releases found for {0}")]
    EmptyCatalog(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("Index patch failed: {0}")]
    IndexPatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a metadata query produced no usable data.
///
/// Never crosses the metadata client boundary: callers only see
/// `MetadataLookup::Unavailable`.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Query exited with code {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("Query returned invalid JSON: {0}")]
    InvalidJson(String),
}

/// Errors from the external fetch invocation.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Fetch exited with code {0:?}")]
    Exited(Option<i32>),

    #[error("IO error while fetching: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a browser automation backend.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Driver protocol error [{code}]: {message}")]
    Protocol { code: String, message: String },

    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("Element click intercepted")]
    ClickIntercepted,

    #[error("Browser session is closed")]
    SessionClosed,
}

impl ScrapeError {
    /// Map a W3C WebDriver error payload (`{"error": .., "message": ..}`).
    pub fn from_driver_value(data: &serde_json::Value) -> Self {
        let code = data.get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        let message = data.get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        match code {
            "no such element" | "stale element reference" => {
                ScrapeError::NoSuchElement(message.to_string())
            }
            "element click intercepted" | "element not interactable" => ScrapeError::ClickIntercepted,
            "invalid session id" | "no such window" => ScrapeError::SessionClosed,
            _ => ScrapeError::Protocol {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    /// Whether the failure only means "not there (yet)".
    pub fn is_missing(&self) -> bool {
        matches!(self, ScrapeError::NoSuchElement(_))
    }
}

/// Result type alias for Discog operations.
pub type HarvestResult<T> = Result<T, HarvestError>;
