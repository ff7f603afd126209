use thiserror::Error;

/// Failures surfaced by the browsing session and the store.
///
/// Only [`ScrapeError::SessionLost`] ends a run; everything else degrades to
/// "no data for this page" or "this batch was not saved".
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out waiting for {url}")]
    Timeout { url: String },

    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScrapeError::SessionLost(_))
    }

    /// Sort a driver error into the taxonomy by its message.
    pub fn from_driver(url: &str, err: impl std::fmt::Display) -> Self {
        let reason = err.to_string();
        let lower = reason.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            ScrapeError::Timeout {
                url: url.to_string(),
            }
        } else if lower.contains("connection is closed")
            || lower.contains("channel closed")
            || lower.contains("no such target")
            || lower.contains("browser has closed")
        {
            ScrapeError::SessionLost(reason)
        } else {
            ScrapeError::Navigation {
                url: url.to_string(),
                reason,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_are_classified() {
        let e = ScrapeError::from_driver("https://a", "Timeout while waiting for event");
        assert!(matches!(e, ScrapeError::Timeout { .. }));
        assert!(!e.is_fatal());

        let e = ScrapeError::from_driver("https://a", "The connection is closed");
        assert!(e.is_fatal());

        let e = ScrapeError::from_driver("https://a", "net::ERR_NAME_NOT_RESOLVED");
        assert!(matches!(e, ScrapeError::Navigation { .. }));
    }
}
