// =============================================================================
// error.rs — EVERYTHING THAT CAN GO WRONG, SORTED BY HOW MUCH IT MATTERS
// =============================================================================
//
// Two layers:
//
// * FetchError is the collaborator's vocabulary. Whatever talks to the outside
//   world (the extraction service, a test closure) reports failure with it.
// * IngestError is the engine's vocabulary. A FetchError becomes one of these
//   at the job boundary, next to store failures, timeouts and a universe that
//   never showed up.
//
// Uniqueness collisions are deliberately absent from both. A filing we have
// already stored is not an error, it is Tuesday.
// =============================================================================

use thiserror::Error;

/// Failure reported by an external fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited by upstream service")]
    RateLimited,

    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Whether this failure says the remote service is unhealthy. Client
    /// errors and undecodable payloads do not.
    pub fn is_service_failure(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::RateLimited => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::CircuitOpen(_) | FetchError::Decode(_) | FetchError::Other(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Engine-level error.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("timed out after {secs:.1}s")]
    Timeout { entity: String, secs: f64 },

    #[error("job panicked")]
    JobPanicked { entity: String },

    #[error("universe unavailable: {0}")]
    UniverseUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_message_is_carried_into_ingest_error() {
        let err: IngestError = FetchError::Transport("connection reset".into()).into();
        assert_eq!(err.to_string(), "fetch failed: transport failure: connection reset");
    }

    #[test]
    fn test_only_server_side_statuses_are_service_failures() {
        let server = FetchError::Status { status: 503, body: String::new() };
        let client = FetchError::Status { status: 400, body: String::new() };
        assert!(server.is_service_failure());
        assert!(!client.is_service_failure());
        assert!(FetchError::RateLimited.is_service_failure());
    }

    #[test]
    fn test_timeout_message_mentions_seconds() {
        let err = IngestError::Timeout { entity: "ACME".into(), secs: 300.0 };
        assert_eq!(err.to_string(), "timed out after 300.0s");

        let short = IngestError::Timeout { entity: "ACME".into(), secs: 0.1 };
        assert_eq!(short.to_string(), "timed out after 0.1s");
    }
}
