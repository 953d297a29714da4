//! Error types surfaced by the agent.

use thiserror::Error;

/// Failure of a single call against a registry endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The registry does not know this instance (heartbeat answered 404).
    /// Usually means the registry restarted and the instance must re-register.
    #[error("instance not found in registry")]
    NotFound,

    #[error("unexpected status {status}: {reason}")]
    UnexpectedStatus { status: u16, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    #[error("candidate url list is empty")]
    EmptyCandidates,

    #[error("unknown load balancing strategy: {0}")]
    UnknownStrategy(String),
}

/// Failure of an outbound call routed through the dispatch client.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid logical url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("logical url has no application name: {0}")]
    MissingApplication(String),

    #[error("application not known: {0}")]
    UnknownApplication(String),

    #[error(transparent)]
    Balance(#[from] BalanceError),

    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("{url} answered with status {status}")]
    Status { status: u16, url: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}
