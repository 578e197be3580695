//! Error types for the management client and the collection cycle.

use thiserror::Error;

/// Errors fetching data from the management API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or timeout failure.
    #[error("Management API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status, including authentication failures.
    #[error("Management API returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    /// Response body is not the expected JSON.
    #[error("Failed to decode management API response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors aborting a collection cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The entity list (or the overview) could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Cardinality limiting is enabled but no total count was supplied.
    #[error("Total {kind} count missing while max_{kind}s is enabled")]
    TotalCountMissing { kind: &'static str },
}
