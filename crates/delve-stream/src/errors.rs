//! Stream error types.

use thiserror::Error;

/// Errors raised by the streaming layer.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend refused the stream-open request.
    #[error("stream rejected (status {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, or a placeholder when unreadable.
        message: String,
    },

    /// The SSE transport broke mid-stream.
    #[error("stream transport error: {0}")]
    Transport(#[from] eventsource_stream::EventStreamError<reqwest::Error>),

    /// Persistence failed underneath the run loop.
    #[error(transparent)]
    Store(#[from] delve_store::StoreError),
}

/// Result alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
