//! Error types for ipgeo.

use std::time::Duration;

use thiserror::Error;

/// Error type for ipgeo operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No database has been loaded yet. Returned by lookups on a
    /// URL-backed store while the first download is still in flight.
    #[error("no database available")]
    Unavailable,

    /// Structural decode error from the underlying MaxMind DB reader.
    #[error("database error: {0}")]
    Database(#[from] maxminddb::MaxMindDBError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected HTTP status from the remote database source.
    #[error("unexpected HTTP status: {0}")]
    HttpStatus(u16),

    /// HTTP transport error while probing or downloading.
    #[error("HTTP error: {0}")]
    Http(#[from] Box<ureq::Error>),

    /// Filesystem watch setup error.
    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A refresh attempt failed and will be retried after a delay.
    #[error("update failed (will retry in {retry_in:?}): {source}")]
    UpdateRetry {
        retry_in: Duration,
        #[source]
        source: Box<Error>,
    },

    /// Redis rate limit backend error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Memcache rate limit backend error.
    #[error("memcache error: {0}")]
    Memcache(#[from] memcache::MemcacheError),

    /// The rate limit backend is unreachable and the block policy is in
    /// effect. Maps to a "try again later" response.
    #[error("rate limit backend unavailable: {0}")]
    BackendUnavailable(#[source] Box<Error>),
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, _) => Error::HttpStatus(code),
            other => Error::Http(Box::new(other)),
        }
    }
}

/// Result type alias for ipgeo operations.
pub type Result<T> = std::result::Result<T, Error>;
