//! Error types for cache, lock and remote-store operations.
//!
//! A cache miss is never an error: lookups return `Option::None`. Everything
//! in [`CacheError`] is either a recoverable coordination outcome
//! (`RemoteUnavailable`, `LockTimeout`) or a bug surfaced immediately
//! (`Serialization`, `Configuration`).

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`RemoteStore`](crate::remote::RemoteStore) backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("connection to remote store failed: {0}")]
    Connection(String),

    #[error("unexpected response from remote store: {0}")]
    Response(String),
}

/// Errors surfaced by the cache engine.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The shared store could not be reached within its own timeout.
    #[error("remote store unavailable during {operation}: {source}")]
    RemoteUnavailable {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    /// `try_acquire` did not obtain the lock within the wait time.
    #[error("timed out after {waited:?} waiting for lock {key}")]
    LockTimeout { key: String, waited: Duration },

    /// The lock service itself failed. Never treated as "not acquired".
    #[error("lock service failed for {key}: {source}")]
    LockAcquisition {
        key: String,
        #[source]
        source: RemoteError,
    },

    /// A value could not be encoded or decoded.
    #[error("serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    /// Invalid cache configuration, raised when the cache is created.
    #[error("invalid configuration for cache {cache}: {reason}")]
    Configuration { cache: String, reason: String },

    /// The caller-supplied loader failed.
    #[error("loader failed for {key}: {source}")]
    Loader {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CacheError {
    pub(crate) fn remote(operation: &'static str, source: RemoteError) -> Self {
        CacheError::RemoteUnavailable { operation, source }
    }

    pub(crate) fn configuration(cache: &str, reason: impl Into<String>) -> Self {
        CacheError::Configuration {
            cache: cache.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn serialization(key: &str, reason: impl ToString) -> Self {
        CacheError::Serialization {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wraps an application error raised inside a loader.
    pub fn loader<E>(key: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CacheError::Loader {
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, CacheError::RemoteUnavailable { .. })
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, CacheError::LockTimeout { .. })
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_unavailable_keeps_source() {
        let err = CacheError::remote("get", RemoteError::Connection("refused".into()));
        assert!(err.is_remote_unavailable());
        assert!(!err.is_lock_timeout());
        assert_eq!(
            err.to_string(),
            "remote store unavailable during get: connection to remote store failed: refused"
        );
    }

    #[test]
    fn test_loader_error_wraps_message() {
        let err = CacheError::loader("order:1", "db down");
        assert_eq!(err.to_string(), "loader failed for order:1: db down");
    }
}
