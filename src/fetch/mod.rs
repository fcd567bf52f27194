// src/fetch/mod.rs
// =============================================================================
// This module defines how raw document text is retrieved.
//
// Submodules:
// - http: the live transport, a plain HTTP GET against the site origin
//
// The crawl core only knows the `Fetch` trait, so tests can swap in an
// in-memory transport and the site driver can use a browser instead.
//
// Rust concepts:
// - Traits: a shared interface with several implementations
// - async-trait: lets trait methods be `async fn` and still be used generically
// - thiserror: derives std::error::Error for our error enum
// =============================================================================

mod http;

#[cfg(test)]
pub mod mock;

pub use http::{CacheKey, HttpFetcher};
pub(crate) use http::directory_url;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// Anything that can turn a document path into its raw text
//
// Implementations must time out on their own: the cache waits for a fetch
// for as long as it takes.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<String, FetchError>;
}

// Lets callers keep a handle on a transport they gave to a cache
#[async_trait]
impl<T: Fetch + ?Sized> Fetch for Arc<T> {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        (**self).fetch(path).await
    }
}

/// Why a document (or a rendered page) could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("HTTP {code} {reason}")]
    Status { code: u16, reason: String },
    /// Request timed out
    #[error("request timed out")]
    Timeout,
    /// Could not connect or resolve the host
    #[error("connection failed: {0}")]
    Connect(String),
    /// The page loaded but never became ready, or reported an error
    #[error("navigation failed: {0}")]
    Navigation(String),
    /// The URL for a path could not be built
    #[error("invalid url for {0}")]
    InvalidUrl(String),
    /// Other error
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    // "404 Not Found" for status failures, None for everything else
    pub fn status_title(&self) -> Option<String> {
        match self {
            FetchError::Status { code, reason } if reason.is_empty() => Some(code.to_string()),
            FetchError::Status { code, reason } => Some(format!("{code} {reason}")),
            _ => None,
        }
    }
}

// Categorizes reqwest errors, the same way for every transport
impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = error.status() {
            FetchError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            }
        } else if error.is_connect() {
            FetchError::Connect(error.to_string())
        } else {
            FetchError::Other(error.to_string())
        }
    }
}
