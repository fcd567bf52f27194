// src/fetch/mock.rs
// =============================================================================
// In-memory transport for tests.
//
// Serves a fixed map of path -> text, counts how many times each path was
// requested, and can hold every response for a while so concurrent callers
// really do overlap.
// =============================================================================

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use super::{Fetch, FetchError};

#[derive(Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl MemoryFetcher {
    pub fn new<'a>(pages: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        MemoryFetcher {
            pages: pages
                .into_iter()
                .map(|(path, text)| (path.to_string(), text.to_string()))
                .collect(),
            ..MemoryFetcher::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Fetch for MemoryFetcher {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        *self.calls.lock().entry(path.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages.get(path).cloned().ok_or_else(|| FetchError::Status {
            code: 404,
            reason: "Not Found".to_string(),
        })
    }
}
