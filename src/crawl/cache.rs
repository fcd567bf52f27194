// src/crawl/cache.rs
// =============================================================================
// This module implements the document cache with request coalescing.
//
// How it works:
// 1. A cached path is answered straight from memory
// 2. A path nobody is fetching yet is marked "in flight" and fetched
// 3. A path somebody else is already fetching is NOT fetched again: the
//    caller waits for that fetch to finish and reads its result
//
// So no matter how many callers ask for the same path at once, the transport
// sees exactly one request for it.
//
// Failures never escape: a failed fetch is stored as an error Document, so a
// crawl simply treats that page as a dead end.
//
// Rust concepts:
// - tokio::sync::watch: a one-shot "done" signal that many waiters can share
// - Drop: the in-flight mark is cleared by a guard, on every exit path
// - Arc: documents are shared between the cache and its callers
// =============================================================================

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::BacklinkIndex;
use crate::document::Document;
use crate::fetch::Fetch;

pub const DEFAULT_ERROR_MESSAGE: &str = "Failed to load this page.";

#[derive(Default)]
struct CacheState {
    documents: HashMap<String, Arc<Document>>,
    // path -> completion signal of the fetch currently running for it
    in_flight: HashMap<String, watch::Receiver<bool>>,
}

// What a caller has to do to get a document
enum Claim<'a> {
    Ready(Arc<Document>),
    Wait(watch::Receiver<bool>),
    Fetch(InFlight<'a>),
}

pub struct DocumentCache<F> {
    fetcher: F,
    backlinks: Arc<BacklinkIndex>,
    error_message: String,
    bypass: AtomicBool,
    state: Mutex<CacheState>,
}

impl<F: Fetch> DocumentCache<F> {
    pub fn new(fetcher: F, backlinks: Arc<BacklinkIndex>) -> Self {
        DocumentCache {
            fetcher,
            backlinks,
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            bypass: AtomicBool::new(false),
            state: Mutex::new(CacheState::default()),
        }
    }

    // Message shown in the body of error documents
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    // Returns the document for `path`, fetching it at most once at a time
    //
    // Never fails: transport errors come back as an error Document.
    pub async fn get_document(&self, path: &str) -> Arc<Document> {
        let mut waited = false;
        loop {
            match self.claim(path, waited) {
                Claim::Ready(document) => return document,
                Claim::Wait(mut done) => {
                    // An Err means the fetch was dropped without a result;
                    // the next claim will then fetch again
                    let _ = done.wait_for(|finished| *finished).await;
                    waited = true;
                }
                Claim::Fetch(mut in_flight) => {
                    let document = Arc::new(self.load(path).await);
                    in_flight.finish(document.clone());
                    return document;
                }
            }
        }
    }

    // Decides, under the lock, whether to reuse, wait or fetch
    //
    // A caller that just waited for somebody else's fetch reuses its result
    // even when the cache is bypassed.
    fn claim(&self, path: &str, waited: bool) -> Claim<'_> {
        let mut state = self.state.lock();

        if let Some(done) = state.in_flight.get(path) {
            return Claim::Wait(done.clone());
        }

        if waited || !self.is_bypassed() {
            if let Some(document) = state.documents.get(path) {
                return Claim::Ready(document.clone());
            }
        }

        let (signal, done) = watch::channel(false);
        state.in_flight.insert(path.to_string(), done);
        Claim::Fetch(InFlight {
            state: &self.state,
            path: path.to_string(),
            signal,
            document: None,
        })
    }

    async fn load(&self, path: &str) -> Document {
        debug!(path, "fetching document");
        match self.fetcher.fetch(path).await {
            Ok(raw) => Document::parse(path, raw.trim(), &self.backlinks),
            Err(error) => {
                warn!(path, %error, "fetch failed, storing error document");
                Document::error(path, &self.error_message, &error)
            }
        }
    }

    #[cfg(test)]
    pub fn cached(&self, path: &str) -> Option<Arc<Document>> {
        self.state.lock().documents.get(path).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Arc<Document>> {
        self.state
            .lock()
            .documents
            .iter()
            .map(|(path, document)| (path.clone(), document.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    // Drops every cached document; fetches still running are unaffected
    pub fn clear(&self) {
        self.state.lock().documents.clear();
    }

    // When on, every lookup is treated as a miss (for editing live content)
    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Relaxed);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    pub fn backlinks(&self) -> &BacklinkIndex {
        &self.backlinks
    }
}

// Marks one path as being fetched until dropped
//
// Dropping it stores the finished document (if any), clears the mark and
// wakes every waiter, even when the fetching future was cancelled or panicked.
struct InFlight<'a> {
    state: &'a Mutex<CacheState>,
    path: String,
    signal: watch::Sender<bool>,
    document: Option<Arc<Document>>,
}

impl InFlight<'_> {
    fn finish(&mut self, document: Arc<Document>) {
        self.document = Some(document);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock();
            if let Some(document) = self.document.take() {
                state.documents.insert(self.path.clone(), document);
            }
            state.in_flight.remove(&self.path);
        }
        self.signal.send_replace(true);
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why a watch channel and not a timer loop?
//    - Waiters sleep until the fetch they depend on is done, then wake once
//    - send_replace() works even when nobody is waiting
//    - wait_for() returns at once if the value is already `true`
//
// 2. Why is the lock never held across .await?
//    - claim() and Drop take the lock for a few map operations only
//    - The fetch itself runs unlocked, so other paths proceed in parallel
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MemoryFetcher;
    use futures::future::join_all;
    use std::time::Duration;

    fn cache(fetcher: Arc<MemoryFetcher>) -> DocumentCache<Arc<MemoryFetcher>> {
        DocumentCache::new(fetcher, Arc::new(BacklinkIndex::new()))
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let fetcher = Arc::new(
            MemoryFetcher::new([("/a.md", "# A")]).with_delay(Duration::from_millis(30)),
        );
        let cache = cache(fetcher.clone());

        let documents = join_all((0..8).map(|_| cache.get_document("/a.md"))).await;

        assert_eq!(fetcher.calls("/a.md"), 1);
        assert!(documents.iter().all(|doc| doc.flags.title == "A"));
        assert!(documents.iter().all(|doc| Arc::ptr_eq(doc, &documents[0])));
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_fetch() {
        let fetcher = Arc::new(MemoryFetcher::new([("/a.md", "text")]));
        let cache = cache(fetcher.clone());

        cache.get_document("/a.md").await;
        cache.get_document("/a.md").await;

        assert_eq!(fetcher.calls("/a.md"), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_becomes_error_document() {
        let fetcher = Arc::new(MemoryFetcher::new([]));
        let cache = cache(fetcher.clone()).with_error_message("gone");

        let doc = cache.get_document("/missing.md").await;

        assert!(doc.is_error);
        assert!(doc.links.is_empty());
        assert_eq!(doc.body, "gone");
        assert_eq!(doc.flags.title, "404 Not Found");
        // Error documents are cached like any other
        cache.get_document("/missing.md").await;
        assert_eq!(fetcher.calls("/missing.md"), 1);
    }

    #[tokio::test]
    async fn test_bypass_refetches() {
        let fetcher = Arc::new(MemoryFetcher::new([("/a.md", "text")]));
        let cache = cache(fetcher.clone());

        cache.get_document("/a.md").await;
        cache.set_bypass(true);
        cache.get_document("/a.md").await;
        cache.get_document("/a.md").await;

        assert_eq!(fetcher.calls("/a.md"), 3);
    }

    #[tokio::test]
    async fn test_bypass_still_coalesces_concurrent_requests() {
        let fetcher = Arc::new(
            MemoryFetcher::new([("/a.md", "text")]).with_delay(Duration::from_millis(30)),
        );
        let cache = cache(fetcher.clone());
        cache.set_bypass(true);

        join_all((0..4).map(|_| cache.get_document("/a.md"))).await;

        assert_eq!(fetcher.calls("/a.md"), 1);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_path() {
        let fetcher = Arc::new(
            MemoryFetcher::new([("/a.md", "text")]).with_delay(Duration::from_millis(50)),
        );
        let cache = cache(fetcher.clone());

        // Give up on the first fetch half way through
        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), cache.get_document("/a.md")).await;
        assert!(cancelled.is_err());

        let doc = cache.get_document("/a.md").await;
        assert!(!doc.is_error);
        assert_eq!(fetcher.calls("/a.md"), 2);
    }

    #[tokio::test]
    async fn test_clear_keeps_backlinks() {
        let fetcher = Arc::new(MemoryFetcher::new([("/a.md", "[b](/b.md)")]));
        let cache = cache(fetcher.clone());

        cache.get_document("/a.md").await;
        cache.clear();

        assert!(cache.cached("/a.md").is_none());
        assert_eq!(cache.backlinks().sources("/b.md"), vec!["/a.md"]);
    }
}
