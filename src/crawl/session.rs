// src/crawl/session.rs
// =============================================================================
// The live crawler: everything an interactive client needs in one object.
//
// A `Crawler` owns the document cache, the backlink index and the visited
// set of one session. Clients call
//   - get_file(path): one document, fetched on demand
//   - get_files(): the whole graph reachable from the configured roots,
//     crawled once and then served from memory
//   - reset(): forget documents and visited paths (backlinks are kept)
// =============================================================================

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use super::queue::{walk, VisitedSet};
use super::{BacklinkIndex, DocumentCache};
use crate::document::Document;
use crate::fetch::Fetch;

pub const DEFAULT_CONCURRENCY: usize = 16;

/// Everything known after a crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSnapshot {
    pub documents: BTreeMap<String, Arc<Document>>,
    pub backlinks: BTreeMap<String, Vec<String>>,
}

impl CrawlSnapshot {
    pub fn error_count(&self) -> usize {
        self.documents.values().filter(|doc| doc.is_error).count()
    }
}

pub struct Crawler<F> {
    cache: DocumentCache<F>,
    roots: Vec<String>,
    visited: Mutex<VisitedSet>,
    completed: AtomicBool,
    concurrency: usize,
}

impl<F: Fetch> Crawler<F> {
    // Creates a crawler for the site behind `fetcher`
    //
    // Parameters:
    //   fetcher: the transport used for every document
    //   roots: where get_files() starts, in order
    pub fn new(fetcher: F, roots: Vec<String>) -> Self {
        Crawler {
            cache: DocumentCache::new(fetcher, Arc::new(BacklinkIndex::new())),
            roots,
            visited: Mutex::new(VisitedSet::default()),
            completed: AtomicBool::new(false),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.cache = self.cache.with_error_message(message);
        self
    }

    pub async fn get_file(&self, path: &str) -> Arc<Document> {
        self.cache.get_document(path).await
    }

    // Returns the full graph reachable from the roots
    //
    // The first call crawls; later calls are answered from memory unless the
    // cache is bypassed.
    pub async fn get_files(&self) -> CrawlSnapshot {
        if self.cache.is_bypassed() || !self.completed.load(Ordering::Acquire) {
            let roots = self.roots.clone();
            self.walk(&roots).await;
            self.completed.store(true, Ordering::Release);
        }
        self.snapshot()
    }

    // Crawls from arbitrary start paths; already visited pages are not refetched
    pub async fn crawl(&self, roots: &[String]) -> CrawlSnapshot {
        self.walk(roots).await;
        self.snapshot()
    }

    async fn walk(&self, roots: &[String]) {
        let rounds = walk(&self.cache, &self.visited, roots, self.concurrency).await;
        info!(
            rounds,
            documents = self.cache.len(),
            backlinks = self.cache.backlinks().len(),
            "crawl finished"
        );
        if self.cache.backlinks().is_empty() {
            info!("no links between documents found yet");
        }
    }

    pub fn snapshot(&self) -> CrawlSnapshot {
        CrawlSnapshot {
            documents: self.cache.snapshot(),
            backlinks: self.cache.backlinks().snapshot(),
        }
    }

    pub fn backlinks(&self, path: &str) -> Vec<String> {
        self.cache.backlinks().sources(path)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().paths().to_vec()
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.cache.set_bypass(bypass);
    }

    // Forgets cached documents and visited paths; the backlink index stays
    pub fn reset(&self) {
        self.cache.clear();
        self.visited.lock().clear();
        self.completed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MemoryFetcher;
    use futures::future::join_all;
    use std::time::Duration;

    fn site() -> Arc<MemoryFetcher> {
        Arc::new(MemoryFetcher::new([
            ("/index.md", "# Home\n[a](/a.md) [about](/README.md)"),
            ("/README.md", "# About\n[home](/index.md)"),
            ("/a.md", "# A\n[b](/b.md) ![pic](/c.md) [ext](https://example.com/d.md)"),
            ("/b.md", "# B\n[a](/a.md) [missing](/missing.md)"),
        ]))
    }

    fn roots() -> Vec<String> {
        vec!["/index.md".to_string(), "/README.md".to_string()]
    }

    #[tokio::test]
    async fn test_get_files_crawls_everything_reachable() {
        let fetcher = site();
        let crawler = Crawler::new(fetcher.clone(), roots());

        let snapshot = crawler.get_files().await;

        let paths: Vec<_> = snapshot.documents.keys().map(String::as_str).collect();
        assert_eq!(paths, ["/README.md", "/a.md", "/b.md", "/index.md", "/missing.md"]);
        assert_eq!(snapshot.error_count(), 1);
        assert_eq!(snapshot.backlinks["/a.md"], vec!["/index.md", "/b.md"]);
        // Image and external references are not edges
        assert!(!snapshot.backlinks.contains_key("/c.md"));
        assert!(!snapshot.backlinks.contains_key("https://example.com/d.md"));
        assert_eq!(crawler.visited().len(), 5);
    }

    #[tokio::test]
    async fn test_get_files_is_idempotent() {
        let fetcher = site();
        let crawler = Crawler::new(fetcher.clone(), roots());

        let first = crawler.get_files().await;
        let calls = fetcher.total_calls();
        let second = crawler.get_files().await;

        assert_eq!(fetcher.total_calls(), calls);
        assert_eq!(first.documents.len(), second.documents.len());
        assert_eq!(first.backlinks, second.backlinks);
    }

    #[tokio::test]
    async fn test_get_file_and_crawl_share_fetches() {
        let fetcher = Arc::new(
            MemoryFetcher::new([("/index.md", "[a](/a.md)"), ("/a.md", "text")])
                .with_delay(Duration::from_millis(20)),
        );
        let crawler = Crawler::new(fetcher.clone(), vec!["/index.md".to_string()]);

        let (_, _) = futures::join!(crawler.get_files(), async {
            join_all((0..3).map(|_| crawler.get_file("/a.md"))).await
        });

        assert_eq!(fetcher.calls("/a.md"), 1);
        assert_eq!(fetcher.calls("/index.md"), 1);
    }

    #[tokio::test]
    async fn test_reset_forgets_documents_but_not_backlinks() {
        let fetcher = site();
        let crawler = Crawler::new(fetcher.clone(), roots());

        crawler.get_files().await;
        let calls = fetcher.total_calls();
        crawler.reset();

        assert!(crawler.visited().is_empty());
        assert!(crawler.snapshot().documents.is_empty());
        assert_eq!(crawler.backlinks("/b.md"), vec!["/a.md"]);

        crawler.get_files().await;
        assert_eq!(fetcher.total_calls(), calls * 2);
    }

    #[tokio::test]
    async fn test_document_after_reset_keeps_crawled_backlinks() {
        let fetcher = site();
        let crawler = Crawler::new(fetcher.clone(), roots());

        crawler.crawl(&["/index.md".to_string(), "/b.md".to_string()]).await;
        crawler.reset();
        let document = crawler.get_file("/b.md").await;

        assert_eq!(document.flags.title, "B");
        assert_eq!(fetcher.calls("/b.md"), 2);
        assert_eq!(crawler.backlinks("/b.md"), vec!["/a.md"]);
        assert_eq!(crawler.snapshot().documents.len(), 1);
    }

    #[tokio::test]
    async fn test_bypass_recrawls_roots() {
        let fetcher = site();
        let crawler = Crawler::new(fetcher.clone(), roots());

        crawler.get_files().await;
        crawler.set_bypass(true);
        crawler.get_files().await;

        // Roots are fetched again; everything else was already visited
        assert_eq!(fetcher.calls("/index.md"), 2);
        assert_eq!(fetcher.calls("/a.md"), 1);
    }
}
