// src/crawl/queue.rs
// =============================================================================
// This module walks the document graph breadth-first.
//
// How it works:
// 1. Fetch every root path at once (through the cache)
// 2. Collect the document links of that round that nobody has visited yet
// 3. Those links are the next "frontier": fetch them all at once, repeat
// 4. Stop when a round discovers nothing new
//
// Every path is marked visited the moment it is queued, so a page linked
// from ten places, or from itself through a cycle, is only fetched once.
// Error documents have no links, so the walk ends naturally at them.
//
// The order inside a round follows first discovery, so the final graph is
// the same on every run even though fetches finish in any order.
// =============================================================================

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::DocumentCache;
use crate::document::Document;
use crate::fetch::Fetch;

// Paths seen during a session, in the order they were first seen
#[derive(Debug, Default)]
pub struct VisitedSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl VisitedSet {
    // Returns: true if the path was not visited before
    pub fn insert(&mut self, path: &str) -> bool {
        if !self.seen.insert(path.to_string()) {
            return false;
        }
        self.order.push(path.to_string());
        true
    }

    #[cfg(test)]
    pub fn contains(&self, path: &str) -> bool {
        self.seen.contains(path)
    }

    pub fn paths(&self) -> &[String] {
        &self.order
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

// Walks the graph from `roots` until no new document links turn up
//
// Parameters:
//   cache: where documents come from (and are kept)
//   visited: session-wide visited set, shared across walks
//   roots: start paths; always fetched, even when already visited
//   concurrency: how many fetches of one round may run at once
//
// Returns: the number of rounds it took
pub async fn walk<F: Fetch>(
    cache: &DocumentCache<F>,
    visited: &Mutex<VisitedSet>,
    roots: &[String],
    concurrency: usize,
) -> usize {
    let mut frontier: Vec<String> = Vec::new();
    {
        let mut visited = visited.lock();
        for root in roots {
            visited.insert(root);
            if !frontier.contains(root) {
                frontier.push(root.clone());
            }
        }
    }

    let mut rounds = 0;
    while !frontier.is_empty() {
        rounds += 1;
        info!(round = rounds, size = frontier.len(), "fetching frontier");

        // The whole round is in hand before the next frontier is computed
        let documents = fetch_round(cache, &frontier, concurrency).await;
        frontier = next_frontier(&documents, &mut visited.lock());
    }

    rounds
}

// Fetches one round, keeping results in frontier order
async fn fetch_round<F: Fetch>(
    cache: &DocumentCache<F>,
    paths: &[String],
    concurrency: usize,
) -> Vec<Arc<Document>> {
    stream::iter(paths.iter().map(|path| cache.get_document(path)))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

fn next_frontier(documents: &[Arc<Document>], visited: &mut VisitedSet) -> Vec<String> {
    let mut frontier = Vec::new();
    for document in documents {
        if document.is_error {
            continue;
        }
        for target in document.document_links() {
            if visited.insert(target) {
                frontier.push(target.to_string());
            }
        }
    }
    frontier
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why rounds instead of one queue item at a time?
//    - All pages of one level are requested together, so the transport
//      sees many requests at once instead of one after another
//    - buffered(n) keeps at most n of them running and yields results in
//      input order, which keeps discovery order stable
//
// 2. Why a loop and not recursion?
//    - Deep graphs would otherwise nest one future per level
// -----------------------------------------------------------------------------
