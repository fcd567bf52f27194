// src/crawl/mod.rs
// =============================================================================
// This module discovers and caches the document graph.
//
// Features:
// - One fetch per path at a time, no matter how many callers ask (cache)
// - Breadth-first expansion from a set of roots (queue)
// - A global index of which documents link to which (backlinks)
// - A session object bundling all of the above for a live client (session)
//
// Rust concepts:
// - Async programming: rounds of fetches awaited together
// - Collections: HashSet for visited paths, BTreeMap for ordered snapshots
// =============================================================================

mod backlinks;
mod cache;
mod queue;
mod session;

pub use backlinks::BacklinkIndex;
pub use cache::{DocumentCache, DEFAULT_ERROR_MESSAGE};
pub use session::{CrawlSnapshot, Crawler, DEFAULT_CONCURRENCY};
