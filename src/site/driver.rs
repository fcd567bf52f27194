// src/site/driver.rs
// =============================================================================
// The site crawler: renders every reachable page into static files.
//
// How it works:
// 1. Pending paths live on a stack, roots first
// 2. Up to `concurrency` pages load at the same time (FuturesUnordered)
// 3. Whenever a page finishes, it is written out and the documents it links
//    to go on top of the stack, so the crawl continues depth-first
// 4. A path is claimed in `rendered` before it loads, so it renders once
//
// A page that fails to load, or that shows the error marker, is logged and
// skipped. Its siblings are not affected.
// =============================================================================

use anyhow::{bail, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{info, warn};

use super::browser::PageLoader;
use super::page::{extract_page, html_path, PageOutcome};
use super::sink::OutputSink;
use crate::crawl::DEFAULT_CONCURRENCY;

/// What a site crawl produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SiteReport {
    /// Paths written, in completion order
    pub written: Vec<String>,
    /// Paths that failed to render
    pub skipped: Vec<String>,
}

pub struct SiteCrawler<L, S> {
    loader: L,
    sink: S,
    // Path the client application is served from, for permalinks
    index_path: String,
    // Also written as /index.html
    index_root: String,
    concurrency: usize,
    rendered: Mutex<HashSet<String>>,
}

impl<L: PageLoader, S: OutputSink> SiteCrawler<L, S> {
    // Creates a site crawler
    //
    // Parameters:
    //   loader: produces the rendered HTML of a document page
    //   sink: where finished pages are written
    //   index_path: path the client application is served from (e.g. "/")
    //   index_root: the document shown at the site root (e.g. "/index.md")
    pub fn new(loader: L, sink: S, index_path: impl Into<String>, index_root: impl Into<String>) -> Self {
        SiteCrawler {
            loader,
            sink,
            index_path: index_path.into(),
            index_root: index_root.into(),
            concurrency: DEFAULT_CONCURRENCY,
            rendered: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    // Renders everything reachable from `roots`
    //
    // Paths rendered by an earlier run of the same crawler are not rendered
    // again.
    pub async fn run(&self, roots: &[String]) -> SiteReport {
        let mut pending: Vec<String> = roots.iter().rev().cloned().collect();
        let mut loading = FuturesUnordered::new();
        let mut report = SiteReport::default();

        loop {
            while loading.len() < self.concurrency {
                let Some(path) = pending.pop() else { break };
                if !self.rendered.lock().insert(path.clone()) {
                    continue;
                }
                loading.push(async move {
                    let result = self.render_page(&path).await;
                    (path, result)
                });
            }

            let Some((path, result)) = loading.next().await else { break };
            match result {
                Ok(links) => {
                    let rendered = self.rendered.lock();
                    // Reversed so the first link is rendered first
                    pending.extend(links.into_iter().rev().filter(|link| !rendered.contains(link)));
                    report.written.push(path);
                }
                Err(e) => {
                    warn!(path = %path, error = %format!("{e:#}"), "skipping page");
                    report.skipped.push(path);
                }
            }
        }

        info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            "site crawl finished"
        );
        report
    }

    // Loads, rewrites and writes one page
    //
    // Returns: the documents the page links to
    async fn render_page(&self, path: &str) -> Result<Vec<String>> {
        let html = self.loader.load(path).await.with_context(|| format!("loading {path}"))?;

        let page = match extract_page(&html, &self.index_path, path)? {
            PageOutcome::Rendered(page) => page,
            PageOutcome::Error => bail!("{path} rendered an error page"),
        };

        let target = html_path(path);
        self.sink.write(&target, &page.markup)?;
        if path == self.index_root && target.trim_start_matches('/') != "index.html" {
            self.sink.write("index.html", &page.markup)?;
        }

        Ok(page.links)
    }
}
