// src/site/mod.rs
// =============================================================================
// This module pre-renders the site into static HTML files.
//
// Submodules:
// - browser: loads a page through a remote headless browser
// - page: inspects and rewrites the rendered markup
// - sink: writes finished pages to disk
// - driver: the work loop tying them together
//
// Unlike the live crawler, this one follows links found in the rendered
// pages, so it also reaches documents that are only linked from generated
// content (tag lists, archives, search results).
// =============================================================================

mod browser;
mod driver;
mod page;
mod sink;

pub use browser::{RemoteBrowser, ResourcePolicy};
pub use driver::SiteCrawler;
pub use sink::DirSink;
