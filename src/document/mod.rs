// src/document/mod.rs
// =============================================================================
// This module turns raw markdown text into a `Document`.
//
// Submodules:
// - flags: splits the text into body and metadata flags (title, tags, dates)
// - markdown: extracts outgoing links and feeds the backlink index
// - script: evaluates `$$ expr $$` inline scripts with a fixed function set
//
// A Document is immutable once built. The cache shares it as Arc<Document>
// and replaces the whole entry when a path is fetched again.
// =============================================================================

mod flags;
mod markdown;
mod script;

pub use flags::{parse, FlagSet};
pub use markdown::{canonical_path, extract_links, Link};
pub use script::expand_inline;

use serde::Serialize;

use crate::crawl::BacklinkIndex;
use crate::fetch::FetchError;

/// A parsed document, or the placeholder that stands in for a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub path: String,
    pub body: String,
    pub flags: FlagSet,
    pub links: Vec<Link>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Document {
    // Parses fetched text into a document and records its backlinks
    //
    // Empty text is a valid, empty document rather than an error.
    pub fn parse(path: &str, raw: &str, backlinks: &BacklinkIndex) -> Self {
        let (body, flags) = parse(path, raw);
        let links = extract_links(path, &body, backlinks);
        Document {
            path: path.to_string(),
            body,
            flags,
            links,
            is_error: false,
        }
    }

    // Builds the error document shown in place of a page that failed to load
    //
    // The title comes from the HTTP status when there is one ("404 Not Found"),
    // and from the path otherwise. Error documents have no links, so a crawl
    // treats them as dead ends.
    pub fn error(path: &str, message: &str, cause: &FetchError) -> Self {
        let mut flags = FlagSet::for_path(path);
        if let Some(title) = cause.status_title() {
            flags.title = title;
        }
        Document {
            path: path.to_string(),
            body: message.to_string(),
            flags,
            links: Vec::new(),
            is_error: true,
        }
    }

    // Targets of the document links, in first-seen order
    pub fn document_links(&self) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .filter(|link| link.is_markdown)
            .map(|link| link.href.as_str())
    }

    #[cfg(test)]
    pub fn link(&self, href: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.href == href)
    }
}
