// src/document/markdown.rs
// =============================================================================
// This module extracts outgoing references from a document body.
//
// We use the `pulldown-cmark` crate which:
// - Parses Markdown into events (heading, paragraph, link, etc.)
// - Follows the CommonMark specification
// - Never reports links written inside code spans or code blocks, which a
//   plain regex scan would get wrong
//
// Every reference is classified as one of:
// - an internal document (`/some/page.md`, or `/some/dir/` -> its index.md)
// - an internal asset or page (any other same-origin target)
// - an external link (anything with a host)
//
// Document links are graph edges: each one is recorded in the backlink index.
// =============================================================================

use pulldown_cmark::{Event, Parser, Tag};
use serde::Serialize;
use std::collections::HashSet;
use url::Url;

use super::script::expand_inline;
use crate::crawl::BacklinkIndex;

/// One outgoing reference of a document, keyed by `href`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Canonical document path for document links, the raw target otherwise
    pub href: String,
    pub is_external: bool,
    pub is_markdown: bool,
    pub is_image: bool,
}

// Extracts the links of a document body
//
// Parameters:
//   path: the canonical path of the document being scanned
//   body: the document body (flags already removed)
//   backlinks: index that receives one entry per document link
//
// Returns: links in first-seen order, one per distinct key
//
// Example:
//   path = "/p.md", body = "See [x](/x.md) and [y](/x.md)"
//   result = [Link { href: "/x.md", is_markdown: true, .. }]
pub fn extract_links(path: &str, body: &str, backlinks: &BacklinkIndex) -> Vec<Link> {
    let mut links = Vec::new();
    if body.is_empty() {
        return links;
    }

    // Inline scripts may themselves produce links, so scan their output
    let expanded = expand_inline(path, body);
    let mut seen = HashSet::new();

    for event in Parser::new(&expanded) {
        // In pulldown-cmark 0.9, Link and Image are Tag::Link(type, dest, title)
        let (target, is_image) = match event {
            Event::Start(Tag::Link(_link_type, dest_url, _title)) => (dest_url.to_string(), false),
            Event::Start(Tag::Image(_link_type, dest_url, _title)) => (dest_url.to_string(), true),
            _ => continue,
        };

        if target.is_empty() {
            continue;
        }

        // Images are never graph edges, whatever they point at
        let document_path = if !is_image && target.starts_with('/') {
            canonical_path(&target)
        } else {
            None
        };

        if document_path.as_deref() == Some(path) {
            continue;
        }

        let is_markdown = document_path.is_some();
        let is_external = !is_markdown && is_external_link(&target);
        let key = document_path.unwrap_or(target);

        // First occurrence wins
        if !seen.insert(key.clone()) {
            continue;
        }

        if is_markdown {
            backlinks.record(&key, path);
        }

        links.push(Link {
            href: key,
            is_external,
            is_markdown,
            is_image,
        });
    }

    links
}

// Maps a slash-rooted target onto the document it names, if any
//
// Examples:
//   "/notes/rust.md" -> Some("/notes/rust.md")
//   "/notes/"        -> Some("/notes/index.md")
//   "/files/a.pdf"   -> None (a plain same-origin reference)
pub fn canonical_path(target: &str) -> Option<String> {
    if target.ends_with(".md") {
        Some(target.to_string())
    } else if target.ends_with('/') {
        Some(format!("{target}index.md"))
    } else {
        None
    }
}

// A reference is external when it parses as an absolute URL with a host
pub fn is_external_link(target: &str) -> bool {
    Url::parse(target)
        .map(|url| url.host_str().is_some_and(|host| !host.is_empty()))
        .unwrap_or(false)
}
