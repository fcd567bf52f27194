// src/site/page.rs
// =============================================================================
// This module turns a page rendered by the browser into a static page.
//
// We use two HTML crates:
// - `scraper` to inspect the DOM (error marker, anchors to follow)
// - `lol_html` to rewrite the markup in place (links, classes, permalink)
//
// Anchors are classified the same way as markdown links:
//   "#/notes/a.md"  -> document /notes/a.md, href rewritten to /notes/a.html
//   "#/notes/"      -> document /notes/index.md, href rewritten to /notes/index.html
//   "/notes/a.html" -> document /notes/a.md (already a static link)
// Everything else (external links, in-page anchors, assets) is ignored.
// =============================================================================

use lol_html::html_content::{ContentType, Element};
use lol_html::{element, rewrite_str, Settings};
use scraper::{Html, Selector};
use std::sync::LazyLock;

use crate::document::canonical_path;

// Shown by the client application when a document failed to load
static ERROR_MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main.error").expect("error marker selector is valid"));

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

// Inline code that links to a listing in the live application
const NOLINK_CODE: &str = "code.item-tag, code.item-author, .index li > code";
const NOLINK_ANCHORS: &str = "code.item-tag a, code.item-author a, .index li > code a";

/// A rendered page ready to be written, plus the documents it links to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub markup: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Rendered(ExtractedPage),
    /// The page reported an error marker instead of content
    Error,
}

// What a rendered anchor points at
#[derive(Debug, PartialEq, Eq)]
struct AnchorTarget {
    document: String,
    // Static href to write instead of the original one
    rewrite: Option<String>,
}

fn classify_anchor(href: &str) -> Option<AnchorTarget> {
    if let Some(route) = href.strip_prefix('#') {
        if !route.starts_with('/') {
            return None;
        }
        let document = canonical_path(route)?;
        let rewrite = Some(html_path(&document));
        return Some(AnchorTarget { document, rewrite });
    }

    if href.starts_with('/') {
        let stem = href.strip_suffix(".html")?;
        return Some(AnchorTarget {
            document: format!("{stem}.md"),
            rewrite: None,
        });
    }

    None
}

// "/notes/a.md" -> "/notes/a.html"
pub fn html_path(document: &str) -> String {
    match document.strip_suffix(".md") {
        Some(stem) => format!("{stem}.html"),
        None => format!("{document}.html"),
    }
}

// Permanent hash-route link of a page, as shown in its toolbar
//
// Example: index_path "/blog/index.html", document "/notes/index.md"
//          -> "/blog/#/notes/"
pub fn permalink(index_path: &str, document: &str) -> String {
    let base = index_path.strip_suffix("index.html").unwrap_or(index_path);
    let route = document.strip_suffix("index.md").unwrap_or(document);
    format!("{base}#{route}")
}

// Extracts the outgoing document links of a rendered page and rewrites it
//
// Parameters:
//   html: the final DOM of the page, as returned by the browser
//   index_path: path the client application is served from
//   document: the document this page shows
//
// Returns: PageOutcome::Error when the page shows the error marker
pub fn extract_page(html: &str, index_path: &str, document: &str) -> anyhow::Result<PageOutcome> {
    let links = {
        let dom = Html::parse_document(html);
        if dom.select(&ERROR_MARKER).next().is_some() {
            return Ok(PageOutcome::Error);
        }

        let mut links: Vec<String> = Vec::new();
        for anchor in dom.select(&ANCHORS) {
            let Some(href) = anchor.value().attr("href") else { continue };
            let Some(target) = classify_anchor(href) else { continue };
            if target.document != document && !links.contains(&target.document) {
                links.push(target.document);
            }
        }
        links
    };

    let hash_link = format!(
        r#"<code class="item-hash"><a href="{}">Hash</a></code>"#,
        permalink(index_path, document)
    );

    let settings = Settings {
        element_content_handlers: vec![
            element!("a[href]", |el: &mut Element| {
                let rewrite = el
                    .get_attribute("href")
                    .and_then(|href| classify_anchor(&href))
                    .and_then(|target| target.rewrite);
                if let Some(href) = rewrite {
                    el.set_attribute("href", &href)?;
                }
                Ok(())
            }),
            element!("body", |el: &mut Element| {
                add_class(el, "prerender");
                Ok(())
            }),
            element!(NOLINK_CODE, |el: &mut Element| {
                add_class(el, "nolink");
                Ok(())
            }),
            // Tag and author chips keep their text only
            element!(NOLINK_ANCHORS, |el: &mut Element| {
                el.remove_and_keep_content();
                Ok(())
            }),
            // A highlighted code block is reduced to its <pre>
            element!("div.code-toolbar", |el: &mut Element| {
                el.remove_and_keep_content();
                Ok(())
            }),
            element!("div.code-toolbar > *:not(pre)", |el: &mut Element| {
                el.remove();
                Ok(())
            }),
            element!("picture .original", |el: &mut Element| {
                el.remove();
                Ok(())
            }),
            element!("#bar", |el: &mut Element| {
                el.append(&hash_link, ContentType::Html);
                Ok(())
            }),
        ],
        ..Settings::default()
    };

    let markup = rewrite_str(html, settings)?;
    Ok(PageOutcome::Rendered(ExtractedPage { markup, links }))
}

fn add_class(el: &mut Element, class: &str) {
    let current = el.get_attribute("class").unwrap_or_default();
    if current.split_whitespace().any(|existing| existing == class) {
        return;
    }
    let classes = if current.trim().is_empty() {
        class.to_string()
    } else {
        format!("{} {class}", current.trim())
    };
    // "class" is always a valid attribute name
    let _ = el.set_attribute("class", &classes);
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><head></head><body class="dark">
<main>
  <div id="bar"><code class="item-tag"><a href="#/search.md?tag=x">x</a></code></div>
  <a href="#/notes/a.md">A</a>
  <a href="#/notes/">Notes</a>
  <a href="/b.html">B</a>
  <a href="#/notes/a.md">A again</a>
  <a href="#/index.md">Self</a>
  <a href="https://example.com/c.md">External</a>
  <a href="#section">Anchor</a>
  <a href="/files/report.pdf">PDF</a>
  <picture><img src="x.png"><div class="original">big</div></picture>
</main>
</body></html>"##;

    fn rendered(html: &str) -> ExtractedPage {
        match extract_page(html, "/", "/index.md").unwrap() {
            PageOutcome::Rendered(page) => page,
            PageOutcome::Error => panic!("page unexpectedly reported an error"),
        }
    }

    #[test]
    fn test_links_follow_document_anchors_only() {
        let page = rendered(PAGE);
        assert_eq!(page.links, vec!["/notes/a.md", "/notes/index.md", "/b.md"]);
    }

    #[test]
    fn test_hash_links_are_rewritten() {
        let page = rendered(PAGE);
        assert!(page.markup.contains(r#"href="/notes/a.html""#));
        assert!(page.markup.contains(r#"href="/notes/index.html""#));
        assert!(page.markup.contains(r#"href="/b.html""#));
        assert!(!page.markup.contains(r##"href="#/notes/a.md""##));
        assert!(page.markup.contains(r##"href="#section""##));
    }

    #[test]
    fn test_page_decorations() {
        let page = rendered(PAGE);
        assert!(page.markup.contains(r#"<body class="dark prerender">"#));
        assert!(page.markup.contains(r#"class="item-tag nolink""#));
        assert!(page.markup.contains(r##"<code class="item-hash"><a href="/#/">Hash</a></code></div>"##));
        assert!(!page.markup.contains("original"));
    }

    #[test]
    fn test_index_codes_lose_their_links() {
        let html = r##"<html><body><main><ul class="index">
<li><code><a href="#/search.md?tag=rust">rust</a></code> <a href="#/a.md">A</a></li>
</ul></main></body></html>"##;
        let page = rendered(html);
        assert!(page.markup.contains(r#"<code class="nolink">rust</code>"#));
        assert!(page.markup.contains(r#"<a href="/a.html">A</a>"#));
    }

    #[test]
    fn test_code_toolbar_is_unwrapped() {
        let html = r#"<html><body><main><div class="code-toolbar"><pre class="language-rust"><code>fn main() {}</code></pre><div class="toolbar"><button>Copy</button></div></div></main></body></html>"#;
        let page = rendered(html);
        assert!(page
            .markup
            .contains(r#"<main><pre class="language-rust"><code>fn main() {}</code></pre></main>"#));
        assert!(!page.markup.contains("toolbar"));
        assert!(!page.markup.contains("Copy"));
    }

    #[test]
    fn test_error_marker() {
        let html = r#"<html><body><main class="error">Oops</main></body></html>"#;
        assert_eq!(extract_page(html, "/", "/x.md").unwrap(), PageOutcome::Error);
    }

    #[test]
    fn test_permalink() {
        assert_eq!(permalink("/", "/notes/a.md"), "/#/notes/a.md");
        assert_eq!(permalink("/blog/index.html", "/notes/index.md"), "/blog/#/notes/");
    }

    #[test]
    fn test_html_path() {
        assert_eq!(html_path("/notes/a.md"), "/notes/a.html");
    }
}
