// src/render.rs
// =============================================================================
// Turns a Document into HTML for `show --html`.
//
// This is a plain stand-in for the site's own renderer: the title becomes a
// heading, inline scripts are expanded and the body goes through
// pulldown-cmark. Error documents are wrapped in <main class="error">, the
// same marker the site crawler looks for.
// =============================================================================

use pulldown_cmark::{html, Options, Parser};

use crate::document::{expand_inline, Document};

pub fn render(document: &Document) -> String {
    let body = if document.is_error {
        document.body.clone()
    } else {
        expand_inline(&document.path, &document.body)
    };

    let mut text = format!("# {}\n\n", document.flags.title);
    if !document.flags.tags.is_empty() {
        let tags: Vec<String> = document.flags.tags.iter().map(|tag| format!("`{tag}`")).collect();
        text.push_str(&tags.join(" "));
        text.push_str("\n\n");
    }
    text.push_str(&body);

    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut markup = String::new();
    html::push_html(&mut markup, Parser::new_ext(&text, options));

    if document.is_error {
        format!("<main class=\"error\">\n{markup}</main>\n")
    } else {
        markup
    }
}
