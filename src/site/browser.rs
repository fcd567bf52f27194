// src/site/browser.rs
// =============================================================================
// This module loads pages through a headless browser.
//
// The client application renders documents with JavaScript, so the static
// site needs a real browser to produce each page. We talk to a remote
// headless Chromium service over HTTP (any browserless-compatible `/content`
// endpoint): we send it the page URL plus loading rules, it navigates, waits
// until the page is ready and sends back the final HTML.
//
// Loading rules keep every navigation cheap:
// - images are never downloaded
// - scripts are only loaded from the application's asset directory
// - the page counts as ready once <main> has finished its entry transition
//   and no placeholder snippet links are left
// =============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::fetch::{directory_url, FetchError};

// <main> without its entry transition class means the route has rendered
pub const READY_SELECTOR: &str = "main:not(.slide-fade-enter-active)";

// Snippet placeholders are replaced once linked documents are loaded
const SNIPPETS_SETTLED: &str = "!document.querySelector('a.snippet')";

// Anything that can produce the final rendered HTML of a document page
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, path: &str) -> Result<String, FetchError>;
}

/// Which sub-resources a page may load while it renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub block_images: bool,
    /// Scripts are only allowed below this path, e.g. "/assets/"
    pub asset_prefix: String,
}

impl ResourcePolicy {
    pub fn new(asset_prefix: impl Into<String>) -> Self {
        ResourcePolicy {
            block_images: true,
            asset_prefix: asset_prefix.into(),
        }
    }

    // Resource types the browser rejects outright
    pub fn rejected_types(&self) -> Vec<&'static str> {
        if self.block_images {
            vec!["image"]
        } else {
            Vec::new()
        }
    }

    // URL patterns (JavaScript regular expressions) the browser rejects:
    // any script whose path is outside the asset prefix
    pub fn rejected_patterns(&self) -> Vec<String> {
        vec![format!(
            r"^[a-z]+://[^/]+(?!{})/[^?#]*\.m?js([?#].*)?$",
            regex::escape(&self.asset_prefix)
        )]
    }
}

pub struct RemoteBrowser {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    // The client application, e.g. http://localhost:8080/
    app: Url,
    policy: ResourcePolicy,
    // Category pages also wait for their tag list
    category: Option<String>,
    page_timeout: Duration,
}

impl RemoteBrowser {
    // Creates a loader
    //
    // Parameters:
    //   endpoint: base URL of the headless browser service
    //   app: where the client application is served (host + index path)
    //   policy: which sub-resources pages may load
    //   page_timeout: how long one navigation may take in total
    pub fn new(endpoint: &str, app: &str, policy: ResourcePolicy, page_timeout: Duration) -> anyhow::Result<Self> {
        // Leave the browser time to report its own timeout first
        let client = Client::builder()
            .timeout(page_timeout + Duration::from_secs(5))
            .build()?;
        Ok(RemoteBrowser {
            client,
            endpoint: directory_url(endpoint)?,
            token: None,
            app: Url::parse(app).map_err(|e| anyhow::anyhow!("Invalid URL '{}': {}", app, e))?,
            policy,
            category: None,
            page_timeout,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    // "/notes/a.md" -> "http://localhost:8080/#/notes/a.md?prerender"
    pub fn page_url(&self, path: &str) -> String {
        let mut url = self.app.clone();
        url.set_fragment(Some(&format!("{path}?prerender")));
        url.to_string()
    }

    // Instructions for one navigation
    pub fn request_body(&self, path: &str) -> Value {
        let timeout = self.page_timeout.as_millis() as u64;
        let mut ready = SNIPPETS_SETTLED.to_string();
        if self.category.as_deref() == Some(path) {
            ready.push_str(" && !!document.querySelector('ul')");
        }
        json!({
            "url": self.page_url(path),
            "rejectResourceTypes": self.policy.rejected_types(),
            "rejectRequestPattern": self.policy.rejected_patterns(),
            "gotoOptions": { "timeout": timeout },
            "waitForSelector": { "selector": READY_SELECTOR, "timeout": timeout },
            "waitForFunction": { "fn": format!("() => {ready}"), "timeout": timeout },
        })
    }

    fn content_url(&self) -> Result<Url, FetchError> {
        let mut url = self
            .endpoint
            .join("content")
            .map_err(|_| FetchError::InvalidUrl(self.endpoint.to_string()))?;
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }
}

#[async_trait]
impl PageLoader for RemoteBrowser {
    async fn load(&self, path: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .post(self.content_url()?)
            .json(&self.request_body(path))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // The service reports navigation problems in the body
            let detail = response.text().await.unwrap_or_default();
            return Err(FetchError::Navigation(format!("HTTP {}: {}", status.as_u16(), detail.trim())));
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser() -> RemoteBrowser {
        RemoteBrowser::new(
            "http://browser:3000",
            "http://localhost:8080/",
            ResourcePolicy::new("/assets/"),
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_policy_blocks_images_and_foreign_scripts() {
        let policy = ResourcePolicy::new("/assets/");
        assert_eq!(policy.rejected_types(), vec!["image"]);
        assert_eq!(
            policy.rejected_patterns(),
            vec![r"^[a-z]+://[^/]+(?!/assets/)/[^?#]*\.m?js([?#].*)?$".to_string()]
        );
    }

    #[test]
    fn test_reject_pattern_escapes_the_prefix() {
        let policy = ResourcePolicy::new("/static.v2/");
        assert_eq!(
            policy.rejected_patterns(),
            vec![r"^[a-z]+://[^/]+(?!/static\.v2/)/[^?#]*\.m?js([?#].*)?$".to_string()]
        );
    }

    #[test]
    fn test_policy_can_allow_images() {
        let policy = ResourcePolicy {
            block_images: false,
            ..ResourcePolicy::new("/assets/")
        };
        assert!(policy.rejected_types().is_empty());
    }

    #[test]
    fn test_page_url() {
        assert_eq!(browser().page_url("/notes/a.md"), "http://localhost:8080/#/notes/a.md?prerender");
    }

    #[test]
    fn test_request_body() {
        let browser = browser().with_category(Some("/category.md".to_string()));
        let body = browser.request_body("/notes/a.md");
        assert_eq!(body["rejectResourceTypes"], json!(["image"]));
        assert_eq!(body["waitForSelector"]["selector"], READY_SELECTOR);
        assert_eq!(body["waitForFunction"]["timeout"], 30_000);

        let category = browser.request_body("/category.md");
        let wait = category["waitForFunction"]["fn"].as_str().unwrap();
        assert!(wait.contains("querySelector('ul')"));
    }

    #[test]
    fn test_content_url_carries_token() {
        let browser = browser().with_token(Some("secret".to_string()));
        assert_eq!(browser.content_url().unwrap().as_str(), "http://browser:3000/content?token=secret");
    }
}
