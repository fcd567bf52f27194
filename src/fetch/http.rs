// src/fetch/http.rs
// =============================================================================
// The live transport: fetches raw markdown from the site origin over HTTP.
//
// Every path is resolved against a base URL, so a site served from a
// sub-directory (https://example.com/blog/) works the same as one served
// from the root. An optional cache key is appended as the query string
// (`/index.md?v3`) so a new deployment bypasses stale browser and CDN caches.
// The key is either one string for the whole site or a table of per-path keys.
// =============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use super::{Fetch, FetchError};

/// Cache-busting key appended to document requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CacheKey {
    Global(String),
    PerPath(BTreeMap<String, String>),
}

impl CacheKey {
    pub fn for_path(&self, path: &str) -> Option<&str> {
        let key = match self {
            CacheKey::Global(key) => Some(key.as_str()),
            CacheKey::PerPath(keys) => keys.get(path).map(String::as_str),
        };
        key.filter(|key| !key.is_empty())
    }
}

pub struct HttpFetcher {
    client: Client,
    base: Url,
    cache_key: Option<CacheKey>,
}

impl HttpFetcher {
    // Creates a fetcher for the site at `base_url`
    //
    // Parameters:
    //   base_url: site origin, optionally with a sub-directory
    //   cache_key: optional cache-busting key configuration
    //   timeout: per-request timeout; a hung server surfaces as FetchError::Timeout
    pub fn new(base_url: &str, cache_key: Option<CacheKey>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpFetcher {
            client,
            base: directory_url(base_url)?,
            cache_key,
        })
    }

    // "/notes/a.md" -> "https://example.com/blog/notes/a.md?v3"
    pub fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        let mut url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|_| FetchError::InvalidUrl(path.to_string()))?;
        if let Some(key) = self.cache_key.as_ref().and_then(|keys| keys.for_path(path)) {
            url.set_query(Some(key));
        }
        Ok(url)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        let url = self.url_for(path)?;
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

// Url::join replaces the last segment unless the base ends with '/'
pub(crate) fn directory_url(base_url: &str) -> anyhow::Result<Url> {
    let mut base = Url::parse(base_url)
        .map_err(|e| anyhow::anyhow!("Invalid URL '{}': {}", base_url, e))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base: &str, cache_key: Option<CacheKey>) -> HttpFetcher {
        HttpFetcher::new(base, cache_key, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_url_for_root_site() {
        let f = fetcher("https://example.com", None);
        assert_eq!(f.url_for("/notes/a.md").unwrap().as_str(), "https://example.com/notes/a.md");
    }

    #[test]
    fn test_url_for_sub_directory_site() {
        let f = fetcher("https://example.com/blog", None);
        assert_eq!(f.url_for("/a.md").unwrap().as_str(), "https://example.com/blog/a.md");
    }

    #[test]
    fn test_global_cache_key() {
        let f = fetcher("https://example.com/", Some(CacheKey::Global("v3".to_string())));
        assert_eq!(f.url_for("/a.md").unwrap().as_str(), "https://example.com/a.md?v3");
    }

    #[test]
    fn test_per_path_cache_key() {
        let keys = BTreeMap::from([("/a.md".to_string(), "1".to_string())]);
        let f = fetcher("https://example.com/", Some(CacheKey::PerPath(keys)));
        assert_eq!(f.url_for("/a.md").unwrap().as_str(), "https://example.com/a.md?1");
        assert_eq!(f.url_for("/b.md").unwrap().as_str(), "https://example.com/b.md");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpFetcher::new("not a url", None, Duration::from_secs(1)).is_err());
    }
}
