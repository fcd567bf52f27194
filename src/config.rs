// src/config.rs
// =============================================================================
// This file loads the site configuration from a TOML file.
//
// Example (wiki-graph.toml):
//
//   base_url = "https://blog.example.com/"
//   cache_key = "v3"
//
//   [paths]
//   index = "/index.md"
//   readme = "/README.md"
//
//   [prerender]
//   host = "http://localhost:8080"
//   browser_endpoint = "http://localhost:3000"
//
// The root paths are where every crawl starts. Without them there is nothing
// to crawl, so a missing or malformed root stops the program before any
// request is made.
// =============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::crawl::{DEFAULT_CONCURRENCY, DEFAULT_ERROR_MESSAGE};
use crate::fetch::CacheKey;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required root path `paths.{0}`")]
    MissingRoot(&'static str),

    #[error("root path `paths.{name}` must start with '/' and end with '.md', got {value:?}")]
    InvalidRoot { name: &'static str, value: String },

    #[error("the `site` command needs a [prerender] section")]
    MissingPrerender,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Origin the live driver fetches raw markdown from
    pub base_url: String,
    #[serde(default)]
    pub cache_key: Option<CacheKey>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub paths: RootPaths,
    #[serde(default)]
    pub messages: Messages,
    #[serde(default)]
    pub prerender: Option<PrerenderConfig>,
}

// The well-known documents of a site, in crawl order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootPaths {
    pub index: Option<String>,
    pub readme: Option<String>,
    pub archive: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub common: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Messages {
    #[serde(default = "default_page_error")]
    pub page_error: String,
}

impl Default for Messages {
    fn default() -> Self {
        Messages {
            page_error: default_page_error(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrerenderConfig {
    /// Where the client application is served, e.g. http://localhost:8080
    pub host: String,
    #[serde(default = "default_index_path")]
    pub index_path: String,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Base URL of the remote headless browser service
    pub browser_endpoint: String,
    #[serde(default)]
    pub browser_token: Option<String>,
    #[serde(default = "default_asset_prefix")]
    pub asset_prefix: String,
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_page_error() -> String {
    DEFAULT_ERROR_MESSAGE.to_string()
}

fn default_index_path() -> String {
    "/".to_string()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_asset_prefix() -> String {
    "/assets/".to_string()
}

fn default_page_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.roots()?;
        Ok(config)
    }

    // Root paths in crawl order, without duplicates
    //
    // `index` is required; every configured root must be a canonical
    // document path.
    pub fn roots(&self) -> Result<Vec<String>, ConfigError> {
        let paths = &self.paths;
        if paths.index.is_none() {
            return Err(ConfigError::MissingRoot("index"));
        }

        let named = [
            ("index", &paths.index),
            ("readme", &paths.readme),
            ("archive", &paths.archive),
            ("category", &paths.category),
            ("search", &paths.search),
            ("common", &paths.common),
        ];

        let mut roots: Vec<String> = Vec::new();
        for (name, value) in named {
            let Some(value) = value else { continue };
            if !value.starts_with('/') || !value.ends_with(".md") {
                return Err(ConfigError::InvalidRoot {
                    name,
                    value: value.clone(),
                });
            }
            if !roots.contains(value) {
                roots.push(value.clone());
            }
        }
        Ok(roots)
    }

    pub fn prerender(&self) -> Result<&PrerenderConfig, ConfigError> {
        self.prerender.as_ref().ok_or(ConfigError::MissingPrerender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
base_url = "https://blog.example.com/"

[paths]
index = "/index.md"
readme = "/README.md"
archive = "/index.md"
"#;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.messages.page_error, DEFAULT_ERROR_MESSAGE);
        assert!(config.cache_key.is_none());
        assert!(config.prerender().is_err());
    }

    #[test]
    fn test_roots_are_ordered_and_distinct() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.roots().unwrap(), vec!["/index.md", "/README.md"]);
    }

    #[test]
    fn test_missing_index_is_fatal() {
        let err = Config::from_toml("base_url = \"https://x.io\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRoot("index")));
    }

    #[test]
    fn test_non_canonical_root_is_rejected() {
        let text = "base_url = \"https://x.io\"\n[paths]\nindex = \"index.html\"\n";
        let err = Config::from_toml(text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoot { name: "index", .. }));
    }

    #[test]
    fn test_cache_key_forms() {
        let text = format!("{MINIMAL}\n[cache_key]\n\"/index.md\" = \"7\"\n");
        let config = Config::from_toml(&text).unwrap();
        let key = config.cache_key.unwrap();
        assert_eq!(key.for_path("/index.md"), Some("7"));

        let text = MINIMAL.replace("base_url", "cache_key = \"v3\"\nbase_url");
        let config = Config::from_toml(&text).unwrap();
        assert_eq!(config.cache_key.unwrap().for_path("/any.md"), Some("v3"));
    }

    #[test]
    fn test_prerender_section() {
        let text = format!(
            "{MINIMAL}\n[prerender]\nhost = \"http://localhost:8080\"\nbrowser_endpoint = \"http://localhost:3000\"\n"
        );
        let config = Config::from_toml(&text).unwrap();
        let prerender = config.prerender().unwrap();
        assert_eq!(prerender.index_path, "/");
        assert_eq!(prerender.asset_prefix, "/assets/");
        assert_eq!(prerender.out_dir, PathBuf::from("dist"));
    }
}
