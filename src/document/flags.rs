// src/document/flags.rs
// =============================================================================
// This module splits a raw markdown document into its body and its "flags".
//
// Flags are metadata lines written at the top of a document:
//
//   @tags: rust, notes/async
//   @updated: 2020-01-01, 2021-03-04
//   @cover: ![cover](images/cover.png)
//   # The Title
//
// Every flag line is consumed, the first top-level heading becomes the title,
// and everything else is kept as body text. Dates are gathered from the
// `updated` flag and from any date embedded in the path, then normalised.
//
// Nothing in here fails: a malformed flag or an unparseable date is simply
// ignored so the rest of the document still parses.
// =============================================================================

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::markdown::is_external_link;

// `@name: value` with the value trimmed; the value must not be empty
static FLAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@(\S+?):\s*(.+?)\s*$").expect("flag pattern is valid"));

// A level-one ATX heading: up to three spaces, one '#', then the text
static TITLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#[ \t]+(.+?)$").expect("title pattern is valid"));

// `![alt](target "optional title")` filling the whole value
static COVER_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^!\[(.*?)\]\(\s*(.*?)(?:\s+["'].*?["'])?\s*\)$"#)
        .expect("cover pattern is valid")
});

// A date segment inside a path, e.g. /posts/2020-01-01-hello.md
static PATH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(\d{4}[/-]\d{2}[/-]\d{2})[/-]").expect("path date pattern is valid")
});

/// Dates derived from the `updated` flag and the document path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedDates {
    /// Millisecond timestamps, sorted ascending, no duplicates
    pub times: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// Metadata declared at the top of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagSet {
    pub title: String,
    pub tags: Vec<String>,
    pub updated: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    /// Any other `@name: value` flag, kept verbatim
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    #[serde(flatten)]
    pub derived: DerivedDates,
}

impl FlagSet {
    // Flags every document starts with: only the title is known, from the path
    pub fn for_path(path: &str) -> Self {
        FlagSet {
            title: shorten_path(path),
            ..FlagSet::default()
        }
    }
}

// Parses raw document text into (body, flags)
//
// Parameters:
//   path: canonical document path, used for the default title and for dates
//   raw: the full document text
//
// Returns: the trimmed body with flag and title lines removed, and the flags
pub fn parse(path: &str, raw: &str) -> (String, FlagSet) {
    let mut flags = FlagSet::for_path(path);
    let mut has_title = false;
    let mut body = Vec::new();

    for line in raw.lines() {
        let line = line.trim_end();

        if let Some(caps) = FLAG_LINE.captures(line.trim_start()) {
            apply_flag(&mut flags, &mut has_title, &caps[1], &caps[2]);
            continue;
        }

        // Only the first heading is the title; later ones are content
        if !has_title {
            if let Some(caps) = TITLE_LINE.captures(line) {
                flags.title = caps[1].trim().to_string();
                has_title = true;
                continue;
            }
        }

        body.push(line);
    }

    flags.tags = normalize_tags(&flags.tags);
    flags.cover = flags.cover.as_deref().map(resolve_cover);
    flags.derived = derive_dates(path, &flags.updated);

    (body.join("\n").trim().to_string(), flags)
}

fn apply_flag(flags: &mut FlagSet, has_title: &mut bool, name: &str, value: &str) {
    match name {
        "tags" => flags.tags = split_list(value),
        "updated" => flags.updated = split_list(value),
        "cover" => flags.cover = Some(value.to_string()),
        "title" => {
            flags.title = value.to_string();
            *has_title = true;
        }
        _ => {
            flags.extra.insert(name.to_string(), value.to_string());
        }
    }
}

// Splits a multi-value flag on ASCII, fullwidth and ideographic commas
fn split_list(value: &str) -> Vec<String> {
    sorted_distinct(
        value
            .split([',', '，', '、'])
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string),
    )
}

fn sorted_distinct(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

// "a / b /" -> "a/b"; tags that end up empty are dropped
fn normalize_tags(tags: &[String]) -> Vec<String> {
    sorted_distinct(
        tags.iter()
            .map(|tag| {
                tag.split('/')
                    .map(str::trim)
                    .filter(|segment| !segment.is_empty())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|tag| !tag.is_empty()),
    )
}

fn resolve_cover(cover: &str) -> String {
    let target = COVER_IMAGE
        .captures(cover)
        .and_then(|caps| caps.get(2))
        .map_or(cover, |m| m.as_str());

    if is_external_link(target) {
        target.to_string()
    } else {
        site_rooted(target)
    }
}

// Turns a relative asset reference into an absolute site path
pub fn site_rooted(target: &str) -> String {
    let mut target = target;
    while let Some(rest) = target.strip_prefix("./") {
        target = rest;
    }
    if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{target}")
    }
}

// "/notes/rust.md" -> "/notes/rust", "/notes/index.md" -> "/notes/"
pub fn shorten_path(path: &str) -> String {
    if let Some(dir) = path.strip_suffix("index.md") {
        if dir.ends_with('/') {
            return dir.to_string();
        }
    }
    path.strip_suffix(".md").unwrap_or(path).to_string()
}

fn derive_dates(path: &str, updated: &[String]) -> DerivedDates {
    let mut candidates: Vec<&str> = updated.iter().map(String::as_str).collect();
    if let Some(caps) = PATH_DATE.captures(path) {
        if let Some(m) = caps.get(1) {
            candidates.push(m.as_str());
        }
    }

    // Timestamps that cannot be formatted back into a date are as useless
    // as unparseable ones
    let times: Vec<i64> = candidates
        .into_iter()
        .filter_map(parse_time)
        .filter(|time| format_time(*time).is_some())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let start_date = times.first().copied().and_then(format_time);
    let end_date = times.last().copied().and_then(format_time);

    DerivedDates {
        times,
        start_date,
        end_date,
    }
}

// Accepts a raw millisecond timestamp, YYYY-MM-DD, YYYY/MM/DD or RFC 3339
pub fn parse_time(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok();
    }

    let dashed = value.replace('/', "-");
    if let Ok(date) = NaiveDate::parse_from_str(&dashed, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc().timestamp_millis());
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

pub fn format_time(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.format("%Y-%m-%d").to_string())
}
