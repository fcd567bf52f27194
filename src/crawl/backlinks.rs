// src/crawl/backlinks.rs
// =============================================================================
// The backlink index: for every document, which documents link to it.
//
// It only ever grows. Recording the same (target, source) pair twice is a
// no-op, which makes it safe to re-parse a document or to record from many
// concurrent fetches. Resetting the document cache leaves it untouched.
// =============================================================================

use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct BacklinkIndex {
    // target -> sources, in the order they were first recorded
    entries: Mutex<BTreeMap<String, Vec<String>>>,
}

impl BacklinkIndex {
    pub fn new() -> Self {
        BacklinkIndex::default()
    }

    // Records that `source` links to `target`
    //
    // Returns: true if this pair was not known yet
    pub fn record(&self, target: &str, source: &str) -> bool {
        let mut entries = self.entries.lock();
        let sources = entries.entry(target.to_string()).or_default();
        if sources.iter().any(|known| known == source) {
            return false;
        }
        sources.push(source.to_string());
        true
    }

    pub fn sources(&self, target: &str) -> Vec<String> {
        self.entries.lock().get(target).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_idempotent() {
        let index = BacklinkIndex::new();
        assert!(index.is_empty());
        assert!(index.record("/b.md", "/a.md"));
        assert!(!index.record("/b.md", "/a.md"));
        assert!(index.record("/b.md", "/c.md"));
        assert_eq!(index.sources("/b.md"), vec!["/a.md", "/c.md"]);
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_unknown_target_has_no_entry() {
        let index = BacklinkIndex::new();
        assert!(index.sources("/nobody-links-here.md").is_empty());
        assert!(index.snapshot().is_empty());
    }
}
