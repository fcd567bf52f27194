// src/site/sink.rs
// =============================================================================
// Where rendered pages end up.
//
// `DirSink` mirrors the document tree under an output directory:
//   /notes/a.md -> <out>/notes/a.html
// Parent directories are created on demand and existing files overwritten.
// =============================================================================

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::info;

const DOCTYPE: &str = "<!DOCTYPE html>";

pub trait OutputSink: Send + Sync {
    fn write(&self, relative_path: &str, content: &str) -> Result<()>;
}

pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirSink { root: root.into() }
    }

    // Resolves a site path inside the output directory, refusing to leave it
    fn target(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("refusing to write outside the output directory: {relative_path}");
        }
        Ok(self.root.join(relative))
    }
}

impl OutputSink for DirSink {
    fn write(&self, relative_path: &str, content: &str) -> Result<()> {
        let target = self.target(relative_path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        // Serialized DOMs do not carry their doctype
        let has_doctype = content
            .trim_start()
            .get(..DOCTYPE.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(DOCTYPE));
        let page = if has_doctype {
            content.to_string()
        } else {
            format!("{DOCTYPE}{content}")
        };

        fs::write(&target, page).with_context(|| format!("writing {}", target.display()))?;
        info!(path = %target.display(), "wrote page");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_directories_and_doctype() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        sink.write("/notes/deep/a.html", "<html></html>").unwrap();

        let written = fs::read_to_string(dir.path().join("notes/deep/a.html")).unwrap();
        assert_eq!(written, "<!DOCTYPE html><html></html>");
    }

    #[test]
    fn test_write_overwrites_and_keeps_existing_doctype() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path());

        sink.write("index.html", "old").unwrap();
        sink.write("index.html", "<!doctype html><html>new</html>").unwrap();

        let written = fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert_eq!(written, "<!doctype html><html>new</html>");
    }

    #[test]
    fn test_write_refuses_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::new(dir.path().join("out"));
        assert!(sink.write("/../escape.html", "x").is_err());
    }
}
