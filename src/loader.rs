//! Document loader.
//!
//! Walks a repository checkout depth-first and turns every readable text
//! file into a [`Document`]. Loading is best-effort: files that cannot be
//! read or decoded as UTF-8 are skipped and counted, and directories that
//! cannot be listed contribute nothing. Neither aborts the walk.
//!
//! Entries are visited in file-name order so the resulting document list,
//! and therefore which files survive the ingestion caps, is reproducible.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::config::LoaderConfig;
use crate::models::Document;

/// Documents found under a root, plus how many files were skipped.
#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<Document>,
    /// Files that were unreadable or not valid UTF-8 text.
    pub skipped: usize,
}

/// Load every text document under `root`.
///
/// Returns an error only for an invalid `exclude_globs` pattern; all
/// filesystem problems are swallowed per entry.
pub fn load_documents(root: &Path, config: &LoaderConfig) -> Result<LoadedDocuments> {
    let exclude_set = build_globset(&config.exclude_globs)?;
    let mut loaded = LoadedDocuments::default();

    let walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(entry, config));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("skipping unreadable path: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        match read_text(path) {
            Some(text) => loaded.documents.push(Document {
                source_path: rel_str,
                text,
            }),
            None => {
                tracing::debug!(path = %rel_str, "skipping unreadable or binary file");
                loaded.skipped += 1;
            }
        }
    }

    Ok(loaded)
}

/// Hidden entries and well-known non-source directories are pruned.
fn is_ignored(entry: &DirEntry, config: &LoaderConfig) -> bool {
    let name = entry.file_name().to_string_lossy();
    if !config.hidden_prefix.is_empty() && name.starts_with(&config.hidden_prefix) {
        return true;
    }
    entry.file_type().is_dir() && config.ignore_dirs.iter().any(|d| d.as_str() == name)
}

/// Read a file as UTF-8 text. `None` for I/O errors, invalid UTF-8, or
/// content containing NUL bytes.
fn read_text(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(loaded: &LoadedDocuments) -> Vec<&str> {
        loaded
            .documents
            .iter()
            .map(|d| d.source_path.as_str())
            .collect()
    }

    #[test]
    fn test_loads_nested_files_in_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/main.rs", b"fn main() {}");
        write(tmp.path(), "README.md", b"# readme");
        write(tmp.path(), "src/lib/util.rs", b"pub fn util() {}");

        let loaded = load_documents(tmp.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(
            paths(&loaded),
            vec!["README.md", "src/lib/util.rs", "src/main.rs"]
        );
        assert_eq!(loaded.skipped, 0);
    }

    #[test]
    fn test_skips_hidden_and_ignored() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "app.py", b"print('hi')");
        write(tmp.path(), ".env", b"SECRET=1");
        write(tmp.path(), ".github/workflows/ci.yml", b"on: push");
        write(tmp.path(), "node_modules/left-pad/index.js", b"module.exports = 1");
        write(tmp.path(), "pkg/__pycache__/mod.pyc", b"cached");
        write(tmp.path(), "venv/lib/site.py", b"x = 1");
        write(tmp.path(), "env/bin/activate", b"export X=1");

        let loaded = load_documents(tmp.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(paths(&loaded), vec!["app.py"]);
    }

    #[test]
    fn test_ignored_name_applies_to_dirs_only() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "docs/env", b"a file named env");

        let loaded = load_documents(tmp.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(paths(&loaded), vec!["docs/env"]);
    }

    #[test]
    fn test_binary_files_skipped_and_counted() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "logo.png", &[0x89, 0x50, 0x4e, 0x47, 0x00, 0xff]);
        write(tmp.path(), "latin1.txt", &[0x63, 0x61, 0x66, 0xe9]);
        write(tmp.path(), "ok.txt", "caf\u{e9}".as_bytes());

        let loaded = load_documents(tmp.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(paths(&loaded), vec!["ok.txt"]);
        assert_eq!(loaded.skipped, 2);
    }

    #[test]
    fn test_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/lib.rs", b"pub mod a;");
        write(tmp.path(), "Cargo.lock", b"# lock");
        write(tmp.path(), "target/debug/build.log", b"log");

        let config = LoaderConfig {
            exclude_globs: vec!["**/*.lock".to_string(), "target/**".to_string()],
            ..LoaderConfig::default()
        };
        let loaded = load_documents(tmp.path(), &config).unwrap();
        assert_eq!(paths(&loaded), vec!["src/lib.rs"]);
    }

    #[test]
    fn test_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let loaded = load_documents(tmp.path(), &LoaderConfig::default()).unwrap();
        assert!(loaded.documents.is_empty());
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let loaded =
            load_documents(&tmp.path().join("does-not-exist"), &LoaderConfig::default()).unwrap();
        assert!(loaded.documents.is_empty());
    }
}
