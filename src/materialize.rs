//! Repository materializer: clone checkouts, list them, read files.
//!
//! Checkouts live at `{repos.clone_dir}/{repo_id}`. Cloning always starts
//! from scratch (any existing checkout is removed first) and strips the
//! `.git` directory afterwards, so the directory holds only working-tree
//! files by the time ingestion walks it.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::ReposConfig;
use crate::error::{FailureKind, RepoIdError};
use crate::repo_id::RepoId;

#[derive(Debug, Error)]
pub enum CloneError {
    #[error(transparent)]
    InvalidUrl(#[from] RepoIdError),

    #[error("Failed to execute 'git clone'. Is git installed?")]
    GitMissing(#[source] std::io::Error),

    #[error("Repository clone timed out after {0}s.")]
    Timeout(u64),

    #[error("Failed to clone repository: {0}")]
    Failed(String),

    #[error("Failed to prepare checkout directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CloneError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CloneError::InvalidUrl(_) | CloneError::Failed(_) => FailureKind::Usage,
            CloneError::Timeout(_) => FailureKind::Timeout,
            CloneError::GitMissing(_) | CloneError::Io { .. } => FailureKind::Dependency,
        }
    }
}

#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("Access denied")]
    Escape,
    #[error("File not found")]
    NotFound,
    #[error("Path is not a file")]
    NotAFile,
    #[error("Cannot display binary file")]
    Binary,
    #[error("Error reading file: {0}")]
    Io(#[from] std::io::Error),
}

/// A freshly cloned checkout.
#[derive(Debug, Clone)]
pub struct MaterializedRepo {
    pub id: RepoId,
    pub path: PathBuf,
}

/// Directory of the checkout for `id`.
pub fn checkout_dir(config: &ReposConfig, id: &RepoId) -> PathBuf {
    config.clone_dir.join(id.as_str())
}

/// Clone the repository named by `id` into its checkout directory,
/// replacing any previous copy.
///
/// Callers sharing a checkout directory must serialize per repository;
/// [`RepoChat::process_repository`](crate::pipeline::RepoChat::process_repository)
/// does.
pub async fn clone_checkout(id: &RepoId, config: &ReposConfig) -> Result<MaterializedRepo, CloneError> {
    let id = id.clone();
    let dest = checkout_dir(config, &id);

    if dest.exists() {
        tracing::info!(repo = %id, path = %dest.display(), "removing previous checkout");
        remove_dir(&dest).await?;
    }
    tokio::fs::create_dir_all(&config.clone_dir)
        .await
        .map_err(|source| CloneError::Io {
            path: config.clone_dir.clone(),
            source,
        })?;

    let mut cmd = tokio::process::Command::new("git");
    cmd.arg("clone");
    if config.shallow {
        cmd.args(["--depth", "1"]);
    }
    cmd.arg(id.clone_url())
        .arg(&dest)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .kill_on_drop(true);

    tracing::info!(repo = %id, "cloning {}", id.clone_url());
    let timeout = Duration::from_secs(config.clone_timeout_secs);
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(CloneError::GitMissing)?,
        Err(_) => {
            let _ = tokio::fs::remove_dir_all(&dest).await;
            return Err(CloneError::Timeout(config.clone_timeout_secs));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CloneError::Failed(stderr.trim().to_string()));
    }

    let git_dir = dest.join(".git");
    if git_dir.exists() {
        remove_dir(&git_dir).await?;
    }

    Ok(MaterializedRepo { id, path: dest })
}

async fn remove_dir(path: &Path) -> Result<(), CloneError> {
    tokio::fs::remove_dir_all(path)
        .await
        .map_err(|source| CloneError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// One entry of a checkout listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileNode {
    Folder {
        name: String,
        path: String,
        children: Vec<FileNode>,
    },
    File {
        name: String,
        path: String,
    },
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            FileNode::Folder { name, .. } | FileNode::File { name, .. } => name,
        }
    }
}

/// Recursive listing of `root`: folders before files, names compared
/// case-insensitively. Unreadable directories list as empty.
pub fn file_tree(root: &Path) -> Vec<FileNode> {
    list_dir(root, "")
}

fn list_dir(dir: &Path, prefix: &str) -> Vec<FileNode> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut entries: Vec<(bool, String)> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| {
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (is_dir, e.file_name().to_string_lossy().into_owned())
        })
        .collect();
    entries.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
    });

    entries
        .into_iter()
        .map(|(is_dir, name)| {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            if is_dir {
                let children = list_dir(&dir.join(&name), &path);
                FileNode::Folder {
                    name,
                    path,
                    children,
                }
            } else {
                FileNode::File { name, path }
            }
        })
        .collect()
}

/// Read a UTF-8 file from inside a checkout.
///
/// `relative` must stay inside `root` both lexically and after resolving
/// symlinks.
pub fn read_repo_file(root: &Path, relative: &str) -> Result<String, FileAccessError> {
    let mut joined = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !joined.pop() {
                    return Err(FileAccessError::Escape);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(FileAccessError::Escape),
        }
    }

    let full = root.join(&joined);
    if !full.exists() {
        return Err(FileAccessError::NotFound);
    }

    let canonical_root = root.canonicalize()?;
    let canonical = full.canonicalize()?;
    if !canonical.starts_with(&canonical_root) {
        return Err(FileAccessError::Escape);
    }
    if !canonical.is_file() {
        return Err(FileAccessError::NotAFile);
    }

    let bytes = std::fs::read(&canonical)?;
    String::from_utf8(bytes).map_err(|_| FileAccessError::Binary)
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

    #[test]
    fn test_file_tree_folders_first_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b.txt", b"b");
        write(tmp.path(), "A.txt", b"a");
        write(tmp.path(), "src/main.rs", b"fn main() {}");
        write(tmp.path(), "Docs/guide.md", b"# guide");

        let tree = file_tree(tmp.path());
        let names: Vec<&str> = tree.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["Docs", "src", "A.txt", "b.txt"]);

        match &tree[1] {
            FileNode::Folder { path, children, .. } => {
                assert_eq!(path, "src");
                assert_eq!(
                    children,
                    &vec![FileNode::File {
                        name: "main.rs".into(),
                        path: "src/main.rs".into()
                    }]
                );
            }
            other => panic!("expected folder, got {:?}", other),
        }
    }

    #[test]
    fn test_file_tree_serializes_type_tag() {
        let node = FileNode::File {
            name: "a.rs".into(),
            path: "a.rs".into(),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["name"], "a.rs");
    }

    #[test]
    fn test_read_repo_file() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/lib.rs", b"pub fn x() {}");
        assert_eq!(
            read_repo_file(tmp.path(), "src/lib.rs").unwrap(),
            "pub fn x() {}"
        );
        assert_eq!(
            read_repo_file(tmp.path(), "./src/../src/lib.rs").unwrap(),
            "pub fn x() {}"
        );
    }

    #[test]
    fn test_read_repo_file_rejections() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        write(&root, "src/lib.rs", b"ok");
        write(&root, "logo.png", &[0x89, 0xff, 0xfe]);
        write(tmp.path(), "secret.txt", b"outside");

        assert!(matches!(
            read_repo_file(&root, "../secret.txt"),
            Err(FileAccessError::Escape)
        ));
        assert!(matches!(
            read_repo_file(&root, "/etc/passwd"),
            Err(FileAccessError::Escape)
        ));
        assert!(matches!(
            read_repo_file(&root, "missing.rs"),
            Err(FileAccessError::NotFound)
        ));
        assert!(matches!(
            read_repo_file(&root, "src"),
            Err(FileAccessError::NotAFile)
        ));
        assert!(matches!(
            read_repo_file(&root, "logo.png"),
            Err(FileAccessError::Binary)
        ));
    }
}
