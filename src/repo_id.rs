//! Repository identifiers.
//!
//! A [`RepoId`] is the isolation key for everything repochat stores about
//! a repository: the checkout directory, the index directory, and the key
//! every later question is asked against.
//!
//! Identifiers are derived from GitHub-style URLs as `{owner}_{repo}`,
//! lower-cased. GitHub owner names cannot contain `_`, so the first
//! underscore always separates owner from repository and two distinct
//! repositories can never map to the same identifier.
//!
//! ```rust
//! use repochat::repo_id::RepoId;
//!
//! let id = RepoId::from_url("https://github.com/rust-lang/rust-clippy.git").unwrap();
//! assert_eq!(id.as_str(), "rust-lang_rust-clippy");
//! assert_eq!(id.owner(), "rust-lang");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RepoIdError;

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

/// Stable, filesystem-safe key for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Derive the identifier for a repository URL.
    ///
    /// Accepts `http(s)://github.com/{owner}/{repo}` with an optional
    /// `.git` suffix, trailing slash, or extra path segments
    /// (`/tree/main/src`), all of which map to the same identifier.
    pub fn from_url(input: &str) -> Result<Self, RepoIdError> {
        let invalid = || RepoIdError::InvalidUrl(input.to_string());

        let url = Url::parse(input.trim()).map_err(|_| invalid())?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?.to_ascii_lowercase();
        if !GITHUB_HOSTS.contains(&host.as_str()) {
            return Err(invalid());
        }

        let mut segments = url
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|s| !s.is_empty());
        let owner = segments.next().ok_or_else(invalid)?;
        let repo = segments.next().ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        if !is_valid_owner(owner) || !is_valid_repo(repo) {
            return Err(invalid());
        }

        Ok(Self(format!("{}_{}", owner, repo).to_ascii_lowercase()))
    }

    /// Validate an identifier supplied by a caller (e.g. from a previous
    /// `process-repo` response).
    pub fn parse(input: &str) -> Result<Self, RepoIdError> {
        let invalid = || RepoIdError::InvalidId(input.to_string());
        let (owner, repo) = input.trim().split_once('_').ok_or_else(invalid)?;
        if !is_valid_owner(owner) || !is_valid_repo(repo) {
            return Err(invalid());
        }
        Ok(Self(format!("{}_{}", owner, repo).to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('_').map(|(o, _)| o).unwrap_or(&self.0)
    }

    pub fn name(&self) -> &str {
        self.0.split_once('_').map(|(_, r)| r).unwrap_or_default()
    }

    /// The `https` clone URL for this repository.
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner(), self.name())
    }
}

fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_repo(repo: &str) -> bool {
    !repo.is_empty()
        && repo != "."
        && repo != ".."
        && repo
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepoId {
    type Err = RepoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepoId {
    type Error = RepoIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}
