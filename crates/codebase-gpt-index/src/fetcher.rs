//! Shallow clone of a remote repository into a temporary directory.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use url::Url;

use crate::error::CloneError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Local copy of a repository. A temporary clone is deleted when this is dropped.
#[derive(Debug)]
pub struct Snapshot {
    root: PathBuf,
    _dir: Option<TempDir>,
}

impl Snapshot {
    /// Snapshot over an existing directory that outlives it.
    #[must_use]
    pub fn borrowed(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _dir: None,
        }
    }

    fn temporary(dir: TempDir, root: PathBuf) -> Self {
        Self {
            root,
            _dir: Some(dir),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub trait RepoFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Snapshot, CloneError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub git_binary: String,
    pub depth: u32,
    pub timeout_secs: u64,
    /// Accept `file://` URLs. Off for anything reachable from the network.
    pub allow_local: bool,
    /// Parent for clone directories; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            git_binary: "git".into(),
            depth: 1,
            timeout_secs: 120,
            allow_local: false,
            work_dir: None,
        }
    }
}

/// Check that `url` names a repository git can clone.
///
/// scp-style remotes (`git@github.com:acme/widget.git`) are checked as the equivalent
/// `ssh://` URL. Bare `host:path` without a user is not recognised and fails to parse.
///
/// # Errors
///
/// Returns [`CloneError::InvalidUrl`] for empty or unparsable input and
/// [`CloneError::UnsupportedScheme`] for schemes other than https, http, ssh, git
/// (and file when `allow_local`).
pub fn validate_repo_url(url: &str, allow_local: bool) -> Result<Url, CloneError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CloneError::InvalidUrl {
            url: url.to_owned(),
            reason: "empty".into(),
        });
    }
    let candidate = scp_as_ssh(trimmed);
    let parsed = Url::parse(candidate.as_deref().unwrap_or(trimmed)).map_err(|e| {
        CloneError::InvalidUrl {
            url: trimmed.to_owned(),
            reason: e.to_string(),
        }
    })?;
    match parsed.scheme() {
        "https" | "http" | "ssh" | "git" => {
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(CloneError::InvalidUrl {
                    url: trimmed.to_owned(),
                    reason: "missing host".into(),
                });
            }
        }
        "file" if allow_local => {}
        other => return Err(CloneError::UnsupportedScheme(other.to_owned())),
    }
    Ok(parsed)
}

/// `user@host:path` rewritten as `ssh://user@host/path`, or `None` for anything else.
fn scp_as_ssh(url: &str) -> Option<String> {
    if url.contains("://") {
        return None;
    }
    let (authority, path) = url.split_once(':')?;
    let (user, host) = authority.split_once('@')?;
    if user.is_empty() || host.is_empty() || authority.contains('/') || path.is_empty() {
        return None;
    }
    Some(format!("ssh://{authority}/{}", path.trim_start_matches('/')))
}

/// Runs `git clone --depth N` as a child process.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    config: FetchConfig,
}

impl GitFetcher {
    #[must_use]
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    fn temp_dir(&self) -> Result<TempDir, CloneError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codebase-gpt-");
        let dir = match &self.config.work_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn clone_repo(&self, url: &str) -> Result<Snapshot, CloneError> {
        validate_repo_url(url, self.config.allow_local)?;
        let url = url.trim();
        let dir = self.temp_dir()?;
        let dest = dir.path().join("repo");

        let mut cmd = tokio::process::Command::new(&self.config.git_binary);
        cmd.args(["clone", "--quiet", "--depth"])
            .arg(self.config.depth.max(1).to_string())
            .arg("--")
            .arg(url)
            .arg(&dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(url, dest = %dest.display(), "running git clone");
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| CloneError::Timeout(self.config.timeout_secs))?
            .map_err(|source| CloneError::Spawn {
                binary: self.config.git_binary.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloneError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }

        Ok(Snapshot::temporary(dir, dest))
    }
}

impl RepoFetcher for GitFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Snapshot, CloneError>> {
        Box::pin(self.clone_repo(url))
    }
}
