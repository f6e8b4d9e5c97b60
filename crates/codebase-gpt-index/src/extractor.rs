//! Source file extraction from a cloned snapshot.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// A decoded text file, named by its `/`-separated path relative to the snapshot root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Lower-case extensions without the dot.
    pub extensions: Vec<String>,
    /// Extension-less file names that are still source (`Makefile`).
    pub special_names: Vec<String>,
    /// Directory names never descended into.
    pub ignored_dirs: Vec<String>,
    pub max_file_bytes: u64,
    pub max_repo_bytes: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| (*s).to_owned()).collect() };
        Self {
            extensions: strings(&[
                "py", "js", "tsx", "jsx", "ipynb", "java", "cpp", "ts", "go", "rs", "vue",
                "swift", "c", "h",
            ]),
            special_names: strings(&["Makefile", "Dockerfile"]),
            ignored_dirs: strings(&[
                "node_modules",
                "venv",
                "env",
                "dist",
                "build",
                ".git",
                "__pycache__",
                ".next",
                ".vscode",
                "vendor",
                "target",
            ]),
            max_file_bytes: 1_048_576,
            max_repo_bytes: 52_428_800,
        }
    }
}

/// Result of walking one snapshot.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Sorted by name.
    pub files: Vec<SourceFile>,
    /// Matching files left out: oversized, binary, undecodable or unreadable.
    pub skipped: usize,
    /// Set when `max_repo_bytes` stopped the walk early.
    pub truncated: bool,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    extensions: HashSet<String>,
    special_names: HashSet<String>,
    ignored_dirs: Arc<HashSet<String>>,
    max_file_bytes: u64,
    max_repo_bytes: u64,
}

impl Extractor {
    #[must_use]
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            special_names: config.special_names.iter().map(|n| n.to_lowercase()).collect(),
            ignored_dirs: Arc::new(config.ignored_dirs.iter().cloned().collect()),
            max_file_bytes: config.max_file_bytes,
            max_repo_bytes: config.max_repo_bytes,
        }
    }

    #[must_use]
    pub fn is_included(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && self.extensions.contains(&ext.to_lowercase())
        {
            return true;
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.special_names.contains(&n.to_lowercase()))
    }

    /// Walk `root` and read every included file as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Root`] if `root` is missing or not a directory.
    pub fn extract(&self, root: &Path) -> Result<Extraction, ExtractError> {
        let meta = std::fs::metadata(root).map_err(|source| ExtractError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ExtractError::Root {
                path: root.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }

        let ignored = Arc::clone(&self.ignored_dirs);
        let entries = ignore::WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |e| {
                !(e.file_type().is_some_and(|ft| ft.is_dir())
                    && e.file_name().to_str().is_some_and(|n| ignored.contains(n)))
            })
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && self.is_included(e.path()));

        let mut out = Extraction::default();
        for entry in entries {
            let path = entry.path();
            let name = relative_name(root, path);

            let len = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    tracing::debug!(file = %name, "skipping unreadable metadata: {e}");
                    out.skipped += 1;
                    continue;
                }
            };
            if len > self.max_file_bytes {
                tracing::debug!(file = %name, len, "skipping oversized file");
                out.skipped += 1;
                continue;
            }
            if out.total_bytes + len > self.max_repo_bytes {
                tracing::warn!(
                    limit = self.max_repo_bytes,
                    files = out.files.len(),
                    "repository size cap reached, extraction truncated"
                );
                out.truncated = true;
                break;
            }

            let content = match std::fs::read(path) {
                Ok(bytes) if bytes.contains(&0) => {
                    tracing::debug!(file = %name, "skipping binary file");
                    out.skipped += 1;
                    continue;
                }
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(_) => {
                        tracing::debug!(file = %name, "skipping non-UTF-8 file");
                        out.skipped += 1;
                        continue;
                    }
                },
                Err(e) => {
                    tracing::debug!(file = %name, "skipping unreadable file: {e}");
                    out.skipped += 1;
                    continue;
                }
            };

            out.total_bytes += len;
            out.files.push(SourceFile { name, content });
        }

        out.files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// [`Self::extract`] on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`Self::extract`], plus [`ExtractError::Task`] if the worker panics.
    pub async fn extract_async(&self, root: &Path) -> Result<Extraction, ExtractError> {
        let extractor = self.clone();
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || extractor.extract(&root))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
