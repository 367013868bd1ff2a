//! Mapping between local file identities and the path spellings the
//! debuggee reports.
//!
//! The game reports chunk names relative to its own resource root, often
//! with a leading `@` for sources loaded as chunks. Breakpoints have to be
//! registered under whichever spelling the debuggee echoes back on pause,
//! so the resolver hands out every candidate it knows.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A single `local_root` ↔ `remote_root` prefix pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Directory on the local file system.
    pub local_root: PathBuf,
    /// Normalized remote prefix (no `@`, forward slashes, no trailing `/`).
    pub remote_root: String,
}

impl PathMapping {
    /// Create a mapping, normalizing the remote side.
    pub fn new(local_root: impl Into<PathBuf>, remote_root: &str) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: normalize_remote(remote_root),
        }
    }
}

/// Normalize a remote path: drop a leading `@`, use forward slashes, and
/// trim trailing separators (a lone `/` is kept).
pub fn normalize_remote(path: &str) -> String {
    let path = path.trim();
    let path = path.strip_prefix('@').unwrap_or(path);
    let mut normalized = path.replace('\\', "/");
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Bidirectional resolver between local paths and remote path spellings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    project_root: PathBuf,
    mappings: Vec<PathMapping>,
}

impl PathResolver {
    /// Create a resolver rooted at `project_root` with no explicit mappings.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            mappings: Vec::new(),
        }
    }

    /// Add an explicit mapping. Mappings are tried in insertion order.
    pub fn with_mapping(mut self, mapping: PathMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Replace all explicit mappings.
    pub fn set_mappings(&mut self, mappings: Vec<PathMapping>) {
        self.mappings = mappings;
    }

    /// The project root used for relative resolution.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The explicit mappings, in lookup order.
    pub fn mappings(&self) -> &[PathMapping] {
        &self.mappings
    }

    /// Every remote spelling under which the debuggee may report `local`.
    ///
    /// Returns the bare candidate followed by its `@`-prefixed variant, or
    /// an empty list when the file lies outside every known root.
    pub fn compute_remote_candidates(&self, local: &Path) -> Vec<String> {
        let Some(base) = self
            .mapped_remote(local)
            .or_else(|| self.project_relative(local))
        else {
            tracing::debug!(path = %local.display(), "no remote spelling for local path");
            return Vec::new();
        };
        let prefixed = format!("@{base}");
        vec![base, prefixed]
    }

    /// Resolve a remote path back to a local file.
    ///
    /// `None` means the position is unknown; callers must not treat it as
    /// an error.
    pub fn resolve_local_path(&self, remote: &str) -> Option<PathBuf> {
        let remote = normalize_remote(remote);
        if remote.is_empty() {
            return None;
        }

        for mapping in &self.mappings {
            if let Some(rest) = strip_remote_prefix(&remote, &mapping.remote_root) {
                return Some(join_relative(&mapping.local_root, rest));
            }
        }

        let as_path = Path::new(&remote);
        if as_path.is_absolute() && as_path.starts_with(&self.project_root) {
            return Some(as_path.to_path_buf());
        }
        if let Some(rooted) = remote.strip_prefix('/') {
            // Game resource paths are rooted at the project, not the file system.
            return Some(join_relative(&self.project_root, rooted));
        }
        if as_path.is_absolute() || has_drive_prefix(&remote) {
            return Some(as_path.to_path_buf());
        }
        Some(join_relative(&self.project_root, &remote))
    }

    fn mapped_remote(&self, local: &Path) -> Option<String> {
        self.mappings.iter().find_map(|mapping| {
            let rest = local.strip_prefix(&mapping.local_root).ok()?;
            Some(join_remote(&mapping.remote_root, &to_slash(rest)))
        })
    }

    fn project_relative(&self, local: &Path) -> Option<String> {
        if local.is_relative() {
            return Some(to_slash(local));
        }
        let rest = local.strip_prefix(&self.project_root).ok()?;
        Some(to_slash(rest))
    }
}

fn strip_remote_prefix<'a>(remote: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return (!remote.starts_with('/')).then_some(remote);
    }
    if remote == root {
        return Some("");
    }
    if root == "/" {
        return remote.strip_prefix('/');
    }
    remote.strip_prefix(root)?.strip_prefix('/')
}

fn join_remote(root: &str, rest: &str) -> String {
    match (root.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => root.to_string(),
        (false, false) if root.ends_with('/') => format!("{root}{rest}"),
        (false, false) => format!("{root}/{rest}"),
    }
}

fn join_relative(base: &Path, rest: &str) -> PathBuf {
    rest.split('/')
        .filter(|segment| !segment.is_empty())
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}

fn to_slash(path: &Path) -> String {
    path.iter()
        .map(|segment| segment.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
