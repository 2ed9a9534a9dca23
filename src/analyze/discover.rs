#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Source-file discovery with glob-based exclusion.

use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use crate::error::{AnalysisError, ConfigError};

/// A compiled set of exclusion globs.
///
/// Patterns are simplified before compiling: `**/` is dropped and any other
/// `**` becomes `*`. Because `*` also matches `/`, the simplified pattern is
/// tested against the relative path and against every suffix of it, so
/// `**/venv/**` excludes `venv/x.py` as well as `app/venv/lib/y.py`.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    /// Compiled patterns.
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// Compiles `patterns`, failing on the first invalid glob.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let simplified = raw.replace("**/", "").replace("**", "*");
                Pattern::new(&simplified).map_err(|e| ConfigError::BadPattern {
                    pattern: raw.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns true if the `/`-separated relative path matches any pattern.
    pub fn is_excluded(&self, relative: &str) -> bool {
        let parts: Vec<&str> = relative.split('/').collect();
        self.patterns.iter().any(|pattern| {
            (0..parts.len()).any(|start| pattern.matches(&parts[start..].join("/")))
        })
    }

    /// Returns true if a directory's whole subtree is excluded.
    fn prunes_dir(&self, relative: &str) -> bool {
        self.is_excluded(relative) || self.is_excluded(&format!("{relative}/"))
    }
}

/// Converts `path` into a `/`-separated path relative to `root`.
pub fn relative_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Recursively finds files under `root` whose name ends with `extension` and
/// whose relative path is not excluded. Results are sorted by path.
///
/// Entries below the root that cannot be read are skipped with a warning; an
/// unreadable root is an error.
pub fn find_source_files(
    root: &Path,
    extension: &str,
    excludes: &ExcludeSet,
) -> Result<Vec<PathBuf>, AnalysisError> {
    if !root.exists() {
        return Err(AnalysisError::MissingRoot(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(AnalysisError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|source| AnalysisError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !excludes.prunes_dir(&relative_path(entry.path(), root))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.ends_with(extension) {
            continue;
        }
        if excludes.is_excluded(&relative_path(entry.path(), root)) {
            tracing::debug!("Excluding {}", entry.path().display());
            continue;
        }
        files.push(entry.into_path());
    }

    Ok(files)
}
