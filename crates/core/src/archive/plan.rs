//! File enumeration and greedy grouping for the archive splitter.

use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::ArchiveError;

/// A file scheduled for archiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    /// Absolute path of the file on disk.
    pub path: PathBuf,
    /// `/`-separated path relative to the source directory.
    pub name: String,
    pub size: u64,
}

/// Groups consecutive sizes into archives without exceeding `limit`.
///
/// A new group is started when the next size would push the current group
/// over the limit and the current group is not empty. A size larger than the
/// limit therefore always ends up alone in its own group.
pub fn plan_groups(sizes: &[u64], limit: u64) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut current: u64 = 0;

    for (i, &size) in sizes.iter().enumerate() {
        if i > start && current.saturating_add(size) > limit {
            groups.push(start..i);
            start = i;
            current = 0;
        }
        current = current.saturating_add(size);
    }
    if start < sizes.len() {
        groups.push(start..sizes.len());
    }
    groups
}

/// Lists every regular file below `source_dir` in file-name order.
///
/// `exclude` is skipped entirely, so archives written inside the source tree
/// are never picked up.
pub fn collect_entries(
    source_dir: &Path,
    exclude: Option<&Path>,
) -> Result<Vec<PlannedEntry>, ArchiveError> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| exclude.map_or(true, |ex| e.path() != ex));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry.metadata()?.len();
        let name = entry_name(source_dir, entry.path()).ok_or_else(|| ArchiveError::Io {
            path: entry.path().to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path is not below the source directory",
            ),
        })?;
        entries.push(PlannedEntry {
            path: entry.into_path(),
            name,
            size,
        });
    }
    Ok(entries)
}

/// Relative path of `path` below `root`, joined with `/`.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
