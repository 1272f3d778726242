//! Size-bounded zip archives.
//!
//! [`ArchiveSplitter`] packs every file under a directory into a sequence of
//! `{base}_{NNN}.zip` archives. Files are taken in file-name order and added
//! greedily; a new archive starts whenever the next file would push the
//! current one over the size limit. Files are never split, so one file larger
//! than the limit becomes an archive of its own.
//!
//! The limit applies to uncompressed entry sizes, which makes the bound hold
//! for the written archives as well.

mod plan;

pub use plan::{collect_entries, plan_groups, PlannedEntry};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Default archive size limit: 50 MiB.
pub const DEFAULT_SIZE_LIMIT: u64 = 50 * 1024 * 1024;

/// Errors raised while building archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Archive size limit must be at least 1 byte")]
    InvalidLimit,

    #[error("Output directory must differ from the source directory: {path}")]
    OutputIsSource { path: PathBuf },

    #[error("Failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive task failed: {0}")]
    Task(String),

    #[error("Archiving cancelled")]
    Cancelled,
}

/// One written archive.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    /// Entry names in the order they were written.
    pub entries: Vec<String>,
    /// Sum of the uncompressed sizes of all entries.
    pub uncompressed_bytes: u64,
}

/// Archives produced by one split, in order.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub archives: Vec<ArchiveInfo>,
}

impl ArchiveManifest {
    pub fn paths(&self) -> Vec<&Path> {
        self.archives.iter().map(|a| a.path.as_path()).collect()
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    pub fn total_entries(&self) -> usize {
        self.archives.iter().map(|a| a.entries.len()).sum()
    }

    pub fn total_uncompressed_bytes(&self) -> u64 {
        self.archives.iter().map(|a| a.uncompressed_bytes).sum()
    }
}

/// A failed split. Archives closed before the failure stay on disk and are
/// listed in `manifest`.
#[derive(Debug, Error)]
#[error("{source} ({} archives completed before the failure)", .manifest.len())]
pub struct SplitError {
    pub manifest: ArchiveManifest,
    #[source]
    pub source: ArchiveError,
}

impl SplitError {
    fn early(source: ArchiveError) -> Self {
        Self {
            manifest: ArchiveManifest::default(),
            source,
        }
    }
}

/// `{base}_{NNN}.zip` with a 1-based, zero-padded index.
pub fn archive_file_name(base_name: &str, index: usize) -> String {
    format!("{}_{:03}.zip", base_name, index)
}

/// Splits directory trees into size-bounded zip archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSplitter {
    cancel: Option<CancellationToken>,
}

impl ArchiveSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops between files once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Packs every file under `source_dir` into archives in `output_dir`.
    ///
    /// Runs on the blocking thread pool.
    pub async fn split(
        &self,
        source_dir: &Path,
        output_dir: &Path,
        base_name: &str,
        size_limit: u64,
    ) -> Result<ArchiveManifest, SplitError> {
        let source_dir = source_dir.to_path_buf();
        let output_dir = output_dir.to_path_buf();
        let base_name = base_name.to_string();
        let cancel = self.cancel.clone();

        tokio::task::spawn_blocking(move || {
            split_blocking(&source_dir, &output_dir, &base_name, size_limit, cancel.as_ref())
        })
        .await
        .map_err(|e| SplitError::early(ArchiveError::Task(e.to_string())))?
    }
}

fn split_blocking(
    source_dir: &Path,
    output_dir: &Path,
    base_name: &str,
    size_limit: u64,
    cancel: Option<&CancellationToken>,
) -> Result<ArchiveManifest, SplitError> {
    if size_limit == 0 {
        return Err(SplitError::early(ArchiveError::InvalidLimit));
    }
    let source_dir = std::fs::canonicalize(source_dir)
        .ok()
        .filter(|p| p.is_dir())
        .ok_or_else(|| {
            SplitError::early(ArchiveError::SourceNotFound {
                path: source_dir.to_path_buf(),
            })
        })?;

    std::fs::create_dir_all(output_dir).map_err(|source| {
        SplitError::early(ArchiveError::Io {
            path: output_dir.to_path_buf(),
            source,
        })
    })?;
    let output_dir = std::fs::canonicalize(output_dir).map_err(|source| {
        SplitError::early(ArchiveError::Io {
            path: output_dir.to_path_buf(),
            source,
        })
    })?;

    if output_dir == source_dir {
        return Err(SplitError::early(ArchiveError::OutputIsSource { path: output_dir }));
    }

    let exclude = output_dir
        .starts_with(&source_dir)
        .then_some(output_dir.as_path());
    let entries = collect_entries(&source_dir, exclude).map_err(SplitError::early)?;

    info!(
        files = entries.len(),
        size_limit,
        "Splitting {} into {}",
        source_dir.display(),
        output_dir.display()
    );

    write_archives(&entries, size_limit, &output_dir, base_name, cancel)
}

fn write_archives(
    entries: &[PlannedEntry],
    size_limit: u64,
    output_dir: &Path,
    base_name: &str,
    cancel: Option<&CancellationToken>,
) -> Result<ArchiveManifest, SplitError> {
    let sizes: Vec<u64> = entries.iter().map(|e| e.size).collect();
    let mut manifest = ArchiveManifest::default();

    for (i, group) in plan_groups(&sizes, size_limit).into_iter().enumerate() {
        let path = output_dir.join(archive_file_name(base_name, i + 1));
        match write_archive(&path, &entries[group], cancel) {
            Ok(info) => {
                if info.entries.len() == 1 && info.uncompressed_bytes > size_limit {
                    warn!(
                        "{} holds a single file larger than the limit ({} bytes)",
                        path.display(),
                        info.uncompressed_bytes
                    );
                }
                debug!(
                    entries = info.entries.len(),
                    bytes = info.uncompressed_bytes,
                    "Closed {}",
                    path.display()
                );
                manifest.archives.push(info);
            }
            Err(source) => {
                // The archive being written is never left behind half-finished.
                let _ = std::fs::remove_file(&path);
                return Err(SplitError { manifest, source });
            }
        }
    }

    info!(
        archives = manifest.len(),
        files = manifest.total_entries(),
        "Archive split finished"
    );
    Ok(manifest)
}

fn write_archive(
    path: &Path,
    entries: &[PlannedEntry],
    cancel: Option<&CancellationToken>,
) -> Result<ArchiveInfo, ArchiveError> {
    let file = File::create(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9))
        .large_file(entries.iter().any(|e| e.size >= u32::MAX as u64));

    let mut info = ArchiveInfo {
        path: path.to_path_buf(),
        entries: Vec::with_capacity(entries.len()),
        uncompressed_bytes: 0,
    };

    for entry in entries {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(ArchiveError::Cancelled);
        }

        let mut input = File::open(&entry.path).map_err(|source| ArchiveError::Io {
            path: entry.path.clone(),
            source,
        })?;
        zip.start_file(entry.name.as_str(), options)?;
        let copied = std::io::copy(&mut input, &mut zip).map_err(|source| ArchiveError::Io {
            path: entry.path.clone(),
            source,
        })?;

        info.entries.push(entry.name.clone());
        info.uncompressed_bytes += copied;
    }

    zip.finish()?.flush().map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_file(root: &Path, name: &str, size: usize) {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(path, body).unwrap();
    }

    fn read_entries(path: &Path) -> Vec<(String, u64)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let entry = archive.by_index(i).unwrap();
                (entry.name().to_string(), entry.size())
            })
            .collect()
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name("foo", 1), "foo_001.zip");
        assert_eq!(archive_file_name("foo", 42), "foo_042.zip");
    }

    #[tokio::test]
    async fn test_split_respects_limit() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("gifs");
        let sizes = [
            ("a.gif", 400),
            ("b.gif", 300),
            ("c.gif", 900),
            ("d/e.gif", 100),
            ("d/f.gif", 2500),
            ("g.gif", 50),
        ];
        for (name, size) in sizes {
            write_file(&source, name, size);
        }
        let out = dir.path().join("archives");

        let manifest = ArchiveSplitter::new()
            .split(&source, &out, "foo", 1000)
            .await
            .unwrap();

        // a+b | c+d/e | d/f (oversized) | g
        assert_eq!(manifest.len(), 4);
        let names: Vec<String> = manifest
            .paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["foo_001.zip", "foo_002.zip", "foo_003.zip", "foo_004.zip"]);

        let mut seen = BTreeSet::new();
        let mut total = 0;
        for info in &manifest.archives {
            let entries = read_entries(&info.path);
            let archive_total: u64 = entries.iter().map(|(_, size)| size).sum();
            assert!(archive_total <= 1000 || entries.len() == 1);
            assert_eq!(archive_total, info.uncompressed_bytes);
            for (name, _) in entries {
                assert!(seen.insert(name));
            }
            total += archive_total;
        }

        let expected: BTreeSet<String> = sizes.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(seen, expected);
        assert_eq!(total, sizes.iter().map(|(_, s)| *s as u64).sum::<u64>());
    }

    #[tokio::test]
    async fn test_entry_content_preserved() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src");
        write_file(&source, "nested/deep/x.gif", 1234);
        let out = dir.path().join("out");

        let manifest = ArchiveSplitter::new()
            .split(&source, &out, "x", DEFAULT_SIZE_LIMIT)
            .await
            .unwrap();

        let file = File::open(&manifest.archives[0].path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name("nested/deep/x.gif").unwrap();
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(body, std::fs::read(source.join("nested/deep/x.gif")).unwrap());
    }

    #[tokio::test]
    async fn test_output_inside_source_is_excluded() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().to_path_buf();
        write_file(&source, "a.gif", 10);
        let out = source.join("archives");

        let first = ArchiveSplitter::new()
            .split(&source, &out, "set", 100)
            .await
            .unwrap();
        let second = ArchiveSplitter::new()
            .split(&source, &out, "set", 100)
            .await
            .unwrap();

        assert_eq!(first.total_entries(), 1);
        assert_eq!(second.archives[0].entries, vec!["a.gif"]);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("empty");
        std::fs::create_dir_all(&source).unwrap();

        let manifest = ArchiveSplitter::new()
            .split(&source, &dir.path().join("out"), "e", 10)
            .await
            .unwrap();
        assert!(manifest.is_empty());
    }

    #[tokio::test]
    async fn test_output_equal_to_source_is_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("gifs");
        write_file(&source, "a.gif", 10);

        let err = ArchiveSplitter::new()
            .split(&source, &source.join("."), "g", 100)
            .await
            .unwrap_err();
        assert!(matches!(err.source, ArchiveError::OutputIsSource { .. }));
        assert!(err.manifest.is_empty());
        assert!(!source.join("g_001.zip").exists());
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = ArchiveSplitter::new()
            .split(&dir.path().join("nope"), &dir.path().join("out"), "e", 10)
            .await
            .unwrap_err();
        assert!(matches!(err.source, ArchiveError::SourceNotFound { .. }));
        assert!(err.manifest.is_empty());
    }

    #[test]
    fn test_failure_keeps_closed_archives() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.gif", 60);
        write_file(dir.path(), "b.gif", 60);
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();

        let entries = vec![
            PlannedEntry {
                path: dir.path().join("a.gif"),
                name: "a.gif".to_string(),
                size: 60,
            },
            PlannedEntry {
                path: dir.path().join("b.gif"),
                name: "b.gif".to_string(),
                size: 60,
            },
            PlannedEntry {
                path: dir.path().join("vanished.gif"),
                name: "vanished.gif".to_string(),
                size: 60,
            },
        ];

        let err = write_archives(&entries, 100, &out, "p", None).unwrap_err();

        assert!(matches!(err.source, ArchiveError::Io { .. }));
        assert_eq!(err.manifest.len(), 2);
        assert!(out.join("p_001.zip").exists());
        assert!(out.join("p_002.zip").exists());
        assert!(!out.join("p_003.zip").exists());
        assert_eq!(read_entries(&out.join("p_002.zip")), vec![("b.gif".to_string(), 60)]);
    }

    #[test]
    fn test_cancelled_split_discards_open_archive() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.gif", 10);
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let entries = vec![PlannedEntry {
            path: dir.path().join("a.gif"),
            name: "a.gif".to_string(),
            size: 10,
        }];
        let err = write_archives(&entries, 100, &out, "c", Some(&token)).unwrap_err();

        assert!(matches!(err.source, ArchiveError::Cancelled));
        assert!(!out.join("c_001.zip").exists());
    }
}
