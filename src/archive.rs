//! Content-addressed archive store
//!
//! Two independent key spaces under the managed root, lazily created on first
//! use: source snapshots keyed by commit hash, binary snapshots keyed by
//! commit hash plus an optional profiling suffix. Existence of the archive
//! file is the cache signal; archives are permanent once written.

use crate::error::{NotFoundError, SourcesError};
use crate::paths::Layout;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::{Path, PathBuf};

/// What an archive key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Snapshot of the checked-out working tree
    Source,
    /// Packaged build output; the build mode is part of the key
    Binary { profiling: bool },
}

/// Filesystem-backed archive persistence keyed by commit identity
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    layout: Layout,
}

impl ArchiveStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Deterministic path for a key; the containing directory is created on
    /// first use
    pub fn path(&self, commit_hash: &str, kind: ArchiveKind) -> Result<PathBuf, SourcesError> {
        let (dir, file_name) = match kind {
            ArchiveKind::Source => (
                self.layout.archives_dir(),
                format!("{}.tar.gz", commit_hash),
            ),
            ArchiveKind::Binary { profiling: false } => (
                self.layout.binaries_dir(),
                format!("{}.tar.gz", commit_hash),
            ),
            ArchiveKind::Binary { profiling: true } => (
                self.layout.binaries_dir(),
                format!("{}-profiling.tar.gz", commit_hash),
            ),
        };
        fs::create_dir_all(&dir)?;
        Ok(dir.join(file_name))
    }

    /// Whether the archive for a key has been written
    pub fn exists(&self, commit_hash: &str, kind: ArchiveKind) -> Result<bool, SourcesError> {
        Ok(self.path(commit_hash, kind)?.exists())
    }

    /// Read the archive bytes for a key
    pub fn read(&self, commit_hash: &str, kind: ArchiveKind) -> Result<Vec<u8>, SourcesError> {
        let path = self.path(commit_hash, kind)?;
        if !path.exists() {
            let err = match kind {
                ArchiveKind::Source => NotFoundError::SourceArchive(commit_hash.to_string()),
                ArchiveKind::Binary { .. } => {
                    NotFoundError::BinaryArchive(commit_hash.to_string())
                }
            };
            return Err(err.into());
        }
        Ok(fs::read(path)?)
    }

    /// Package a directory tree into a gzip-compressed tar archive
    ///
    /// The archive is written to a temporary sibling and renamed into place
    /// once complete, so a partially written archive is never visible under
    /// its final key.
    pub fn create(source_dir: &Path, destination: &Path) -> Result<(), SourcesError> {
        let tmp = destination.with_file_name(format!(
            "{}.partial",
            destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "archive.tar.gz".to_string())
        ));

        let file = fs::File::create(&tmp)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", source_dir)?;
        let encoder = builder.into_inner()?;
        encoder.finish()?;

        fs::rename(&tmp, destination)?;
        tracing::info!(
            "created archive {} from {}",
            destination.display(),
            source_dir.display()
        );
        Ok(())
    }
}
