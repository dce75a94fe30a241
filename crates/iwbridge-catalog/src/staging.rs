//! Artifact staging and promotion
//!
//! Conversions write into a private staging directory under the output
//! root. Promotion renames staged files over their final paths, moving any
//! file it replaces into the staging directory first so a failed commit
//! can put everything back. Staging and output share a filesystem, so every
//! rename is atomic.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::{trace, warn};

use crate::error::{CatalogError, CatalogResult};

/// Directory under the output root holding in-flight commits
pub const STAGING_DIR: &str = ".iwbridge-staging";

#[derive(Debug)]
struct StagedFile {
    relative: PathBuf,
    staged: PathBuf,
    len: u64,
}

/// Artifact files written to staging, not yet visible at their final paths
///
/// Dropping an unpromoted set deletes the staged files.
#[derive(Debug)]
pub struct StagedArtifacts {
    dir: TempDir,
    files: Vec<StagedFile>,
}

impl StagedArtifacts {
    /// Write `files` (paths relative to `root`) into a fresh staging directory
    pub fn write<P, I>(root: &Path, files: I) -> CatalogResult<Self>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = (P, Vec<u8>)>,
    {
        let staging_root = root.join(STAGING_DIR);
        fs::create_dir_all(&staging_root).map_err(|e| CatalogError::io(&staging_root, e))?;
        let dir = tempfile::Builder::new()
            .prefix("commit-")
            .tempdir_in(&staging_root)
            .map_err(|e| CatalogError::io(&staging_root, e))?;

        let mut staged_files = Vec::new();
        for (index, (relative, bytes)) in files.into_iter().enumerate() {
            let relative = relative.as_ref();
            validate_relative(relative)?;
            let staged = dir.path().join(format!("{index}.part"));
            fs::write(&staged, &bytes).map_err(|e| CatalogError::io(&staged, e))?;
            staged_files.push(StagedFile {
                relative: relative.to_path_buf(),
                staged,
                len: bytes.len() as u64,
            });
        }

        trace!(files = staged_files.len(), dir = %dir.path().display(), "Staged artifacts");
        Ok(Self {
            dir,
            files: staged_files,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Move every staged file to its final path under `root`
    ///
    /// On failure the files already moved are rolled back before returning.
    pub(crate) fn promote(&self, root: &Path) -> CatalogResult<Promotion> {
        let mut promotion = Promotion { moves: Vec::new() };
        for (index, file) in self.files.iter().enumerate() {
            let backup = self.dir.path().join(format!("{index}.bak"));
            if let Err(e) = promote_one(file, root, &backup, &mut promotion) {
                promotion.rollback();
                return Err(e);
            }
        }
        Ok(promotion)
    }
}

fn promote_one(
    file: &StagedFile,
    root: &Path,
    backup_path: &Path,
    promotion: &mut Promotion,
) -> CatalogResult<()> {
    let dest = root.join(&file.relative);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
    }

    let backup = if dest.exists() {
        fs::rename(&dest, backup_path).map_err(|e| CatalogError::io(&dest, e))?;
        Some(backup_path.to_path_buf())
    } else {
        None
    };

    if let Err(e) = fs::rename(&file.staged, &dest) {
        if let Some(backup) = &backup {
            restore_replaced(backup, &dest);
        }
        return Err(CatalogError::io(&dest, e));
    }
    promotion.moves.push(Move { dest, backup });
    Ok(())
}

#[derive(Debug)]
struct Move {
    dest: PathBuf,
    backup: Option<PathBuf>,
}

/// Promoted files that can still be rolled back
#[derive(Debug)]
#[must_use]
pub(crate) struct Promotion {
    moves: Vec<Move>,
}

impl Promotion {
    /// Remove promoted files and restore what they replaced
    pub(crate) fn rollback(self) {
        for m in self.moves.into_iter().rev() {
            if let Err(e) = fs::remove_file(&m.dest) {
                warn!(path = %m.dest.display(), error = %e, "Failed to remove promoted artifact");
            }
            if let Some(backup) = m.backup {
                restore_replaced(&backup, &m.dest);
            }
        }
    }

    /// Keep the promoted files; backups go away with the staging directory
    pub(crate) fn finish(self) {}
}

/// Move a backed-up artifact back over `dest`; returns whether it worked
fn restore_replaced(backup: &Path, dest: &Path) -> bool {
    match fs::rename(backup, dest) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %dest.display(), backup = %backup.display(), error = %e, "Failed to restore replaced artifact");
            false
        }
    }
}

/// Reject absolute paths and `..` so artifacts stay under the output root
pub(crate) fn validate_relative(path: &Path) -> CatalogResult<()> {
    let ok = path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(CatalogError::InvalidPath(path.to_path_buf()))
    }
}
