//! Asset catalog for iwbridge
//!
//! Records every converted source asset: kind, artifact paths, content
//! hash, conversion time and artifact format version. The catalog also owns
//! artifact files on disk so that a commit either publishes the row and its
//! files together or neither.
//!
//! # Example
//!
//! ```no_run
//! use iwbridge_catalog::{AssetCatalog, SqliteCatalog};
//! use iwbridge_core::AssetId;
//!
//! let catalog = SqliteCatalog::open("out/catalog.db", "out").unwrap();
//! if let Some(entry) = catalog.lookup(&AssetId::new("props/rock")).unwrap() {
//!     println!("{} -> {}", entry.source_id, entry.artifact_path.display());
//! }
//! ```

pub mod entry;
pub mod error;
pub mod sqlite;
pub mod staging;

use std::path::{Path, PathBuf};

use iwbridge_core::{AssetId, AssetKind};

pub use entry::{CatalogEntry, CatalogStats, CommitMode, CommitOutcome};
pub use error::{CatalogError, CatalogResult};
pub use sqlite::{SqliteCatalog, DEFAULT_DB_NAME};
pub use staging::{StagedArtifacts, STAGING_DIR};

/// Catalog operations used by the pipeline and the CLI
pub trait AssetCatalog: Send + Sync {
    /// Directory artifact paths are relative to
    fn root(&self) -> &Path;

    fn lookup(&self, source_id: &AssetId) -> CatalogResult<Option<CatalogEntry>>;

    /// Write artifact files to staging; nothing is visible until `commit`
    fn stage(&self, files: Vec<(PathBuf, Vec<u8>)>) -> CatalogResult<StagedArtifacts>;

    /// Atomically publish `staged` and record `entry`
    ///
    /// Re-committing the recorded hash is a no-op. A different hash is a
    /// [`CatalogError::Conflict`] unless `mode` is [`CommitMode::Replace`].
    fn commit(
        &self,
        entry: &CatalogEntry,
        staged: StagedArtifacts,
        mode: CommitMode,
    ) -> CatalogResult<CommitOutcome>;

    fn list(&self, kind: Option<AssetKind>) -> CatalogResult<Vec<CatalogEntry>>;

    /// Delete the row, and its artifact files when `delete_artifacts` is set
    fn remove(&self, source_id: &AssetId, delete_artifacts: bool) -> CatalogResult<Option<CatalogEntry>>;

    fn stats(&self) -> CatalogResult<CatalogStats>;
}
