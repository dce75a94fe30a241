//! SQLite implementation using rusqlite

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};

use iwbridge_core::{AssetId, AssetKind, ContentHash};

use crate::entry::{CatalogEntry, CatalogStats, CommitMode, CommitOutcome};
use crate::error::{CatalogError, CatalogResult};
use crate::staging::StagedArtifacts;
use crate::AssetCatalog;

/// Default database file name inside the output directory
pub const DEFAULT_DB_NAME: &str = "catalog.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str =
    "source_id, kind, artifact_path, artifacts, content_hash, converted_at, format_version, bytes";

/// Ordered schema migrations; applied versions are recorded in `schema_migrations`
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_assets",
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            source_id TEXT PRIMARY KEY NOT NULL,
            kind TEXT NOT NULL,
            artifact_path TEXT NOT NULL,
            artifacts TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            converted_at TEXT NOT NULL,
            format_version INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_assets_kind ON assets(kind);
        "#,
    ),
    (
        "0002_artifact_bytes",
        "ALTER TABLE assets ADD COLUMN bytes INTEGER NOT NULL DEFAULT 0;",
    ),
];

/// SQLite-backed asset catalog
///
/// The connection sits behind a mutex; every commit runs inside an
/// immediate transaction so concurrent writers from other processes wait on
/// SQLite's lock rather than interleaving.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    root: PathBuf,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        source_id: row.get(0)?,
        kind: row.get(1)?,
        artifact_path: row.get(2)?,
        artifacts: row.get(3)?,
        content_hash: row.get(4)?,
        converted_at: row.get(5)?,
        format_version: row.get(6)?,
        bytes: row.get(7)?,
    })
}

/// Row as stored, before the text columns are interpreted
struct RawRow {
    source_id: String,
    kind: String,
    artifact_path: String,
    artifacts: String,
    content_hash: String,
    converted_at: DateTime<Utc>,
    format_version: u32,
    bytes: i64,
}

impl RawRow {
    fn into_entry(self) -> CatalogResult<CatalogEntry> {
        let corrupt = |message: String| CatalogError::Corrupt {
            source_id: self.source_id.clone(),
            message,
        };
        let kind = AssetKind::parse(&self.kind)
            .ok_or_else(|| corrupt(format!("unknown kind '{}'", self.kind)))?;
        let artifacts: Vec<PathBuf> = serde_json::from_str(&self.artifacts)
            .map_err(|e| corrupt(format!("artifact list: {e}")))?;

        Ok(CatalogEntry {
            source_id: AssetId::new(&self.source_id),
            kind,
            artifact_path: PathBuf::from(self.artifact_path),
            artifacts,
            content_hash: ContentHash::from_hex(self.content_hash),
            converted_at: self.converted_at,
            format_version: self.format_version,
            bytes: self.bytes.max(0) as u64,
        })
    }
}

impl SqliteCatalog {
    /// Open or create the catalog at `db_path`; artifacts live under `root`
    pub fn open(db_path: impl AsRef<Path>, root: impl Into<PathBuf>) -> CatalogResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn, root.into())
    }

    /// Open an in-memory catalog (for testing)
    pub fn open_in_memory(root: impl Into<PathBuf>) -> CatalogResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, root.into())
    }

    fn with_connection(conn: Connection, root: PathBuf) -> CatalogResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let catalog = Self {
            conn: Mutex::new(conn),
            root,
        };
        catalog.init()?;
        Ok(catalog)
    }

    /// Create `schema_migrations` and apply pending migrations
    fn init(&self) -> CatalogResult<()> {
        let mut conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY NOT NULL,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        for (version, sql) in MIGRATIONS {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let applied: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM schema_migrations WHERE version = ?1",
                    params![version],
                    |row| row.get(0),
                )
                .optional()?;
            if applied.is_none() {
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version) VALUES (?1)",
                    params![version],
                )?;
                info!(version, "Applied catalog migration");
            }
            tx.commit()?;
        }
        Ok(())
    }

    fn select(conn: &Connection, source_id: &AssetId) -> CatalogResult<Option<CatalogEntry>> {
        let raw = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM assets WHERE source_id = ?1"),
                params![source_id.as_str()],
                row_to_entry,
            )
            .optional()?;
        raw.map(RawRow::into_entry).transpose()
    }

    fn upsert(conn: &Connection, entry: &CatalogEntry) -> CatalogResult<()> {
        let artifacts = serde_json::to_string(&entry.artifacts).map_err(|e| CatalogError::Corrupt {
            source_id: entry.source_id.to_string(),
            message: e.to_string(),
        })?;
        conn.execute(
            &format!(
                "INSERT INTO assets ({ENTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(source_id) DO UPDATE SET
                    kind = excluded.kind,
                    artifact_path = excluded.artifact_path,
                    artifacts = excluded.artifacts,
                    content_hash = excluded.content_hash,
                    converted_at = excluded.converted_at,
                    format_version = excluded.format_version,
                    bytes = excluded.bytes"
            ),
            params![
                entry.source_id.as_str(),
                entry.kind.as_str(),
                entry.artifact_path.to_string_lossy(),
                artifacts,
                entry.content_hash.as_str(),
                entry.converted_at,
                entry.format_version,
                entry.bytes as i64,
            ],
        )?;
        Ok(())
    }

    /// Delete artifact files of `old` that `new` no longer produces
    fn remove_stale(&self, old: &CatalogEntry, new: &[PathBuf]) {
        for path in old.artifacts.iter().filter(|p| !new.contains(p)) {
            let full = self.root.join(path);
            if let Err(e) = std::fs::remove_file(&full) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %full.display(), error = %e, "Failed to remove stale artifact");
                }
            }
        }
    }
}

impl AssetCatalog for SqliteCatalog {
    fn root(&self) -> &Path {
        &self.root
    }

    fn lookup(&self, source_id: &AssetId) -> CatalogResult<Option<CatalogEntry>> {
        let conn = self.conn.lock();
        Self::select(&conn, source_id)
    }

    fn stage(&self, files: Vec<(PathBuf, Vec<u8>)>) -> CatalogResult<StagedArtifacts> {
        StagedArtifacts::write(&self.root, files)
    }

    fn commit(
        &self,
        entry: &CatalogEntry,
        staged: StagedArtifacts,
        mode: CommitMode,
    ) -> CatalogResult<CommitOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = Self::select(&tx, &entry.source_id)?;
        if let Some(recorded) = &existing {
            if recorded.content_hash == entry.content_hash && mode == CommitMode::Normal {
                debug!(source = %entry.source_id, "Hash already recorded, commit is a no-op");
                return Ok(CommitOutcome::Unchanged);
            }
            if recorded.content_hash != entry.content_hash && mode == CommitMode::Normal {
                return Err(CatalogError::Conflict {
                    source_id: entry.source_id.to_string(),
                    recorded: recorded.content_hash.to_string(),
                    incoming: entry.content_hash.to_string(),
                });
            }
        }

        let promotion = staged.promote(&self.root)?;
        let written = Self::upsert(&tx, entry).and_then(|()| tx.commit().map_err(CatalogError::from));
        if let Err(e) = written {
            promotion.rollback();
            return Err(e);
        }
        promotion.finish();
        drop(conn);

        let outcome = match existing {
            Some(old) => {
                self.remove_stale(&old, &entry.artifacts);
                CommitOutcome::Replaced
            }
            None => CommitOutcome::Inserted,
        };
        debug!(source = %entry.source_id, ?outcome, "Committed catalog entry");
        Ok(outcome)
    }

    fn list(&self, kind: Option<AssetKind>) -> CatalogResult<Vec<CatalogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM assets
             WHERE ?1 IS NULL OR kind = ?1
             ORDER BY source_id"
        ))?;
        let rows = stmt.query_map(params![kind.map(AssetKind::as_str)], row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    fn remove(&self, source_id: &AssetId, delete_artifacts: bool) -> CatalogResult<Option<CatalogEntry>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(entry) = Self::select(&tx, source_id)? else {
            return Ok(None);
        };
        tx.execute("DELETE FROM assets WHERE source_id = ?1", params![source_id.as_str()])?;
        tx.commit()?;
        drop(conn);

        if delete_artifacts {
            self.remove_stale(&entry, &[]);
        }
        Ok(Some(entry))
    }

    fn stats(&self) -> CatalogResult<CatalogStats> {
        let conn = self.conn.lock();
        let mut stats = CatalogStats::default();

        let mut stmt =
            conn.prepare("SELECT kind, COUNT(*), COALESCE(SUM(bytes), 0) FROM assets GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;
        for row in rows {
            let (kind, count, bytes) = row?;
            stats.total += count as u64;
            stats.total_bytes += bytes.max(0) as u64;
            stats.by_kind.insert(kind, count as u64);
        }

        stats.last_converted = conn.query_row("SELECT MAX(converted_at) FROM assets", [], |row| {
            row.get::<_, Option<DateTime<Utc>>>(0)
        })?;
        stats.schema_version = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get::<_, Option<String>>(0)
            })?
            .unwrap_or_default();
        Ok(stats)
    }
}
