//! Catalog errors

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

use iwbridge_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{source_id}' is recorded with hash {recorded}, refusing {incoming}")]
    Conflict {
        source_id: String,
        recorded: String,
        incoming: String,
    },

    #[error("Artifact path '{0}' escapes the output root")]
    InvalidPath(PathBuf),

    #[error("Corrupt catalog row for '{source_id}': {message}")]
    Corrupt { source_id: String, message: String },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }

    /// Busy or locked databases and filesystem failures may clear up on retry
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::SystemIoFailure
            ),
            CatalogError::Io { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::Unsupported
            ),
            _ => false,
        }
    }
}

impl From<CatalogError> for CoreError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Conflict {
                source_id,
                recorded,
                incoming,
            } => CoreError::CatalogConflict {
                source_id,
                recorded,
                incoming,
            },
            other if other.is_transient() => CoreError::catalog_transient(other.to_string()),
            other => CoreError::catalog_permanent(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iwbridge_core::ErrorKind;

    fn sqlite(code: i32) -> CatalogError {
        CatalogError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn test_busy_and_locked_are_transient() {
        assert!(sqlite(rusqlite::ffi::SQLITE_BUSY).is_transient());
        assert!(sqlite(rusqlite::ffi::SQLITE_LOCKED).is_transient());
        assert!(!sqlite(rusqlite::ffi::SQLITE_CONSTRAINT).is_transient());

        let core: CoreError = sqlite(rusqlite::ffi::SQLITE_BUSY).into();
        assert!(core.is_retryable());
        assert_eq!(core.kind(), ErrorKind::CatalogIo);
    }

    #[test]
    fn test_conflict_maps_to_core() {
        let core: CoreError = CatalogError::Conflict {
            source_id: "a".into(),
            recorded: "1".into(),
            incoming: "2".into(),
        }
        .into();
        assert_eq!(core.kind(), ErrorKind::CatalogConflict);
        assert!(!core.is_retryable());
    }
}
