//! Unified error handling for iwbridge
//!
//! Every stage of the conversion pipeline reports failures through this
//! type. Parse and decode failures are terminal for the asset they concern;
//! catalog I/O failures may be retried (see [`Error::is_retryable`]).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all iwbridge operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source file or directory not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Container Errors ====================

    /// Container structure is inconsistent with the bytes available
    ///
    /// `offset` is absent when the fault cannot be tied to one position.
    #[error("Malformed container{}: {message}", OffsetSuffix(.offset))]
    MalformedContainer {
        offset: Option<u64>,
        message: String,
    },

    /// Container version tag outside the supported range
    #[error("Unsupported container version {version} (supported: {min}..={max})")]
    UnsupportedVersion {
        version: u32,
        min: u32,
        max: u32,
    },

    // ==================== Conversion Errors ====================

    /// Source pixel format has no decode path
    #[error("Unsupported pixel format: {format}")]
    UnsupportedPixelFormat {
        format: String,
    },

    /// Mesh indices or bone hierarchy are invalid
    #[error("Invalid topology: {message}")]
    InvalidTopology {
        message: String,
    },

    /// Channel layout cannot be represented by the target codec
    #[error("Unsupported channel layout: {channels} channel(s)")]
    UnsupportedChannelLayout {
        channels: u16,
    },

    /// Convex hull has fewer than four non-coplanar points
    #[error("Degenerate convex hull '{shape}': {message}")]
    DegenerateHull {
        shape: String,
        message: String,
    },

    // ==================== Catalog Errors ====================

    /// Catalog storage failure
    #[error("Catalog I/O error: {message}")]
    CatalogIo {
        message: String,
        transient: bool,
    },

    /// Catalog already records a different content hash for this source
    #[error("Catalog conflict for '{source_id}': recorded {recorded}, incoming {incoming}")]
    CatalogConflict {
        source_id: String,
        recorded: String,
        incoming: String,
    },

    // ==================== Configuration Errors ====================

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },

    // ==================== General Errors ====================

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error (should not happen)
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },

    /// Error with additional context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

struct OffsetSuffix<'a>(&'a Option<u64>);

impl std::fmt::Display for OffsetSuffix<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(offset) => write!(f, " at offset {offset}"),
            None => Ok(()),
        }
    }
}

/// Flat classification of [`Error`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    NotFound,
    MalformedContainer,
    UnsupportedVersion,
    UnsupportedPixelFormat,
    InvalidTopology,
    UnsupportedChannelLayout,
    DegenerateHull,
    CatalogIo,
    CatalogConflict,
    InvalidConfig,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Io => "io",
            ErrorKind::NotFound => "not_found",
            ErrorKind::MalformedContainer => "malformed_container",
            ErrorKind::UnsupportedVersion => "unsupported_version",
            ErrorKind::UnsupportedPixelFormat => "unsupported_pixel_format",
            ErrorKind::InvalidTopology => "invalid_topology",
            ErrorKind::UnsupportedChannelLayout => "unsupported_channel_layout",
            ErrorKind::DegenerateHull => "degenerate_hull",
            ErrorKind::CatalogIo => "catalog_io",
            ErrorKind::CatalogConflict => "catalog_conflict",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a malformed container error
    pub fn malformed(offset: u64, message: impl Into<String>) -> Self {
        Error::MalformedContainer {
            offset: Some(offset),
            message: message.into(),
        }
    }

    /// Malformed payload whose position is unknown
    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Error::MalformedContainer {
            offset: None,
            message: message.into(),
        }
    }

    /// Create an invalid topology error
    pub fn topology(message: impl Into<String>) -> Self {
        Error::InvalidTopology {
            message: message.into(),
        }
    }

    /// Create a catalog error that may succeed on retry
    pub fn catalog_transient(message: impl Into<String>) -> Self {
        Error::CatalogIo {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a catalog error that will not succeed on retry
    pub fn catalog_permanent(message: impl Into<String>) -> Self {
        Error::CatalogIo {
            message: message.into(),
            transient: false,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Error::Io(_) => ErrorKind::Io,
            Error::FileNotFound(_) => ErrorKind::NotFound,
            Error::MalformedContainer { .. } => ErrorKind::MalformedContainer,
            Error::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Error::UnsupportedPixelFormat { .. } => ErrorKind::UnsupportedPixelFormat,
            Error::InvalidTopology { .. } => ErrorKind::InvalidTopology,
            Error::UnsupportedChannelLayout { .. } => ErrorKind::UnsupportedChannelLayout,
            Error::DegenerateHull { .. } => ErrorKind::DegenerateHull,
            Error::CatalogIo { .. } => ErrorKind::CatalogIo,
            Error::CatalogConflict { .. } => ErrorKind::CatalogConflict,
            Error::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal { .. } | Error::WithContext { .. } => ErrorKind::Internal,
        }
    }

    /// Offending byte offset for container errors
    pub fn offset(&self) -> Option<u64> {
        match self.root() {
            Error::MalformedContainer { offset, .. } => *offset,
            _ => None,
        }
    }

    /// Check if retrying the failed operation may succeed
    ///
    /// Only storage failures qualify; parse and decode errors are
    /// deterministic for a given input.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Error::CatalogIo { transient, .. } => *transient,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Check if this is a parse/format error
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedContainer | ErrorKind::UnsupportedVersion
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::FileNotFound(PathBuf::from("/test"));
        let contextualized = err.with_context("while loading config");

        assert!(contextualized.to_string().contains("while loading config"));
        assert_eq!(contextualized.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_offset_survives_context() {
        let err = Error::malformed(50, "chunk overruns buffer").with_context("textures/rock");
        assert_eq!(err.offset(), Some(50));
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_unlocated_payload_has_no_offset() {
        let err = Error::malformed_payload("declares 10 frames but decodes to 4");
        assert_eq!(err.offset(), None);
        assert_eq!(err.kind(), ErrorKind::MalformedContainer);
        assert_eq!(err.to_string(), "Malformed container: declares 10 frames but decodes to 4");
        assert_eq!(
            Error::malformed(100, "bad").to_string(),
            "Malformed container at offset 100: bad"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(Error::catalog_transient("database is locked").is_retryable());
        assert!(!Error::catalog_permanent("constraint failed").is_retryable());
        assert!(!Error::topology("index 9 out of range").is_retryable());
        assert!(!Error::malformed(0, "bad magic").is_retryable());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::Cancelled);
        let with_context = result.context("converting batch");

        let err = with_context.unwrap_err();
        assert!(err.to_string().contains("converting batch"));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::InvalidTopology.to_string(), "invalid_topology");
        assert_eq!(ErrorKind::CatalogIo.to_string(), "catalog_io");
    }
}
