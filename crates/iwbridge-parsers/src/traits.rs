// iwbridge-parsers/src/traits.rs
//! The `Parser` seam shared by asset containers and pack archives
//!
//! Detection goes by extension first and falls back to sniffing the magic.
//! Every parser error carries the byte offset it points at, when there is
//! one, so the pipeline can report where a container went wrong.

use std::path::Path;

use bytes::Bytes;
use thiserror::Error;

use iwbridge_core::Error as CoreError;

/// Errors that can occur during parsing operations
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes: expected {expected:?}, found {found:?}")]
    InvalidMagic { expected: Vec<u8>, found: Vec<u8> },

    #[error("Unsupported version: {version} (supported: {min}..={max})")]
    UnsupportedVersion { version: u32, min: u32, max: u32 },

    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData { offset: u64, message: String },

    #[error("Decompression failed at offset {offset}: {message}")]
    DecompressionFailed { offset: u64, message: String },

    #[error("Missing required chunk '{tag}'")]
    MissingChunk { tag: String },

    #[error("Unknown chunk '{tag}' at offset {offset}")]
    UnknownChunk { tag: String, offset: u64 },

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Nested error in {context}: {source}")]
    Nested {
        context: String,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    /// Wrap this error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ParseError::Nested {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for [`ParseError::CorruptedData`]
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        ParseError::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Byte offset the error points at, if any
    pub fn offset(&self) -> Option<u64> {
        match self {
            ParseError::CorruptedData { offset, .. }
            | ParseError::DecompressionFailed { offset, .. }
            | ParseError::UnknownChunk { offset, .. } => Some(*offset),
            ParseError::InvalidMagic { .. } => Some(0),
            ParseError::Nested { source, .. } => source.offset(),
            _ => None,
        }
    }
}

impl From<ParseError> for CoreError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(e) => CoreError::Io(e),
            ParseError::UnsupportedVersion { version, min, max } => {
                CoreError::UnsupportedVersion { version, min, max }
            }
            ParseError::Nested { context, source } => {
                CoreError::from(*source).with_context(context)
            }
            other => CoreError::MalformedContainer {
                offset: other.offset(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Knobs for reading containers and packs
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Reject chunks that appear in containers of the wrong asset kind
    pub strict_validation: bool,
    /// Keep unknown chunk tags as opaque chunks instead of erroring
    pub skip_unknown_chunks: bool,
    /// Largest decoded chunk accepted (in bytes)
    pub decompression_memory_limit: usize,
    pub use_memory_mapping: bool,
    /// Sources at least this large are mapped rather than read
    pub memory_mapping_threshold: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_validation: false,
            skip_unknown_chunks: true,
            decompression_memory_limit: 256 << 20,
            use_memory_mapping: true,
            memory_mapping_threshold: 4 << 20,
        }
    }
}

/// A reader for one on-disk format
pub trait Parser: Send + Sync {
    type Output: Send + Sync;

    /// Lowercase extensions without the dot, e.g. `["iwa"]`
    fn extensions(&self) -> &[&str];

    fn magic_bytes(&self) -> Option<&[u8]> {
        None
    }

    fn name(&self) -> &str;

    /// Whether in-memory `data` starts with this format's magic
    fn sniff(&self, data: &[u8]) -> bool {
        self.magic_bytes().is_some_and(|magic| data.starts_with(magic))
    }

    fn parse(&self, data: Bytes) -> ParseResult<Self::Output> {
        self.parse_with_options(data, &ParseOptions::default())
    }

    fn parse_with_options(&self, data: Bytes, options: &ParseOptions) -> ParseResult<Self::Output>;

    fn parse_file(&self, path: &Path) -> ParseResult<Self::Output> {
        self.parse_file_with_options(path, &ParseOptions::default())
    }

    /// Load `path` and parse it, naming the file in any error
    fn parse_file_with_options(&self, path: &Path, options: &ParseOptions) -> ParseResult<Self::Output> {
        let data = load_file(path, options)?;
        self.parse_with_options(data, options)
            .map_err(|e| e.with_context(path.display().to_string()))
    }

    /// Whether `path` looks like this format, by extension or magic
    fn can_parse(&self, path: &Path) -> bool {
        let by_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if by_extension {
            return true;
        }

        match self.magic_bytes() {
            Some(magic) => sniff_magic(path, magic),
            None => false,
        }
    }
}

/// Read a file into a shared buffer, memory-mapping it above the configured threshold
pub fn load_file(path: &Path, options: &ParseOptions) -> ParseResult<Bytes> {
    let file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();

    if options.use_memory_mapping && len >= options.memory_mapping_threshold {
        // SAFETY: the mapping is read-only and sources are not rewritten while a batch runs.
        #[allow(unsafe_code)]
        let map = unsafe { memmap2::Mmap::map(&file)? };
        tracing::debug!(path = %path.display(), bytes = len, "Memory-mapped source");
        return Ok(Bytes::from_owner(map));
    }

    Ok(Bytes::from(std::fs::read(path)?))
}

fn sniff_magic(path: &Path, magic: &[u8]) -> bool {
    use std::io::Read;

    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut head = vec![0u8; magic.len()];
    file.read_exact(&mut head).is_ok() && head == magic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_maps_to_malformed() {
        let err: CoreError = ParseError::corrupted(50, "chunk overruns buffer").into();
        assert_eq!(err.kind(), iwbridge_core::ErrorKind::MalformedContainer);
        assert_eq!(err.offset(), Some(50));
    }

    #[test]
    fn test_nested_offset() {
        let err = ParseError::corrupted(12, "bad").with_context("mesh.iwa");
        assert_eq!(err.offset(), Some(12));

        let core: CoreError = err.into();
        assert_eq!(core.offset(), Some(12));
        assert!(core.to_string().contains("mesh.iwa"));
    }

    #[test]
    fn test_sniff_checks_leading_magic() {
        let parser = crate::ContainerParser::new();
        assert!(parser.sniff(b"IWAC\x02\0\0\0"));
        assert!(!parser.sniff(b"IWA"));
        assert!(!parser.sniff(b"PK\x03\x04"));
    }

    #[test]
    fn test_version_maps_through() {
        let err: CoreError = ParseError::UnsupportedVersion { version: 7, min: 1, max: 2 }.into();
        assert_eq!(err.kind(), iwbridge_core::ErrorKind::UnsupportedVersion);
    }
}
