//! Conversion errors

use thiserror::Error;

use iwbridge_core::Error as CoreError;
use iwbridge_parsers::ParseError;

/// Errors raised while converting a parsed record into host artifacts
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("DDS encoding failed: {0}")]
    Dds(String),

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Unsupported channel layout: {channels} channel(s)")]
    UnsupportedChannelLayout { channels: u16 },

    #[error("Invalid audio stream: {0}")]
    InvalidAudio(String),

    #[error("Degenerate convex hull '{shape}': {message}")]
    DegenerateHull { shape: String, message: String },

    /// Failure while decoding the chunk payload at `offset`
    #[error("{source}")]
    InPayload {
        offset: u64,
        #[source]
        source: Box<ExportError>,
    },
}

impl ExportError {
    pub fn topology(message: impl Into<String>) -> Self {
        ExportError::InvalidTopology(message.into())
    }

    /// Tie a payload decode failure to the chunk it came from
    ///
    /// Only errors that describe the payload bytes themselves are wrapped.
    pub fn at_payload(self, offset: Option<u64>) -> Self {
        match (offset, &self) {
            (
                Some(offset),
                ExportError::InvalidDimensions { .. }
                | ExportError::DecompressionFailed(_)
                | ExportError::InvalidAudio(_),
            ) => ExportError::InPayload {
                offset,
                source: Box::new(self),
            },
            _ => self,
        }
    }

    pub fn degenerate(shape: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::DegenerateHull {
            shape: shape.into(),
            message: message.into(),
        }
    }
}

pub type ExportResult<T> = Result<T, ExportError>;

impl From<ExportError> for CoreError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(e) => CoreError::Io(e),
            ExportError::Parse(e) => e.into(),
            ExportError::UnsupportedPixelFormat(format) => {
                CoreError::UnsupportedPixelFormat { format }
            }
            ExportError::InvalidTopology(message) => CoreError::InvalidTopology { message },
            ExportError::UnsupportedChannelLayout { channels } => {
                CoreError::UnsupportedChannelLayout { channels }
            }
            ExportError::DegenerateHull { shape, message } => {
                CoreError::DegenerateHull { shape, message }
            }
            ExportError::InPayload { offset, source } => match CoreError::from(*source) {
                CoreError::MalformedContainer { message, .. } => CoreError::malformed(offset, message),
                other => other,
            },
            // Payload contents contradict their own header
            e @ (ExportError::InvalidDimensions { .. }
            | ExportError::DecompressionFailed(_)
            | ExportError::InvalidAudio(_)) => CoreError::malformed_payload(e.to_string()),
            e @ (ExportError::Image(_) | ExportError::Serialization(_) | ExportError::Dds(_)) => {
                CoreError::internal(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iwbridge_core::ErrorKind;

    #[test]
    fn test_kinds_survive_conversion() {
        let cases = [
            (ExportError::UnsupportedPixelFormat("BC7".into()), ErrorKind::UnsupportedPixelFormat),
            (ExportError::topology("index 7 out of range"), ErrorKind::InvalidTopology),
            (ExportError::UnsupportedChannelLayout { channels: 6 }, ErrorKind::UnsupportedChannelLayout),
            (ExportError::degenerate("hull", "coplanar"), ErrorKind::DegenerateHull),
            (ExportError::InvalidAudio("short".into()), ErrorKind::MalformedContainer),
        ];
        for (err, kind) in cases {
            let core: CoreError = err.into();
            assert_eq!(core.kind(), kind);
            assert!(!core.is_retryable());
        }
    }

    #[test]
    fn test_payload_offset_is_reported() {
        let located: CoreError = ExportError::InvalidAudio("declares 10 frames but decodes to 4".into())
            .at_payload(Some(100))
            .into();
        assert_eq!(located.kind(), ErrorKind::MalformedContainer);
        assert_eq!(located.offset(), Some(100));
        assert!(located.to_string().contains("at offset 100"));

        let unlocated: CoreError = ExportError::DecompressionFailed("no decoded mips".into())
            .at_payload(None)
            .into();
        assert_eq!(unlocated.offset(), None);

        let topology: CoreError = ExportError::topology("cycle").at_payload(Some(100)).into();
        assert_eq!(topology.kind(), ErrorKind::InvalidTopology);
        assert_eq!(topology.offset(), None);
    }
}
