// iwbridge-parsers/src/compression.rs
//! Payload compression shared by containers and pack archives
//!
//! Supports the codecs found in foreign asset payloads:
//! - Store (no compression)
//! - Deflate (raw, as in ZIP)
//! - ZStd (Zstandard)
//! - LZ4 (frame or raw block)

use std::io::{Read, Write};

use crate::traits::{ParseError, ParseResult};

/// LZ4 frame magic number
const LZ4_FRAME_MAGIC: u32 = 0x184D_2204;

/// Compression codec of a stored payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Store,
    Deflate,
    Zstd,
    Lz4,
}

impl Codec {
    /// Create from a container directory code
    pub fn from_container_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Codec::Store),
            1 => Some(Codec::Deflate),
            2 => Some(Codec::Zstd),
            3 => Some(Codec::Lz4),
            _ => None,
        }
    }

    /// Container directory code
    pub fn container_code(self) -> u8 {
        match self {
            Codec::Store => 0,
            Codec::Deflate => 1,
            Codec::Zstd => 2,
            Codec::Lz4 => 3,
        }
    }

    /// Create from a ZIP compression method
    pub fn from_zip_method(method: u16) -> Option<Self> {
        match method {
            0 => Some(Codec::Store),
            8 => Some(Codec::Deflate),
            93 => Some(Codec::Zstd),
            99 => Some(Codec::Lz4),
            _ => None,
        }
    }

    /// ZIP compression method
    pub fn zip_method(self) -> u16 {
        match self {
            Codec::Store => 0,
            Codec::Deflate => 8,
            Codec::Zstd => 93,
            Codec::Lz4 => 99,
        }
    }

    /// Name for display
    pub fn name(self) -> &'static str {
        match self {
            Codec::Store => "store",
            Codec::Deflate => "deflate",
            Codec::Zstd => "zstd",
            Codec::Lz4 => "lz4",
        }
    }
}

/// Decompress `data` and verify it decodes to exactly `expected_size` bytes
///
/// `offset` is the payload's position in its container and is carried into
/// any error.
pub fn decompress(data: &[u8], codec: Codec, expected_size: usize, offset: u64) -> ParseResult<Vec<u8>> {
    let fail = |message: String| ParseError::DecompressionFailed { offset, message };

    let output = match codec {
        Codec::Store => data.to_vec(),

        Codec::Deflate => {
            let mut decoder = flate2::read::DeflateDecoder::new(data);
            let mut output = Vec::with_capacity(expected_size);
            decoder
                .read_to_end(&mut output)
                .map_err(|e| fail(format!("DEFLATE decompression failed: {e}")))?;
            output
        }

        Codec::Zstd => zstd::stream::decode_all(data)
            .map_err(|e| fail(format!("ZSTD decompression failed: {e}")))?,

        Codec::Lz4 => {
            let is_frame = data.len() >= 4
                && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == LZ4_FRAME_MAGIC;

            if is_frame {
                let mut decoder = lz4_flex::frame::FrameDecoder::new(data);
                let mut output = Vec::with_capacity(expected_size);
                decoder
                    .read_to_end(&mut output)
                    .map_err(|e| fail(format!("LZ4 frame decompression failed: {e}")))?;
                output
            } else {
                lz4_flex::block::decompress(data, expected_size)
                    .map_err(|e| fail(format!("LZ4 block decompression failed: {e}")))?
            }
        }
    };

    if output.len() != expected_size {
        return Err(fail(format!(
            "{} size mismatch: expected {}, got {}",
            codec.name(),
            expected_size,
            output.len()
        )));
    }

    Ok(output)
}

/// Compress data using the specified codec
pub fn compress(data: &[u8], codec: Codec) -> ParseResult<Vec<u8>> {
    let fail = |message: String| ParseError::DecompressionFailed { offset: 0, message };

    match codec {
        Codec::Store => Ok(data.to_vec()),

        Codec::Deflate => {
            let mut encoder =
                flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(data)
                .map_err(|e| fail(format!("DEFLATE compression failed: {e}")))?;
            encoder
                .finish()
                .map_err(|e| fail(format!("DEFLATE compression finalization failed: {e}")))
        }

        Codec::Zstd => zstd::stream::encode_all(data, 3)
            .map_err(|e| fail(format!("ZSTD compression failed: {e}"))),

        Codec::Lz4 => Ok(lz4_flex::block::compress(data)),
    }
}

/// Calculate CRC32 checksum
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"Chunk payloads repeat a lot: VPOS VPOS VPOS VPOS VPOS VPOS VPOS";

    #[test]
    fn test_codec_roundtrip_all() {
        for codec in [Codec::Store, Codec::Deflate, Codec::Zstd, Codec::Lz4] {
            let packed = compress(SAMPLE, codec).unwrap();
            let unpacked = decompress(&packed, codec, SAMPLE.len(), 0).unwrap();
            assert_eq!(unpacked, SAMPLE, "codec {}", codec.name());
        }
    }

    #[test]
    fn test_size_mismatch_reports_offset() {
        let packed = compress(SAMPLE, Codec::Zstd).unwrap();
        let err = decompress(&packed, Codec::Zstd, SAMPLE.len() + 1, 640).unwrap_err();
        assert_eq!(err.offset(), Some(640));
    }

    #[test]
    fn test_lz4_frame_detected() {
        let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
        encoder.write_all(SAMPLE).unwrap();
        let framed = encoder.finish().unwrap();

        let unpacked = decompress(&framed, Codec::Lz4, SAMPLE.len(), 0).unwrap();
        assert_eq!(unpacked, SAMPLE);
    }

    #[test]
    fn test_codes() {
        assert_eq!(Codec::from_container_code(2), Some(Codec::Zstd));
        assert_eq!(Codec::from_container_code(9), None);
        assert_eq!(Codec::from_zip_method(93), Some(Codec::Zstd));
        assert_eq!(Codec::from_zip_method(99), Some(Codec::Lz4));
        assert_eq!(Codec::from_zip_method(12), None);
    }

    #[test]
    fn test_crc32() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
