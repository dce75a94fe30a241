//! Container and payload writers.
//!
//! [`ContainerBuilder`] lays a container out canonically: header, then the
//! directory, then each payload aligned to four bytes.

use byteorder::{LittleEndian, WriteBytesExt};

use iwbridge_core::AssetKind;

use super::{CONTAINER_MAGIC, DIRECTORY_ENTRY_SIZE, HEADER_SIZE, MAX_VERSION, MIN_VERSION};
use crate::compression::{self, Codec};
use crate::registry::ChunkTag;
use crate::traits::{ParseError, ParseResult};

/// Little-endian payload writer mirroring [`super::ChunkReader`]
#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        // Writing into a Vec cannot fail.
        let _ = self.buf.write_u16::<LittleEndian>(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        let _ = self.buf.write_u32::<LittleEndian>(v);
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        let _ = self.buf.write_i32::<LittleEndian>(v);
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        let _ = self.buf.write_u64::<LittleEndian>(v);
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        let _ = self.buf.write_f32::<LittleEndian>(v);
        self
    }

    pub fn f32s(&mut self, values: &[f32]) -> &mut Self {
        for &v in values {
            self.f32(v);
        }
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Length-prefixed (u16) UTF-8 string, truncated to 65535 bytes
    pub fn string(&mut self, s: &str) -> &mut Self {
        let raw = s.as_bytes();
        let len = raw.len().min(u16::MAX as usize);
        self.u16(len as u16);
        self.buf.extend_from_slice(&raw[..len]);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[derive(Debug, Clone)]
struct PendingChunk {
    tag: ChunkTag,
    index: u16,
    codec: Codec,
    flags: u8,
    payload: Vec<u8>,
}

/// Builds a container byte stream
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    version: u32,
    kind: AssetKind,
    flags: u8,
    chunks: Vec<PendingChunk>,
}

impl ContainerBuilder {
    /// Start a container of `kind` at the newest supported version
    pub fn new(kind: AssetKind) -> Self {
        Self {
            version: MAX_VERSION,
            kind,
            flags: 0,
            chunks: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Add a stored chunk with index 0
    pub fn chunk(self, tag: ChunkTag, payload: impl Into<Vec<u8>>) -> Self {
        self.chunk_with(tag, 0, Codec::Store, payload)
    }

    /// Add a stored chunk with an explicit index
    pub fn chunk_indexed(self, tag: ChunkTag, index: u16, payload: impl Into<Vec<u8>>) -> Self {
        self.chunk_with(tag, index, Codec::Store, payload)
    }

    /// Add a chunk with explicit index and codec
    pub fn chunk_with(
        mut self,
        tag: ChunkTag,
        index: u16,
        codec: Codec,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        self.chunks.push(PendingChunk {
            tag,
            index,
            codec,
            flags: 0,
            payload: payload.into(),
        });
        self
    }

    /// Serialise the container
    pub fn build(&self) -> ParseResult<Vec<u8>> {
        if !(MIN_VERSION..=MAX_VERSION).contains(&self.version) {
            return Err(ParseError::UnsupportedVersion {
                version: self.version,
                min: MIN_VERSION,
                max: MAX_VERSION,
            });
        }

        let mut stored = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            if self.version == 1 && chunk.codec != Codec::Store {
                return Err(ParseError::UnsupportedFeature(format!(
                    "chunk '{}' uses {} compression, which version 1 containers cannot carry",
                    chunk.tag,
                    chunk.codec.name()
                )));
            }
            stored.push(compression::compress(&chunk.payload, chunk.codec)?);
        }

        let directory_offset = HEADER_SIZE;
        let mut cursor = align4(directory_offset + self.chunks.len() * DIRECTORY_ENTRY_SIZE);
        let mut offsets = Vec::with_capacity(stored.len());
        for data in &stored {
            offsets.push(cursor);
            cursor = align4(cursor + data.len());
        }
        let total = cursor;
        if total > u32::MAX as usize {
            return Err(ParseError::UnsupportedFeature(
                "container exceeds 4 GiB".to_string(),
            ));
        }

        let mut out = PayloadWriter::new();
        out.bytes(CONTAINER_MAGIC)
            .u32(self.version)
            .u8(self.kind.to_u8())
            .u8(self.flags)
            .u16(0)
            .u32(self.chunks.len() as u32)
            .u32(directory_offset as u32);

        for ((chunk, data), offset) in self.chunks.iter().zip(&stored).zip(&offsets) {
            out.bytes(&chunk.tag.0)
                .u32(*offset as u32)
                .u32(data.len() as u32)
                .u32(chunk.payload.len() as u32)
                .u16(chunk.index)
                .u8(chunk.codec.container_code())
                .u8(chunk.flags);
        }

        let mut bytes = out.finish();
        bytes.resize(total, 0);
        for (data, offset) in stored.iter().zip(&offsets) {
            bytes[*offset..*offset + data.len()].copy_from_slice(data);
        }

        Ok(bytes)
    }
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tags;

    #[test]
    fn test_canonical_layout() {
        let bytes = ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::PHYSICS_SHAPES, vec![1, 2, 3])
            .chunk(tags::NAME, b"hull".to_vec())
            .build()
            .unwrap();

        assert_eq!(&bytes[0..4], CONTAINER_MAGIC);
        // header (20) + 2 directory entries (40) = 60, already aligned
        let first_offset = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
        assert_eq!(first_offset, 60);
        // 3-byte payload is padded so the next payload starts at 64
        let second_offset = u32::from_le_bytes([bytes[44], bytes[45], bytes[46], bytes[47]]);
        assert_eq!(second_offset, 64);
        assert_eq!(bytes.len(), 68);
    }

    #[test]
    fn test_version_one_rejects_compression() {
        let result = ContainerBuilder::new(AssetKind::Audio)
            .version(1)
            .chunk_with(tags::AUDIO_DATA, 0, Codec::Zstd, vec![0u8; 64])
            .build();
        assert!(matches!(result, Err(ParseError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_payload_writer_string() {
        let mut w = PayloadWriter::new();
        w.string("bone").u32(7);
        assert_eq!(w.finish(), vec![4, 0, b'b', b'o', b'n', b'e', 7, 0, 0, 0]);
    }
}
