// iwbridge-parsers/src/container/mod.rs
//! Chunked asset container reader
//!
//! Every source asset is a container: a small header, a directory of chunk
//! entries and the chunk payloads. Chunks are addressed by offset and length
//! so any chunk can be read without walking the ones before it.
//!
//! # Format Structure
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Header (20 bytes)                    │
//! │  magic "IWAC" | version u32 | kind u8 | flags u8         │
//! │  reserved u16 | chunk count u32 | directory offset u32   │
//! ├──────────────────────────────────────────────────────────┤
//! │              Directory (20 bytes per chunk)              │
//! │  tag [4] | offset u32 | stored len u32 | decoded len u32 │
//! │  index u16 | compression u8 | flags u8                   │
//! ├──────────────────────────────────────────────────────────┤
//! │                 Payloads (any order, any gap)            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Gap bytes not claimed by the header, directory or any payload are kept so
//! [`Container::to_bytes`] reproduces the input exactly.

mod builder;
mod reader;

pub use builder::{ContainerBuilder, PayloadWriter};
pub use reader::ChunkReader;

use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use iwbridge_core::AssetKind;

use crate::compression::{self, Codec};
use crate::registry::{tags, ChunkRegistry, ChunkTag, GLOBAL_CHUNKS};
use crate::traits::{ParseError, ParseOptions, ParseResult, Parser};
use crate::{log_parse_complete, log_parse_start};

/// Magic bytes at the start of every container
pub const CONTAINER_MAGIC: &[u8; 4] = b"IWAC";

/// Fixed header size
pub const HEADER_SIZE: usize = 20;

/// Size of one directory entry
pub const DIRECTORY_ENTRY_SIZE: usize = 20;

/// Oldest supported container version
pub const MIN_VERSION: u32 = 1;

/// Newest supported container version
pub const MAX_VERSION: u32 = 2;

/// Parsed container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    pub version: u32,
    pub kind: AssetKind,
    pub flags: u8,
    pub reserved: u16,
    pub chunk_count: u32,
    pub directory_offset: u32,
}

/// One directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    pub tag: ChunkTag,
    /// Payload offset in the container
    pub offset: u32,
    /// Stored (possibly compressed) length
    pub length: u32,
    /// Length after decompression
    pub decoded_length: u32,
    /// Mip level, UV channel or sequence number
    pub index: u16,
    pub codec: Codec,
    pub flags: u8,
    /// Offset of this entry in the directory
    pub directory_position: u64,
}

impl ChunkEntry {
    /// Byte range of the stored payload
    pub fn range(&self) -> Range<usize> {
        self.offset as usize..self.offset as usize + self.length as usize
    }
}

/// Coordinate frame the source was authored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

/// Contents of the optional `META` chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerMeta {
    pub up_axis: UpAxis,
    pub author: String,
}

/// A parsed container over an owned, shared buffer
#[derive(Debug, Clone)]
pub struct Container {
    header: ContainerHeader,
    entries: Vec<ChunkEntry>,
    data: Bytes,
    gaps: Vec<Range<usize>>,
}

impl Container {
    /// Parse with default options and the global descriptor table
    pub fn parse(data: Bytes) -> ParseResult<Self> {
        Self::parse_with(data, &ParseOptions::default(), &GLOBAL_CHUNKS)
    }

    /// Parse with explicit options and descriptor table
    pub fn parse_with(
        data: Bytes,
        options: &ParseOptions,
        registry: &ChunkRegistry,
    ) -> ParseResult<Self> {
        let header = parse_header(&data)?;
        let entries = parse_directory(&data, &header)?;
        validate_entries(&entries, &header, options, registry)?;
        let gaps = find_gaps(data.len(), &header, &entries);

        Ok(Self {
            header,
            entries,
            data,
            gaps,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn kind(&self) -> AssetKind {
        self.header.kind
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// All directory entries in directory order
    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    /// The whole container buffer
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First entry with `tag`
    pub fn find(&self, tag: ChunkTag) -> Option<&ChunkEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// All entries with `tag`, ordered by index
    pub fn find_all(&self, tag: ChunkTag) -> Vec<&ChunkEntry> {
        let mut found: Vec<&ChunkEntry> = self.entries.iter().filter(|e| e.tag == tag).collect();
        found.sort_by_key(|e| e.index);
        found
    }

    /// Entry with `tag`, or [`ParseError::MissingChunk`]
    pub fn require(&self, tag: ChunkTag) -> ParseResult<&ChunkEntry> {
        self.find(tag).ok_or_else(|| ParseError::MissingChunk {
            tag: tag.to_string(),
        })
    }

    /// Stored payload bytes (no decompression)
    pub fn raw(&self, entry: &ChunkEntry) -> Bytes {
        self.data.slice(entry.range())
    }

    /// Decoded payload bytes
    pub fn decode(&self, entry: &ChunkEntry) -> ParseResult<Bytes> {
        let raw = self.raw(entry);
        match entry.codec {
            Codec::Store => Ok(raw),
            codec => compression::decompress(
                &raw,
                codec,
                entry.decoded_length as usize,
                entry.offset as u64,
            )
            .map(Bytes::from),
        }
    }

    /// Display name from the `NAME` chunk
    pub fn name(&self) -> ParseResult<Option<String>> {
        let Some(entry) = self.find(tags::NAME) else {
            return Ok(None);
        };
        let payload = self.decode(entry)?;
        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|e| ParseError::corrupted(entry.offset as u64, format!("invalid name: {e}")))
    }

    /// Metadata from the `META` chunk, defaulted when absent
    pub fn meta(&self) -> ParseResult<ContainerMeta> {
        let Some(entry) = self.find(tags::META) else {
            return Ok(ContainerMeta::default());
        };
        let payload = self.decode(entry)?;
        let mut reader = ChunkReader::new(&payload, entry.offset as u64);

        let at = reader.position();
        let up_axis = match reader.u8()? {
            0 => UpAxis::Y,
            1 => UpAxis::Z,
            other => {
                return Err(ParseError::corrupted(at, format!("unknown up axis {other}")));
            }
        };
        let author = reader.string()?;

        Ok(ContainerMeta { up_axis, author })
    }

    /// Re-serialise header, directory, payloads and gap bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.data.len()];

        let mut header = PayloadWriter::new();
        header
            .bytes(CONTAINER_MAGIC)
            .u32(self.header.version)
            .u8(self.header.kind.to_u8())
            .u8(self.header.flags)
            .u16(self.header.reserved)
            .u32(self.header.chunk_count)
            .u32(self.header.directory_offset);
        out[..HEADER_SIZE].copy_from_slice(&header.finish());

        for gap in &self.gaps {
            out[gap.clone()].copy_from_slice(&self.data[gap.clone()]);
        }

        for entry in &self.entries {
            out[entry.range()].copy_from_slice(&self.data[entry.range()]);
        }

        for entry in &self.entries {
            let mut record = PayloadWriter::new();
            record
                .bytes(&entry.tag.0)
                .u32(entry.offset)
                .u32(entry.length)
                .u32(entry.decoded_length)
                .u16(entry.index)
                .u8(entry.codec.container_code())
                .u8(entry.flags);
            let at = entry.directory_position as usize;
            out[at..at + DIRECTORY_ENTRY_SIZE].copy_from_slice(&record.finish());
        }

        out
    }
}

fn parse_header(data: &[u8]) -> ParseResult<ContainerHeader> {
    if data.len() < HEADER_SIZE {
        return Err(ParseError::corrupted(
            0,
            format!("truncated header: need {HEADER_SIZE} bytes, found {}", data.len()),
        ));
    }

    if &data[0..4] != CONTAINER_MAGIC {
        return Err(ParseError::InvalidMagic {
            expected: CONTAINER_MAGIC.to_vec(),
            found: data[0..4].to_vec(),
        });
    }

    let mut reader = ChunkReader::new(&data[4..HEADER_SIZE], 4);
    let version = reader.u32()?;
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(ParseError::UnsupportedVersion {
            version,
            min: MIN_VERSION,
            max: MAX_VERSION,
        });
    }

    let kind_byte = reader.u8()?;
    let kind = AssetKind::from_u8(kind_byte)
        .ok_or_else(|| ParseError::corrupted(8, format!("unknown asset kind {kind_byte}")))?;

    Ok(ContainerHeader {
        version,
        kind,
        flags: reader.u8()?,
        reserved: reader.u16()?,
        chunk_count: reader.u32()?,
        directory_offset: reader.u32()?,
    })
}

fn parse_directory(data: &[u8], header: &ContainerHeader) -> ParseResult<Vec<ChunkEntry>> {
    let dir_offset = header.directory_offset as u64;
    let dir_end = dir_offset + header.chunk_count as u64 * DIRECTORY_ENTRY_SIZE as u64;

    if dir_offset < HEADER_SIZE as u64 || dir_end > data.len() as u64 {
        return Err(ParseError::corrupted(
            dir_offset,
            format!(
                "directory of {} entries at offset {} does not fit a {}-byte buffer",
                header.chunk_count,
                dir_offset,
                data.len()
            ),
        ));
    }

    let directory = &data[dir_offset as usize..dir_end as usize];
    let mut reader = ChunkReader::new(directory, dir_offset);
    let mut entries = Vec::with_capacity(header.chunk_count as usize);

    for _ in 0..header.chunk_count {
        let directory_position = reader.position();
        let raw_tag = reader.bytes(4)?;
        let tag = ChunkTag([raw_tag[0], raw_tag[1], raw_tag[2], raw_tag[3]]);
        let offset = reader.u32()?;
        let length = reader.u32()?;
        let decoded_length = reader.u32()?;
        let index = reader.u16()?;
        let code = reader.u8()?;
        let flags = reader.u8()?;

        let codec = Codec::from_container_code(code).ok_or_else(|| {
            ParseError::corrupted(
                directory_position + 18,
                format!("chunk '{tag}' uses unknown compression code {code}"),
            )
        })?;

        if header.version == 1 && codec != Codec::Store {
            return Err(ParseError::corrupted(
                directory_position + 18,
                format!("chunk '{tag}' is compressed, which version 1 containers cannot carry"),
            ));
        }

        if codec == Codec::Store && decoded_length != length {
            return Err(ParseError::corrupted(
                directory_position + 12,
                format!(
                    "stored chunk '{tag}' declares decoded length {decoded_length} but stored length {length}"
                ),
            ));
        }

        let end = offset as u64 + length as u64;
        if end > data.len() as u64 {
            return Err(ParseError::corrupted(
                offset as u64,
                format!(
                    "chunk '{tag}' declares {length} bytes at offset {offset} but only {} remain",
                    (data.len() as u64).saturating_sub(offset as u64)
                ),
            ));
        }

        entries.push(ChunkEntry {
            tag,
            offset,
            length,
            decoded_length,
            index,
            codec,
            flags,
            directory_position,
        });
    }

    Ok(entries)
}

fn validate_entries(
    entries: &[ChunkEntry],
    header: &ContainerHeader,
    options: &ParseOptions,
    registry: &ChunkRegistry,
) -> ParseResult<()> {
    let mut seen: HashMap<ChunkTag, usize> = HashMap::new();

    for entry in entries {
        if entry.decoded_length as usize > options.decompression_memory_limit {
            return Err(ParseError::corrupted(
                entry.directory_position + 12,
                format!(
                    "chunk '{}' decodes to {} bytes, above the {}-byte limit",
                    entry.tag, entry.decoded_length, options.decompression_memory_limit
                ),
            ));
        }

        let Some(descriptor) = registry.get(entry.tag) else {
            if options.skip_unknown_chunks {
                tracing::debug!(tag = %entry.tag, offset = entry.offset, "Keeping unknown chunk as opaque");
                continue;
            }
            return Err(ParseError::UnknownChunk {
                tag: entry.tag.to_string(),
                offset: entry.directory_position,
            });
        };

        if !descriptor.allowed_in(header.kind) {
            if options.strict_validation {
                return Err(ParseError::corrupted(
                    entry.directory_position,
                    format!("chunk '{}' is not valid in a {} container", entry.tag, header.kind),
                ));
            }
            tracing::warn!(tag = %entry.tag, kind = %header.kind, "Chunk not expected for this asset kind");
        }

        let count = seen.entry(entry.tag).or_insert(0);
        *count += 1;
        if *count > 1 && !descriptor.repeatable {
            return Err(ParseError::corrupted(
                entry.directory_position,
                format!("chunk '{}' may appear only once", entry.tag),
            ));
        }
    }

    for tag in registry.required_for(header.kind) {
        if !seen.contains_key(&tag) {
            return Err(ParseError::MissingChunk {
                tag: tag.to_string(),
            });
        }
    }

    Ok(())
}

fn find_gaps(len: usize, header: &ContainerHeader, entries: &[ChunkEntry]) -> Vec<Range<usize>> {
    let dir_start = header.directory_offset as usize;
    let dir_end = dir_start + header.chunk_count as usize * DIRECTORY_ENTRY_SIZE;

    let mut covered: Vec<Range<usize>> = Vec::with_capacity(entries.len() + 2);
    covered.push(0..HEADER_SIZE);
    covered.push(dir_start..dir_end);
    covered.extend(entries.iter().map(ChunkEntry::range));
    covered.sort_by_key(|r| r.start);

    let mut gaps = Vec::new();
    let mut cursor = 0;
    for range in covered {
        if range.start > cursor {
            gaps.push(cursor..range.start);
        }
        cursor = cursor.max(range.end);
    }
    if cursor < len {
        gaps.push(cursor..len);
    }
    gaps
}

/// [`Parser`] front-end for container files
#[derive(Debug, Default)]
pub struct ContainerParser;

impl ContainerParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for ContainerParser {
    type Output = Container;

    fn extensions(&self) -> &[&str] {
        &["iwa", "iwac"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(CONTAINER_MAGIC)
    }

    fn name(&self) -> &str {
        "Asset Container Parser"
    }

    fn parse_with_options(&self, data: Bytes, options: &ParseOptions) -> ParseResult<Self::Output> {
        log_parse_start!(self.name(), format!("{} bytes", data.len()));
        let start = Instant::now();
        let container = Container::parse_with(data, options, &GLOBAL_CHUNKS)?;
        log_parse_complete!(self.name(), start.elapsed(), container.entries().len());
        Ok(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physics_container() -> Vec<u8> {
        ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
            .chunk(tags::NAME, b"crate_hull".to_vec())
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_built_container() {
        let container = Container::parse(Bytes::from(physics_container())).unwrap();

        assert_eq!(container.kind(), AssetKind::Physics);
        assert_eq!(container.version(), MAX_VERSION);
        assert_eq!(container.entries().len(), 2);
        assert_eq!(container.name().unwrap().as_deref(), Some("crate_hull"));
        assert_eq!(container.meta().unwrap(), ContainerMeta::default());
    }

    #[test]
    fn test_chunk_overrunning_buffer_is_malformed() {
        // 100-byte buffer whose only chunk claims 1000 bytes at offset 50
        let mut data = vec![0u8; 100];
        let mut header = PayloadWriter::new();
        header
            .bytes(CONTAINER_MAGIC)
            .u32(2)
            .u8(AssetKind::Texture.to_u8())
            .u8(0)
            .u16(0)
            .u32(1)
            .u32(20)
            .bytes(b"TXMP")
            .u32(50)
            .u32(1000)
            .u32(1000)
            .u16(0)
            .u8(0)
            .u8(0);
        let header = header.finish();
        data[..header.len()].copy_from_slice(&header);

        let err = Container::parse(Bytes::from(data)).unwrap_err();
        assert!(matches!(err, ParseError::CorruptedData { offset: 50, .. }));

        let core: iwbridge_core::Error = err.into();
        assert_eq!(core.kind(), iwbridge_core::ErrorKind::MalformedContainer);
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = physics_container();
        data[4..8].copy_from_slice(&9u32.to_le_bytes());

        let err = Container::parse(Bytes::from(data)).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedVersion { version: 9, .. }));
    }

    #[test]
    fn test_bad_magic() {
        let mut data = physics_container();
        data[0] = b'X';
        assert!(matches!(
            Container::parse(Bytes::from(data)),
            Err(ParseError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_directory_past_end() {
        let mut data = physics_container();
        data[12..16].copy_from_slice(&50u32.to_le_bytes());
        let err = Container::parse(Bytes::from(data)).unwrap_err();
        assert_eq!(err.offset(), Some(20));
    }

    #[test]
    fn test_missing_required_chunk() {
        let data = ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::NAME, b"empty".to_vec())
            .build()
            .unwrap();
        assert!(matches!(
            Container::parse(Bytes::from(data)),
            Err(ParseError::MissingChunk { .. })
        ));
    }

    #[test]
    fn test_duplicate_singular_chunk() {
        let data = ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
            .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
            .build()
            .unwrap();
        assert!(Container::parse(Bytes::from(data)).is_err());
    }

    #[test]
    fn test_unknown_chunk_policy() {
        let data = ContainerBuilder::new(AssetKind::Physics)
            .chunk(tags::PHYSICS_SHAPES, 0u32.to_le_bytes().to_vec())
            .chunk(ChunkTag::new(b"XTRA"), vec![9, 9])
            .build()
            .unwrap();

        let lenient = Container::parse(Bytes::from(data.clone())).unwrap();
        assert!(lenient.find(ChunkTag::new(b"XTRA")).is_some());

        let options = ParseOptions {
            skip_unknown_chunks: false,
            ..ParseOptions::default()
        };
        let strict = Container::parse_with(Bytes::from(data), &options, &GLOBAL_CHUNKS);
        assert!(matches!(strict, Err(ParseError::UnknownChunk { .. })));
    }

    #[test]
    fn test_compressed_chunk_decodes() {
        let payload = vec![7u8; 4096];
        let data = ContainerBuilder::new(AssetKind::Audio)
            .chunk(tags::AUDIO_HEADER, vec![0u8; 20])
            .chunk_with(tags::AUDIO_DATA, 0, Codec::Zstd, payload.clone())
            .build()
            .unwrap();

        let container = Container::parse(Bytes::from(data)).unwrap();
        let entry = container.require(tags::AUDIO_DATA).unwrap();
        assert!(entry.length < entry.decoded_length);
        assert_eq!(container.decode(entry).unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn test_roundtrip_preserves_gaps() {
        let mut data = physics_container();
        // trailing bytes no chunk claims
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        // padding byte between payloads
        let pad = data.len() - 5;
        data[pad] = 0x55;

        let container = Container::parse(Bytes::from(data.clone())).unwrap();
        assert_eq!(container.to_bytes(), data);
    }

    #[test]
    fn test_find_all_orders_by_index() {
        let data = ContainerBuilder::new(AssetKind::Texture)
            .chunk_indexed(tags::TEXTURE_MIP, 1, vec![1])
            .chunk_indexed(tags::TEXTURE_MIP, 0, vec![0])
            .build()
            .unwrap();
        let container = Container::parse(Bytes::from(data)).unwrap();
        let indices: Vec<u16> = container
            .find_all(tags::TEXTURE_MIP)
            .iter()
            .map(|e| e.index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_container_parser_detects_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hull.bin");
        std::fs::write(&path, physics_container()).unwrap();

        let parser = ContainerParser::new();
        assert!(parser.can_parse(&path));
        let container = parser.parse_file(&path).unwrap();
        assert_eq!(container.kind(), AssetKind::Physics);
    }
}
