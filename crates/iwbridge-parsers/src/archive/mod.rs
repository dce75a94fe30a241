// iwbridge-parsers/src/archive/mod.rs
//! Pack Archive Parser
//!
//! Packs are ZIP-layout archives whose entries are asset containers. Besides
//! store and deflate they use method 93 (Zstandard) and 99 (LZ4).
//!
//! # Format Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Local header + data   (per entry)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Central Directory     (per entry, points at local header)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [ZIP64 EOCD + locator]                                     │
//! │  End of Central Directory (0x06054B50)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The whole archive is held in one [`Bytes`] buffer (memory-mapped for
//! large files by [`crate::traits::load_file`]); entries are extracted on
//! demand and CRC-checked.

mod entry;
mod writer;

pub use entry::{PackEntry, PackEntryInfo};
pub use writer::PackWriter;

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use crate::compression::{self, Codec};
use crate::container::ChunkReader;
use crate::traits::{ParseError, ParseOptions, ParseResult, Parser};
use crate::{log_parse_complete, log_parse_start};

/// Magic bytes at the start of a pack ("PK\x03\x04")
const PACK_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];

/// End of central directory signature
const EOCD_SIGNATURE: u32 = 0x0605_4B50;

/// Central directory file header signature
const CD_SIGNATURE: u32 = 0x0201_4B50;

/// Local file header signature
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4B50;

/// ZIP64 end of central directory signature
const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4B50;

/// ZIP64 end of central directory locator signature
const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x0706_4B50;

const EOCD_SIZE: usize = 22;

/// Parsed pack archive
#[derive(Debug, Clone)]
pub struct PackArchive {
    data: Bytes,
    /// All entries in central directory order
    pub entries: Vec<PackEntry>,
    /// Path to entry index mapping for fast lookup
    pub path_index: HashMap<String, usize>,
}

/// Archive statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ArchiveStatistics {
    pub file_count: usize,
    pub directory_count: usize,
    pub encrypted_count: usize,
    pub total_uncompressed: u64,
    pub total_compressed: u64,
    pub compression_ratio: f64,
    /// File count by extension
    pub extensions: BTreeMap<String, usize>,
}

impl PackArchive {
    /// Get an entry by path
    pub fn get(&self, path: &str) -> Option<&PackEntry> {
        self.path_index.get(path).map(|&idx| &self.entries[idx])
    }

    /// Entries that are plain files we can decode
    pub fn files(&self) -> impl Iterator<Item = &PackEntry> {
        self.entries.iter().filter(|e| e.is_readable())
    }

    /// Extract, decompress and CRC-check the entry at `path`
    pub fn read(&self, path: &str) -> ParseResult<Bytes> {
        let entry = self.get(path).ok_or_else(|| ParseError::MissingChunk {
            tag: path.to_string(),
        })?;
        self.read_entry(entry)
    }

    /// Extract, decompress and CRC-check `entry`
    pub fn read_entry(&self, entry: &PackEntry) -> ParseResult<Bytes> {
        if entry.encrypted {
            return Err(ParseError::UnsupportedFeature(format!(
                "encrypted pack entry '{}'",
                entry.path
            )));
        }
        let codec = entry.codec().ok_or_else(|| {
            ParseError::UnsupportedFeature(format!(
                "compression method {} in '{}'",
                entry.method, entry.path
            ))
        })?;

        let start = entry.local_header_offset as usize;
        let header = self
            .data
            .get(start..)
            .ok_or_else(|| ParseError::corrupted(entry.local_header_offset, "local header past end of pack"))?;
        let mut reader = ChunkReader::new(header, entry.local_header_offset);

        let sig = reader.u32()?;
        if sig != LOCAL_HEADER_SIGNATURE {
            return Err(ParseError::InvalidMagic {
                expected: LOCAL_HEADER_SIGNATURE.to_le_bytes().to_vec(),
                found: sig.to_le_bytes().to_vec(),
            });
        }
        reader.bytes(22)?; // version, flags, method, time, date, crc, sizes
        let name_len = reader.u16()? as usize;
        let extra_len = reader.u16()? as usize;
        reader.bytes(name_len + extra_len)?;

        let data_offset = reader.position();
        let stored = reader.bytes(entry.compressed_size as usize)?;

        let data = match codec {
            Codec::Store => self.data.slice(
                data_offset as usize..data_offset as usize + entry.compressed_size as usize,
            ),
            codec => Bytes::from(compression::decompress(
                stored,
                codec,
                entry.uncompressed_size as usize,
                data_offset,
            )?),
        };

        let crc = compression::crc32(&data);
        if crc != entry.crc32 {
            return Err(ParseError::corrupted(
                data_offset,
                format!(
                    "CRC mismatch in '{}': expected {:08x}, got {crc:08x}",
                    entry.path, entry.crc32
                ),
            ));
        }

        Ok(data)
    }

    /// Get archive statistics
    pub fn statistics(&self) -> ArchiveStatistics {
        let mut stats = ArchiveStatistics::default();

        for entry in &self.entries {
            if entry.directory {
                stats.directory_count += 1;
                continue;
            }
            stats.file_count += 1;
            if entry.encrypted {
                stats.encrypted_count += 1;
            }
            stats.total_uncompressed += entry.uncompressed_size;
            stats.total_compressed += entry.compressed_size;
            if let Some(ext) = entry.extension() {
                *stats.extensions.entry(ext).or_insert(0) += 1;
            }
        }

        if stats.total_uncompressed > 0 {
            stats.compression_ratio = stats.total_compressed as f64 / stats.total_uncompressed as f64;
        }

        stats
    }
}

/// End of Central Directory record
#[derive(Debug)]
struct EndOfCentralDirectory {
    total_entries: u64,
    cd_size: u64,
    cd_offset: u64,
}

/// Pack Archive Parser
#[derive(Debug, Default)]
pub struct PackParser;

impl PackParser {
    pub fn new() -> Self {
        Self
    }

    /// Locate and parse the end of central directory record
    fn parse_eocd(&self, data: &[u8]) -> ParseResult<EndOfCentralDirectory> {
        if data.len() < EOCD_SIZE {
            return Err(ParseError::corrupted(0, "pack is shorter than an EOCD record"));
        }

        // EOCD is at least 22 bytes, search within last 65KB for comment
        let search_start = data.len().saturating_sub(65535 + EOCD_SIZE);
        let sig_bytes = EOCD_SIGNATURE.to_le_bytes();
        let eocd_offset = data[search_start..]
            .windows(4)
            .rposition(|w| w == sig_bytes)
            .map(|pos| search_start + pos)
            .ok_or_else(|| ParseError::InvalidMagic {
                expected: sig_bytes.to_vec(),
                found: vec![],
            })?;

        let mut reader = ChunkReader::new(&data[eocd_offset..], eocd_offset as u64);
        reader.u32()?; // signature
        reader.u16()?; // disk number
        reader.u16()?; // central directory disk
        reader.u16()?; // entries on this disk
        let total_entries = reader.u16()?;
        let cd_size = reader.u32()?;
        let cd_offset = reader.u32()?;

        if cd_offset == u32::MAX || total_entries == u16::MAX {
            return self.parse_zip64_eocd(data, eocd_offset);
        }

        Ok(EndOfCentralDirectory {
            total_entries: total_entries as u64,
            cd_size: cd_size as u64,
            cd_offset: cd_offset as u64,
        })
    }

    /// Parse ZIP64 end of central directory
    fn parse_zip64_eocd(&self, data: &[u8], eocd_offset: usize) -> ParseResult<EndOfCentralDirectory> {
        // Locator sits right before the EOCD
        let locator_offset = eocd_offset.checked_sub(20).ok_or_else(|| {
            ParseError::corrupted(eocd_offset as u64, "ZIP64 marker without locator")
        })?;
        let mut locator = ChunkReader::new(&data[locator_offset..eocd_offset], locator_offset as u64);

        let sig = locator.u32()?;
        if sig != ZIP64_EOCD_LOCATOR_SIGNATURE {
            return Err(ParseError::InvalidMagic {
                expected: ZIP64_EOCD_LOCATOR_SIGNATURE.to_le_bytes().to_vec(),
                found: sig.to_le_bytes().to_vec(),
            });
        }
        locator.u32()?; // disk with ZIP64 EOCD
        let zip64_offset = locator.u64()?;

        let record = data.get(zip64_offset as usize..).ok_or_else(|| {
            ParseError::corrupted(zip64_offset, "ZIP64 EOCD offset past end of pack")
        })?;
        let mut reader = ChunkReader::new(record, zip64_offset);
        let sig = reader.u32()?;
        if sig != ZIP64_EOCD_SIGNATURE {
            return Err(ParseError::InvalidMagic {
                expected: ZIP64_EOCD_SIGNATURE.to_le_bytes().to_vec(),
                found: sig.to_le_bytes().to_vec(),
            });
        }
        reader.bytes(8 + 2 + 2 + 4 + 4 + 8)?; // size, versions, disks, disk entries
        let total_entries = reader.u64()?;
        let cd_size = reader.u64()?;
        let cd_offset = reader.u64()?;

        Ok(EndOfCentralDirectory {
            total_entries,
            cd_size,
            cd_offset,
        })
    }

    /// Parse central directory entries
    fn parse_central_directory(
        &self,
        data: &[u8],
        eocd: &EndOfCentralDirectory,
    ) -> ParseResult<Vec<PackEntry>> {
        let end = eocd.cd_offset.saturating_add(eocd.cd_size);
        if end > data.len() as u64 {
            return Err(ParseError::corrupted(
                eocd.cd_offset,
                format!(
                    "central directory of {} bytes at {} does not fit a {}-byte pack",
                    eocd.cd_size,
                    eocd.cd_offset,
                    data.len()
                ),
            ));
        }

        let mut reader = ChunkReader::new(&data[eocd.cd_offset as usize..end as usize], eocd.cd_offset);
        // 46 bytes is the fixed part of each record
        let capacity = (eocd.total_entries as usize).min(eocd.cd_size as usize / 46);
        let mut entries = Vec::with_capacity(capacity);

        for _ in 0..eocd.total_entries {
            entries.push(self.parse_cd_entry(&mut reader)?);
        }

        Ok(entries)
    }

    /// Parse a single central directory entry
    fn parse_cd_entry(&self, reader: &mut ChunkReader<'_>) -> ParseResult<PackEntry> {
        let sig = reader.u32()?;
        if sig != CD_SIGNATURE {
            return Err(ParseError::InvalidMagic {
                expected: CD_SIGNATURE.to_le_bytes().to_vec(),
                found: sig.to_le_bytes().to_vec(),
            });
        }

        reader.u16()?; // version made by
        reader.u16()?; // version needed
        let flags = reader.u16()?;
        let method = reader.u16()?;
        reader.u16()?; // modification time
        reader.u16()?; // modification date
        let crc32 = reader.u32()?;
        let compressed_size = reader.u32()?;
        let uncompressed_size = reader.u32()?;
        let name_length = reader.u16()? as usize;
        let extra_length = reader.u16()? as usize;
        let comment_length = reader.u16()? as usize;
        reader.bytes(2 + 2 + 4)?; // disk start, internal and external attributes
        let local_header_offset = reader.u32()?;

        let path = String::from_utf8_lossy(reader.bytes(name_length)?).to_string();
        let extra = reader.bytes(extra_length)?;
        let (compressed_size, uncompressed_size, local_header_offset) =
            parse_zip64_extra(extra, compressed_size, uncompressed_size, local_header_offset);
        reader.bytes(comment_length)?;

        Ok(PackEntry {
            directory: path.ends_with('/'),
            path,
            method,
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            encrypted: flags & 0x01 != 0,
        })
    }
}

/// Widen sizes and offset from a ZIP64 extra field where the 32-bit value is saturated
fn parse_zip64_extra(
    extra: &[u8],
    compressed_size: u32,
    uncompressed_size: u32,
    local_offset: u32,
) -> (u64, u64, u64) {
    let mut compressed = compressed_size as u64;
    let mut uncompressed = uncompressed_size as u64;
    let mut offset = local_offset as u64;

    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let size = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        pos += 4;

        if id == 0x0001 && pos + size <= extra.len() {
            let field = &extra[pos..pos + size];
            let mut fields = field
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));

            if uncompressed_size == u32::MAX {
                uncompressed = fields.next().unwrap_or(uncompressed);
            }
            if compressed_size == u32::MAX {
                compressed = fields.next().unwrap_or(compressed);
            }
            if local_offset == u32::MAX {
                offset = fields.next().unwrap_or(offset);
            }
            break;
        }

        pos += size;
    }

    (compressed, uncompressed, offset)
}

impl Parser for PackParser {
    type Output = PackArchive;

    fn extensions(&self) -> &[&str] {
        &["iwpak", "zip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(PACK_MAGIC)
    }

    fn name(&self) -> &str {
        "Pack Archive Parser"
    }

    fn parse_with_options(&self, data: Bytes, _options: &ParseOptions) -> ParseResult<Self::Output> {
        log_parse_start!(self.name(), format!("{} bytes", data.len()));
        let start = Instant::now();

        // An archive with no entries starts directly with the EOCD
        let empty = data.len() == EOCD_SIZE;
        if !empty && data.get(..4) != Some(PACK_MAGIC) {
            return Err(ParseError::InvalidMagic {
                expected: PACK_MAGIC.to_vec(),
                found: data[..data.len().min(4)].to_vec(),
            });
        }

        let eocd = self.parse_eocd(&data)?;
        let entries = self.parse_central_directory(&data, &eocd)?;

        let mut path_index = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            path_index.insert(entry.path.clone(), idx);
        }

        log_parse_complete!(self.name(), start.elapsed(), entries.len());
        Ok(PackArchive {
            data,
            entries,
            path_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pack() -> Vec<u8> {
        let mut writer = PackWriter::new();
        writer
            .add("Textures/rock.iwa", &[1u8; 300], Codec::Deflate)
            .unwrap()
            .add("Meshes/crate.iwa", b"mesh payload mesh payload", Codec::Zstd)
            .unwrap()
            .add("Audio/beep.iwa", &[7u8; 64], Codec::Lz4)
            .unwrap()
            .add("readme.txt", b"hello", Codec::Store)
            .unwrap();
        writer.finish()
    }

    #[test]
    fn test_parse_and_extract() {
        let archive = PackParser::new().parse(Bytes::from(sample_pack())).unwrap();

        assert_eq!(archive.entries.len(), 4);
        assert_eq!(archive.read("Textures/rock.iwa").unwrap().as_ref(), &[1u8; 300]);
        assert_eq!(archive.read("Audio/beep.iwa").unwrap().as_ref(), &[7u8; 64]);
        assert_eq!(archive.read("readme.txt").unwrap().as_ref(), b"hello");
        assert_eq!(archive.files().filter(|e| e.extension().as_deref() == Some("iwa")).count(), 3);

        let stats = archive.statistics();
        assert_eq!(stats.file_count, 4);
        assert_eq!(stats.extensions.get("iwa"), Some(&3));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut data = sample_pack();
        // readme.txt is stored; flip one byte of its content
        let pos = data.windows(5).position(|w| w == b"hello").unwrap();
        data[pos] = b'j';

        let archive = PackParser::new().parse(Bytes::from(data)).unwrap();
        let err = archive.read("readme.txt").unwrap_err();
        assert!(matches!(err, ParseError::CorruptedData { .. }));
    }

    #[test]
    fn test_missing_entry() {
        let archive = PackParser::new().parse(Bytes::from(sample_pack())).unwrap();
        assert!(archive.read("nope.iwa").is_err());
    }

    #[test]
    fn test_empty_pack() {
        let archive = PackParser::new().parse(Bytes::from(PackWriter::new().finish())).unwrap();
        assert!(archive.entries.is_empty());
    }

    #[test]
    fn test_zip64_extra() {
        let mut extra = vec![0x01, 0x00, 16, 0];
        extra.extend_from_slice(&5_000_000_000u64.to_le_bytes());
        extra.extend_from_slice(&4_000_000_000u64.to_le_bytes());
        let (compressed, uncompressed, offset) = parse_zip64_extra(&extra, u32::MAX, u32::MAX, 10);
        assert_eq!(uncompressed, 5_000_000_000);
        assert_eq!(compressed, 4_000_000_000);
        assert_eq!(offset, 10);
    }
}
