//! Texture chunk parser
//!
//! A texture container carries either a `TXHD` header plus one `TXMP` chunk
//! per mip level, or a complete DDS file in a `DDSF` chunk.
//!
//! # Mip Chains
//! Mip chunks are addressed by directory index. Indices must run 0..n
//! without holes and every level must hold exactly the bytes its
//! dimensions require for the declared format.

mod dds;
mod format;

pub use dds::{parse_dds, write_dds, DdsHeader, DdsPixelFormat, DdsSurface, Dx10Header, DDS_MAGIC};
pub use format::{dxgi, max_mip_count, mip_dimensions, PixelFormat};

use serde::Serialize;

use crate::container::{ChunkReader, Container, PayloadWriter};
use crate::registry::tags;
use crate::traits::{ParseError, ParseResult};

/// `TXHD` flag: the texture is a tangent-space normal map
pub const TEXTURE_FLAG_NORMAL_MAP: u32 = 1;

/// Parsed texture ready for decoding
#[derive(Debug, Clone)]
pub struct TextureRecord {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub srgb: bool,
    pub flags: u32,
    /// Block data per mip, largest first
    pub mips: Vec<Vec<u8>>,
    /// Container offset of the top mip's chunk payload
    pub payload_offset: Option<u64>,
}

/// Summary used by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct TextureSummary {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub srgb: bool,
    pub mip_count: usize,
    pub normal_map: bool,
}

impl TextureRecord {
    /// Read the texture record out of `container`
    pub fn from_container(container: &Container, name: &str) -> ParseResult<Self> {
        if let Some(header) = container.find(tags::TEXTURE_HEADER) {
            let payload = container.decode(header)?;
            let mut reader = ChunkReader::new(&payload, header.offset as u64);

            let width = reader.u32()?;
            let height = reader.u32()?;
            let mip_count = reader.u32()?;
            let (format, srgb) = PixelFormat::from_dxgi(reader.u32()?);
            let flags = reader.u32()?;
            reader.finish("texture header")?;

            validate_dimensions(width, height, mip_count, header.offset as u64)?;

            let entries = container.find_all(tags::TEXTURE_MIP);
            let payload_offset = entries.first().map(|e| e.offset as u64);
            if entries.len() != mip_count as usize {
                return Err(ParseError::corrupted(
                    header.offset as u64 + 8,
                    format!(
                        "header declares {mip_count} mips but {} mip chunks are present",
                        entries.len()
                    ),
                ));
            }

            let mut mips = Vec::with_capacity(entries.len());
            for (level, entry) in entries.into_iter().enumerate() {
                if entry.index as usize != level {
                    return Err(ParseError::corrupted(
                        entry.directory_position + 16,
                        format!("mip chain has a hole: expected level {level}, found {}", entry.index),
                    ));
                }

                let data = container.decode(entry)?;
                let (w, h) = mip_dimensions(width, height, level as u32);
                if let Some(expected) = format.surface_size(w, h) {
                    if data.len() != expected {
                        return Err(ParseError::corrupted(
                            entry.offset as u64,
                            format!(
                                "mip {level} ({w}x{h} {}) needs {expected} bytes, chunk holds {}",
                                format.name(),
                                data.len()
                            ),
                        ));
                    }
                }
                mips.push(data.to_vec());
            }

            tracing::trace!(
                name,
                width,
                height,
                format = %format.name(),
                "Parsed texture header"
            );

            return Ok(Self {
                name: name.to_string(),
                width,
                height,
                format,
                srgb,
                flags,
                mips,
                payload_offset,
            });
        }

        if let Some(entry) = container.find(tags::TEXTURE_DDS) {
            let payload = container.decode(entry)?;
            let surface = parse_dds(&payload, entry.offset as u64)?;
            validate_dimensions(
                surface.width,
                surface.height,
                surface.mips.len() as u32,
                entry.offset as u64,
            )?;

            return Ok(Self {
                name: name.to_string(),
                width: surface.width,
                height: surface.height,
                format: surface.format,
                srgb: surface.srgb,
                flags: 0,
                mips: surface.mips,
                payload_offset: Some(entry.offset as u64),
            });
        }

        Err(ParseError::MissingChunk {
            tag: tags::TEXTURE_HEADER.to_string(),
        })
    }

    pub fn mip_count(&self) -> usize {
        self.mips.len()
    }

    pub fn is_normal_map(&self) -> bool {
        self.flags & TEXTURE_FLAG_NORMAL_MAP != 0
    }

    pub fn summary(&self) -> TextureSummary {
        TextureSummary {
            width: self.width,
            height: self.height,
            format: self.format.name(),
            srgb: self.srgb,
            mip_count: self.mips.len(),
            normal_map: self.is_normal_map(),
        }
    }
}

fn validate_dimensions(width: u32, height: u32, mip_count: u32, offset: u64) -> ParseResult<()> {
    if width == 0 || height == 0 {
        return Err(ParseError::corrupted(
            offset,
            format!("texture has zero dimension {width}x{height}"),
        ));
    }
    if mip_count == 0 || mip_count > max_mip_count(width, height) {
        return Err(ParseError::corrupted(
            offset + 8,
            format!(
                "{mip_count} mips is outside 1..={} for {width}x{height}",
                max_mip_count(width, height)
            ),
        ));
    }
    Ok(())
}

/// Encode a `TXHD` payload
pub fn texture_header_payload(width: u32, height: u32, mip_count: u32, dxgi_format: u32, flags: u32) -> Vec<u8> {
    PayloadWriter::new()
        .u32(width)
        .u32(height)
        .u32(mip_count)
        .u32(dxgi_format)
        .u32(flags)
        .finish()
}
