//! Embedded DDS surfaces
//!
//! Some texture containers carry a complete DDS file in a `DDSF` chunk
//! instead of a `TXHD` header plus per-mip chunks.

use super::format::{dxgi, mip_dimensions, PixelFormat};
use crate::container::ChunkReader;
use crate::traits::{ParseError, ParseResult};

/// DDS file magic
pub const DDS_MAGIC: &[u8; 4] = b"DDS ";

/// Caps2 flags
pub mod caps2 {
    pub const CUBEMAP: u32 = 0x200;
    pub const VOLUME: u32 = 0x20_0000;
}

/// DDS pixel format flags
pub mod pf_flags {
    pub const ALPHAPIXELS: u32 = 0x1;
    pub const ALPHA: u32 = 0x2;
    pub const FOURCC: u32 = 0x4;
    pub const RGB: u32 = 0x40;
    pub const LUMINANCE: u32 = 0x2_0000;
}

/// DDS header (124 bytes after the magic)
#[derive(Debug, Clone)]
pub struct DdsHeader {
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mipmap_count: u32,
    pub pixel_format: DdsPixelFormat,
    pub caps: u32,
    pub caps2: u32,
}

/// DDS pixel format (32 bytes)
#[derive(Debug, Clone)]
pub struct DdsPixelFormat {
    pub flags: u32,
    pub fourcc: [u8; 4],
    pub rgb_bit_count: u32,
    pub r_bit_mask: u32,
    pub g_bit_mask: u32,
    pub b_bit_mask: u32,
    pub a_bit_mask: u32,
}

/// DX10 extended header
#[derive(Debug, Clone)]
pub struct Dx10Header {
    pub dxgi_format: u32,
    pub resource_dimension: u32,
    pub misc_flag: u32,
    pub array_size: u32,
}

/// A DDS surface split into mip levels
#[derive(Debug, Clone)]
pub struct DdsSurface {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub srgb: bool,
    pub mips: Vec<Vec<u8>>,
}

impl DdsHeader {
    fn parse(reader: &mut ChunkReader<'_>) -> ParseResult<Self> {
        let at = reader.position();
        let size = reader.u32()?;
        if size != 124 {
            return Err(ParseError::corrupted(
                at,
                format!("Invalid DDS header size: expected 124, got {size}"),
            ));
        }

        let flags = reader.u32()?;
        let height = reader.u32()?;
        let width = reader.u32()?;
        let pitch_or_linear_size = reader.u32()?;
        let depth = reader.u32()?;
        let mipmap_count = reader.u32()?;
        reader.bytes(11 * 4)?; // reserved1

        let pf_at = reader.position();
        let pf_size = reader.u32()?;
        if pf_size != 32 {
            return Err(ParseError::corrupted(
                pf_at,
                format!("Invalid DDS pixel format size: expected 32, got {pf_size}"),
            ));
        }
        let pf_flags = reader.u32()?;
        let fourcc_raw = reader.bytes(4)?;
        let pixel_format = DdsPixelFormat {
            flags: pf_flags,
            fourcc: [fourcc_raw[0], fourcc_raw[1], fourcc_raw[2], fourcc_raw[3]],
            rgb_bit_count: reader.u32()?,
            r_bit_mask: reader.u32()?,
            g_bit_mask: reader.u32()?,
            b_bit_mask: reader.u32()?,
            a_bit_mask: reader.u32()?,
        };

        let caps = reader.u32()?;
        let caps2 = reader.u32()?;
        reader.bytes(3 * 4)?; // caps3, caps4, reserved2

        Ok(Self {
            flags,
            height,
            width,
            pitch_or_linear_size,
            depth,
            mipmap_count,
            pixel_format,
            caps,
            caps2,
        })
    }

    /// Check if this DDS has a DX10 extended header
    pub fn has_dx10_header(&self) -> bool {
        self.pixel_format.flags & pf_flags::FOURCC != 0 && self.pixel_format.fourcc == *b"DX10"
    }
}

impl Dx10Header {
    fn parse(reader: &mut ChunkReader<'_>) -> ParseResult<Self> {
        let header = Self {
            dxgi_format: reader.u32()?,
            resource_dimension: reader.u32()?,
            misc_flag: reader.u32()?,
            array_size: reader.u32()?,
        };
        reader.u32()?; // misc_flags2
        Ok(header)
    }
}

impl DdsPixelFormat {
    /// Detect the pixel format from legacy FourCC / masks
    fn detect(&self) -> (PixelFormat, bool) {
        if self.flags & pf_flags::FOURCC != 0 {
            let format = match &self.fourcc {
                b"DXT1" => PixelFormat::Bc1,
                b"DXT2" | b"DXT3" => PixelFormat::Bc2,
                b"DXT4" | b"DXT5" => PixelFormat::Bc3,
                b"ATI1" | b"BC4U" => PixelFormat::Bc4,
                b"ATI2" | b"BC5U" => PixelFormat::Bc5,
                _ => PixelFormat::Unknown(u32::from_le_bytes(self.fourcc)),
            };
            return (format, false);
        }

        if self.flags & pf_flags::RGB != 0 && self.rgb_bit_count == 32 {
            return if self.r_bit_mask == 0x0000_00FF {
                PixelFormat::from_dxgi(dxgi::R8G8B8A8_UNORM)
            } else {
                PixelFormat::from_dxgi(dxgi::B8G8R8A8_UNORM)
            };
        }

        if self.flags & (pf_flags::LUMINANCE | pf_flags::ALPHA) != 0 && self.rgb_bit_count == 8 {
            return (PixelFormat::R8, false);
        }

        (PixelFormat::Unknown(0), false)
    }
}

/// Parse a DDS file located at `base` in its container
pub fn parse_dds(data: &[u8], base: u64) -> ParseResult<DdsSurface> {
    let mut reader = ChunkReader::new(data, base);

    let magic = reader.bytes(4)?;
    if magic != DDS_MAGIC {
        return Err(ParseError::InvalidMagic {
            expected: DDS_MAGIC.to_vec(),
            found: magic.to_vec(),
        });
    }

    let header = DdsHeader::parse(&mut reader)?;
    let (format, srgb) = if header.has_dx10_header() {
        let dx10 = Dx10Header::parse(&mut reader)?;
        if dx10.array_size > 1 {
            return Err(ParseError::UnsupportedFeature(format!(
                "DDS texture arrays ({} layers)",
                dx10.array_size
            )));
        }
        PixelFormat::from_dxgi(dx10.dxgi_format)
    } else {
        header.pixel_format.detect()
    };

    if header.caps2 & (caps2::CUBEMAP | caps2::VOLUME) != 0 {
        return Err(ParseError::UnsupportedFeature(
            "DDS cubemaps and volume textures".to_string(),
        ));
    }
    if header.width == 0 || header.height == 0 {
        return Err(ParseError::corrupted(
            base + 12,
            format!("DDS has zero dimension {}x{}", header.width, header.height),
        ));
    }

    let mip_count = header.mipmap_count.max(1);
    let mut mips = Vec::with_capacity(mip_count as usize);

    if format.surface_size(1, 1).is_none() {
        // Unknown layout: keep the payload as one opaque level
        let rest = reader.remaining();
        mips.push(reader.bytes(rest)?.to_vec());
    } else {
        for level in 0..mip_count {
            let (w, h) = mip_dimensions(header.width, header.height, level);
            let size = format.surface_size(w, h).unwrap_or(0);
            mips.push(reader.bytes(size)?.to_vec());
        }
    }

    Ok(DdsSurface {
        width: header.width,
        height: header.height,
        format,
        srgb,
        mips,
    })
}

/// Serialise a minimal DX10 DDS file (fixtures and re-embedding)
pub fn write_dds(width: u32, height: u32, format: PixelFormat, srgb: bool, mips: &[Vec<u8>]) -> Vec<u8> {
    use crate::container::PayloadWriter;

    let mut w = PayloadWriter::new();
    w.bytes(DDS_MAGIC)
        .u32(124)
        .u32(0x1 | 0x2 | 0x4 | 0x1000 | 0x2_0000)
        .u32(height)
        .u32(width)
        .u32(mips.first().map(|m| m.len() as u32).unwrap_or(0))
        .u32(1)
        .u32(mips.len() as u32);
    for _ in 0..11 {
        w.u32(0);
    }
    w.u32(32)
        .u32(pf_flags::FOURCC)
        .bytes(b"DX10")
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(0x1000 | if mips.len() > 1 { 0x40_0008 } else { 0 })
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(0);
    w.u32(format.to_dxgi(srgb)).u32(3).u32(0).u32(1).u32(0);
    for mip in mips {
        w.bytes(mip);
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dx10_roundtrip() {
        let mips = vec![vec![1u8; 32], vec![2u8; 8], vec![3u8; 8]];
        let file = write_dds(8, 4, PixelFormat::Bc1, true, &mips);

        let surface = parse_dds(&file, 0).unwrap();
        assert_eq!((surface.width, surface.height), (8, 4));
        assert_eq!(surface.format, PixelFormat::Bc1);
        assert!(surface.srgb);
        assert_eq!(surface.mips, mips);
    }

    #[test]
    fn test_truncated_mip_is_corrupted() {
        let mips = vec![vec![1u8; 32]];
        let mut file = write_dds(8, 4, PixelFormat::Bc1, false, &mips);
        file.truncate(file.len() - 4);
        assert!(matches!(
            parse_dds(&file, 100),
            Err(ParseError::CorruptedData { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            parse_dds(b"PNG\0aaaaaaaa", 0),
            Err(ParseError::InvalidMagic { .. })
        ));
    }
}
