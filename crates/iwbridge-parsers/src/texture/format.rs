//! Source pixel formats

use serde::Serialize;

/// DXGI format codes understood by the texture path
pub mod dxgi {
    pub const R16G16B16A16_FLOAT: u32 = 10;
    pub const R8G8B8A8_UNORM: u32 = 28;
    pub const R8G8B8A8_UNORM_SRGB: u32 = 29;
    pub const R8_UNORM: u32 = 61;
    pub const A8_UNORM: u32 = 65;
    pub const BC1_UNORM: u32 = 71;
    pub const BC1_UNORM_SRGB: u32 = 72;
    pub const BC2_UNORM: u32 = 74;
    pub const BC2_UNORM_SRGB: u32 = 75;
    pub const BC3_UNORM: u32 = 77;
    pub const BC3_UNORM_SRGB: u32 = 78;
    pub const BC4_UNORM: u32 = 80;
    pub const BC4_SNORM: u32 = 81;
    pub const BC5_UNORM: u32 = 83;
    pub const BC5_SNORM: u32 = 84;
    pub const B8G8R8A8_UNORM: u32 = 87;
    pub const B8G8R8A8_UNORM_SRGB: u32 = 91;
    pub const BC6H_UF16: u32 = 95;
    pub const BC6H_SF16: u32 = 96;
    pub const BC7_UNORM: u32 = 98;
    pub const BC7_UNORM_SRGB: u32 = 99;
}

/// Pixel layout of a source texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelFormat {
    /// Block Compressed 1 (DXT1)
    Bc1,
    /// Block Compressed 2 (DXT3)
    Bc2,
    /// Block Compressed 3 (DXT5)
    Bc3,
    /// Block Compressed 4 (single channel)
    Bc4,
    /// Block Compressed 5 (two channels)
    Bc5,
    /// Block Compressed 6 (HDR)
    Bc6h,
    /// Block Compressed 7
    Bc7,
    Rgba8,
    Bgra8,
    /// Single 8-bit channel (R8 or A8)
    R8,
    /// Four half-float channels
    Rgba16f,
    /// Any other DXGI code
    Unknown(u32),
}

impl PixelFormat {
    /// Map a DXGI code to a format and its sRGB flag
    pub fn from_dxgi(code: u32) -> (Self, bool) {
        use dxgi::*;

        match code {
            BC1_UNORM => (PixelFormat::Bc1, false),
            BC1_UNORM_SRGB => (PixelFormat::Bc1, true),
            BC2_UNORM => (PixelFormat::Bc2, false),
            BC2_UNORM_SRGB => (PixelFormat::Bc2, true),
            BC3_UNORM => (PixelFormat::Bc3, false),
            BC3_UNORM_SRGB => (PixelFormat::Bc3, true),
            BC4_UNORM | BC4_SNORM => (PixelFormat::Bc4, false),
            BC5_UNORM | BC5_SNORM => (PixelFormat::Bc5, false),
            BC6H_UF16 | BC6H_SF16 => (PixelFormat::Bc6h, false),
            BC7_UNORM => (PixelFormat::Bc7, false),
            BC7_UNORM_SRGB => (PixelFormat::Bc7, true),
            R8G8B8A8_UNORM => (PixelFormat::Rgba8, false),
            R8G8B8A8_UNORM_SRGB => (PixelFormat::Rgba8, true),
            B8G8R8A8_UNORM => (PixelFormat::Bgra8, false),
            B8G8R8A8_UNORM_SRGB => (PixelFormat::Bgra8, true),
            R8_UNORM | A8_UNORM => (PixelFormat::R8, false),
            R16G16B16A16_FLOAT => (PixelFormat::Rgba16f, false),
            other => (PixelFormat::Unknown(other), false),
        }
    }

    /// DXGI code for this format
    pub fn to_dxgi(self, srgb: bool) -> u32 {
        use dxgi::*;

        match (self, srgb) {
            (PixelFormat::Bc1, false) => BC1_UNORM,
            (PixelFormat::Bc1, true) => BC1_UNORM_SRGB,
            (PixelFormat::Bc2, false) => BC2_UNORM,
            (PixelFormat::Bc2, true) => BC2_UNORM_SRGB,
            (PixelFormat::Bc3, false) => BC3_UNORM,
            (PixelFormat::Bc3, true) => BC3_UNORM_SRGB,
            (PixelFormat::Bc4, _) => BC4_UNORM,
            (PixelFormat::Bc5, _) => BC5_UNORM,
            (PixelFormat::Bc6h, _) => BC6H_UF16,
            (PixelFormat::Bc7, false) => BC7_UNORM,
            (PixelFormat::Bc7, true) => BC7_UNORM_SRGB,
            (PixelFormat::Rgba8, false) => R8G8B8A8_UNORM,
            (PixelFormat::Rgba8, true) => R8G8B8A8_UNORM_SRGB,
            (PixelFormat::Bgra8, false) => B8G8R8A8_UNORM,
            (PixelFormat::Bgra8, true) => B8G8R8A8_UNORM_SRGB,
            (PixelFormat::R8, _) => R8_UNORM,
            (PixelFormat::Rgba16f, _) => R16G16B16A16_FLOAT,
            (PixelFormat::Unknown(code), _) => code,
        }
    }

    /// Get block size for compressed formats
    pub fn block_size(self) -> Option<usize> {
        match self {
            PixelFormat::Bc1 | PixelFormat::Bc4 => Some(8),
            PixelFormat::Bc2
            | PixelFormat::Bc3
            | PixelFormat::Bc5
            | PixelFormat::Bc6h
            | PixelFormat::Bc7 => Some(16),
            _ => None,
        }
    }

    /// Bytes per pixel for uncompressed formats
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(4),
            PixelFormat::R8 => Some(1),
            PixelFormat::Rgba16f => Some(8),
            _ => None,
        }
    }

    /// Number of meaningful colour channels
    pub fn channel_count(self) -> u8 {
        match self {
            PixelFormat::Bc4 | PixelFormat::R8 => 1,
            PixelFormat::Bc5 => 2,
            PixelFormat::Bc6h => 3,
            _ => 4,
        }
    }

    /// Byte size of one surface of `width` x `height`, if the layout is known
    pub fn surface_size(self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width.max(1) as usize, height.max(1) as usize);
        if let Some(block) = self.block_size() {
            let blocks_x = w.div_ceil(4);
            let blocks_y = h.div_ceil(4);
            return Some(blocks_x * blocks_y * block);
        }
        self.bytes_per_pixel().map(|bpp| w * h * bpp)
    }

    /// Short name for display
    pub fn name(self) -> String {
        match self {
            PixelFormat::Bc1 => "BC1".into(),
            PixelFormat::Bc2 => "BC2".into(),
            PixelFormat::Bc3 => "BC3".into(),
            PixelFormat::Bc4 => "BC4".into(),
            PixelFormat::Bc5 => "BC5".into(),
            PixelFormat::Bc6h => "BC6H".into(),
            PixelFormat::Bc7 => "BC7".into(),
            PixelFormat::Rgba8 => "RGBA8".into(),
            PixelFormat::Bgra8 => "BGRA8".into(),
            PixelFormat::R8 => "R8".into(),
            PixelFormat::Rgba16f => "RGBA16F".into(),
            PixelFormat::Unknown(code) => format!("DXGI({code})"),
        }
    }
}

/// Dimensions of mip `level` for a top level of `width` x `height`
pub fn mip_dimensions(width: u32, height: u32, level: u32) -> (u32, u32) {
    let w = width.checked_shr(level).unwrap_or(0).max(1);
    let h = height.checked_shr(level).unwrap_or(0).max(1);
    (w, h)
}

/// Longest mip chain for `width` x `height`
pub fn max_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}
