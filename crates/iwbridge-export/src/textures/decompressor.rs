//! Source texture decoding
//!
//! Decodes every supported source layout into tightly packed RGBA8. Block
//! formats go through texpresso; BC6H and BC7 have no decode path.

use half::f16;

use iwbridge_parsers::PixelFormat;

use crate::error::{ExportError, ExportResult};

/// Decode one mip surface to RGBA8
///
/// Single channel sources are replicated into RGB, two channel sources fill
/// RG; alpha is opaque unless the source carries it.
pub fn decode_rgba(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
) -> ExportResult<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(ExportError::InvalidDimensions { width, height });
    }

    let expected = format
        .surface_size(width, height)
        .ok_or_else(|| ExportError::UnsupportedPixelFormat(format.name()))?;
    if data.len() != expected {
        return Err(ExportError::DecompressionFailed(format!(
            "{} surface {width}x{height}: expected {expected} bytes, got {}",
            format.name(),
            data.len()
        )));
    }

    let pixel_count = width as usize * height as usize;
    let mut output = vec![0u8; pixel_count * 4];

    match format {
        PixelFormat::Bc1 => decompress_block(texpresso::Format::Bc1, data, width, height, &mut output),
        PixelFormat::Bc2 => decompress_block(texpresso::Format::Bc2, data, width, height, &mut output),
        PixelFormat::Bc3 => decompress_block(texpresso::Format::Bc3, data, width, height, &mut output),
        PixelFormat::Bc4 => {
            decompress_block(texpresso::Format::Bc4, data, width, height, &mut output);
            for pixel in output.chunks_exact_mut(4) {
                let r = pixel[0];
                pixel.copy_from_slice(&[r, r, r, 255]);
            }
        }
        PixelFormat::Bc5 => {
            decompress_block(texpresso::Format::Bc5, data, width, height, &mut output);
            for pixel in output.chunks_exact_mut(4) {
                pixel[2] = 0;
                pixel[3] = 255;
            }
        }
        PixelFormat::Rgba8 => output.copy_from_slice(data),
        PixelFormat::Bgra8 => {
            for (dst, src) in output.chunks_exact_mut(4).zip(data.chunks_exact(4)) {
                dst[0] = src[2]; // R <- B
                dst[1] = src[1];
                dst[2] = src[0]; // B <- R
                dst[3] = src[3];
            }
        }
        PixelFormat::R8 => {
            for (dst, &v) in output.chunks_exact_mut(4).zip(data) {
                dst.copy_from_slice(&[v, v, v, 255]);
            }
        }
        PixelFormat::Rgba16f => {
            for (dst, src) in output.iter_mut().zip(data.chunks_exact(2)) {
                let value = f16::from_le_bytes([src[0], src[1]]).to_f32();
                *dst = unorm8(value);
            }
        }
        PixelFormat::Bc6h | PixelFormat::Bc7 | PixelFormat::Unknown(_) => {
            return Err(ExportError::UnsupportedPixelFormat(format.name()));
        }
    }

    Ok(output)
}

fn decompress_block(
    format: texpresso::Format,
    data: &[u8],
    width: u32,
    height: u32,
    output: &mut [u8],
) {
    format.decompress(data, width as usize, height as usize, output);
}

/// Clamp a linear float to an 8-bit unorm
fn unorm8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Whether any decoded pixel is not fully opaque
pub fn has_alpha(rgba: &[u8]) -> bool {
    rgba.chunks_exact(4).any(|p| p[3] != 255)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_swizzle() {
        let data = [10u8, 20, 30, 40];
        let rgba = decode_rgba(PixelFormat::Bgra8, &data, 1, 1).unwrap();
        assert_eq!(rgba, vec![30, 20, 10, 40]);
    }

    #[test]
    fn test_r8_replicates() {
        let rgba = decode_rgba(PixelFormat::R8, &[7, 9], 2, 1).unwrap();
        assert_eq!(rgba, vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn test_half_float_clamps() {
        let mut data = Vec::new();
        for v in [0.0f32, 0.5, 1.0, 4.0] {
            data.extend_from_slice(&f16::from_f32(v).to_le_bytes());
        }
        let rgba = decode_rgba(PixelFormat::Rgba16f, &data, 1, 1).unwrap();
        assert_eq!(rgba, vec![0, 128, 255, 255]);
    }

    #[test]
    fn test_bc7_has_no_decode_path() {
        let err = decode_rgba(PixelFormat::Bc7, &[0u8; 16], 4, 4).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedPixelFormat(ref f) if f == "BC7"));
    }

    #[test]
    fn test_size_mismatch() {
        assert!(matches!(
            decode_rgba(PixelFormat::Rgba8, &[0u8; 15], 2, 2),
            Err(ExportError::DecompressionFailed(_))
        ));
        assert!(matches!(
            decode_rgba(PixelFormat::Rgba8, &[], 0, 2),
            Err(ExportError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_alpha_detection() {
        assert!(!has_alpha(&[1, 2, 3, 255]));
        assert!(has_alpha(&[1, 2, 3, 255, 0, 0, 0, 254]));
    }
}
