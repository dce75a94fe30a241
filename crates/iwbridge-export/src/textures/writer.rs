//! DDS and PNG artifact encoding

use std::io::Cursor;

use ddsfile::{AlphaMode, D3D10ResourceDimension, Dds, DxgiFormat, NewDxgiParams};

use iwbridge_parsers::PixelFormat;

use crate::error::{ExportError, ExportResult};
use crate::textures::recode::RecodedTexture;

fn dxgi_format(format: PixelFormat, srgb: bool) -> ExportResult<DxgiFormat> {
    let dxgi = match (format, srgb) {
        (PixelFormat::Bc1, false) => DxgiFormat::BC1_UNorm,
        (PixelFormat::Bc1, true) => DxgiFormat::BC1_UNorm_sRGB,
        (PixelFormat::Bc2, false) => DxgiFormat::BC2_UNorm,
        (PixelFormat::Bc2, true) => DxgiFormat::BC2_UNorm_sRGB,
        (PixelFormat::Bc3, false) => DxgiFormat::BC3_UNorm,
        (PixelFormat::Bc3, true) => DxgiFormat::BC3_UNorm_sRGB,
        (PixelFormat::Bc4, _) => DxgiFormat::BC4_UNorm,
        (PixelFormat::Bc5, _) => DxgiFormat::BC5_UNorm,
        (PixelFormat::Rgba8, false) => DxgiFormat::R8G8B8A8_UNorm,
        (PixelFormat::Rgba8, true) => DxgiFormat::R8G8B8A8_UNorm_sRGB,
        (other, _) => return Err(ExportError::UnsupportedPixelFormat(other.name())),
    };
    Ok(dxgi)
}

/// Encode a recoded texture as a DDS file with a DX10 header
pub fn encode_dds(texture: &RecodedTexture) -> ExportResult<Vec<u8>> {
    let mut dds = Dds::new_dxgi(NewDxgiParams {
        height: texture.height,
        width: texture.width,
        depth: None,
        format: dxgi_format(texture.format, texture.srgb)?,
        mipmap_levels: Some(texture.mips.len() as u32),
        array_layers: None,
        caps2: None,
        is_cubemap: false,
        resource_dimension: D3D10ResourceDimension::Texture2D,
        alpha_mode: AlphaMode::Unknown,
    })
    .map_err(|e| ExportError::Dds(e.to_string()))?;

    dds.data = texture.mips.concat();

    let mut out = Vec::new();
    dds.write(&mut out).map_err(|e| ExportError::Dds(e.to_string()))?;
    Ok(out)
}

/// Encode the top mip preview as PNG
pub fn encode_png(texture: &RecodedTexture) -> ExportResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    texture
        .preview
        .write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use iwbridge_parsers::texture::parse_dds;

    fn recoded(format: PixelFormat) -> RecodedTexture {
        let top = RgbaImage::from_pixel(8, 8, image::Rgba([90, 60, 30, 255]));
        let small = RgbaImage::from_pixel(4, 4, image::Rgba([90, 60, 30, 255]));
        RecodedTexture {
            width: 8,
            height: 8,
            format,
            srgb: true,
            mips: vec![
                crate::textures::encode_surface(format, &top),
                crate::textures::encode_surface(format, &small),
            ],
            preview: top,
        }
    }

    #[test]
    fn test_dds_reads_back_through_parser() {
        let texture = recoded(PixelFormat::Bc1);
        let bytes = encode_dds(&texture).unwrap();

        let surface = parse_dds(&bytes, 0).unwrap();
        assert_eq!((surface.width, surface.height), (8, 8));
        assert_eq!(surface.format, PixelFormat::Bc1);
        assert!(surface.srgb);
        assert_eq!(surface.mips, texture.mips);
    }

    #[test]
    fn test_png_preview_signature() {
        let png = encode_png(&recoded(PixelFormat::Rgba8)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_bc7_target_rejected() {
        assert!(dxgi_format(PixelFormat::Bc7, false).is_err());
    }
}
