//! Re-encoding decoded mips into the target compression mode

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use iwbridge_parsers::texture::mip_dimensions;
use iwbridge_parsers::{PixelFormat, TextureRecord};

use crate::error::{ExportError, ExportResult};
use crate::textures::decompressor::{decode_rgba, has_alpha};

/// Compression mode of the recoded texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Bc1,
    Bc3,
    Bc4,
    Bc5,
    Rgba8,
    /// Chosen from the source channel count and alpha usage
    #[default]
    Auto,
}

impl TargetFormat {
    /// Concrete pixel format written for this mode (`None` for `Auto`)
    pub fn pixel_format(self) -> Option<PixelFormat> {
        match self {
            TargetFormat::Bc1 => Some(PixelFormat::Bc1),
            TargetFormat::Bc3 => Some(PixelFormat::Bc3),
            TargetFormat::Bc4 => Some(PixelFormat::Bc4),
            TargetFormat::Bc5 => Some(PixelFormat::Bc5),
            TargetFormat::Rgba8 => Some(PixelFormat::Rgba8),
            TargetFormat::Auto => None,
        }
    }

    /// Pick the concrete mode for a source
    pub fn resolve(self, source: PixelFormat, source_has_alpha: bool) -> TargetFormat {
        if self != TargetFormat::Auto {
            return self;
        }
        match source.channel_count() {
            1 => TargetFormat::Bc4,
            2 => TargetFormat::Bc5,
            _ if source_has_alpha => TargetFormat::Bc3,
            _ => TargetFormat::Bc1,
        }
    }
}

/// Maximum per-channel absolute error for a solid 4x4 block
pub fn quantisation_tolerance(format: PixelFormat) -> u8 {
    match format {
        PixelFormat::Bc1 | PixelFormat::Bc2 | PixelFormat::Bc3 => 8,
        PixelFormat::Bc4 | PixelFormat::Bc5 => 4,
        _ => 0,
    }
}

/// Texture conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    pub target: TargetFormat,
    /// Flip every mip vertically
    pub flip_y: bool,
    /// Invert the green channel of normal maps (DirectX to OpenGL)
    pub flip_normal_green: bool,
    /// Also write a PNG of the top mip next to the DDS
    pub png_preview: bool,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            target: TargetFormat::Auto,
            flip_y: false,
            flip_normal_green: false,
            png_preview: false,
        }
    }
}

/// Output of the recoder, one block per source mip, largest first
#[derive(Debug, Clone, PartialEq)]
pub struct RecodedTexture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub srgb: bool,
    pub mips: Vec<Vec<u8>>,
    /// Top mip as RGBA8 after transforms, kept for previews
    pub preview: RgbaImage,
}

/// Decode every mip of `texture` and re-encode it per `settings`
///
/// Mips are processed in parallel and reassembled in source order.
#[instrument(skip_all, fields(texture = %texture.name, source = %texture.format.name()))]
pub fn recode(texture: &TextureRecord, settings: &TextureSettings) -> ExportResult<RecodedTexture> {
    if texture.mips.is_empty() {
        return Err(ExportError::DecompressionFailed(format!(
            "texture '{}' has no mips",
            texture.name
        )));
    }

    let flip_green = settings.flip_normal_green && texture.is_normal_map();
    let decoded: Vec<RgbaImage> = texture
        .mips
        .par_iter()
        .enumerate()
        .map(|(level, data)| {
            let (w, h) = mip_dimensions(texture.width, texture.height, level as u32);
            let rgba = decode_rgba(texture.format, data, w, h)?;
            let mut image = RgbaImage::from_raw(w, h, rgba).ok_or_else(|| {
                ExportError::DecompressionFailed(format!("mip {level} does not fill {w}x{h}"))
            })?;
            if settings.flip_y {
                image::imageops::flip_vertical_in_place(&mut image);
            }
            if flip_green {
                for pixel in image.pixels_mut() {
                    pixel[1] = 255 - pixel[1];
                }
            }
            Ok(image)
        })
        .collect::<ExportResult<_>>()?;

    let alpha = decoded.first().is_some_and(|top| has_alpha(top.as_raw()));
    let target = settings.target.resolve(texture.format, alpha);
    let format = target
        .pixel_format()
        .ok_or_else(|| ExportError::UnsupportedPixelFormat("auto".into()))?;
    let srgb = texture.srgb && !matches!(format, PixelFormat::Bc4 | PixelFormat::Bc5);

    debug!(target_format = %format.name(), mips = decoded.len(), "Recoding texture");

    let mips = decoded
        .par_iter()
        .map(|image| encode_surface(format, image))
        .collect::<Vec<_>>();

    let preview = decoded
        .into_iter()
        .next()
        .ok_or_else(|| ExportError::DecompressionFailed("no decoded mips".into()))?;
    Ok(RecodedTexture {
        width: texture.width,
        height: texture.height,
        format,
        srgb,
        mips,
        preview,
    })
}

/// Encode one RGBA8 surface in `format`
pub fn encode_surface(format: PixelFormat, image: &RgbaImage) -> Vec<u8> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let block_format = match format {
        PixelFormat::Bc1 => texpresso::Format::Bc1,
        PixelFormat::Bc2 => texpresso::Format::Bc2,
        PixelFormat::Bc3 => texpresso::Format::Bc3,
        PixelFormat::Bc4 => texpresso::Format::Bc4,
        PixelFormat::Bc5 => texpresso::Format::Bc5,
        _ => return image.as_raw().clone(),
    };

    let mut output = vec![0u8; block_format.compressed_size(w, h)];
    let params = texpresso::Params {
        algorithm: texpresso::Algorithm::ClusterFit,
        ..texpresso::Params::default()
    };
    block_format.compress(image.as_raw(), w, h, params, &mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(format: PixelFormat, rgba: [u8; 4], size: u32) -> TextureRecord {
        let image = RgbaImage::from_pixel(size, size, image::Rgba(rgba));
        TextureRecord {
            payload_offset: None,
            name: "solid".into(),
            width: size,
            height: size,
            format,
            srgb: false,
            flags: 0,
            mips: vec![encode_surface(format, &image)],
        }
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(TargetFormat::Auto.resolve(PixelFormat::Bc4, false), TargetFormat::Bc4);
        assert_eq!(TargetFormat::Auto.resolve(PixelFormat::R8, false), TargetFormat::Bc4);
        assert_eq!(TargetFormat::Auto.resolve(PixelFormat::Bc5, false), TargetFormat::Bc5);
        assert_eq!(TargetFormat::Auto.resolve(PixelFormat::Rgba8, true), TargetFormat::Bc3);
        assert_eq!(TargetFormat::Auto.resolve(PixelFormat::Rgba8, false), TargetFormat::Bc1);
        assert_eq!(TargetFormat::Rgba8.resolve(PixelFormat::Bc1, true), TargetFormat::Rgba8);
    }

    #[test]
    fn test_auto_picks_bc3_for_alpha() {
        let record = solid(PixelFormat::Rgba8, [200, 100, 50, 128], 4);
        let out = recode(&record, &TextureSettings::default()).unwrap();
        assert_eq!(out.format, PixelFormat::Bc3);
        assert_eq!(out.mips[0].len(), 16);
    }

    #[test]
    fn test_preserves_mip_order_and_dimensions() {
        let mut record = solid(PixelFormat::Rgba8, [10, 20, 30, 255], 16);
        for level in 1..5u32 {
            let (w, h) = mip_dimensions(16, 16, level);
            let shade = (level * 40) as u8;
            let image = RgbaImage::from_pixel(w, h, image::Rgba([shade, shade, shade, 255]));
            record.mips.push(image.into_raw());
        }
        let settings = TextureSettings {
            target: TargetFormat::Rgba8,
            ..TextureSettings::default()
        };

        let out = recode(&record, &settings).unwrap();
        assert_eq!((out.width, out.height), (16, 16));
        assert_eq!(out.mips.len(), 5);
        for (level, mip) in out.mips.iter().enumerate() {
            let (w, h) = mip_dimensions(16, 16, level as u32);
            assert_eq!(mip.len(), (w * h * 4) as usize);
        }
        assert_eq!(out.mips[2][0], 80);
    }

    #[test]
    fn test_unsupported_source() {
        let record = TextureRecord {
            payload_offset: None,
            name: "hdr".into(),
            width: 4,
            height: 4,
            format: PixelFormat::Bc6h,
            srgb: false,
            flags: 0,
            mips: vec![vec![0u8; 16]],
        };
        assert!(matches!(
            recode(&record, &TextureSettings::default()),
            Err(ExportError::UnsupportedPixelFormat(_))
        ));
    }

    #[test]
    fn test_normal_green_flip_only_for_normal_maps() {
        let mut record = solid(PixelFormat::Rgba8, [128, 200, 255, 255], 4);
        let settings = TextureSettings {
            target: TargetFormat::Rgba8,
            flip_normal_green: true,
            ..TextureSettings::default()
        };
        assert_eq!(recode(&record, &settings).unwrap().mips[0][1], 200);

        record.flags = iwbridge_parsers::texture::TEXTURE_FLAG_NORMAL_MAP;
        assert_eq!(recode(&record, &settings).unwrap().mips[0][1], 55);
    }

    #[test]
    fn test_flip_y() {
        let mut image = RgbaImage::new(1, 2);
        image.put_pixel(0, 0, image::Rgba([1, 1, 1, 255]));
        image.put_pixel(0, 1, image::Rgba([2, 2, 2, 255]));
        let record = TextureRecord {
            payload_offset: None,
            name: "strip".into(),
            width: 1,
            height: 2,
            format: PixelFormat::Rgba8,
            srgb: true,
            flags: 0,
            mips: vec![image.into_raw()],
        };
        let settings = TextureSettings {
            target: TargetFormat::Rgba8,
            flip_y: true,
            ..TextureSettings::default()
        };
        let out = recode(&record, &settings).unwrap();
        assert_eq!(out.mips[0][0], 2);
        assert!(out.srgb);
    }
}
