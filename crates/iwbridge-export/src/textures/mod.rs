//! Texture decoding and re-encoding
//!
//! Decodes source mips to RGBA8, re-encodes them in the target block format
//! and writes DDS (plus an optional PNG preview).

mod decompressor;
mod recode;
mod writer;

pub use decompressor::{decode_rgba, has_alpha};
pub use recode::{
    encode_surface, quantisation_tolerance, recode, RecodedTexture, TargetFormat, TextureSettings,
};
pub use writer::{encode_dds, encode_png};
