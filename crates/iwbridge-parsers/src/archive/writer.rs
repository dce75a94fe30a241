//! Pack archive writer (no ZIP64, no encryption)

use super::{CD_SIGNATURE, EOCD_SIGNATURE, LOCAL_HEADER_SIGNATURE};
use crate::compression::{self, Codec};
use crate::container::PayloadWriter;
use crate::traits::{ParseError, ParseResult};

struct Written {
    path: String,
    method: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
}

/// Builds a pack archive in memory
#[derive(Default)]
pub struct PackWriter {
    out: PayloadWriter,
    written: Vec<Written>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file compressed with `codec`
    pub fn add(&mut self, path: &str, data: &[u8], codec: Codec) -> ParseResult<&mut Self> {
        let packed = compression::compress(data, codec)?;
        let too_large = |what: &str| {
            ParseError::UnsupportedFeature(format!("{what} of '{path}' needs ZIP64"))
        };

        let entry = Written {
            path: path.to_string(),
            method: codec.zip_method(),
            crc32: compression::crc32(data),
            compressed_size: u32::try_from(packed.len()).map_err(|_| too_large("compressed size"))?,
            uncompressed_size: u32::try_from(data.len()).map_err(|_| too_large("size"))?,
            local_header_offset: u32::try_from(self.out.len()).map_err(|_| too_large("offset"))?,
        };

        self.out
            .u32(LOCAL_HEADER_SIGNATURE)
            .u16(20)
            .u16(0)
            .u16(entry.method)
            .u16(0)
            .u16(0x21)
            .u32(entry.crc32)
            .u32(entry.compressed_size)
            .u32(entry.uncompressed_size)
            .u16(path.len() as u16)
            .u16(0)
            .bytes(path.as_bytes())
            .bytes(&packed);

        self.written.push(entry);
        Ok(self)
    }

    /// Write the central directory and return the archive bytes
    pub fn finish(mut self) -> Vec<u8> {
        let cd_offset = self.out.len() as u32;
        for entry in &self.written {
            self.out
                .u32(CD_SIGNATURE)
                .u16(20)
                .u16(20)
                .u16(0)
                .u16(entry.method)
                .u16(0)
                .u16(0x21)
                .u32(entry.crc32)
                .u32(entry.compressed_size)
                .u32(entry.uncompressed_size)
                .u16(entry.path.len() as u16)
                .u16(0)
                .u16(0)
                .u16(0)
                .u16(0)
                .u32(0)
                .u32(entry.local_header_offset)
                .bytes(entry.path.as_bytes());
        }
        let cd_size = self.out.len() as u32 - cd_offset;
        let count = self.written.len() as u16;

        self.out
            .u32(EOCD_SIGNATURE)
            .u16(0)
            .u16(0)
            .u16(count)
            .u16(count)
            .u32(cd_size)
            .u32(cd_offset)
            .u16(0);
        self.out.finish()
    }
}
