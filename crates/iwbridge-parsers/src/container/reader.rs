//! Bounds-checked little-endian reader over a chunk payload.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::traits::{ParseError, ParseResult};

/// Sequential reader whose errors carry absolute container offsets
pub struct ChunkReader<'a> {
    cursor: Cursor<&'a [u8]>,
    base: u64,
}

impl<'a> ChunkReader<'a> {
    /// Read `data`, which starts at absolute offset `base`
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self {
            cursor: Cursor::new(data),
            base,
        }
    }

    /// Absolute offset of the next byte
    pub fn position(&self) -> u64 {
        self.base + self.cursor.position()
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn need(&self, what: &str, bytes: usize) -> ParseResult<()> {
        if self.remaining() < bytes {
            return Err(ParseError::corrupted(
                self.position(),
                format!(
                    "truncated {what}: need {bytes} bytes, {} remain",
                    self.remaining()
                ),
            ));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> ParseResult<u8> {
        self.need("u8", 1)?;
        Ok(self.cursor.read_u8()?)
    }

    pub fn u16(&mut self) -> ParseResult<u16> {
        self.need("u16", 2)?;
        Ok(self.cursor.read_u16::<LittleEndian>()?)
    }

    pub fn u32(&mut self) -> ParseResult<u32> {
        self.need("u32", 4)?;
        Ok(self.cursor.read_u32::<LittleEndian>()?)
    }

    pub fn i32(&mut self) -> ParseResult<i32> {
        self.need("i32", 4)?;
        Ok(self.cursor.read_i32::<LittleEndian>()?)
    }

    pub fn u64(&mut self) -> ParseResult<u64> {
        self.need("u64", 8)?;
        Ok(self.cursor.read_u64::<LittleEndian>()?)
    }

    pub fn f32(&mut self) -> ParseResult<f32> {
        self.need("f32", 4)?;
        Ok(self.cursor.read_f32::<LittleEndian>()?)
    }

    /// Fixed-size array of f32 (vectors, quaternions)
    pub fn f32_array<const N: usize>(&mut self) -> ParseResult<[f32; N]> {
        self.need("f32 array", N * 4)?;
        let mut out = [0.0f32; N];
        self.cursor.read_f32_into::<LittleEndian>(&mut out)?;
        Ok(out)
    }

    /// Borrow the next `len` bytes
    pub fn bytes(&mut self, len: usize) -> ParseResult<&'a [u8]> {
        self.need("byte run", len)?;
        let start = self.cursor.position() as usize;
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + len) as u64);
        Ok(&data[start..start + len])
    }

    /// Length-prefixed (u16) UTF-8 string
    pub fn string(&mut self) -> ParseResult<String> {
        let at = self.position();
        let len = self.u16()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| ParseError::corrupted(at, format!("invalid UTF-8 string: {e}")))
    }

    /// Element count that must fit in the remaining payload at `element_size` bytes each
    pub fn count(&mut self, element_size: usize) -> ParseResult<usize> {
        let at = self.position();
        let count = self.u32()? as usize;
        if count.saturating_mul(element_size) > self.remaining() {
            return Err(ParseError::corrupted(
                at,
                format!(
                    "count {count} needs at least {} bytes, {} remain",
                    count.saturating_mul(element_size),
                    self.remaining()
                ),
            ));
        }
        Ok(count)
    }

    /// Fail unless the payload was consumed exactly
    pub fn finish(&self, what: &str) -> ParseResult<()> {
        if !self.is_empty() {
            return Err(ParseError::corrupted(
                self.position(),
                format!("{} trailing bytes after {what}", self.remaining()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x3F];
        let mut reader = ChunkReader::new(&data, 100);

        assert_eq!(reader.u16().unwrap(), 1);
        assert_eq!(reader.u32().unwrap(), 2);
        assert_eq!(reader.position(), 106);
        assert_eq!(reader.f32().unwrap(), 1.0);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncation_reports_absolute_offset() {
        let data = [0u8; 3];
        let mut reader = ChunkReader::new(&data, 40);
        reader.u8().unwrap();

        let err = reader.u32().unwrap_err();
        assert_eq!(err.offset(), Some(41));
    }

    #[test]
    fn test_string_and_count() {
        let mut data = vec![4, 0];
        data.extend_from_slice(b"root");
        data.extend_from_slice(&1000u32.to_le_bytes());

        let mut reader = ChunkReader::new(&data, 0);
        assert_eq!(reader.string().unwrap(), "root");
        assert!(reader.count(12).is_err());
    }

    #[test]
    fn test_finish_rejects_trailing() {
        let data = [1u8, 2];
        let mut reader = ChunkReader::new(&data, 0);
        reader.u8().unwrap();
        assert!(reader.finish("header").is_err());
    }
}
