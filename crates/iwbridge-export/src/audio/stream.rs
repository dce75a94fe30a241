//! `ADPC` stream files
//!
//! ```text
//! 0   magic "ADPC"
//! 4   version u16, channels u16
//! 8   sample rate u32
//! 12  frame count u32
//! 16  blocks per channel u32
//! 20  block bytes u16, frames per block u16
//! 24  bitrate u32 (bits per second)
//! 28  reserved u32
//! 32  blocks, channel-interleaved: block 0 of every channel, then block 1, ...
//! ```

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::adpcm::{self, History, BLOCK_BYTES, SAMPLES_PER_BLOCK};
use crate::error::{ExportError, ExportResult};

pub const ADPC_MAGIC: [u8; 4] = *b"ADPC";
pub const ADPC_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdpcHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub frames: u32,
    pub blocks_per_channel: u32,
    pub bitrate: u32,
}

/// Bits per second of a block ADPCM stream
pub fn bitrate(sample_rate: u32, channels: u16) -> u32 {
    let bits = sample_rate as u64 * channels as u64 * BLOCK_BYTES as u64 * 8
        / SAMPLES_PER_BLOCK as u64;
    bits.min(u32::MAX as u64) as u32
}

/// Serialise per-channel block lists (all of equal length)
pub fn write_stream(
    sample_rate: u32,
    frames: u32,
    channels: &[Vec<[u8; BLOCK_BYTES]>],
) -> ExportResult<Vec<u8>> {
    let blocks = channels.first().map_or(0, Vec::len);
    if channels.iter().any(|c| c.len() != blocks) {
        return Err(ExportError::InvalidAudio("channels encode to different block counts".into()));
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + blocks * channels.len() * BLOCK_BYTES);
    out.extend_from_slice(&ADPC_MAGIC);
    out.write_u16::<LittleEndian>(ADPC_VERSION)?;
    out.write_u16::<LittleEndian>(channels.len() as u16)?;
    out.write_u32::<LittleEndian>(sample_rate)?;
    out.write_u32::<LittleEndian>(frames)?;
    out.write_u32::<LittleEndian>(blocks as u32)?;
    out.write_u16::<LittleEndian>(BLOCK_BYTES as u16)?;
    out.write_u16::<LittleEndian>(SAMPLES_PER_BLOCK as u16)?;
    out.write_u32::<LittleEndian>(bitrate(sample_rate, channels.len() as u16))?;
    out.write_u32::<LittleEndian>(0)?;

    for b in 0..blocks {
        for channel in channels {
            out.extend_from_slice(&channel[b]);
        }
    }
    Ok(out)
}

/// Parse an `ADPC` file back into its header and interleaved 16-bit PCM
pub fn read_stream(data: &[u8]) -> ExportResult<(AdpcHeader, Vec<i16>)> {
    let truncated = |_| ExportError::InvalidAudio("truncated ADPC header".into());
    let mut cursor = Cursor::new(data);

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(truncated)?;
    if magic != ADPC_MAGIC {
        return Err(ExportError::InvalidAudio(format!("bad ADPC magic {magic:?}")));
    }
    let version = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    if version != ADPC_VERSION {
        return Err(ExportError::InvalidAudio(format!("unsupported ADPC version {version}")));
    }
    let channels = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let sample_rate = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let frames = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let blocks_per_channel = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let block_bytes = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let frames_per_block = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let bitrate = cursor.read_u32::<LittleEndian>().map_err(truncated)?;

    if block_bytes as usize != BLOCK_BYTES || frames_per_block as usize != SAMPLES_PER_BLOCK {
        return Err(ExportError::InvalidAudio(format!(
            "unexpected block layout {block_bytes} bytes / {frames_per_block} frames"
        )));
    }
    let body = &data[HEADER_SIZE.min(data.len())..];
    let expected = blocks_per_channel as usize * channels as usize * BLOCK_BYTES;
    if body.len() != expected || frames as usize > blocks_per_channel as usize * SAMPLES_PER_BLOCK {
        return Err(ExportError::InvalidAudio(format!(
            "ADPC body holds {} bytes, header implies {expected}",
            body.len()
        )));
    }

    let channel_count = channels as usize;
    let mut histories = vec![History::default(); channel_count];
    let mut pcm = vec![0i16; frames as usize * channel_count];
    for (index, raw) in body.chunks_exact(BLOCK_BYTES).enumerate() {
        let (b, c) = (index / channel_count, index % channel_count);
        let mut block = [0u8; BLOCK_BYTES];
        block.copy_from_slice(raw);
        let decoded = adpcm::decode_block(&block, &mut histories[c]);
        for (i, sample) in decoded.into_iter().enumerate() {
            let frame = b * SAMPLES_PER_BLOCK + i;
            if frame < frames as usize {
                pcm[frame * channel_count + c] = sample;
            }
        }
    }

    let header = AdpcHeader {
        channels,
        sample_rate,
        frames,
        blocks_per_channel,
        bitrate,
    };
    Ok((header, pcm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AdpcmQuality;

    #[test]
    fn test_bitrate_formula() {
        // 48 kHz stereo: 48000 * 2 * 16 / 28 * 8
        assert_eq!(bitrate(48000, 2), 438_857);
        assert_eq!(bitrate(44100, 1), 201_600);
    }

    #[test]
    fn test_header_layout() {
        let left = adpcm::encode_channel(&[100; 30], AdpcmQuality::Fast);
        let right = adpcm::encode_channel(&[-100; 30], AdpcmQuality::Fast);
        let bytes = write_stream(22050, 30, &[left, right]).unwrap();

        assert_eq!(&bytes[..4], b"ADPC");
        assert_eq!(bytes.len(), HEADER_SIZE + 2 * 2 * BLOCK_BYTES);

        let (header, pcm) = read_stream(&bytes).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.frames, 30);
        assert_eq!(header.blocks_per_channel, 2);
        assert_eq!(pcm.len(), 60);
    }

    #[test]
    fn test_truncated_body_rejected() {
        let blocks = adpcm::encode_channel(&[0; 28], AdpcmQuality::Fast);
        let mut bytes = write_stream(8000, 28, &[blocks]).unwrap();
        bytes.pop();
        assert!(read_stream(&bytes).is_err());
        assert!(read_stream(&bytes[..10]).is_err());
    }
}
