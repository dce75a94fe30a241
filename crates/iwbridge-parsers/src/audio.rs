//! Audio chunk parser
//!
//! `AUHD` describes the stream, `AUDT` chunks carry it in sequence order.

use iwbridge_core::AssetKind;
use serde::Serialize;

use crate::compression::Codec;
use crate::container::{ChunkReader, Container, ContainerBuilder, PayloadWriter};
use crate::registry::tags;
use crate::traits::{ParseError, ParseResult};

/// Encoding of the `AUDT` stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AudioEncoding {
    /// Interleaved signed 16-bit PCM
    PcmS16,
    /// Interleaved packed signed 24-bit PCM
    PcmS24,
    /// Interleaved 32-bit float PCM
    PcmF32,
    /// A complete RIFF/WAVE file
    Wave,
}

impl AudioEncoding {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AudioEncoding::PcmS16),
            1 => Some(AudioEncoding::PcmS24),
            2 => Some(AudioEncoding::PcmF32),
            3 => Some(AudioEncoding::Wave),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AudioEncoding::PcmS16 => 0,
            AudioEncoding::PcmS24 => 1,
            AudioEncoding::PcmF32 => 2,
            AudioEncoding::Wave => 3,
        }
    }

    /// Bits per sample a raw PCM stream must declare
    pub fn pcm_bits(self) -> Option<u16> {
        match self {
            AudioEncoding::PcmS16 => Some(16),
            AudioEncoding::PcmS24 => Some(24),
            AudioEncoding::PcmF32 => Some(32),
            AudioEncoding::Wave => None,
        }
    }
}

/// Parsed audio stream
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRecord {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: AudioEncoding,
    /// Sample frames the header promises
    pub declared_frames: u32,
    /// `AUDT` payloads concatenated in sequence order
    pub stream: Vec<u8>,
    /// Container offset of the first `AUDT` payload
    pub payload_offset: Option<u64>,
}

/// Summary used by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct AudioSummary {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: AudioEncoding,
    pub frames: u32,
    pub duration_secs: f64,
    pub stream_bytes: usize,
}

impl AudioRecord {
    /// Read the audio record out of `container`
    pub fn from_container(container: &Container, name: &str) -> ParseResult<Self> {
        let header = container.require(tags::AUDIO_HEADER)?;
        let payload = container.decode(header)?;
        let base = header.offset as u64;
        let mut reader = ChunkReader::new(&payload, base);

        let sample_rate = reader.u32()?;
        let channels = reader.u16()?;
        let bits_per_sample = reader.u16()?;
        let encoding_at = reader.position();
        let encoding_byte = reader.u8()?;
        reader.bytes(3)?;
        let declared_frames = reader.u32()?;
        reader.finish("audio header")?;

        let encoding = AudioEncoding::from_u8(encoding_byte).ok_or_else(|| {
            ParseError::corrupted(encoding_at, format!("unknown audio encoding {encoding_byte}"))
        })?;

        if sample_rate == 0 || channels == 0 {
            return Err(ParseError::corrupted(
                base,
                format!("audio header declares {sample_rate} Hz with {channels} channels"),
            ));
        }
        if let Some(bits) = encoding.pcm_bits() {
            if bits != bits_per_sample {
                return Err(ParseError::corrupted(
                    base + 6,
                    format!("{encoding:?} stream declares {bits_per_sample} bits per sample"),
                ));
            }
        }

        let parts = container.find_all(tags::AUDIO_DATA);
        let payload_offset = parts.first().map(|e| e.offset as u64);
        let mut stream = Vec::new();
        for (seq, entry) in parts.into_iter().enumerate() {
            if entry.index as usize != seq {
                return Err(ParseError::corrupted(
                    entry.directory_position + 16,
                    format!("audio stream has a hole: expected part {seq}, found {}", entry.index),
                ));
            }
            stream.extend_from_slice(&container.decode(entry)?);
        }

        let record = Self {
            name: name.to_string(),
            sample_rate,
            channels,
            bits_per_sample,
            encoding,
            declared_frames,
            stream,
            payload_offset,
        };

        if let Some(expected) = record.expected_stream_len() {
            if record.stream.len() as u64 != expected {
                return Err(ParseError::corrupted(
                    base + 12,
                    format!(
                        "{declared_frames} frames need {expected} stream bytes, found {}",
                        record.stream.len()
                    ),
                ));
            }
        }

        Ok(record)
    }

    /// Exact stream length for raw PCM encodings
    pub fn expected_stream_len(&self) -> Option<u64> {
        let bits = self.encoding.pcm_bits()?;
        Some(self.declared_frames as u64 * self.channels as u64 * (bits as u64 / 8))
    }

    pub fn duration_secs(&self) -> f64 {
        self.declared_frames as f64 / self.sample_rate as f64
    }

    pub fn summary(&self) -> AudioSummary {
        AudioSummary {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            encoding: self.encoding,
            frames: self.declared_frames,
            duration_secs: self.duration_secs(),
            stream_bytes: self.stream.len(),
        }
    }

    /// Serialise into an audio container, splitting the stream into `part_size` chunks
    pub fn to_container(&self, codec: Codec, part_size: usize) -> ParseResult<Vec<u8>> {
        let mut header = PayloadWriter::new();
        header
            .u32(self.sample_rate)
            .u16(self.channels)
            .u16(self.bits_per_sample)
            .u8(self.encoding.to_u8())
            .bytes(&[0; 3])
            .u32(self.declared_frames);

        let mut builder = ContainerBuilder::new(AssetKind::Audio)
            .chunk(tags::NAME, self.name.as_bytes().to_vec())
            .chunk(tags::AUDIO_HEADER, header.finish());

        if self.stream.is_empty() {
            builder = builder.chunk_with(tags::AUDIO_DATA, 0, codec, Vec::new());
        }
        for (seq, part) in self.stream.chunks(part_size.max(1)).enumerate() {
            builder = builder.chunk_with(tags::AUDIO_DATA, seq as u16, codec, part.to_vec());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn tone() -> AudioRecord {
        let samples: Vec<u8> = (0..200i16)
            .flat_map(|i| (i * 100).to_le_bytes())
            .collect();
        AudioRecord {
            payload_offset: None,
            name: "beep".into(),
            sample_rate: 22_050,
            channels: 2,
            bits_per_sample: 16,
            encoding: AudioEncoding::PcmS16,
            declared_frames: 100,
            stream: samples,
        }
    }

    fn parse(bytes: Vec<u8>) -> ParseResult<AudioRecord> {
        let container = Container::parse(Bytes::from(bytes))?;
        AudioRecord::from_container(&container, "beep")
    }

    #[test]
    fn test_stream_reassembled_in_order() {
        let record = tone();
        let parsed = parse(record.to_container(Codec::Lz4, 64).unwrap()).unwrap();
        assert_eq!(parsed, record);
        assert!((parsed.duration_secs() - 100.0 / 22_050.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_count_mismatch() {
        let mut record = tone();
        record.declared_frames = 101;
        let err = parse(record.to_container(Codec::Store, 1024).unwrap()).unwrap_err();
        assert!(matches!(err, ParseError::CorruptedData { .. }));
    }

    #[test]
    fn test_bits_must_match_encoding() {
        let mut record = tone();
        record.bits_per_sample = 24;
        assert!(parse(record.to_container(Codec::Store, 1024).unwrap()).is_err());
    }

    #[test]
    fn test_unknown_encoding() {
        let mut bytes = tone().to_container(Codec::Store, 1024).unwrap();
        let container = Container::parse(Bytes::from(bytes.clone())).unwrap();
        let at = container.require(tags::AUDIO_HEADER).unwrap().offset as usize + 8;
        bytes[at] = 9;

        let err = parse(bytes).unwrap_err();
        assert_eq!(err.offset(), Some(at as u64));
    }
}
