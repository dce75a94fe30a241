//! Source decoding to interleaved float PCM, and resampling

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use iwbridge_parsers::{AudioEncoding, AudioRecord};

use crate::error::{ExportError, ExportResult};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Interleaved samples in `[-1, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            c => self.samples.len() / c as usize,
        }
    }
}

/// Decode the whole source stream of `record`
pub fn decode_source(record: &AudioRecord) -> ExportResult<PcmBuffer> {
    let buffer = match record.encoding {
        AudioEncoding::PcmS16 | AudioEncoding::PcmS24 | AudioEncoding::PcmF32 => PcmBuffer {
            sample_rate: record.sample_rate,
            channels: record.channels,
            samples: decode_samples(
                &record.stream,
                record.bits_per_sample,
                record.encoding == AudioEncoding::PcmF32,
            )?,
        },
        AudioEncoding::Wave => decode_wave(&record.stream)?,
    };

    let frames = buffer.frames();
    if frames != record.declared_frames as usize {
        return Err(ExportError::InvalidAudio(format!(
            "'{}' declares {} frames but decodes to {frames}",
            record.name, record.declared_frames
        )));
    }
    trace!(frames, channels = buffer.channels, "Decoded audio source");
    Ok(buffer)
}

fn decode_samples(data: &[u8], bits: u16, float: bool) -> ExportResult<Vec<f32>> {
    let samples = match (bits, float) {
        (16, false) => data
            .chunks_exact(2)
            .map(|s| LittleEndian::read_i16(s) as f32 / 32768.0)
            .collect(),
        (24, false) => data
            .chunks_exact(3)
            .map(|s| LittleEndian::read_i24(s) as f32 / 8_388_608.0)
            .collect(),
        (32, true) => data
            .chunks_exact(4)
            .map(|s| LittleEndian::read_f32(s).clamp(-1.0, 1.0))
            .collect(),
        (8, false) => data.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect(),
        _ => {
            return Err(ExportError::InvalidAudio(format!(
                "{bits}-bit {} samples are not supported",
                if float { "float" } else { "integer" }
            )))
        }
    };
    Ok(samples)
}

/// Decode a RIFF/WAVE file carried in the stream
fn decode_wave(data: &[u8]) -> ExportResult<PcmBuffer> {
    if data.len() < 12 || &data[..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(ExportError::InvalidAudio("missing RIFF/WAVE header".into()));
    }

    let mut format: Option<(u16, u16, u32, u16)> = None;
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let size = LittleEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
        let body_start = pos + 8;
        let body_end = body_start.saturating_add(size);

        if id == b"fmt " {
            if size < 16 || body_end > data.len() {
                return Err(ExportError::InvalidAudio("truncated fmt chunk".into()));
            }
            let body = &data[body_start..body_end];
            let mut tag = LittleEndian::read_u16(&body[0..2]);
            let channels = LittleEndian::read_u16(&body[2..4]);
            let rate = LittleEndian::read_u32(&body[4..8]);
            let bits = LittleEndian::read_u16(&body[14..16]);
            if tag == WAVE_FORMAT_EXTENSIBLE && body.len() >= 26 {
                // Sub-format GUID starts with the actual format tag
                tag = LittleEndian::read_u16(&body[24..26]);
            }
            format = Some((tag, channels, rate, bits));
        } else if id == b"data" {
            let (tag, channels, sample_rate, bits) = format
                .ok_or_else(|| ExportError::InvalidAudio("data chunk precedes fmt chunk".into()))?;
            let float = match tag {
                WAVE_FORMAT_PCM => false,
                WAVE_FORMAT_IEEE_FLOAT => true,
                other => {
                    return Err(ExportError::InvalidAudio(format!(
                        "WAVE format tag {other:#06x} is not PCM"
                    )))
                }
            };
            if channels == 0 || sample_rate == 0 {
                return Err(ExportError::InvalidAudio("WAVE fmt declares zero channels or rate".into()));
            }
            let body = &data[body_start..body_end.min(data.len())];
            return Ok(PcmBuffer {
                sample_rate,
                channels,
                samples: decode_samples(body, bits, float)?,
            });
        }

        // Chunks are word aligned
        pos = body_end.saturating_add(size & 1);
    }

    Err(ExportError::InvalidAudio("WAVE file has no data chunk".into()))
}

/// Linear-interpolation resample to `target_rate`
pub fn resample(buffer: &PcmBuffer, target_rate: u32) -> PcmBuffer {
    if buffer.sample_rate == target_rate || buffer.frames() == 0 {
        return PcmBuffer {
            sample_rate: target_rate,
            ..buffer.clone()
        };
    }

    let channels = buffer.channels as usize;
    let in_frames = buffer.frames();
    let src = buffer.sample_rate as u64;
    let dst = target_rate as u64;
    let out_frames = ((in_frames as u64 * dst + src / 2) / src).max(1) as usize;

    let mut samples = Vec::with_capacity(out_frames * channels);
    for frame in 0..out_frames {
        // Exact rational position keeps the output independent of float drift
        let numerator = frame as u64 * src;
        let i0 = (numerator / dst) as usize;
        let frac = (numerator % dst) as f32 / dst as f32;
        let i0 = i0.min(in_frames - 1);
        let i1 = (i0 + 1).min(in_frames - 1);
        for c in 0..channels {
            let a = buffer.samples[i0 * channels + c];
            let b = buffer.samples[i1 * channels + c];
            samples.push(a + (b - a) * frac);
        }
    }

    PcmBuffer {
        sample_rate: target_rate,
        channels: buffer.channels,
        samples,
    }
}

/// Quantise to 16-bit
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(encoding: AudioEncoding, bits: u16, channels: u16, stream: Vec<u8>, frames: u32) -> AudioRecord {
        AudioRecord {
            payload_offset: None,
            name: "clip".into(),
            sample_rate: 8000,
            channels,
            bits_per_sample: bits,
            encoding,
            declared_frames: frames,
            stream,
        }
    }

    fn wave_file(channels: u16, rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = samples.len() * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len as u32).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"LIST");
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(b"abc\0");
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_len as u32).to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_s16_and_s24_decode() {
        let s16 = record(AudioEncoding::PcmS16, 16, 1, [16384i16, -32768].iter().flat_map(|s| s.to_le_bytes()).collect(), 2);
        assert_eq!(decode_source(&s16).unwrap().samples, vec![0.5, -1.0]);

        let s24 = record(AudioEncoding::PcmS24, 24, 1, vec![0x00, 0x00, 0x40], 1);
        assert_eq!(decode_source(&s24).unwrap().samples, vec![0.5]);
    }

    #[test]
    fn test_wave_skips_unknown_chunks() {
        let wave = wave_file(2, 22050, &[100, -100, 200, -200]);
        let pcm = decode_source(&record(AudioEncoding::Wave, 16, 2, wave, 2)).unwrap();
        assert_eq!(pcm.sample_rate, 22050);
        assert_eq!(pcm.channels, 2);
        assert_eq!(pcm.frames(), 2);
    }

    #[test]
    fn test_wave_frame_mismatch() {
        let wave = wave_file(1, 8000, &[1, 2, 3]);
        assert!(matches!(
            decode_source(&record(AudioEncoding::Wave, 16, 1, wave, 10)),
            Err(ExportError::InvalidAudio(_))
        ));
    }

    #[test]
    fn test_resample_linear() {
        let buffer = PcmBuffer {
            sample_rate: 2,
            channels: 1,
            samples: vec![0.0, 1.0],
        };
        let up = resample(&buffer, 4);
        assert_eq!(up.samples, vec![0.0, 0.5, 1.0, 1.0]);

        let down = resample(&up, 2);
        assert_eq!(down.samples, vec![0.0, 1.0]);
    }

    #[test]
    fn test_quantise() {
        assert_eq!(to_i16(1.5), 32767);
        assert_eq!(to_i16(-1.0), -32767);
        assert_eq!(to_i16(0.0), 0);
    }
}
