//! Audio transcoding to block ADPCM
//!
//! Sources are decoded fully to float PCM, resampled when a target rate is
//! configured, quantised to 16-bit and encoded per channel. The encoder keeps
//! no state between calls, so identical input and settings always produce
//! identical bytes.

pub mod adpcm;
mod pcm;
mod stream;

pub use adpcm::AdpcmQuality;
pub use pcm::{decode_source, resample, PcmBuffer};
pub use stream::{bitrate, read_stream, write_stream, AdpcHeader, ADPC_MAGIC, ADPC_VERSION};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use iwbridge_parsers::AudioRecord;

use crate::error::{ExportError, ExportResult};

/// Audio conversion settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Output sample rate; `None` keeps the source rate
    pub sample_rate: Option<u32>,
    pub quality: AdpcmQuality,
}

/// An encoded `ADPC` stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u32,
    pub bitrate: u32,
    pub data: Vec<u8>,
}

/// Decode `record` and re-encode it as block ADPCM
///
/// Only mono and stereo layouts are representable.
#[instrument(skip_all, fields(audio = %record.name))]
pub fn transcode(record: &AudioRecord, settings: &AudioSettings) -> ExportResult<TranscodedAudio> {
    let source = decode_source(record)?;
    if !matches!(source.channels, 1 | 2) {
        return Err(ExportError::UnsupportedChannelLayout {
            channels: source.channels,
        });
    }

    let pcm = match settings.sample_rate {
        Some(0) => return Err(ExportError::InvalidAudio("target sample rate is zero".into())),
        Some(rate) => resample(&source, rate),
        None => source,
    };

    let channels = pcm.channels as usize;
    let frames = pcm.frames();
    let encoded: Vec<_> = (0..channels)
        .into_par_iter()
        .map(|c| {
            let samples: Vec<i16> = pcm
                .samples
                .iter()
                .skip(c)
                .step_by(channels)
                .map(|&s| pcm::to_i16(s))
                .collect();
            adpcm::encode_channel(&samples, settings.quality)
        })
        .collect();

    let frames = u32::try_from(frames)
        .map_err(|_| ExportError::InvalidAudio(format!("{frames} frames exceed the stream limit")))?;
    let data = write_stream(pcm.sample_rate, frames, &encoded)?;

    debug!(
        sample_rate = pcm.sample_rate,
        channels,
        frames,
        bytes = data.len(),
        "Transcoded audio"
    );

    Ok(TranscodedAudio {
        sample_rate: pcm.sample_rate,
        channels: pcm.channels,
        frames,
        bitrate: bitrate(pcm.sample_rate, pcm.channels),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use iwbridge_parsers::AudioEncoding;

    fn tone(channels: u16, frames: u32) -> AudioRecord {
        let stream = (0..frames * channels as u32)
            .flat_map(|i| (((i as f32 * 0.05).sin() * 8000.0) as i16).to_le_bytes())
            .collect();
        AudioRecord {
            payload_offset: None,
            name: "tone".into(),
            sample_rate: 44100,
            channels,
            bits_per_sample: 16,
            encoding: AudioEncoding::PcmS16,
            declared_frames: frames,
            stream,
        }
    }

    #[test]
    fn test_transcode_is_byte_identical() {
        let record = tone(2, 1000);
        let settings = AudioSettings {
            sample_rate: Some(22050),
            quality: AdpcmQuality::Exhaustive,
        };
        let a = transcode(&record, &settings).unwrap();
        let b = transcode(&record, &settings).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.sample_rate, 22050);
        assert_eq!(a.frames, 500);
    }

    #[test]
    fn test_six_channels_rejected() {
        let err = transcode(&tone(6, 100), &AudioSettings::default()).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedChannelLayout { channels: 6 }));
    }

    #[test]
    fn test_framing_within_one_block() {
        let out = transcode(&tone(1, 1000), &AudioSettings::default()).unwrap();
        let (header, pcm) = read_stream(&out.data).unwrap();
        assert_eq!(pcm.len(), 1000);
        let padded = header.blocks_per_channel as usize * 28;
        assert!(padded >= 1000 && padded - 1000 < 28);
    }
}
