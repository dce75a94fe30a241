//! 4-bit block ADPCM
//!
//! Each 16-byte block holds 28 samples: a header byte
//! (`filter << 4 | shift`), a flags byte, then 14 bytes of nibbles with the
//! earlier sample in the low nibble. A sample is reconstructed as
//! `(nibble << 12 >> shift) + (h1 * POS[f] + h2 * NEG[f] + 32) >> 6`.

use serde::{Deserialize, Serialize};

pub const BLOCK_BYTES: usize = 16;
pub const SAMPLES_PER_BLOCK: usize = 28;
pub const FILTER_COUNT: usize = 5;
pub const MAX_SHIFT: u8 = 12;

/// Block flag: last block of the channel
pub const FLAG_END: u8 = 0x01;

const POS: [i32; FILTER_COUNT] = [0, 60, 115, 98, 122];
const NEG: [i32; FILTER_COUNT] = [0, 0, -52, -55, -60];

/// Predictor search depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdpcmQuality {
    /// One estimated shift per filter
    Fast,
    /// Every filter and shift combination
    #[default]
    Exhaustive,
}

/// Decoder history for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct History {
    h1: i32,
    h2: i32,
}

impl History {
    fn predict(&self, filter: usize) -> i32 {
        (self.h1 * POS[filter] + self.h2 * NEG[filter] + 32) >> 6
    }

    fn push(&mut self, sample: i32) {
        self.h2 = self.h1;
        self.h1 = sample;
    }
}

fn expand(nibble: i32, shift: u8) -> i32 {
    (nibble << 12) >> shift
}

fn quantise(residual: i32, shift: u8) -> i32 {
    let scaled = (residual as i64) << shift;
    let q = if scaled >= 0 {
        (scaled + 2048) >> 12
    } else {
        -((-scaled + 2048) >> 12)
    };
    q.clamp(-8, 7) as i32
}

/// Encode `samples` (at most 28) with fixed parameters; returns nibbles,
/// squared error and the history after the block
fn trial(samples: &[i16], history: History, filter: usize, shift: u8) -> ([i32; SAMPLES_PER_BLOCK], i64, History) {
    let mut nibbles = [0i32; SAMPLES_PER_BLOCK];
    let mut state = history;
    let mut error = 0i64;
    for (slot, &sample) in nibbles.iter_mut().zip(samples) {
        let predicted = state.predict(filter);
        let q = quantise(sample as i32 - predicted, shift);
        let decoded = (predicted + expand(q, shift)).clamp(i16::MIN as i32, i16::MAX as i32);
        let diff = (decoded - sample as i32) as i64;
        error += diff * diff;
        *slot = q;
        state.push(decoded);
    }
    (nibbles, error, state)
}

/// Shift that fits the largest open-loop residual of `filter` into a nibble
fn estimate_shift(samples: &[i16], history: History, filter: usize) -> u8 {
    let mut state = history;
    let mut peak = 0i32;
    for &sample in samples {
        peak = peak.max((sample as i32 - state.predict(filter)).abs());
        state.push(sample as i32);
    }
    let mut shift = MAX_SHIFT;
    while shift > 0 && expand(7, shift) < peak {
        shift -= 1;
    }
    shift
}

/// Encode one block, choosing filter and shift by `quality`
pub fn encode_block(
    samples: &[i16],
    history: &mut History,
    quality: AdpcmQuality,
    last: bool,
) -> [u8; BLOCK_BYTES] {
    let candidates: Vec<(usize, u8)> = match quality {
        AdpcmQuality::Exhaustive => (0..FILTER_COUNT)
            .flat_map(|f| (0..=MAX_SHIFT).map(move |s| (f, s)))
            .collect(),
        AdpcmQuality::Fast => (0..FILTER_COUNT)
            .map(|f| (f, estimate_shift(samples, *history, f)))
            .collect(),
    };

    // Strictly smaller error wins, so ties keep the earliest candidate
    let mut best: Option<(usize, u8, [i32; SAMPLES_PER_BLOCK], i64, History)> = None;
    for (filter, shift) in candidates {
        let (nibbles, error, state) = trial(samples, *history, filter, shift);
        if best.as_ref().map_or(true, |b| error < b.3) {
            best = Some((filter, shift, nibbles, error, state));
        }
    }

    let mut block = [0u8; BLOCK_BYTES];
    if let Some((filter, shift, nibbles, _, state)) = best {
        block[0] = ((filter as u8) << 4) | shift;
        block[1] = if last { FLAG_END } else { 0 };
        for (i, pair) in nibbles.chunks_exact(2).enumerate() {
            block[2 + i] = (pair[0] as u8 & 0x0F) | ((pair[1] as u8 & 0x0F) << 4);
        }
        *history = state;
    }
    block
}

/// Decode one block into 28 samples
pub fn decode_block(block: &[u8; BLOCK_BYTES], history: &mut History) -> [i16; SAMPLES_PER_BLOCK] {
    let filter = ((block[0] >> 4) as usize).min(FILTER_COUNT - 1);
    let shift = (block[0] & 0x0F).min(MAX_SHIFT);
    let mut out = [0i16; SAMPLES_PER_BLOCK];
    for (i, sample) in out.iter_mut().enumerate() {
        let byte = block[2 + i / 2];
        let raw = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
        // Sign-extend the nibble
        let nibble = ((raw << 4) as i8 >> 4) as i32;
        let decoded = (history.predict(filter) + expand(nibble, shift))
            .clamp(i16::MIN as i32, i16::MAX as i32);
        history.push(decoded);
        *sample = decoded as i16;
    }
    out
}

/// Encode a whole mono channel; the final block is zero padded
pub fn encode_channel(samples: &[i16], quality: AdpcmQuality) -> Vec<[u8; BLOCK_BYTES]> {
    let mut history = History::default();
    let block_count = samples.len().div_ceil(SAMPLES_PER_BLOCK).max(1);
    (0..block_count)
        .map(|b| {
            let start = b * SAMPLES_PER_BLOCK;
            let end = (start + SAMPLES_PER_BLOCK).min(samples.len());
            encode_block(&samples[start.min(end)..end], &mut history, quality, b + 1 == block_count)
        })
        .collect()
}
