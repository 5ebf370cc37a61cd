//! Output sink collaborator (§6). A push interface that accepts one
//! interleaved stereo frame buffer per controller tick. Only the
//! interface is specified; a real frontend backs this with an audio
//! device queue, tests back it with an in-memory accumulator.

use crate::error::Result;

/// Accepts interleaved stereo `i16` PCM frames (`[L0, R0, L1, R1, ...]`),
/// the canonical external representation (§6). The sink may block (e.g.
/// sleep when its internal queue passes a high-water mark); the engine
/// enforces no deadline around that call (§5).
pub trait Sink {
    fn push_frames(&mut self, interleaved: &[i16]) -> Result<()>;

    /// Sample rate this sink was created for, in Hz. 44100 is the
    /// reference rate (§6).
    fn sample_rate(&self) -> f32;
}

/// Converts a pair of float mix buffers in `[-1, 1]` into interleaved
/// clipped/scaled `i16` PCM, ready for `Sink::push_frames`.
pub fn to_interleaved_pcm(left: &[f32], right: &[f32]) -> Vec<i16> {
    debug_assert_eq!(left.len(), right.len());
    let mut out = Vec::with_capacity(left.len() * 2);
    for (&l, &r) in left.iter().zip(right.iter()) {
        out.push(clip_to_i16(l));
        out.push(clip_to_i16(r));
    }
    out
}

fn clip_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Reference in-memory sink, useful for tests and for the `player`
/// binary when no real audio device is wired in yet.
pub struct MemorySink {
    pub sample_rate: f32,
    pub frames: Vec<i16>,
}

impl MemorySink {
    pub fn new(sample_rate: f32) -> Self {
        MemorySink { sample_rate, frames: Vec::new() }
    }
}

impl Sink for MemorySink {
    fn push_frames(&mut self, interleaved: &[i16]) -> Result<()> {
        self.frames.extend_from_slice(interleaved);
        Ok(())
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clips_out_of_range_samples() {
        let pcm = to_interleaved_pcm(&[2.0, -2.0], &[0.0, 0.0]);
        assert_eq!(pcm[0], 32767);
        assert_eq!(pcm[2], -32767);
    }
}
