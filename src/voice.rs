//! Voice (Note): per-voice playback state and the per-sample rendering
//! algorithm (§4.6).

use std::rc::Rc;

use crate::envelope::{EnvelopeRuntime, EnvelopeStatus, Osci};
use crate::wsys::Wave;

/// 128-entry equal-tempered frequency table, A4 (key 69) = 440 Hz.
pub fn midi_freq(key: u8) -> f32 {
    midi_freq_table()[key as usize]
}

fn midi_freq_table() -> [f32; 128] {
    std::array::from_fn(|key| 440.0 * 2f32.powf((key as f32 - 69.0) / 12.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Playing,
    Releasing,
    Finished,
}

/// `looped(p, a, b)`: wraps `p` into `[a, b)` once it reaches `b - 1`
/// (§4.6). Guarantees the invariant tested in §8: the result always
/// lies in `[a, b)` for `p >= a`.
pub fn looped(p: f64, a: f64, b: f64) -> f64 {
    if p >= b - 1.0 {
        let span = (b - a - 1.0).max(1.0);
        ((p - a).rem_euclid(span)) + a
    } else {
        p
    }
}

/// Owned by the audio system's voice pool. `wave` is a shared handle
/// into the wavesystem cache (cloning bumps a refcount, §3 ownership
/// invariants); `osci` is a private copy taken at `start()` time, since
/// the oscillator is tiny and copying it once per note-on is simpler
/// than threading a second borrow alongside the wave through the pool.
pub struct Note {
    wave: Option<Rc<Wave>>,
    osci: Option<Osci>,
    volume: f32,
    pitch: f32,
    key: u8,
    vel: u8,
    is_percussion: bool,
    pub volume_adj: f32,
    pub pitch_adj: f32,
    position: f64,
    state: VoiceState,
    envelope: EnvelopeRuntime,
}

impl Note {
    pub fn idle(output_samplerate: f32) -> Note {
        Note {
            wave: None,
            osci: None,
            volume: 1.0,
            pitch: 1.0,
            key: 0,
            vel: 0,
            is_percussion: false,
            volume_adj: 1.0,
            pitch_adj: 1.0,
            position: 0.0,
            state: VoiceState::Idle,
            envelope: EnvelopeRuntime::new(output_samplerate),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == VoiceState::Finished
    }

    /// Binds this (recycled or fresh) voice slot to a resolved
    /// wave/oscillator and starts playback. Takes `osci`/`is_percussion`
    /// by value rather than `&BankInstrument`: the caller resolves the
    /// wave through a second, independent borrow of the wavesystem
    /// cache, so it must extract everything it needs from the
    /// instrument and drop that borrow first (see `AudioSystem::start_note`).
    pub fn start(&mut self, wave: Rc<Wave>, osci: Osci, is_percussion: bool, key: u8, vel: u8, volume: f32, pitch: f32, output_samplerate: f32) {
        self.wave = Some(wave);
        self.osci = Some(osci);
        self.volume = volume;
        self.pitch = pitch;
        self.key = key;
        self.vel = vel;
        self.is_percussion = is_percussion;
        self.volume_adj = 1.0;
        self.pitch_adj = 1.0;
        self.position = 0.0;
        self.state = VoiceState::Playing;
        self.envelope = EnvelopeRuntime::new(output_samplerate);
    }

    pub fn release(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Releasing;
            self.envelope.begin_release();
        }
    }

    /// Hard-kill: bypasses the envelope entirely (`stopNow()`, §4.6).
    pub fn stop_now(&mut self) {
        self.envelope.force_stop();
        self.state = VoiceState::Finished;
    }

    pub fn reset(&mut self) {
        self.wave = None;
        self.osci = None;
        self.state = VoiceState::Idle;
        self.position = 0.0;
    }

    /// Produces one float sample, advancing all voice state (§4.6 steps
    /// 1-7). `output_samplerate` is the controller's mix rate.
    pub fn tick(&mut self, output_samplerate: f32) -> f32 {
        let Some(wave) = self.wave.clone() else {
            self.state = VoiceState::Finished;
            return 0.0;
        };
        if self.state != VoiceState::Playing && self.state != VoiceState::Releasing {
            self.state = VoiceState::Finished;
            return 0.0;
        }

        let env_value = self.envelope.tick(self.osci.as_ref());
        if self.envelope.status(self.osci.as_ref()) == EnvelopeStatus::Finished {
            self.state = VoiceState::Finished;
            return 0.0;
        }

        if !wave.looped && self.position >= wave.loop_end as f64 {
            self.state = VoiceState::Finished;
            return 0.0;
        }

        let mut tick_delta = (wave.sample_rate / output_samplerate) as f64 * self.pitch as f64 * self.pitch_adj as f64;
        if !self.is_percussion {
            tick_delta *= (midi_freq(self.key) / midi_freq(wave.base_key)) as f64;
        }

        let v = self.vel as f32 / 127.0;
        let level = env_value * self.volume * self.volume * v * self.volume_adj;

        let loop_start = wave.loop_start as f64 + 1.0;
        let loop_end = wave.loop_end as f64;
        let start_pos = looped(self.position, loop_start, loop_end);
        let s = start_pos.floor();
        let e = looped(s + 1.0, loop_start, loop_end);
        let frac = (start_pos - s) as f32;

        let s_idx = s as usize;
        let e_idx = e as usize;
        let sample = if s_idx < wave.data.len() && e_idx < wave.data.len() {
            wave.data[s_idx] + (wave.data[e_idx] - wave.data[s_idx]) * frac
        } else {
            0.0
        };

        self.position += tick_delta;
        sample * level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440hz() {
        let f = midi_freq(69);
        assert!((f - 440.0).abs() < 1e-3);
    }

    #[test]
    fn looped_stays_in_range() {
        for p in [0.0, 5.0, 9.0, 9.5, 100.0] {
            let v = looped(p, 2.0, 10.0);
            assert!(v >= 2.0 && v < 10.0, "p={p} v={v}");
        }
    }

    #[test]
    fn idle_voice_tick_marks_finished() {
        let mut note = Note::idle(44100.0);
        let s = note.tick(44100.0);
        assert_eq!(s, 0.0);
        assert!(note.is_finished());
    }
}
