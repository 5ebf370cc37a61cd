//! Programmable attack/release envelope (§4.5). An `Osci` holds the two
//! vertex sequences parsed out of an instrument's bank record; an
//! `EnvelopeRuntime` walks one sequence per active voice, one sample at
//! a time.

use std::io::{Cursor, Read, Seek};

use crate::binreader::*;
use crate::error::Result;

/// Named envelope segment modes. `0xFF` is not a real mode: it is a
/// sentinel `last_env` synthesizes at the start of release so the first
/// release segment interpolates from `hold_val` (§4.5); it is therefore
/// deliberately absent from this enum and handled separately wherever it
/// appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum EnvpMode {
    Linear,
    Square,
    Direct,
    Root,
    /// Present in the bytecode's mode enumeration but unhandled by the
    /// reference engine's tick function. Left undefined per §9: treated
    /// as producing a flat 0 contribution until reverse-engineered.
    Loop,
    Hold,
    Stop,
    /// Any other raw value, preserved for round-tripping/disassembly but
    /// not otherwise interpreted.
    Unknown(u16),
}

impl EnvpMode {
    pub fn from_raw(v: u16) -> EnvpMode {
        match v {
            0 => EnvpMode::Linear,
            1 => EnvpMode::Square,
            2 => EnvpMode::Direct,
            3 => EnvpMode::Root,
            0x0D => EnvpMode::Loop,
            0x0E => EnvpMode::Hold,
            0x0F => EnvpMode::Stop,
            other => EnvpMode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Envp {
    pub mode_raw: u16,
    pub time: u16,
    pub value: i16,
}

impl Envp {
    pub fn mode(&self) -> EnvpMode {
        EnvpMode::from_raw(self.mode_raw)
    }

    /// The `{mode: 0xFF, time: 0, value: 0}` sentinel `beginRelease()`
    /// synthesizes as a pseudo-previous vertex.
    fn release_sentinel() -> Envp {
        Envp { mode_raw: 0xFF, time: 0, value: 0 }
    }

    fn is_release_sentinel(&self) -> bool {
        self.mode_raw == 0xFF
    }
}

fn read_envp<R: Read + Seek>(r: &mut R) -> Result<Envp> {
    let mode_raw = read_u16(r, "envp mode")?;
    let time = read_u16(r, "envp time")?;
    let value = read_i16(r, "envp value")?;
    Ok(Envp { mode_raw, time, value })
}

/// The programmable attack/release envelope pair for an instrument.
/// `rate`/`width`/`vertex` are parsed placeholders the reference engine
/// never reads back out (§3); they are kept only so the on-disk record
/// can be consumed without drifting out of sync with following data.
#[derive(Debug, Clone, Default)]
pub struct Osci {
    pub attack_env: Vec<Envp>,
    pub release_env: Vec<Envp>,
    pub rate: u16,
    pub width: u16,
    pub vertex: u16,
}

/// Binary layout for the oscillator record pointed to by `osci_off`
/// (§4.4's `INST` layout leaves this record's internal format
/// unspecified; see DESIGN.md for the Open Question this resolves): two
/// big-endian `u16` vertex counts, three unused `u16` placeholders, 2
/// bytes of padding to a 4-byte boundary, then the attack vertices
/// followed by the release vertices, each vertex 6 bytes.
pub fn parse_osci(data: &[u8]) -> Result<Osci> {
    let mut r = Cursor::new(data);
    let attack_count = read_u16(&mut r, "osci attack_env_count")?;
    let release_count = read_u16(&mut r, "osci release_env_count")?;
    let rate = read_u16(&mut r, "osci rate")?;
    let width = read_u16(&mut r, "osci width")?;
    let vertex = read_u16(&mut r, "osci vertex")?;
    skip(&mut r, 2)?;

    let mut attack_env = Vec::with_capacity(attack_count as usize);
    for _ in 0..attack_count {
        attack_env.push(read_envp(&mut r)?);
    }
    let mut release_env = Vec::with_capacity(release_count as usize);
    for _ in 0..release_count {
        release_env.push(read_envp(&mut r)?);
    }

    Ok(Osci { attack_env, release_env, rate, width, vertex })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStatus {
    Empty,
    Finished,
    Hold,
    Active,
}

/// Per-voice envelope evaluation state (§3, §4.5).
#[derive(Debug, Clone)]
pub struct EnvelopeRuntime {
    inc: f64,
    pos: f64,
    curr_env: usize,
    last_env: Envp,
    release: bool,
    force_off: bool,
    last_val: f32,
    hold_val: f32,
}

impl EnvelopeRuntime {
    pub fn new(samplerate: f32) -> EnvelopeRuntime {
        EnvelopeRuntime {
            inc: 1000.0 / samplerate as f64,
            pos: 0.0,
            curr_env: 0,
            last_env: Envp { mode_raw: 0, time: 0, value: 0 },
            release: false,
            force_off: false,
            last_val: 0.0,
            hold_val: 0.0,
        }
    }

    fn active_sequence<'a>(&self, osci: &'a Osci) -> &'a [Envp] {
        if self.release { &osci.release_env } else { &osci.attack_env }
    }

    /// Current status given the (possibly absent) oscillator, per §4.5's
    /// EMPTY/FINISHED/HOLD/ACTIVE rules.
    pub fn status(&self, osci: Option<&Osci>) -> EnvelopeStatus {
        let Some(osci) = osci else { return EnvelopeStatus::Empty };
        if self.force_off {
            return EnvelopeStatus::Finished;
        }
        let seq = self.active_sequence(osci);
        match seq.get(self.curr_env) {
            None => EnvelopeStatus::Finished,
            Some(seg) => match seg.mode() {
                EnvpMode::Stop => EnvelopeStatus::Finished,
                EnvpMode::Hold => EnvelopeStatus::Hold,
                _ => EnvelopeStatus::Active,
            },
        }
    }

    /// Advances the envelope by one sample and returns its contribution
    /// in `[-1, 1]` (before the voice's own volume/velocity scaling).
    pub fn tick(&mut self, osci: Option<&Osci>) -> f32 {
        let Some(osci) = osci else { return 0.0 };
        if self.force_off {
            return self.last_val;
        }
        let seq = self.active_sequence(osci);
        if seq.is_empty() {
            self.last_val = 0.0;
            return 0.0;
        }
        if matches!(seq.get(self.curr_env), None) {
            self.last_val = 0.0;
            return 0.0;
        }
        if self.pos >= seq[self.curr_env].time as f64 {
            self.last_env = seq[self.curr_env];
            self.curr_env += 1;
        }
        let Some(&target) = seq.get(self.curr_env) else {
            self.last_val = 0.0;
            return 0.0;
        };
        if matches!(target.mode(), EnvpMode::Stop) {
            self.last_val = 0.0;
            self.pos += self.inc;
            return 0.0;
        }

        let dt = (target.time as i32 - self.last_env.time as i32).max(1) as f64;
        let t = self.pos - self.last_env.time as f64;
        let y = if self.last_env.is_release_sentinel() { self.hold_val as f64 } else { self.last_env.value as f64 / 32767.0 };
        let dy = target.value as f64 / 32767.0 - y;
        let frac = (t / dt).clamp(0.0, 1.0);

        let value = match target.mode() {
            EnvpMode::Linear => y + dy * frac,
            EnvpMode::Square => y + dy * frac * frac,
            EnvpMode::Root => y + dy * frac.sqrt(),
            EnvpMode::Direct => y + dy,
            EnvpMode::Hold => y,
            // EnvpMode::Loop and any other unhandled/unknown value: §9
            // leaves this undefined, matching the reference engine.
            _ => 0.0,
        };

        self.pos += self.inc;
        self.last_val = value as f32;
        self.last_val
    }

    /// Switches the voice into its release phase: swaps to the release
    /// sequence, resets timing, snapshots the current value as
    /// `hold_val`, and synthesizes the `{0xFF, 0, 0}` pseudo-previous
    /// vertex so the first release segment interpolates from it.
    pub fn begin_release(&mut self) {
        self.release = true;
        self.pos = 0.0;
        self.curr_env = 0;
        self.hold_val = self.last_val;
        self.last_env = Envp::release_sentinel();
    }

    /// Hard-kill: bypasses the envelope entirely and marks the voice
    /// finished (`stopNow()` in §4.6).
    pub fn force_stop(&mut self) {
        self.force_off = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn osci_with(attack: Vec<Envp>, release: Vec<Envp>) -> Osci {
        Osci { attack_env: attack, release_env: release, rate: 0, width: 0, vertex: 0 }
    }

    #[test]
    fn linear_segment_has_constant_sign_derivative() {
        let osci = osci_with(vec![Envp { mode_raw: 0, time: 100, value: 32767 }], vec![]);
        let mut env = EnvelopeRuntime::new(1000.0); // inc = 1ms/sample
        let mut prev = env.tick(Some(&osci));
        let mut sign: Option<bool> = None;
        for _ in 0..50 {
            let v = env.tick(Some(&osci));
            let d = v - prev;
            if d != 0.0 {
                let positive = d > 0.0;
                if let Some(s) = sign {
                    assert_eq!(s, positive);
                } else {
                    sign = Some(positive);
                }
            }
            prev = v;
        }
    }

    #[test]
    fn status_empty_without_oscillator() {
        let env = EnvelopeRuntime::new(32000.0);
        assert_eq!(env.status(None), EnvelopeStatus::Empty);
    }

    #[test]
    fn status_finished_when_forced_off() {
        let osci = osci_with(vec![Envp { mode_raw: 0, time: 100, value: 0 }], vec![]);
        let mut env = EnvelopeRuntime::new(32000.0);
        env.force_stop();
        assert_eq!(env.status(Some(&osci)), EnvelopeStatus::Finished);
    }

    #[test]
    fn status_finished_at_stop_segment() {
        let osci = osci_with(vec![Envp { mode_raw: 0x0F, time: 0, value: 0 }], vec![]);
        let env = EnvelopeRuntime::new(32000.0);
        assert_eq!(env.status(Some(&osci)), EnvelopeStatus::Finished);
    }

    #[test]
    #[ignore = "LOOP (0x0D) envelope mode is unhandled in the reference engine; behavior is undefined until reverse-engineered (see DESIGN.md)"]
    fn loop_mode_semantics_are_unknown() {
        let osci = osci_with(vec![Envp { mode_raw: 0x0D, time: 100, value: 32767 }], vec![]);
        let mut env = EnvelopeRuntime::new(1000.0);
        let _ = env.tick(Some(&osci));
        unreachable!("no defined expectation for LOOP mode yet");
    }

    #[test]
    fn begin_release_uses_hold_val_as_start() {
        let osci = osci_with(vec![Envp { mode_raw: 0, time: 0, value: 32767 }], vec![Envp { mode_raw: 2, time: 10, value: 0 }]);
        let mut env = EnvelopeRuntime::new(1000.0);
        let attack_val = env.tick(Some(&osci));
        assert!((attack_val - 1.0).abs() < 1e-3);
        env.begin_release();
        let release_val = env.tick(Some(&osci));
        // DIRECT jumps straight to target value, so release should be 0 immediately.
        assert!((release_val - 0.0).abs() < 1e-3);
    }
}
