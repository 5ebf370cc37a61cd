//! Track (§4.8): interprets bytecode for one logical voice — program
//! counter, call stack, delay timer, parameter slides, and the mapping
//! from voice-id slots to active notes.

use crate::audio_system::{AudioSystem, VoiceHandle};
use crate::error::EngineError;
use crate::sequencer::{self, BadKind, Command, PerfType, PerfValue};
use crate::status::StatusSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideParam {
    Volume,
    Pitch,
    Reverb,
    Pan,
}

impl From<PerfType> for SlideParam {
    fn from(p: PerfType) -> SlideParam {
        match p {
            PerfType::Volume => SlideParam::Volume,
            PerfType::Pitch => SlideParam::Pitch,
            PerfType::Reverb => SlideParam::Reverb,
            PerfType::Pan => SlideParam::Pan,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Slide {
    pub param: SlideParam,
    pub start: f32,
    pub end: f32,
    pub duration: u32,
    pub t: u32,
}

/// Requests a track cannot satisfy itself because they touch shared
/// controller state (§4.8: OpenTrack/Tempo/Timebase "write through to
/// the controller"). Collected during `step()` and drained by the
/// controller at the end of its tick.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    OpenTrack { trackid: u8, offset: u32 },
    Tempo(u16),
    Timebase(u16),
}

pub struct Track {
    /// Unique per-spawn identity assigned by the controller, distinct
    /// from `trackid` (the bytecode's `OpenTrack` operand, which is not
    /// unique: the same id can be reused by later `OpenTrack` commands,
    /// or be live on two tracks at once). The controller stages/removes
    /// tracks by this, never by `trackid` (§3, §4.9).
    pub slot: u64,
    pub trackid: u8,
    pub pc: u32,
    delay_timer: u32,
    callstack: Vec<u32>,
    slides: Vec<Slide>,
    pub volume: f32,
    pub pitch: f32,
    pub reverb: f32,
    pub pan: f32,
    bank_id: u32,
    prog_id: usize,
    voices: [Vec<VoiceHandle>; 7],
    loops: u32,
    loop_limit: i32,
    finished: bool,
}

impl Track {
    pub fn new(slot: u64, trackid: u8, pc: u32, loop_limit: i32) -> Track {
        Track {
            slot,
            trackid,
            pc,
            delay_timer: 0,
            callstack: Vec::new(),
            slides: Vec::new(),
            volume: 1.0,
            pitch: 0.0,
            reverb: 0.0,
            pan: 0.5,
            bank_id: 0,
            prog_id: 0,
            voices: std::array::from_fn(|_| Vec::new()),
            loops: 0,
            loop_limit,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// §4.8 gives the conversion for the s8/s16 encodings explicitly
    /// (`value/127`, `value/32767`); the u8 encoding is treated the same
    /// as s8 since it shares its byte width and the command set never
    /// uses the sign bit for this encoding.
    ///
    /// Note the divisor is 127/32767, not 128/32768 as the original
    /// engine uses. §8.4's scenario 4 (`96 00 80 08`) is phrased as
    /// reaching "volume = 1.0 exactly" at value 0x80 (128), which only
    /// holds under a `/128` divisor; under this `/127` divisor the slide
    /// lands at `128/127` instead (see `slide_reaches_target_exactly_at_duration`
    /// below). §4.8's literal divisor is followed here rather than
    /// silently switching to `/128` to match the scenario text; see
    /// DESIGN.md's Open Questions for the full writeup.
    fn normalize(value: PerfValue) -> f32 {
        match value {
            PerfValue::U8(v) => v as f32 / 127.0,
            PerfValue::S8(v) => v as f32 / 127.0,
            PerfValue::S16(v) => v as f32 / 32767.0,
        }
    }

    fn param_mut(&mut self, param: SlideParam) -> &mut f32 {
        match param {
            SlideParam::Volume => &mut self.volume,
            SlideParam::Pitch => &mut self.pitch,
            SlideParam::Reverb => &mut self.reverb,
            SlideParam::Pan => &mut self.pan,
        }
    }

    /// Runs one controller tick for this track: decodes and dispatches
    /// commands until a `Wait` (or end/error), advances slides, then
    /// mixes `samples_per_tick` mono samples from active notes (§4.8).
    pub fn tick(
        &mut self,
        seqdata: &[u8],
        audio: &mut AudioSystem,
        samples_per_tick: u32,
        requests: &mut Vec<ControlRequest>,
        status: &mut dyn StatusSink,
    ) -> Vec<f32> {
        if self.finished {
            return vec![0.0; samples_per_tick as usize];
        }

        while self.delay_timer == 0 && !self.finished {
            match sequencer::read(seqdata, self.pc) {
                Err(bad) => {
                    let opcode = seqdata.get(self.pc as usize).copied().unwrap_or(0);
                    let err = match bad {
                        BadKind::Eof => EngineError::SequencerEof(self.pc),
                        BadKind::InvalidOpcode => EngineError::InvalidOpcode(opcode, self.pc),
                        BadKind::InvalidData => EngineError::InvalidOperandData(opcode, self.pc),
                    };
                    status.warn(&format!("track {}: {err}", self.trackid));
                    self.finished = true;
                    break;
                }
                Ok((cmd, len)) => {
                    self.pc += len;
                    self.dispatch(cmd, audio, requests, status);
                }
            }
        }

        self.advance_slides();
        let mixed = self.mix(audio, samples_per_tick);
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }
        mixed
    }

    fn dispatch(&mut self, cmd: Command, audio: &mut AudioSystem, requests: &mut Vec<ControlRequest>, status: &mut dyn StatusSink) {
        match cmd {
            Command::OpenTrack { trackid, offset } => {
                requests.push(ControlRequest::OpenTrack { trackid, offset });
            }
            Command::Tempo { value } => requests.push(ControlRequest::Tempo(value)),
            Command::Timebase { value } => requests.push(ControlRequest::Timebase(value)),
            Command::SetParam { param, value } => match param {
                0x20 => self.bank_id = value as u32,
                0x21 => self.prog_id = value as usize,
                _ => {}
            },
            Command::SetPerf { perf, value, duration } => {
                let target = Self::normalize(value);
                let slide_param: SlideParam = perf.into();
                match duration {
                    None | Some(0) => {
                        *self.param_mut(slide_param) = target;
                        self.slides.retain(|s| s.param != slide_param);
                    }
                    Some(duration) => {
                        let start = *self.param_mut(slide_param);
                        self.slides.retain(|s| s.param != slide_param);
                        self.slides.push(Slide { param: slide_param, start, end: target, duration: duration as u32, t: 0 });
                    }
                }
            }
            Command::TrackEnd => self.finished = true,
            Command::Jump { target, call } => {
                if call {
                    self.callstack.push(self.pc);
                    self.pc = target;
                } else {
                    self.pc = target;
                    self.loops += 1;
                    if self.loop_limit > 0 && self.loops >= self.loop_limit as u32 {
                        self.finished = true;
                    }
                }
            }
            // JumpF: condition byte is preserved in the command record
            // but never evaluated (§9); the branch is always taken.
            Command::JumpF { target, call, .. } => {
                if call {
                    self.callstack.push(self.pc);
                    self.pc = target;
                } else {
                    self.pc = target;
                    self.loops += 1;
                    if self.loop_limit > 0 && self.loops >= self.loop_limit as u32 {
                        self.finished = true;
                    }
                }
            }
            Command::Return | Command::ReturnF => match self.callstack.pop() {
                Some(ret) => self.pc = ret,
                None => {
                    status.warn(&format!("track {}: {}", self.trackid, EngineError::CallstackUnderflow(self.trackid)));
                    self.finished = true;
                }
            },
            Command::NoteOn { note, voice, vel } => {
                if let Some(key_info) = audio.resolve(self.bank_id, self.prog_id, note, vel) {
                    if let Some(handle) = audio.start_note(self.bank_id, self.prog_id, key_info, note, vel) {
                        self.voices[voice as usize - 1].push(handle);
                    }
                }
            }
            Command::VoiceOff { voice } => {
                for handle in self.voices[voice as usize - 1].drain(..) {
                    audio.note_mut(handle).stop_now();
                }
            }
            Command::Wait { delay } => self.delay_timer = delay as u32,
            Command::Ignored => {}
        }
    }

    /// §4.8 step 2: for each slide, snap to `end` and drop once
    /// `t >= duration`; otherwise set the parameter to the interpolated
    /// value at the current `t` and advance `t`.
    fn advance_slides(&mut self) {
        let mut keep = Vec::with_capacity(self.slides.len());
        let mut writes = Vec::with_capacity(self.slides.len());
        for mut slide in self.slides.drain(..) {
            if slide.t >= slide.duration {
                writes.push((slide.param, slide.end));
            } else {
                let frac = slide.t as f32 / slide.duration as f32;
                writes.push((slide.param, slide.start + (slide.end - slide.start) * frac));
                slide.t += 1;
                keep.push(slide);
            }
        }
        for (param, value) in writes {
            *self.param_mut(param) = value;
        }
        self.slides = keep;
    }

    fn mix(&mut self, audio: &mut AudioSystem, samples_per_tick: u32) -> Vec<f32> {
        let output_samplerate = audio.output_samplerate();
        let mut buf = vec![0.0f32; samples_per_tick as usize];
        let pitch_adj = 2f32.powf(self.pitch * 6.0 / 12.0);

        for voices in self.voices.iter_mut() {
            voices.retain(|&handle| !audio.note(handle).is_finished());
        }

        let active: Vec<VoiceHandle> = self.voices.iter().flatten().copied().collect();
        for &handle in &active {
            let note = audio.note_mut(handle);
            note.pitch_adj = pitch_adj;
            for sample in buf.iter_mut() {
                *sample += note.tick(output_samplerate);
            }
        }

        for voices in self.voices.iter_mut() {
            voices.retain(|&handle| !audio.note(handle).is_finished());
        }

        for sample in buf.iter_mut() {
            *sample *= self.volume;
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aaf::Archive;
    use crate::error::{EngineError, Result};
    use crate::fs_provider::FileSystemProvider;
    use crate::status::RecordingStatus;

    struct EmptyFs;
    impl FileSystemProvider for EmptyFs {
        fn read_archive(&self) -> Result<Vec<u8>> {
            Err(EngineError::UnexpectedEof("unused"))
        }
        fn read_wave_file(&self, _aw_filename: &str) -> Result<Vec<u8>> {
            Err(EngineError::UnexpectedEof("unused"))
        }
    }

    fn empty_archive() -> Archive {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        Archive::load(&buf).unwrap()
    }

    #[test]
    fn track_end_marks_finished() {
        let fs = EmptyFs;
        let archive = empty_archive();
        let mut audio = AudioSystem::new(archive, &fs, 44100.0);
        let mut track = Track::new(0, 255, 0, 0);
        let seq = [0xFFu8];
        let mut requests = Vec::new();
        track.tick(&seq, &mut audio, 10, &mut requests, &mut RecordingStatus::default());
        assert!(track.is_finished());
    }

    #[test]
    fn wait_sets_delay_timer_and_stops_decode_loop() {
        let fs = EmptyFs;
        let archive = empty_archive();
        let mut audio = AudioSystem::new(archive, &fs, 44100.0);
        let mut track = Track::new(0, 255, 0, 0);
        let seq = [0x80, 0x05, 0xFF];
        let mut requests = Vec::new();
        track.tick(&seq, &mut audio, 10, &mut requests, &mut RecordingStatus::default());
        assert!(!track.is_finished());
        assert_eq!(track.pc, 2);
    }

    #[test]
    fn bad_opcode_retires_track_and_logs_it() {
        let fs = EmptyFs;
        let archive = empty_archive();
        let mut audio = AudioSystem::new(archive, &fs, 44100.0);
        let mut track = Track::new(0, 255, 0, 0);
        let seq = [0x90u8]; // not a valid opcode
        let mut requests = Vec::new();
        let mut status = RecordingStatus::default();
        track.tick(&seq, &mut audio, 10, &mut requests, &mut status);
        assert!(track.is_finished());
        assert!(status.lines.iter().any(|l| l.contains("invalid opcode")));
    }

    #[test]
    fn return_with_empty_callstack_retires_track_and_logs_it() {
        let fs = EmptyFs;
        let archive = empty_archive();
        let mut audio = AudioSystem::new(archive, &fs, 44100.0);
        let mut track = Track::new(0, 255, 0, 0);
        let seq = [0xC5u8]; // Return with nothing on the call stack
        let mut requests = Vec::new();
        let mut status = RecordingStatus::default();
        track.tick(&seq, &mut audio, 10, &mut requests, &mut status);
        assert!(track.is_finished());
        assert!(status.lines.iter().any(|l| l.contains("call stack underflow")));
    }

    #[test]
    fn open_track_is_requested_not_executed_inline() {
        let fs = EmptyFs;
        let archive = empty_archive();
        let mut audio = AudioSystem::new(archive, &fs, 44100.0);
        let mut track = Track::new(0, 255, 0, 0);
        let seq = [0xC1, 0x01, 0x00, 0x00, 0x0A, 0xFF];
        let mut requests = Vec::new();
        track.tick(&seq, &mut audio, 10, &mut requests, &mut RecordingStatus::default());
        assert_eq!(requests.len(), 1);
        match requests[0] {
            ControlRequest::OpenTrack { trackid: 1, offset: 0x0A } => {}
            _ => panic!("expected open track request"),
        }
    }

    #[test]
    fn slide_reaches_target_exactly_at_duration() {
        let fs = EmptyFs;
        let archive = empty_archive();
        let mut audio = AudioSystem::new(archive, &fs, 44100.0);
        let mut track = Track::new(0, 255, 0, 0);
        track.volume = 0.0;
        // 96 00 80 08: perf volume, value 0x80(u8)=128 -> target 128/127, duration 8.
        let seq = [0x96u8, 0x00, 0x80, 0x08, 0x80, 0x01, 0xFF];
        let mut requests = Vec::new();
        track.tick(&seq, &mut audio, 1, &mut requests, &mut RecordingStatus::default()); // dispatches SetPerf, hits Wait, runs 1st advance_slides (t 0->1)
        let target = 128.0f32 / 127.0;
        for _ in 0..6 {
            track.advance_slides(); // t 1->2 ... 6->7
        }
        assert!((track.volume - target * 6.0 / 8.0).abs() < 1e-3);
        track.advance_slides(); // t 7->8
        track.advance_slides(); // t == duration: snaps to end and drops
        assert!((track.volume - target).abs() < 1e-6);
        assert!(track.slides.is_empty());
    }
}
