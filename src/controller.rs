//! Controller (§4.9): owns tracks, computes samples-per-tick from
//! tempo/timebase, drives one tick across every track, and mixes stereo
//! output into the sink.

use crate::audio_system::AudioSystem;
use crate::error::Result;
use crate::sink::{to_interleaved_pcm, Sink};
use crate::status::StatusSink;
use crate::track::{ControlRequest, Track};

const ROOT_TRACK_ID: u8 = 255;

pub struct Controller {
    tracks: Vec<Track>,
    new_tracks: Vec<Track>,
    /// Slots (not bytecode `trackid`s) staged for removal at the start of
    /// the next tick. `trackid` is reusable and can be live on two tracks
    /// at once (`OpenTrack` may respawn it), so retirement must key off
    /// the controller-assigned `slot` instead (§3, §4.9).
    old_track_slots: Vec<u64>,
    next_slot: u64,
    tempo: u16,
    timebase: u16,
    samplerate: f32,
    tick_count: u64,
    samples_processed: u64,
    loop_limit: i32,
    pub volume: f32,
}

impl Controller {
    pub fn new(samplerate: f32, tempo: u16, timebase: u16, loop_limit: i32) -> Controller {
        Controller {
            tracks: vec![Track::new(0, ROOT_TRACK_ID, 0, loop_limit)],
            new_tracks: Vec::new(),
            old_track_slots: Vec::new(),
            next_slot: 1,
            tempo,
            timebase,
            samplerate,
            tick_count: 0,
            samples_processed: 0,
            loop_limit,
            volume: 1.0,
        }
    }

    pub fn samples_per_tick(&self) -> u32 {
        ((self.samplerate * 60.0) / (self.tempo as f32 * self.timebase as f32)).floor() as u32
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    /// Drives one controller tick. Returns `false` once no tracks
    /// remain (end of playback, §4.9 step 2).
    pub fn step(&mut self, seqdata: &[u8], audio: &mut AudioSystem, sink: &mut dyn Sink, status: &mut dyn StatusSink) -> Result<bool> {
        // Step 1: commit pending removes/adds staged on the previous tick.
        self.tracks.retain(|t| !self.old_track_slots.contains(&t.slot));
        self.old_track_slots.clear();
        self.tracks.append(&mut self.new_tracks);

        if self.tracks.is_empty() {
            return Ok(false);
        }

        let samples_per_tick = self.samples_per_tick();
        let mut left = vec![0.0f32; samples_per_tick as usize];
        let mut right = vec![0.0f32; samples_per_tick as usize];

        let mut requests = Vec::new();
        for track in self.tracks.iter_mut() {
            let mono = track.tick(seqdata, audio, samples_per_tick, &mut requests, status);
            let pan_l = (1.0 - track.pan).sqrt();
            let pan_r = track.pan.sqrt();
            for i in 0..samples_per_tick as usize {
                left[i] += mono[i] * pan_l * self.volume;
                right[i] += mono[i] * pan_r * self.volume;
            }
            if track.is_finished() {
                self.old_track_slots.push(track.slot);
            }
        }

        for request in requests {
            match request {
                ControlRequest::OpenTrack { trackid, offset } => {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    self.new_tracks.push(Track::new(slot, trackid, offset, self.loop_limit));
                }
                ControlRequest::Tempo(value) => self.tempo = value,
                ControlRequest::Timebase(value) => self.timebase = value,
            }
        }

        let frame = to_interleaved_pcm(&left, &right);
        sink.push_frames(&frame)?;

        self.tick_count += 1;
        self.samples_processed += samples_per_tick as u64;
        Ok(true)
    }
}
