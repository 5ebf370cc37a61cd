//! Audio system (§2, §4): owns the archive's bank/wavesystem caches and
//! a pool of reusable voices, and exposes the key/velocity resolution
//! path tracks use to start a note.

use crate::aaf::Archive;
use crate::fs_provider::FileSystemProvider;
use crate::ibnk::KeyInfo;
use crate::voice::Note;
use crate::wsys::WaveKey;

/// Index into the voice pool. Stable for the lifetime of the note;
/// becomes eligible for reuse once the slot reports `finished`.
pub type VoiceHandle = usize;

pub struct AudioSystem<'fs> {
    archive: Archive,
    fs: &'fs dyn FileSystemProvider,
    pool: Vec<Note>,
    output_samplerate: f32,
}

impl<'fs> AudioSystem<'fs> {
    pub fn new(archive: Archive, fs: &'fs dyn FileSystemProvider, output_samplerate: f32) -> AudioSystem<'fs> {
        AudioSystem { archive, fs, pool: Vec::new(), output_samplerate }
    }

    /// Resolves `(bank_id, key, vel)` to a `KeyInfo`, returning `None` on
    /// a missing bank or a resolution miss (§7: `VoiceResolveMiss` is a
    /// silent no-op for that `NoteOn`).
    pub fn resolve(&mut self, bank_id: u32, prog_id: usize, key: u8, vel: u8) -> Option<KeyInfo> {
        let bank = self.archive.load_bank(bank_id).ok()?;
        let instrument = bank.instrument(prog_id)?;
        instrument.resolve(key, vel)
    }

    /// Reuses a `finished` pool slot, or appends a fresh one (§5
    /// resource policy), and starts it playing the resolved key/wave.
    ///
    /// The instrument is looked up through `self.archive` (a `&mut`
    /// borrow); `load_wavesystem` right after needs another `&mut`
    /// borrow of the same `self.archive`, which the first borrow's
    /// reference would still be live across. So everything `Note::start`
    /// needs from the instrument is copied out (`osci`/`is_percussion`)
    /// before that second borrow, rather than holding `&BankInstrument`
    /// across it.
    pub fn start_note(&mut self, bank_id: u32, prog_id: usize, key_info: KeyInfo, key: u8, vel: u8) -> Option<VoiceHandle> {
        let (wsys_id, osci, is_percussion) = {
            let bank = self.archive.load_bank(bank_id).ok()?;
            let instrument = bank.instrument(prog_id)?;
            (bank.wsys_id, instrument.osci.clone(), instrument.is_percussion)
        };
        let wavesystem = self.archive.load_wavesystem(wsys_id, self.fs).ok()?;
        let wave = wavesystem.get(WaveKey::new(key_info.aw_id, key_info.wave_id))?;

        let slot = self.pool.iter().position(|n| n.is_finished());
        let idx = match slot {
            Some(i) => i,
            None => {
                self.pool.push(Note::idle(self.output_samplerate));
                self.pool.len() - 1
            }
        };
        self.pool[idx].start(wave, osci, is_percussion, key, vel, key_info.volume, key_info.pitch, self.output_samplerate);
        Some(idx)
    }

    pub fn note_mut(&mut self, handle: VoiceHandle) -> &mut Note {
        &mut self.pool[handle]
    }

    pub fn note(&self, handle: VoiceHandle) -> &Note {
        &self.pool[handle]
    }

    pub fn output_samplerate(&self) -> f32 {
        self.output_samplerate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, Result};

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
        buf.extend_from_slice(&0u32.to_be_bytes()); // chunktype END
        Archive::load(&buf).unwrap()
    }

    #[test]
    fn resolve_against_missing_bank_is_none() {
        let fs = EmptyFs;
        let archive = empty_archive();
        let mut audio = AudioSystem::new(archive, &fs, 44100.0);
        assert!(audio.resolve(7, 0, 60, 100).is_none());
    }
}
