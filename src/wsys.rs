//! Wavesystem (WSYS): maps `(aw_id, wave_id)` pairs to decoded `Wave`
//! metadata plus sample buffers, backed by external `.aw` sample files
//! (§4.3).

use std::io::{Cursor, Read, Seek};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::binreader::*;
use crate::codec::{self, WaveFormat};
use crate::error::{EngineError, Result};
use crate::fs_provider::FileSystemProvider;

/// `(aw_id, wave_id)` pair, totally ordered by `(aw_id, wave_id)` via the
/// derived field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaveKey {
    pub aw_id: u16,
    pub wave_id: u16,
}

impl WaveKey {
    pub fn new(aw_id: u16, wave_id: u16) -> WaveKey {
        WaveKey { aw_id, wave_id }
    }
}

/// Decoded, immutable sample. Never mutated after construction; notes
/// hold only a borrowed reference, valid for the lifetime of the
/// wavesystem cache entry that owns it (see the ownership invariants in
/// §3).
#[derive(Debug, Clone)]
pub struct Wave {
    pub format: WaveFormat,
    pub base_key: u8,
    pub sample_rate: f32,
    pub looped: bool,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sample_count: u32,
    pub aw_id: u16,
    pub wave_id: u16,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Wavesystem {
    pub wsys_id: u32,
    waves: IndexMap<WaveKey, Rc<Wave>>,
}

impl Wavesystem {
    /// Shared-ownership handle to the wave, cheap to clone (bumps a
    /// refcount): notes hold this instead of a raw reference, which
    /// sidesteps tying a note's lifetime to the wavesystem cache's
    /// borrow while still forbidding the cache entry from being mutated
    /// out from under an active voice (§3 ownership invariants).
    pub fn get(&self, key: WaveKey) -> Option<Rc<Wave>> {
        self.waves.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WaveKey, &Wave)> {
        self.waves.iter()
    }
}

struct WinfWaveRecord {
    format: u8,
    base_key: u8,
    sample_rate: f32,
    wavedata_offset: u32,
    wavedata_size: u32,
    looped: bool,
    loop_start: u32,
    loop_end: u32,
    sample_count: u32,
}

fn read_winf_wave_record<R: Read + Seek>(r: &mut R) -> Result<WinfWaveRecord> {
    skip(r, 1)?;
    let format = read_u8(r, "wave format")?;
    let base_key = read_u8(r, "wave base_key")?;
    skip(r, 1)?;
    let sample_rate = read_f32(r, "wave sample_rate")?;
    let wavedata_offset = read_u32(r, "wavedata_offset")?;
    let wavedata_size = read_u32(r, "wavedata_size")?;
    let looped = read_u32(r, "loop flag")? != 0;
    let loop_start = read_u32(r, "loop_start")?;
    let loop_end = read_u32(r, "loop_end")?;
    let sample_count = read_u32(r, "sample_count")?;
    Ok(WinfWaveRecord {
        format,
        base_key,
        sample_rate,
        wavedata_offset,
        wavedata_size,
        looped,
        loop_start,
        loop_end,
        sample_count,
    })
}

/// Parses a WSYS chunk's bytes (already sliced out of the archive by the
/// AAF loader, §4.2) and decodes every referenced wave by reading its
/// external `.aw` file through `fs`.
pub fn parse_wsys(chunk: &[u8], fs: &dyn FileSystemProvider) -> Result<Wavesystem> {
    let mut r = Cursor::new(chunk);
    expect_magic(&mut r, "WSYS", b"WSYS")?;
    let _file_size = read_u32(&mut r, "WSYS file_size")?;
    let wsys_id = read_u32(&mut r, "WSYS wsys_id")?;
    skip(&mut r, 4)?;
    let winf_offset = read_u32(&mut r, "winf_offset")?;
    let wbct_offset = read_u32(&mut r, "wbct_offset")?;

    seek_to(&mut r, winf_offset as u64)?;
    expect_magic(&mut r, "WINF", b"WINF")?;
    let group_count = read_u32(&mut r, "WINF group_count")?;
    let mut group_offsets = Vec::with_capacity(group_count as usize);
    for _ in 0..group_count {
        group_offsets.push(read_u32(&mut r, "WINF group_offset")?);
    }

    seek_to(&mut r, wbct_offset as u64)?;
    expect_magic(&mut r, "WBCT", b"WBCT")?;
    skip(&mut r, 4)?;
    let scene_count = read_u32(&mut r, "WBCT scene_count")?;
    if scene_count != group_count {
        return Err(EngineError::MismatchedCounts { what: "WSYS scene/group count", a: scene_count, b: group_count });
    }
    let mut scene_offsets = Vec::with_capacity(scene_count as usize);
    for _ in 0..scene_count {
        scene_offsets.push(read_u32(&mut r, "WBCT scene_offset")?);
    }

    let mut waves = IndexMap::new();
    for (group_offset, scene_offset) in group_offsets.into_iter().zip(scene_offsets.into_iter()) {
        seek_to(&mut r, group_offset as u64)?;
        let aw_filename = read_bounded_string(&mut r, 0x70, "aw_filename")?;
        let wave_count = read_u32(&mut r, "WINF wave_count")?;
        let mut wave_offsets = Vec::with_capacity(wave_count as usize);
        for _ in 0..wave_count {
            wave_offsets.push(read_u32(&mut r, "WINF wave_offset")?);
        }

        seek_to(&mut r, scene_offset as u64)?;
        expect_magic(&mut r, "SCNE", b"SCNE")?;
        skip(&mut r, 8)?;
        let cdf_offset = read_u32(&mut r, "cdf_offset")?;
        seek_to(&mut r, cdf_offset as u64)?;
        expect_magic(&mut r, "C-DF", b"C-DF")?;
        let cdf_count = read_u32(&mut r, "C-DF cdf_count")?;
        if cdf_count != wave_count {
            return Err(EngineError::MismatchedCounts { what: "WSYS C-DF/wave count", a: cdf_count, b: wave_count });
        }
        let mut entry_offsets = Vec::with_capacity(cdf_count as usize);
        for _ in 0..cdf_count {
            entry_offsets.push(read_u32(&mut r, "C-DF entry_offset")?);
        }

        let aw_bytes = fs.read_wave_file(&aw_filename)?;
        let mut aw_cursor = Cursor::new(&aw_bytes);

        for (wave_offset, entry_offset) in wave_offsets.into_iter().zip(entry_offsets.into_iter()) {
            seek_to(&mut r, wave_offset as u64)?;
            let record = read_winf_wave_record(&mut r)?;

            seek_to(&mut r, entry_offset as u64)?;
            let aw_id = read_u16(&mut r, "C-DF aw_id")?;
            let wave_id = read_u16(&mut r, "C-DF wave_id")?;

            seek_to(&mut aw_cursor, record.wavedata_offset as u64)?;
            let mut raw = vec![0u8; record.wavedata_size as usize];
            aw_cursor.read_exact(&mut raw).map_err(|_| EngineError::UnexpectedEof("wave data"))?;
            let format = WaveFormat::from_byte(record.format)?;
            let data = codec::decode(format, &raw)?;

            waves.insert(
                WaveKey::new(aw_id, wave_id),
                Rc::new(Wave {
                    format,
                    base_key: record.base_key,
                    sample_rate: record.sample_rate,
                    looped: record.looped,
                    loop_start: record.loop_start,
                    loop_end: record.loop_end,
                    sample_count: record.sample_count,
                    aw_id,
                    wave_id,
                    data,
                }),
            );
        }
    }

    Ok(Wavesystem { wsys_id, waves })
}
