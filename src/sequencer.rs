//! Bytecode sequencer parser (§4.7): decodes one opcode at a byte offset
//! into a tagged `Command`, per the re-architecture from a dynamic class
//! hierarchy called out in the design notes.

use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadKind {
    Eof,
    InvalidOpcode,
    InvalidData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfType {
    Volume,
    Pitch,
    Reverb,
    Pan,
}

impl PerfType {
    fn from_raw(v: u8) -> Option<PerfType> {
        match v {
            0 => Some(PerfType::Volume),
            1 => Some(PerfType::Pitch),
            2 => Some(PerfType::Reverb),
            3 => Some(PerfType::Pan),
            _ => None,
        }
    }
}

/// A slide-capable value's source encoding, preserved so the track layer
/// can normalize it the same way for both the immediate and slid cases
/// (§4.8: `value/127` for s8, `value/32767` for s16).
#[derive(Debug, Clone, Copy)]
pub enum PerfValue {
    U8(u8),
    S8(i8),
    S16(i16),
}

#[derive(Debug, Clone, Copy)]
pub enum Command {
    NoteOn { note: u8, voice: u8, vel: u8 },
    Wait { delay: u16 },
    VoiceOff { voice: u8 },
    SetPerf { perf: PerfType, value: PerfValue, duration: Option<u16> },
    SetParam { param: u8, value: u16 },
    OpenTrack { trackid: u8, offset: u32 },
    Jump { target: u32, call: bool },
    /// `cond` is preserved verbatim but never evaluated (§9: the source
    /// never evaluates it either; the branch is always taken here).
    JumpF { cond: u8, target: u32, call: bool },
    Return,
    ReturnF,
    Ignored,
    Timebase { value: u16 },
    Tempo { value: u16 },
    TrackEnd,
}

fn read_u24_be(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
}

fn need(buf: &[u8], pc: u32, len: u32) -> Result<(), BadKind> {
    if (pc as u64 + len as u64) > buf.len() as u64 {
        Err(BadKind::Eof)
    } else {
        Ok(())
    }
}

/// Decodes the command at `pc`. Returns the command and its encoded
/// length, or a `BadKind` describing why it could not be decoded (§4.7).
pub fn read(buf: &[u8], pc: u32) -> Result<(Command, u32), BadKind> {
    need(buf, pc, 1)?;
    let opcode = buf[pc as usize];
    let p = pc as usize;

    match opcode {
        0x00..=0x7F => {
            need(buf, pc, 3)?;
            let voice = buf[p + 1];
            let vel = buf[p + 2];
            if !(1..=7).contains(&voice) || vel > 127 {
                return Err(BadKind::InvalidData);
            }
            Ok((Command::NoteOn { note: opcode, voice, vel }, 3))
        }
        0x80 => {
            need(buf, pc, 2)?;
            Ok((Command::Wait { delay: buf[p + 1] as u16 }, 2))
        }
        0x81..=0x87 => {
            let voice = opcode & 0x7;
            if voice < 1 {
                return Err(BadKind::InvalidData);
            }
            Ok((Command::VoiceOff { voice }, 1))
        }
        0x88 => {
            need(buf, pc, 3)?;
            let delay = BigEndian::read_u16(&buf[p + 1..p + 3]);
            Ok((Command::Wait { delay }, 3))
        }
        0x94 | 0x98 | 0x9C => {
            need(buf, pc, 3)?;
            let Some(perf) = PerfType::from_raw(buf[p + 1]) else { return Err(BadKind::InvalidData) };
            let value = match opcode {
                0x94 => PerfValue::U8(buf[p + 2]),
                0x98 => PerfValue::S8(buf[p + 2] as i8),
                _ => {
                    need(buf, pc, 4)?;
                    PerfValue::S16(BigEndian::read_i16(&buf[p + 2..p + 4]))
                }
            };
            let len = if opcode == 0x9C { 4 } else { 3 };
            Ok((Command::SetPerf { perf, value, duration: None }, len))
        }
        0x96 | 0x9A | 0x9E => {
            let value_len: usize = if opcode == 0x9E { 2 } else { 1 };
            need(buf, pc, 2 + value_len as u32 + 1)?;
            let Some(perf) = PerfType::from_raw(buf[p + 1]) else { return Err(BadKind::InvalidData) };
            let (value, dur_pos) = if opcode == 0x9E {
                (PerfValue::S16(BigEndian::read_i16(&buf[p + 2..p + 4])), p + 4)
            } else if opcode == 0x96 {
                (PerfValue::U8(buf[p + 2]), p + 3)
            } else {
                (PerfValue::S8(buf[p + 2] as i8), p + 3)
            };
            let duration = buf[dur_pos] as u16;
            let len = (dur_pos - p + 1) as u32;
            Ok((Command::SetPerf { perf, value, duration: Some(duration) }, len))
        }
        0x97 | 0x9B | 0x9F => {
            let value_len: usize = if opcode == 0x9F { 2 } else { 1 };
            need(buf, pc, 2 + value_len as u32 + 2)?;
            let Some(perf) = PerfType::from_raw(buf[p + 1]) else { return Err(BadKind::InvalidData) };
            let (value, dur_pos) = if opcode == 0x9F {
                (PerfValue::S16(BigEndian::read_i16(&buf[p + 2..p + 4])), p + 4)
            } else if opcode == 0x97 {
                (PerfValue::U8(buf[p + 2]), p + 3)
            } else {
                (PerfValue::S8(buf[p + 2] as i8), p + 3)
            };
            let duration = BigEndian::read_u16(&buf[dur_pos..dur_pos + 2]);
            let len = (dur_pos - p + 2) as u32;
            Ok((Command::SetPerf { perf, value, duration: Some(duration) }, len))
        }
        0xA4 => {
            need(buf, pc, 3)?;
            Ok((Command::SetParam { param: buf[p + 1], value: buf[p + 2] as u16 }, 3))
        }
        0xAC => {
            need(buf, pc, 4)?;
            let value = BigEndian::read_u16(&buf[p + 2..p + 4]);
            Ok((Command::SetParam { param: buf[p + 1], value }, 4))
        }
        0xC1 => {
            need(buf, pc, 5)?;
            let trackid = buf[p + 1];
            let offset = read_u24_be(&buf[p + 2..p + 5]);
            Ok((Command::OpenTrack { trackid, offset }, 5))
        }
        0xC3 => {
            need(buf, pc, 4)?;
            Ok((Command::Jump { target: read_u24_be(&buf[p + 1..p + 4]), call: true }, 4))
        }
        0xC4 => {
            need(buf, pc, 5)?;
            let cond = buf[p + 1];
            let target = read_u24_be(&buf[p + 2..p + 5]);
            Ok((Command::JumpF { cond, target, call: true }, 5))
        }
        0xC5 => Ok((Command::Return, 1)),
        0xC6 => {
            need(buf, pc, 2)?;
            Ok((Command::ReturnF, 2))
        }
        0xC7 => {
            need(buf, pc, 4)?;
            Ok((Command::Jump { target: read_u24_be(&buf[p + 1..p + 4]), call: false }, 4))
        }
        0xC8 => {
            need(buf, pc, 5)?;
            let cond = buf[p + 1];
            let target = read_u24_be(&buf[p + 2..p + 5]);
            Ok((Command::JumpF { cond, target, call: false }, 5))
        }
        0xE6 | 0xE7 => {
            need(buf, pc, 3)?;
            Ok((Command::Ignored, 3))
        }
        0xF4 => {
            need(buf, pc, 2)?;
            Ok((Command::Ignored, 2))
        }
        0xFD => {
            need(buf, pc, 3)?;
            Ok((Command::Timebase { value: BigEndian::read_u16(&buf[p + 1..p + 3]) }, 3))
        }
        0xFE => {
            need(buf, pc, 3)?;
            Ok((Command::Tempo { value: BigEndian::read_u16(&buf[p + 1..p + 3]) }, 3))
        }
        0xFF => Ok((Command::TrackEnd, 1)),
        _ => Err(BadKind::InvalidOpcode),
    }
}

/// Renders one mnemonic line for the disassembler (§6), matching the
/// scenario in §8.1.
pub fn mnemonic(cmd: &Command) -> String {
    match cmd {
        Command::NoteOn { note, voice, vel } => format!("note on {note} voice={voice} vel={vel}"),
        Command::Wait { delay } => format!("wait {delay}"),
        Command::VoiceOff { voice } => format!("voice off {voice}"),
        Command::SetPerf { perf, value, duration } => {
            let value = match value {
                PerfValue::U8(v) => v.to_string(),
                PerfValue::S8(v) => v.to_string(),
                PerfValue::S16(v) => v.to_string(),
            };
            format!("set perf {perf:?} -> {value} over {} ticks", duration.unwrap_or(0))
        }
        Command::SetParam { param, value } => format!("set param {param:#04x} -> {value}"),
        Command::OpenTrack { trackid, offset } => format!("open track {trackid} @ {offset:06x}"),
        Command::Jump { target, call: true } => format!("call {target:06x}"),
        Command::Jump { target, call: false } => format!("jump {target:06x}"),
        Command::JumpF { target, call: true, .. } => format!("callf {target:06x}"),
        Command::JumpF { target, call: false, .. } => format!("jumpf {target:06x}"),
        Command::Return => "return".to_string(),
        Command::ReturnF => "returnf".to_string(),
        Command::Ignored => "ignored".to_string(),
        Command::Timebase { value } => format!("timebase {value}"),
        Command::Tempo { value } => format!("tempo {value}"),
        Command::TrackEnd => "track end".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_note_on() {
        let buf = [0x3C, 0x01, 0x40];
        let (cmd, len) = read(&buf, 0).unwrap();
        assert_eq!(len, 3);
        match cmd {
            Command::NoteOn { note, voice, vel } => {
                assert_eq!(note, 60);
                assert_eq!(voice, 1);
                assert_eq!(vel, 64);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn decodes_wait_then_track_end() {
        let buf = [0x80, 0x10, 0xFF];
        let (cmd, len) = read(&buf, 0).unwrap();
        assert_eq!(len, 2);
        assert!(matches!(cmd, Command::Wait { delay: 16 }));
        let (cmd2, len2) = read(&buf, 2).unwrap();
        assert_eq!(len2, 1);
        assert!(matches!(cmd2, Command::TrackEnd));
    }

    #[test]
    fn invalid_opcode_is_bad_cmd() {
        let buf = [0x90];
        assert_eq!(read(&buf, 0).unwrap_err(), BadKind::InvalidOpcode);
    }

    #[test]
    fn truncated_command_is_eof() {
        let buf = [0xC1, 0x01, 0x00];
        assert_eq!(read(&buf, 0).unwrap_err(), BadKind::Eof);
    }

    #[test]
    fn note_on_with_bad_voice_is_invalid_data() {
        let buf = [0x3C, 0x00, 0x40];
        assert_eq!(read(&buf, 0).unwrap_err(), BadKind::InvalidData);
    }

    #[test]
    fn disassembly_smoke() {
        // FE 00 78 C1 01 00 00 0A FF ... FF at offset 0x0A
        let mut buf = vec![0xFE, 0x00, 0x78, 0xC1, 0x01, 0x00, 0x00, 0x0A, 0xFF];
        buf.resize(10, 0);
        buf.push(0xFF);

        let (c0, l0) = read(&buf, 0).unwrap();
        assert!(matches!(c0, Command::Tempo { value: 120 }));
        assert_eq!(l0, 3);

        let (c1, l1) = read(&buf, 3).unwrap();
        match c1 {
            Command::OpenTrack { trackid: 1, offset: 0x0A } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(l1, 5);

        let (c2, l2) = read(&buf, 8).unwrap();
        assert!(matches!(c2, Command::TrackEnd));
        assert_eq!(l2, 1);
    }

    #[test]
    fn slide_perf_with_u8_duration() {
        // 96 00 80 08: perf type 0 (volume), value 0x80, duration 8.
        let buf = [0x96, 0x00, 0x80, 0x08];
        let (cmd, len) = read(&buf, 0).unwrap();
        assert_eq!(len, 4);
        match cmd {
            Command::SetPerf { perf: PerfType::Volume, value: PerfValue::U8(0x80), duration: Some(8) } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mnemonic(&cmd), "set perf Volume -> 128 over 8 ticks");
    }

    #[test]
    fn mnemonic_set_perf_without_duration_shows_zero_ticks() {
        let cmd = Command::SetPerf { perf: PerfType::Pan, value: PerfValue::S16(-100), duration: None };
        assert_eq!(mnemonic(&cmd), "set perf Pan -> -100 over 0 ticks");
    }
}
