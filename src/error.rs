use thiserror::Error;

/// Crate-wide error type. Every loader and runtime component funnels its
/// failures through this enum so callers can match on the error kinds laid
/// out by the format/decode/sequencer/resource taxonomy rather than on
/// opaque strings.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unexpected end of file while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("bad magic for {what}: expected {expected:?}, found {found:?}")]
    BadMagic {
        what: &'static str,
        expected: [u8; 4],
        found: [u8; 4],
    },

    #[error("mismatched counts for {what}: {a} != {b}")]
    MismatchedCounts { what: &'static str, a: u32, b: u32 },

    #[error("invalid value for {field}: {value}")]
    InvalidEnum { field: &'static str, value: u32 },

    #[error("ADPCM frame is malformed (data length {0} is not a multiple of 9)")]
    BadAdpcmFrame(usize),

    #[error("PCM16 sample data has odd length {0}")]
    OddPcm16Size(usize),

    #[error("sequencer hit end of buffer decoding opcode at offset {0:#x}")]
    SequencerEof(u32),

    #[error("invalid opcode {0:#04x} at offset {1:#x}")]
    InvalidOpcode(u8, u32),

    #[error("invalid operand data for opcode {0:#04x} at offset {1:#x}")]
    InvalidOperandData(u8, u32),

    #[error("call stack underflow on track {0}")]
    CallstackUnderflow(u8),

    #[error("key/velocity region lookup missed for key {key} vel {vel}")]
    VoiceResolveMiss { key: u8, vel: u8 },

    #[error("more than 128 {0} in a single instrument")]
    TooManyRegions(&'static str),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
