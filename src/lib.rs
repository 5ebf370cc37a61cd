//! Playback engine for the Nintendo GameCube/Wii JAudio sequenced-music
//! format: archive/bank/wavesystem decoders, a multi-track bytecode
//! sequencer, a sample-based voice engine, and a realtime mixer.

pub mod aaf;
pub mod audio_system;
pub mod binreader;
pub mod codec;
pub mod controller;
pub mod envelope;
pub mod error;
pub mod fs_provider;
pub mod ibnk;
pub mod sequencer;
pub mod sink;
pub mod status;
pub mod track;
pub mod voice;
pub mod wsys;

pub use aaf::Archive;
pub use audio_system::AudioSystem;
pub use controller::Controller;
pub use error::{EngineError, Result};
pub use fs_provider::{DirFileSystemProvider, FileSystemProvider};
pub use sink::{MemorySink, Sink};
pub use status::{RecordingStatus, StatusSink, TerminalStatus};
