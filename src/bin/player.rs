//! Realtime player CLI (§6): `player <seq-file>` loads the sibling
//! archive/wave files and plays the sequence through the audio sink.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use jaudio::{AudioSystem, Archive, Controller, DirFileSystemProvider, FileSystemProvider, MemorySink, StatusSink, TerminalStatus};

#[derive(Parser)]
#[command(name = "player", about = "Play a JAudio sequence through the audio sink")]
struct Args {
    /// Path to the sequence (.bms/.seq) file to play.
    seq_file: PathBuf,
}

const OUTPUT_SAMPLERATE: f32 = 44100.0;
const DEFAULT_TEMPO: u16 = 120;
const DEFAULT_TIMEBASE: u16 = 48;

fn run(args: Args, status: &mut dyn StatusSink) -> jaudio::Result<()> {
    let seqdata = std::fs::read(&args.seq_file)?;

    let archive_path = args.seq_file.with_extension("aaf");
    let waves_dir = args.seq_file.parent().unwrap_or_else(|| std::path::Path::new(".")).to_path_buf();
    let fs = DirFileSystemProvider::new(archive_path, waves_dir);
    let archive_bytes = fs.read_archive()?;
    let archive = Archive::load(&archive_bytes)?;

    let mut audio = AudioSystem::new(archive, &fs, OUTPUT_SAMPLERATE);
    let mut controller = Controller::new(OUTPUT_SAMPLERATE, DEFAULT_TEMPO, DEFAULT_TIMEBASE, 0);
    let mut sink = MemorySink::new(OUTPUT_SAMPLERATE);

    while controller.step(&seqdata, &mut audio, &mut sink, status)? {}

    status.info(&format!("played {} ticks, {} samples", controller.tick_count(), controller.samples_processed()));
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut status = TerminalStatus;
    match run(args, &mut status) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            status.error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
