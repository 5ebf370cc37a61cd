//! Sequence disassembler CLI (§6): `disassembler <seq-file>` prints
//! `offset | hex bytes | mnemonic` lines until the first bad command.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use jaudio::sequencer::{self, mnemonic};
use jaudio::StatusSink;
use jaudio::TerminalStatus;

#[derive(Parser)]
#[command(name = "disassembler", about = "Disassemble a JAudio sequence")]
struct Args {
    /// Path to the sequence (.bms/.seq) file to disassemble.
    seq_file: PathBuf,
}

fn disassemble(buf: &[u8], status: &mut dyn StatusSink) {
    let mut pc = 0u32;
    loop {
        match sequencer::read(buf, pc) {
            Ok((cmd, len)) => {
                let bytes = &buf[pc as usize..(pc + len) as usize];
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                status.info(&format!("{pc:06x} | {} | {}", hex.join(" "), mnemonic(&cmd)));
                let ends = matches!(cmd, jaudio::sequencer::Command::TrackEnd);
                pc += len;
                if ends {
                    break;
                }
            }
            Err(_bad) => break,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut status = TerminalStatus;
    match std::fs::read(&args.seq_file) {
        Ok(buf) => {
            disassemble(&buf, &mut status);
            ExitCode::SUCCESS
        }
        Err(e) => {
            status.error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
