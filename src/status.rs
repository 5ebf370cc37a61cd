//! Terminal status printer collaborator (§6). Mirrors the teacher's use
//! of `colored` for human-facing warnings (`smdl/midi.rs`): informational
//! lines in the default color, warnings in yellow, errors in red. Only
//! the interface plus a stdout-backed implementation are provided; the
//! core never calls `println!` directly, it goes through `StatusSink` so
//! tests can capture output instead.
use colored::Colorize;

pub trait StatusSink {
    fn info(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

pub struct TerminalStatus;

impl StatusSink for TerminalStatus {
    fn info(&mut self, message: &str) {
        println!("{message}");
    }

    fn warn(&mut self, message: &str) {
        println!("{}{}", "warning: ".yellow(), message);
    }

    fn error(&mut self, message: &str) {
        eprintln!("{}{}", "error: ".red(), message);
    }
}

/// Captures lines instead of printing, for tests.
#[derive(Default)]
pub struct RecordingStatus {
    pub lines: Vec<String>,
}

impl StatusSink for RecordingStatus {
    fn info(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }

    fn warn(&mut self, message: &str) {
        self.lines.push(format!("warning: {message}"));
    }

    fn error(&mut self, message: &str) {
        self.lines.push(format!("error: {message}"));
    }
}
