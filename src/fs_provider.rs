//! File-system provider collaborator (§6). Only the interface is
//! specified here: the archive loader and wavesystem decoder read raw
//! bytes through this trait rather than touching `std::fs` directly, so
//! that the core can be driven from any byte source (an embedded ROM
//! image, a network fetch, a test fixture) without change.

use crate::error::Result;

/// Supplies the raw `.aaf` archive and the `.aw` wave files it
/// references. A real frontend backs this with `std::fs`; tests back it
/// with an in-memory map.
pub trait FileSystemProvider {
    /// Reads the entire archive file into memory.
    fn read_archive(&self) -> Result<Vec<u8>>;

    /// Reads the entire contents of the external wave file named
    /// `aw_filename` (as found in a WSYS WINF group, §4.3) from the
    /// configured waves directory.
    fn read_wave_file(&self, aw_filename: &str) -> Result<Vec<u8>>;
}

/// Straightforward provider backed by two real filesystem paths: the
/// `.aaf` archive and the directory holding sibling `.aw` files.
pub struct DirFileSystemProvider {
    pub archive_path: std::path::PathBuf,
    pub waves_dir: std::path::PathBuf,
}

impl DirFileSystemProvider {
    pub fn new(archive_path: impl Into<std::path::PathBuf>, waves_dir: impl Into<std::path::PathBuf>) -> Self {
        DirFileSystemProvider { archive_path: archive_path.into(), waves_dir: waves_dir.into() }
    }
}

impl FileSystemProvider for DirFileSystemProvider {
    fn read_archive(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.archive_path)?)
    }

    fn read_wave_file(&self, aw_filename: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.waves_dir.join(aw_filename))?)
    }
}
