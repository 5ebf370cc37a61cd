//! Big-endian integer/float/string decoding over a seekable byte source.
//!
//! Every binary format in this engine (AAF, WSYS, IBNK) is big-endian, the
//! opposite endianness of the teacher codebase's little-endian DSE chunks,
//! so all reads below go through `byteorder::BigEndian` explicitly rather
//! than relying on a default.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{EngineError, Result};

/// Peeks the next 4 bytes without advancing the cursor. Generalizes the
/// teacher's `peek_magic!` macro into a function usable from any module.
pub fn peek_magic<R: Read + Seek>(r: &mut R) -> Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|_| EngineError::UnexpectedEof("magic"))?;
    r.seek(SeekFrom::Current(-4))?;
    Ok(buf)
}

/// Reads and checks a 4-byte magic, consuming it on success.
pub fn expect_magic<R: Read + Seek>(r: &mut R, what: &'static str, expected: &[u8; 4]) -> Result<()> {
    let mut found = [0u8; 4];
    r.read_exact(&mut found).map_err(|_| EngineError::UnexpectedEof(what))?;
    if &found != expected {
        return Err(EngineError::BadMagic { what, expected: *expected, found });
    }
    Ok(())
}

pub fn read_u8<R: Read>(r: &mut R, what: &'static str) -> Result<u8> {
    r.read_u8().map_err(|_| EngineError::UnexpectedEof(what))
}

pub fn read_u16<R: Read>(r: &mut R, what: &'static str) -> Result<u16> {
    r.read_u16::<BigEndian>().map_err(|_| EngineError::UnexpectedEof(what))
}

pub fn read_u24<R: Read>(r: &mut R, what: &'static str) -> Result<u32> {
    r.read_u24::<BigEndian>().map_err(|_| EngineError::UnexpectedEof(what))
}

pub fn read_u32<R: Read>(r: &mut R, what: &'static str) -> Result<u32> {
    r.read_u32::<BigEndian>().map_err(|_| EngineError::UnexpectedEof(what))
}

pub fn read_i8<R: Read>(r: &mut R, what: &'static str) -> Result<i8> {
    r.read_i8().map_err(|_| EngineError::UnexpectedEof(what))
}

pub fn read_i16<R: Read>(r: &mut R, what: &'static str) -> Result<i16> {
    r.read_i16::<BigEndian>().map_err(|_| EngineError::UnexpectedEof(what))
}

pub fn read_f32<R: Read>(r: &mut R, what: &'static str) -> Result<f32> {
    r.read_f32::<BigEndian>().map_err(|_| EngineError::UnexpectedEof(what))
}

pub fn skip<R: Seek>(r: &mut R, n: i64) -> Result<()> {
    r.seek(SeekFrom::Current(n))?;
    Ok(())
}

pub fn seek_to<R: Seek>(r: &mut R, pos: u64) -> Result<()> {
    r.seek(SeekFrom::Start(pos))?;
    Ok(())
}

/// Reads a fixed-size, null-terminated ASCII string (WSYS's `aw_filename`
/// field, 0x70 bytes). Bytes after the first NUL are padding and are
/// discarded.
pub fn read_bounded_string<R: Read>(r: &mut R, len: usize, what: &'static str) -> Result<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|_| EngineError::UnexpectedEof(what))?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn peek_does_not_advance() {
        let mut c = Cursor::new(vec![0x57, 0x53, 0x59, 0x53, 0xAB]);
        assert_eq!(peek_magic(&mut c).unwrap(), *b"WSYS");
        assert_eq!(read_u8(&mut c, "tag").unwrap(), 0x57);
    }

    #[test]
    fn expect_magic_mismatch() {
        let mut c = Cursor::new(vec![0x00, 0x00, 0x00, 0x00]);
        assert!(expect_magic(&mut c, "thing", b"WSYS").is_err());
    }

    #[test]
    fn bounded_string_trims_at_null() {
        let mut data = vec![b'a', b'w', 0, 0xAA, 0xAA, 0xAA];
        let mut c = Cursor::new(&mut data);
        let s = read_bounded_string(&mut c, 6, "fname").unwrap();
        assert_eq!(s, "aw");
    }

    #[test]
    fn big_endian_u32() {
        let mut c = Cursor::new(vec![0x00, 0x00, 0x01, 0x00]);
        assert_eq!(read_u32(&mut c, "x").unwrap(), 256);
    }
}
