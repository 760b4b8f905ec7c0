/*
    mfmfox
    https://github.com/dbalsom/mfmfox

    Copyright 2024-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! The TRAN (transition delta) and EMU (emulator bit-stream) container
//! formats. Both are little-endian, headered, append-only when writing and
//! random-access when reading. Readers tolerate unknown trailing bytes in
//! file and track headers as long as the major version matches; minor
//! version bumps add fields at the end.

pub mod emu;
pub mod tran;

pub use emu::{EmuFileInfo, EmuReader, EmuTrack, EmuWriter};
pub use tran::{DeltaTrack, TranFileInfo, TranReader, TranWriter};

use crate::check::{crc64, CrcInfo};
use crate::io::{Read, Seek, SeekFrom, Write};

/// File id string shared by both container formats.
pub const HEADER_ID: [u8; 8] = [0xee, 0x4d, 0x46, 0x4d, 0x0d, 0x0a, 0x1a, 0x00];

/// Marker word preceding each EMU track header.
pub const TRACK_ID_VALUE: u32 = 0x12345678;

/// Checksum parameters for TRAN headers and track records.
pub const TRAN_CRC: CrcInfo = CrcInfo::new(0xffffffff, 0x140a0445, 32, 0);

/// Reader wrapper accumulating the TRAN record checksum over every byte
/// read. Reset at each record boundary.
pub struct CrcReader<R> {
    pub inner: R,
    crc: CrcInfo,
}

impl<R> CrcReader<R> {
    pub fn new(inner: R) -> Self {
        CrcReader { inner, crc: TRAN_CRC }
    }

    pub fn reset_crc(&mut self) {
        self.crc = TRAN_CRC;
    }

    pub fn crc(&self) -> u32 {
        self.crc.init_value as u32
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.crc.init_value = crc64(&buf[..n], &self.crc);
        Ok(n)
    }
}

impl<R: Seek> Seek for CrcReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Writer wrapper accumulating the TRAN record checksum over every byte
/// written.
pub struct CrcWriter<W> {
    pub inner: W,
    crc: CrcInfo,
}

impl<W> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        CrcWriter { inner, crc: TRAN_CRC }
    }

    pub fn reset_crc(&mut self) {
        self.crc = TRAN_CRC;
    }

    pub fn crc(&self) -> u32 {
        self.crc.init_value as u32
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc.init_value = crc64(&buf[..n], &self.crc);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for CrcWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Read a length-prefixed, zero-terminated string field.
pub(crate) fn read_string<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write a length-prefixed string including the terminating zero.
pub(crate) fn write_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    write_u32(w, s.len() as u32 + 1)?;
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])
}

/// Bytes of string content on disk, including the terminating zero. The
/// length prefix is counted among the header's fixed words.
pub(crate) fn string_len(s: &str) -> u32 {
    s.len() as u32 + 1
}
