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

    src/file_io/tran.rs

    The TRAN transition-delta container. Deltas are counts of 200 MHz clocks
    between one bits, stored packed: a byte below 254 is a literal delta; 254
    prefixes a 16-bit little-endian value; 255 prefixes a 24-bit value. Every
    header and track record carries a trailing checksum computed with the
    suite's CRC over each byte of the record.
*/

use super::{read_string, read_u32, write_string, write_u32, CrcReader, CrcWriter, HEADER_ID};
use crate::chs::DiskCh;
use crate::io::{Read, ReadSeek, Seek, SeekFrom, Write};
use crate::{MfmError, SAMPLE_RATE_HZ};
use binrw::{BinRead, BinWrite};
use std::fs::File;
use std::path::Path;

/// File type 1, major version 2, minor version 2.
pub const TRAN_FILE_VERSION: u32 = 0x01020200;

/// Maximum packed bytes per track. For 60 RPS and a 10 MHz bit rate a track
/// holds about 166666 deltas; padded for future RLL rates.
pub const MAX_BYTE_DELTAS: usize = 400_000;

#[derive(Debug, BinRead, BinWrite)]
#[brw(little)]
struct TranTrackHeader {
    cyl: i32,
    head: i32,
    num_bytes: u32,
}

/// Information from a TRAN file header.
#[derive(Clone, Debug, Default)]
pub struct TranFileInfo {
    pub version: u32,
    pub file_header_size_bytes: u32,
    pub track_header_size_bytes: u32,
    pub num_cyl: u32,
    pub num_head: u32,
    pub sample_rate_hz: u32,
    pub decode_cmdline: String,
    pub note: String,
    pub start_time_ns: u32,
}

/// One track of transition deltas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaTrack {
    pub ch: DiskCh,
    pub deltas: Vec<u16>,
}

fn pack_deltas(deltas: &[u16]) -> Result<Vec<u8>, MfmError> {
    let mut out = Vec::with_capacity(deltas.len());
    for (i, &delta) in deltas.iter().enumerate() {
        if delta == 0 {
            log::warn!("writing 0 delta at {} of {}", i, deltas.len());
        }
        // Values matching a size indicator must be escaped too.
        if delta >= 254 {
            out.push(254);
            out.extend_from_slice(&delta.to_le_bytes());
        } else {
            out.push(delta as u8);
        }
        if out.len() > MAX_BYTE_DELTAS {
            return Err(MfmError::TrackTooLarge(out.len()));
        }
    }
    Ok(out)
}

fn unpack_deltas(bytes: &[u8]) -> Vec<u16> {
    let mut deltas = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let value: u32 = match bytes[i] {
            255 => {
                let v = bytes[i + 1] as u32 | (bytes[i + 2] as u32) << 8 | (bytes[i + 3] as u32) << 16;
                i += 4;
                v
            }
            254 => {
                let v = bytes[i + 1] as u32 | (bytes[i + 2] as u32) << 8;
                i += 3;
                v
            }
            b => {
                i += 1;
                b as u32
            }
        };
        deltas.push(value.min(u16::MAX as u32) as u16);
    }
    deltas
}

pub struct TranReader<RS: ReadSeek> {
    inner: CrcReader<RS>,
    pub info: TranFileInfo,
    first_track_pos: u64,
}

impl TranReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MfmError> {
        Self::new(File::open(path)?)
    }
}

impl<RS: ReadSeek> TranReader<RS> {
    pub fn new(inner: RS) -> Result<Self, MfmError> {
        let mut inner = CrcReader::new(inner);

        let mut id = [0u8; 8];
        inner.read_exact(&mut id)?;
        if id != HEADER_ID {
            return Err(MfmError::BadMagic);
        }
        let version = read_u32(&mut inner)?;
        if version & 0xff00_0000 != TRAN_FILE_VERSION & 0xff00_0000
            || version & 0x00ff_0000 > TRAN_FILE_VERSION & 0x00ff_0000
        {
            return Err(MfmError::BadVersion(version));
        }
        let mut info = TranFileInfo {
            version,
            file_header_size_bytes: read_u32(&mut inner)?,
            track_header_size_bytes: read_u32(&mut inner)?,
            num_cyl: read_u32(&mut inner)?,
            num_head: read_u32(&mut inner)?,
            sample_rate_hz: read_u32(&mut inner)?,
            ..Default::default()
        };
        if info.sample_rate_hz != SAMPLE_RATE_HZ {
            return Err(MfmError::ParameterError(format!(
                "only transitions with a sample rate of 200 MHz are supported, got {}",
                info.sample_rate_hz
            )));
        }
        info.decode_cmdline = read_string(&mut inner)?;
        // These fields only exist in later versions.
        if version & 0xffff_0000 >= 0x0102_0000 {
            info.note = read_string(&mut inner)?;
        }
        if version & 0xffff_ff00 >= 0x0102_0200 {
            info.start_time_ns = read_u32(&mut inner)?;
        }
        // Any remaining bytes beyond the 4-byte checksum belong to a newer
        // minor revision; read them into the checksum and ignore.
        let pos = inner.stream_position()?;
        let header_left = info.file_header_size_bytes as i64 - pos as i64;
        if header_left > 4 {
            let mut ignore = vec![0u8; (header_left - 4) as usize];
            inner.read_exact(&mut ignore)?;
        }
        // The CRC is computed big-endian so the final value isn't zero; the
        // computed value is compared against the stored word.
        let computed = inner.crc();
        let stored = read_u32(&mut inner)?;
        if computed != stored {
            return Err(MfmError::ChecksumMismatch { computed, stored });
        }

        let first_track_pos = info.file_header_size_bytes as u64;
        Ok(TranReader {
            inner,
            info,
            first_track_pos,
        })
    }

    /// Read the next track record. None at the end-of-file marker.
    pub fn read_track(&mut self) -> Result<Option<DeltaTrack>, MfmError> {
        self.inner.reset_crc();
        let header = TranTrackHeader::read(&mut self.inner)?;
        let mut result = None;
        if !(header.cyl == -1 && header.head == -1) {
            if header.num_bytes as usize > MAX_BYTE_DELTAS {
                return Err(MfmError::TrackTooLarge(header.num_bytes as usize));
            }
            let mut bytes = vec![0u8; header.num_bytes as usize];
            self.inner.read_exact(&mut bytes)?;
            result = Some(DeltaTrack {
                ch: DiskCh::new(header.cyl as u32, header.head as u32),
                deltas: unpack_deltas(&bytes),
            });
        }
        let computed = self.inner.crc();
        let stored = read_u32(&mut self.inner)?;
        if computed != stored {
            return Err(MfmError::ChecksumMismatch { computed, stored });
        }
        Ok(result)
    }

    /// Scan forward from the first track for (cyl, head). Track records are
    /// variable length so seeking is a walk.
    pub fn seek_track(&mut self, ch: DiskCh) -> Result<(), MfmError> {
        self.inner.seek(SeekFrom::Start(self.first_track_pos))?;
        loop {
            let header = TranTrackHeader::read(&mut self.inner)?;
            if header.cyl == -1 && header.head == -1 {
                log::debug!("unable to find cylinder {} head {}", ch.c(), ch.h());
                return Err(MfmError::SeekError);
            }
            if header.cyl as u32 == ch.c() && header.head as u32 == ch.h() {
                self.inner.seek(SeekFrom::Current(-(4 * 3)))?;
                return Ok(());
            }
            self.inner.seek(SeekFrom::Current(header.num_bytes as i64 + 4))?;
        }
    }
}

pub struct TranWriter<W: Write + Seek> {
    inner: CrcWriter<W>,
}

impl TranWriter<File> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        num_cyl: u32,
        num_head: u32,
        cmdline: &str,
        note: &str,
        start_time_ns: u32,
    ) -> Result<Self, MfmError> {
        Self::new(File::create(path)?, num_cyl, num_head, cmdline, note, start_time_ns)
    }
}

impl<W: Write + Seek> TranWriter<W> {
    pub fn new(
        inner: W,
        num_cyl: u32,
        num_head: u32,
        cmdline: &str,
        note: &str,
        start_time_ns: u32,
    ) -> Result<Self, MfmError> {
        let mut inner = CrcWriter::new(inner);
        let header_size = 8 + 4 * 10 + super::string_len(cmdline) + super::string_len(note);

        inner.write_all(&HEADER_ID)?;
        write_u32(&mut inner, TRAN_FILE_VERSION)?;
        write_u32(&mut inner, header_size)?;
        // Offset of track data from start of track
        write_u32(&mut inner, 4 * 3)?;
        write_u32(&mut inner, num_cyl)?;
        write_u32(&mut inner, num_head)?;
        write_u32(&mut inner, SAMPLE_RATE_HZ)?;
        write_string(&mut inner, cmdline)?;
        write_string(&mut inner, note)?;
        write_u32(&mut inner, start_time_ns)?;
        let checksum = inner.crc();
        write_u32(&mut inner, checksum)?;

        debug_assert_eq!(inner.stream_position()?, header_size as u64);
        Ok(TranWriter { inner })
    }

    /// Write one track record of deltas.
    pub fn write_track(&mut self, ch: DiskCh, deltas: &[u16]) -> Result<(), MfmError> {
        self.inner.reset_crc();
        let packed = pack_deltas(deltas)?;
        let header = TranTrackHeader {
            cyl: ch.c() as i32,
            head: ch.h() as i32,
            num_bytes: packed.len() as u32,
        };
        header.write(&mut self.inner)?;
        self.inner.write_all(&packed)?;
        let checksum = self.inner.crc();
        write_u32(&mut self.inner, checksum)?;
        Ok(())
    }

    /// Write the end-of-file marker and flush.
    pub fn close(mut self) -> Result<W, MfmError> {
        self.inner.reset_crc();
        let header = TranTrackHeader {
            cyl: -1,
            head: -1,
            num_bytes: 0,
        };
        header.write(&mut self.inner)?;
        let checksum = self.inner.crc();
        write_u32(&mut self.inner, checksum)?;
        self.inner.flush()?;
        Ok(self.inner.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Cursor;

    fn write_test_file(tracks: &[DeltaTrack]) -> Vec<u8> {
        let mut writer = TranWriter::new(Cursor::new(Vec::new()), 1, 1, "mfmfox --tran test.tran", "", 0).unwrap();
        for track in tracks {
            writer.write_track(track.ch, &track.deltas).unwrap();
        }
        writer.close().unwrap().into_inner()
    }

    #[test]
    fn packing_uses_escape_codes() {
        // 50 and 40 are literal bytes; 60000 needs the 254 escape with a
        // 16-bit little-endian value.
        let packed = pack_deltas(&[50, 40, 60000]).unwrap();
        assert_eq!(packed, vec![0x32, 0x28, 254, 0x60, 0xea]);
        assert_eq!(unpack_deltas(&packed), vec![50, 40, 60000]);
        // 254 and 255 themselves must be escaped.
        let packed = pack_deltas(&[254, 255, 253]).unwrap();
        assert_eq!(packed, vec![254, 254, 0, 254, 255, 0, 253]);
        assert_eq!(unpack_deltas(&packed), vec![254, 255, 253]);
    }

    #[test]
    fn unpack_handles_24_bit_values() {
        // Reader side tolerates the 255 escape even though 16-bit deltas
        // never need it.
        let deltas = unpack_deltas(&[255, 0x10, 0x27, 0x00, 42]);
        assert_eq!(deltas, vec![0x2710, 42]);
    }

    #[test]
    fn file_round_trips() {
        let track = DeltaTrack {
            ch: DiskCh::new(0, 0),
            deltas: vec![50, 40, 60000],
        };
        let bytes = write_test_file(&[track.clone()]);

        let mut reader = TranReader::new(Cursor::new(bytes.clone())).unwrap();
        assert_eq!(reader.info.sample_rate_hz, SAMPLE_RATE_HZ);
        let read_track = reader.read_track().unwrap().unwrap();
        assert_eq!(read_track, track);
        assert!(reader.read_track().unwrap().is_none());

        // Byte-for-byte round trip through read + rewrite.
        let mut reader = TranReader::new(Cursor::new(bytes.clone())).unwrap();
        let mut writer = TranWriter::new(
            Cursor::new(Vec::new()),
            reader.info.num_cyl,
            reader.info.num_head,
            &reader.info.decode_cmdline,
            &reader.info.note,
            reader.info.start_time_ns,
        )
        .unwrap();
        while let Some(t) = reader.read_track().unwrap() {
            writer.write_track(t.ch, &t.deltas).unwrap();
        }
        let rewritten = writer.close().unwrap().into_inner();
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn corrupt_track_detected() {
        let track = DeltaTrack {
            ch: DiskCh::new(0, 0),
            deltas: vec![50; 64],
        };
        let mut bytes = write_test_file(&[track]);
        // Flip a delta byte inside the first track record.
        let offset = bytes.len() - 30;
        bytes[offset] ^= 0xff;
        let mut reader = TranReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.read_track(), Err(MfmError::ChecksumMismatch { .. })));
    }

    #[test]
    fn seek_walks_records() {
        let tracks = vec![
            DeltaTrack {
                ch: DiskCh::new(0, 0),
                deltas: vec![50; 10],
            },
            DeltaTrack {
                ch: DiskCh::new(0, 1),
                deltas: vec![40; 20],
            },
            DeltaTrack {
                ch: DiskCh::new(1, 0),
                deltas: vec![44; 30],
            },
        ];
        let bytes = write_test_file(&tracks);
        let mut reader = TranReader::new(Cursor::new(bytes)).unwrap();
        reader.seek_track(DiskCh::new(1, 0)).unwrap();
        let t = reader.read_track().unwrap().unwrap();
        assert_eq!(t.ch, DiskCh::new(1, 0));
        assert_eq!(t.deltas.len(), 30);
        assert!(reader.seek_track(DiskCh::new(5, 0)).is_err());
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut bytes = write_test_file(&[]);
        bytes[0] = 0x00;
        assert!(matches!(TranReader::new(Cursor::new(bytes)), Err(MfmError::BadMagic)));
    }
}
