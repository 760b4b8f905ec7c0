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

    src/file_io/emu.rs

    The EMU emulator bit-stream container. Each track is a marker word plus
    cylinder and head, followed by exactly track_data_size bytes of MFM clock
    and data bits packed into little-endian 32-bit words, bit 31 first. A
    track header of cylinder and head -1 with no data terminates the stream.
*/

use super::{read_string, read_u32, write_string, write_u32, HEADER_ID, TRACK_ID_VALUE};
use crate::chs::DiskCh;
use crate::io::{ReadSeek, Seek, SeekFrom, Write};
use crate::{MfmError, CLOCKS_TO_NS};
use binrw::{BinRead, BinWrite};
use bit_vec::BitVec;
use std::fs::File;
use std::path::Path;

/// File type 2, major version 2, minor version 2.
pub const EMU_FILE_VERSION: u32 = 0x02020200;

#[derive(Debug, BinRead, BinWrite)]
#[brw(little)]
struct EmuTrackHeader {
    marker: u32,
    cyl: i32,
    head: i32,
}

/// Information from an EMU file header.
#[derive(Clone, Debug, Default)]
pub struct EmuFileInfo {
    pub version: u32,
    pub file_header_size_bytes: u32,
    pub track_data_size_bytes: u32,
    pub track_header_size_bytes: u32,
    pub num_cyl: u32,
    pub num_head: u32,
    pub sample_rate_hz: u32,
    pub decode_cmdline: String,
    pub note: String,
    pub start_time_ns: u32,
}

/// One track of emulator bit data.
#[derive(Clone, Debug)]
pub struct EmuTrack {
    pub ch: DiskCh,
    pub words: Vec<u32>,
}

impl EmuTrack {
    /// View the track as a bit stream, first written bit first.
    pub fn bits(&self) -> BitVec {
        let bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_be_bytes()).collect();
        BitVec::from_bytes(&bytes)
    }
}

pub struct EmuReader<RS: ReadSeek> {
    inner: RS,
    pub info: EmuFileInfo,
}

impl EmuReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MfmError> {
        Self::new(File::open(path)?)
    }
}

impl<RS: ReadSeek> EmuReader<RS> {
    /// Read and validate the file header, leaving the cursor at the first
    /// track.
    pub fn new(mut inner: RS) -> Result<Self, MfmError> {
        let mut id = [0u8; 8];
        inner.read_exact(&mut id)?;
        if id != HEADER_ID {
            return Err(MfmError::BadMagic);
        }
        let version = read_u32(&mut inner)?;
        if version & 0xff00_0000 != EMU_FILE_VERSION & 0xff00_0000
            || version & 0x00ff_0000 > EMU_FILE_VERSION & 0x00ff_0000
        {
            return Err(MfmError::BadVersion(version));
        }
        let mut info = EmuFileInfo {
            version,
            file_header_size_bytes: read_u32(&mut inner)?,
            track_data_size_bytes: read_u32(&mut inner)?,
            track_header_size_bytes: read_u32(&mut inner)?,
            num_cyl: read_u32(&mut inner)?,
            num_head: read_u32(&mut inner)?,
            sample_rate_hz: read_u32(&mut inner)?,
            ..Default::default()
        };
        // These fields only exist in later versions.
        if version & 0xffff_0000 >= 0x0202_0000 {
            info.decode_cmdline = read_string(&mut inner)?;
            info.note = read_string(&mut inner)?;
        }
        if version & 0xffff_ff00 >= 0x0202_0200 {
            info.start_time_ns = read_u32(&mut inner)?;
        }
        // Ignore any remaining header bytes so minor revisions can add
        // fields and old programs still work.
        inner.seek(SeekFrom::Start(info.file_header_size_bytes as u64))?;
        Ok(EmuReader { inner, info })
    }

    /// Read the next track. None at the end-of-file marker.
    pub fn read_track(&mut self) -> Result<Option<EmuTrack>, MfmError> {
        let header = EmuTrackHeader::read(&mut self.inner)?;
        if header.marker != TRACK_ID_VALUE {
            return Err(MfmError::BadTrackMarker(header.marker));
        }
        if header.cyl == -1 && header.head == -1 {
            return Ok(None);
        }
        let mut bytes = vec![0u8; self.info.track_data_size_bytes as usize];
        self.inner.read_exact(&mut bytes)?;
        let words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Some(EmuTrack {
            ch: DiskCh::new(header.cyl as u32, header.head as u32),
            words,
        }))
    }

    /// Position at the track header for (cyl, head).
    pub fn seek_track(&mut self, ch: DiskCh) -> Result<(), MfmError> {
        if ch.h() >= self.info.num_head || ch.c() >= self.info.num_cyl {
            return Err(MfmError::SeekError);
        }
        let track_size = (self.info.track_data_size_bytes + self.info.track_header_size_bytes) as u64;
        let offset = ch.c() as u64 * track_size * self.info.num_head as u64
            + ch.h() as u64 * track_size
            + self.info.file_header_size_bytes as u64;
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read every track of one cylinder.
    pub fn read_cyl(&mut self, cyl: u32) -> Result<Vec<EmuTrack>, MfmError> {
        self.seek_track(DiskCh::new(cyl, 0))?;
        let mut tracks = Vec::with_capacity(self.info.num_head as usize);
        for _ in 0..self.info.num_head {
            match self.read_track()? {
                Some(track) => tracks.push(track),
                None => break,
            }
        }
        Ok(tracks)
    }

    /// Convert a track's bit words back into transition deltas, quoted in
    /// 200 MHz ticks. This feeds emulator images back through the decoder.
    /// The emu file clock rate need not be 200 MHz; delta times are
    /// accumulated against the real sample clock so the result matches what
    /// a capture would produce.
    pub fn read_track_deltas(&mut self) -> Result<Option<(DiskCh, Vec<u16>)>, MfmError> {
        let track = match self.read_track()? {
            Some(t) => t,
            None => return Ok(None),
        };
        let mut deltas = Vec::new();
        let mut bit_time = 0.0f64;
        let mut delta_time: u32 = 0;
        let ns_per_bit = 1e9 / self.info.sample_rate_hz as f64;
        for &word in &track.words {
            let mut w = word;
            for _ in 0..32 {
                let delta = (bit_time / CLOCKS_TO_NS as f64).round() as u32;
                delta_time += delta;
                bit_time += ns_per_bit - (delta * CLOCKS_TO_NS) as f64;
                if w & 0x8000_0000 != 0 {
                    deltas.push(delta_time.min(u16::MAX as u32) as u16);
                    delta_time = 0;
                }
                w <<= 1;
            }
        }
        Ok(Some((track.ch, deltas)))
    }
}

pub struct EmuWriter<W: Write + Seek> {
    inner: W,
    pub info: EmuFileInfo,
}

impl EmuWriter<File> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        num_cyl: u32,
        num_head: u32,
        cmdline: &str,
        note: &str,
        sample_rate_hz: u32,
        start_time_ns: u32,
        track_bytes: u32,
    ) -> Result<Self, MfmError> {
        let file = File::create(path)?;
        Self::new(file, num_cyl, num_head, cmdline, note, sample_rate_hz, start_time_ns, track_bytes)
    }
}

impl<W: Write + Seek> EmuWriter<W> {
    /// Write the file header. The stream is truncated to a fresh file's
    /// layout; tracks follow in order.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut inner: W,
        num_cyl: u32,
        num_head: u32,
        cmdline: &str,
        note: &str,
        sample_rate_hz: u32,
        start_time_ns: u32,
        track_bytes: u32,
    ) -> Result<Self, MfmError> {
        let header_size = 8 + 4 * 10 + super::string_len(cmdline) + super::string_len(note);

        inner.write_all(&HEADER_ID)?;
        write_u32(&mut inner, EMU_FILE_VERSION)?;
        write_u32(&mut inner, header_size)?;
        write_u32(&mut inner, track_bytes)?;
        // Offset of track data from start of track
        write_u32(&mut inner, 4 * 3)?;
        write_u32(&mut inner, num_cyl)?;
        write_u32(&mut inner, num_head)?;
        write_u32(&mut inner, sample_rate_hz)?;
        write_string(&mut inner, cmdline)?;
        write_string(&mut inner, note)?;
        write_u32(&mut inner, start_time_ns)?;

        debug_assert_eq!(inner.stream_position()?, header_size as u64);

        Ok(EmuWriter {
            inner,
            info: EmuFileInfo {
                version: EMU_FILE_VERSION,
                file_header_size_bytes: header_size,
                track_data_size_bytes: track_bytes,
                track_header_size_bytes: 12,
                num_cyl,
                num_head,
                sample_rate_hz,
                decode_cmdline: cmdline.to_string(),
                note: note.to_string(),
                start_time_ns,
            },
        })
    }

    /// Write one track, padding or truncating the words to the declared
    /// track size. The pad is a valid MFM pattern chosen so it doesn't put
    /// two one bits in a row.
    pub fn write_track(&mut self, ch: DiskCh, words: &[u32]) -> Result<(), MfmError> {
        self.write_track_header(ch.c() as i32, ch.h() as i32)?;
        self.write_track_data(words)
    }

    fn write_track_header(&mut self, cyl: i32, head: i32) -> Result<(), MfmError> {
        let header = EmuTrackHeader {
            marker: TRACK_ID_VALUE,
            cyl,
            head,
        };
        header.write(&mut self.inner)?;
        Ok(())
    }

    fn write_track_data(&mut self, words: &[u32]) -> Result<(), MfmError> {
        let track_words = self.info.track_data_size_bytes as usize / 4;
        let fill: u32 = if words.is_empty() || words[words.len() - 1] & 1 != 0 {
            0x5555_5555
        } else {
            0xaaaa_aaaa
        };
        let mut padded: Vec<u32> = Vec::with_capacity(track_words);
        padded.extend_from_slice(&words[..words.len().min(track_words)]);
        padded.resize(track_words, fill);
        let bytes: &[u8] = bytemuck::cast_slice(&padded);
        // cast_slice preserves native order; the format wants little-endian
        // words, so write explicitly on big-endian hosts.
        if cfg!(target_endian = "little") {
            self.inner.write_all(bytes)?;
        } else {
            for w in &padded {
                self.inner.write_all(&w.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Overwrite a previously written track in place.
    pub fn rewrite_track(&mut self, ch: DiskCh, words: &[u32]) -> Result<(), MfmError> {
        let track_size = (self.info.track_data_size_bytes + self.info.track_header_size_bytes) as u64;
        let offset = ch.c() as u64 * track_size * self.info.num_head as u64
            + ch.h() as u64 * track_size
            + self.info.file_header_size_bytes as u64;
        let pos = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.write_track(ch, words)?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Write the end-of-file marker and flush.
    pub fn close(mut self) -> Result<W, MfmError> {
        self.write_track_header(-1, -1)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Cursor;

    fn write_test_image(tracks: &[(DiskCh, Vec<u32>)]) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut writer = EmuWriter::new(cursor, 2, 2, "mfmfox --emu test.emu", "", 10_000_000, 0, 64).unwrap();
        for (ch, words) in tracks {
            writer.write_track(*ch, words).unwrap();
        }
        writer.close().unwrap().into_inner()
    }

    #[test]
    fn header_round_trips() {
        let bytes = write_test_image(&[]);
        let reader = EmuReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.info.num_cyl, 2);
        assert_eq!(reader.info.num_head, 2);
        assert_eq!(reader.info.sample_rate_hz, 10_000_000);
        assert_eq!(reader.info.track_data_size_bytes, 64);
        assert_eq!(reader.info.decode_cmdline, "mfmfox --emu test.emu");
    }

    #[test]
    fn tracks_round_trip_with_padding() {
        let words = vec![0x4489_5555u32, 0x5555_5555];
        let bytes = write_test_image(&[(DiskCh::new(0, 0), words.clone())]);
        let mut reader = EmuReader::new(Cursor::new(bytes)).unwrap();
        let track = reader.read_track().unwrap().unwrap();
        assert_eq!(track.ch, DiskCh::new(0, 0));
        assert_eq!(track.words.len(), 16);
        assert_eq!(&track.words[..2], &words[..]);
        // Last written word ended in a one bit: pad starts with a zero bit.
        assert_eq!(track.words[2], 0x5555_5555);
        // EOF marker.
        assert!(reader.read_track().unwrap().is_none());
    }

    #[test]
    fn seek_addresses_tracks() {
        let tracks = vec![
            (DiskCh::new(0, 0), vec![0x1111_1110u32]),
            (DiskCh::new(0, 1), vec![0x2222_2220u32]),
            (DiskCh::new(1, 0), vec![0x3333_3330u32]),
            (DiskCh::new(1, 1), vec![0x4444_4440u32]),
        ];
        let bytes = write_test_image(&tracks);
        let mut reader = EmuReader::new(Cursor::new(bytes)).unwrap();
        reader.seek_track(DiskCh::new(1, 0)).unwrap();
        let track = reader.read_track().unwrap().unwrap();
        assert_eq!(track.ch, DiskCh::new(1, 0));
        assert_eq!(track.words[0], 0x3333_3330);
        assert!(reader.seek_track(DiskCh::new(2, 0)).is_err());
    }

    #[test]
    fn byte_level_round_trip() {
        // Re-writing every track of a read image reproduces it byte for
        // byte.
        let tracks = vec![
            (DiskCh::new(0, 0), vec![0x4489_5555u32; 16]),
            (DiskCh::new(0, 1), vec![0xaaaa_aaaau32; 16]),
        ];
        let original = write_test_image(&tracks);

        let mut reader = EmuReader::new(Cursor::new(original.clone())).unwrap();
        let mut writer = EmuWriter::new(
            Cursor::new(Vec::new()),
            reader.info.num_cyl,
            reader.info.num_head,
            &reader.info.decode_cmdline,
            &reader.info.note,
            reader.info.sample_rate_hz,
            reader.info.start_time_ns,
            reader.info.track_data_size_bytes,
        )
        .unwrap();
        while let Some(track) = reader.read_track().unwrap() {
            writer.write_track(track.ch, &track.words).unwrap();
        }
        let rewritten = writer.close().unwrap().into_inner();
        assert_eq!(original, rewritten);
    }

    #[test]
    fn minor_version_extra_header_bytes_are_skipped() {
        let mut bytes = write_test_image(&[(DiskCh::new(0, 0), vec![0u32])]);
        // Splice two extra bytes into the header and bump the recorded
        // header size and minor version.
        let header_size = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        bytes.splice(header_size as usize..header_size as usize, [0xde, 0xad]);
        bytes[12..16].copy_from_slice(&(header_size + 2).to_le_bytes());
        bytes[8..12].copy_from_slice(&0x0202_0300u32.to_le_bytes());

        let mut reader = EmuReader::new(Cursor::new(bytes)).unwrap();
        let track = reader.read_track().unwrap().unwrap();
        assert_eq!(track.ch, DiskCh::new(0, 0));
    }

    #[test]
    fn higher_major_version_is_rejected() {
        let mut bytes = write_test_image(&[]);
        bytes[8..12].copy_from_slice(&0x0203_0000u32.to_le_bytes());
        assert!(matches!(EmuReader::new(Cursor::new(bytes)), Err(MfmError::BadVersion(_))));
    }

    #[test]
    fn track_bits_are_msb_first() {
        let track = EmuTrack {
            ch: DiskCh::new(0, 0),
            words: vec![0x8000_0001],
        };
        let bits = track.bits();
        assert!(bits[0]);
        assert!(!bits[1]);
        assert!(bits[31]);
    }
}
