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

    tests/common/mod.rs

    Common support routines for tests: in-memory output buffers, delta
    synthesis from MFM words, and one-track decode drivers.
*/
#![allow(dead_code)]

use mfmfox::decoder::{init_sector_status_list, SectorStatus};
use mfmfox::{decode_track, DiskCh, DriveParams, MfmError, SliceDeltas, TrackAggregator, SAMPLE_RATE_HZ};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A clonable in-memory file, so output buffers can be inspected after the
/// aggregator takes ownership of the writer half.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedBuf {
    pub fn new() -> Self {
        SharedBuf::default()
    }

    pub fn with_contents(bytes: Vec<u8>) -> Self {
        SharedBuf(Arc::new(Mutex::new(Cursor::new(bytes))))
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().get_ref().clone()
    }
}

impl Read for SharedBuf {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().read(buf)
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

impl Seek for SharedBuf {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.lock().unwrap().seek(pos)
    }
}

/// Render MFM words into transition deltas the way a 200 MHz capture of the
/// bit stream would produce them.
pub fn words_to_deltas(words: &[u32], clk_rate_hz: u32) -> Vec<u16> {
    let cell = (SAMPLE_RATE_HZ / clk_rate_hz) as u16;
    let mut deltas = vec![cell];
    let mut run = 0u16;
    for &word in words {
        for bit in (0..32).rev() {
            run += cell;
            if word >> bit & 1 != 0 {
                deltas.push(run);
                run = 0;
            }
        }
    }
    deltas
}

/// Decode one in-memory delta track, returning the OR'd status and the
/// per-sector results.
pub fn decode_deltas(
    params: &mut DriveParams,
    agg: &mut TrackAggregator,
    ch: DiskCh,
    deltas: &[u16],
) -> Result<(mfmfox::decoder::SectorFlags, Vec<SectorStatus>), MfmError> {
    let mut list = vec![SectorStatus::default(); mfmfox::MAX_SECTORS];
    init_sector_status_list(&mut list);
    let mut seek_difference = 0;
    let mut source = SliceDeltas::new(deltas);
    let status = decode_track(params, ch, &mut source, agg, &mut seek_difference, &mut list)?;
    Ok((status, list))
}

/// A sector image where every sector carries its own address pattern, so
/// misplaced writes are detectable.
pub fn patterned_image(num_cyl: u32, num_head: u32, num_sectors: u32, sector_size: usize) -> Vec<u8> {
    let mut image = vec![0u8; num_cyl as usize * num_head as usize * num_sectors as usize * sector_size];
    for c in 0..num_cyl {
        for h in 0..num_head {
            for s in 0..num_sectors {
                let block = ((c * num_head + h) * num_sectors + s) as usize;
                for (i, b) in image[block * sector_size..(block + 1) * sector_size].iter_mut().enumerate() {
                    *b = (block as u8)
                        .wrapping_mul(31)
                        .wrapping_add(i as u8)
                        .wrapping_mul(7)
                        .wrapping_add(s as u8);
                }
            }
        }
    }
    image
}
