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

    tests/container.rs

    Cross-container flows: capturing encoded tracks into a TRAN file,
    decoding from it, and re-rendering an EMU image to transitions.
*/

mod common;

use common::{decode_deltas, init, patterned_image, words_to_deltas, SharedBuf};
use mfmfox::encoder::{encode_image, TrackEncoder};
use mfmfox::registry::Controller;
use mfmfox::{DiskCh, DriveParams, EmuReader, EmuWriter, TranReader, TranWriter, TrackAggregator};
use std::io::Cursor;

/// Encoded tracks written as a TRAN capture decode identically to the direct
/// path.
#[test]
fn tran_capture_decodes() {
    init();
    let mut params = DriveParams::default();
    params.set_controller(Controller::Omti5510);
    params.num_cyl = 1;
    params.num_head = 2;
    let image = patterned_image(1, 2, params.num_sectors, params.sector_size);
    let mut cursor = Cursor::new(image.clone());
    let mut encoder = TrackEncoder::new(&params).unwrap();

    let mut writer = TranWriter::new(Cursor::new(Vec::new()), 1, 2, "mfmfox --transitions_file t.tran", "", 0).unwrap();
    for h in 0..2 {
        let ch = DiskCh::new(0, h);
        let words = encoder.encode_track(ch, &mut cursor, None).unwrap();
        writer.write_track(ch, &words_to_deltas(&words, params.clk_rate_hz())).unwrap();
    }
    let bytes = writer.close().unwrap().into_inner();

    let mut reader = TranReader::new(Cursor::new(bytes)).unwrap();
    let extract = SharedBuf::with_contents(vec![0u8; image.len()]);
    let mut agg = TrackAggregator::new().with_extract(Box::new(extract.clone()));
    while let Some(track) = reader.read_track().unwrap() {
        let (status, _) = decode_deltas(&mut params, &mut agg, track.ch, &track.deltas).unwrap();
        assert!(!status.unrecovered(), "track {} status {:?}", track.ch, status);
    }
    agg.finish(&mut params).unwrap();
    assert_eq!(extract.contents(), image);
}

/// An EMU image re-renders to transitions that decode to the same sectors.
#[test]
fn emu_image_redecodes_through_deltas() {
    init();
    let mut params = DriveParams::default();
    params.set_controller(Controller::Wd3B1);
    params.num_cyl = 2;
    params.num_head = 2;
    let image = patterned_image(2, 2, params.num_sectors, params.sector_size);
    let mut image_cursor = Cursor::new(image.clone());

    let emu_buf = SharedBuf::new();
    let mut emu = EmuWriter::new(
        emu_buf.clone(),
        params.num_cyl,
        params.num_head,
        "mfmfox ext2emu",
        "",
        params.clk_rate_hz(),
        params.start_time_ns,
        params.emu_track_data_bytes() as u32,
    )
    .unwrap();
    encode_image(&params, &mut image_cursor, None, &mut emu).unwrap();
    emu.close().unwrap();

    let mut reader = EmuReader::new(Cursor::new(emu_buf.contents())).unwrap();
    assert_eq!(reader.info.num_cyl, 2);
    let extract = SharedBuf::with_contents(vec![0u8; image.len()]);
    let mut agg = TrackAggregator::new().with_extract(Box::new(extract.clone()));
    while let Some((ch, deltas)) = reader.read_track_deltas().unwrap() {
        let (status, _) = decode_deltas(&mut params, &mut agg, ch, &deltas).unwrap();
        assert!(!status.unrecovered(), "track {} status {:?}", ch, status);
    }
    agg.finish(&mut params).unwrap();
    assert_eq!(extract.contents(), image);
}

/// The decoder's raw-word sink reproduces an emulator track from deltas: a
/// decode with an EMU output writes tracks of the declared size with the
/// expected marker structure.
#[test]
fn decode_writes_emu_output() {
    init();
    let mut params = DriveParams::default();
    params.set_controller(Controller::Wd1006);
    params.num_cyl = 1;
    params.num_head = 1;
    let image = patterned_image(1, 1, params.num_sectors, params.sector_size);
    let mut cursor = Cursor::new(image);
    let mut encoder = TrackEncoder::new(&params).unwrap();
    let words = encoder.encode_track(DiskCh::new(0, 0), &mut cursor, None).unwrap();
    let deltas = words_to_deltas(&words, params.clk_rate_hz());

    let emu_buf = SharedBuf::new();
    let emu = EmuWriter::new(
        Box::new(emu_buf.clone()) as Box<dyn mfmfox::io::WriteSeek>,
        params.num_cyl,
        params.num_head,
        "mfmfox read",
        "",
        params.clk_rate_hz(),
        params.start_time_ns,
        params.emu_track_data_bytes() as u32,
    )
    .unwrap();
    let mut agg = TrackAggregator::new().with_emu(emu);
    let (status, _) = decode_deltas(&mut params, &mut agg, DiskCh::new(0, 0), &deltas).unwrap();
    assert!(!status.unrecovered());
    agg.finish(&mut params).unwrap();

    let mut reader = EmuReader::new(Cursor::new(emu_buf.contents())).unwrap();
    let track = reader.read_track().unwrap().expect("no track written");
    assert_eq!(track.ch, DiskCh::new(0, 0));
    assert_eq!(track.words.len() * 4, params.emu_track_data_bytes());
    // The re-read emulator track decodes cleanly again.
    let mut reader2 = EmuReader::new(Cursor::new(emu_buf.contents())).unwrap();
    let (ch, redeltas) = reader2.read_track_deltas().unwrap().unwrap();
    let mut agg2 = TrackAggregator::new();
    let (status2, _) = decode_deltas(&mut params, &mut agg2, ch, &redeltas).unwrap();
    assert!(!status2.unrecovered(), "redecode status {:?}", status2);
    assert!(reader.read_track().unwrap().is_none());
}
