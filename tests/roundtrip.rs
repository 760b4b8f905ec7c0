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

    tests/roundtrip.rs

    Encode -> MFM -> deltas -> decode round trips for the profiles with a
    track-layout template, plus PLL robustness and error-path scenarios.
*/

mod common;

use common::{decode_deltas, init, patterned_image, words_to_deltas, SharedBuf};
use mfmfox::check::crc64;
use mfmfox::decoder::SectorFlags;
use mfmfox::encoder::{encode_image, TrackEncoder};
use mfmfox::registry::{self, Controller};
use mfmfox::{DiskCh, DriveParams, EmuReader, EmuWriter, TrackAggregator};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

fn params_for(controller: Controller, num_cyl: u32, num_head: u32) -> DriveParams {
    let mut params = DriveParams::default();
    params.set_controller(controller);
    params.num_cyl = num_cyl;
    params.num_head = num_head;
    params
}

/// Encode one track of the image and decode it straight back.
fn one_track_roundtrip(controller: Controller, ch: DiskCh, num_cyl: u32, num_head: u32) {
    init();
    let mut params = params_for(controller, num_cyl, num_head);
    let image = patterned_image(num_cyl, num_head, params.num_sectors, params.sector_size);
    let mut cursor = Cursor::new(image.clone());

    let mut encoder = TrackEncoder::new(&params).unwrap();
    // Walk the heads in order so interleave state matches the track.
    let mut words = Vec::new();
    for c in 0..=ch.c() {
        for h in 0..num_head {
            let this = DiskCh::new(c, h);
            let w = encoder.encode_track(this, &mut cursor, None).unwrap();
            if this == ch {
                words = w;
                break;
            }
        }
    }
    assert!(!words.is_empty());
    let deltas = words_to_deltas(&words, params.clk_rate_hz());

    let extract = SharedBuf::with_contents(vec![0u8; image.len()]);
    let mut agg = TrackAggregator::new().with_extract(Box::new(extract.clone()));
    let (status, list) = decode_deltas(&mut params, &mut agg, ch, &deltas).unwrap();
    assert!(
        !status.unrecovered(),
        "{}: track {} status {:?}",
        controller,
        ch,
        status
    );
    let num_sectors = params.num_sectors as usize;
    for (i, s) in list[..num_sectors].iter().enumerate() {
        assert!(
            !s.status.unrecovered(),
            "{}: sector {} status {:?}",
            controller,
            i,
            s.status
        );
        assert_eq!(s.cyl, ch.c(), "{}: sector {} cyl", controller, i);
        assert_eq!(s.head, ch.h(), "{}: sector {} head", controller, i);
    }
    agg.finish(&mut params).unwrap();

    // The decoded track region must match the input image exactly.
    let track_bytes = num_sectors * params.sector_size;
    let offset = (ch.c() * num_head + ch.h()) as usize * track_bytes;
    assert_eq!(
        &extract.contents()[offset..offset + track_bytes],
        &image[offset..offset + track_bytes],
        "{}: extract mismatch",
        controller
    );
}

#[test]
fn wd_1006_track_roundtrip() {
    one_track_roundtrip(Controller::Wd1006, DiskCh::new(0, 0), 2, 2);
    one_track_roundtrip(Controller::Wd1006, DiskCh::new(1, 1), 2, 2);
}

#[test]
fn wd_3b1_track_roundtrip() {
    one_track_roundtrip(Controller::Wd3B1, DiskCh::new(1, 3), 2, 4);
}

#[test]
fn omti_5510_track_roundtrip() {
    one_track_roundtrip(Controller::Omti5510, DiskCh::new(0, 1), 1, 2);
}

#[test]
fn mvme320_track_roundtrip() {
    one_track_roundtrip(Controller::Mvme320, DiskCh::new(1, 0), 2, 1);
}

#[test]
fn seagate_st11m_track_roundtrip() {
    // Cylinder 0 is the controller's own area; user tracks start at 1.
    one_track_roundtrip(Controller::SeagateSt11m, DiskCh::new(1, 0), 3, 2);
    one_track_roundtrip(Controller::SeagateSt11m, DiskCh::new(2, 1), 3, 2);
}

#[test]
fn northstar_track_roundtrip() {
    one_track_roundtrip(Controller::NorthstarAdvantage, DiskCh::new(0, 0), 1, 1);
}

#[test]
fn cromemco_track_roundtrip() {
    one_track_roundtrip(Controller::Cromemco, DiskCh::new(2, 0), 3, 1);
}

/// Full image encode to EMU, then decode every track back out of the EMU
/// file: an all-zero WD_1006 disk of 17 cylinders, 4 heads, 17 sectors of
/// 512 bytes decodes with every sector OK and an extract equal to the input.
#[test]
fn empty_disk_encode_decode() {
    init();
    let mut params = params_for(Controller::Wd1006, 17, 4);
    let image = vec![0u8; 17 * 4 * 17 * 512];
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

    // Decode every track of the emulator file.
    let mut reader = EmuReader::new(Cursor::new(emu_buf.contents())).unwrap();
    let extract = SharedBuf::with_contents(vec![0xffu8; image.len()]);
    let mut agg = TrackAggregator::new().with_extract(Box::new(extract.clone()));
    let mut tracks = 0;
    while let Some((ch, deltas)) = reader.read_track_deltas().unwrap() {
        let (status, _) = decode_deltas(&mut params, &mut agg, ch, &deltas).unwrap();
        assert!(!status.unrecovered(), "track {} status {:?}", ch, status);
        tracks += 1;
    }
    assert_eq!(tracks, 68);
    agg.finish(&mut params).unwrap();
    assert_eq!(extract.contents(), image);
    assert_eq!(params.stats.num_good_sectors, 17 * 4 * 17);
    assert_eq!(params.stats.num_bad_header, 0);
    assert_eq!(params.stats.num_bad_data, 0);
}

/// PLL stability: up to 5% per-delta jitter still decodes every sector.
#[test]
fn jittered_deltas_decode_clean() {
    init();
    let mut params = params_for(Controller::Omti5510, 1, 1);
    let image = patterned_image(1, 1, params.num_sectors, params.sector_size);
    let mut cursor = Cursor::new(image.clone());
    let mut encoder = TrackEncoder::new(&params).unwrap();
    let words = encoder.encode_track(DiskCh::new(0, 0), &mut cursor, None).unwrap();

    let mut rng = StdRng::seed_from_u64(0x4489);
    let mut deltas = words_to_deltas(&words, params.clk_rate_hz());
    for d in deltas.iter_mut() {
        // Bit cell is 20 ticks; jitter within one tick is 5%.
        *d = (*d as i32 + rng.gen_range(-1..=1)).max(1) as u16;
    }

    let extract = SharedBuf::with_contents(vec![0u8; image.len()]);
    let mut agg = TrackAggregator::new().with_extract(Box::new(extract.clone()));
    let (status, _) = decode_deltas(&mut params, &mut agg, DiskCh::new(0, 0), &deltas).unwrap();
    assert!(!status.unrecovered(), "status {:?}", status);
    agg.finish(&mut params).unwrap();
    assert_eq!(extract.contents(), image);
}

/// A single missing transition damages at most one sector.
#[test]
fn lost_transition_damages_one_sector() {
    init();
    let mut params = params_for(Controller::Wd1006, 1, 1);
    let image = patterned_image(1, 1, params.num_sectors, params.sector_size);
    let mut cursor = Cursor::new(image);
    let mut encoder = TrackEncoder::new(&params).unwrap();
    let words = encoder.encode_track(DiskCh::new(0, 0), &mut cursor, None).unwrap();
    let mut deltas = words_to_deltas(&words, params.clk_rate_hz());

    // Merge two deltas mid-track: one transition lost inside some sector's
    // data area.
    let mid = deltas.len() / 2;
    let merged = deltas[mid] + deltas[mid + 1];
    deltas.remove(mid + 1);
    deltas[mid] = merged;

    let mut agg = TrackAggregator::new();
    let (_, list) = decode_deltas(&mut params, &mut agg, DiskCh::new(0, 0), &deltas).unwrap();
    let damaged = list[..params.num_sectors as usize]
        .iter()
        .filter(|s| s.status.unrecovered())
        .count();
    assert!(damaged <= 1, "{} sectors damaged", damaged);
}

/// A single flipped bit inside the payload is recovered by ECC and the
/// extract matches the original data.
#[test]
fn ecc_recovers_single_bit_flip() {
    init();
    let mut params = params_for(Controller::Omti5510, 1, 1);
    assert!(params.data_crc.ecc_max_span > 0);
    let image = patterned_image(1, 1, params.num_sectors, params.sector_size);
    let mut cursor = Cursor::new(image.clone());
    let mut encoder = TrackEncoder::new(&params).unwrap();
    let mut words = encoder.encode_track(DiskCh::new(0, 0), &mut cursor, None).unwrap();

    // Sector 0's payload starts at track byte 49 (gaps + header + data
    // mark); clear one set data cell there. Data cells are the even bit
    // positions of the word (bit 30, 28, ...).
    let word_ndx = 52 / 2;
    let mut flipped = false;
    'words: for w in words[word_ndx..word_ndx + 8].iter_mut() {
        for bit in (0..31).step_by(2).rev() {
            if *w >> bit & 1 != 0 {
                *w &= !(1u32 << bit);
                flipped = true;
                break 'words;
            }
        }
    }
    assert!(flipped);

    let deltas = words_to_deltas(&words, params.clk_rate_hz());
    let extract = SharedBuf::with_contents(vec![0u8; image.len()]);
    let mut agg = TrackAggregator::new().with_extract(Box::new(extract.clone()));
    let (_, list) = decode_deltas(&mut params, &mut agg, DiskCh::new(0, 0), &deltas).unwrap();

    let recovered: Vec<_> = list[..params.num_sectors as usize]
        .iter()
        .filter(|s| s.status.contains(SectorFlags::ECC_RECOVERED))
        .collect();
    assert_eq!(recovered.len(), 1, "expected one ECC-recovered sector");
    let span = recovered[0].ecc_span_corrected_data.max(recovered[0].ecc_span_corrected_header);
    assert!(span >= 1 && span <= params.data_crc.ecc_max_span, "span {}", span);
    for s in &list[..params.num_sectors as usize] {
        assert!(!s.status.unrecovered(), "status {:?}", s.status);
    }
    agg.finish(&mut params).unwrap();
    assert_eq!(extract.contents(), image);
}

/// A capture that started too late into the track cuts the last sector's
/// data short; the framer reports the begin time that would have caught it.
#[test]
fn late_capture_suggests_begin_time() {
    init();
    let mut params = params_for(Controller::Wd1006, 1, 1);
    let image = patterned_image(1, 1, params.num_sectors, params.sector_size);
    let mut cursor = Cursor::new(image);
    let mut encoder = TrackEncoder::new(&params).unwrap();
    let mut words = encoder.encode_track(DiskCh::new(0, 0), &mut cursor, None).unwrap();

    // Rotate the capture 150 words into the track: the revolution is full
    // length but sector 0's data area wraps past the end of the capture.
    words.rotate_left(150);
    let deltas = words_to_deltas(&words, params.clk_rate_hz());

    let mut agg = TrackAggregator::new();
    let (_, _) = decode_deltas(&mut params, &mut agg, DiskCh::new(0, 0), &deltas).unwrap();
    let suggested = params.suggested_begin_time_ns.expect("no begin_time suggestion");
    assert!(suggested > 0);
    assert_eq!(suggested % 1000, 0);
}

/// An assigned-alternate track records a mapping and the extract ends up
/// with the alternate's data at the bad track's location.
#[test]
fn seagate_alternate_track_fixes_extract() {
    init();
    let mut params = params_for(Controller::SeagateSt11m, 8, 1);
    let image = patterned_image(8, 1, params.num_sectors, params.sector_size);
    let track_bytes = params.num_sectors as usize * params.sector_size;

    // Real data lives at (6,0). Track (5,0) is assigned there: its headers
    // carry cylinder 6 with flag byte 0x04.
    let mut cursor = Cursor::new(image.clone());
    let mut encoder = TrackEncoder::new(&params).unwrap();
    let mut good_words = Vec::new();
    for c in 0..7 {
        let w = encoder.encode_track(DiskCh::new(c, 0), &mut cursor, None).unwrap();
        if c == 6 {
            good_words = w;
        }
    }

    let mut encoder = TrackEncoder::new(&params).unwrap();
    let mut cursor = Cursor::new(image.clone());
    let mut alt_track = Vec::new();
    let mut alt_syncs = Vec::new();
    for c in 0..7 {
        let (bytes, syncs) = encoder.layout_track(DiskCh::new(c, 0), &mut cursor, None).unwrap();
        if c == 6 {
            alt_track = bytes;
            alt_syncs = syncs;
        }
    }
    // Patch every header's flag byte to "assigned alternate" and redo its
    // check word.
    for k in 0..params.num_sectors as usize {
        let header_start = 19 + k * 575 + 10;
        alt_track[header_start + 5] = 0x04;
        let crc = crc64(&alt_track[header_start..header_start + 6], &params.header_crc);
        for (i, b) in crc.to_be_bytes()[4..8].iter().enumerate() {
            alt_track[header_start + 6 + i] = *b;
        }
    }
    let alt_words = mfmfox::codec::mfm::encode_track(&alt_track, &alt_syncs);

    let extract = SharedBuf::with_contents(vec![0u8; image.len()]);
    let mut agg = TrackAggregator::new().with_extract(Box::new(extract.clone()));

    // Decode the good track, then the redirected one.
    let good_deltas = words_to_deltas(&good_words, params.clk_rate_hz());
    let (status, _) = decode_deltas(&mut params, &mut agg, DiskCh::new(6, 0), &good_deltas).unwrap();
    assert!(!status.unrecovered());

    let alt_deltas = words_to_deltas(&alt_words, params.clk_rate_hz());
    let _ = decode_deltas(&mut params, &mut agg, DiskCh::new(5, 0), &alt_deltas).unwrap();
    assert_eq!(agg.alt_track_count(), 1);

    agg.finish(&mut params).unwrap();
    let contents = extract.contents();
    // The bad track's extent now holds the alternate's data.
    assert_eq!(
        &contents[5 * track_bytes..6 * track_bytes],
        &image[6 * track_bytes..7 * track_bytes]
    );
}

/// Every layout profile's registry entry is internally consistent with its
/// template.
#[test]
fn layout_profiles_match_write_geometry() {
    for controller in [
        Controller::Wd1006,
        Controller::Wd3B1,
        Controller::Omti5510,
        Controller::Mvme320,
        Controller::SeagateSt11m,
        Controller::Symbolics3640,
        Controller::NorthstarAdvantage,
        Controller::Cromemco,
    ] {
        let info = registry::info(controller);
        assert!(info.track_layout.is_some(), "{}", controller);
        let mut params = DriveParams::default();
        params.set_controller(controller);
        assert_eq!(params.num_sectors, info.write_num_sectors, "{}", controller);
        assert_eq!(params.sector_size, info.write_sector_size, "{}", controller);
    }
}
