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

    tests/analyze.rs

    Format analyzer tests: model identification, polynomial search, and the
    ambiguous-CRC guard.
*/

mod common;

use common::{decode_deltas, init, patterned_image, words_to_deltas};
use mfmfox::analyzer::{analyze_format, analyze_headers, analyze_sectors, FnReader};
use mfmfox::decoder::SectorFlags;
use mfmfox::encoder::TrackEncoder;
use mfmfox::registry::Controller;
use mfmfox::{DiskCh, DriveParams, MfmError, TrackAggregator};
use std::collections::HashMap;
use std::io::Cursor;

/// Encode a whole image for one profile and serve its tracks from memory.
fn encoded_disk(controller: Controller, num_cyl: u32, num_head: u32, image: &[u8]) -> HashMap<DiskCh, Vec<u16>> {
    let mut params = DriveParams::default();
    params.set_controller(controller);
    params.num_cyl = num_cyl;
    params.num_head = num_head;
    let mut cursor = Cursor::new(image.to_vec());
    let mut encoder = TrackEncoder::new(&params).unwrap();
    let mut tracks = HashMap::new();
    for c in 0..num_cyl {
        for h in 0..num_head {
            let ch = DiskCh::new(c, h);
            let words = encoder.encode_track(ch, &mut cursor, None).unwrap();
            tracks.insert(ch, words_to_deltas(&words, params.clk_rate_hz()));
        }
    }
    tracks
}

fn reader_for(tracks: HashMap<DiskCh, Vec<u16>>) -> FnReader<impl FnMut(DiskCh) -> Result<Vec<u16>, MfmError>> {
    FnReader(move |ch| tracks.get(&ch).cloned().ok_or(MfmError::SeekError))
}

/// A model-profile disk analyzes to exactly that profile.
#[test]
fn model_profile_identified_uniquely() {
    init();
    // All-zero data: the 3640 format is identified by its header structure.
    let image = vec![0u8; 2 * 8 * 1160];
    let tracks = encoded_disk(Controller::Symbolics3640, 1, 2, &image);
    let mut reader = reader_for(tracks);

    let mut params = DriveParams::default();
    let matches = analyze_format(&mut params, &mut reader, 0, 0).unwrap();
    assert_eq!(matches, 1);
    assert_eq!(params.controller, Controller::Symbolics3640);
    assert_eq!(params.num_head, 2);
    assert_eq!(params.num_sectors, 8);
    assert_eq!(params.sector_size, 1160);
}

#[test]
fn northstar_identified_by_model_pass() {
    init();
    let image = patterned_image(1, 1, 16, 512);
    let tracks = encoded_disk(Controller::NorthstarAdvantage, 1, 1, &image);
    let mut reader = reader_for(tracks);

    let mut params = DriveParams::default();
    let matches = analyze_format(&mut params, &mut reader, 0, 0).unwrap();
    assert_eq!(matches, 1);
    assert_eq!(params.controller, Controller::NorthstarAdvantage);
    assert_eq!(params.num_sectors, 16);
    assert_eq!(params.first_sector_number, 0);
}

/// The polynomial search finds parameters that decode at least two thirds of
/// the track's sectors. Cylinder 0 head 0 is poor at separating look-alike
/// header layouts, so the search runs on cylinder 1 the way the full
/// analysis retry does.
#[test]
fn header_search_finds_decodable_parameters() {
    init();
    let image = patterned_image(2, 2, 17, 512);
    let tracks = encoded_disk(Controller::Omti5510, 2, 2, &image);
    let mut reader = reader_for(tracks.clone());

    let mut params = DriveParams::default();
    let formats = analyze_headers(&mut params, &mut reader, DiskCh::new(1, 1)).unwrap();
    assert!(formats >= 1, "no header parameters found");
    assert_eq!(params.header_crc.poly, 0x104c981);
    assert_eq!(params.header_crc.length, 32);
    assert_eq!(params.data_crc.poly, 0x104c981);
    assert_eq!(params.sector_size, 512);

    analyze_sectors(&mut params, &mut reader, 1).unwrap();
    assert_eq!(params.num_head, 2);
    assert_eq!(params.num_sectors, 17);
    assert_eq!(params.first_sector_number, 0);

    // Whatever profile the search picked must decode the disk mostly clean.
    let mut agg = TrackAggregator::new();
    let deltas = &tracks[&DiskCh::new(0, 0)];
    let (_, list) = decode_deltas(&mut params, &mut agg, DiskCh::new(0, 0), deltas).unwrap();
    let good = list[..17]
        .iter()
        .filter(|s| !s.status.unrecovered())
        .count();
    assert!(good * 3 >= 17 * 2, "only {} of 17 sectors decode", good);
}

/// The model pass recognizes a profile with fully defined write parameters
/// and fills in its geometry.
#[test]
fn omti_identified_by_full_analysis() {
    init();
    let image = patterned_image(2, 2, 17, 512);
    let tracks = encoded_disk(Controller::Omti5510, 2, 2, &image);
    let mut reader = reader_for(tracks);

    let mut params = DriveParams::default();
    let matches = analyze_format(&mut params, &mut reader, 0, 0).unwrap();
    assert!(matches >= 1);
    // Look-alike formats may also match; the first and most specific is
    // used.
    assert_eq!(params.controller, Controller::Omti5510);
    assert_eq!(params.num_head, 2);
    assert_eq!(params.num_sectors, 17);
}

/// All-zero sector contents make any polynomial's CRC come out zero. The
/// framer flags the ambiguity and the search must not accept a polynomial on
/// that evidence alone.
#[test]
fn all_zero_data_is_ambiguous() {
    init();
    let image = vec![0u8; 8 * 1160];
    let tracks = encoded_disk(Controller::Symbolics3640, 1, 1, &image);
    let deltas = tracks[&DiskCh::new(0, 0)].clone();

    // Decoding with the right profile succeeds but carries the ambiguity
    // flag on every sector.
    let mut params = DriveParams::default();
    params.set_controller(Controller::Symbolics3640);
    params.num_cyl = 1;
    params.num_head = 1;
    let mut agg = TrackAggregator::new();
    let (status, list) = decode_deltas(&mut params, &mut agg, DiskCh::new(0, 0), &deltas).unwrap();
    assert!(status.contains(SectorFlags::AMBIGUOUS_CRC));
    for s in &list[..8] {
        assert!(!s.status.unrecovered(), "{:?}", s.status);
        assert!(s.status.contains(SectorFlags::AMBIGUOUS_CRC), "{:?}", s.status);
    }

    // The polynomial search refuses to derive a format from this track.
    let mut reader = reader_for(tracks);
    let mut search_params = DriveParams::default();
    let formats = analyze_headers(&mut search_params, &mut reader, DiskCh::new(0, 0)).unwrap();
    assert_eq!(formats, 0, "search accepted an ambiguous track");
}

/// Unreadable input yields an analysis failure rather than a bogus match.
#[test]
fn noise_fails_analysis() {
    init();
    let mut reader = FnReader(|_: DiskCh| -> Result<Vec<u16>, MfmError> {
        // Constant long deltas: no valid MFM structure at all.
        Ok(vec![61u16; 5_000])
    });
    let mut params = DriveParams::default();
    let result = mfmfox::analyzer::analyze_disk(&mut params, &mut reader, None);
    assert!(matches!(result, Err(MfmError::AnalyzeFailed)));
}
