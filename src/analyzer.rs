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

    src/analyzer.rs

    Format identification by trial decode. A deliberately brute-force search
    driven by the controller registry: first the fully defined model formats,
    then the Cartesian product of header polynomial, initial value, and
    sector size for the rest. Once a format is fixed, head and cylinder
    counts are determined by scanning.
*/

use crate::aggregator::TrackAggregator;
use crate::chs::DiskCh;
use crate::decoder::{decode_track, init_sector_status_list, SectorFlags, SectorStatus};
use crate::deltas::SliceDeltas;
use crate::msg::MsgMask;
use crate::params::DriveParams;
use crate::registry::{self, AnalyzeSearch, AnalyzeType, Controller};
use crate::{msg, MfmError, CLOCKS_TO_NS, MAX_HEADS, MAX_SECTORS};
use histogram::Histogram;
use strum::IntoEnumIterator;

/// Source of delta tracks for analysis: a physical drive, a TRAN file, or
/// an EMU file rendered back to deltas.
pub trait TrackReader {
    fn read_track(&mut self, ch: DiskCh) -> Result<Vec<u16>, MfmError>;

    /// Cylinder count when known from a file header.
    fn num_cyl_hint(&self) -> Option<u32> {
        None
    }
}

/// Adapter turning a closure into a [`TrackReader`].
pub struct FnReader<F>(pub F);

impl<F> TrackReader for FnReader<F>
where
    F: FnMut(DiskCh) -> Result<Vec<u16>, MfmError>,
{
    fn read_track(&mut self, ch: DiskCh) -> Result<Vec<u16>, MfmError> {
        (self.0)(ch)
    }
}

impl<RS: crate::io::ReadSeek> TrackReader for crate::file_io::TranReader<RS> {
    fn read_track(&mut self, ch: DiskCh) -> Result<Vec<u16>, MfmError> {
        self.seek_track(ch)?;
        match crate::file_io::TranReader::read_track(self)? {
            Some(track) => Ok(track.deltas),
            None => Err(MfmError::SeekError),
        }
    }

    fn num_cyl_hint(&self) -> Option<u32> {
        Some(self.info.num_cyl)
    }
}

impl<RS: crate::io::ReadSeek> TrackReader for crate::file_io::EmuReader<RS> {
    fn read_track(&mut self, ch: DiskCh) -> Result<Vec<u16>, MfmError> {
        self.seek_track(ch)?;
        match self.read_track_deltas()? {
            Some((_, deltas)) => Ok(deltas),
            None => Err(MfmError::SeekError),
        }
    }

    fn num_cyl_hint(&self) -> Option<u32> {
        Some(self.info.num_cyl)
    }
}

/// Drive step rate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepSpeed {
    /// Buffered seek (ST412).
    Fast,
    /// Unbuffered (ST506).
    Slow,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    Timeout,
    Recal,
}

/// Physical drive control for the seek-rate subtest and cylinder scan. The
/// core never talks to hardware directly.
pub trait DriveInterface {
    fn seek_track0(&mut self) -> Result<(), MfmError>;
    fn at_track0(&mut self) -> Result<bool, MfmError>;
    fn step(&mut self, speed: StepSpeed, steps: i32) -> Result<StepStatus, MfmError>;
}

/// Message classes left enabled during trial decodes.
fn decode_errors(params: &DriveParams) -> MsgMask {
    MsgMask::FATAL | MsgMask::FORMAT | (params.msg_mask & MsgMask::DEBUG)
}

/// Weighted center of the next peak in the bucketed histogram. Used buckets
/// are cleared.
fn avg_peak(buckets: &mut [(u64, u64)], limit: u64) -> f64 {
    let mut start = None;
    for (i, &(_, count)) in buckets.iter().enumerate() {
        if count > limit {
            start = Some(i);
            break;
        }
    }
    let Some(start) = start else {
        return 0.0;
    };
    let mut sum = 0u64;
    let mut sum_mult = 0u64;
    for (value, count) in buckets[start..].iter_mut() {
        if *count <= limit {
            break;
        }
        sum += *count;
        sum_mult += *count * *value;
        *count = 0;
    }
    sum_mult as f64 / sum as f64
}

/// Estimate the clock rate used to encode the data from the two lowest
/// peaks in the delta histogram. The difference of adjacent peaks is the
/// bit-cell period. The estimate is coarse.
pub fn analyze_rate(params: &DriveParams, deltas: &[u16]) {
    let Ok(mut histogram) = Histogram::new(0, 7) else {
        return;
    };
    let mut counted = 0u64;
    for &d in deltas {
        if (d as u64) < 100 {
            let _ = histogram.increment(d as u64);
            counted += 1;
        }
    }
    let mut buckets: Vec<(u64, u64)> = histogram
        .into_iter()
        .filter(|b| b.count() > 0)
        .map(|b| ((b.start() + b.end()) / 2, b.count()))
        .collect();
    buckets.sort_unstable();

    let limit = (counted / 200).max(4);
    let rate1 = avg_peak(&mut buckets, limit) * CLOCKS_TO_NS as f64;
    let rate2 = avg_peak(&mut buckets, limit) * CLOCKS_TO_NS as f64;

    if (rate1 - 230.4).abs() <= 8.0 {
        msg!(
            params.msg_mask,
            MsgMask::ERR,
            "Primary transition period {:.0} ns, hopefully this is a SA1000 type disk",
            rate1
        );
    } else if (rate1 - 200.0).abs() > 8.0 {
        msg!(
            params.msg_mask,
            MsgMask::ERR,
            "Primary transition period {:.0} ns, should be around 200",
            rate1
        );
    } else if rate2 <= 280.0 && rate2 != 0.0 {
        msg!(
            params.msg_mask,
            MsgMask::ERR,
            "Secondary transition period {:.0} ns, likely RLL. RLL is not currently supported",
            rate2
        );
    }
    msg!(
        params.msg_mask,
        MsgMask::DEBUG,
        "First two transition periods {:.0}, {:.0} ns",
        rate1,
        rate2
    );
}

/// Decode one track quietly with the current parameters, returning the OR'd
/// status and the sector list.
fn trial_decode(
    params: &mut DriveParams,
    ch: DiskCh,
    deltas: &[u16],
) -> Result<(SectorFlags, Vec<SectorStatus>), MfmError> {
    let mut list = vec![SectorStatus::default(); MAX_SECTORS];
    init_sector_status_list(&mut list);
    let hold_mask = params.msg_mask;
    let hold_analyze = params.analyze_in_progress;
    params.msg_mask = decode_errors(params);
    params.analyze_in_progress = true;
    let mut agg = TrackAggregator::new();
    let mut seek_difference = 0;
    let mut source = SliceDeltas::new(deltas);
    let status = decode_track(params, ch, &mut source, &mut agg, &mut seek_difference, &mut list);
    params.msg_mask = hold_mask;
    params.analyze_in_progress = hold_analyze;
    Ok((status?, list))
}

/// Try to match a fully defined format: every model profile is decoded and
/// must produce mostly good sectors in the expected range.
fn analyze_model(params: &mut DriveParams, ch: DiskCh, deltas: &[u16]) -> Result<u32, MfmError> {
    analyze_rate(params, deltas);
    params.num_head = MAX_HEADS as u32;

    let mut matches: Vec<Controller> = Vec::new();
    for cont in Controller::iter() {
        let info = registry::info(cont);
        // LBA headers would match anything on cylinder 0 head 0, and
        // without full write parameters there is nothing to verify against.
        if (info.analyze_type == AnalyzeType::Lba && ch.c() == 0 && ch.h() == 0)
            || info.write_data_crc.length == 0
        {
            continue;
        }
        params.set_controller(cont);
        params.header_crc = info.write_header_crc;
        params.data_crc = info.write_data_crc;

        let (_, list) = trial_decode(params, ch, deltas)?;
        let num_sectors = params.num_sectors as usize;
        let mut not_match = false;
        let mut missing_count = 0;
        for (i, s) in list.iter().enumerate() {
            if s.status.analyze_wrong_format() {
                not_match = true;
            }
            if s.status.contains(SectorFlags::BAD_HEADER) {
                // Read errors can break a true match; allow one missed
                // sector.
                if i < num_sectors && missing_count >= 1 {
                    not_match = true;
                } else if i < num_sectors {
                    missing_count += 1;
                }
            } else if i >= num_sectors {
                not_match = true;
            }
        }
        let good_data = list[..num_sectors]
            .iter()
            .filter(|s| !s.status.intersects(SectorFlags::BAD_DATA | SectorFlags::BAD_HEADER))
            .count();
        if !not_match && good_data >= (num_sectors * 2).div_ceil(3) {
            msg!(params.msg_mask, MsgMask::INFO, "Found matching format {}:", cont);
            matches.push(cont);
        }
    }
    if let Some(&first) = matches.first() {
        params.set_controller(first);
        params.header_crc = registry::info(first).write_header_crc;
        params.data_crc = registry::info(first).write_data_crc;
    }
    Ok(matches.len() as u32)
}

/// One candidate parameter set found by the header search.
#[derive(Clone)]
struct Candidate {
    params: DriveParams,
    match_count: u32,
}

/// Search every profile's polynomial and initial-value ranges for header
/// parameters that decode at least two good headers.
fn analyze_header(params: &mut DriveParams, ch: DiskCh, deltas: &[u16]) -> Result<Vec<Candidate>, MfmError> {
    analyze_rate(params, deltas);
    params.num_sectors = MAX_SECTORS as u32;
    params.num_head = MAX_HEADS as u32;
    // No ECC while hunting for the format: wrong polynomials make false
    // corrections.
    params.header_crc.ecc_max_span = 0;
    params.data_crc.ecc_max_span = 0;

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut best: Option<(Controller, u32)> = None;

    for cont in Controller::iter() {
        let info = registry::info(cont);
        if (info.analyze_type == AnalyzeType::Lba && ch.c() == 0 && ch.h() == 0)
            || info.analyze_search == AnalyzeSearch::Model
            || info.analyze_type == AnalyzeType::None
        {
            continue;
        }
        params.controller = cont;
        params.sector_size = info.analyze_sector_size;
        if params.start_time_source == crate::params::StartTimeSource::Default {
            params.start_time_ns = info.start_time_ns;
        }

        'poly: for poly_ndx in info.header_poly.0..info.header_poly.1 {
            let poly = &registry::tables::ALL_POLY[poly_ndx];
            params.header_crc.poly = poly.poly;
            params.header_crc.length = poly.length;
            for init_ndx in info.init.0..info.init.1 {
                let init = &registry::tables::ALL_INIT[init_ndx];
                if let Some(len) = init.length {
                    if len != params.header_crc.length {
                        continue;
                    }
                }
                params.header_crc.init_value = params.header_crc.trim(init.value);
                params.header_crc.ecc_max_span = 0;
                params.data_crc = params.header_crc;

                // After a CRC reaches zero, more zero bytes keep it zero, so
                // a longer header would false-match once a shorter one has.
                if let Some((best_cont, _)) = best {
                    if info.header_bytes > registry::info(best_cont).header_bytes {
                        break 'poly;
                    }
                }

                let (status, list) = trial_decode(params, ch, deltas)?;
                if status.contains(SectorFlags::ZERO_HEADER_CRC) {
                    msg!(
                        params.msg_mask,
                        MsgMask::DEBUG,
                        "Found zero CRC header controller {}: poly {:#x} len {} init {:#x}",
                        cont,
                        params.header_crc.poly,
                        params.header_crc.length,
                        params.header_crc.init_value
                    );
                }

                let mut good_header_count = 0u32;
                let mut min_lba = u32::MAX;
                let mut max_lba = 0u32;
                for s in &list {
                    if !s.status.intersects(SectorFlags::BAD_HEADER | SectorFlags::AMBIGUOUS_CRC)
                        && s.status.contains(SectorFlags::HEADER_FOUND)
                    {
                        good_header_count += 1;
                        min_lba = min_lba.min(s.lba_addr);
                        max_lba = max_lba.max(s.lba_addr);
                    }
                }
                // LBA addresses must be roughly adjacent and plausible for
                // the cylinder.
                if info.analyze_type == AnalyzeType::Lba
                    && good_header_count > 0
                    && (max_lba - min_lba > params.num_sectors
                        || max_lba - min_lba + 1 < good_header_count
                        || min_lba > ch.c() * 16 * 34)
                {
                    good_header_count = 0;
                }

                if good_header_count >= 2 || (good_header_count == 1 && params.sector_size > 9000) {
                    if best.map_or(true, |(_, count)| good_header_count > count) {
                        best = Some((cont, good_header_count));
                    }
                    let mut found = params.clone();
                    found.header_crc.ecc_max_span = poly.ecc_span;
                    // Set the data span too so formats without separate
                    // header and data checks get both fields right.
                    found.data_crc.ecc_max_span = poly.ecc_span;
                    msg!(
                        params.msg_mask,
                        MsgMask::DEBUG,
                        "Found {} headers matching controller {} poly {:#x} len {} init {:#x}",
                        good_header_count,
                        cont,
                        found.header_crc.poly,
                        found.header_crc.length,
                        found.header_crc.init_value
                    );
                    candidates.push(Candidate {
                        params: found,
                        match_count: good_header_count,
                    });
                }
            }
        }
    }
    Ok(candidates)
}

/// With the header parameters fixed, search for the data check parameters
/// and the sector size. Returns the number of matching parameter sets; the
/// best is stored into `params`.
fn analyze_data(
    params: &mut DriveParams,
    ch: DiskCh,
    deltas: &[u16],
    headers_match: u32,
    best_match_count: &mut u32,
) -> Result<u32, MfmError> {
    let info = registry::info(params.controller);
    let mut rc = 0;
    let mut best_crc = None;
    let mut best_size = 0usize;
    let mut previous_good = 0u32;
    *best_match_count = 0;

    for poly_ndx in info.data_poly.0..info.data_poly.1 {
        let poly = &registry::tables::ALL_POLY[poly_ndx];
        params.data_crc.poly = poly.poly;
        params.data_crc.length = poly.length;
        // False corrections happen with the wrong polynomial; the span is
        // restored when the best value is saved.
        params.data_crc.ecc_max_span = 0;
        for init_ndx in info.init.0..info.init.1 {
            let init = &registry::tables::ALL_INIT[init_ndx];
            if let Some(len) = init.length {
                if len != params.data_crc.length {
                    continue;
                }
            }
            params.data_crc.init_value = params.data_crc.trim(init.value);
            for &size in registry::tables::ALL_SECTOR_SIZE.iter() {
                // A longer sector still matches after the CRC goes to zero;
                // don't try larger sizes once enough sectors matched.
                if best_size != 0 && size > best_size && previous_good as f64 >= 0.6 * headers_match as f64 {
                    continue;
                }
                params.sector_size = size;
                let (status, list) = trial_decode(params, ch, deltas)?;
                if status.contains(SectorFlags::ZERO_DATA_CRC) {
                    msg!(
                        params.msg_mask,
                        MsgMask::DEBUG,
                        "Found zero CRC data size {}: poly {:#x} len {} init {:#x}",
                        size,
                        params.data_crc.poly,
                        params.data_crc.length,
                        params.data_crc.init_value
                    );
                }
                let good_data = list
                    .iter()
                    .filter(|s| {
                        !s.status.unrecovered()
                            && !s.status.intersects(SectorFlags::ANALYZE_ERROR | SectorFlags::AMBIGUOUS_CRC)
                            && s.status.contains(SectorFlags::HEADER_FOUND)
                    })
                    .count() as u32;
                if good_data > 0 {
                    rc += 1;
                    if best_crc.is_some() && good_data > previous_good {
                        msg!(
                            params.msg_mask,
                            MsgMask::ERR_SERIOUS,
                            "Found multiple matching data CRC parameters. Largest matches will be used: matches {} sector size {} poly {:#x}",
                            good_data,
                            size,
                            params.data_crc.poly
                        );
                    }
                    if good_data > previous_good {
                        let mut crc = params.data_crc;
                        crc.ecc_max_span = poly.ecc_span;
                        best_crc = Some(crc);
                        best_size = size;
                        previous_good = good_data;
                    }
                    *best_match_count = previous_good;
                }
            }
        }
    }
    params.sector_size = best_size;
    if let Some(crc) = best_crc {
        params.data_crc = crc;
    }
    Ok(rc)
}

/// Combine header and data searches, keeping the parameter set with the most
/// matches. Multiple viable sets are reported as serious errors but the best
/// one is still used.
pub fn analyze_headers(
    params: &mut DriveParams,
    reader: &mut dyn TrackReader,
    ch: DiskCh,
) -> Result<u32, MfmError> {
    let deltas = reader.read_track(ch)?;
    let mut candidates = analyze_header(params, ch, &deltas)?;
    let mut format_count = 0;
    let mut max_match = 0u32;
    let mut max_index = None;

    for (i, cand) in candidates.iter_mut().enumerate() {
        let separate = registry::info(cand.params.controller).separate_data;
        let mut data_matches = cand.match_count;
        if separate {
            let mut best_count = 0;
            if analyze_data(&mut cand.params, ch, &deltas, cand.match_count, &mut best_count)? > 1 {
                format_count += 1;
            }
            data_matches = best_count;
        }
        if data_matches > 0 {
            // Rank candidates by header and data matches together.
            let total = data_matches + cand.match_count;
            format_count += 1;
            if max_match > 0 {
                msg!(
                    params.msg_mask,
                    MsgMask::ERR_SERIOUS,
                    "Found multiple matching header parameters. Will use largest matches or last if identical"
                );
            }
            msg!(
                params.msg_mask,
                MsgMask::ERR_SERIOUS,
                "Matches count {} for controller {}: header poly {:#x} length {} init {:#x} sector length {}",
                total,
                cand.params.controller,
                cand.params.header_crc.poly,
                cand.params.header_crc.length,
                cand.params.header_crc.init_value,
                cand.params.sector_size
            );
            if total >= max_match {
                max_match = total;
                max_index = Some(i);
            }
        }
    }
    if let Some(i) = max_index {
        *params = candidates[i].params.clone();
    }
    Ok(format_count)
}

/// Determine head count, sectors per track, first sector number, and the
/// interleave pattern by reading every head of one cylinder.
pub fn analyze_sectors(
    params: &mut DriveParams,
    reader: &mut dyn TrackReader,
    cyl: u32,
) -> Result<(), MfmError> {
    let mut interleave = [255u8; MAX_SECTORS];
    let mut unknown_interleave = false;
    let mut head_mismatch = false;
    let mut max_sector = 0u32;
    let mut min_sector = MAX_SECTORS as u32;
    let mut last_good_head: Option<u32> = None;
    let mut unrecovered = false;
    let mut found_any_header = false;
    let mut last_min_lba = 0u32;

    let mut head = 0;
    while head < MAX_HEADS as u32 && !head_mismatch {
        let mut err_count = 0;
        let mut status;
        let mut list;
        let mut min_lba = u32::MAX;
        loop {
            let deltas = match reader.read_track(DiskCh::new(cyl, head)) {
                Ok(d) => d,
                Err(_) => Vec::new(),
            };
            let r = trial_decode(params, DiskCh::new(cyl, head), &deltas)?;
            status = r.0;
            list = r.1;
            // The Mightyframe and MV/2000 encode heads 8-15 differently. If
            // head 8 of a WD 1006 disk decodes nothing, try those.
            if status.unrecovered() && head == 8 && params.controller == Controller::Wd1006 {
                let good = |l: &[SectorStatus]| {
                    l.iter().any(|s| {
                        s.status.contains(SectorFlags::HEADER_FOUND) && !s.status.contains(SectorFlags::BAD_HEADER)
                    })
                };
                if !good(&list) && last_good_head == Some(7) {
                    for alt in [Controller::Mightyframe, Controller::DgMv2000] {
                        params.controller = alt;
                        let r = trial_decode(params, DiskCh::new(cyl, head), &deltas)?;
                        if good(&r.1) {
                            msg!(params.msg_mask, MsgMask::FORMAT, "Changed controller type to {}", alt);
                            status = r.0;
                            list = r.1;
                            break;
                        }
                        params.controller = Controller::Wd1006;
                    }
                    if params.controller == Controller::Wd1006 {
                        let r = trial_decode(params, DiskCh::new(cyl, head), &deltas)?;
                        status = r.0;
                        list = r.1;
                    }
                }
            }
            err_count += 1;
            if !status.unrecovered() || err_count >= 8 {
                break;
            }
        }
        if status.unrecovered() {
            unrecovered = true;
        }

        let mut found_bad_header = false;
        let mut found_header = false;
        for s in &list {
            // A missed header after a found one makes the interleave
            // unreliable.
            if s.status.contains(SectorFlags::BAD_HEADER) && found_header {
                found_bad_header = true;
            }
            if s.status.contains(SectorFlags::HEADER_FOUND) {
                found_header = true;
                found_any_header = true;
                if !found_bad_header {
                    let slot = s.logical_sector.min(MAX_SECTORS - 1);
                    if interleave[slot] != 255 && interleave[slot] as u32 != s.sector && !unknown_interleave {
                        msg!(
                            params.msg_mask,
                            MsgMask::ERR,
                            "Interleave mismatch previous entry {} was {} now {}",
                            slot,
                            interleave[slot],
                            s.sector
                        );
                        unknown_interleave = true;
                    }
                    interleave[slot] = s.sector as u8;
                }
                max_sector = max_sector.max(s.sector);
                min_sector = min_sector.min(s.sector);
                if registry::info(params.controller).analyze_type == AnalyzeType::Lba {
                    min_lba = min_lba.min(s.lba_addr);
                    if s.lba_addr >= last_min_lba {
                        last_good_head = Some(head);
                    } else if !head_mismatch {
                        msg!(
                            params.msg_mask,
                            MsgMask::INFO,
                            "Selected head {} found out of series LBA address, last good head found {:?}",
                            head,
                            last_good_head
                        );
                        head_mismatch = true;
                    }
                } else if s.head == head {
                    last_good_head = Some(head);
                } else if !head_mismatch {
                    msg!(
                        params.msg_mask,
                        MsgMask::INFO,
                        "Selected head {} found {}, last good head found {:?}",
                        head,
                        s.head,
                        last_good_head
                    );
                    head_mismatch = true;
                }
            }
        }
        last_min_lba = if min_lba == u32::MAX { 0 } else { min_lba };
        head += 1;
    }

    if unrecovered && found_any_header {
        msg!(
            params.msg_mask,
            MsgMask::ERR,
            "Read errors trying to determine sector numbering, results may be in error"
        );
    }
    let Some(last_good) = last_good_head else {
        return Err(MfmError::AnalyzeFailed);
    };
    params.num_head = last_good + 1;
    params.num_sectors = max_sector - min_sector + 1;
    params.first_sector_number = min_sector;
    msg!(
        params.msg_mask,
        MsgMask::INFO,
        "Number of heads {} number of sectors {} first sector {}",
        params.num_head,
        params.num_sectors,
        params.first_sector_number
    );
    if unknown_interleave {
        msg!(
            params.msg_mask,
            MsgMask::ERR,
            "Unable to determine interleave. Interleave value is not required"
        );
    } else {
        let listing: Vec<String> = interleave[..params.num_sectors as usize]
            .iter()
            .map(|v| v.to_string())
            .collect();
        msg!(params.msg_mask, MsgMask::INFO, "Interleave (not checked): {}", listing.join(" "));
    }
    // Too many drives have odd cylinders (spares, test tracks) for the
    // interleave check to be trustworthy; it stays off unless the caller
    // sets it.
    params.sector_numbers = None;
    Ok(())
}

/// Test whether seeking at the given rate works: step out, then verify the
/// same number of slow steps returns exactly to track 0.
pub fn analyze_seek(params: &DriveParams, drive: &mut dyn DriveInterface, speed: StepSpeed) -> Result<bool, MfmError> {
    drive.seek_track0()?;
    let seek = 30;
    drive.step(speed, seek)?;
    if drive.at_track0()? {
        msg!(params.msg_mask, MsgMask::INFO, "Drive still at track 0 after seek");
        return Ok(false);
    }
    for i in 1..=seek {
        drive.step(StepSpeed::Slow, -1)?;
        let at0 = drive.at_track0()?;
        if i == seek {
            if !at0 {
                msg!(
                    params.msg_mask,
                    MsgMask::INFO,
                    "Drive didn't reach track 0 testing {:?} seek",
                    speed
                );
                drive.seek_track0()?;
                return Ok(false);
            }
        } else if at0 {
            msg!(
                params.msg_mask,
                MsgMask::INFO,
                "Drive prematurely at track 0 after {} of {} steps testing {:?} seek",
                i,
                seek,
                speed
            );
            drive.seek_track0()?;
            return Ok(false);
        }
    }
    drive.seek_track0()?;
    Ok(true)
}

/// Step down the disk until tracks stop decoding, the header cylinder stops
/// following, or the seek gives out, to find the cylinder count.
pub fn analyze_disk_size(
    params: &mut DriveParams,
    reader: &mut dyn TrackReader,
    drive: &mut dyn DriveInterface,
    start_cyl: u32,
    head: u32,
    step_speed: StepSpeed,
) -> Result<(), MfmError> {
    let mut max_cyl = 0u32;
    let mut no_header_count = 0;
    let mut not_next_cyl_count = 0;

    for cyl in start_cyl + 1..crate::MAX_CYLS as u32 {
        if cyl % 5 == 0 {
            msg!(params.msg_mask, MsgMask::PROGRESS, "At cyl {}", cyl);
        }
        match drive.step(step_speed, 1)? {
            StepStatus::Timeout => {
                msg!(params.msg_mask, MsgMask::INFO, "Max cylinder set from drive timeout on seek");
                break;
            }
            StepStatus::Recal => {
                msg!(
                    params.msg_mask,
                    MsgMask::INFO,
                    "Stopping end of disk search due to recalibration"
                );
                break;
            }
            StepStatus::Ok => {}
        }
        let deltas = reader.read_track(DiskCh::new(cyl, head)).unwrap_or_default();
        let (_, list) = trial_decode(params, DiskCh::new(cyl, head), &deltas)?;

        let mut any_header = false;
        let mut not_next_cyl = false;
        for s in &list {
            if s.status.contains(SectorFlags::HEADER_FOUND) {
                any_header = true;
                max_cyl = max_cyl.max(s.cyl);
                if s.cyl != cyl && !not_next_cyl {
                    msg!(params.msg_mask, MsgMask::INFO, "Found cylinder {} expected {}", s.cyl, cyl);
                    not_next_cyl = true;
                }
            }
        }
        if !any_header {
            no_header_count += 1;
            if no_header_count >= 2 {
                msg!(
                    params.msg_mask,
                    MsgMask::INFO,
                    "Stopping end of disk search due to two unreadable tracks in a row"
                );
                break;
            }
            msg!(params.msg_mask, MsgMask::INFO, "No sectors readable from cylinder {}", cyl);
        } else {
            no_header_count = 0;
        }
        if not_next_cyl {
            not_next_cyl_count += 1;
            if not_next_cyl_count >= 2 {
                msg!(
                    params.msg_mask,
                    MsgMask::INFO,
                    "Stopping end of disk search due to mismatching cylinder count"
                );
                break;
            }
        } else {
            not_next_cyl_count = 0;
        }
    }
    params.num_cyl = max_cyl + 1;
    msg!(
        params.msg_mask,
        MsgMask::INFO,
        "Number of cylinders {}, {:.1} MB",
        params.num_cyl,
        params.num_cyl as f64 * params.num_head as f64 * params.num_sectors as f64 * params.sector_size as f64
            / 1_000_000.0
    );
    drive.seek_track0()?;
    Ok(())
}

/// Identify the format of the disk. On success the drive parameters are set
/// to the discovered profile; geometry is filled in from the sector scan.
/// Returns the number of matching formats (more than one is reported but the
/// best is used).
pub fn analyze_format(
    params: &mut DriveParams,
    reader: &mut dyn TrackReader,
    cyl: u32,
    head: u32,
) -> Result<u32, MfmError> {
    let ch = DiskCh::new(cyl, head);
    let deltas = reader.read_track(ch)?;
    let mut rc = analyze_model(params, ch, &deltas)?;
    if rc > 1 {
        // Multiple matches: retry on a different track. Cylinder 0 head 0 is
        // poor at distinguishing formats.
        let (rcyl, rhead) = if cyl > 0 { (0, 1) } else { (cyl + 1, 1) };
        msg!(params.msg_mask, MsgMask::INFO, "Retrying on cylinder {} head {}", rcyl, rhead);
        let deltas = reader.read_track(DiskCh::new(rcyl, rhead))?;
        rc = analyze_model(params, DiskCh::new(rcyl, rhead), &deltas)?;
    }
    if rc > 1 {
        msg!(params.msg_mask, MsgMask::ERR, "Multiple matching formats found, using first");
    }
    if rc >= 1 {
        let hold = params.clone();
        analyze_sectors(params, reader, cyl)?;
        let canonical = registry::info(params.controller);
        if canonical.write_num_sectors == params.num_sectors
            && canonical.write_first_sector_number == params.first_sector_number
            && hold.controller == params.controller
        {
            return Ok(rc);
        }
        msg!(
            params.msg_mask,
            MsgMask::INFO,
            "Sector information detected doesn't match expected format, trying again"
        );
        *params = hold;
    }

    let mut rc = analyze_headers(params, reader, ch)?;
    // Only the first two heads of the ST11M's first cylinder are usable;
    // retry on the next cylinder for a proper head count.
    if rc != 1 || (params.controller == Controller::SeagateSt11m && cyl == 0) {
        let (rcyl, rhead) = if cyl > 0 { (0, 1) } else { (cyl + 1, 1) };
        msg!(params.msg_mask, MsgMask::INFO, "Retrying on cylinder {} head {}", rcyl, rhead);
        rc = analyze_headers(params, reader, DiskCh::new(rcyl, rhead))?;
        if rc != 0 {
            analyze_sectors(params, reader, rcyl)?;
        }
        return Ok(rc);
    }
    if rc != 0 {
        analyze_sectors(params, reader, cyl)?;
    }
    Ok(rc)
}

/// Full analysis of an unknown disk: format identification, then the seek
/// test and cylinder scan when physical drive control is available, or the
/// file's cylinder count otherwise.
pub fn analyze_disk(
    params: &mut DriveParams,
    reader: &mut dyn TrackReader,
    mut drive: Option<&mut dyn DriveInterface>,
) -> Result<(), MfmError> {
    let cyl = params.analyze_cyl;
    let head = params.analyze_head;
    params.analyze_in_progress = true;
    let hold_sector_numbers = params.sector_numbers.take();

    let matches = analyze_format(params, reader, cyl, head)?;
    if matches == 0 {
        params.analyze_in_progress = false;
        return Err(MfmError::AnalyzeFailed);
    }

    if let Some(drive) = drive.as_deref_mut() {
        // Try a buffered seek; fall back to unbuffered.
        let step_speed = if analyze_seek(params, drive, StepSpeed::Fast)? {
            msg!(params.msg_mask, MsgMask::INFO, "Drive supports buffered seeks (ST412)");
            StepSpeed::Fast
        } else if analyze_seek(params, drive, StepSpeed::Slow)? {
            msg!(params.msg_mask, MsgMask::INFO, "Drive doesn't support buffered seeks (ST506)");
            StepSpeed::Slow
        } else {
            params.analyze_in_progress = false;
            return Err(MfmError::ParameterError("drive is not seeking properly".into()));
        };
        analyze_disk_size(params, reader, drive, cyl, head, step_speed)?;
    } else if let Some(num_cyl) = reader.num_cyl_hint() {
        params.num_cyl = num_cyl;
    }

    params.sector_numbers = hold_sector_numbers;
    params.analyze_in_progress = false;
    Ok(())
}
