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

    src/aggregator.rs

    Aggregates sector records across re-reads of the same track, keeps the
    best observed copy of each sector, picks the best raw track to emit to
    the emulator file, and owns the output files for the run. A retry only
    replaces a sector when the previous copy had a bad header, or had bad
    data and the new read is strictly better.
*/

use crate::chs::DiskCh;
use crate::decoder::{SectorFlags, SectorStatus};
use crate::file_io::EmuWriter;
use crate::io::{ReadWriteSeek, SeekFrom, WriteSeek};
use crate::msg::MsgMask;
use crate::params::DriveParams;
use crate::pll::TrackBitSink;
use crate::registry;
use crate::{msg, MfmError};
use std::io::{Read, Seek, Write};

/// A recorded alternate-track redirection in the extract image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct AltTrack {
    bad_offset: u64,
    good_offset: u64,
    length: u64,
}

/// Owns per-run output files and the cross-read state the decoder feeds.
#[derive(Default)]
pub struct TrackAggregator {
    emu: Option<EmuWriter<Box<dyn WriteSeek>>>,
    extract: Option<Box<dyn ReadWriteSeek>>,
    metadata: Option<Box<dyn WriteSeek>>,
    sink: TrackBitSink,
    /// Sector list and address of the previous decode, carried until the
    /// track changes so retries fold together.
    last_list: Vec<SectorStatus>,
    last_ch: Option<DiskCh>,
    /// Best single-pass track words and its score.
    best_words: Vec<u32>,
    best_weight: i32,
    /// Track assembled from the best bits of every pass.
    best_fixed_words: Vec<u32>,
    best_fixed_weight: i32,
    alt_tracks: Vec<AltTrack>,
}

impl TrackAggregator {
    /// An aggregator with no output files; sector state and statistics are
    /// still collected.
    pub fn new() -> Self {
        TrackAggregator::default()
    }

    /// Attach an emulator output. The sink starts collecting raw words.
    pub fn with_emu(mut self, emu: EmuWriter<Box<dyn WriteSeek>>) -> Self {
        self.emu = Some(emu);
        self.sink = TrackBitSink::new(true);
        self
    }

    /// Attach an extract (decoded sector image) output.
    pub fn with_extract(mut self, extract: Box<dyn ReadWriteSeek>) -> Self {
        self.extract = Some(extract);
        self
    }

    /// Attach a metadata image output.
    pub fn with_metadata(mut self, metadata: Box<dyn WriteSeek>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn emu_enabled(&self) -> bool {
        self.emu.is_some()
    }

    pub(crate) fn sink_mut(&mut self) -> &mut TrackBitSink {
        &mut self.sink
    }

    /// Record a bad-track to good-track redirection discovered in a header
    /// or data area, for fixing the extract image at the end of the run.
    pub(crate) fn record_alt_track(&mut self, params: &DriveParams, bad: (u32, u32), good: (u32, u32)) {
        let track_bytes = params.num_sectors as u64 * params.sector_size as u64;
        let alt = AltTrack {
            bad_offset: (bad.0 as u64 * params.num_head as u64 + bad.1 as u64) * track_bytes,
            good_offset: (good.0 as u64 * params.num_head as u64 + good.1 as u64) * track_bytes,
            length: track_bytes,
        };
        if !self.alt_tracks.contains(&alt) {
            log::debug!(
                "alternate track mapping ({},{}) -> ({},{})",
                bad.0,
                bad.1,
                good.0,
                good.1
            );
            self.alt_tracks.push(alt);
        }
    }

    /// Write sector data to the extract file, keeping only the best copy
    /// across retries. Returns false when the sector or head is out of range
    /// for the configured geometry (the caller marks the header bad).
    pub(crate) fn write_sector(
        &mut self,
        params: &mut DriveParams,
        sector_status: &mut SectorStatus,
        list: &mut [SectorStatus],
        data: &[u8],
        all_bytes: &[u8],
    ) -> Result<bool, MfmError> {
        let stats = &mut params.stats;
        stats.max_sect = stats.max_sect.max(sector_status.sector);
        stats.min_sect = stats.min_sect.min(sector_status.sector);
        stats.max_head = stats.max_head.max(sector_status.head);
        stats.min_head = stats.min_head.min(sector_status.head);
        stats.max_cyl = stats.max_cyl.max(sector_status.cyl);
        stats.min_cyl = stats.min_cyl.min(sector_status.cyl);

        // Some disks number sectors from 1; the image is 0-based.
        let sect_rel0 = sector_status.sector as i64 - params.first_sector_number as i64;
        if sect_rel0 < 0 || sect_rel0 >= params.num_sectors as i64 {
            msg!(
                params.msg_mask,
                MsgMask::ERR_SERIOUS,
                "Logical sector {} out of range 0-{} sector {} cyl {} head {}",
                sect_rel0,
                params.num_sectors - 1,
                sector_status.sector,
                sector_status.cyl,
                sector_status.head
            );
            return Ok(false);
        }
        if sector_status.head > params.num_head {
            msg!(
                params.msg_mask,
                MsgMask::ERR_SERIOUS,
                "Head out of range {} max {} cyl {} sector {}",
                sector_status.head,
                params.num_head,
                sector_status.cyl,
                sector_status.sector
            );
            return Ok(false);
        }
        let sect_rel0 = sect_rel0 as usize;

        // Write only if likely better than what was written before: the
        // previous header was bad, or the previous data was bad or
        // corrected and this read is clean with a smaller span. The header
        // is assumed correct; if it weren't, the data went to the wrong
        // place in the file anyway.
        let prior = &list[sect_rel0];
        let mut update = prior.status.contains(SectorFlags::BAD_HEADER);
        if prior.status.contains(SectorFlags::BAD_DATA) || prior.ecc_span_corrected_data > 0 {
            if !sector_status.status.contains(SectorFlags::BAD_DATA)
                && (sector_status.ecc_span_corrected_data == 0
                    || sector_status.ecc_span_corrected_data < prior.ecc_span_corrected_data)
            {
                update = true;
            }
        }
        if update {
            self.update_emu_track_sector(sector_status, all_bytes);
            if let Some(extract) = self.extract.as_mut() {
                let offset = DiskCh::new(sector_status.cyl, sector_status.head).sector_offset(
                    sector_status.sector,
                    params.first_sector_number,
                    params.num_head,
                    params.num_sectors,
                    params.sector_size,
                );
                extract.seek(SeekFrom::Start(offset))?;
                extract.write_all(data)?;
            }
            list[sect_rel0] = *sector_status;
        }
        list[sect_rel0].last_status = sector_status.status;
        Ok(true)
    }

    /// Write a sector's metadata block to the metadata image.
    pub(crate) fn write_metadata(
        &mut self,
        params: &mut DriveParams,
        sector_status: &SectorStatus,
        bytes: &[u8],
    ) -> Result<(), MfmError> {
        let info = registry::info(params.controller);
        if let Some(metadata) = self.metadata.as_mut() {
            let sect_rel0 = sector_status.sector.saturating_sub(params.first_sector_number) as u64;
            let offset = ((sector_status.cyl as u64 * params.num_head as u64 + sector_status.head as u64)
                * params.num_sectors as u64
                + sect_rel0)
                * info.metadata_bytes as u64;
            metadata.seek(SeekFrom::Start(offset))?;
            metadata.write_all(bytes)?;
        }
        Ok(())
    }

    /// Re-encode corrected data bits into the current track words so the
    /// patched track can beat the raw read, and fold the sector's words into
    /// the best-fixed track.
    fn update_emu_track_sector(&mut self, sector_status: &SectorStatus, all_bytes: &[u8]) {
        if sector_status.ecc_span_corrected_data != 0 {
            self.sink.patch_sector_bits(all_bytes);
        }
        // When the cylinder or head changed we're on a fresh track; the
        // whole-track copy happens in update_stats instead.
        if self.last_ch == Some(DiskCh::new(sector_status.cyl, sector_status.head)) {
            let start = self.sink.header_word_ndx();
            let words = self.sink.words();
            if self.best_fixed_words.len() < words.len() {
                self.best_fixed_words.resize(words.len(), 0);
            }
            self.best_fixed_words[start..words.len()].copy_from_slice(&words[start..]);
        }
    }

    /// Fold a finished decode into the per-track state; when the track
    /// changes, score the collected reads and emit the best to the emulator
    /// file. Called with `None` to flush the final track at end of run.
    pub fn update_stats(
        &mut self,
        params: &mut DriveParams,
        ch: Option<DiskCh>,
        list: Option<&[SectorStatus]>,
    ) -> Result<(), MfmError> {
        match self.last_ch {
            Some(last) if ch != Some(last) => {
                self.update_emu_track_words(params, list, true, true, last)?;
                let mut error_found = false;
                let n = (params.num_sectors as usize).min(self.last_list.len());
                for s in &self.last_list[..n] {
                    if s.status.contains(SectorFlags::ECC_RECOVERED) {
                        params.stats.num_ecc_recovered += 1;
                        error_found = true;
                    }
                    if s.status.contains(SectorFlags::BAD_DATA) {
                        params.stats.num_bad_data += 1;
                        error_found = true;
                    } else if s.status.contains(SectorFlags::BAD_HEADER) {
                        params.stats.num_bad_header += 1;
                        error_found = true;
                    } else {
                        params.stats.num_good_sectors += 1;
                    }
                }
                if error_found {
                    self.report_sector_list(params, last);
                }
            }
            _ => {
                let new_track = self.last_ch.is_none();
                let at = ch.unwrap_or_default();
                self.update_emu_track_words(params, list, false, new_track, at)?;
            }
        }
        if let Some(list) = list {
            self.last_list = list.to_vec();
        }
        self.last_ch = ch;
        Ok(())
    }

    /// Print errors and ECC corrections for a finished track.
    fn report_sector_list(&self, params: &DriveParams, ch: DiskCh) {
        let n = (params.num_sectors as usize).min(self.last_list.len());
        let first = params.first_sector_number;
        let bad: Vec<String> = self.last_list[..n]
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status.unrecovered())
            .map(|(i, s)| {
                if s.status.contains(SectorFlags::BAD_HEADER) {
                    format!("{}H", i as u32 + first)
                } else {
                    format!("{}", i as u32 + first)
                }
            })
            .collect();
        if !bad.is_empty() {
            msg!(
                params.msg_mask,
                MsgMask::ERR_SUMMARY,
                "Bad sectors on cylinder {} head {}: {}",
                ch.c(),
                ch.h(),
                bad.join(" ")
            );
        }
        let ecc: Vec<String> = self.last_list[..n]
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status.contains(SectorFlags::ECC_RECOVERED))
            .map(|(i, s)| {
                format!(
                    "{}({}H,{})",
                    i as u32 + first,
                    s.ecc_span_corrected_header,
                    s.ecc_span_corrected_data
                )
            })
            .collect();
        if !ecc.is_empty() {
            msg!(
                params.msg_mask,
                MsgMask::ERR_SUMMARY,
                "ECC corrections on cylinder {} head {}: {}",
                ch.c(),
                ch.h(),
                ecc.join(" ")
            );
        }
    }

    /// Score the current read, keep the best raw and patched tracks, and
    /// optionally emit the winner for a finished track.
    fn update_emu_track_words(
        &mut self,
        params: &mut DriveParams,
        list: Option<&[SectorStatus]>,
        write_track: bool,
        new_track: bool,
        ch: DiskCh,
    ) -> Result<(), MfmError> {
        if self.emu.is_none() {
            return Ok(());
        }
        // Ten points per clean sector, nine when ECC had to step in, one for
        // a readable header with bad data.
        let weigh = |flags: SectorFlags| -> i32 {
            if flags.contains(SectorFlags::BAD_DATA) {
                1
            } else if !flags.contains(SectorFlags::BAD_HEADER) {
                if flags.contains(SectorFlags::ECC_RECOVERED) {
                    9
                } else {
                    10
                }
            } else {
                0
            }
        };
        let mut last_weight = 0;
        let mut best_weight = 0;
        if let Some(list) = list {
            let n = (params.num_sectors as usize).min(list.len());
            for s in &list[..n] {
                last_weight += weigh(s.last_status);
                best_weight += weigh(s.status);
            }
        }
        if write_track {
            // Prefer the track that came from a single read when it scores
            // at least as well; it is more likely to be internally
            // consistent than one assembled from pieces.
            if let Some(emu) = self.emu.as_mut() {
                if self.best_weight >= self.best_fixed_weight {
                    emu.write_track(ch, &self.best_words)?;
                } else {
                    emu.write_track(ch, &self.best_fixed_words)?;
                }
            }
        }
        params.stats.max_track_words = params.stats.max_track_words.max(self.sink.word_count());
        if last_weight > self.best_weight || new_track {
            self.best_weight = last_weight;
            self.best_words = self.sink.words().to_vec();
        }
        if new_track && list.is_some() {
            self.best_fixed_words = self.sink.words().to_vec();
        }
        self.best_fixed_weight = best_weight;
        self.sink.clear();
        Ok(())
    }

    /// Finish the run: flush the final track, fix alternate-track regions in
    /// the extract image, close the emulator file with its end marker, and
    /// report summary statistics.
    pub fn finish(&mut self, params: &mut DriveParams) -> Result<(), MfmError> {
        self.update_stats(params, None, None)?;

        // Copy each recorded alternate track over its bad original so
        // consumers see a contiguous image.
        if let Some(extract) = self.extract.as_mut() {
            for alt in &self.alt_tracks {
                let mut buf = vec![0u8; alt.length as usize];
                extract.seek(SeekFrom::Start(alt.good_offset))?;
                extract.read_exact(&mut buf)?;
                extract.seek(SeekFrom::Start(alt.bad_offset))?;
                extract.write_all(&buf)?;
            }
            extract.flush()?;
        }
        if let Some(emu) = self.emu.take() {
            emu.close()?;
        }

        let stats = &params.stats;
        if stats.any_found() {
            msg!(
                params.msg_mask,
                MsgMask::STATS,
                "Found cyl {} to {}, head {} to {}, sector {} to {}",
                stats.min_cyl,
                stats.max_cyl,
                stats.min_head,
                stats.max_head,
                stats.min_sect,
                stats.max_sect
            );
            if stats.max_cyl - stats.min_cyl + 1 != params.num_cyl {
                msg!(
                    params.msg_mask,
                    MsgMask::ERR_SUMMARY,
                    "Expected cyls {} doesn't match cyls found {}",
                    params.num_cyl,
                    stats.max_cyl - stats.min_cyl + 1
                );
            }
            if stats.max_head - stats.min_head + 1 != params.num_head {
                msg!(
                    params.msg_mask,
                    MsgMask::ERR_SUMMARY,
                    "Expected heads {} doesn't match heads found {}",
                    params.num_head,
                    stats.max_head - stats.min_head + 1
                );
            }
            if stats.max_sect - stats.min_sect + 1 != params.num_sectors {
                msg!(
                    params.msg_mask,
                    MsgMask::ERR_SUMMARY,
                    "Expected sectors {} doesn't match sectors found {}",
                    params.num_sectors,
                    stats.max_sect - stats.min_sect + 1
                );
            }
            if stats.min_sect != params.first_sector_number {
                msg!(
                    params.msg_mask,
                    MsgMask::ERR_SUMMARY,
                    "Expected first sector number {} doesn't match first sector found {}",
                    params.first_sector_number,
                    stats.min_sect
                );
            }
            msg!(
                params.msg_mask,
                MsgMask::STATS,
                "Expected {} sectors got {} good sectors, {} bad header, {} bad data",
                params.num_cyl * params.num_head * params.num_sectors,
                stats.num_good_sectors,
                stats.num_bad_header,
                stats.num_bad_data
            );
            msg!(
                params.msg_mask,
                MsgMask::STATS,
                "{} sectors corrected with ECC. Max bits in burst corrected {}",
                stats.num_ecc_recovered,
                stats.max_ecc_span
            );
        }
        Ok(())
    }

    /// Number of alternate-track mappings recorded so far.
    pub fn alt_track_count(&self) -> usize {
        self.alt_tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(flags: SectorFlags, span: u32) -> SectorStatus {
        SectorStatus {
            status: flags,
            ecc_span_corrected_data: span,
            ..Default::default()
        }
    }

    #[test]
    fn retry_only_upgrades() {
        let mut agg = TrackAggregator::new();
        let mut params = DriveParams {
            num_cyl: 1,
            num_head: 1,
            num_sectors: 2,
            sector_size: 4,
            ..Default::default()
        };
        let mut list = vec![status(SectorFlags::BAD_HEADER, 0); 2];

        // First read: sector 0 ok.
        let mut s = status(SectorFlags::HEADER_FOUND, 0);
        s.sector = 0;
        assert!(agg
            .write_sector(&mut params, &mut s, &mut list, &[1, 2, 3, 4], &[0; 8])
            .unwrap());
        assert!(!list[0].status.contains(SectorFlags::BAD_HEADER));

        // Retry with bad data must not replace the good copy.
        let mut worse = status(SectorFlags::HEADER_FOUND | SectorFlags::BAD_DATA, 0);
        worse.sector = 0;
        assert!(agg
            .write_sector(&mut params, &mut worse, &mut list, &[9; 4], &[0; 8])
            .unwrap());
        assert!(!list[0].status.contains(SectorFlags::BAD_DATA));
        assert!(list[0].last_status.contains(SectorFlags::BAD_DATA));
    }

    #[test]
    fn smaller_ecc_span_wins() {
        let mut agg = TrackAggregator::new();
        let mut params = DriveParams {
            num_cyl: 1,
            num_head: 1,
            num_sectors: 1,
            sector_size: 4,
            ..Default::default()
        };
        let mut list = vec![status(SectorFlags::BAD_HEADER, 0); 1];

        let mut corrected = status(SectorFlags::HEADER_FOUND | SectorFlags::ECC_RECOVERED, 5);
        assert!(agg
            .write_sector(&mut params, &mut corrected, &mut list, &[0; 4], &[0; 8])
            .unwrap());
        assert_eq!(list[0].ecc_span_corrected_data, 5);

        // A smaller correction replaces it.
        let mut better = status(SectorFlags::HEADER_FOUND | SectorFlags::ECC_RECOVERED, 2);
        assert!(agg
            .write_sector(&mut params, &mut better, &mut list, &[0; 4], &[0; 8])
            .unwrap());
        assert_eq!(list[0].ecc_span_corrected_data, 2);

        // A larger one does not.
        let mut larger = status(SectorFlags::HEADER_FOUND | SectorFlags::ECC_RECOVERED, 4);
        assert!(agg
            .write_sector(&mut params, &mut larger, &mut list, &[0; 4], &[0; 8])
            .unwrap());
        assert_eq!(list[0].ecc_span_corrected_data, 2);
    }

    #[test]
    fn out_of_range_sector_rejected() {
        let mut agg = TrackAggregator::new();
        let mut params = DriveParams {
            num_cyl: 1,
            num_head: 1,
            num_sectors: 4,
            first_sector_number: 1,
            sector_size: 4,
            ..Default::default()
        };
        let mut list = vec![status(SectorFlags::BAD_HEADER, 0); 4];
        let mut s = status(SectorFlags::HEADER_FOUND, 0);
        s.sector = 0; // Below first_sector_number
        assert!(!agg
            .write_sector(&mut params, &mut s, &mut list, &[0; 4], &[0; 8])
            .unwrap());
        let mut s = status(SectorFlags::HEADER_FOUND, 0);
        s.sector = 5; // Beyond the last sector
        assert!(!agg
            .write_sector(&mut params, &mut s, &mut list, &[0; 4], &[0; 8])
            .unwrap());
    }

    #[test]
    fn alt_track_mappings_dedup() {
        let mut agg = TrackAggregator::new();
        let params = DriveParams {
            num_cyl: 10,
            num_head: 2,
            num_sectors: 17,
            sector_size: 512,
            ..Default::default()
        };
        agg.record_alt_track(&params, (5, 0), (6, 0));
        agg.record_alt_track(&params, (5, 0), (6, 0));
        assert_eq!(agg.alt_track_count(), 1);
    }
}
