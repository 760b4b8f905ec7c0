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

    src/params.rs

    Drive parameters shaping one decode or encode run, and the statistics
    collected along the way.
*/

use crate::check::CrcInfo;
use crate::msg::MsgMask;
use crate::registry::{self, Controller};
use crate::MfmError;

/// Statistics from reading the drive, used to print a summary when finished.
#[derive(Clone, Debug)]
pub struct Stats {
    pub max_sect: u32,
    pub min_sect: u32,
    pub max_head: u32,
    pub min_head: u32,
    pub max_cyl: u32,
    pub min_cyl: u32,
    pub num_good_sectors: u32,
    pub num_bad_header: u32,
    pub num_bad_data: u32,
    pub num_spare_bad: u32,
    pub num_ecc_recovered: u32,
    pub num_retries: u32,
    pub max_ecc_span: u32,
    pub max_track_words: usize,
    pub emu_data_truncated: bool,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            max_sect: 0,
            min_sect: u32::MAX,
            max_head: 0,
            min_head: u32::MAX,
            max_cyl: 0,
            min_cyl: u32::MAX,
            num_good_sectors: 0,
            num_bad_header: 0,
            num_bad_data: 0,
            num_spare_bad: 0,
            num_ecc_recovered: 0,
            num_retries: 0,
            max_ecc_span: 0,
            max_track_words: 0,
            emu_data_truncated: false,
        }
    }
}

impl Stats {
    /// True once at least one header has been seen.
    pub fn any_found(&self) -> bool {
        self.min_cyl != u32::MAX
    }
}

/// Address of a sector the encoder should mark bad.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MarkBad {
    pub cyl: u32,
    pub head: u32,
    pub sector: u32,
}

/// Format special cases detected while running.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FormatAdjust {
    #[default]
    None,
    /// Adaptec variant where the low flag bits count bad blocks skipped so
    /// far, shifting the expected sector ordering.
    AdaptecCountBadBlocks,
}

/// Where the start-time offset came from. A value read from an input file may
/// not be overridden from the command line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StartTimeSource {
    #[default]
    Default,
    File,
    CommandLine,
}

/// The main structure defining the drive characteristics for one run.
#[derive(Clone, Debug)]
pub struct DriveParams {
    pub num_cyl: u32,
    pub num_head: u32,
    pub num_sectors: u32,
    /// Number of the first sector. Some disks start at 0, others 1.
    pub first_sector_number: u32,
    /// Size of the data area of a sector in bytes.
    pub sector_size: usize,
    /// CRC/ECC used for the header and data areas.
    pub header_crc: CrcInfo,
    pub data_crc: CrcInfo,
    /// Track format.
    pub controller: Controller,
    /// Expected sector numbering when interleave is known. None disables the
    /// ordering check.
    pub sector_numbers: Option<Vec<u8>>,
    /// One WD controller truncated the head number to 3 bits in the header.
    pub head_3bit: bool,
    /// Number of re-reads to attempt when a track has errors.
    pub retries: u32,
    pub no_seek_retries: u32,
    pub ignore_header_mismatch: bool,
    /// Time after index to start reading, in nanoseconds.
    pub start_time_ns: u32,
    pub start_time_source: StartTimeSource,
    /// Override of the profile's bit-cell rate (the --rate knob).
    pub rate_hz: Option<u32>,
    /// Sectors to mark bad when encoding, sorted ascending.
    pub mark_bad_list: Vec<MarkBad>,
    pub sector_interleave: u32,
    pub track_interleave: u32,
    /// Enabled report classes (the --quiet knob).
    pub msg_mask: MsgMask,
    pub format_adjust: FormatAdjust,
    /// Nonzero while the analyzer is trial-decoding; relaxes some reporting.
    pub analyze_in_progress: bool,
    pub analyze_cyl: u32,
    pub analyze_head: u32,
    /// Set when a track ran out of data mid-sector: the begin_time that
    /// would likely have captured the whole track.
    pub suggested_begin_time_ns: Option<u32>,
    pub stats: Stats,
}

impl Default for DriveParams {
    fn default() -> Self {
        DriveParams {
            num_cyl: 0,
            num_head: 0,
            num_sectors: 0,
            first_sector_number: 0,
            sector_size: 512,
            header_crc: CrcInfo::default(),
            data_crc: CrcInfo::default(),
            controller: Controller::None,
            sector_numbers: None,
            head_3bit: false,
            retries: 8,
            no_seek_retries: 2,
            ignore_header_mismatch: false,
            start_time_ns: 0,
            start_time_source: StartTimeSource::Default,
            rate_hz: None,
            mark_bad_list: Vec::new(),
            sector_interleave: 1,
            track_interleave: 0,
            msg_mask: MsgMask::default(),
            format_adjust: FormatAdjust::None,
            analyze_in_progress: false,
            analyze_cyl: 0,
            analyze_head: 0,
            suggested_begin_time_ns: None,
            stats: Stats::default(),
        }
    }
}

impl DriveParams {
    /// Set the controller and pull its canonical geometry and check
    /// parameters into the drive parameters.
    pub fn set_controller(&mut self, controller: Controller) {
        let info = registry::info(controller);
        self.controller = controller;
        if info.write_num_sectors != 0 {
            self.num_sectors = info.write_num_sectors;
            self.sector_size = info.write_sector_size;
            self.first_sector_number = info.write_first_sector_number;
        }
        if info.write_header_crc.length != 0 {
            self.header_crc = info.write_header_crc;
        }
        if info.write_data_crc.length != 0 {
            self.data_crc = info.write_data_crc;
        }
        if self.start_time_source == StartTimeSource::Default {
            self.start_time_ns = info.start_time_ns;
        }
    }

    /// Bit-cell clock for the current profile, honoring the rate override.
    pub fn clk_rate_hz(&self) -> u32 {
        self.rate_hz.unwrap_or(registry::info(self.controller).clk_rate_hz)
    }

    /// Size of each emulator track's data, assuming 3600 RPM, rounded to a
    /// whole number of words.
    pub fn emu_track_data_bytes(&self) -> usize {
        let bytes = (1.0 / 60.0 * self.clk_rate_hz() as f64 / 8.0 / 4.0).ceil() as usize;
        bytes * 4
    }

    /// Record a start-time offset read from an input file header. Once set
    /// this way it wins over later command-line overrides.
    pub fn set_start_time_from_file(&mut self, ns: u32) {
        if ns != 0 {
            self.start_time_ns = ns;
            self.start_time_source = StartTimeSource::File;
        }
    }

    /// Apply the --begin_time override. Refused when the offset came from an
    /// input file.
    pub fn set_begin_time(&mut self, ns: u32) -> Result<(), MfmError> {
        if self.start_time_source == StartTimeSource::File {
            return Err(MfmError::StartTimeLocked);
        }
        self.start_time_ns = ns;
        self.start_time_source = StartTimeSource::CommandLine;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_pulls_write_parameters() {
        let mut dp = DriveParams::default();
        dp.set_controller(Controller::Omti5510);
        assert_eq!(dp.sector_size, 512);
        assert_eq!(dp.num_sectors, 17);
        assert_eq!(dp.header_crc.poly, 0x0104c981);
        assert_eq!(dp.header_crc.init_value, 0x2605fb9c);
        assert_eq!(dp.data_crc.init_value, 0xd4d7ca20);
    }

    #[test]
    fn emu_track_bytes_are_word_aligned() {
        let mut dp = DriveParams::default();
        dp.set_controller(Controller::Wd1006);
        let bytes = dp.emu_track_data_bytes();
        assert_eq!(bytes % 4, 0);
        // 10 MHz at 3600 RPM: ~20833 bytes rounded up to words.
        assert_eq!(bytes, 20836);
    }

    #[test]
    fn file_start_time_locks_out_cmdline() {
        let mut dp = DriveParams::default();
        dp.set_start_time_from_file(460_000);
        assert!(dp.set_begin_time(0).is_err());
        assert_eq!(dp.start_time_ns, 460_000);

        let mut dp2 = DriveParams::default();
        assert!(dp2.set_begin_time(100_500).is_ok());
        assert_eq!(dp2.start_time_ns, 100_500);
    }
}
