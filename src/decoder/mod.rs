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

//! The sector framer: per-track state machines fed by the PLL bit stream.
//! Each controller family has its own decode loop; the shared pieces here
//! check the recovered bytes, apply ECC, and validate header fields against
//! the expected track.

pub(crate) mod corvus;
pub(crate) mod northstar;
pub(crate) mod wd;
pub(crate) mod xebec;

use crate::aggregator::TrackAggregator;
use crate::check::{checksum64, crc64, ecc64, eparity64, xor16};
use crate::chs::DiskCh;
use crate::deltas::DeltaSource;
use crate::msg::MsgMask;
use crate::params::DriveParams;
use crate::registry::{self, CheckKind, Controller, DecoderFamily};
use crate::{msg, MfmError};
use bitflags::bitflags;

bitflags! {
    /// Per-sector decode status bits.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SectorFlags: u32 {
        /// Only one of BAD_HEADER / BAD_DATA is set at a time. BAD_HEADER is
        /// initially set until a good header is found, then BAD_DATA until
        /// good data.
        const BAD_DATA          = 0x001;
        const BAD_HEADER        = 0x002;
        /// Sector hasn't been written yet.
        const NOT_WRITTEN       = 0x004;
        const WRONG_CYL         = 0x008;
        const ECC_RECOVERED     = 0x010;
        const HEADER_FOUND      = 0x020;
        const ZERO_DATA_CRC     = 0x040;
        const ZERO_HEADER_CRC   = 0x080;
        /// Spare or bad-marked sector without user data. Suppresses counting
        /// other errors on this sector. Some formats flag bad blocks with an
        /// out-of-range sector number; that state shares this bit.
        const SPARE_BAD         = 0x100;
        const BAD_SECTOR_NUMBER = 0x100;
        const BAD_LBA_NUMBER    = 0x200;
        /// Treat as an error for analysis but otherwise ignore.
        const ANALYZE_ERROR     = 0x400;
        /// The checked bytes were all zero, so a zero CRC matches any
        /// polynomial and proves nothing.
        const AMBIGUOUS_CRC     = 0x800;
    }
}

impl SectorFlags {
    /// A sector is unrecovered when its header or data is bad and it isn't a
    /// spare/bad-marked sector.
    pub fn unrecovered(self) -> bool {
        self.intersects(SectorFlags::BAD_HEADER | SectorFlags::BAD_DATA) && !self.contains(SectorFlags::SPARE_BAD)
    }

    /// Bits that disqualify a trial decode during format analysis.
    pub fn analyze_wrong_format(self) -> bool {
        self.intersects(SectorFlags::ANALYZE_ERROR | SectorFlags::BAD_LBA_NUMBER)
    }
}

/// The state of one decoded sector.
#[derive(Copy, Clone, Debug, Default)]
pub struct SectorStatus {
    /// Span of any ECC correction in bits. 0 if no correction.
    pub ecc_span_corrected_data: u32,
    pub ecc_span_corrected_header: u32,
    /// Difference between expected and actual cylinder.
    pub cyl_difference: i32,
    pub cyl: u32,
    pub head: u32,
    pub sector: u32,
    pub is_lba: bool,
    pub lba_addr: u32,
    /// Sequential count of sectors from 0. Only accurate when no preceding
    /// header errors.
    pub logical_sector: usize,
    pub status: SectorFlags,
    pub last_status: SectorFlags,
}

/// Set a sector status list to bad-header, the default before decode finds
/// anything.
pub fn init_sector_status_list(list: &mut [SectorStatus]) {
    for s in list.iter_mut() {
        *s = SectorStatus {
            status: SectorFlags::BAD_HEADER,
            ..Default::default()
        };
    }
}

/// Where the framer is in decoding a sector. MARK_ID searches for the sync
/// before a header, MARK_DATA for the data area's sync. MARK_DATA1 is the
/// Symbolics 3640 one-bit resync; MARK_DATA2 a nibble-level resync used by a
/// few formats. HEADER_SYNC and DATA_SYNC are the Xebec one-bit syncs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    MarkId,
    MarkData,
    MarkData1,
    MarkData2,
    HeaderSync,
    DataSync,
    ProcessHeader,
    ProcessHeader2,
    ProcessData,
}

/// Per-sector scratch shared between header and data processing. What the
/// original kept in function statics.
#[derive(Clone, Debug, Default)]
pub(crate) struct SectorCtx {
    pub status: SectorStatus,
    pub sector_size: usize,
    pub bad_block: bool,
    pub alt_assigned: bool,
    pub alt_assigned_handled: bool,
    pub is_alternate: bool,
    /// Cleared after the first spare/bad sector. Only used by Adaptec.
    pub first_spare_bad_sector: bool,
    /// The metadata field of the current sector was captured.
    pub metadata_captured: bool,
}

/// Everything one track decode shares across states.
pub(crate) struct TrackCtx<'a> {
    pub params: &'a mut DriveParams,
    pub agg: &'a mut TrackAggregator,
    pub ch: DiskCh,
    pub sector_index: usize,
    pub seek_difference: &'a mut i32,
    pub list: &'a mut [SectorStatus],
    pub sector: SectorCtx,
}

/// Decode one track of deltas with the controller configured in `params`.
/// Returns the OR of every decoded sector's status. The aggregator receives
/// the raw track words and the best sector data.
pub fn decode_track(
    params: &mut DriveParams,
    ch: DiskCh,
    source: &mut dyn DeltaSource,
    agg: &mut TrackAggregator,
    seek_difference: &mut i32,
    sector_status_list: &mut [SectorStatus],
) -> Result<SectorFlags, MfmError> {
    for s in sector_status_list.iter_mut() {
        s.last_status = SectorFlags::BAD_HEADER;
    }
    let family = registry::info(params.controller).family;
    let status = {
        let mut ctx = TrackCtx {
            params: &mut *params,
            agg: &mut *agg,
            ch,
            sector_index: 0,
            seek_difference,
            list: &mut *sector_status_list,
            sector: SectorCtx {
                first_spare_bad_sector: true,
                ..Default::default()
            },
        };
        match family {
            DecoderFamily::Wd => wd::decode_track(&mut ctx, source)?,
            DecoderFamily::Xebec => xebec::decode_track(&mut ctx, source)?,
            DecoderFamily::Corvus => corvus::decode_track(&mut ctx, source)?,
            DecoderFamily::Northstar => northstar::decode_track(&mut ctx, source)?,
        }
    };
    agg.update_stats(params, Some(ch), Some(&*sector_status_list))?;
    Ok(status)
}

/// Fix up a header head value for controllers that truncate the head number
/// to 3 bits.
pub(crate) fn fix_head(params: &DriveParams, exp_head: u32, head: u32) -> u32 {
    if params.head_3bit && head == (exp_head & 0x7) {
        exp_head
    } else {
        head
    }
}

/// Check that header values are reasonable and match the track being read.
/// A cylinder mismatch reports the seek difference so the caller can retry
/// the seek.
pub(crate) fn check_header_values(ctx: &mut TrackCtx, sector_size: usize) {
    let exp_cyl = ctx.ch.c();
    let exp_head = ctx.ch.h();
    let sector = &mut ctx.sector.status;

    if ctx.params.ignore_header_mismatch {
        sector.logical_sector = ctx.sector_index;
        ctx.sector_index += 1;
        return;
    }

    if sector.head != exp_head || sector.cyl != exp_cyl {
        msg!(
            ctx.params.msg_mask,
            MsgMask::ERR,
            "Mismatch cyl {},{} head {},{} index {}",
            sector.cyl,
            exp_cyl,
            sector.head,
            exp_head,
            ctx.sector_index
        );
        sector.status |= SectorFlags::BAD_HEADER;
        if sector.cyl != exp_cyl {
            sector.status |= SectorFlags::WRONG_CYL;
            sector.cyl_difference = exp_cyl as i32 - sector.cyl as i32;
            *ctx.seek_difference = sector.cyl_difference;
        }
    }

    // When the expected sector ordering is known, match the sector number
    // against it and note skipped sectors.
    if let Some(numbers) = ctx.params.sector_numbers.as_deref() {
        let orig_index = ctx.sector_index;
        while ctx.sector_index < ctx.params.num_sectors as usize {
            if sector.sector == numbers[ctx.sector_index] as u32 {
                break;
            }
            ctx.sector_index += 1;
        }
        if ctx.sector_index > orig_index + 1 && ctx.sector_index < ctx.params.num_sectors as usize {
            msg!(
                ctx.params.msg_mask,
                MsgMask::ERR,
                "Cyl {} head {} Missed sector between {}({}) and {}({})",
                sector.cyl,
                sector.head,
                numbers[orig_index],
                orig_index,
                numbers[ctx.sector_index],
                ctx.sector_index
            );
        }
        if ctx.sector_index >= ctx.params.num_sectors as usize {
            msg!(
                ctx.params.msg_mask,
                MsgMask::ERR_SERIOUS,
                "Cyl {} head {} Sector {} not found in expected sector list after {}({})",
                sector.cyl,
                sector.head,
                sector.sector,
                numbers[orig_index],
                orig_index
            );
            sector.status |= SectorFlags::BAD_HEADER;
            ctx.sector_index = orig_index;
        }
        sector.logical_sector = ctx.sector_index;
    } else {
        sector.logical_sector = ctx.sector_index;
        ctx.sector_index += 1;
    }

    if sector_size != ctx.params.sector_size {
        msg!(
            ctx.params.msg_mask,
            MsgMask::ERR,
            "Expected sector size {} header says {} cyl {} head {} sector {}",
            ctx.params.sector_size,
            sector_size,
            sector.cyl,
            sector.head,
            sector.sector
        );
    }
}

/// Result of checking a field's bytes.
pub(crate) struct CheckResult {
    pub crc: u64,
    pub ecc_span: u32,
    pub init_status: SectorFlags,
}

/// Compute the check value over a captured field and optionally apply ECC
/// correction. `header` selects the header check parameters; the data check
/// is used otherwise (including the metadata field).
pub(crate) fn crc_bytes(
    params: &mut DriveParams,
    controller: Controller,
    bytes: &mut [u8],
    bytes_crc_len: usize,
    header: bool,
    perform_ecc: bool,
) -> CheckResult {
    let info = registry::info(controller);
    let crc_info = if header { params.header_crc } else { params.data_crc };
    let (check_kind, start) = if header {
        (info.header_check, info.header_crc_ignore)
    } else {
        (info.data_check, info.data_crc_ignore)
    };
    let mut init_status = SectorFlags::empty();

    let checked = &bytes[start..bytes_crc_len];
    let crc_len_bytes = crc_info.crc_bytes();

    let mut crc = match (controller, header, check_kind) {
        // The Northstar checksum is stored twice, value and complement.
        (Controller::NorthstarAdvantage, _, _) => {
            let sum = checksum64(&checked[..checked.len() - crc_len_bytes], &crc_info);
            northstar_compare(checked, &crc_info, sum, params.msg_mask)
        }
        // The 3640 header has odd parity only; accept and let the field
        // compare catch corruption.
        (Controller::Symbolics3640, true, _) => 0,
        (_, _, CheckKind::Crc) => crc64(checked, &crc_info),
        (_, _, CheckKind::Checksum) => {
            let sum = crc_info.trim(checksum64(&checked[..checked.len() - crc_len_bytes], &crc_info));
            let stored = read_check_be(&checked[checked.len() - crc_len_bytes..]);
            (sum != stored) as u64
        }
        (_, _, CheckKind::Parity) => {
            let parity = eparity64(&checked[..checked.len() - crc_len_bytes], &crc_info);
            let stored = read_check_be(&checked[checked.len() - crc_len_bytes..]);
            (parity != stored) as u64
        }
        (_, _, CheckKind::Xor16) => {
            let x = xor16(&checked[..checked.len() - crc_len_bytes], &crc_info);
            let stored = read_check_be(&checked[checked.len() - crc_len_bytes..]);
            (x != stored) as u64
        }
        (_, _, CheckKind::None) => 0,
    };

    // A zero check over all-zero bytes matches every polynomial; flag it so
    // analysis doesn't false-positive on it.
    if crc == 0 && checked.iter().all(|&b| b == 0) {
        init_status |= SectorFlags::AMBIGUOUS_CRC;
    }
    if crc == 0 {
        init_status |= if header {
            SectorFlags::ZERO_HEADER_CRC
        } else {
            SectorFlags::ZERO_DATA_CRC
        };
    }

    let mut ecc_span = 0;
    if crc != 0 && perform_ecc && crc_info.ecc_max_span != 0 {
        ecc_span = ecc64(&mut bytes[..bytes_crc_len], crc, &crc_info);
        if ecc_span != 0 {
            params.stats.max_ecc_span = params.stats.max_ecc_span.max(ecc_span);
            crc = 0;
        }
    }

    CheckResult {
        crc,
        ecc_span,
        init_status,
    }
}

fn read_check_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn northstar_compare(checked: &[u8], crc_info: &crate::check::CrcInfo, sum: u64, mask: MsgMask) -> u64 {
    let n = checked.len();
    match crc_info.length {
        16 => {
            let sum = sum & 0xff;
            if sum == checked[n - 2] as u64 && sum == (checked[n - 1] ^ 0xff) as u64 {
                0
            } else {
                msg!(mask, MsgMask::DEBUG, "sum {:02x}: {:02x}, {:02x}", sum, checked[n - 2], checked[n - 1]);
                1
            }
        }
        32 => {
            let sum = sum & 0xffff;
            let chksum1 = (checked[n - 4] as u64) << 8 | checked[n - 3] as u64;
            let chksum2 = (checked[n - 2] as u64) << 8 | checked[n - 1] as u64;
            if sum == chksum1 && sum == (chksum2 ^ 0xffff) {
                0
            } else {
                msg!(mask, MsgMask::DEBUG, "sum {:04x}: {:04x}, {:04x}", sum, chksum1, chksum2);
                1
            }
        }
        _ => 1,
    }
}

/// After a valid mark has been found, check the captured bytes and hand them
/// to the family data processor. A header with a bad check is marked and the
/// framer returns to sync search so later sectors are still found.
pub(crate) fn process_bytes(
    ctx: &mut TrackCtx,
    bytes: &mut [u8],
    bytes_crc_len: usize,
    total_bytes: usize,
    state: &mut State,
    force_status: SectorFlags,
) -> Result<SectorFlags, MfmError> {
    let header = *state == State::ProcessHeader;
    if ctx.params.msg_mask.intersects(MsgMask::DEBUG_DATA) {
        crate::msg::dump_bytes(ctx.params.msg_mask, &bytes[..bytes_crc_len], ctx.ch, ctx.sector_index);
    }
    let controller = ctx.params.controller;
    let result = crc_bytes(ctx.params, controller, bytes, bytes_crc_len, header, true);
    let mut status = result.init_status | force_status;

    if result.crc != 0 {
        msg!(
            ctx.params.msg_mask,
            MsgMask::DEBUG,
            "Bad CRC {} cyl {} head {} sector index {}",
            if header { "header" } else { "data" },
            ctx.ch.c(),
            ctx.ch.h(),
            ctx.sector_index
        );
    }

    // Only process a header when its check passed; without a valid header we
    // don't know which sector we are decoding. Data is processed regardless
    // so a prior good copy is kept and statistics stay correct.
    if !header || result.crc == 0 || result.ecc_span != 0 {
        let family = registry::info(controller).family;
        status |= match family {
            DecoderFamily::Wd => wd::process_data(ctx, state, bytes, total_bytes, result.crc, result.ecc_span, status)?,
            DecoderFamily::Xebec => {
                xebec::process_data(ctx, state, bytes, total_bytes, result.crc, result.ecc_span, status)?
            }
            DecoderFamily::Corvus => {
                corvus::process_data(ctx, state, bytes, total_bytes, result.crc, result.ecc_span, status)?
            }
            DecoderFamily::Northstar => {
                northstar::process_data(ctx, state, bytes, total_bytes, result.crc, result.ecc_span, status)?
            }
        };
    } else {
        status |= SectorFlags::BAD_HEADER;
        // Search for the next header in case we are out of sync.
        *state = State::MarkId;
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecovered_follows_spare_rule() {
        assert!(SectorFlags::BAD_DATA.unrecovered());
        assert!(SectorFlags::BAD_HEADER.unrecovered());
        assert!(!(SectorFlags::BAD_DATA | SectorFlags::SPARE_BAD).unrecovered());
        assert!(!SectorFlags::ECC_RECOVERED.unrecovered());
    }

    #[test]
    fn init_list_sets_bad_header() {
        let mut list = [SectorStatus::default(); 4];
        init_sector_status_list(&mut list);
        assert!(list.iter().all(|s| s.status == SectorFlags::BAD_HEADER));
    }
}
