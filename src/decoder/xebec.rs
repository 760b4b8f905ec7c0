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

    src/decoder/xebec.rs

    Framer for Xebec-style formats. The header starts with zero gap bytes and
    a 0xc2 compare byte; after the 0x4489 mark the framer waits through a
    long zero run and resynchronizes on a single one bit (0x49 pattern)
    before both the header and the data area.
*/

use super::{check_header_values, fix_head, process_bytes, SectorFlags, SectorStatus, State, TrackCtx};
use crate::check::crc64;
use crate::codec::mfm::CODE_BITS;
use crate::deltas::DeltaSource;
use crate::msg::MsgMask;
use crate::pll::PllDecoder;
use crate::registry::{self, Controller};
use crate::{msg, MfmError, CLOCKS_TO_NS, MAX_SECTOR_SIZE};

const DATA_IGNORE_BYTES: usize = 8;
// Zero words before the 0x4489 is trusted. One EC1841 sample used a short
// gap before the last sector of the track.
const MARK_NUM_ZEROS: u32 = 8;
const MARK_NUM_ZEROS_EC1841: u32 = 0;

pub(crate) fn decode_track(ctx: &mut TrackCtx, source: &mut dyn DeltaSource) -> Result<SectorFlags, MfmError> {
    let info = registry::info(ctx.params.controller);
    let clk_rate_hz = ctx.params.clk_rate_hz();
    let mark_num_zero = if ctx.params.controller == Controller::Ec1841 {
        MARK_NUM_ZEROS_EC1841
    } else {
        MARK_NUM_ZEROS
    };

    let mut raw_word: u32 = 0;
    let mut raw_bit_cntr: u32 = 0;
    let mut decoded_word: u32 = 0;
    let mut decoded_bit_cntr: u32 = 0;
    let mut state = State::MarkId;
    let mut all_sector_status = SectorFlags::empty();
    let mut sync_count: u32 = 0;
    let mut bytes = vec![0u8; MAX_SECTOR_SIZE + 50];
    let mut bytes_needed: usize = 0;
    let mut bytes_crc_len: usize = 0;
    let mut byte_cntr: usize = 0;
    let mut all_raw_bits_count: usize = 0;
    let mut first_addr_mark_ns: u32 = 0;

    let mut pll = PllDecoder::new(source, clk_rate_hz);

    while let Some(int_bit_pos) = pll.next_chunk() {
        if all_raw_bits_count + int_bit_pos as usize >= 32 {
            all_raw_bits_count = ctx
                .agg
                .sink_mut()
                .save_raw_word(all_raw_bits_count, int_bit_pos as usize, raw_word);
        } else {
            all_raw_bits_count += int_bit_pos as usize;
        }
        raw_word = if int_bit_pos >= 32 { 1 } else { (raw_word << int_bit_pos) | 1 };
        raw_bit_cntr += int_bit_pos;

        match state {
            State::MarkId => {
                if raw_word == 0x5555_5555 || raw_word == 0xaaaa_aaaa {
                    sync_count += 1;
                } else if sync_count < mark_num_zero {
                    sync_count = 0;
                }
                if raw_word & 0xffff == 0x4489 && sync_count >= mark_num_zero {
                    if first_addr_mark_ns == 0 {
                        first_addr_mark_ns = pll.track_time.wrapping_mul(CLOCKS_TO_NS);
                    }
                    sync_count = 0;
                    state = State::HeaderSync;
                    raw_bit_cntr = 0;
                    decoded_word = 0;
                    decoded_bit_cntr = 0;
                }
            }
            State::HeaderSync | State::DataSync => {
                // Wait for the one bit to resynchronize. Requiring a long
                // zero run first avoids triggering on bit errors.
                sync_count += 1;
                if sync_count > 50 && raw_word & 0xff == 0x49 {
                    // The one isn't data; the zeros following are.
                    raw_bit_cntr = 3;
                    sync_count = 0;
                    decoded_word = 0;
                    decoded_bit_cntr = 0;
                    if state == State::HeaderSync {
                        state = State::ProcessHeader;
                        ctx.agg.sink_mut().mark_header();
                        bytes_crc_len = info.header_bytes + ctx.params.header_crc.crc_bytes();
                        bytes_needed = bytes_crc_len;
                    } else {
                        state = State::ProcessData;
                        ctx.agg.sink_mut().mark_data(all_raw_bits_count);
                        bytes_crc_len = info.data_header_bytes
                            + info.data_trailer_bytes
                            + ctx.params.sector_size
                            + ctx.params.data_crc.crc_bytes();
                        // 256 byte sectors leave less gap, so fewer trailing
                        // bytes can be discarded.
                        bytes_needed = if ctx.params.controller == Controller::SoloSystems
                            && ctx.params.sector_size == 256
                        {
                            1 + bytes_crc_len
                        } else {
                            DATA_IGNORE_BYTES + bytes_crc_len
                        };
                        if bytes_needed >= bytes.len() {
                            return Err(MfmError::ParameterError(format!(
                                "too many bytes needed {}",
                                bytes_needed
                            )));
                        }
                    }
                    byte_cntr = 0;
                }
            }
            State::ProcessHeader | State::ProcessData => {
                let entry_state = state;
                while raw_bit_cntr >= 4 && entry_state == state {
                    raw_bit_cntr -= 4;
                    let tmp_raw_word = raw_word >> raw_bit_cntr;
                    decoded_word = (decoded_word << 2) | CODE_BITS[(tmp_raw_word & 0xf) as usize] as u32;
                    decoded_bit_cntr += 2;
                    if decoded_bit_cntr >= 8 {
                        if byte_cntr < bytes_needed {
                            bytes[byte_cntr] = decoded_word as u8;
                            byte_cntr += 1;
                        }
                        if byte_cntr == bytes_needed {
                            all_sector_status |= process_bytes(
                                ctx,
                                &mut bytes,
                                bytes_crc_len,
                                bytes_needed,
                                &mut state,
                                SectorFlags::empty(),
                            )?;
                        }
                        decoded_bit_cntr = 0;
                    }
                }
            }
            _ => {}
        }
    }

    if matches!(state, State::ProcessHeader | State::ProcessData)
        && ctx.sector_index <= ctx.params.num_sectors as usize
    {
        let begin_time = ((bytes_needed - byte_cntr) as f64 * 16.0 * 1e9 / clk_rate_hz as f64
            + first_addr_mark_ns as f64)
            / 2.0
            + ctx.params.start_time_ns as f64;
        let begin_time = (begin_time / 1000.0).round() as u32 * 1000;
        if !ctx.params.analyze_in_progress {
            ctx.params.suggested_begin_time_ns = Some(begin_time);
        }
        msg!(
            ctx.params.msg_mask,
            MsgMask::ERR,
            "Ran out of data on sector index {}, try reading with --begin_time {}",
            ctx.sector_index,
            begin_time
        );
    }

    ctx.agg.sink_mut().flush(all_raw_bits_count, raw_word);

    if all_sector_status.is_empty() {
        all_sector_status = SectorFlags::BAD_HEADER;
    }
    Ok(all_sector_status)
}

pub(crate) fn process_data(
    ctx: &mut TrackCtx,
    state: &mut State,
    bytes: &mut [u8],
    total_bytes: usize,
    crc: u64,
    ecc_span: u32,
    init_status: SectorFlags,
) -> Result<SectorFlags, MfmError> {
    if *state == State::ProcessHeader {
        ctx.sector.alt_assigned = false;
        ctx.sector.alt_assigned_handled = false;
        ctx.sector.is_alternate = false;
        ctx.sector.bad_block = false;
        ctx.sector.status = SectorStatus {
            status: init_status | SectorFlags::HEADER_FOUND,
            ecc_span_corrected_header: ecc_span,
            ..Default::default()
        };
        if ecc_span != 0 {
            ctx.sector.status.status |= SectorFlags::ECC_RECOVERED;
        }
        ctx.sector.sector_size = ctx.params.sector_size;

        let exp_head = ctx.ch.h();
        let s = &mut ctx.sector.status;
        match ctx.params.controller {
            Controller::SoloSystems => {
                s.cyl = (bytes[3] as u32) << 8 | bytes[4] as u32;
                s.head = fix_head(ctx.params, exp_head, (bytes[5] & 0x7f) as u32);
                s.sector = ((bytes[2] >> 1) & 0x1f) as u32;
                if bytes[0] != 0 || bytes[1] != 0 {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::INFO,
                        "Header gap bytes not zero: {:02x}, {:02x} on cyl {} head {} sector {}",
                        bytes[0],
                        bytes[1],
                        s.cyl,
                        s.head,
                        s.sector
                    );
                }
                ctx.sector.alt_assigned = bytes[6] & 0x01 != 0;
                ctx.sector.is_alternate = bytes[6] & 0x04 != 0;
                if bytes[6] & 0xea != 0x80 {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::ERR,
                        "Header flag byte not expected value: {:02x} on cyl {} head {} sector {}",
                        bytes[6],
                        s.cyl,
                        s.head,
                        s.sector
                    );
                    s.status |= SectorFlags::BAD_HEADER;
                }
            }
            _ => {
                s.cyl = (bytes[3] as u32) << 8 | bytes[4] as u32;
                s.head = fix_head(ctx.params, exp_head, (bytes[5] & 0xf) as u32);
                s.sector = bytes[6] as u32;
                // The S1410 sets the head byte MSB from cylinder 132 on.
                if bytes[5] & 0x70 != 0 {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::ERR,
                        "Upper bits set in head byte: {:02x} on cyl {} head {} sector {}",
                        bytes[5],
                        s.cyl,
                        s.head,
                        s.sector
                    );
                    s.status |= SectorFlags::BAD_HEADER;
                }
                if bytes[0] != 0 || bytes[1] != 0 || bytes[8] != 0 {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::INFO,
                        "Header gap bytes not zero: {:02x}, {:02x}, {:02x} on cyl {} head {} sector {}",
                        bytes[0],
                        bytes[1],
                        bytes[8],
                        s.cyl,
                        s.head,
                        s.sector
                    );
                }
                if bytes[2] != 0xc2 {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::ERR,
                        "Header compare byte not 0xc2: {:02x} on cyl {} head {} sector {}",
                        bytes[2],
                        s.cyl,
                        s.head,
                        s.sector
                    );
                    s.status |= SectorFlags::BAD_HEADER;
                }
                ctx.sector.alt_assigned = bytes[7] & 0x01 != 0;
                ctx.sector.is_alternate = bytes[7] & 0x04 != 0;
                let compare = if ctx.params.controller == Controller::XebecS1420 {
                    0xc0
                } else {
                    0x80
                };
                if bytes[7] & 0xea != compare {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::ERR,
                        "Header flag byte not {:02x} value: {:02x} on cyl {} head {} sector {}",
                        compare,
                        bytes[7],
                        s.cyl,
                        s.head,
                        s.sector
                    );
                    s.status |= SectorFlags::BAD_HEADER;
                }
            }
        }
        if ctx.sector.is_alternate {
            msg!(
                ctx.params.msg_mask,
                MsgMask::INFO,
                "Alternate cylinder set on cyl {}, head {}",
                ctx.sector.status.cyl,
                ctx.sector.status.head
            );
        }
        msg!(
            ctx.params.msg_mask,
            MsgMask::DEBUG,
            "Got exp {},{} cyl {} head {} sector {} size {}",
            ctx.ch.c(),
            ctx.ch.h(),
            ctx.sector.status.cyl,
            ctx.sector.status.head,
            ctx.sector.status.sector,
            ctx.sector.sector_size
        );
        let sector_size = ctx.sector.sector_size;
        check_header_values(ctx, sector_size);
        *state = State::DataSync;
        return Ok(ctx.sector.status.status);
    }

    // Data area.
    let mut status = init_status;
    ctx.sector.status.status |= init_status;

    if bytes[0] != 0 {
        msg!(
            ctx.params.msg_mask,
            MsgMask::INFO,
            "Data gap byte not zero {:02x} on cyl {} head {} sector {}",
            bytes[0],
            ctx.sector.status.cyl,
            ctx.sector.status.head,
            ctx.sector.status.sector
        );
    }
    let compare = match ctx.params.controller {
        Controller::Ec1841 | Controller::SoloSystems => 0x00,
        _ => 0xc9,
    };
    if bytes[1] != compare {
        msg!(
            ctx.params.msg_mask,
            MsgMask::INFO,
            "Data compare byte not {:02x}: {:02x} on cyl {} head {} sector {}",
            compare,
            bytes[1],
            ctx.sector.status.cyl,
            ctx.sector.status.head,
            ctx.sector.status.sector
        );
        status |= SectorFlags::BAD_DATA;
        ctx.sector.status.status |= SectorFlags::BAD_DATA;
    }
    if ctx.sector.alt_assigned {
        // An assigned-alternate sector only checksums the alternate header
        // information; the checksum at the end of the sector is zero.
        if crc64(&bytes[0..9], &ctx.params.header_crc) == 0 {
            let bad = (ctx.sector.status.cyl, ctx.sector.status.head);
            let good = ((bytes[2] as u32) << 8 | bytes[3] as u32, bytes[4] as u32);
            msg!(
                ctx.params.msg_mask,
                MsgMask::INFO,
                "cyl {} head {} assigned alternate cyl {} head {} (extract data fixed)",
                bad.0,
                bad.1,
                good.0,
                good.1
            );
            ctx.agg.record_alt_track(ctx.params, bad, good);
            ctx.sector.alt_assigned_handled = true;
        } else {
            status |= SectorFlags::BAD_DATA;
            ctx.sector.status.status |= SectorFlags::BAD_DATA;
        }
    } else if crc != 0 {
        status |= SectorFlags::BAD_DATA;
        ctx.sector.status.status |= SectorFlags::BAD_DATA;
    }
    if ecc_span != 0 {
        ctx.sector.status.status |= SectorFlags::ECC_RECOVERED;
    }
    ctx.sector.status.ecc_span_corrected_data = ecc_span;
    if !ctx.sector.status.status.contains(SectorFlags::BAD_HEADER) {
        let sector_size = ctx.params.sector_size;
        let mut sector_status = ctx.sector.status;
        let ok = ctx.agg.write_sector(
            ctx.params,
            &mut sector_status,
            ctx.list,
            &bytes[2..2 + sector_size],
            &bytes[..total_bytes],
        )?;
        ctx.sector.status = sector_status;
        if !ok {
            ctx.sector.status.status |= SectorFlags::BAD_HEADER;
            status |= SectorFlags::BAD_HEADER;
        }
    }
    *state = State::MarkId;
    Ok(status | ctx.sector.status.status)
}
