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

    src/decoder/northstar.rs

    Framer for the Northstar Advantage: a 7-byte header carrying the
    checksum twice (value and one's complement), data following the header
    with no gap, and one-bit resync after a long zero run.
*/

use super::{check_header_values, fix_head, process_bytes, SectorFlags, SectorStatus, State, TrackCtx};
use crate::codec::mfm::CODE_BITS;
use crate::deltas::DeltaSource;
use crate::msg::MsgMask;
use crate::pll::PllDecoder;
use crate::registry;
use crate::{msg, MfmError, CLOCKS_TO_NS, MAX_SECTOR_SIZE};

const MARK_NUM_ZEROS: u32 = 30;

pub(crate) fn decode_track(ctx: &mut TrackCtx, source: &mut dyn DeltaSource) -> Result<SectorFlags, MfmError> {
    let info = registry::info(ctx.params.controller);
    let clk_rate_hz = ctx.params.clk_rate_hz();

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

    let mut next_header_time: i64 = 74_000 - (ctx.params.start_time_ns / CLOCKS_TO_NS) as i64;

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
                if (pll.track_time as i64) > next_header_time
                    && (raw_word == 0x5555_5555 || raw_word == 0xaaaa_aaaa)
                {
                    sync_count += 1;
                } else if sync_count < MARK_NUM_ZEROS {
                    sync_count = 0;
                }
                if sync_count >= MARK_NUM_ZEROS {
                    sync_count = 0;
                    state = State::HeaderSync;
                    raw_bit_cntr = 0;
                    decoded_word = 0;
                    decoded_bit_cntr = 0;
                }
            }
            State::HeaderSync => {
                if raw_word & 0xf == 0x9 {
                    raw_bit_cntr = 0;
                    if first_addr_mark_ns == 0 {
                        first_addr_mark_ns = pll.track_time.wrapping_mul(CLOCKS_TO_NS);
                    }
                    decoded_word = 0;
                    decoded_bit_cntr = 0;
                    state = State::ProcessHeader;
                    ctx.agg.sink_mut().mark_header();
                    bytes_crc_len = info.header_bytes + ctx.params.header_crc.crc_bytes();
                    bytes_needed = bytes_crc_len;
                    byte_cntr = 0;
                }
            }
            State::DataSync => {
                // The data area directly follows the header; no gap and no
                // separate sync.
                state = State::ProcessData;
                ctx.agg.sink_mut().mark_data(all_raw_bits_count);
                bytes_crc_len = info.data_header_bytes
                    + info.data_trailer_bytes
                    + ctx.params.sector_size
                    + ctx.params.data_crc.crc_bytes();
                // Read enough extra bytes to push the last word into the
                // raw-word sink.
                bytes_needed = bytes_crc_len + 2;
                if bytes_needed >= bytes.len() {
                    return Err(MfmError::ParameterError(format!("too many bytes needed {}", bytes_needed)));
                }
                byte_cntr = 0;
            }
            State::ProcessHeader | State::ProcessData => {
                let entry_state = state;
                while raw_bit_cntr >= 4 && entry_state == state {
                    raw_bit_cntr -= 4;
                    let tmp_raw_word = raw_word >> raw_bit_cntr;
                    decoded_word = (decoded_word << 2) | CODE_BITS[(tmp_raw_word & 0xf) as usize] as u32;
                    decoded_bit_cntr += 2;
                    if decoded_bit_cntr >= 8 {
                        bytes[byte_cntr] = decoded_word as u8;
                        byte_cntr += 1;
                        if byte_cntr >= bytes_needed {
                            all_sector_status |= process_bytes(
                                ctx,
                                &mut bytes,
                                bytes_crc_len,
                                bytes_needed,
                                &mut state,
                                SectorFlags::empty(),
                            )?;
                            // Look again after the fill bytes: 45 bytes
                            // plus extra to get past junk from overwriting.
                            // 40 is 200 MHz clocks per data bit.
                            next_header_time = pll.track_time as i64 + 55 * 8 * 40;
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
        s.cyl = bytes[1] as u32 | ((bytes[0] & 0xf0) as u32) << 4;
        s.head = fix_head(ctx.params, exp_head, (bytes[2] & 0xf) as u32);
        s.sector = (bytes[0] & 0xf) as u32;
        if crc != 0 {
            s.status |= SectorFlags::BAD_HEADER;
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
    ctx.sector.status.status |= init_status;
    if crc != 0 {
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
            &bytes[..sector_size],
            &bytes[..total_bytes],
        )?;
        ctx.sector.status = sector_status;
        if !ok {
            ctx.sector.status.status |= SectorFlags::BAD_HEADER;
        }
    }
    *state = State::MarkId;
    Ok(ctx.sector.status.status)
}
