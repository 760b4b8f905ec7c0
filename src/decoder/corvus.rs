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

    src/decoder/corvus.rs

    Framer for formats without an 0xa1 address mark: Corvus, Cromemco, and
    Vector Graphic. Sync detection is gated by track time so the long zero
    runs inside data can't false-trigger; the actual sync is a single one
    bit. The header and sector data share one check-covered region.
*/

use super::{check_header_values, process_bytes, SectorFlags, SectorStatus, State, TrackCtx};
use crate::codec::mfm::CODE_BITS;
use crate::deltas::DeltaSource;
use crate::msg::MsgMask;
use crate::pll::PllDecoder;
use crate::registry::{self, Controller};
use crate::{msg, MfmError, CLOCKS_TO_NS, MAX_SECTOR_SIZE};

// Zero words before looking for the sync bit: write splices can produce
// codes that cause false syncs.
const MARK_NUM_ZEROS: u32 = 30;

pub(crate) fn decode_track(ctx: &mut TrackCtx, source: &mut dyn DeltaSource) -> Result<SectorFlags, MfmError> {
    let info = registry::info(ctx.params.controller);
    let clk_rate_hz = ctx.params.clk_rate_hz();

    let mut raw_word: u32 = 0;
    let mut raw_bit_cntr: i32 = 0;
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

    // When to start looking for the next header, in sample clocks. Starts a
    // little into the leading zero words.
    let mut next_header_time: i64 = match ctx.params.controller {
        Controller::CorvusH => 71_500,
        // Zeros found earlier cause false syncs unless skipped.
        Controller::Cromemco => 32_000,
        Controller::Vector4 | Controller::Vector4St506 => 58_000,
        _ => 0,
    };
    // Adjust for when data capture started.
    next_header_time -= (ctx.params.start_time_ns / CLOCKS_TO_NS) as i64;

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
        raw_bit_cntr += int_bit_pos as i32;

        match state {
            State::MarkId | State::MarkData => {
                if (pll.track_time as i64) > next_header_time
                    && (raw_word == 0x5555_5555 || raw_word == 0xaaaa_aaaa)
                {
                    sync_count += 1;
                } else if sync_count < MARK_NUM_ZEROS {
                    sync_count = 0;
                }
                if sync_count >= MARK_NUM_ZEROS {
                    sync_count = 0;
                    state = if state == State::MarkId {
                        State::HeaderSync
                    } else {
                        State::DataSync
                    };
                    raw_bit_cntr = 0;
                    decoded_word = 0;
                    decoded_bit_cntr = 0;
                }
            }
            State::HeaderSync | State::DataSync => {
                // Wait for the one bit to resynchronize.
                if raw_word & 0xf == 0x9 {
                    if first_addr_mark_ns == 0 {
                        first_addr_mark_ns = pll.track_time.wrapping_mul(CLOCKS_TO_NS);
                    }
                    // The header is attached to the data; the whole sector
                    // is one check-covered region.
                    bytes_crc_len = info.header_bytes
                        + ctx.params.sector_size
                        + info.data_trailer_bytes
                        + ctx.params.header_crc.crc_bytes();
                    match ctx.params.controller {
                        Controller::CorvusH => {
                            next_header_time += 164_900;
                            raw_bit_cntr = -2;
                        }
                        Controller::Vector4 | Controller::Vector4St506 => {
                            // Time from the current position in case drive
                            // rotation speed varies.
                            next_header_time = pll.track_time as i64 + 96_000;
                            raw_bit_cntr = 2;
                        }
                        Controller::Cromemco => {
                            // The 0x04 doubling as our sync starts the
                            // decoded data, so back up.
                            raw_bit_cntr = 12;
                        }
                        _ => {}
                    }
                    decoded_word = 0;
                    decoded_bit_cntr = 0;
                    state = if state == State::HeaderSync {
                        State::ProcessHeader
                    } else {
                        State::ProcessData
                    };
                    ctx.agg.sink_mut().mark_header();
                    ctx.agg.sink_mut().mark_data(all_raw_bits_count);
                    // Read enough extra bytes to push the last word into the
                    // raw-word sink.
                    bytes_needed = bytes_crc_len + 2;
                    if bytes_needed >= bytes.len() {
                        return Err(MfmError::ParameterError(format!("too many bytes needed {}", bytes_needed)));
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
                        } else {
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
    const CROMEMCO_SYNC: [u8; 6] = [0x04, 0x00, 0xaa, 0xaa, 0xaa, 0x00];
    let info = registry::info(ctx.params.controller);

    if *state == State::ProcessHeader {
        *state = State::MarkId;
        ctx.sector.status = SectorStatus {
            status: init_status | SectorFlags::HEADER_FOUND,
            ecc_span_corrected_header: ecc_span,
            ..Default::default()
        };
        if ecc_span != 0 {
            ctx.sector.status.status |= SectorFlags::ECC_RECOVERED;
        }
        ctx.sector.sector_size = ctx.params.sector_size;

        let s = &mut ctx.sector.status;
        match ctx.params.controller {
            Controller::CorvusH => {
                // Three bytes compactly pack head, cylinder, sector.
                s.cyl = bytes[1] as u32 | (bytes[2] as u32) << 8;
                s.head = (bytes[0] >> 5) as u32;
                s.sector = (bytes[0] & 0x1f) as u32;
            }
            Controller::Cromemco => {
                s.cyl = bytes[6] as u32 | (bytes[7] as u32) << 8;
                s.head = bytes[8] as u32;
                // Only 1 sector per track.
                s.sector = 0;
                if bytes[..6] != CROMEMCO_SYNC {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::ERR,
                        "Bad alignment bytes {:02x} {:02x} {:02x} {:02x} {:02x} {:02x} on cyl {},{} head {},{}",
                        bytes[0],
                        bytes[1],
                        bytes[2],
                        bytes[3],
                        bytes[4],
                        bytes[5],
                        ctx.ch.c(),
                        s.cyl,
                        ctx.ch.h(),
                        s.head
                    );
                }
            }
            Controller::Vector4 => {
                if bytes[0] != 0xff {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::ERR,
                        "Bad sync byte {:02x} on cyl {},{} head {},{}",
                        bytes[0],
                        ctx.ch.c(),
                        s.cyl,
                        ctx.ch.h(),
                        s.head
                    );
                    s.status |= SectorFlags::BAD_HEADER;
                }
                s.cyl = ((bytes[1] & 0xf) as u32) << 8 | bytes[2] as u32;
                s.head = (bytes[1] >> 4) as u32;
                s.sector = bytes[3] as u32;
            }
            Controller::Vector4St506 => {
                if bytes[0] != 0xff {
                    msg!(
                        ctx.params.msg_mask,
                        MsgMask::ERR,
                        "Bad sync byte {:02x} on cyl {},{} head {},{}",
                        bytes[0],
                        ctx.ch.c(),
                        s.cyl,
                        ctx.ch.h(),
                        s.head
                    );
                    s.status |= SectorFlags::BAD_HEADER;
                }
                s.cyl = bytes[2] as u32;
                s.head = bytes[1] as u32;
                s.sector = bytes[3] as u32;
            }
            _ => {
                s.status |= SectorFlags::BAD_HEADER;
            }
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

        if crc != 0 {
            ctx.sector.status.status |= SectorFlags::BAD_DATA;
        }
        if ecc_span != 0 {
            ctx.sector.status.status |= SectorFlags::ECC_RECOVERED;
        }
        let sector_size = ctx.sector.sector_size;
        check_header_values(ctx, sector_size);
        ctx.sector.status.ecc_span_corrected_data = ecc_span;

        if !info.separate_data && !ctx.sector.status.status.contains(SectorFlags::BAD_HEADER) {
            let dheader_bytes = info.data_header_bytes;
            let sector_size = ctx.params.sector_size;
            let mut sector_status = ctx.sector.status;
            let ok = ctx.agg.write_sector(
                ctx.params,
                &mut sector_status,
                ctx.list,
                &bytes[dheader_bytes..dheader_bytes + sector_size],
                &bytes[..total_bytes],
            )?;
            ctx.sector.status = sector_status;
            if !ok {
                ctx.sector.status.status |= SectorFlags::BAD_HEADER;
            }
        }
        return Ok(ctx.sector.status.status);
    }

    // Data processed separately only when the profile declares a separate
    // data area.
    ctx.sector.status.status |= init_status;
    if crc != 0 {
        ctx.sector.status.status |= SectorFlags::BAD_DATA;
    }
    if ecc_span != 0 {
        ctx.sector.status.status |= SectorFlags::ECC_RECOVERED;
    }
    ctx.sector.status.ecc_span_corrected_data = ecc_span;
    if !ctx
        .sector
        .status
        .status
        .intersects(SectorFlags::BAD_HEADER | SectorFlags::BAD_SECTOR_NUMBER)
    {
        let dheader_bytes = info.data_header_bytes;
        let sector_size = ctx.params.sector_size;
        let mut sector_status = ctx.sector.status;
        let ok = ctx.agg.write_sector(
            ctx.params,
            &mut sector_status,
            ctx.list,
            &bytes[dheader_bytes..dheader_bytes + sector_size],
            &bytes[1..total_bytes],
        )?;
        ctx.sector.status = sector_status;
        if !ok {
            ctx.sector.status.status |= SectorFlags::BAD_HEADER;
        }
    }
    *state = State::MarkId;
    Ok(ctx.sector.status.status)
}
