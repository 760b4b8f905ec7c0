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

    src/encoder.rs

    Track synthesis: renders a sector image back into MFM bit words by
    executing a controller profile's track-layout template, then writes the
    result as emulator tracks. The template is the single source of truth
    for the format's byte layout; this module only interprets it.
*/

use crate::check::{checksum64, crc64, eparity64, revbits, xor16, CrcInfo};
use crate::chs::DiskCh;
use crate::codec::mfm::{encode_track as mfm_encode, SyncPos, SYNC_A1, SYNC_C0};
use crate::file_io::EmuWriter;
use crate::io::{ReadSeek, Seek, SeekFrom, Write};
use crate::params::{DriveParams, MarkBad};
use crate::registry::layout::{FieldKind, FieldNode, FieldOp, TrackNode};
use crate::registry::{self, CheckKind};
use crate::MfmError;

/// Sector ordering within a track: each sector index advances by the sector
/// interleave, skipping already used slots; the starting sector of each
/// track advances by the track interleave, resetting at a new cylinder.
struct SectorOrder {
    used: Vec<bool>,
    used_count: u32,
    sector: u32,
    track_start_sector: u32,
    sector_interleave: u32,
    track_interleave: u32,
}

impl SectorOrder {
    fn new(num_sectors: u32, sector_interleave: u32, track_interleave: u32) -> Self {
        SectorOrder {
            used: vec![false; num_sectors as usize],
            used_count: 0,
            sector: 0,
            track_start_sector: 0,
            sector_interleave,
            track_interleave,
        }
    }

    fn start_new_cyl(&mut self) {
        self.track_start_sector = 0;
    }

    fn start_new_track(&mut self) {
        self.used.fill(false);
        self.used_count = 0;
        if self.track_interleave == 0 {
            self.sector = 0;
        } else {
            self.sector = self.track_start_sector;
            self.track_start_sector = (self.track_start_sector + self.track_interleave) % self.used.len() as u32;
        }
    }

    fn advance(&mut self) {
        let num = self.used.len() as u32;
        self.used[self.sector as usize] = true;
        self.used_count += 1;
        if self.used_count < num {
            self.sector = (self.sector + self.sector_interleave) % num;
            while self.used[self.sector as usize] {
                self.sector = (self.sector + 1) % num;
            }
        }
    }
}

pub struct TrackEncoder<'a> {
    params: &'a DriveParams,
    layout: &'static [TrackNode],
    order: SectorOrder,
    ch: DiskCh,
}

impl<'a> TrackEncoder<'a> {
    pub fn new(params: &'a DriveParams) -> Result<Self, MfmError> {
        let info = registry::info(params.controller);
        let layout = info
            .track_layout
            .ok_or(MfmError::NoTrackLayout(params.controller.name()))?;
        Ok(TrackEncoder {
            params,
            layout,
            order: SectorOrder::new(params.num_sectors, params.sector_interleave, params.track_interleave),
            ch: DiskCh::default(),
        })
    }

    /// Data bytes per track (each data byte becomes two MFM bytes).
    pub fn track_length(&self) -> usize {
        registry::info(self.params.controller).track_words * 4 / 2
    }

    fn lba(&self) -> u32 {
        (self.ch.c() * self.params.num_head + self.ch.h()) * self.params.num_sectors + self.order.sector
    }

    fn check_value(&self, bytes: &[u8], crc_info: &CrcInfo, kind: CheckKind) -> Result<u64, MfmError> {
        let value = match kind {
            CheckKind::Crc => crc64(bytes, crc_info),
            CheckKind::Checksum => {
                let sum = checksum64(bytes, crc_info);
                match crc_info.length {
                    16 => sum & 0xff,
                    32 => sum & 0xffff,
                    len => {
                        return Err(MfmError::LayoutError(format!("unsupported checksum length {}", len)));
                    }
                }
            }
            CheckKind::Parity => eparity64(bytes, crc_info),
            CheckKind::Xor16 => xor16(bytes, crc_info),
            CheckKind::None => 0,
        };
        Ok(value)
    }

    fn marked_bad(&self) -> bool {
        let key = MarkBad {
            cyl: self.ch.c(),
            head: self.ch.h(),
            sector: self.order.sector + self.params.first_sector_number,
        };
        self.params.mark_bad_list.binary_search(&key).is_ok()
    }

    /// Load the current sector's bytes from the caller's image.
    fn load_sector(&self, image: &mut dyn ReadSeek, dest: &mut [u8]) -> Result<(), MfmError> {
        let block = (self.ch.c() as u64 * self.params.num_head as u64 + self.ch.h() as u64)
            * self.params.num_sectors as u64
            + self.order.sector as u64;
        image.seek(SeekFrom::Start(block * self.params.sector_size as u64))?;
        image.read_exact(dest)?;
        Ok(())
    }

    fn load_metadata(&self, metadata: &mut dyn ReadSeek, dest: &mut [u8]) -> Result<(), MfmError> {
        let info = registry::info(self.params.controller);
        let block = (self.ch.c() as u64 * self.params.num_head as u64 + self.ch.h() as u64)
            * self.params.num_sectors as u64
            + self.order.sector as u64;
        metadata.seek(SeekFrom::Start(block * info.metadata_bytes as u64))?;
        metadata.read_exact(dest)?;
        Ok(())
    }

    /// Execute the field operations of one TrackNode::Field region.
    #[allow(clippy::too_many_arguments)]
    fn process_field<'b>(
        &mut self,
        track: &mut [u8],
        trk_offset: usize,
        length: usize,
        fields: &[FieldNode],
        sync_list: &mut Vec<SyncPos>,
        image: &mut dyn ReadSeek,
        metadata: Option<&'b mut dyn ReadSeek>,
    ) -> Result<Option<&'b mut dyn ReadSeek>, MfmError> {
        let info = registry::info(self.params.controller);
        let field = &mut track[trk_offset..trk_offset + length];
        // Default check range: from the start of the field containing the
        // mark to the byte before the check field.
        let mut crc_start: usize = 0;
        let mut crc_end: Option<usize> = None;
        let mut field_filled: usize = 0;
        let mut metadata = metadata;

        for def in fields {
            let mut value: u64 = 0;
            let mut data_set = false;
            match def.kind {
                FieldKind::Fill => {
                    if def.offset + def.len_bytes > length {
                        return Err(MfmError::LayoutError(format!(
                            "track overflow field fill {} {} {}",
                            def.offset, def.len_bytes, length
                        )));
                    }
                    field[def.offset..def.offset + def.len_bytes].fill(def.value);
                    data_set = true;
                    if def.op != FieldOp::Set {
                        return Err(MfmError::LayoutError("only Set is supported for Fill".into()));
                    }
                }
                FieldKind::Cyl => value = self.ch.c() as u64,
                FieldKind::Head => value = self.ch.h() as u64,
                FieldKind::Sector => value = (self.order.sector + self.params.first_sector_number) as u64,
                FieldKind::Lba => value = self.lba() as u64,
                FieldKind::BadSector => value = 0,
                FieldKind::HdrCrc => {
                    // The end of the check range sticks after first use so a
                    // complement copy covers the same bytes.
                    let end = *crc_end.get_or_insert(def.offset - 1);
                    value = self.check_value(&field[crc_start..=end], &self.params.header_crc, info.header_check)?;
                }
                FieldKind::DataCrc => {
                    let end = *crc_end.get_or_insert(def.offset - 1);
                    value = self.check_value(&field[crc_start..=end], &self.params.data_crc, info.data_check)?;
                    // Marked-bad sectors get an inverted check so readers
                    // see a data error.
                    if self.marked_bad() {
                        value ^= self.params.data_crc.trim(u64::MAX);
                    }
                }
                FieldKind::MarkCrcStart => {
                    crc_start = def.offset;
                    data_set = true;
                }
                FieldKind::MarkCrcEnd => {
                    crc_end = Some(def.offset);
                    data_set = true;
                }
                FieldKind::SectorData => {
                    self.load_sector(image, &mut field[def.offset..def.offset + def.len_bytes])?;
                    data_set = true;
                }
                FieldKind::SectorMetadata => {
                    match metadata.as_deref_mut() {
                        Some(m) => self.load_metadata(m, &mut field[def.offset..def.offset + def.len_bytes])?,
                        None => field[def.offset..def.offset + def.len_bytes].fill(0),
                    }
                    data_set = true;
                }
                FieldKind::NextSector => {
                    self.order.advance();
                    data_set = true;
                }
                FieldKind::A1Sync => {
                    sync_list.push(SyncPos {
                        index: trk_offset + def.offset,
                        pattern: SYNC_A1,
                    });
                    value = 0xa1;
                }
                FieldKind::C0Sync => {
                    sync_list.push(SyncPos {
                        index: trk_offset + def.offset,
                        pattern: SYNC_C0,
                    });
                    value = 0xc0;
                }
                FieldKind::HeadSeagateSt11m => {
                    // The first cylinder is the controller's own area.
                    value = if self.ch.c() == 0 { 0xff } else { self.ch.h() as u64 };
                }
                FieldKind::CylSeagateSt11m => {
                    // Stored off by one; nothing stored on the controller
                    // cylinder.
                    value = if self.ch.c() == 0 { 0 } else { (self.ch.c() - 1) as u64 };
                }
            }

            if data_set {
                if def.len_bytes > 0 {
                    field_filled = field_filled.max(def.offset + def.len_bytes - 1);
                }
            } else if def.bits.is_none() {
                if def.len_bytes == 0 {
                    continue;
                }
                field_filled = field_filled.max(def.offset + def.len_bytes - 1);
                if def.offset + def.len_bytes > length {
                    return Err(MfmError::LayoutError(format!(
                        "track overflow field update {} {} {}",
                        def.offset, def.len_bytes, length
                    )));
                }
                if matches!(def.op, FieldOp::Reverse | FieldOp::ReverseXor) {
                    value = revbits(value, def.len_bytes as u32 * 8);
                }
                // Write the value MSB first.
                let mut v = value << ((8 - def.len_bytes) * 8);
                for i in 0..def.len_bytes {
                    let wbyte = (v >> 56) as u8;
                    if matches!(def.op, FieldOp::Xor | FieldOp::ReverseXor) {
                        field[def.offset + i] ^= wbyte;
                    } else {
                        field[def.offset + i] = wbyte;
                    }
                    v <<= 8;
                }
            } else if let Some(bits) = def.bits {
                // Unpack the value into disjoint bit ranges, MSB first.
                let bit_len = def.offset;
                let mut value = value;
                if matches!(def.op, FieldOp::Reverse | FieldOp::ReverseXor) {
                    value = revbits(value, bit_len as u32);
                }
                let xor = matches!(def.op, FieldOp::Xor | FieldOp::ReverseXor);
                let mut bit_count = 0usize;
                for range in bits {
                    for i in 0..range.len {
                        let byte_offset = (range.start + i) / 8;
                        let bit_offset = (range.start + i) % 8;
                        field_filled = field_filled.max(byte_offset);
                        if byte_offset >= length {
                            return Err(MfmError::LayoutError("track overflow bit field".into()));
                        }
                        let bit = ((value >> (bit_len - bit_count - 1)) & 1) as u8;
                        let mask = 1u8 << (7 - bit_offset);
                        if xor {
                            field[byte_offset] ^= bit << (7 - bit_offset);
                        } else {
                            field[byte_offset] = (field[byte_offset] & !mask) | (bit << (7 - bit_offset));
                        }
                        bit_count += 1;
                    }
                }
                if bit_count != bit_len {
                    return Err(MfmError::LayoutError(format!(
                        "bit field length mismatch {} {}",
                        bit_count, bit_len
                    )));
                }
            }
        }
        if field_filled != length - 1 {
            return Err(MfmError::LayoutError(format!(
                "incorrect field length {} {}",
                field_filled, length
            )));
        }
        Ok(metadata)
    }

    fn process_nodes<'b>(
        &mut self,
        track: &mut [u8],
        mut start: usize,
        nodes: &[TrackNode],
        sync_list: &mut Vec<SyncPos>,
        image: &mut dyn ReadSeek,
        mut metadata: Option<&'b mut dyn ReadSeek>,
    ) -> Result<(usize, Option<&'b mut dyn ReadSeek>), MfmError> {
        for node in nodes {
            match node {
                TrackNode::Fill { count, value } => {
                    if start + count > track.len() {
                        return Err(MfmError::LayoutError(format!("track overflow fill at {}", start)));
                    }
                    track[start..start + count].fill(*value);
                    start += count;
                }
                TrackNode::Sub { count, nodes } => {
                    for _ in 0..*count {
                        let (new_start, new_metadata) =
                            self.process_nodes(track, start, nodes, sync_list, image, metadata)?;
                        start = new_start;
                        metadata = new_metadata;
                    }
                }
                TrackNode::Field { length, fields } => {
                    if start + length > track.len() {
                        return Err(MfmError::LayoutError(format!("track overflow field at {}", start)));
                    }
                    track[start..start + length].fill(0);
                    metadata =
                        self.process_field(track, start, *length, fields, sync_list, image, metadata)?;
                    start += length;
                }
            }
        }
        Ok((start, metadata))
    }

    /// Lay out one track from the sector image, returning the raw byte
    /// buffer and the positions that encode as missing-clock sync marks.
    pub fn layout_track(
        &mut self,
        ch: DiskCh,
        image: &mut dyn ReadSeek,
        metadata: Option<&mut dyn ReadSeek>,
    ) -> Result<(Vec<u8>, Vec<SyncPos>), MfmError> {
        self.ch = ch;
        if ch.h() == 0 {
            self.order.start_new_cyl();
        }
        self.order.start_new_track();

        let track_length = self.track_length();
        let mut track = vec![0u8; track_length];
        let mut sync_list: Vec<SyncPos> = Vec::new();
        let (filled, _metadata) =
            self.process_nodes(&mut track, 0, self.layout, &mut sync_list, image, metadata)?;
        if filled != track_length {
            log::info!("Not all track filled, {} of {} bytes used", filled, track_length);
        }
        Ok((track, sync_list))
    }

    /// Lay out and MFM-encode one track from the sector image.
    pub fn encode_track(
        &mut self,
        ch: DiskCh,
        image: &mut dyn ReadSeek,
        metadata: Option<&mut dyn ReadSeek>,
    ) -> Result<Vec<u32>, MfmError> {
        let (track, sync_list) = self.layout_track(ch, image, metadata)?;
        Ok(mfm_encode(&track, &sync_list))
    }
}

/// Render a whole sector image into an emulator file. The caller closes the
/// writer (writing the end-of-file marker).
pub fn encode_image<W: Write + Seek>(
    params: &DriveParams,
    image: &mut dyn ReadSeek,
    mut metadata: Option<&mut dyn ReadSeek>,
    emu: &mut EmuWriter<W>,
) -> Result<(), MfmError> {
    let mut encoder = TrackEncoder::new(params)?;
    for cyl in 0..params.num_cyl {
        for head in 0..params.num_head {
            let ch = DiskCh::new(cyl, head);
            let words =
                encoder.encode_track(ch, image, metadata.as_mut().map(|m| &mut **m as &mut dyn ReadSeek))?;
            emu.write_track(ch, &words)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Cursor;
    use crate::registry::Controller;

    #[test]
    fn interleave_order_visits_every_sector() {
        let mut order = SectorOrder::new(17, 1, 0);
        order.start_new_cyl();
        order.start_new_track();
        let mut seen = Vec::new();
        for _ in 0..17 {
            seen.push(order.sector);
            order.advance();
        }
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..17).collect::<Vec<_>>());
        assert_eq!(seen, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn two_to_one_interleave() {
        let mut order = SectorOrder::new(6, 2, 0);
        order.start_new_track();
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(order.sector);
            order.advance();
        }
        assert_eq!(seen, vec![0, 2, 4, 1, 3, 5]);
    }

    #[test]
    fn track_interleave_shifts_start() {
        let mut order = SectorOrder::new(4, 1, 1);
        order.start_new_cyl();
        order.start_new_track();
        assert_eq!(order.sector, 0);
        order.start_new_track();
        assert_eq!(order.sector, 1);
        order.start_new_cyl();
        order.start_new_track();
        assert_eq!(order.sector, 0);
    }

    #[test]
    fn omti_track_layout_renders() {
        let mut params = DriveParams::default();
        params.set_controller(Controller::Omti5510);
        params.num_cyl = 1;
        params.num_head = 1;
        let image = vec![0xe5u8; params.sector_size * params.num_sectors as usize];
        let mut cursor = Cursor::new(image);

        let mut encoder = TrackEncoder::new(&params).unwrap();
        let words = encoder.encode_track(DiskCh::new(0, 0), &mut cursor, None).unwrap();
        assert_eq!(words.len(), registry::info(Controller::Omti5510).track_words);

        // The first sync position must carry the raw 0x4489 pattern.
        let sync_word = words
            .iter()
            .find(|w| (**w & 0xffff) == crate::codec::mfm::SYNC_A1 as u32 || (**w >> 16) == crate::codec::mfm::SYNC_A1 as u32);
        assert!(sync_word.is_some(), "no A1 sync pattern in encoded track");
    }

    #[test]
    fn missing_layout_is_an_error() {
        let mut params = DriveParams::default();
        params.set_controller(Controller::Dtc);
        assert!(matches!(TrackEncoder::new(&params), Err(MfmError::NoTrackLayout(_))));
    }
}
