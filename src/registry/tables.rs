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

    src/registry/tables.rs

    Free-standing tables shared across controller profiles: the candidate
    check polynomials and initial values the analyzer searches, candidate
    sector sizes, LBA sector counts, and the track-layout templates for the
    profiles the encoder supports.
*/

use super::layout::{BitRange, FieldKind, FieldNode, FieldOp, TrackNode};

/// One candidate check polynomial for format search.
#[derive(Copy, Clone, Debug)]
pub struct PolyEntry {
    pub poly: u64,
    pub length: u32,
    pub ecc_span: u32,
}

/// The polynomials the analyzer will try. Profiles carry index ranges into
/// this table. Order matters: entries are referenced by index from the
/// controller table.
pub static ALL_POLY: [PolyEntry; 14] = [
    // Length 1 for parity (Symbolics 3640). Doesn't really use length.
    PolyEntry { poly: 0, length: 1, ecc_span: 0 },
    // Length 16 for Northstar header checksum
    PolyEntry { poly: 0, length: 16, ecc_span: 0 },
    // Length 32 for Northstar data checksum
    PolyEntry { poly: 0, length: 32, ecc_span: 0 },
    // Length 8 for Wang header checksum
    PolyEntry { poly: 0, length: 8, ecc_span: 0 },
    PolyEntry { poly: 0x00a00805, length: 32, ecc_span: 5 },
    // Don't move this without fixing the Northstar reference
    PolyEntry { poly: 0x1021, length: 16, ecc_span: 0 },
    PolyEntry { poly: 0x8005, length: 16, ecc_span: 0 },
    PolyEntry { poly: 0x140a0445, length: 32, ecc_span: 5 },
    // From WD42C22C datasheet, not seen on a drive yet
    PolyEntry { poly: 0x140a0445000101, length: 56, ecc_span: 16 },
    PolyEntry { poly: 0x0104c981, length: 32, ecc_span: 5 },
    PolyEntry { poly: 0x24409, length: 24, ecc_span: 0 },
    // WANG 2275
    PolyEntry { poly: 0x3e4012, length: 24, ecc_span: 0 },
    // Adaptec bad block on Maxtor XT-2190
    PolyEntry { poly: 0x41044185, length: 32, ecc_span: 5 },
    // MVME320 controller
    PolyEntry { poly: 0x10210191, length: 32, ecc_span: 5 },
];

/// One candidate initial value. `length` of None is valid for all polynomial
/// sizes.
#[derive(Copy, Clone, Debug)]
pub struct InitEntry {
    pub length: Option<u32>,
    pub value: u64,
}

pub static ALL_INIT: [InitEntry; 13] = [
    InitEntry { length: None, value: 0 },
    InitEntry { length: None, value: u64::MAX },
    InitEntry { length: Some(32), value: 0x2605fb9c },
    InitEntry { length: Some(32), value: 0xd4d7ca20 },
    InitEntry { length: Some(32), value: 0x409e10aa },
    // 532 byte sector OMTI. The others above are other OMTI variants; they
    // likely compensate for something OMTI does to the CRC.
    InitEntry { length: Some(32), value: 0x84a36c27 },
    // iSBC 215 header. The final CRC is inverted but this init value will
    // also make it match.
    InitEntry { length: Some(32), value: 0xed800493 },
    // iSBC 215, 128 byte sector
    InitEntry { length: Some(32), value: 0xec1f077f },
    // iSBC 215, 256 byte sector
    InitEntry { length: Some(32), value: 0xde60050c },
    // iSBC 215, 512 byte sector
    InitEntry { length: Some(32), value: 0x03affc1d },
    // iSBC 215, 1024 byte sector
    InitEntry { length: Some(32), value: 0xbe87fbf4 },
    // Altos 586 data area. Unknown why this initial value is needed.
    InitEntry { length: Some(16), value: 0xe60c },
    // WANG 2275 with all header bytes in CRC
    InitEntry { length: Some(24), value: 0x223808 },
];

/// Candidate sector sizes, smallest first so search doesn't miss the next
/// header.
pub static ALL_SECTOR_SIZE: [usize; 11] = [128, 256, 512, 524, 532, 1024, 1160, 1164, 2048, 4096, 10240];

/// Sectors-per-track values tried when mapping LBA headers back to geometry.
pub static LBA_NUM_SECTORS: [u32; 4] = [17, 18, 32, 33];

// Track-layout templates. These define the track starting from
// start_time_ns.

const fn fill(count: usize, value: u8) -> TrackNode {
    TrackNode::Fill { count, value }
}

/// Format for the AT&T 3B1 computer.
pub static TRK_3B1: [TrackNode; 3] = [
    fill(45, 0x4e),
    TrackNode::Sub {
        count: 17,
        nodes: &[
            fill(15, 0x00),
            TrackNode::Field {
                length: 7,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xfe, FieldOp::Set, 1),
                    // Upper 3 bits of cylinder fold into bits 3,1,0 of the
                    // 0xfe byte, the rest into the next byte. Xor with 0xfe
                    // just sets the bits.
                    FieldNode::bit_field(
                        FieldKind::Cyl,
                        FieldOp::Xor,
                        11,
                        &[BitRange { start: 12, len: 1 }, BitRange { start: 14, len: 10 }],
                    ),
                    // Sector size 512
                    FieldNode::bytes(1, FieldKind::Fill, 0x20, FieldOp::Set, 3),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Xor, 3),
                    FieldNode::bytes(1, FieldKind::Sector, 0x00, FieldOp::Set, 4),
                    FieldNode::bytes(2, FieldKind::HdrCrc, 0x00, FieldOp::Set, 5),
                ],
            },
            fill(15, 0x00),
            TrackNode::Field {
                length: 516,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xf8, FieldOp::Set, 1),
                    FieldNode::bytes(512, FieldKind::SectorData, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(2, FieldKind::DataCrc, 0x00, FieldOp::Set, 514),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(3, 0x00),
            fill(38, 0x4e),
        ],
    },
    fill(275, 0x4e),
];

/// Generic WD 1006 style track. The same byte layout as the 3B1 without the
/// head-in-sector-number quirk; 17 sectors of 512 bytes.
pub static TRK_WD_1006: [TrackNode; 3] = [
    fill(45, 0x4e),
    TrackNode::Sub {
        count: 17,
        nodes: &[
            fill(15, 0x00),
            TrackNode::Field {
                length: 7,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xfe, FieldOp::Set, 1),
                    FieldNode::bit_field(
                        FieldKind::Cyl,
                        FieldOp::Xor,
                        11,
                        &[BitRange { start: 12, len: 1 }, BitRange { start: 14, len: 10 }],
                    ),
                    FieldNode::bytes(1, FieldKind::Fill, 0x20, FieldOp::Set, 3),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Xor, 3),
                    FieldNode::bytes(1, FieldKind::Sector, 0x00, FieldOp::Set, 4),
                    FieldNode::bytes(2, FieldKind::HdrCrc, 0x00, FieldOp::Set, 5),
                ],
            },
            fill(15, 0x00),
            TrackNode::Field {
                length: 516,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xf8, FieldOp::Set, 1),
                    FieldNode::bytes(512, FieldKind::SectorData, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(2, FieldKind::DataCrc, 0x00, FieldOp::Set, 514),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(3, 0x00),
            fill(38, 0x4e),
        ],
    },
    fill(275, 0x4e),
];

/// From the OMTI 5050 programmable data sequencer datasheet, appendix A.
pub static TRK_OMTI_5510: [TrackNode; 3] = [
    fill(11, 0x4e),
    TrackNode::Sub {
        count: 17,
        nodes: &[
            fill(12, 0x00),
            TrackNode::Field {
                length: 10,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xfe, FieldOp::Set, 1),
                    FieldNode::bytes(2, FieldKind::Cyl, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Set, 4),
                    FieldNode::bytes(1, FieldKind::Sector, 0x00, FieldOp::Set, 5),
                    FieldNode::bytes(4, FieldKind::HdrCrc, 0x00, FieldOp::Set, 6),
                ],
            },
            fill(14, 0x00),
            TrackNode::Field {
                length: 518,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xf8, FieldOp::Set, 1),
                    FieldNode::bytes(512, FieldKind::SectorData, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(4, FieldKind::DataCrc, 0x00, FieldOp::Set, 514),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(2, 0x00),
            fill(14, 0x4e),
        ],
    },
    fill(715, 0x4e),
];

pub static TRK_MVME320: [TrackNode; 3] = [
    fill(20, 0x4e),
    TrackNode::Sub {
        count: 32,
        nodes: &[
            fill(12, 0x00),
            TrackNode::Field {
                length: 9,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xfe, FieldOp::Set, 1),
                    FieldNode::bytes(2, FieldKind::Cyl, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Set, 4),
                    FieldNode::bytes(1, FieldKind::Sector, 0x00, FieldOp::Set, 5),
                    FieldNode::bytes(1, FieldKind::Fill, 0x01, FieldOp::Set, 6),
                    FieldNode::bytes(2, FieldKind::HdrCrc, 0x00, FieldOp::Set, 7),
                ],
            },
            fill(4, 0x4e),
            fill(12, 0x00),
            TrackNode::Field {
                length: 262,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xfb, FieldOp::Set, 1),
                    FieldNode::bytes(256, FieldKind::SectorData, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(4, FieldKind::DataCrc, 0x00, FieldOp::Set, 258),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(15, 0x4e),
        ],
    },
    fill(350, 0x4e),
];

/// From looking at data read from a drive.
pub static TRK_SYMBOLICS_3640: [TrackNode; 2] = [
    TrackNode::Sub {
        count: 8,
        nodes: &[
            fill(47, 0x00),
            TrackNode::Field {
                length: 11,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0x5a, FieldOp::Set, 1),
                    FieldNode::bytes(1, FieldKind::Fill, 0x96, FieldOp::Set, 2),
                    FieldNode::bytes(1, FieldKind::Fill, 0x0e, FieldOp::Set, 3),
                    FieldNode::bytes(1, FieldKind::Fill, 0x0e, FieldOp::Set, 4),
                    FieldNode::bytes(1, FieldKind::Fill, 0x9e, FieldOp::Set, 5),
                    FieldNode::bytes(1, FieldKind::Fill, 0x01, FieldOp::Set, 6),
                    FieldNode::bit_field(FieldKind::Sector, FieldOp::Reverse, 3, &[BitRange { start: 56, len: 3 }]),
                    FieldNode::bit_field(FieldKind::Head, FieldOp::Reverse, 4, &[BitRange { start: 62, len: 4 }]),
                    FieldNode::bit_field(FieldKind::Cyl, FieldOp::Reverse, 12, &[BitRange { start: 68, len: 12 }]),
                    FieldNode::bytes(1, FieldKind::HdrCrc, 0x00, FieldOp::Set, 10),
                ],
            },
            fill(25, 0x00),
            TrackNode::Field {
                length: 1166,
                fields: &[
                    FieldNode::bytes(1, FieldKind::Fill, 0x01, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xe0, FieldOp::Set, 1),
                    FieldNode::bytes(0, FieldKind::MarkCrcStart, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(1160, FieldKind::SectorData, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(4, FieldKind::DataCrc, 0x00, FieldOp::Set, 1162),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(49, 0x00),
        ],
    },
    fill(32, 0x4e),
];

/// From looking at data read from a drive and the manual. The manual's gap
/// values didn't match captured data; the captured values are used.
pub static TRK_NORTHSTAR: [TrackNode; 5] = [
    fill(69, 0xff),
    fill(3, 0x55),
    fill(8, 0xff),
    TrackNode::Sub {
        count: 16,
        nodes: &[
            fill(67, 0x00),
            // The Symbolics 3640 needs the 0x01 as part of the header;
            // Northstar assumes it is not.
            fill(1, 0x01),
            TrackNode::Field {
                length: 525,
                fields: &[
                    FieldNode::bytes(1, FieldKind::Sector, 0x00, FieldOp::Set, 0),
                    FieldNode::bit_field(
                        FieldKind::Cyl,
                        FieldOp::Set,
                        12,
                        &[BitRange { start: 0, len: 4 }, BitRange { start: 8, len: 8 }],
                    ),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(4, FieldKind::Fill, 0x00, FieldOp::Set, 3),
                    FieldNode::bytes(1, FieldKind::Fill, 0xff, FieldOp::Set, 8),
                    FieldNode::bytes(1, FieldKind::HdrCrc, 0x00, FieldOp::Set, 7),
                    FieldNode::bytes(1, FieldKind::HdrCrc, 0x00, FieldOp::Xor, 8),
                    FieldNode::bytes(0, FieldKind::MarkCrcStart, 0x00, FieldOp::Set, 9),
                    FieldNode::bytes(512, FieldKind::SectorData, 0x00, FieldOp::Set, 9),
                    FieldNode::bytes(0, FieldKind::MarkCrcEnd, 0x00, FieldOp::Set, 520),
                    FieldNode::bytes(2, FieldKind::Fill, 0xff, FieldOp::Set, 523),
                    FieldNode::bytes(2, FieldKind::DataCrc, 0x00, FieldOp::Set, 521),
                    FieldNode::bytes(2, FieldKind::DataCrc, 0x00, FieldOp::Xor, 523),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(49, 0x00),
        ],
    },
    fill(64, 0xff),
];

pub static TRK_SEAGATE_ST11M: [TrackNode; 3] = [
    fill(19, 0x4e),
    TrackNode::Sub {
        count: 17,
        nodes: &[
            fill(10, 0x00),
            TrackNode::Field {
                length: 10,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xfe, FieldOp::Set, 1),
                    FieldNode::bytes(1, FieldKind::HeadSeagateSt11m, 0x00, FieldOp::Set, 2),
                    // On the first cylinder byte 2 is 0xff, set by the head
                    // field above. The XOR keeps the upper 2 bits.
                    FieldNode::bit_field(
                        FieldKind::CylSeagateSt11m,
                        FieldOp::Xor,
                        10,
                        &[BitRange { start: 16, len: 2 }, BitRange { start: 24, len: 8 }],
                    ),
                    FieldNode::bytes(1, FieldKind::Sector, 0x00, FieldOp::Set, 4),
                    // Spare flags
                    FieldNode::bytes(1, FieldKind::Fill, 0x00, FieldOp::Set, 5),
                    FieldNode::bytes(4, FieldKind::HdrCrc, 0x00, FieldOp::Set, 6),
                ],
            },
            fill(15, 0x00),
            TrackNode::Field {
                length: 518,
                fields: &[
                    FieldNode::bytes(1, FieldKind::A1Sync, 0xa1, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xf8, FieldOp::Set, 1),
                    FieldNode::bytes(512, FieldKind::SectorData, 0x00, FieldOp::Set, 2),
                    FieldNode::bytes(4, FieldKind::DataCrc, 0x00, FieldOp::Set, 514),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(2, 0x00),
            fill(20, 0x4e),
        ],
    },
    fill(622, 0x4e),
];

pub static TRK_CROMEMCO: [TrackNode; 4] = [
    fill(40, 0x00),
    TrackNode::Sub {
        count: 1,
        nodes: &[
            // Track header
            TrackNode::Field {
                length: 5,
                fields: &[
                    FieldNode::bytes(1, FieldKind::Fill, 0x04, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0xaa, FieldOp::Set, 1),
                    FieldNode::bit_field(
                        FieldKind::Cyl,
                        FieldOp::Set,
                        16,
                        &[BitRange { start: 24, len: 8 }, BitRange { start: 16, len: 8 }],
                    ),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Set, 4),
                ],
            },
            fill(75, 0x00),
        ],
    },
    TrackNode::Sub {
        count: 1,
        nodes: &[
            // All bytes in the CRC must be inside the field
            TrackNode::Field {
                length: 10258,
                fields: &[
                    FieldNode::bytes(1, FieldKind::Fill, 0x04, FieldOp::Set, 0),
                    FieldNode::bytes(1, FieldKind::Fill, 0x00, FieldOp::Set, 1),
                    FieldNode::bytes(3, FieldKind::Fill, 0xaa, FieldOp::Set, 2),
                    FieldNode::bytes(1, FieldKind::Fill, 0x00, FieldOp::Set, 5),
                    FieldNode::bit_field(
                        FieldKind::Cyl,
                        FieldOp::Set,
                        16,
                        &[BitRange { start: 56, len: 8 }, BitRange { start: 48, len: 8 }],
                    ),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Set, 8),
                    FieldNode::bytes(10240, FieldKind::SectorData, 0x00, FieldOp::Set, 9),
                    FieldNode::bytes(1, FieldKind::Fill, 0x00, FieldOp::Set, 10249),
                    FieldNode::bytes(2, FieldKind::Fill, 0xaa, FieldOp::Set, 10250),
                    FieldNode::bytes(1, FieldKind::Fill, 0x00, FieldOp::Set, 10252),
                    FieldNode::bit_field(
                        FieldKind::Cyl,
                        FieldOp::Set,
                        16,
                        &[BitRange { start: 82032, len: 8 }, BitRange { start: 82024, len: 8 }],
                    ),
                    FieldNode::bytes(1, FieldKind::Head, 0x00, FieldOp::Set, 10255),
                    FieldNode::bytes(2, FieldKind::DataCrc, 0x00, FieldOp::Set, 10256),
                    FieldNode::bytes(0, FieldKind::NextSector, 0x00, FieldOp::Set, 0),
                ],
            },
            fill(4, 0x00),
        ],
    },
    fill(36, 0x00),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::layout::template_len;

    #[test]
    fn sector_sizes_ascend() {
        for w in ALL_SECTOR_SIZE.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn template_lengths_fit_track_words() {
        // Each template must fit in the 5209-word MFM track (two MFM bytes
        // per data byte).
        let cap = 5209 * 4 / 2;
        for (name, len) in [
            ("3B1", template_len(&TRK_3B1)),
            ("WD_1006", template_len(&TRK_WD_1006)),
            ("OMTI_5510", template_len(&TRK_OMTI_5510)),
            ("MVME320", template_len(&TRK_MVME320)),
            ("Symbolics_3640", template_len(&TRK_SYMBOLICS_3640)),
            ("Northstar", template_len(&TRK_NORTHSTAR)),
            ("Seagate_ST11M", template_len(&TRK_SEAGATE_ST11M)),
            ("Cromemco", template_len(&TRK_CROMEMCO)),
        ] {
            assert!(len <= cap, "{} template length {} exceeds {}", name, len, cap);
            assert!(len > cap - 8, "{} template length {} far short of {}", name, len, cap);
        }
    }
}
