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

    src/registry/layout.rs

    Track-layout template node types. Each profile's template is a static
    tree describing one track as a sequence of operations, starting from the
    profile's start_time_ns offset. The encoder interprets these trees; they
    are the single source of truth for each format's byte layout.
*/

/// A range of bits within a field, numbered with the most significant bit of
/// the first byte as bit 0.
#[derive(Copy, Clone, Debug)]
pub struct BitRange {
    pub start: usize,
    pub len: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Fill the covered bytes with `value`.
    Fill,
    /// The 0xa1 header/data mark. Encoded with a missing clock bit.
    A1Sync,
    /// The 0xc0-style mark with missing clock, used by a few controllers.
    C0Sync,
    /// Current cylinder, head, sector, or logical block address.
    Cyl,
    Head,
    Sector,
    Lba,
    /// Check word over the current CRC range. The profile's check parameters
    /// define the kind of check word written.
    HdrCrc,
    DataCrc,
    /// Sector data loaded from the caller's sector image.
    SectorData,
    /// Per-sector metadata loaded from the metadata image.
    SectorMetadata,
    /// Set the start / end byte for check calculation. The default range is
    /// the start of the enclosing field through the byte before the check
    /// field.
    MarkCrcStart,
    MarkCrcEnd,
    /// Advance the sector counter at the end of a sector.
    NextSector,
    /// Bad-sector flag value for formats that encode one.
    BadSector,
    /// Seagate ST11M byte 2: head number, or 0xff on the controller cylinder.
    HeadSeagateSt11m,
    /// Seagate ST11M cylinder: stored off by one, not present on the
    /// controller cylinder.
    CylSeagateSt11m,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldOp {
    /// Write the value.
    Set,
    /// Exclusive-or the value with the current contents.
    Xor,
    /// Reverse the value's bits, then write.
    Reverse,
    /// Reverse the value's bits, then exclusive-or.
    ReverseXor,
}

/// One field operation within a `TrackNode::Field` region.
#[derive(Copy, Clone, Debug)]
pub struct FieldNode {
    /// Length of the field in bytes. 0 when the field is defined by a bit
    /// list.
    pub len_bytes: usize,
    pub kind: FieldKind,
    pub value: u8,
    pub op: FieldOp,
    /// Byte offset from the start of the field, or, when `bits` is set, the
    /// length of the value in bits.
    pub offset: usize,
    /// Disjoint bit ranges the value is unpacked into, MSB-first numbering.
    pub bits: Option<&'static [BitRange]>,
}

impl FieldNode {
    pub const fn bytes(len_bytes: usize, kind: FieldKind, value: u8, op: FieldOp, offset: usize) -> Self {
        FieldNode {
            len_bytes,
            kind,
            value,
            op,
            offset,
            bits: None,
        }
    }

    pub const fn bit_field(kind: FieldKind, op: FieldOp, bit_len: usize, bits: &'static [BitRange]) -> Self {
        FieldNode {
            len_bytes: 0,
            kind,
            value: 0,
            op,
            offset: bit_len,
            bits: Some(bits),
        }
    }
}

/// A track operation. Each operation starts at the end of the previous one.
#[derive(Copy, Clone, Debug)]
pub enum TrackNode {
    /// Fill `count` bytes with `value`.
    Fill { count: usize, value: u8 },
    /// Repeat the sub-list `count` times.
    Sub {
        count: usize,
        nodes: &'static [TrackNode],
    },
    /// A `length`-byte region laid out by field operations.
    Field {
        length: usize,
        fields: &'static [FieldNode],
    },
}

impl TrackNode {
    /// Total bytes this node lays down.
    pub fn byte_len(&self) -> usize {
        match self {
            TrackNode::Fill { count, .. } => *count,
            TrackNode::Sub { count, nodes } => count * nodes.iter().map(|n| n.byte_len()).sum::<usize>(),
            TrackNode::Field { length, .. } => *length,
        }
    }
}

/// Total bytes a template lays down.
pub fn template_len(nodes: &[TrackNode]) -> usize {
    nodes.iter().map(|n| n.byte_len()).sum()
}
