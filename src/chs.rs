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

    src/chs.rs

    Defines the DiskCh physical track address type.
*/

use std::fmt::{self, Display, Formatter};

/// A physical track address: cylinder and head. Hard disk sector numbering
/// within a track depends on the controller profile, so sectors are carried
/// separately by the decoder.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DiskCh {
    c: u32,
    h: u32,
}

impl From<(u32, u32)> for DiskCh {
    fn from((c, h): (u32, u32)) -> Self {
        Self { c, h }
    }
}

impl Display for DiskCh {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[c:{} h:{}]", self.c, self.h)
    }
}

impl DiskCh {
    pub fn new(c: u32, h: u32) -> Self {
        Self { c, h }
    }

    #[inline]
    pub fn c(&self) -> u32 {
        self.c
    }

    #[inline]
    pub fn h(&self) -> u32 {
        self.h
    }

    /// Return the next track address for a disk with `heads` heads per
    /// cylinder, advancing head-first.
    pub fn next(&self, heads: u32) -> DiskCh {
        if self.h + 1 < heads {
            DiskCh::new(self.c, self.h + 1)
        } else {
            DiskCh::new(self.c + 1, 0)
        }
    }

    /// Byte offset of sector `s` of this track within a raw sector image.
    pub fn sector_offset(&self, s: u32, first_sector: u32, heads: u32, sectors: u32, sector_size: usize) -> u64 {
        ((self.c as u64 * heads as u64 + self.h as u64) * sectors as u64 + (s - first_sector) as u64)
            * sector_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_offsets_are_contiguous() {
        let geom_heads = 4;
        let geom_sectors = 17;
        let size = 512;

        let mut expected = 0u64;
        for c in 0..3 {
            for h in 0..geom_heads {
                for s in 0..geom_sectors {
                    let ch = DiskCh::new(c, h);
                    assert_eq!(ch.sector_offset(s, 0, geom_heads, geom_sectors, size), expected);
                    expected += size as u64;
                }
            }
        }
    }

    #[test]
    fn next_wraps_heads() {
        let ch = DiskCh::new(2, 3);
        assert_eq!(ch.next(4), DiskCh::new(3, 0));
        assert_eq!(DiskCh::new(2, 1).next(4), DiskCh::new(2, 2));
    }
}
