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

    src/codec/mfm.rs

    MFM bit codec. Each data bit is preceded by a clock bit computed as
    !(prev_data | data), giving self-clocking. Sync marks are bytes whose
    encoding deliberately violates the clock rule at one position so decoders
    can recognize them apart from any legal data.
*/

use std::sync::OnceLock;

/// Raw 16-bit pattern of an 0xa1 byte with the missing clock bit.
pub const SYNC_A1: u16 = 0x4489;
/// Raw pattern of the 0xc0-style mark with missing clock.
pub const SYNC_C0: u16 = 0x12aa;

/// Converts MFM clock and data bit pairs into data bits. Indexed by 4 raw
/// bits (two cell pairs); invalid codes decode as 0 and are tolerated.
pub const CODE_BITS: [u8; 16] = [0, 1, 0, 0, 2, 3, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];

/// A byte position within a track buffer that encodes as a sync mark rather
/// than normal MFM.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SyncPos {
    pub index: usize,
    pub pattern: u16,
}

/// The two 256-entry encode tables, one per value of the preceding data bit.
fn encode_tables() -> &'static [[u16; 256]; 2] {
    static TABLES: OnceLock<[[u16; 256]; 2]> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut tables = [[0u16; 256]; 2];
        for (lbc, table) in tables.iter_mut().enumerate() {
            for (i, entry) in table.iter_mut().enumerate() {
                let mut last_bit = lbc as u16;
                let mut value16 = 0u16;
                for bit in (0..8).rev() {
                    value16 <<= 2;
                    let ext_bit = ((i >> bit) & 1) as u16;
                    value16 |= (((last_bit | ext_bit) ^ 1) << 1) | ext_bit;
                    last_bit = ext_bit;
                }
                *entry = value16;
            }
        }
        tables
    })
}

/// Encode one byte given the preceding data bit.
#[inline]
pub fn encode_byte(byte: u8, prev_bit: bool) -> u16 {
    encode_tables()[prev_bit as usize][byte as usize]
}

/// MFM-encode `data` into 32-bit words, two data bytes per word, first bit
/// in bit 31. `sync_list` holds byte indices that receive the raw
/// missing-clock pattern instead; it must be sorted ascending.
pub fn encode_track(data: &[u8], sync_list: &[SyncPos]) -> Vec<u32> {
    let mut words = Vec::with_capacity(data.len() / 2 + 1);
    let mut sync_ndx = 0;
    let mut last_bit = false;
    let mut value32: u32 = 0;

    for (i, &byte) in data.iter().enumerate() {
        let value16 = if sync_ndx < sync_list.len() && i == sync_list[sync_ndx].index {
            let pattern = sync_list[sync_ndx].pattern;
            sync_ndx += 1;
            pattern
        } else {
            encode_byte(byte, last_bit)
        };
        if i & 1 != 0 {
            value32 = (value32 << 16) | value16 as u32;
            words.push(value32);
        } else {
            value32 = value16 as u32;
        }
        last_bit = value16 & 1 != 0;
    }
    if data.len() & 1 != 0 {
        words.push(value32 << 16);
    }
    words
}

/// Table of bytes with reversed bit order, for the formats that record
/// sector bytes LSB-first.
pub fn rev_byte(b: u8) -> u8 {
    static TABLE: OnceLock<[u8; 256]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = [0u8; 256];
        for (i, entry) in t.iter_mut().enumerate() {
            let mut v = i as u8;
            let mut r = 0u8;
            for _ in 0..8 {
                r = (r << 1) | (v & 1);
                v >>= 1;
            }
            *entry = r;
        }
        t
    });
    table[b as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_words(words: &[u32], data_bytes: usize) -> Vec<u8> {
        // Fold raw words through the 2-bit decode table the way the framer
        // does.
        let mut out = Vec::new();
        let mut decoded: u8 = 0;
        let mut bit_count = 0;
        for wi in 0..data_bytes * 16 / 32 {
            let w = words[wi];
            for pair in (0..8).rev() {
                let nibble = ((w >> (pair * 4)) & 0xf) as usize;
                decoded = (decoded << 2) | CODE_BITS[nibble];
                bit_count += 2;
                if bit_count == 8 {
                    out.push(decoded);
                    decoded = 0;
                    bit_count = 0;
                }
            }
        }
        out
    }

    #[test]
    fn encode_decode_bytes() {
        let data = [0x00u8, 0xff, 0xa5, 0x4e, 0x01, 0x80, 0x55, 0xaa];
        let words = encode_track(&data, &[]);
        assert_eq!(words.len(), 4);
        assert_eq!(decode_words(&words, data.len()), data);
    }

    #[test]
    fn sync_byte_encodes_missing_clock() {
        // 0x00 0xa1 with the a1 marked as sync: low 16 bits are 0x4489.
        let data = [0x00u8, 0xa1];
        let words = encode_track(&data, &[SyncPos { index: 1, pattern: SYNC_A1 }]);
        assert_eq!(words[0] & 0xffff, SYNC_A1 as u32);
        // The regular encoding of 0xa1 after a zero bit is 0x44a9; only the
        // dropped clock differs.
        let regular = encode_track(&data, &[]);
        assert_eq!(regular[0] & 0xffff, 0x44a9);
        // The decoded data bits are identical either way.
        assert_eq!(decode_words(&words, 2), decode_words(&regular, 2));
    }

    #[test]
    fn clock_rule_no_adjacent_ones() {
        let data = [0x00u8, 0x00, 0xff, 0xff, 0x31, 0x9c];
        let words = encode_track(&data, &[]);
        let mut last = false;
        for w in words {
            for bit in (0..32).rev() {
                let b = (w >> bit) & 1 != 0;
                assert!(!(b && last), "adjacent one bits in MFM stream");
                last = b;
            }
        }
    }

    #[test]
    fn rev_byte_reverses() {
        assert_eq!(rev_byte(0x01), 0x80);
        assert_eq!(rev_byte(0xa1), 0x85);
        assert_eq!(rev_byte(rev_byte(0x37)), 0x37);
    }
}
