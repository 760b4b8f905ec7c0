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

    src/pll.rs

    Software phase-locked loop recovering the bit clock from transition
    deltas. A second-order Type II loop converted from continuous time by
    bilinear transformation; the coefficients were adjusted empirically
    against captured drive data.
*/

use crate::deltas::{DeltaPoll, DeltaSource};
use crate::SAMPLE_RATE_HZ;

/// Loop filter state. Per-track; a bad track can pull the filter far enough
/// off that carrying it across tracks hurts the next one.
#[derive(Clone, Debug, Default)]
pub struct PllFilter {
    delay: f32,
}

impl PllFilter {
    #[inline]
    fn filter(&mut self, v: f32) -> f32 {
        let input = v + self.delay;
        let out = input * 0.034446428576716_f32 + self.delay * -0.034124999994713_f32;
        self.delay = input;
        out
    }
}

/// Converts a delta stream into runs of bit cells. Each emitted chunk is the
/// number of zero cells observed, followed by an implicit one cell at the
/// transition. Long deltas are processed in bounded chunks so a 32-bit shift
/// register never overflows; the filter is not updated mid-burst since there
/// is no transition information.
pub struct PllDecoder<'a> {
    source: &'a mut dyn DeltaSource,
    nominal_bit_sep: f32,
    avg_bit_sep: f32,
    clock_time: f32,
    filter: PllFilter,
    max_delta: i32,
    remaining_delta: i32,
    index: usize,
    published: usize,
    /// Ticks of track time consumed so far.
    pub track_time: u32,
    /// Total raw bit cells emitted.
    pub tot_raw_bits: u64,
}

impl<'a> PllDecoder<'a> {
    pub fn new(source: &'a mut dyn DeltaSource, clk_rate_hz: u32) -> Self {
        let nominal = SAMPLE_RATE_HZ as f32 / clk_rate_hz as f32;
        PllDecoder {
            source,
            nominal_bit_sep: nominal,
            avg_bit_sep: nominal,
            clock_time: 0.0,
            filter: PllFilter::default(),
            max_delta: (nominal * 22.0) as i32,
            remaining_delta: 0,
            // The first delta is the time to the first transition, not
            // between transitions; skip it.
            index: 1,
            published: 0,
            track_time: 0,
            tot_raw_bits: 0,
        }
    }

    /// Next chunk of bit cells: the count of zero cells whose run ends in a
    /// one cell. None at end of track.
    pub fn next_chunk(&mut self) -> Option<u32> {
        loop {
            if self.index < self.published || self.remaining_delta > 0 {
                let mut delta_process = if self.remaining_delta == 0 {
                    let d = self.source.deltas()[self.index] as i32;
                    self.index += 1;
                    self.remaining_delta = d;
                    d
                } else {
                    self.remaining_delta
                };
                if delta_process > self.max_delta {
                    delta_process = self.max_delta;
                }
                self.track_time = self.track_time.wrapping_add(delta_process as u32);
                // Simulate a PLL/VCO clock sampling the data: count how many
                // bit cells the delta corresponds to.
                self.clock_time += delta_process as f32;
                self.remaining_delta -= delta_process;

                let mut int_bit_pos: u32 = 0;
                while self.clock_time > self.avg_bit_sep / 2.0 {
                    self.clock_time -= self.avg_bit_sep;
                    int_bit_pos += 1;
                }
                // Filter on the residual between the delta and the clock.
                // Skip during a long burst without transitions.
                if self.remaining_delta == 0 {
                    self.avg_bit_sep = self.nominal_bit_sep + self.filter.filter(self.clock_time);
                }
                self.tot_raw_bits += int_bit_pos as u64;
                return Some(int_bit_pos);
            }
            match self.source.poll(self.index) {
                DeltaPoll::Ready(count) => self.published = count,
                DeltaPoll::End => return None,
            }
        }
    }
}

/// Collects the recovered raw MFM words of the current track, packed
/// MSB-first, and remembers where the last header and data fields start so
/// corrected sector bits can be patched back in.
#[derive(Clone, Debug, Default)]
pub struct TrackBitSink {
    pub enabled: bool,
    words: Vec<u32>,
    header_word_ndx: usize,
    data_bit: usize,
    data_word_ndx: usize,
}

impl TrackBitSink {
    pub fn new(enabled: bool) -> Self {
        TrackBitSink {
            enabled,
            ..Default::default()
        }
    }

    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.header_word_ndx = 0;
        self.data_bit = 0;
        self.data_word_ndx = 0;
    }

    /// Fold a chunk into the word buffer. `count` is the number of unsaved
    /// bits held in `raw_word` before this chunk; the return value is the
    /// new unsaved count. Callers invoke this only when
    /// `count + int_bit_pos >= 32`; otherwise they just add to their count.
    pub fn save_raw_word(&mut self, count: usize, int_bit_pos: usize, raw_word: u32) -> usize {
        if !self.enabled {
            return 0;
        }
        let shift = 32 - count;
        let mut tmp = if shift >= 32 { 0 } else { raw_word << shift };
        let mut tmp_bit_pos = int_bit_pos - shift;
        if tmp_bit_pos == 0 {
            tmp |= 1;
        }
        self.words.push(tmp);
        while tmp_bit_pos >= 32 {
            self.words.push(0);
            tmp_bit_pos -= 32;
        }
        tmp_bit_pos
    }

    /// Flush a final partial word at end of track.
    pub fn flush(&mut self, count: usize, raw_word: u32) {
        if self.enabled && count > 0 {
            self.save_raw_word(count, 32 - count, raw_word);
        }
    }

    /// Mark the start of a header in the track being built. Backed up one
    /// word so the mark pattern itself is covered; the gap words before it
    /// are fungible.
    pub fn mark_header(&mut self) {
        self.header_word_ndx = self.words.len().saturating_sub(1);
    }

    pub fn header_word_ndx(&self) -> usize {
        self.header_word_ndx
    }

    /// Mark the start of a data field. This one must be exact since the data
    /// bits may be replaced later.
    pub fn mark_data(&mut self, bit_count: usize) {
        self.data_bit = bit_count;
        self.data_word_ndx = self.words.len();
    }

    /// True when the collected words already exceed the emulator track size.
    pub fn end_data_truncated(&self, emu_track_data_bytes: usize) -> bool {
        emu_track_data_bytes > 0 && self.words.len() * 4 >= emu_track_data_bytes
    }

    /// Re-encode corrected sector bytes into the raw words at the marked
    /// data location, rebuilding the clock bits across word boundaries.
    pub fn patch_sector_bits(&mut self, bytes: &[u8]) {
        if !self.enabled || self.data_word_ndx == 0 {
            return;
        }
        let mut bit_num: i32 = 31 - self.data_bit as i32;
        let mut word_ndx = self.data_word_ndx;

        bit_num += 1;
        if bit_num > 31 {
            bit_num -= 32;
            word_ndx -= 1;
        }
        if word_ndx == 0 || word_ndx >= self.words.len() {
            return;
        }
        let mut last_bit = (self.words[word_ndx] >> bit_num) & 1;
        bit_num -= 2;
        if bit_num < 0 {
            bit_num += 32;
            word_ndx += 1;
        }

        for &byte in bytes {
            for bit in (0..8).rev() {
                if word_ndx >= self.words.len() {
                    return;
                }
                let pat: u64 = if byte & (1 << bit) != 0 {
                    1
                } else if last_bit != 0 {
                    0
                } else {
                    2
                };
                last_bit = (pat & 1) as u32;

                let mut word64 = ((self.words[word_ndx - 1] as u64) << 32) | self.words[word_ndx] as u64;
                let mask64 = 0x3u64 << bit_num;
                word64 = (word64 & !mask64) | (pat << bit_num);
                self.words[word_ndx - 1] = (word64 >> 32) as u32;
                self.words[word_ndx] = word64 as u32;
                bit_num -= 2;
                if bit_num < 0 {
                    bit_num += 32;
                    word_ndx += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deltas::SliceDeltas;

    // Build a delta track at exactly `cell` ticks per bit cell from a bit
    // pattern string.
    fn deltas_from_bits(bits: &str, cell: u16) -> Vec<u16> {
        let mut deltas = vec![cell];
        let mut run = 1u16;
        for b in bits.chars() {
            if b == '1' {
                deltas.push(run * cell);
                run = 1;
            } else {
                run += 1;
            }
        }
        deltas
    }

    #[test]
    fn recovers_nominal_cells() {
        // 10 MHz cells at 200 MHz sampling: 20 ticks per cell.
        let bits = "1010100101001001010010010100101001";
        let deltas = deltas_from_bits(bits, 20);
        let mut src = SliceDeltas::new(&deltas);
        let mut pll = PllDecoder::new(&mut src, 10_000_000);

        let mut recovered = String::new();
        while let Some(zeros) = pll.next_chunk() {
            for _ in 1..zeros {
                recovered.push('0');
            }
            if zeros > 0 {
                recovered.push('1');
            }
        }
        assert_eq!(recovered, bits);
    }

    #[test]
    fn tracks_five_percent_fast_clock() {
        // Cells 5% short of nominal: the loop must settle and keep emitting
        // one cell per delta for a long run of ones.
        let deltas = vec![19u16; 2000];
        let mut src = SliceDeltas::new(&deltas);
        let mut pll = PllDecoder::new(&mut src, 10_000_000);

        let mut chunks = Vec::new();
        while let Some(zeros) = pll.next_chunk() {
            chunks.push(zeros);
        }
        // After settling, every delta is one cell.
        assert!(chunks[200..].iter().all(|&c| c == 1));
    }

    #[test]
    fn long_dropout_is_chunked() {
        // A dropout of 100 cells must be split so no chunk exceeds 22 cells.
        let mut deltas = vec![20u16; 50];
        deltas.push(20 * 100);
        deltas.extend_from_slice(&[20u16; 50]);
        let mut src = SliceDeltas::new(&deltas);
        let mut pll = PllDecoder::new(&mut src, 10_000_000);
        while let Some(zeros) = pll.next_chunk() {
            assert!(zeros <= 23, "chunk of {} cells", zeros);
        }
    }

    #[test]
    fn sink_packs_words_msb_first() {
        let mut sink = TrackBitSink::new(true);
        let mut raw_word: u32 = 0;
        let mut count = 0usize;
        // Feed 64 cells of alternating 01 (MFM all-ones pattern).
        for _ in 0..32 {
            let int_bit_pos = 2;
            if count + int_bit_pos >= 32 {
                count = sink.save_raw_word(count, int_bit_pos, raw_word);
            } else {
                count += int_bit_pos;
            }
            raw_word = (raw_word << 2) | 1;
        }
        sink.flush(count, raw_word);
        assert_eq!(sink.words().len(), 2);
        assert_eq!(sink.words()[0], 0x5555_5555);
        assert_eq!(sink.words()[1], 0x5555_5555);
    }
}
