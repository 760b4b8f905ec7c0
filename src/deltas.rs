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

    src/deltas.rs

    The delta stream boundary between a capture producer and the decoder.
    Deltas are counts of 200 MHz reference clocks between flux transitions.
    A delta of zero is invalid.

    When fed from live hardware, deltas arrive in a buffer filled by an
    external agent while the decoder runs. The discipline is single-producer
    single-consumer without locks: the producer publishes a monotonically
    advancing count, the consumer reads up to the published count and polls
    for more, yielding briefly when it catches up.
*/

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of polling a delta source.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeltaPoll {
    /// `count` deltas are published so far; more may follow.
    Ready(usize),
    /// End of track: no deltas beyond those already consumed.
    End,
}

/// A source of transition deltas for one track. The decoder processes the
/// published prefix, then polls again; a producer may append mid-track.
pub trait DeltaSource {
    /// Poll for the current published count. `consumed` is how many deltas
    /// the caller has already processed; implementations may yield briefly
    /// when no new data is available yet.
    fn poll(&mut self, consumed: usize) -> DeltaPoll;

    /// Access the published deltas. Only indices below the last `Ready`
    /// count may be read.
    fn deltas(&self) -> &[u16];
}

/// A complete in-memory track of deltas.
pub struct SliceDeltas<'a> {
    deltas: &'a [u16],
    published: bool,
}

impl<'a> SliceDeltas<'a> {
    pub fn new(deltas: &'a [u16]) -> Self {
        Self {
            deltas,
            published: false,
        }
    }
}

impl DeltaSource for SliceDeltas<'_> {
    fn poll(&mut self, consumed: usize) -> DeltaPoll {
        if !self.published && consumed < self.deltas.len() {
            self.published = true;
            DeltaPoll::Ready(self.deltas.len())
        } else {
            DeltaPoll::End
        }
    }

    fn deltas(&self) -> &[u16] {
        self.deltas
    }
}

/// Shared state of a live capture buffer. The producer half appends and
/// publishes; the consumer half is a [`DeltaSource`].
///
/// Single-producer single-consumer: the producer only writes cells at or
/// beyond the published count, the consumer only reads cells below it, and
/// publication is a release store matched by the consumer's acquire load.
struct RingShared {
    count: AtomicUsize,
    done: AtomicBool,
    cells: Box<[std::cell::UnsafeCell<u16>]>,
}

unsafe impl Sync for RingShared {}

impl RingShared {
    fn published(&self) -> &[u16] {
        let count = self.count.load(Ordering::Acquire);
        unsafe { std::slice::from_raw_parts(self.cells.as_ptr() as *const u16, count) }
    }
}

/// Producer handle for a capture buffer.
pub struct DeltaProducer {
    shared: Arc<RingShared>,
}

impl DeltaProducer {
    /// Append deltas and publish them to the consumer.
    pub fn push(&mut self, deltas: &[u16]) {
        let count = self.shared.count.load(Ordering::Relaxed);
        assert!(count + deltas.len() <= self.shared.cells.len(), "delta buffer overflow");
        for (i, &d) in deltas.iter().enumerate() {
            unsafe { *self.shared.cells[count + i].get() = d };
        }
        self.shared.count.store(count + deltas.len(), Ordering::Release);
    }

    /// Signal end of track.
    pub fn finish(self) {
        self.shared.done.store(true, Ordering::Release);
    }
}

/// Consumer half of a capture buffer.
pub struct DeltaRing {
    shared: Arc<RingShared>,
}

impl DeltaRing {
    /// Create a buffer with fixed capacity, returning the consumer and the
    /// producer handle.
    pub fn with_capacity(capacity: usize) -> (DeltaRing, DeltaProducer) {
        let cells = (0..capacity)
            .map(|_| std::cell::UnsafeCell::new(0u16))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let shared = Arc::new(RingShared {
            count: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            cells,
        });
        let producer = DeltaProducer {
            shared: Arc::clone(&shared),
        };
        (DeltaRing { shared }, producer)
    }
}

impl DeltaSource for DeltaRing {
    fn poll(&mut self, consumed: usize) -> DeltaPoll {
        loop {
            let count = self.shared.count.load(Ordering::Acquire);
            if count > consumed {
                return DeltaPoll::Ready(count);
            }
            if self.shared.done.load(Ordering::Acquire) {
                return DeltaPoll::End;
            }
            // Caught up with the producer; yield so it can run.
            std::thread::sleep(Duration::from_micros(500));
        }
    }

    fn deltas(&self) -> &[u16] {
        self.shared.published()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_publishes_once() {
        let deltas = [50u16, 40, 44];
        let mut src = SliceDeltas::new(&deltas);
        assert_eq!(src.poll(0), DeltaPoll::Ready(3));
        assert_eq!(src.poll(3), DeltaPoll::End);
    }

    #[test]
    fn ring_streams_from_producer_thread() {
        let (mut ring, mut producer) = DeltaRing::with_capacity(1024);
        let handle = std::thread::spawn(move || {
            producer.push(&[40; 100]);
            producer.push(&[44; 100]);
            producer.finish();
        });

        let mut consumed = 0;
        let mut total = Vec::new();
        loop {
            match ring.poll(consumed) {
                DeltaPoll::Ready(count) => {
                    total.extend_from_slice(&ring.deltas()[consumed..count]);
                    consumed = count;
                }
                DeltaPoll::End => break,
            }
        }
        handle.join().unwrap();
        assert_eq!(total.len(), 200);
        assert_eq!(total[0], 40);
        assert_eq!(total[199], 44);
    }
}
