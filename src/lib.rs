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
*/

//! # mfmfox
//!
//! mfmfox is a Rust library for reading, analyzing, and reconstructing data from
//! vintage MFM-encoded hard disk drives, of the kind attached to minicomputers,
//! workstations and early personal computers via ST506/ST412-interface
//! controllers.
//!
//! The library converts raw magnetic-transition timing data (delta streams)
//! into decoded sector contents, and can render a sector image back into an
//! emulator-consumable bit-stream. Dozens of controller vendors wrote mutually
//! incompatible low-level sector layouts on top of MFM; mfmfox carries a
//! registry of these controller profiles and can auto-detect which one wrote
//! an unknown disk by trial decoding.
//!
//! The main decode interface is [`decoder::decode_track`], fed from a
//! [`deltas::DeltaSource`] and writing results through a
//! [`aggregator::TrackAggregator`]. The inverse operation is
//! [`encoder::TrackEncoder`], which lays out and MFM-encodes complete tracks
//! from a sector image. [`analyzer::analyze_format`] identifies the controller
//! profile of an unknown disk.
//!
//! Transition data and bit-stream data are persisted in the TRAN and EMU
//! container formats implemented in [`file_io`].

pub mod aggregator;
pub mod analyzer;
pub mod check;
pub mod chs;
pub mod codec;
pub mod decoder;
pub mod deltas;
pub mod encoder;
pub mod file_io;
pub mod io;
pub mod msg;
pub mod params;
pub mod pll;
pub mod registry;

use thiserror::Error;

/// Number of nanoseconds per reference-clock tick. All delta times are quoted
/// in 200 MHz ticks.
pub const CLOCKS_TO_NS: u32 = 5;
/// The reference clock all transition deltas are measured against.
pub const SAMPLE_RATE_HZ: u32 = 200_000_000;

pub const MAX_SECTORS: usize = 50;
pub const MAX_HEADS: usize = 16;
pub const MAX_CYLS: usize = 4096;
pub const MAX_SECTOR_SIZE: usize = 10240;
/// Maximum number of 32-bit raw words in one track. Large enough for future
/// growth up to 30 Mbit/sec at 3600 RPM.
pub const MAX_TRACK_WORDS: usize = 16000;

#[derive(Debug, Error)]
pub enum MfmError {
    #[error("An IO error occurred reading or writing a container file: {0}")]
    IoError(String),
    #[error("The container file doesn't have the expected id value")]
    BadMagic,
    #[error("Container file incorrect type or higher revision than supported: {0:#010x}")]
    BadVersion(u32),
    #[error("Container file checksum mismatch: computed {computed:#x} stored {stored:#x}")]
    ChecksumMismatch { computed: u32, stored: u32 },
    #[error("Track marker value mismatch: {0:#010x}")]
    BadTrackMarker(u32),
    #[error("The requested cylinder or head could not be found")]
    SeekError,
    #[error("Track record larger than supported: {0} bytes")]
    TrackTooLarge(usize),
    #[error("Unknown controller \"{0}\". Use registry::controller_names() for choices")]
    UnknownController(String),
    #[error("Controller {0} has no track layout; it cannot be encoded")]
    NoTrackLayout(&'static str),
    #[error("Track layout error: {0}")]
    LayoutError(String),
    #[error("An invalid function parameter was supplied: {0}")]
    ParameterError(String),
    #[error("Unable to determine drive format")]
    AnalyzeFailed,
    #[error("A start time read from an input file may not be overridden")]
    StartTimeLocked,
}

// Manually implement `From<io::Error>` for `MfmError`
impl From<std::io::Error> for MfmError {
    fn from(err: std::io::Error) -> Self {
        MfmError::IoError(err.to_string())
    }
}

// Manually implement `From<binrw::Error>` for `MfmError`
impl From<binrw::Error> for MfmError {
    fn from(err: binrw::Error) -> Self {
        MfmError::IoError(err.to_string())
    }
}

pub use crate::aggregator::TrackAggregator;
pub use crate::check::CrcInfo;
pub use crate::chs::DiskCh;
pub use crate::decoder::{decode_track, SectorFlags, SectorStatus};
pub use crate::deltas::{DeltaRing, DeltaSource, SliceDeltas};
pub use crate::file_io::{EmuReader, EmuWriter, TranReader, TranWriter};
pub use crate::msg::MsgMask;
pub use crate::params::DriveParams;
pub use crate::registry::{Controller, ControllerInfo};
