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

    src/msg.rs

    Decoder report message classes. Reports carry a class bit so callers can
    gate them with a mask (the --quiet interface); enabled reports are emitted
    through the log facade.
*/

use bitflags::bitflags;

bitflags! {
    /// Classification of decoder report messages. The mask of enabled classes
    /// lives in [`crate::params::DriveParams`]; the analyzer narrows it during
    /// trial decodes so failed trials stay quiet.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct MsgMask: u32 {
        const DEBUG_DATA   = 0x001;
        const DEBUG        = 0x002;
        const INFO         = 0x004;
        const PROGRESS     = 0x008;
        const ERR          = 0x010;
        const INFO_SUMMARY = 0x020;
        const ERR_SERIOUS  = 0x040;
        const ERR_SUMMARY  = 0x080;
        const FATAL        = 0x100;
        const STATS        = 0x200;
        const FORMAT       = 0x400;
    }
}

impl Default for MsgMask {
    /// Everything except the debug classes, matching the default of the
    /// capture tools.
    fn default() -> Self {
        MsgMask::all() - (MsgMask::DEBUG | MsgMask::DEBUG_DATA)
    }
}

impl MsgMask {
    fn level(self) -> log::Level {
        if self.intersects(MsgMask::FATAL) {
            log::Level::Error
        } else if self.intersects(MsgMask::ERR | MsgMask::ERR_SERIOUS | MsgMask::ERR_SUMMARY) {
            log::Level::Warn
        } else if self.intersects(MsgMask::DEBUG | MsgMask::DEBUG_DATA) {
            log::Level::Debug
        } else {
            log::Level::Info
        }
    }
}

/// Emit a report of class `class` if enabled in `mask`.
pub fn report(mask: MsgMask, class: MsgMask, args: std::fmt::Arguments) {
    if mask.intersects(class) {
        log::log!(target: "mfmfox::report", class.level(), "{}", args);
    }
}

/// Report macro used throughout the decoder and analyzer.
/// `msg!(mask, MsgMask::ERR, "Mismatch cyl {},{}", a, b)`
#[macro_export]
macro_rules! msg {
    ($mask:expr, $class:expr, $($arg:tt)*) => {
        $crate::msg::report($mask, $class, format_args!($($arg)*))
    };
}

/// Dump header or data bytes for decoding new formats.
pub fn dump_bytes(mask: MsgMask, bytes: &[u8], ch: crate::chs::DiskCh, sector_index: usize) {
    if !mask.intersects(MsgMask::DEBUG_DATA) {
        return;
    }
    let mut line = format!("{} {:2}:", ch, sector_index);
    for (i, b) in bytes.iter().enumerate() {
        line.push_str(&format!("0x{:02x},", b));
        if i % 16 == 15 {
            report(mask, MsgMask::DEBUG_DATA, format_args!("{}", line));
            line.clear();
        }
    }
    if !line.is_empty() {
        report(mask, MsgMask::DEBUG_DATA, format_args!("{}", line));
    }
}
