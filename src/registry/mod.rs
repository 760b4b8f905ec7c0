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

    src/registry/mod.rs

    The controller profile registry: an immutable table describing every
    disk-controller on-media format the library knows how to decode. The
    formats are named after the controller that wrote them; multiple
    controllers may share a format.
*/

pub mod layout;
pub mod tables;

use crate::check::CrcInfo;
use crate::MfmError;
use layout::TrackNode;
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

// Lengths of the shared search tables, used in the profile records below.
// Checked against the tables by test.
const NUM_POLY: usize = 14;
const NUM_INIT: usize = 13;

/// Controller identity. Variant names carry the canonical format name used
/// by the `--format` interface; lookup is case-insensitive.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Controller {
    #[default]
    #[strum(serialize = "CONTROLLER_NONE")]
    None,
    #[strum(serialize = "NewburyData")]
    NewburyData,
    #[strum(serialize = "WD_1006")]
    Wd1006,
    #[strum(serialize = "WD_3B1")]
    Wd3B1,
    #[strum(serialize = "Motorola_VME10")]
    MotorolaVme10,
    #[strum(serialize = "DTC")]
    Dtc,
    #[strum(serialize = "MacBottom")]
    MacBottom,
    #[strum(serialize = "Elektronika_85")]
    Elektronika85,
    #[strum(serialize = "Altos_586")]
    Altos586,
    #[strum(serialize = "ATT_3B2")]
    Att3B2,
    #[strum(serialize = "CONVERGENT_AWS")]
    ConvergentAws,
    #[strum(serialize = "WANG_2275")]
    Wang2275,
    #[strum(serialize = "WANG_2275_B")]
    Wang2275B,
    #[strum(serialize = "EDAX_PV9900")]
    EdaxPv9900,
    #[strum(serialize = "OMTI_5510")]
    Omti5510,
    #[strum(serialize = "Xerox_6085")]
    Xerox6085,
    #[strum(serialize = "Telenex_Autoscope")]
    TelenexAutoscope,
    #[strum(serialize = "Morrow_MD11")]
    MorrowMd11,
    #[strum(serialize = "Unknown1")]
    Unknown1,
    #[strum(serialize = "DEC_RQDX3")]
    DecRqdx3,
    #[strum(serialize = "Seagate_ST11M")]
    SeagateSt11m,
    #[strum(serialize = "Shugart_1610")]
    Shugart1610,
    #[strum(serialize = "Intel_iSBC_215")]
    Isbc215,
    #[strum(serialize = "Adaptec")]
    Adaptec,
    #[strum(serialize = "MVME320")]
    Mvme320,
    #[strum(serialize = "Symbolics_3620")]
    Symbolics3620,
    #[strum(serialize = "Symbolics_3640")]
    Symbolics3640,
    #[strum(serialize = "Mightyframe")]
    Mightyframe,
    #[strum(serialize = "DG_MV2000")]
    DgMv2000,
    #[strum(serialize = "SOLOsystems")]
    SoloSystems,
    #[strum(serialize = "Xebec_104786")]
    Xebec104786,
    #[strum(serialize = "Xebec_S1420")]
    XebecS1420,
    #[strum(serialize = "EC1841")]
    Ec1841,
    #[strum(serialize = "Corvus_H")]
    CorvusH,
    #[strum(serialize = "NorthStar_Advantage")]
    NorthstarAdvantage,
    #[strum(serialize = "Cromemco")]
    Cromemco,
    #[strum(serialize = "Vector4")]
    Vector4,
    #[strum(serialize = "Vector4_ST506")]
    Vector4St506,
}

impl Controller {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Look up a controller by canonical name, case-insensitive.
pub fn controller_by_name(name: &str) -> Result<Controller, MfmError> {
    name.parse::<Controller>()
        .map_err(|_| MfmError::UnknownController(name.to_string()))
}

/// All registered format names, for `--help` style listings.
pub fn controller_names() -> Vec<&'static str> {
    Controller::iter().map(|c| c.name()).collect()
}

/// How a profile addresses sectors for analysis purposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnalyzeType {
    None,
    Chs,
    Lba,
}

/// What kind of check word a profile uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckKind {
    Crc,
    Checksum,
    Parity,
    Xor16,
    None,
}

/// Whether the analyzer exhausts the polynomial search for this profile or
/// only tries its specific model parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnalyzeSearch {
    Search,
    Model,
}

/// Which framer state machine decodes this profile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecoderFamily {
    Wd,
    Xebec,
    Corvus,
    Northstar,
}

/// One controller profile: the immutable declarative record driving decode,
/// analysis, and encode for a format.
#[derive(Clone, Debug)]
pub struct ControllerInfo {
    /// Sector size used while analyzing. The smallest plausible value for
    /// most formats so the next header isn't missed; some formats need the
    /// correct value.
    pub analyze_sector_size: usize,
    /// Rate of MFM clock and data bit cells.
    pub clk_rate_hz: u32,
    /// Delay from index pulse to the first physical sector, in nanoseconds.
    pub start_time_ns: u32,
    /// Index ranges into `tables::ALL_POLY` searched for header and data.
    pub header_poly: (usize, usize),
    pub data_poly: (usize, usize),
    /// Index range into `tables::ALL_INIT`.
    pub init: (usize, usize),
    pub analyze_type: AnalyzeType,
    /// Size of the header, not including the check bytes.
    pub header_bytes: usize,
    pub data_header_bytes: usize,
    /// Bytes at the start of the header / data area excluded from the check.
    pub header_crc_ignore: usize,
    pub data_crc_ignore: usize,
    pub header_check: CheckKind,
    pub data_check: CheckKind,
    /// Bytes at the end of the data area covered by the check but not
    /// written to the extract file.
    pub data_trailer_bytes: usize,
    /// True if the data area is separate from the header; false when one
    /// check covers both.
    pub separate_data: bool,
    pub track_layout: Option<&'static [TrackNode]>,
    /// Write-time geometry for converting an extract image to an emulator
    /// file.
    pub write_sector_size: usize,
    pub write_num_sectors: u32,
    pub write_first_sector_number: u32,
    /// Number of 32-bit words in the track MFM data.
    pub track_words: usize,
    /// Nonzero when the format carries per-sector metadata to extract.
    pub metadata_bytes: usize,
    /// Extra 32-bit words to copy when moving data around to fix read
    /// errors. Formats needing a run of zeros before a one use this.
    pub copy_extra: usize,
    pub write_header_crc: CrcInfo,
    pub write_data_crc: CrcInfo,
    pub analyze_search: AnalyzeSearch,
    pub family: DecoderFamily,
}

macro_rules! crc {
    ($init:expr, $poly:expr, $len:expr, $span:expr) => {
        CrcInfo::new($init, $poly, $len, $span)
    };
}

/// Profile record for a controller. Kept in one match so the table reads
/// like the reference data it is.
pub fn info(controller: Controller) -> &'static ControllerInfo {
    use AnalyzeSearch::*;
    use AnalyzeType::*;
    use CheckKind::*;
    use Controller as C;
    use DecoderFamily::*;

    macro_rules! entry {
        ($name:ident, $info:expr) => {{
            static $name: ControllerInfo = $info;
            &$name
        }};
    }

    match controller {
        C::None => entry!(
            NONE,
            ControllerInfo {
                analyze_sector_size: 0,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (0, 0),
                data_poly: (0, 0),
                init: (0, 0),
                analyze_type: AnalyzeType::None,
                header_bytes: 0,
                data_header_bytes: 0,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: false,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::NewburyData => entry!(
            NEWBURYDATA,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 4,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Wd1006 => entry!(
            WD_1006,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Some(&tables::TRK_WD_1006),
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0xffff, 0x1021, 16, 0),
                write_data_crc: crc!(0xffff, 0x1021, 16, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Wd3B1 => entry!(
            WD_3B1,
            ControllerInfo {
                analyze_sector_size: 512,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Some(&tables::TRK_3B1),
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0xffff, 0x1021, 16, 0),
                write_data_crc: crc!(0xffff, 0x1021, 16, 0),
                analyze_search: Model,
                family: Wd,
            }
        ),
        C::MotorolaVme10 => entry!(
            MOTOROLA_VME10,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 256,
                write_num_sectors: 32,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0xa00805, 32, 0),
                write_data_crc: crc!(0, 0xa00805, 32, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Dtc => entry!(
            DTC,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 2,
                data_crc_ignore: 2,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::MacBottom => entry!(
            MACBOTTOM,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Elektronika85 => entry!(
            ELEKTRONIKA_85,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 16,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Altos586 => entry!(
            ALTOS_586,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 1,
                data_crc_ignore: 1,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Att3B2 => entry!(
            ATT_3B2,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::ConvergentAws => entry!(
            CONVERGENT_AWS,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 460_000,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Wang2275 => entry!(
            WANG_2275,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (3, 4),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 2,
                data_crc_ignore: 0,
                header_check: Checksum,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Wang2275B => entry!(
            WANG_2275_B,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Model,
                family: Wd,
            }
        ),
        C::EdaxPv9900 => entry!(
            EDAX_PV9900,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 1,
                header_crc_ignore: 1,
                data_crc_ignore: 1,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Omti5510 => entry!(
            OMTI_5510,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Some(&tables::TRK_OMTI_5510),
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0x2605fb9c, 0x104c981, 32, 5),
                write_data_crc: crc!(0xd4d7ca20, 0x104c981, 32, 5),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Xerox6085 => entry!(
            XEROX_6085,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 20,
                copy_extra: 0,
                write_header_crc: crc!(0x2605fb9c, 0x104c981, 32, 5),
                write_data_crc: crc!(0xd4d7ca20, 0x104c981, 32, 5),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::TelenexAutoscope => entry!(
            TELENEX_AUTOSCOPE,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0x2605fb9c, 0x104c981, 32, 5),
                write_data_crc: crc!(0xd4d7ca20, 0x104c981, 32, 5),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::MorrowMd11 => entry!(
            MORROW_MD11,
            ControllerInfo {
                analyze_sector_size: 1024,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 1024,
                write_num_sectors: 9,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0x2605fb9c, 0x104c981, 32, 5),
                write_data_crc: crc!(0xd4d7ca20, 0x104c981, 32, 5),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Unknown1 => entry!(
            UNKNOWN1,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 1,
                data_crc_ignore: 1,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0x2605fb9c, 0x104c981, 32, 5),
                write_data_crc: crc!(0xd4d7ca20, 0x104c981, 32, 5),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::DecRqdx3 => entry!(
            DEC_RQDX3,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::SeagateSt11m => entry!(
            SEAGATE_ST11M,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Some(&tables::TRK_SEAGATE_ST11M),
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0x0, 0x41044185, 32, 5),
                write_data_crc: crc!(0x0, 0x41044185, 32, 5),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Shugart1610 => entry!(
            SHUGART_1610,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Isbc215 => entry!(
            ISBC_215,
            ControllerInfo {
                analyze_sector_size: 128,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 2,
                data_crc_ignore: 2,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Adaptec => entry!(
            ADAPTEC,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Lba,
                header_bytes: 6,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Mvme320 => entry!(
            MVME320,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 7,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Some(&tables::TRK_MVME320),
                write_sector_size: 256,
                write_num_sectors: 32,
                write_first_sector_number: 1,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0xffff, 0x1021, 16, 0),
                write_data_crc: crc!(0xffffffff, 0x10210191, 32, 5),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Symbolics3620 => entry!(
            SYMBOLICS_3620,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 7,
                data_header_bytes: 3,
                header_crc_ignore: 3,
                data_crc_ignore: 3,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Wd,
            }
        ),
        C::Symbolics3640 => entry!(
            SYMBOLICS_3640,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (0, 1),
                data_poly: (4, NUM_POLY),
                init: (0, 1),
                analyze_type: Chs,
                header_bytes: 11,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 2,
                header_check: Parity,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Some(&tables::TRK_SYMBOLICS_3640),
                write_sector_size: 1160,
                write_num_sectors: 8,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0x0, 0x0, 1, 0),
                write_data_crc: crc!(0x0, 0xa00805, 32, 5),
                analyze_search: Model,
                family: Wd,
            }
        ),
        // Detected by special case code when head 8 of a WD_1006 read fails;
        // not part of a normal search since it matches WD_1006 for drives
        // with fewer than 8 heads.
        C::Mightyframe => entry!(
            MIGHTYFRAME,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Model,
                family: Wd,
            }
        ),
        C::DgMv2000 => entry!(
            DG_MV2000,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 5,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 512,
                write_num_sectors: 17,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Model,
                family: Wd,
            }
        ),
        C::SoloSystems => entry!(
            SOLOSYSTEMS,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 7,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Xebec,
            }
        ),
        C::Xebec104786 => entry!(
            XEBEC_104786,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 100_500,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 9,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Xebec,
            }
        ),
        C::XebecS1420 => entry!(
            XEBEC_S1420,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 0,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 9,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Xebec,
            }
        ),
        C::Ec1841 => entry!(
            EC1841,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 220_000,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 9,
                data_header_bytes: 2,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Xebec,
            }
        ),
        C::CorvusH => entry!(
            CORVUS_H,
            ControllerInfo {
                analyze_sector_size: 512,
                clk_rate_hz: 11_000_000,
                start_time_ns: 312_000,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 3,
                data_header_bytes: 3,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: false,
                track_layout: Option::None,
                write_sector_size: 0,
                write_num_sectors: 0,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0, 0, 0),
                write_data_crc: crc!(0, 0, 0, 0),
                analyze_search: Search,
                family: Corvus,
            }
        ),
        C::NorthstarAdvantage => entry!(
            NORTHSTAR_ADVANTAGE,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 230_000,
                header_poly: (1, 2),
                data_poly: (2, 3),
                init: (0, 1),
                analyze_type: Chs,
                header_bytes: 7,
                data_header_bytes: 0,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Checksum,
                data_check: Checksum,
                data_trailer_bytes: 0,
                separate_data: true,
                track_layout: Some(&tables::TRK_NORTHSTAR),
                write_sector_size: 512,
                write_num_sectors: 16,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 33,
                write_header_crc: crc!(0, 0, 16, 0),
                write_data_crc: crc!(0, 0, 32, 0),
                analyze_search: Search,
                family: Northstar,
            }
        ),
        C::Cromemco => entry!(
            CROMEMCO,
            ControllerInfo {
                analyze_sector_size: 10240,
                clk_rate_hz: 10_000_000,
                start_time_ns: 6_000,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 9,
                data_header_bytes: 9,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 7,
                separate_data: false,
                track_layout: Some(&tables::TRK_CROMEMCO),
                write_sector_size: 10240,
                write_num_sectors: 1,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 0,
                write_header_crc: crc!(0, 0x8005, 16, 0),
                write_data_crc: crc!(0, 0x8005, 16, 0),
                analyze_search: Search,
                family: Corvus,
            }
        ),
        C::Vector4 => entry!(
            VECTOR4,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 300_000,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 4,
                data_header_bytes: 4,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: false,
                track_layout: Option::None,
                write_sector_size: 256,
                write_num_sectors: 32,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 20,
                write_header_crc: crc!(0x0, 0x104c981, 32, 5),
                write_data_crc: crc!(0x0, 0x104c981, 32, 5),
                analyze_search: Search,
                family: Corvus,
            }
        ),
        C::Vector4St506 => entry!(
            VECTOR4_ST506,
            ControllerInfo {
                analyze_sector_size: 256,
                clk_rate_hz: 10_000_000,
                start_time_ns: 300_000,
                header_poly: (4, NUM_POLY),
                data_poly: (4, NUM_POLY),
                init: (0, NUM_INIT),
                analyze_type: Chs,
                header_bytes: 4,
                data_header_bytes: 4,
                header_crc_ignore: 0,
                data_crc_ignore: 0,
                header_check: Crc,
                data_check: Crc,
                data_trailer_bytes: 0,
                separate_data: false,
                track_layout: Option::None,
                write_sector_size: 256,
                write_num_sectors: 32,
                write_first_sector_number: 0,
                track_words: 5209,
                metadata_bytes: 0,
                copy_extra: 20,
                write_header_crc: crc!(0x0, 0x104c981, 32, 5),
                write_data_crc: crc!(0x0, 0x104c981, 32, 5),
                analyze_search: Search,
                family: Corvus,
            }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_is_case_insensitive() {
        assert_eq!(controller_by_name("wd_1006").unwrap(), Controller::Wd1006);
        assert_eq!(controller_by_name("OMTI_5510").unwrap(), Controller::Omti5510);
        assert_eq!(controller_by_name("northstar_advantage").unwrap(), Controller::NorthstarAdvantage);
        assert!(controller_by_name("WD_2010").is_err());
    }

    #[test]
    fn table_lengths_match() {
        assert_eq!(NUM_POLY, tables::ALL_POLY.len());
        assert_eq!(NUM_INIT, tables::ALL_INIT.len());
    }

    #[test]
    fn every_controller_has_an_entry() {
        use strum::IntoEnumIterator;
        for c in Controller::iter() {
            let i = info(c);
            assert!(i.track_words > 0, "{}", c.name());
            // Poly ranges must stay inside the shared table.
            assert!(i.header_poly.1 <= tables::ALL_POLY.len());
            assert!(i.data_poly.1 <= tables::ALL_POLY.len());
            assert!(i.init.1 <= tables::ALL_INIT.len());
        }
    }

    #[test]
    fn layout_profiles_declare_write_geometry() {
        use strum::IntoEnumIterator;
        for c in Controller::iter() {
            let i = info(c);
            if i.track_layout.is_some() {
                assert!(i.write_num_sectors > 0, "{}", c.name());
                assert!(i.write_sector_size > 0, "{}", c.name());
                assert!(i.write_data_crc.length > 0, "{}", c.name());
            }
        }
    }
}
