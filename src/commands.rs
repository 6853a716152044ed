//! Generic-endpoint command layouts and their parameter encoders.
//!
//! Positioning commands carry their 16-bit argument as `[nL, nH]`; the
//! scanner configuration payload uses `[nH, nL]`. Each encoder spells out
//! which order it uses rather than sharing a helper that hides it.

use std::fmt;

use crate::bits::{self, u16_low_first};
use crate::codec::{Layout, Segment, Value};
use crate::error::Result;

macro_rules! fixed {
    ($name:ident, $label:literal, [$($b:expr),+ $(,)?]) => {
        pub const $name: Layout = Layout::new($label, &[$(Segment::Literal($b)),+]);
    };
}

macro_rules! with_bytes {
    ($name:ident, $label:literal, [$($b:expr),+], [$($field:literal),+ $(,)?]) => {
        pub const $name: Layout = Layout::new(
            $label,
            &[$(Segment::Literal($b)),+, $(Segment::Byte($field)),+],
        );
    };
}

// ── Printer ──────────────────────────────────────────────────────────

fixed!(INITIALIZE, "initialize", [0x1b, 0x40]);
fixed!(ENABLE_PRINT, "enable print", [0x1f, 0x45]);
fixed!(DISABLE_PRINT, "disable print", [0x1f, 0x65]);
fixed!(SCANNER_CALIBRATION, "scanner calibration", [0x1f, 0x43]);

with_bytes!(SET_MOTION_UNITS, "set motion units", [0x1d, 0x50], ["x", "y"]);
with_bytes!(SET_LINE_SPACING, "set line spacing", [0x1b, 0x33], ["n"]);
with_bytes!(SET_LEFT_MARGIN, "set left margin", [0x1d, 0x4c], ["nL", "nH"]);
with_bytes!(SET_PRINTING_AREA_WIDTH, "set printing area width", [0x1d, 0x57], ["nL", "nH"]);
with_bytes!(SET_PRINTING_DENSITY, "set printing density", [0x1d, 0x7c], ["density"]);
with_bytes!(SET_PRINTING_SPEED, "set printing speed", [0x1d, 0xf0], ["speed"]);
with_bytes!(SET_ABSOLUTE_PRINT_POSITION, "set absolute print position", [0x1b, 0x24], ["nL", "nH"]);
with_bytes!(SET_RELATIVE_PRINT_POSITION, "set relative print position", [0x1b, 0x5c], ["nL", "nH"]);
with_bytes!(
    SET_RELATIVE_VERTICAL_PRINT_POSITION,
    "set relative vertical print position",
    [0x1b, 0x28, 0x76],
    ["nL", "nH"]
);
with_bytes!(PRINT_AND_FEED, "print and feed", [0x1b, 0x4a], ["feed"]);

/// Select bit-image mode 33 (24-dot double density) and buffer one raster
/// line of column-major data.
pub const BUFFER_IMAGE: Layout = Layout::new(
    "buffer image",
    &[
        Segment::Literal(0x1b),
        Segment::Literal(0x2a),
        Segment::Literal(IMAGE_MODE_24_DOT_DOUBLE_DENSITY),
        Segment::Byte("nL"),
        Segment::Byte("nH"),
        Segment::Rest("data"),
    ],
);

pub const IMAGE_MODE_24_DOT_DOUBLE_DENSITY: u8 = 33;

// ── Scanner / paper transport ────────────────────────────────────────

fixed!(LOAD_PAPER, "load paper", [0x1c, 0x53, 0x50, 0x4c]);
fixed!(PARK_PAPER, "park paper", [0x1c, 0x53, 0x50, 0x50]);
fixed!(EJECT_PAPER_TO_FRONT, "eject paper", [0x1c, 0x53, 0x50, 0x45]);
fixed!(EJECT_PAPER_TO_BALLOT_BOX, "eject paper to ballot box", [0x1c, 0x53, 0x50, 0x48]);
fixed!(PRESENT_PAPER_AND_HOLD, "present paper and hold", [0x1c, 0x53, 0x50, 0x46]);
fixed!(SCAN, "scan", [0x1c, 0x53, 0x50, 0x53]);
fixed!(GET_SCANNER_CAPABILITY, "get scanner capability", [0x1c, 0x53, 0x43, 0x47]);

pub const SET_SCANNER_CONFIG_OPCODE: [u8; 4] = [0x1c, 0x53, 0x50, 0x43];

pub const SET_SCANNER_CONFIG: Layout = Layout::new(
    "set scanner config",
    &[
        Segment::Literal(0x1c),
        Segment::Literal(0x53),
        Segment::Literal(0x50),
        Segment::Literal(0x43),
        Segment::Byte("paper_movement_after_scan"),
        Segment::Byte("sensor_disable"),
        Segment::Byte("scan_direction"),
        Segment::Byte("reserved"),
        Segment::Byte("scan_type"),
        Segment::Byte("horizontal_resolution_h"),
        Segment::Byte("horizontal_resolution_l"),
        Segment::Byte("vertical_resolution_h"),
        Segment::Byte("vertical_resolution_l"),
        Segment::Byte("scan_width_h"),
        Segment::Byte("scan_width_l"),
        Segment::Byte("max_height_3"),
        Segment::Byte("max_height_2"),
        Segment::Byte("max_height_1"),
        Segment::Byte("max_height_0"),
    ],
);

// ── Lookup tables ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintingSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl PrintingSpeed {
    pub const fn code(self) -> u8 {
        match self {
            Self::Slow => 0,
            Self::Normal => 1,
            Self::Fast => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
pub enum PrintingDensity {
    #[serde(rename = "-25%")]
    Minus25,
    #[serde(rename = "-12.5%")]
    Minus12_5,
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "+12.5%")]
    Plus12_5,
    #[serde(rename = "+25%")]
    Plus25,
}

impl PrintingDensity {
    pub const fn code(self) -> u8 {
        match self {
            Self::Minus25 => 0x02,
            Self::Minus12_5 => 0x03,
            Self::Default => 0x04,
            Self::Plus12_5 => 0x05,
            Self::Plus25 => 0x06,
        }
    }
}

impl fmt::Display for PrintingDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minus25 => "-25%",
            Self::Minus12_5 => "-12.5%",
            Self::Default => "default",
            Self::Plus12_5 => "+12.5%",
            Self::Plus25 => "+25%",
        })
    }
}

// ── Encoders ─────────────────────────────────────────────────────────

pub fn encode(layout: &Layout, fields: &[u8]) -> Result<Vec<u8>> {
    Ok(layout.encode_bytes(fields)?)
}

/// Encode a `[nL, nH]` motion-unit command.
pub fn encode_motion(layout: &Layout, units: u16) -> Result<Vec<u8>> {
    encode(layout, &u16_low_first(units))
}

pub fn encode_relative_motion(layout: &Layout, units: i32) -> Result<Vec<u8>> {
    encode_motion(layout, bits::signed_motion_to_u16(units)?)
}

pub fn encode_buffer_image(width: u16, data: &[u8]) -> Result<Vec<u8>> {
    let [nl, nh] = u16_low_first(width);
    Ok(BUFFER_IMAGE.encode(&[
        Value::Byte(nl),
        Value::Byte(nh),
        Value::Bytes(data.to_vec()),
    ])?)
}

pub fn encode_motion_units(x: u8, y: u8) -> Result<Vec<u8>> {
    encode(&SET_MOTION_UNITS, &[x, y])
}
