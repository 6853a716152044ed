//! Scanner configuration values and the `SET_SCANNER_CONFIG` payload.
//!
//! The device has no incremental update command, so a config is always sent
//! whole. [`ScannerConfig`] is a plain value; the driver keeps the last one
//! the device acknowledged.

use crate::bits::{u16_high_first, u32_high_first};
use crate::commands::{self, SET_SCANNER_CONFIG};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanLight {
    #[default]
    White,
    Red,
    Green,
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDataFormat {
    /// 1 bit per pixel.
    BlackAndWhite,
    /// 8 bits per pixel.
    #[default]
    Grayscale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Dpi100,
    Dpi150,
    Dpi200,
    Dpi300,
}

impl Resolution {
    pub const fn dpi(self) -> u16 {
        match self {
            Self::Dpi100 => 100,
            Self::Dpi150 => 150,
            Self::Dpi200 => 200,
            Self::Dpi300 => 300,
        }
    }

    pub fn from_dpi(dpi: u16) -> Option<Self> {
        match dpi {
            100 => Some(Self::Dpi100),
            150 => Some(Self::Dpi150),
            200 => Some(Self::Dpi200),
            300 => Some(Self::Dpi300),
            _ => None,
        }
    }
}

/// What the transport does with the sheet once a scan finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperMovementAfterScan {
    #[default]
    HoldTicket,
    DriveForward,
    DriveBackward,
}

impl PaperMovementAfterScan {
    pub const fn code(self) -> u8 {
        match self {
            Self::HoldTicket => 0x00,
            Self::DriveForward => 0x01,
            Self::DriveBackward => 0x02,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::HoldTicket),
            0x01 => Some(Self::DriveForward),
            0x02 => Some(Self::DriveBackward),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    #[default]
    Forward,
    Backward,
    /// Scan while parked. Implies backward, so both bits are set.
    InPark,
}

impl ScanDirection {
    pub const fn flags(self) -> u8 {
        match self {
            Self::Forward => 0x00,
            Self::Backward => 0x01,
            Self::InPark => 0x03,
        }
    }
}

const SENSOR_DISABLE_JAM_WHEEL: u8 = 0x01;

const fn scan_type_code(format: ScanDataFormat, light: ScanLight) -> u8 {
    match format {
        ScanDataFormat::Grayscale => match light {
            ScanLight::Red => 0x01,
            ScanLight::Green => 0x02,
            ScanLight::Blue => 0x03,
            ScanLight::White => 0x05,
        },
        ScanDataFormat::BlackAndWhite => match light {
            ScanLight::Red => 0x08,
            ScanLight::Green => 0x09,
            ScanLight::Blue => 0x0a,
            ScanLight::White => 0x0c,
        },
    }
}

/// Full scan width of the CIS in dots.
pub const DEFAULT_SCAN_WIDTH_DOTS: u16 = 1728;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    pub scan_light: ScanLight,
    pub scan_data_format: ScanDataFormat,
    pub horizontal_resolution: Resolution,
    pub vertical_resolution: Resolution,
    pub paper_movement_after_scan: PaperMovementAfterScan,
    pub scan_direction: ScanDirection,
    pub horizontal_scan_width_dots: u16,
    /// 0 means no limit.
    pub max_vertical_scan_height: u32,
    pub disable_jam_wheel_sensor: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_light: ScanLight::White,
            scan_data_format: ScanDataFormat::Grayscale,
            horizontal_resolution: Resolution::Dpi200,
            vertical_resolution: Resolution::Dpi200,
            paper_movement_after_scan: PaperMovementAfterScan::HoldTicket,
            scan_direction: ScanDirection::Forward,
            horizontal_scan_width_dots: DEFAULT_SCAN_WIDTH_DOTS,
            max_vertical_scan_height: 0,
            disable_jam_wheel_sensor: false,
        }
    }
}

impl ScannerConfig {
    pub fn with_scan_light(self, scan_light: ScanLight) -> Self {
        Self { scan_light, ..self }
    }

    pub fn with_scan_data_format(self, scan_data_format: ScanDataFormat) -> Self {
        Self {
            scan_data_format,
            ..self
        }
    }

    pub fn with_resolution(self, horizontal: Resolution, vertical: Resolution) -> Self {
        Self {
            horizontal_resolution: horizontal,
            vertical_resolution: vertical,
            ..self
        }
    }

    pub fn with_paper_movement_after_scan(self, movement: PaperMovementAfterScan) -> Self {
        Self {
            paper_movement_after_scan: movement,
            ..self
        }
    }

    pub fn with_scan_direction(self, scan_direction: ScanDirection) -> Self {
        Self {
            scan_direction,
            ..self
        }
    }

    pub fn scan_type_code(&self) -> u8 {
        scan_type_code(self.scan_data_format, self.scan_light)
    }

    /// The complete `SET_SCANNER_CONFIG` command, opcode included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let [hres_h, hres_l] = u16_high_first(self.horizontal_resolution.dpi());
        let [vres_h, vres_l] = u16_high_first(self.vertical_resolution.dpi());
        let [width_h, width_l] = u16_high_first(self.horizontal_scan_width_dots);
        let [h3, h2, h1, h0] = u32_high_first(self.max_vertical_scan_height);
        let sensor_disable = if self.disable_jam_wheel_sensor {
            SENSOR_DISABLE_JAM_WHEEL
        } else {
            0
        };
        commands::encode(
            &SET_SCANNER_CONFIG,
            &[
                self.paper_movement_after_scan.code(),
                sensor_disable,
                self.scan_direction.flags(),
                0x00,
                self.scan_type_code(),
                hres_h,
                hres_l,
                vres_h,
                vres_l,
                width_h,
                width_l,
                h3,
                h2,
                h1,
                h0,
            ],
        )
    }
}
