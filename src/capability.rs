//! Scanner capability block returned by `GET_SCANNER_CAPABILITY`.
//!
//! The block is a run of tag-length-value entries. Multi-byte numbers are
//! big-endian.
//!
//! ```text
//! 0x01  paper movements after scan   one code per byte
//! 0x02  sensor kinds                 one code per byte
//! 0x03  scan lights                  one code per byte
//! 0x04  scan data formats            one code per byte
//! 0x05  resolutions (dpi)            u16 each
//! 0x06  max scan area                u16 width (dots), u32 height (lines)
//! 0x07  buffer sizes (bytes)         u32 image buffer, u32 transfer buffer
//! ```
//!
//! Unknown tags are skipped so newer firmware stays readable.

use log::debug;

use crate::error::{ProtocolError, Result};
use crate::scanner_config::PaperMovementAfterScan;

const TAG_PAPER_MOVEMENT: u8 = 0x01;
const TAG_SENSORS: u8 = 0x02;
const TAG_SCAN_LIGHTS: u8 = 0x03;
const TAG_DATA_FORMATS: u8 = 0x04;
const TAG_RESOLUTIONS: u8 = 0x05;
const TAG_MAX_AREA: u8 = 0x06;
const TAG_BUFFERS: u8 = 0x07;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannerCapability {
    /// Codes the device reported; unrecognised codes are kept in `raw_paper_movements`.
    pub paper_movements: Vec<PaperMovementAfterScan>,
    pub raw_paper_movements: Vec<u8>,
    pub sensors: Vec<u8>,
    pub scan_lights: Vec<u8>,
    pub data_formats: Vec<u8>,
    pub resolutions_dpi: Vec<u16>,
    pub max_width_dots: Option<u16>,
    pub max_height_lines: Option<u32>,
    pub image_buffer_bytes: Option<u32>,
    pub transfer_buffer_bytes: Option<u32>,
}

fn invalid(msg: String) -> ProtocolError {
    ProtocolError::InvalidCapability(msg)
}

fn expect_len(tag: u8, value: &[u8], len: usize) -> std::result::Result<(), ProtocolError> {
    if value.len() == len {
        Ok(())
    } else {
        Err(invalid(format!(
            "tag 0x{tag:02x} carries {} bytes, expected {len}",
            value.len()
        )))
    }
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

impl ScannerCapability {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut cap = Self::default();
        let mut pos = 0;

        while pos < raw.len() {
            let tag = raw[pos];
            let Some(&len) = raw.get(pos + 1) else {
                return Err(
                    invalid(format!("tag 0x{tag:02x} at offset {pos} has no length")).into(),
                );
            };
            let start = pos + 2;
            let end = start + len as usize;
            let Some(value) = raw.get(start..end) else {
                return Err(invalid(format!(
                    "tag 0x{tag:02x} needs {len} bytes, {} remain",
                    raw.len() - start
                ))
                .into());
            };

            match tag {
                TAG_PAPER_MOVEMENT => {
                    cap.raw_paper_movements = value.to_vec();
                    cap.paper_movements = value
                        .iter()
                        .filter_map(|&c| PaperMovementAfterScan::from_code(c))
                        .collect();
                }
                TAG_SENSORS => cap.sensors = value.to_vec(),
                TAG_SCAN_LIGHTS => cap.scan_lights = value.to_vec(),
                TAG_DATA_FORMATS => cap.data_formats = value.to_vec(),
                TAG_RESOLUTIONS => {
                    if value.len() % 2 != 0 {
                        return Err(invalid(format!(
                            "resolution list has odd length {}",
                            value.len()
                        ))
                        .into());
                    }
                    cap.resolutions_dpi = value
                        .chunks_exact(2)
                        .map(|p| u16::from_be_bytes([p[0], p[1]]))
                        .collect();
                }
                TAG_MAX_AREA => {
                    expect_len(tag, value, 6)?;
                    cap.max_width_dots = Some(u16::from_be_bytes([value[0], value[1]]));
                    cap.max_height_lines = Some(be_u32(&value[2..6]));
                }
                TAG_BUFFERS => {
                    expect_len(tag, value, 8)?;
                    cap.image_buffer_bytes = Some(be_u32(&value[0..4]));
                    cap.transfer_buffer_bytes = Some(be_u32(&value[4..8]));
                }
                other => debug!("capability: skipping unknown tag 0x{other:02x} ({len} bytes)"),
            }
            pos = end;
        }

        Ok(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> Vec<u8> {
        vec![
            0x01, 0x03, 0x00, 0x01, 0x02, // paper movements
            0x02, 0x01, 0x01, // sensors
            0x03, 0x04, 0x00, 0x01, 0x02, 0x03, // lights
            0x04, 0x02, 0x00, 0x01, // formats
            0x05, 0x08, 0x00, 0x64, 0x00, 0x96, 0x00, 0xc8, 0x01, 0x2c, // resolutions
            0x06, 0x06, 0x06, 0xc0, 0x00, 0x00, 0x27, 0x10, // max area
            0x07, 0x08, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, // buffers
        ]
    }

    #[test]
    fn parses_every_known_tag() {
        let cap = ScannerCapability::parse(&sample()).unwrap();
        assert_eq!(
            cap.paper_movements,
            vec![
                PaperMovementAfterScan::HoldTicket,
                PaperMovementAfterScan::DriveForward,
                PaperMovementAfterScan::DriveBackward,
            ]
        );
        assert_eq!(cap.sensors, vec![0x01]);
        assert_eq!(cap.scan_lights, vec![0, 1, 2, 3]);
        assert_eq!(cap.data_formats, vec![0, 1]);
        assert_eq!(cap.resolutions_dpi, vec![100, 150, 200, 300]);
        assert_eq!(cap.max_width_dots, Some(1728));
        assert_eq!(cap.max_height_lines, Some(10_000));
        assert_eq!(cap.image_buffer_bytes, Some(0x0010_0000));
        assert_eq!(cap.transfer_buffer_bytes, Some(0x0001_0000));
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let mut raw = vec![0x7f, 0x02, 0xaa, 0xbb];
        raw.extend_from_slice(&[0x02, 0x01, 0x05]);
        let cap = ScannerCapability::parse(&raw).unwrap();
        assert_eq!(cap.sensors, vec![0x05]);
    }

    #[test]
    fn empty_block_is_empty_capability() {
        assert_eq!(ScannerCapability::parse(&[]).unwrap(), ScannerCapability::default());
    }

    #[test]
    fn truncated_entry_is_rejected() {
        let err = ScannerCapability::parse(&[0x05, 0x04, 0x00, 0x64]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InvalidCapability(_))
        ));
        assert!(ScannerCapability::parse(&[0x03]).is_err());
    }

    #[test]
    fn fixed_size_tags_are_checked() {
        assert!(ScannerCapability::parse(&[0x06, 0x02, 0x06, 0xc0]).is_err());
        assert!(ScannerCapability::parse(&[0x05, 0x03, 0x00, 0x64, 0x00]).is_err());
    }
}
