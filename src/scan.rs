//! Scan data stream on the generic inbound endpoint.
//!
//! After `SCAN` the device sends a sequence of blocks. Each block opens with
//! a 16-byte header, possibly followed by pixel data in the same transfer:
//!
//! ```text
//! offset 3     continuation status  0x00 more blocks, 0xff last block
//! offset 5     format               selects bits per pixel
//! offset 6..8  width  (big-endian)
//! offset 8..10 height (big-endian)
//! ```
//!
//! A block whose pixel data does not fit in one transfer continues in the
//! following transfers until its declared byte length is reached.

use std::fmt;

use log::{debug, info, warn};

use crate::error::{Error, ProtocolError, Result};
use crate::transport::Endpoint;

pub const HEADER_LEN: usize = 16;

const STATUS_OFFSET: usize = 3;
const FORMAT_OFFSET: usize = 5;
const WIDTH_OFFSET: usize = 6;
const HEIGHT_OFFSET: usize = 8;

const STATUS_CONTINUE: u8 = 0x00;
const STATUS_DONE: u8 = 0xff;

/// Why the device stopped a scan early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanHalt {
    Aborted,
    PaperJam,
    Timeout,
    DoubleSheet,
    Other(u8),
}

impl ScanHalt {
    fn from_status(status: u8) -> Self {
        match status {
            0x01 => Self::Aborted,
            0x02 => Self::PaperJam,
            0x03 => Self::Timeout,
            0x04 => Self::DoubleSheet,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ScanHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => f.write_str("aborted"),
            Self::PaperJam => f.write_str("paper jam"),
            Self::Timeout => f.write_str("timeout"),
            Self::DoubleSheet => f.write_str("double sheet"),
            Self::Other(code) => write!(f, "status 0x{code:02x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    BlackAndWhite,
    Grayscale,
    Rgb,
    Rgbu,
}

impl PixelFormat {
    pub fn from_code(code: u8) -> std::result::Result<Self, ProtocolError> {
        match code {
            0x01..=0x05 => Ok(Self::Grayscale),
            0x06 => Ok(Self::Rgb),
            0x07 => Ok(Self::Rgbu),
            0x08..=0x0c => Ok(Self::BlackAndWhite),
            other => Err(ProtocolError::UnknownScanFormat(other)),
        }
    }

    pub const fn bits_per_pixel(self) -> usize {
        match self {
            Self::BlackAndWhite => 1,
            Self::Grayscale => 8,
            Self::Rgb => 24,
            Self::Rgbu => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockHeader {
    status: u8,
    format: u8,
    width: u16,
    height: u16,
}

impl BlockHeader {
    fn parse(raw: &[u8]) -> std::result::Result<Self, ProtocolError> {
        if raw.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated {
                layout: "scan block header",
                needed: HEADER_LEN,
                actual: raw.len(),
            });
        }
        let be16 = |at: usize| u16::from_be_bytes([raw[at], raw[at + 1]]);
        Ok(Self {
            status: raw[STATUS_OFFSET],
            format: raw[FORMAT_OFFSET],
            width: be16(WIDTH_OFFSET),
            height: be16(HEIGHT_OFFSET),
        })
    }

    /// A block with no pixels may carry any format byte.
    fn byte_len(&self) -> std::result::Result<usize, ProtocolError> {
        let pixels = self.width as usize * self.height as usize;
        if pixels == 0 {
            return Ok(0);
        }
        let bpp = PixelFormat::from_code(self.format)?.bits_per_pixel();
        Ok((pixels * bpp + 7) / 8)
    }
}

/// Pixel data from every block, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImage {
    /// Format of the first block with pixels, if any.
    pub format: Option<PixelFormat>,
    pub width: u16,
    /// Sum of all block heights.
    pub height: u32,
    pub data: Vec<u8>,
}

/// Read blocks from `next_transfer` until the device reports the last one.
///
/// A halt status ends the stream immediately with [`Error::ScanHalted`];
/// data from earlier blocks is discarded.
pub fn read_scan_stream<F>(mut next_transfer: F) -> Result<ScannedImage>
where
    F: FnMut() -> Result<Vec<u8>>,
{
    let mut image = ScannedImage {
        format: None,
        width: 0,
        height: 0,
        data: Vec::new(),
    };
    let mut blocks = 0u32;

    loop {
        let transfer = next_transfer()?;
        let header = BlockHeader::parse(&transfer)?;
        match header.status {
            STATUS_CONTINUE | STATUS_DONE => {}
            status => {
                let halt = ScanHalt::from_status(status);
                warn!("scan: halted after {blocks} blocks: {halt}");
                return Err(Error::ScanHalted(halt));
            }
        }

        let expected = header.byte_len()?;
        if expected > 0 {
            image.format.get_or_insert(PixelFormat::from_code(header.format)?);
            image.width = header.width;
        }
        image.height += u32::from(header.height);

        let mut received = transfer.len() - HEADER_LEN;
        image.data.extend_from_slice(&transfer[HEADER_LEN..]);
        while received < expected {
            let more = next_transfer()?;
            if more.is_empty() {
                return Err(ProtocolError::EmptyResponse(Endpoint::GenericIn).into());
            }
            debug!("scan: block {blocks} +{} bytes", more.len());
            received += more.len();
            image.data.extend_from_slice(&more);
        }
        blocks += 1;
        debug!(
            "scan: block {blocks} {}x{} format 0x{:02x} ({received} bytes)",
            header.width, header.height, header.format
        );

        if header.status == STATUS_DONE {
            info!(
                "scan: complete, {blocks} blocks, {}x{}, {} bytes",
                image.width,
                image.height,
                image.data.len()
            );
            return Ok(image);
        }
    }
}
