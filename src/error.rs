use std::time::Duration;

use thiserror::Error;

use crate::scan::ScanHalt;
use crate::state_machine::SimpleStatus;
use crate::transport::Endpoint;

/// Malformed or mismatched bytes on the wire. Always fatal for the current
/// operation; the generic inbound buffer should be flushed before retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{layout}: expected 0x{expected:02x} at offset {offset}, got 0x{actual:02x}")]
    LiteralMismatch {
        layout: &'static str,
        offset: usize,
        expected: u8,
        actual: u8,
    },

    #[error("{layout}: truncated, needed {needed} bytes but got {actual}")]
    Truncated {
        layout: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("{layout}: {extra} unexpected trailing bytes")]
    TrailingBytes { layout: &'static str, extra: usize },

    #[error("{layout}: expected {expected} field values, got {actual}")]
    FieldCount {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{layout}: field at segment {index} has the wrong kind")]
    FieldType { layout: &'static str, index: usize },

    #[error("{layout}: optional data of {len} bytes exceeds maximum of {max}")]
    PayloadTooLong {
        layout: &'static str,
        len: usize,
        max: usize,
    },

    #[error("real-time response echoed request id 0x{actual:02x}, expected 0x{expected:02x}")]
    RequestIdMismatch { expected: u8, actual: u8 },

    #[error("real-time request 0x{request_id:02x} returned code 0x{code:02x}")]
    ReturnCode { request_id: u8, code: u8 },

    #[error("uninterpretable acknowledgement: 0x{0:02x}")]
    UnknownAcknowledgement(u8),

    #[error("empty response on {0}")]
    EmptyResponse(Endpoint),

    #[error("unknown scan block format 0x{0:02x}")]
    UnknownScanFormat(u8),

    #[error("invalid scanner capability block: {0}")]
    InvalidCapability(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("paper handler not found ({vendor_id:04x}:{product_id:04x})")]
    NotFound { vendor_id: u16, product_id: u16 },

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("transfer on {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: Endpoint, timeout: Duration },

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("scan halted: {0}")]
    ScanHalted(ScanHalt),

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SimpleStatus,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
