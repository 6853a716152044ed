//! Raw bulk transfers to the paper handler over libusb.
//!
//! The device exposes a single vendor-specific interface with two bulk
//! endpoint pairs:
//!
//! ```text
//! generic   in 0x81  out 0x02   commands, acknowledgements, print and scan data
//! real-time in 0x83  out 0x04   status requests, scan abort/reset
//! ```

use std::fmt;
use std::time::Duration;

use log::{debug, info};
use rusb::UsbContext;

use crate::error::{Error, Result};

pub const VID: u16 = 0x0dd4;
pub const PID: u16 = 0x4105;
const CONFIGURATION: u8 = 1;
const IFACE: u8 = 0;

/// Largest transfer the device will return in one read.
pub const PACKET_SIZE: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GenericIn,
    GenericOut,
    RealTimeIn,
    RealTimeOut,
}

impl Endpoint {
    pub const fn address(self) -> u8 {
        match self {
            Self::GenericIn => 0x81,
            Self::GenericOut => 0x02,
            Self::RealTimeIn => 0x83,
            Self::RealTimeOut => 0x04,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GenericIn => "generic-in",
            Self::GenericOut => "generic-out",
            Self::RealTimeIn => "real-time-in",
            Self::RealTimeOut => "real-time-out",
        };
        write!(f, "{name} (0x{:02x})", self.address())
    }
}

/// Blocking bulk transfers on a claimed device.
///
/// A zero timeout waits indefinitely. Implementations report an expired
/// timeout as [`Error::Timeout`] so callers can tell it apart from a lost
/// device.
pub trait Transport: Send + Sync {
    fn write(&self, endpoint: Endpoint, data: &[u8], timeout: Duration) -> Result<usize>;

    fn read(&self, endpoint: Endpoint, timeout: Duration) -> Result<Vec<u8>>;

    /// Give the interface back to the system.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct UsbTransport {
    handle: rusb::DeviceHandle<rusb::Context>,
}

impl UsbTransport {
    /// Open the first device matching `vendor_id:product_id` and claim its
    /// interface, detaching a kernel driver if one is bound.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self> {
        let ctx = rusb::Context::new()?;
        let handle = ctx
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or(Error::NotFound {
                vendor_id,
                product_id,
            })?;

        if handle.active_configuration()? != CONFIGURATION {
            handle.set_active_configuration(CONFIGURATION)?;
            debug!("usb: selected configuration {CONFIGURATION}");
        }
        // Not every platform can report a bound kernel driver.
        if handle.kernel_driver_active(IFACE).unwrap_or(false) {
            handle.detach_kernel_driver(IFACE)?;
            debug!("usb: detached kernel driver from interface {IFACE}");
        }
        handle.claim_interface(IFACE)?;
        info!("usb: claimed {vendor_id:04x}:{product_id:04x} interface {IFACE}");
        Ok(Self { handle })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(VID, PID)
    }
}

fn timeout_error(endpoint: Endpoint, timeout: Duration) -> impl Fn(rusb::Error) -> Error {
    move |e| match e {
        rusb::Error::Timeout => Error::Timeout { endpoint, timeout },
        other => Error::Usb(other),
    }
}

impl Transport for UsbTransport {
    fn write(&self, endpoint: Endpoint, data: &[u8], timeout: Duration) -> Result<usize> {
        debug!("tx {endpoint}: {}", hex(data));
        self.handle
            .write_bulk(endpoint.address(), data, timeout)
            .map_err(timeout_error(endpoint, timeout))
    }

    fn read(&self, endpoint: Endpoint, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; PACKET_SIZE];
        let n = self
            .handle
            .read_bulk(endpoint.address(), &mut buf, timeout)
            .map_err(timeout_error(endpoint, timeout))?;
        buf.truncate(n);
        debug!("rx {endpoint}: {}", hex(&buf));
        Ok(buf)
    }

    fn close(&self) -> Result<()> {
        self.handle.release_interface(IFACE)?;
        debug!("usb: released interface {IFACE}");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) use fake::FakeTransport;

#[cfg(test)]
mod fake {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::{Endpoint, Transport};
    use crate::error::{Error, Result};

    /// Scripted device: replays queued reads and records every write.
    #[derive(Default)]
    pub struct FakeTransport {
        reads: Mutex<HashMap<Endpoint, VecDeque<Vec<u8>>>>,
        writes: Mutex<Vec<(Endpoint, Vec<u8>)>>,
        closed: Mutex<bool>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_read(&self, endpoint: Endpoint, data: &[u8]) {
            self.reads
                .lock()
                .unwrap()
                .entry(endpoint)
                .or_default()
                .push_back(data.to_vec());
        }

        pub fn queue_ack(&self) {
            self.queue_read(Endpoint::GenericIn, &[0x06]);
        }

        pub fn queue_nack(&self) {
            self.queue_read(Endpoint::GenericIn, &[0x15]);
        }

        pub fn pending_reads(&self, endpoint: Endpoint) -> usize {
            self.reads
                .lock()
                .unwrap()
                .get(&endpoint)
                .map_or(0, VecDeque::len)
        }

        pub fn writes(&self, endpoint: Endpoint) -> Vec<Vec<u8>> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|(ep, _)| *ep == endpoint)
                .map(|(_, data)| data.clone())
                .collect()
        }

        pub fn generic_writes(&self) -> Vec<Vec<u8>> {
            self.writes(Endpoint::GenericOut)
        }

        pub fn clear_writes(&self) {
            self.writes.lock().unwrap().clear();
        }

        pub fn is_closed(&self) -> bool {
            *self.closed.lock().unwrap()
        }
    }

    impl Transport for FakeTransport {
        fn write(&self, endpoint: Endpoint, data: &[u8], _timeout: Duration) -> Result<usize> {
            self.writes.lock().unwrap().push((endpoint, data.to_vec()));
            Ok(data.len())
        }

        fn read(&self, endpoint: Endpoint, timeout: Duration) -> Result<Vec<u8>> {
            self.reads
                .lock()
                .unwrap()
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
                .ok_or(Error::Timeout { endpoint, timeout })
        }

        fn close(&self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }
}
