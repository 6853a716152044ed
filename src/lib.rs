//! Driver for the Custom USB ballot paper handler: a thermal printer and a
//! contact image scanner sharing one paper path.
//!
//! The device exposes four bulk endpoints. Commands and scan data travel on
//! the generic pair, status requests on the real-time pair:
//!
//! ```text
//! 0x02  generic out     ESC/POS-style commands, raster data
//! 0x81  generic in      acknowledgements, capability, scan blocks
//! 0x04  real-time out   status / abort / reset requests
//! 0x83  real-time in    real-time responses
//! ```
//!
//! [`PaperHandlerDriver`] owns the transport and serializes each endpoint
//! pair through a FIFO lock. [`PaperHandlerStateMachine`] layers the paper
//! lifecycle over status polling.

pub mod bitmap;
pub mod bits;
pub mod capability;
pub mod codec;
pub mod commands;
pub mod driver;
pub mod error;
pub mod lock;
pub mod scan;
pub mod scanner_config;
pub mod state_machine;
pub mod status;
pub mod transport;

pub use driver::{DriverOptions, PaperHandlerDriver, PaperHandlerDriverInterface, PrintOptions};
pub use error::{Error, ProtocolError, Result};
pub use state_machine::{EjectTarget, PaperHandlerStateMachine, SimpleStatus};
pub use status::{Fault, PaperHandlerStatus};
pub use transport::{Endpoint, Transport, UsbTransport};
