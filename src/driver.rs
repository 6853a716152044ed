//! Command dispatcher: every operation the paper handler supports.
//!
//! Each endpoint pair has its own [`EndpointLock`]; an exchange holds the lock
//! from the request write until its response has been read, so generic and
//! real-time traffic can overlap but never interleave with themselves.
//! Nothing is retried here.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use image::RgbaImage;
use log::{debug, info, warn};

use crate::bitmap::{
    chunk_binary_bitmap, image_to_binary_bitmap, ConversionOptions, PaperHandlerBitmap,
    BYTES_PER_COLUMN, CHUNK_HEIGHT,
};
use crate::capability::ScannerCapability;
use crate::codec::{Layout, RealTimeRequest, RealTimeResponse, Value, ACKNOWLEDGEMENT};
use crate::commands::{self, PrintingDensity, PrintingSpeed};
use crate::error::{Error, ProtocolError, Result};
use crate::lock::EndpointLock;
use crate::scan::{read_scan_stream, ScannedImage};
use crate::scanner_config::{
    PaperMovementAfterScan, Resolution, ScanDataFormat, ScanDirection, ScanLight, ScannerConfig,
};
use crate::status::{PaperHandlerStatus, PrinterStatus, ScannerStatus};
use crate::transport::{Endpoint, Transport};

pub const POSITIVE_ACKNOWLEDGEMENT: u8 = 0x06;
pub const NEGATIVE_ACKNOWLEDGEMENT: u8 = 0x15;

/// Sent unprompted on the generic endpoint; never a reply to our command.
const INVALID_ARGUMENT: u8 = 0x12;
const AUTOMATIC_STATUS_PREFIX: [u8; 2] = [0x10, 0x0f];
const AUTOMATIC_STATUS_LEN: usize = 6;

pub const SCANNER_COMPLETE_STATUS_REQUEST_ID: u8 = 0x73;
pub const PRINTER_STATUS_REQUEST_ID: u8 = 0x64;
pub const SCAN_ABORT_REQUEST_ID: u8 = 0x43;
pub const SCAN_RESET_REQUEST_ID: u8 = 0x52;

pub const BMD_150_MAX_PRINT_WIDTH: u16 = 1600;
pub const BMD_155_MAX_PRINT_WIDTH: u16 = 1700;

/// Widest strip one `BUFFER_IMAGE` can carry is one dot less than this.
pub const BUFFER_WIDTH_LIMIT: usize = 1024;
const LEFT_BUFFER_WIDTH: usize = 800;

pub const VERTICAL_MOTION_UNITS_PER_DOT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Head width of the device variant, in dots.
    pub max_print_width: u16,
    /// Applied to every transfer. Zero waits forever.
    pub transfer_timeout: Duration,
    /// Read timeout that marks the generic inbound buffer as empty.
    pub flush_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_print_width: BMD_150_MAX_PRINT_WIDTH,
            transfer_timeout: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrintOptions {
    pub conversion: ConversionOptions,
    /// Sent before the first chunk when set.
    pub left_margin: Option<u16>,
}

/// Relative vertical moves that together skip `dots` rows.
pub fn vertical_skip_steps(dots: u32) -> Vec<i32> {
    let mut remaining = dots.saturating_mul(VERTICAL_MOTION_UNITS_PER_DOT);
    let max = i16::MAX as u32;
    let mut steps = Vec::new();
    while remaining > 0 {
        let step = remaining.min(max);
        steps.push(step as i32);
        remaining -= step;
    }
    steps
}

/// The full operation surface. In-memory substitutes implement the same
/// trait, and inherit the scanner-config setters and print orchestration.
pub trait PaperHandlerDriverInterface: Send + Sync {
    fn max_print_width(&self) -> u16;

    // ── Status ───────────────────────────────────────────────────────

    fn get_scanner_status(&self) -> Result<ScannerStatus>;
    fn get_printer_status(&self) -> Result<PrinterStatus>;

    fn get_paper_handler_status(&self) -> Result<PaperHandlerStatus> {
        let printer = self.get_printer_status()?;
        let scanner = self.get_scanner_status()?;
        Ok(PaperHandlerStatus::merge(scanner, printer))
    }

    fn abort_scan(&self) -> Result<()>;

    /// Power-cycles the scan subsystem. The device re-enumerates, so the
    /// connection is unusable afterwards.
    fn reset_scan(&self) -> Result<()>;

    /// Discard stale inbound generic data. Returns the number of transfers
    /// dropped.
    fn clear_generic_in_buffer(&self) -> Result<usize>;

    // ── Paper movement ───────────────────────────────────────────────

    fn load_paper(&self) -> Result<bool>;
    fn park_paper(&self) -> Result<bool>;
    fn eject_paper_to_front(&self) -> Result<bool>;
    fn eject_ballot_to_ballot_box(&self) -> Result<bool>;
    fn present_paper(&self) -> Result<bool>;
    fn calibrate(&self) -> Result<bool>;

    // ── Scanner ──────────────────────────────────────────────────────

    fn get_scanner_capability(&self) -> Result<ScannerCapability>;

    /// Last configuration the device acknowledged.
    fn scanner_config(&self) -> ScannerConfig;

    /// Derive a new config from the stored one and send it whole. The
    /// stored config only changes on a positive acknowledgement, and it stays
    /// locked until then so concurrent updates apply one after the other.
    fn update_scanner_config(
        &self,
        update: &dyn Fn(ScannerConfig) -> ScannerConfig,
    ) -> Result<bool>;

    /// Send `config` whole, replacing the stored one on acknowledgement.
    fn apply_scanner_config(&self, config: ScannerConfig) -> Result<bool> {
        self.update_scanner_config(&move |_| config)
    }

    fn set_scan_light(&self, light: ScanLight) -> Result<bool> {
        self.update_scanner_config(&|c| c.with_scan_light(light))
    }

    fn set_scan_data_format(&self, format: ScanDataFormat) -> Result<bool> {
        self.update_scanner_config(&|c| c.with_scan_data_format(format))
    }

    fn set_scan_resolution(&self, horizontal: Resolution, vertical: Resolution) -> Result<bool> {
        self.update_scanner_config(&|c| c.with_resolution(horizontal, vertical))
    }

    fn set_paper_movement_after_scan(&self, movement: PaperMovementAfterScan) -> Result<bool> {
        self.update_scanner_config(&|c| c.with_paper_movement_after_scan(movement))
    }

    fn set_scan_direction(&self, direction: ScanDirection) -> Result<bool> {
        self.update_scanner_config(&|c| c.with_scan_direction(direction))
    }

    fn scan(&self) -> Result<ScannedImage>;

    // ── Printer ──────────────────────────────────────────────────────

    fn initialize_printer(&self) -> Result<()>;
    fn enable_print(&self) -> Result<bool>;
    fn disable_print(&self) -> Result<bool>;

    fn set_motion_units(&self, x: u8, y: u8) -> Result<()>;
    fn set_left_margin(&self, motion_units: u16) -> Result<()>;
    /// Zero selects the maximum width.
    fn set_printing_area_width(&self, motion_units: u16) -> Result<()>;
    fn set_line_spacing(&self, motion_units: u8) -> Result<()>;
    fn set_printing_speed(&self, speed: PrintingSpeed) -> Result<()>;
    fn set_printing_density(&self, density: PrintingDensity) -> Result<()>;
    fn set_absolute_print_position(&self, motion_units: u16) -> Result<()>;
    fn set_relative_print_position(&self, motion_units: i32) -> Result<()>;
    fn set_relative_vertical_print_position(&self, motion_units: i32) -> Result<()>;

    /// Buffer one strip narrower than [`BUFFER_WIDTH_LIMIT`].
    fn buffer_chunk(&self, chunk: &PaperHandlerBitmap) -> Result<()>;

    /// Print the buffer and feed `motion_units`.
    fn print(&self, motion_units: u8) -> Result<()>;

    /// Buffer and print one strip, splitting it when it is too wide for a
    /// single buffer. A full-width strip prints itself once buffered.
    fn print_chunk(&self, chunk: &PaperHandlerBitmap) -> Result<()> {
        let max = usize::from(self.max_print_width());
        if chunk.width == 0 || chunk.width * BYTES_PER_COLUMN != chunk.data.len() {
            return Err(Error::InvalidParam(format!(
                "chunk of width {} carries {} bytes",
                chunk.width,
                chunk.data.len()
            )));
        }
        if chunk.width > max {
            return Err(Error::InvalidParam(format!(
                "chunk width {} exceeds max print width {max}",
                chunk.width
            )));
        }

        if chunk.width < BUFFER_WIDTH_LIMIT {
            self.buffer_chunk(chunk)?;
            return self.print(0);
        }

        let split = LEFT_BUFFER_WIDTH * BYTES_PER_COLUMN;
        self.buffer_chunk(&PaperHandlerBitmap {
            width: LEFT_BUFFER_WIDTH,
            data: chunk.data[..split].to_vec(),
            empty: false,
        })?;
        self.buffer_chunk(&PaperHandlerBitmap {
            width: chunk.width - LEFT_BUFFER_WIDTH,
            data: chunk.data[split..].to_vec(),
            empty: false,
        })?;
        if chunk.width < max {
            self.print(0)?;
        }
        Ok(())
    }

    /// Rasterize `image` and print it top to bottom. Runs of blank strips
    /// become paper feed instead of raster data.
    fn print_image(&self, image: &RgbaImage, options: &PrintOptions) -> Result<()> {
        let max = u32::from(self.max_print_width());
        if image.width() > max {
            return Err(Error::InvalidParam(format!(
                "image width {} exceeds max print width {max}",
                image.width()
            )));
        }
        if let Some(margin) = options.left_margin {
            self.set_left_margin(margin)?;
        }

        let bitmap = image_to_binary_bitmap(image, &options.conversion);
        let chunks = chunk_binary_bitmap(&bitmap);
        let mut skip_dots = 0u32;
        let mut printed = 0usize;
        for chunk in &chunks {
            if chunk.empty {
                skip_dots += CHUNK_HEIGHT as u32;
                continue;
            }
            for step in vertical_skip_steps(skip_dots) {
                self.set_relative_vertical_print_position(step)?;
            }
            skip_dots = 0;
            self.print_chunk(chunk)?;
            printed += 1;
        }
        info!(
            "print: {}x{} page, {printed} of {} chunks printed",
            image.width(),
            image.height(),
            chunks.len()
        );
        Ok(())
    }

    /// Wait for in-flight exchanges, then release the device.
    fn disconnect(&self) -> Result<()>;
}

pub struct PaperHandlerDriver<T: Transport> {
    transport: T,
    options: DriverOptions,
    generic: EndpointLock,
    real_time: EndpointLock,
    scanner_config: Mutex<ScannerConfig>,
}

impl<T: Transport> PaperHandlerDriver<T> {
    pub fn new(transport: T, options: DriverOptions) -> Self {
        Self {
            transport,
            options,
            generic: EndpointLock::new("generic"),
            real_time: EndpointLock::new("real-time"),
            scanner_config: Mutex::new(ScannerConfig::default()),
        }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn write(&self, endpoint: Endpoint, data: &[u8]) -> Result<()> {
        let n = self
            .transport
            .write(endpoint, data, self.options.transfer_timeout)?;
        if n != data.len() {
            warn!("{endpoint}: short write, {n} of {} bytes", data.len());
        }
        Ok(())
    }

    /// Next inbound generic transfer, skipping packets the device sends on
    /// its own. Caller must hold the generic lock.
    fn read_generic(&self) -> Result<Vec<u8>> {
        loop {
            let data = self
                .transport
                .read(Endpoint::GenericIn, self.options.transfer_timeout)?;
            match data.as_slice() {
                [INVALID_ARGUMENT] => warn!("generic-in: skipping stray invalid-argument byte"),
                [a, b, ..]
                    if data.len() == AUTOMATIC_STATUS_LEN && [*a, *b] == AUTOMATIC_STATUS_PREFIX =>
                {
                    warn!("generic-in: skipping automatic status transmission")
                }
                _ => return Ok(data),
            }
        }
    }

    fn send_generic(&self, data: &[u8]) -> Result<()> {
        let _guard = self.generic.acquire();
        self.write(Endpoint::GenericOut, data)
    }

    /// Write a command and read its one-byte acknowledgement.
    fn command_with_ack(&self, name: &str, data: &[u8]) -> Result<bool> {
        let response = {
            let _guard = self.generic.acquire();
            self.write(Endpoint::GenericOut, data)?;
            self.read_generic()?
        };
        if response.is_empty() {
            return Err(ProtocolError::EmptyResponse(Endpoint::GenericIn).into());
        }
        match ACKNOWLEDGEMENT.decode(&response)?.as_slice() {
            [Value::Byte(POSITIVE_ACKNOWLEDGEMENT)] => {
                debug!("{name}: positive acknowledgement");
                Ok(true)
            }
            [Value::Byte(NEGATIVE_ACKNOWLEDGEMENT)] => {
                warn!("{name}: negative acknowledgement");
                Ok(false)
            }
            [Value::Byte(code)] => Err(ProtocolError::UnknownAcknowledgement(*code).into()),
            other => Err(ProtocolError::FieldCount {
                layout: ACKNOWLEDGEMENT.name,
                expected: 1,
                actual: other.len(),
            }
            .into()),
        }
    }

    fn fixed_command_with_ack(&self, layout: &Layout) -> Result<bool> {
        self.command_with_ack(layout.name, &commands::encode(layout, &[])?)
    }

    fn real_time_exchange(&self, request_id: u8) -> Result<RealTimeResponse> {
        let request = RealTimeRequest { request_id }.encode()?;
        let raw = {
            let _guard = self.real_time.acquire();
            self.write(Endpoint::RealTimeOut, &request)?;
            self.transport
                .read(Endpoint::RealTimeIn, self.options.transfer_timeout)?
        };
        if raw.is_empty() {
            return Err(ProtocolError::EmptyResponse(Endpoint::RealTimeIn).into());
        }
        let response = RealTimeResponse::decode(&raw)?;
        if response.request_id != request_id {
            return Err(ProtocolError::RequestIdMismatch {
                expected: request_id,
                actual: response.request_id,
            }
            .into());
        }
        if response.return_code != POSITIVE_ACKNOWLEDGEMENT {
            return Err(ProtocolError::ReturnCode {
                request_id,
                code: response.return_code,
            }
            .into());
        }
        Ok(response)
    }

    fn check_width(&self, name: &str, motion_units: u16) -> Result<()> {
        crate::bits::check_range(
            name,
            u32::from(motion_units),
            0,
            u32::from(self.options.max_print_width),
        )
    }
}

impl<T: Transport> PaperHandlerDriverInterface for PaperHandlerDriver<T> {
    fn max_print_width(&self) -> u16 {
        self.options.max_print_width
    }

    fn get_scanner_status(&self) -> Result<ScannerStatus> {
        let response = self.real_time_exchange(SCANNER_COMPLETE_STATUS_REQUEST_ID)?;
        ScannerStatus::parse(&response.optional_data)
    }

    fn get_printer_status(&self) -> Result<PrinterStatus> {
        let response = self.real_time_exchange(PRINTER_STATUS_REQUEST_ID)?;
        PrinterStatus::parse(&response.optional_data)
    }

    fn abort_scan(&self) -> Result<()> {
        self.real_time_exchange(SCAN_ABORT_REQUEST_ID)?;
        info!("scan: abort requested");
        Ok(())
    }

    fn reset_scan(&self) -> Result<()> {
        self.real_time_exchange(SCAN_RESET_REQUEST_ID)?;
        info!("scan: reset requested, device will re-enumerate");
        Ok(())
    }

    fn clear_generic_in_buffer(&self) -> Result<usize> {
        let _guard = self.generic.acquire();
        let mut cleared = 0;
        loop {
            match self
                .transport
                .read(Endpoint::GenericIn, self.options.flush_timeout)
            {
                Ok(_) => cleared += 1,
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e),
            }
        }
        debug!("generic-in: {cleared} packets cleared");
        Ok(cleared)
    }

    fn load_paper(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::LOAD_PAPER)
    }

    fn park_paper(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::PARK_PAPER)
    }

    fn eject_paper_to_front(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::EJECT_PAPER_TO_FRONT)
    }

    fn eject_ballot_to_ballot_box(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::EJECT_PAPER_TO_BALLOT_BOX)
    }

    fn present_paper(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::PRESENT_PAPER_AND_HOLD)
    }

    fn calibrate(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::SCANNER_CALIBRATION)
    }

    fn get_scanner_capability(&self) -> Result<ScannerCapability> {
        let raw = {
            let _guard = self.generic.acquire();
            self.write(
                Endpoint::GenericOut,
                &commands::encode(&commands::GET_SCANNER_CAPABILITY, &[])?,
            )?;
            self.read_generic()?
        };
        ScannerCapability::parse(&raw)
    }

    fn scanner_config(&self) -> ScannerConfig {
        *self
            .scanner_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn update_scanner_config(
        &self,
        update: &dyn Fn(ScannerConfig) -> ScannerConfig,
    ) -> Result<bool> {
        // Config first, then the generic lock.
        let mut stored = self
            .scanner_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = update(*stored);
        let accepted = self.command_with_ack(commands::SET_SCANNER_CONFIG.name, &config.encode()?)?;
        if accepted {
            *stored = config;
            debug!("scanner config applied: {config:?}");
        } else {
            warn!("scanner config rejected, keeping previous");
        }
        Ok(accepted)
    }

    fn scan(&self) -> Result<ScannedImage> {
        let _guard = self.generic.acquire();
        self.write(
            Endpoint::GenericOut,
            &commands::encode(&commands::SCAN, &[])?,
        )?;
        info!("scan: started");
        read_scan_stream(|| {
            self.transport
                .read(Endpoint::GenericIn, self.options.transfer_timeout)
        })
    }

    fn initialize_printer(&self) -> Result<()> {
        self.send_generic(&commands::encode(&commands::INITIALIZE, &[])?)
    }

    fn enable_print(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::ENABLE_PRINT)
    }

    fn disable_print(&self) -> Result<bool> {
        self.fixed_command_with_ack(&commands::DISABLE_PRINT)
    }

    fn set_motion_units(&self, x: u8, y: u8) -> Result<()> {
        self.send_generic(&commands::encode_motion_units(x, y)?)
    }

    fn set_left_margin(&self, motion_units: u16) -> Result<()> {
        self.check_width("left margin", motion_units)?;
        self.send_generic(&commands::encode_motion(
            &commands::SET_LEFT_MARGIN,
            motion_units,
        )?)
    }

    fn set_printing_area_width(&self, motion_units: u16) -> Result<()> {
        self.check_width("printing area width", motion_units)?;
        self.send_generic(&commands::encode_motion(
            &commands::SET_PRINTING_AREA_WIDTH,
            motion_units,
        )?)
    }

    fn set_line_spacing(&self, motion_units: u8) -> Result<()> {
        self.send_generic(&commands::encode(
            &commands::SET_LINE_SPACING,
            &[motion_units],
        )?)
    }

    fn set_printing_speed(&self, speed: PrintingSpeed) -> Result<()> {
        self.send_generic(&commands::encode(
            &commands::SET_PRINTING_SPEED,
            &[speed.code()],
        )?)
    }

    fn set_printing_density(&self, density: PrintingDensity) -> Result<()> {
        self.send_generic(&commands::encode(
            &commands::SET_PRINTING_DENSITY,
            &[density.code()],
        )?)
    }

    fn set_absolute_print_position(&self, motion_units: u16) -> Result<()> {
        self.send_generic(&commands::encode_motion(
            &commands::SET_ABSOLUTE_PRINT_POSITION,
            motion_units,
        )?)
    }

    fn set_relative_print_position(&self, motion_units: i32) -> Result<()> {
        self.send_generic(&commands::encode_relative_motion(
            &commands::SET_RELATIVE_PRINT_POSITION,
            motion_units,
        )?)
    }

    fn set_relative_vertical_print_position(&self, motion_units: i32) -> Result<()> {
        self.send_generic(&commands::encode_relative_motion(
            &commands::SET_RELATIVE_VERTICAL_PRINT_POSITION,
            motion_units,
        )?)
    }

    fn buffer_chunk(&self, chunk: &PaperHandlerBitmap) -> Result<()> {
        if chunk.width >= BUFFER_WIDTH_LIMIT {
            return Err(Error::InvalidParam(format!(
                "cannot buffer a chunk {} dots wide, limit is {}",
                chunk.width,
                BUFFER_WIDTH_LIMIT - 1
            )));
        }
        // Checked above, so the width fits in u16.
        let width = chunk.width as u16;
        self.send_generic(&commands::encode_buffer_image(width, &chunk.data)?)
    }

    fn print(&self, motion_units: u8) -> Result<()> {
        self.send_generic(&commands::encode(
            &commands::PRINT_AND_FEED,
            &[motion_units],
        )?)
    }

    fn disconnect(&self) -> Result<()> {
        self.generic.drain();
        self.real_time.drain();
        self.transport.close()?;
        info!("usb: disconnected");
        Ok(())
    }
}
