//! Sensor and printer status bitmasks.
//!
//! Scanner complete status carries 4 optional bytes, printer status 6. Bits
//! are listed MSB-first below; `-` marks reserved bits, which are never
//! interpreted.
//!
//! ```text
//! scanner[0]: park  paper-out  post-CIS  pre-CIS  in-L-inner  in-R-inner  in-L-outer  in-R-outer
//! scanner[1]: -  head-in-position  scan-timeout  motor-move  scan-in-progress  jam-encoder  paper-jam  cover-open
//! scanner[2]: -  -  -  -  opto  ballot-box-door  ballot-box-attach  pre-head
//! scanner[3]: -  -  -  -  -  -  -  -
//!
//! printer[0]: fixed (0x10)
//! printer[1]: fixed (0x0f)
//! printer[2]: -  -  ticket-in-output  -  -  -  -  paper-not-present
//! printer[3]: -  -  -  -  drag-motor-on  spooling  cover-open  head-up-error
//! printer[4]: -  -  -  nack-error  voltage-error  head-not-connected  com-error  head-temp-error
//! printer[5]: diverter-error  head-locked  head-ready  eeprom-error  ram-error  -  -  -
//! ```

use std::fmt;

use crate::bits::u8_to_bits;
use crate::error::{ProtocolError, Result};

pub const SCANNER_STATUS_LEN: usize = 4;
pub const PRINTER_STATUS_LEN: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScannerStatus {
    pub park_sensor: bool,
    pub paper_out_sensor: bool,
    pub paper_post_cis_sensor: bool,
    pub paper_pre_cis_sensor: bool,
    pub paper_input_left_inner_sensor: bool,
    pub paper_input_right_inner_sensor: bool,
    pub paper_input_left_outer_sensor: bool,
    pub paper_input_right_outer_sensor: bool,

    pub print_head_in_position: bool,
    pub scan_timeout: bool,
    pub motor_move: bool,
    pub scan_in_progress: bool,
    pub jam_encoder: bool,
    pub paper_jam: bool,
    pub cover_open: bool,

    pub opto_sensor: bool,
    pub ballot_box_door_sensor: bool,
    pub ballot_box_attach_sensor: bool,
    pub pre_head_sensor: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrinterStatus {
    pub ticket_present_in_output: bool,
    pub paper_not_present: bool,

    pub drag_paper_motor_on: bool,
    pub spooling: bool,
    pub cover_open: bool,
    pub printing_head_up_error: bool,

    pub not_acknowledge_command_error: bool,
    pub power_supply_voltage_error: bool,
    pub head_not_connected: bool,
    pub com_error: bool,
    pub head_temperature_error: bool,

    pub diverter_error: bool,
    pub head_error_locked: bool,
    pub printing_head_ready_to_print: bool,
    pub eeprom_error: bool,
    pub ram_error: bool,
}

fn expect_len(layout: &'static str, data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(ProtocolError::Truncated {
            layout,
            needed: len,
            actual: data.len(),
        }
        .into());
    }
    Ok(())
}

impl ScannerStatus {
    pub fn parse(optional_data: &[u8]) -> Result<Self> {
        expect_len("scanner status", optional_data, SCANNER_STATUS_LEN)?;
        let b0 = u8_to_bits(optional_data[0]);
        let b1 = u8_to_bits(optional_data[1]);
        let b2 = u8_to_bits(optional_data[2]);
        Ok(Self {
            park_sensor: b0[0],
            paper_out_sensor: b0[1],
            paper_post_cis_sensor: b0[2],
            paper_pre_cis_sensor: b0[3],
            paper_input_left_inner_sensor: b0[4],
            paper_input_right_inner_sensor: b0[5],
            paper_input_left_outer_sensor: b0[6],
            paper_input_right_outer_sensor: b0[7],

            print_head_in_position: b1[1],
            scan_timeout: b1[2],
            motor_move: b1[3],
            scan_in_progress: b1[4],
            jam_encoder: b1[5],
            paper_jam: b1[6],
            cover_open: b1[7],

            opto_sensor: b2[4],
            ballot_box_door_sensor: b2[5],
            ballot_box_attach_sensor: b2[6],
            pre_head_sensor: b2[7],
        })
    }
}

impl PrinterStatus {
    pub fn parse(optional_data: &[u8]) -> Result<Self> {
        expect_len("printer status", optional_data, PRINTER_STATUS_LEN)?;
        let paper = u8_to_bits(optional_data[2]);
        let user = u8_to_bits(optional_data[3]);
        let recoverable = u8_to_bits(optional_data[4]);
        let unrecoverable = u8_to_bits(optional_data[5]);
        Ok(Self {
            ticket_present_in_output: paper[2],
            paper_not_present: paper[7],

            drag_paper_motor_on: user[4],
            spooling: user[5],
            cover_open: user[6],
            printing_head_up_error: user[7],

            not_acknowledge_command_error: recoverable[3],
            power_supply_voltage_error: recoverable[4],
            head_not_connected: recoverable[5],
            com_error: recoverable[6],
            head_temperature_error: recoverable[7],

            diverter_error: unrecoverable[0],
            head_error_locked: unrecoverable[1],
            printing_head_ready_to_print: unrecoverable[2],
            eeprom_error: unrecoverable[3],
            ram_error: unrecoverable[4],
        })
    }
}

/// Scanner and printer status fetched back to back. The two cover-open bits
/// are reported by different subsystems and kept apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaperHandlerStatus {
    pub park_sensor: bool,
    pub paper_out_sensor: bool,
    pub paper_post_cis_sensor: bool,
    pub paper_pre_cis_sensor: bool,
    pub paper_input_left_inner_sensor: bool,
    pub paper_input_right_inner_sensor: bool,
    pub paper_input_left_outer_sensor: bool,
    pub paper_input_right_outer_sensor: bool,
    pub print_head_in_position: bool,
    pub scan_timeout: bool,
    pub motor_move: bool,
    pub scan_in_progress: bool,
    pub jam_encoder: bool,
    pub paper_jam: bool,
    pub cover_open: bool,
    pub opto_sensor: bool,
    pub ballot_box_door_sensor: bool,
    pub ballot_box_attach_sensor: bool,
    pub pre_head_sensor: bool,

    pub ticket_present_in_output: bool,
    pub paper_not_present: bool,
    pub drag_paper_motor_on: bool,
    pub spooling: bool,
    pub printer_cover_open: bool,
    pub printing_head_up_error: bool,
    pub not_acknowledge_command_error: bool,
    pub power_supply_voltage_error: bool,
    pub head_not_connected: bool,
    pub com_error: bool,
    pub head_temperature_error: bool,
    pub diverter_error: bool,
    pub head_error_locked: bool,
    pub printing_head_ready_to_print: bool,
    pub eeprom_error: bool,
    pub ram_error: bool,
}

impl PaperHandlerStatus {
    pub fn merge(scanner: ScannerStatus, printer: PrinterStatus) -> Self {
        Self {
            park_sensor: scanner.park_sensor,
            paper_out_sensor: scanner.paper_out_sensor,
            paper_post_cis_sensor: scanner.paper_post_cis_sensor,
            paper_pre_cis_sensor: scanner.paper_pre_cis_sensor,
            paper_input_left_inner_sensor: scanner.paper_input_left_inner_sensor,
            paper_input_right_inner_sensor: scanner.paper_input_right_inner_sensor,
            paper_input_left_outer_sensor: scanner.paper_input_left_outer_sensor,
            paper_input_right_outer_sensor: scanner.paper_input_right_outer_sensor,
            print_head_in_position: scanner.print_head_in_position,
            scan_timeout: scanner.scan_timeout,
            motor_move: scanner.motor_move,
            scan_in_progress: scanner.scan_in_progress,
            jam_encoder: scanner.jam_encoder,
            paper_jam: scanner.paper_jam,
            cover_open: scanner.cover_open,
            opto_sensor: scanner.opto_sensor,
            ballot_box_door_sensor: scanner.ballot_box_door_sensor,
            ballot_box_attach_sensor: scanner.ballot_box_attach_sensor,
            pre_head_sensor: scanner.pre_head_sensor,

            ticket_present_in_output: printer.ticket_present_in_output,
            paper_not_present: printer.paper_not_present,
            drag_paper_motor_on: printer.drag_paper_motor_on,
            spooling: printer.spooling,
            printer_cover_open: printer.cover_open,
            printing_head_up_error: printer.printing_head_up_error,
            not_acknowledge_command_error: printer.not_acknowledge_command_error,
            power_supply_voltage_error: printer.power_supply_voltage_error,
            head_not_connected: printer.head_not_connected,
            com_error: printer.com_error,
            head_temperature_error: printer.head_temperature_error,
            diverter_error: printer.diverter_error,
            head_error_locked: printer.head_error_locked,
            printing_head_ready_to_print: printer.printing_head_ready_to_print,
            eeprom_error: printer.eeprom_error,
            ram_error: printer.ram_error,
        }
    }

    pub fn is_paper_in_input(&self) -> bool {
        self.paper_input_left_inner_sensor
            || self.paper_input_right_inner_sensor
            || self.paper_input_left_outer_sensor
            || self.paper_input_right_outer_sensor
    }

    /// All four input sensors covered: the sheet is fully inserted.
    pub fn is_paper_ready_to_load(&self) -> bool {
        self.paper_input_left_inner_sensor
            && self.paper_input_right_inner_sensor
            && self.paper_input_left_outer_sensor
            && self.paper_input_right_outer_sensor
    }

    pub fn is_paper_in_scan_path(&self) -> bool {
        self.paper_pre_cis_sensor
            || self.paper_post_cis_sensor
            || self.pre_head_sensor
            || self.paper_out_sensor
            || self.park_sensor
    }

    pub fn is_paper_in_output(&self) -> bool {
        self.ticket_present_in_output
    }

    pub fn is_paper_anywhere(&self) -> bool {
        self.is_paper_in_input() || self.is_paper_in_scan_path() || self.is_paper_in_output()
    }

    pub fn is_paper_jammed(&self) -> bool {
        self.paper_jam || self.jam_encoder
    }

    pub fn faults(&self) -> Vec<Fault> {
        [
            (self.paper_jam, Fault::PaperJam),
            (self.jam_encoder, Fault::JamEncoder),
            (self.cover_open, Fault::ScannerCoverOpen),
            (self.scan_timeout, Fault::ScanTimeout),
            (self.printer_cover_open, Fault::PrinterCoverOpen),
            (self.printing_head_up_error, Fault::PrintHeadUp),
            (self.not_acknowledge_command_error, Fault::CommandNotAcknowledged),
            (self.power_supply_voltage_error, Fault::PowerSupplyVoltage),
            (self.head_not_connected, Fault::HeadNotConnected),
            (self.com_error, Fault::Communication),
            (self.head_temperature_error, Fault::HeadTemperature),
            (self.diverter_error, Fault::Diverter),
            (self.head_error_locked, Fault::HeadLocked),
            (self.eeprom_error, Fault::Eeprom),
            (self.ram_error, Fault::Ram),
        ]
        .into_iter()
        .filter_map(|(set, fault)| set.then_some(fault))
        .collect()
    }

    pub fn has_fault(&self) -> bool {
        !self.faults().is_empty()
    }
}

/// Hardware conditions that need operator attention. None are cleared by the
/// driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    PaperJam,
    JamEncoder,
    ScannerCoverOpen,
    ScanTimeout,
    PrinterCoverOpen,
    PrintHeadUp,
    CommandNotAcknowledged,
    PowerSupplyVoltage,
    HeadNotConnected,
    Communication,
    HeadTemperature,
    Diverter,
    HeadLocked,
    Eeprom,
    Ram,
}

impl Fault {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::PaperJam => "paper-jam",
            Self::JamEncoder => "jam-encoder",
            Self::ScannerCoverOpen => "scanner-cover-open",
            Self::ScanTimeout => "scan-timeout",
            Self::PrinterCoverOpen => "printer-cover-open",
            Self::PrintHeadUp => "print-head-up",
            Self::CommandNotAcknowledged => "command-not-acknowledged",
            Self::PowerSupplyVoltage => "power-supply-voltage",
            Self::HeadNotConnected => "head-not-connected",
            Self::Communication => "com-error",
            Self::HeadTemperature => "head-temperature",
            Self::Diverter => "diverter",
            Self::HeadLocked => "head-locked",
            Self::Eeprom => "eeprom",
            Self::Ram => "ram",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type ScannerField = fn(&ScannerStatus) -> bool;
    type PrinterField = fn(&PrinterStatus) -> bool;

    fn scanner_bits() -> Vec<(usize, u8, ScannerField)> {
        let table: &[(usize, u8, ScannerField)] = &[
            (0, 0x80, |s| s.park_sensor),
            (0, 0x40, |s| s.paper_out_sensor),
            (0, 0x20, |s| s.paper_post_cis_sensor),
            (0, 0x10, |s| s.paper_pre_cis_sensor),
            (0, 0x08, |s| s.paper_input_left_inner_sensor),
            (0, 0x04, |s| s.paper_input_right_inner_sensor),
            (0, 0x02, |s| s.paper_input_left_outer_sensor),
            (0, 0x01, |s| s.paper_input_right_outer_sensor),
            (1, 0x40, |s| s.print_head_in_position),
            (1, 0x20, |s| s.scan_timeout),
            (1, 0x10, |s| s.motor_move),
            (1, 0x08, |s| s.scan_in_progress),
            (1, 0x04, |s| s.jam_encoder),
            (1, 0x02, |s| s.paper_jam),
            (1, 0x01, |s| s.cover_open),
            (2, 0x08, |s| s.opto_sensor),
            (2, 0x04, |s| s.ballot_box_door_sensor),
            (2, 0x02, |s| s.ballot_box_attach_sensor),
            (2, 0x01, |s| s.pre_head_sensor),
        ];
        table.to_vec()
    }

    fn printer_bits() -> Vec<(usize, u8, PrinterField)> {
        let table: &[(usize, u8, PrinterField)] = &[
            (2, 0x20, |s| s.ticket_present_in_output),
            (2, 0x01, |s| s.paper_not_present),
            (3, 0x08, |s| s.drag_paper_motor_on),
            (3, 0x04, |s| s.spooling),
            (3, 0x02, |s| s.cover_open),
            (3, 0x01, |s| s.printing_head_up_error),
            (4, 0x10, |s| s.not_acknowledge_command_error),
            (4, 0x08, |s| s.power_supply_voltage_error),
            (4, 0x04, |s| s.head_not_connected),
            (4, 0x02, |s| s.com_error),
            (4, 0x01, |s| s.head_temperature_error),
            (5, 0x80, |s| s.diverter_error),
            (5, 0x40, |s| s.head_error_locked),
            (5, 0x20, |s| s.printing_head_ready_to_print),
            (5, 0x10, |s| s.eeprom_error),
            (5, 0x08, |s| s.ram_error),
        ];
        table.to_vec()
    }

    #[test]
    fn scanner_bit_table_is_exhaustive_per_byte() {
        for position in 0..SCANNER_STATUS_LEN {
            for value in 0..=255u8 {
                let mut data = [0u8; SCANNER_STATUS_LEN];
                data[position] = value;
                let status = ScannerStatus::parse(&data).unwrap();
                for &(byte, mask, field) in &scanner_bits() {
                    let expected = byte == position && value & mask != 0;
                    assert_eq!(field(&status), expected, "byte {position} value {value:#04x}");
                }
            }
        }
    }

    #[test]
    fn printer_bit_table_is_exhaustive_per_byte() {
        for position in 0..PRINTER_STATUS_LEN {
            for value in 0..=255u8 {
                let mut data = [0u8; PRINTER_STATUS_LEN];
                data[position] = value;
                let status = PrinterStatus::parse(&data).unwrap();
                for &(byte, mask, field) in &printer_bits() {
                    let expected = byte == position && value & mask != 0;
                    assert_eq!(field(&status), expected, "byte {position} value {value:#04x}");
                }
            }
        }
    }

    #[test]
    fn reserved_bits_are_ignored() {
        let status = ScannerStatus::parse(&[0x00, 0x80, 0xf0, 0xff]).unwrap();
        assert_eq!(status, ScannerStatus::default());
        let status = PrinterStatus::parse(&[0xff, 0xff, 0xde, 0xf0, 0xe0, 0x07]).unwrap();
        assert_eq!(status, PrinterStatus::default());
    }

    #[test]
    fn parse_scanner_sample() {
        let status = ScannerStatus::parse(&[0x8f, 0x4f, 0x08, 0x00]).unwrap();
        assert!(status.park_sensor);
        assert!(!status.paper_out_sensor);
        assert!(status.paper_input_right_outer_sensor);
        assert!(status.print_head_in_position);
        assert!(!status.scan_timeout);
        assert!(status.cover_open);
        assert!(status.opto_sensor);
        assert!(!status.pre_head_sensor);
    }

    #[test]
    fn parse_printer_sample() {
        let status = PrinterStatus::parse(&[0x10, 0x0f, 0x20, 0x0c, 0x02, 0x80]).unwrap();
        assert!(status.ticket_present_in_output);
        assert!(!status.paper_not_present);
        assert!(status.drag_paper_motor_on);
        assert!(status.spooling);
        assert!(!status.cover_open);
        assert!(status.com_error);
        assert!(status.diverter_error);
        assert!(!status.ram_error);
    }

    #[test]
    fn parse_too_short() {
        assert!(ScannerStatus::parse(&[0; 3]).is_err());
        assert!(PrinterStatus::parse(&[0; 5]).is_err());
    }

    #[test]
    fn merged_status_predicates() {
        let scanner = ScannerStatus::parse(&[0x0f, 0x00, 0x00, 0x00]).unwrap();
        let printer = PrinterStatus::parse(&[0x10, 0x0f, 0x00, 0x02, 0x00, 0x00]).unwrap();
        let status = PaperHandlerStatus::merge(scanner, printer);
        assert!(status.is_paper_ready_to_load());
        assert!(status.is_paper_in_input());
        assert!(!status.is_paper_in_scan_path());
        assert!(status.is_paper_anywhere());
        assert!(!status.cover_open);
        assert!(status.printer_cover_open);
        assert_eq!(status.faults(), vec![Fault::PrinterCoverOpen]);

        let partly = PaperHandlerStatus {
            paper_input_left_inner_sensor: true,
            ..Default::default()
        };
        assert!(partly.is_paper_in_input());
        assert!(!partly.is_paper_ready_to_load());
        assert!(!PaperHandlerStatus::default().is_paper_anywhere());
        assert!(!PaperHandlerStatus::default().has_fault());
    }

    #[test]
    fn jam_faults() {
        let status = PaperHandlerStatus {
            paper_jam: true,
            jam_encoder: true,
            ..Default::default()
        };
        assert!(status.is_paper_jammed());
        assert_eq!(status.faults(), vec![Fault::PaperJam, Fault::JamEncoder]);
        assert_eq!(Fault::PaperJam.to_string(), "paper-jam");
    }
}
