use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;

use paper_handler::bitmap::{ConversionOptions, GrayscaleAlgorithm, DEFAULT_WHITE_THRESHOLD};
use paper_handler::commands::{PrintingDensity, PrintingSpeed};
use paper_handler::driver::{DriverOptions, BMD_150_MAX_PRINT_WIDTH, BMD_155_MAX_PRINT_WIDTH};
use paper_handler::state_machine::DEFAULT_PARK_TIMEOUT;
use paper_handler::transport::{PID, VID};
use paper_handler::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    vendor_id: u64,
    product_id: u64,
    max_print_width_dots: u64,
    transfer_timeout_ms: u64,
    poll_interval_ms: u64,
    reconnect_interval_ms: u64,
    park_timeout_ms: u64,
    white_threshold: u64,
    grayscale: GrayscaleAlgorithm,
    printing_speed: PrintingSpeed,
    printing_density: PrintingDensity,
    auto_load: bool,
    log_level: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            vendor_id: u64::from(VID),
            product_id: u64::from(PID),
            max_print_width_dots: u64::from(BMD_150_MAX_PRINT_WIDTH),
            transfer_timeout_ms: 10_000,
            poll_interval_ms: 200,
            reconnect_interval_ms: 2_000,
            park_timeout_ms: DEFAULT_PARK_TIMEOUT.as_millis() as u64,
            white_threshold: u64::from(DEFAULT_WHITE_THRESHOLD),
            grayscale: GrayscaleAlgorithm::default(),
            printing_speed: PrintingSpeed::default(),
            printing_density: PrintingDensity::default(),
            auto_load: false,
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub vendor_id: u16,
    pub product_id: u16,
    pub driver: DriverOptions,
    pub poll_interval: Duration,
    pub reconnect_interval: Duration,
    pub park_timeout: Duration,
    pub conversion: ConversionOptions,
    pub printing_speed: PrintingSpeed,
    pub printing_density: PrintingDensity,
    pub auto_load: bool,
    pub log_level: LevelFilter,
}

fn bad(key: &str, msg: impl std::fmt::Display) -> Error {
    Error::Config(format!("{key}: {msg}"))
}

fn in_range(key: &str, value: u64, min: u64, max: u64) -> Result<u64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(bad(key, format!("{value} is outside {min}..={max}")))
    }
}

fn validate(raw: RawConfig) -> Result<Config> {
    let id_max = u64::from(u16::MAX);
    let width_max = u64::from(BMD_155_MAX_PRINT_WIDTH);
    let ms = Duration::from_millis;

    let log_level = raw
        .log_level
        .parse::<LevelFilter>()
        .map_err(|_| bad("log_level", format!("unknown level {:?}", raw.log_level)))?;

    Ok(Config {
        vendor_id: in_range("vendor_id", raw.vendor_id, 0, id_max)? as u16,
        product_id: in_range("product_id", raw.product_id, 0, id_max)? as u16,
        driver: DriverOptions {
            max_print_width: in_range(
                "max_print_width_dots",
                raw.max_print_width_dots,
                1,
                width_max,
            )? as u16,
            transfer_timeout: ms(raw.transfer_timeout_ms),
            ..DriverOptions::default()
        },
        poll_interval: ms(in_range("poll_interval_ms", raw.poll_interval_ms, 1, u64::MAX)?),
        reconnect_interval: ms(in_range(
            "reconnect_interval_ms",
            raw.reconnect_interval_ms,
            1,
            u64::MAX,
        )?),
        park_timeout: ms(in_range("park_timeout_ms", raw.park_timeout_ms, 1, u64::MAX)?),
        conversion: ConversionOptions {
            algorithm: raw.grayscale,
            white_threshold: in_range("white_threshold", raw.white_threshold, 0, 255)? as u8,
        },
        printing_speed: raw.printing_speed,
        printing_density: raw.printing_density,
        auto_load: raw.auto_load,
        log_level,
    })
}

fn parse_config(text: &str) -> Result<Config> {
    let raw: RawConfig =
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
    validate(raw)
}

/// Settings used when no config file is given.
pub fn default_config() -> Result<Config> {
    validate(RawConfig::default())
}

pub fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}
