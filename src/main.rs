//! paper-handlerd: monitoring daemon for the Custom USB ballot paper handler.
//!
//! Waits for the device, reconnecting whenever it disappears, and polls the
//! paper lifecycle at a fixed interval. Every lifecycle transition and every
//! change in the set of hardware faults is logged.
//!
//! # Usage
//!
//! ```sh
//! # Monitor with built-in defaults:
//! paper-handlerd
//!
//! # Monitor with settings from a file:
//! paper-handlerd -c /etc/paper-handlerd/config.toml
//!
//! # One status snapshot plus scanner capability, then exit:
//! paper-handlerd --status
//! ```

mod config;

use std::thread;

use log::{debug, error, info, warn};

use paper_handler::state_machine::SystemClock;
use paper_handler::{
    Error, Fault, PaperHandlerDriver, PaperHandlerDriverInterface, PaperHandlerStateMachine,
    SimpleStatus, UsbTransport,
};

use crate::config::{default_config, load_config, Config};

type Driver = PaperHandlerDriver<UsbTransport>;
type Machine = PaperHandlerStateMachine<Driver>;

/// Events the daemon reports besides lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    DeviceArrived,
    DeviceLeft,
    FaultRaised(Fault),
    FaultCleared(Fault),
}

impl Event {
    const fn tag(self) -> &'static str {
        match self {
            Self::DeviceArrived => "device-arrived",
            Self::DeviceLeft => "device-left",
            Self::FaultRaised(_) => "fault-raised",
            Self::FaultCleared(_) => "fault-cleared",
        }
    }

    fn log(self) {
        match self {
            Self::FaultRaised(fault) => warn!("{}: {fault}", self.tag()),
            Self::FaultCleared(fault) => info!("{}: {fault}", self.tag()),
            _ => info!("{}", self.tag()),
        }
    }
}

/// Compare two fault sets and yield the changes between them.
fn fault_transitions<'a>(
    prev: &'a [Fault],
    curr: &'a [Fault],
) -> impl Iterator<Item = Event> + 'a {
    let raised = curr
        .iter()
        .filter(|f| !prev.contains(f))
        .map(|&f| Event::FaultRaised(f));
    let cleared = prev
        .iter()
        .filter(|f| !curr.contains(f))
        .map(|&f| Event::FaultCleared(f));
    raised.chain(cleared)
}

// ── USB communication ────────────────────────────────────────────────

fn open_driver(config: &Config) -> paper_handler::Result<Driver> {
    let transport = UsbTransport::open(config.vendor_id, config.product_id)?;
    Ok(PaperHandlerDriver::new(transport, config.driver))
}

/// Bring a freshly opened printer into the configured print setup.
fn prepare(driver: &Driver, config: &Config) -> paper_handler::Result<()> {
    driver.initialize_printer()?;
    driver.set_printing_speed(config.printing_speed)?;
    driver.set_printing_density(config.printing_density)?;
    Ok(())
}

fn try_connect(config: &Config) -> Option<Machine> {
    let driver = match open_driver(config) {
        Ok(d) => d,
        Err(Error::NotFound { .. }) => return None,
        Err(e) => {
            debug!("usb: open failed: {e}");
            return None;
        }
    };
    if let Err(e) = prepare(&driver, config) {
        warn!("usb: printer setup failed: {e}");
        let _ = driver.disconnect();
        return None;
    }
    Some(PaperHandlerStateMachine::with_clock(
        driver,
        SystemClock,
        config.park_timeout,
    ))
}

// ── Main loop ────────────────────────────────────────────────────────

fn print_usage() {
    eprintln!(
        "paper-handlerd: monitor for the Custom USB ballot paper handler\n\
         \n\
         Usage:\n\
         \x20 paper-handlerd                  Monitor with default settings\n\
         \x20 paper-handlerd -c CONFIG.toml   Monitor with settings from CONFIG.toml\n\
         \x20 paper-handlerd --status         Print one status snapshot and exit\n\
         \x20 paper-handlerd --help           Show this message\n\
         \n\
         Logged events:\n\
         \x20 device-arrived   Paper handler appeared on USB\n\
         \x20 device-left      Paper handler removed or unreachable\n\
         \x20 state: A -> B    Paper lifecycle transition\n\
         \x20 fault-raised     Hardware fault reported (jam, cover open, ...)\n\
         \x20 fault-cleared    Hardware fault no longer reported\n\
         \n\
         Set RUST_LOG=debug for USB traffic dumps."
    );
}

/// Poll until the device stops answering.
fn monitor(machine: &mut Machine, config: &Config) {
    let mut faults: Vec<Fault> = Vec::new();
    let mut initial = true;

    loop {
        let state = match machine.status() {
            Ok(s) => s,
            Err(e) if e.is_timeout() => {
                warn!("poll: {e}");
                thread::sleep(config.poll_interval);
                continue;
            }
            Err(e) => {
                debug!("poll failed ({e}), assuming device left");
                return;
            }
        };
        if initial {
            info!("initial: {state}");
            initial = false;
        }

        let current = machine
            .last_status()
            .map(|s| s.faults())
            .unwrap_or_default();
        for ev in fault_transitions(&faults, &current) {
            ev.log();
        }
        faults = current;

        if config.auto_load && state == SimpleStatus::PaperReadyToLoad && faults.is_empty() {
            match machine.load_and_park() {
                Ok(true) => info!("auto-load: parking paper"),
                Ok(false) => warn!("auto-load: load refused by device"),
                Err(e) => warn!("auto-load: {e}"),
            }
        }

        thread::sleep(config.poll_interval);
    }
}

fn run(config: &Config) -> ! {
    let mut was_present = false;

    loop {
        // ── Phase 1: wait for device ─────────────────────────────
        let mut machine = loop {
            match try_connect(config) {
                Some(m) => break m,
                None => {
                    if was_present {
                        Event::DeviceLeft.log();
                        was_present = false;
                    }
                    thread::sleep(config.reconnect_interval);
                }
            }
        };

        if !was_present {
            Event::DeviceArrived.log();
            was_present = true;
        }

        // ── Phase 2: poll status while device is alive ───────────
        monitor(&mut machine, config);
        if let Err(e) = machine.driver().disconnect() {
            debug!("usb: release after loss failed: {e}");
        }
    }
}

fn print_status(config: &Config) -> paper_handler::Result<()> {
    let driver = open_driver(config)?;
    let status = driver.get_paper_handler_status()?;
    println!("{status:#?}");
    let faults = status.faults();
    if faults.is_empty() {
        println!("faults: none");
    } else {
        let tags: Vec<&str> = faults.iter().map(|f| f.tag()).collect();
        println!("faults: {}", tags.join(", "));
    }
    match driver.get_scanner_capability() {
        Ok(cap) => println!("{cap:#?}"),
        Err(e) => println!("capability: unavailable ({e})"),
    }
    driver.disconnect()
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path: Option<&str> = None;
    let mut status_only = false;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--status" => status_only = true,
            "-c" => match it.next() {
                Some(path) => config_path = Some(path.as_str()),
                None => {
                    eprintln!("paper-handlerd: -c requires a config file path");
                    std::process::exit(1);
                }
            },
            other => {
                eprintln!("paper-handlerd: unexpected argument {other:?}");
                print_usage();
                std::process::exit(1);
            }
        }
    }

    let loaded = match config_path {
        Some(path) => load_config(path),
        None => default_config(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("paper-handlerd: {e}");
        std::process::exit(1);
    });

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .format_timestamp_secs()
    .init();

    if status_only {
        if let Err(e) = print_status(&config) {
            error!("status: {e}");
            std::process::exit(1);
        }
        return;
    }

    info!(
        "paper-handlerd starting: device {:04x}:{:04x}, max width {} dots, auto_load={}",
        config.vendor_id, config.product_id, config.driver.max_print_width, config.auto_load
    );
    run(&config);
}
