//! Coarse paper lifecycle layered over raw status polling.
//!
//! ```text
//! no_paper
//!   └─ all input sensors covered ──→ paper_ready_to_load
//!
//! paper_ready_to_load
//!   ├─ input sensors clear ────────→ no_paper
//!   └─ load_and_park() ────────────→ parking_paper
//!
//! parking_paper
//!   ├─ park sensor ────────────────→ paper_parked
//!   └─ park timeout elapsed ───────→ no_paper
//!
//! paper_parked
//!   ├─ no paper anywhere ──────────→ no_paper
//!   └─ print_ballot() ─────────────→ printing_ballot
//!
//! printing_ballot
//!   └─ scan path clear ────────────→ ballot_printed
//!
//! ballot_printed, any state holding paper
//!   └─ eject() ────────────────────→ ejecting
//!
//! ejecting
//!   └─ no paper anywhere ──────────→ no_paper
//! ```
//!
//! Jams and other faults have no state of their own; read them from
//! [`PaperHandlerStatus::faults`].

use std::fmt;
use std::time::{Duration, Instant};

use image::RgbaImage;
use log::{debug, info, warn};

use crate::driver::{PaperHandlerDriverInterface, PrintOptions};
use crate::error::{Error, Result};
use crate::scan::ScannedImage;
use crate::status::PaperHandlerStatus;

pub const DEFAULT_PARK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleStatus {
    NoPaper,
    PaperReadyToLoad,
    ParkingPaper,
    PaperParked,
    PrintingBallot,
    BallotPrinted,
    Ejecting,
}

impl SimpleStatus {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::NoPaper => "no_paper",
            Self::PaperReadyToLoad => "paper_ready_to_load",
            Self::ParkingPaper => "parking_paper",
            Self::PaperParked => "paper_parked",
            Self::PrintingBallot => "printing_ballot",
            Self::BallotPrinted => "ballot_printed",
            Self::Ejecting => "ejecting",
        }
    }

    /// States in which the handler holds a sheet that can be ejected.
    pub const fn holds_paper(self) -> bool {
        matches!(
            self,
            Self::ParkingPaper | Self::PaperParked | Self::PrintingBallot | Self::BallotPrinted
        )
    }
}

impl fmt::Display for SimpleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Apply one poll's sensor readings to the current state.
///
/// `since_action` is the time since the last state-initiating action.
pub fn next_state(
    current: SimpleStatus,
    status: &PaperHandlerStatus,
    since_action: Duration,
    park_timeout: Duration,
) -> SimpleStatus {
    use SimpleStatus::*;
    match current {
        NoPaper if status.is_paper_ready_to_load() => PaperReadyToLoad,
        PaperReadyToLoad if !status.is_paper_in_input() => NoPaper,
        ParkingPaper if status.park_sensor => PaperParked,
        ParkingPaper if since_action > park_timeout => NoPaper,
        PaperParked if !status.is_paper_anywhere() => NoPaper,
        PrintingBallot if !status.is_paper_in_scan_path() => BallotPrinted,
        Ejecting if !status.is_paper_anywhere() => NoPaper,
        unchanged => unchanged,
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EjectTarget {
    Front,
    BallotBox,
}

pub struct PaperHandlerStateMachine<D, C = SystemClock> {
    driver: D,
    clock: C,
    park_timeout: Duration,
    state: SimpleStatus,
    action_started: Instant,
    last_status: Option<PaperHandlerStatus>,
}

impl<D: PaperHandlerDriverInterface> PaperHandlerStateMachine<D, SystemClock> {
    pub fn new(driver: D) -> Self {
        Self::with_clock(driver, SystemClock, DEFAULT_PARK_TIMEOUT)
    }
}

impl<D: PaperHandlerDriverInterface, C: Clock> PaperHandlerStateMachine<D, C> {
    pub fn with_clock(driver: D, clock: C, park_timeout: Duration) -> Self {
        let action_started = clock.now();
        Self {
            driver,
            clock,
            park_timeout,
            state: SimpleStatus::NoPaper,
            action_started,
            last_status: None,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// State as of the last poll or action, without touching the device.
    pub fn current(&self) -> SimpleStatus {
        self.state
    }

    /// Raw status from the last poll.
    pub fn last_status(&self) -> Option<&PaperHandlerStatus> {
        self.last_status.as_ref()
    }

    fn enter(&mut self, next: SimpleStatus) {
        if next != self.state {
            info!("state: {} -> {next}", self.state);
            self.state = next;
        }
    }

    fn start_action(&mut self, next: SimpleStatus) {
        self.action_started = self.clock.now();
        self.enter(next);
    }

    fn require(&self, action: &'static str, allowed: &[SimpleStatus]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    /// Poll the device and advance the lifecycle.
    pub fn status(&mut self) -> Result<SimpleStatus> {
        let status = self.driver.get_paper_handler_status()?;
        let since_action = self.clock.now().saturating_duration_since(self.action_started);
        let next = next_state(self.state, &status, since_action, self.park_timeout);
        if self.state == SimpleStatus::ParkingPaper && next == SimpleStatus::NoPaper {
            warn!("park sensor did not fire within {:?}", self.park_timeout);
        }
        self.last_status = Some(status);
        self.enter(next);
        Ok(self.state)
    }

    /// Pull a fully inserted sheet in and park it.
    pub fn load_and_park(&mut self) -> Result<bool> {
        self.require("load paper", &[SimpleStatus::PaperReadyToLoad])?;
        if !self.driver.load_paper()? {
            return Ok(false);
        }
        if !self.driver.park_paper()? {
            return Ok(false);
        }
        self.start_action(SimpleStatus::ParkingPaper);
        Ok(true)
    }

    pub fn print_ballot(&mut self, image: &RgbaImage, options: &PrintOptions) -> Result<bool> {
        self.require("print ballot", &[SimpleStatus::PaperParked])?;
        let max = u32::from(self.driver.max_print_width());
        if image.width() > max {
            return Err(Error::InvalidParam(format!(
                "image width {} exceeds max print width {max}",
                image.width()
            )));
        }
        if !self.driver.enable_print()? {
            return Ok(false);
        }
        self.start_action(SimpleStatus::PrintingBallot);
        if let Err(e) = self.driver.print_image(image, options) {
            warn!("print: failed ({e}), sheet stays parked");
            self.enter(SimpleStatus::PaperParked);
            return Err(e);
        }
        debug!("print: sent, waiting for scan path to clear");
        Ok(true)
    }

    pub fn scan_ballot(&mut self) -> Result<ScannedImage> {
        self.require(
            "scan ballot",
            &[SimpleStatus::PaperParked, SimpleStatus::BallotPrinted],
        )?;
        self.driver.scan()
    }

    pub fn eject(&mut self, target: EjectTarget) -> Result<bool> {
        if !self.state.holds_paper() {
            return Err(Error::InvalidState {
                action: "eject",
                state: self.state,
            });
        }
        let accepted = match target {
            EjectTarget::Front => self.driver.eject_paper_to_front()?,
            EjectTarget::BallotBox => self.driver.eject_ballot_to_ballot_box()?,
        };
        if accepted {
            self.start_action(SimpleStatus::Ejecting);
        }
        Ok(accepted)
    }
}
