//! Per-endpoint exclusive lock with FIFO hand-off.
//!
//! Each caller draws a ticket on `acquire()` and blocks until the ticket is
//! served. Releasing the guard serves the next ticket, so waiters are granted
//! the lock in the order they asked for it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;

#[derive(Debug, Default)]
struct Tickets {
    next: u64,
    serving: u64,
}

#[derive(Debug)]
pub struct EndpointLock {
    name: &'static str,
    tickets: Mutex<Tickets>,
    turn: Condvar,
}

/// Held for the duration of one exchange. Dropping it releases the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct EndpointGuard<'a> {
    lock: &'a EndpointLock,
    ticket: u64,
}

impl EndpointLock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tickets: Mutex::new(Tickets::default()),
            turn: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, Tickets> {
        // The counters stay consistent even if a holder panicked.
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self) -> EndpointGuard<'_> {
        let mut tickets = self.state();
        let ticket = tickets.next;
        tickets.next += 1;
        if ticket != tickets.serving {
            debug!("{}: waiting (ticket {ticket}, serving {})", self.name, tickets.serving);
        }
        while ticket != tickets.serving {
            tickets = self
                .turn
                .wait(tickets)
                .unwrap_or_else(PoisonError::into_inner);
        }
        EndpointGuard { lock: self, ticket }
    }

    /// Number of callers holding or waiting for the lock.
    pub fn queued(&self) -> u64 {
        let tickets = self.state();
        tickets.next - tickets.serving
    }

    /// Block until every exchange queued before this call has finished.
    pub fn drain(&self) {
        drop(self.acquire());
    }

    fn release(&self, ticket: u64) {
        let mut tickets = self.state();
        debug_assert_eq!(ticket, tickets.serving);
        tickets.serving += 1;
        drop(tickets);
        self.turn.notify_all();
    }
}

impl Drop for EndpointGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.ticket);
    }
}
