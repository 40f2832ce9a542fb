//! Thread rendezvous primitives.
//!
//! This crate provides the small set of synchronization tools the agent's
//! background threads need:
//! - One-shot latches for startup/shutdown rendezvous
//! - Named thread spawning

#![warn(missing_docs)]

use std::sync::{Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A one-shot synchronization latch.
///
/// A latch starts closed and can be opened exactly once; opening is
/// idempotent. Waiters block until the latch is open. Unlike a bare
/// condition variable, a latch opened before anyone waits still releases
/// later waiters, so there is no lost-wakeup hazard between a thread that
/// signals early and a thread that waits late.
#[derive(Debug, Default)]
pub struct Latch {
    open: Mutex<bool>,
    cvar: Condvar,
}

impl Latch {
    /// Create a closed latch.
    pub fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    /// Open the latch, releasing all current and future waiters.
    pub fn open(&self) {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        *open = true;
        self.cvar.notify_all();
    }

    /// Whether the latch has been opened.
    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the latch is open.
    ///
    /// The predicate is re-checked on every wake, so spurious wakeups are
    /// harmless.
    pub fn wait(&self) {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        while !*open {
            open = self.cvar.wait(open).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the latch is open or the timeout elapses.
    ///
    /// Returns `true` if the latch was observed open, `false` on timeout.
    /// The deadline is fixed up front, so spurious wakeups do not extend it.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        while !*open {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .cvar
                .wait_timeout(open, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            open = guard;
            if result.timed_out() && !*open {
                return false;
            }
        }
        true
    }
}

/// Spawn a named thread.
///
/// Thread names show up in debuggers and panic messages; every background
/// thread the agent starts goes through here.
pub fn spawn_named<F, T>(name: impl Into<String>, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .expect("failed to spawn thread")
}
