//! Shared state between the controller and the reader thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fimwatch_common_thread::Latch;

/// Rendezvous state for one health check run.
///
/// Created fresh per run, shared with the reader thread via `Arc`, and
/// discarded afterwards; a context is never reused.
///
/// The two flags are plain atomics so the controller's retry loop and the
/// reader's consumption loop can check them without taking a lock. The two
/// latches exist only for the blocking rendezvous points: "the reader is
/// up" and "the reader has finished".
///
/// Flag lifecycle per run: `reader_active` goes 0→1→0 exactly once under
/// normal operation; `event_observed` goes 0→1 at most once and is never
/// reset. A stop request is sticky: once made, a reader thread that is
/// scheduled late can no longer raise `reader_active`, so an abandoned
/// reader always finds the flag clear and exits.
#[derive(Debug, Default)]
pub struct HealthCheckContext {
    reader_active: AtomicBool,
    event_observed: AtomicBool,
    stop_requested: AtomicBool,
    started: Latch,
    finished: Latch,
}

impl HealthCheckContext {
    /// Create a fresh context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw active flag, handed to the event source as its keep-running
    /// signal.
    pub fn reader_active(&self) -> &AtomicBool {
        &self.reader_active
    }

    /// Raw observed flag, set by the event source when it recognizes the
    /// health-check marker.
    pub fn event_observed(&self) -> &AtomicBool {
        &self.event_observed
    }

    /// Whether the marker event has been seen.
    pub fn is_event_observed(&self) -> bool {
        self.event_observed.load(Ordering::SeqCst)
    }

    /// Reader side: flag the reader as running and release the controller's
    /// startup wait. The flag store happens before the latch opens, so a
    /// released waiter always observes the flag set.
    ///
    /// If the controller already requested a stop (it gave up on a bounded
    /// startup wait), the active flag stays clear; the re-check after the
    /// store closes the race with a concurrent [`request_reader_stop`].
    pub fn mark_reader_started(&self) {
        if !self.stop_requested.load(Ordering::SeqCst) {
            self.reader_active.store(true, Ordering::SeqCst);
            if self.stop_requested.load(Ordering::SeqCst) {
                self.reader_active.store(false, Ordering::SeqCst);
            }
        }
        self.started.open();
    }

    /// Reader side: release anyone waiting for the reader to finish.
    pub fn mark_reader_finished(&self) {
        self.finished.open();
    }

    /// Controller side: block until the reader has signaled readiness.
    pub fn wait_reader_started(&self) {
        self.started.wait();
    }

    /// Controller side: bounded wait for reader readiness. Returns `false`
    /// on timeout.
    pub fn wait_reader_started_timeout(&self, timeout: Duration) -> bool {
        self.started.wait_timeout(timeout)
    }

    /// Controller side: ask the reader to stop. Advisory — the reader's
    /// consumption loop polls the flag and exits on its own schedule. The
    /// request is sticky: a reader signaling readiness after this point
    /// finds the active flag already clear.
    pub fn request_reader_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.reader_active.store(false, Ordering::SeqCst);
    }

    /// Controller side: bounded wait for the reader's finished signal.
    /// Returns `false` on timeout; a late signal after that is a no-op.
    pub fn wait_reader_finished_timeout(&self, timeout: Duration) -> bool {
        self.finished.wait_timeout(timeout)
    }
}
