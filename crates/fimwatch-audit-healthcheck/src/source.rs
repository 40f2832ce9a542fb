//! Audit event sources.

use std::io::{self, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

// Records without a newline are capped at this size; anything longer is not
// an audit record and gets dropped.
const MAX_PENDING_RECORD: usize = 64 * 1024;

/// A stream of raw audit events the reader thread consumes.
///
/// Contract for implementations:
/// - keep consuming until `active` is observed `false`, polling it at every
///   reasonable opportunity, and return only then (or on an unrecoverable
///   source error);
/// - set `observed` once a record carrying the health-check marker is
///   recognized;
/// - never terminate the process on error — report it in the return value.
pub trait EventSource: Send + 'static {
    /// Consume events until told to stop.
    fn consume(&mut self, active: &AtomicBool, observed: &AtomicBool) -> io::Result<()>;
}

/// An [`EventSource`] over a newline-delimited record stream.
///
/// Scans each record for the rule key in `key="…"` or `key=…` form; record
/// content beyond the marker is not interpreted. The underlying reader must
/// be configured with a read timeout (for example
/// `UnixStream::set_read_timeout`) so the loop regains control to poll the
/// active flag; `WouldBlock`, `TimedOut` and `Interrupted` are treated as
/// "no data yet".
pub struct LineEventSource<R> {
    reader: R,
    quoted_marker: String,
    plain_marker: String,
    pending: Vec<u8>,
}

impl<R: Read + Send + 'static> LineEventSource<R> {
    /// Wrap a record stream, scanning for the given rule key.
    pub fn new(reader: R, rule_key: &str) -> Self {
        Self {
            reader,
            quoted_marker: format!("key=\"{rule_key}\""),
            plain_marker: format!("key={rule_key}"),
            pending: Vec::new(),
        }
    }

    fn record_matches(&self, record: &[u8]) -> bool {
        let record = String::from_utf8_lossy(record);
        record.contains(&self.quoted_marker) || record.contains(&self.plain_marker)
    }

    fn scan_pending(&mut self, observed: &AtomicBool) {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let record: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.record_matches(&record) {
                if !observed.swap(true, Ordering::SeqCst) {
                    debug!("health check marker event received");
                }
            }
        }
        if self.pending.len() > MAX_PENDING_RECORD {
            self.pending.clear();
        }
    }
}

impl<R: Read + Send + 'static> EventSource for LineEventSource<R> {
    fn consume(&mut self, active: &AtomicBool, observed: &AtomicBool) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            if !active.load(Ordering::SeqCst) {
                return Ok(());
            }
            match self.reader.read(&mut chunk) {
                // Stream closed on the far side; nothing more will arrive.
                Ok(0) => return Ok(()),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    self.scan_pending(observed);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
