//! Reader thread body.

use tracing::{debug, warn};

use crate::context::HealthCheckContext;
use crate::source::EventSource;

/// Body of the background reader thread.
///
/// Signals readiness, consumes the event source until the controller clears
/// the active flag, then signals completion. The finished signal is sent
/// unconditionally — a failing source ends consumption early, but the
/// controller's teardown wait must still be released.
///
/// One reader is single-use: `Idle → Starting → Running → Finished`, no way
/// back.
pub fn reader_main<S: EventSource>(ctx: &HealthCheckContext, source: &mut S) {
    ctx.mark_reader_started();
    debug!("health check reader active");

    if let Err(e) = source.consume(ctx.reader_active(), ctx.event_observed()) {
        warn!(error = %e, "audit event source failed during health check");
    }

    debug!("health check reader finished");
    ctx.mark_reader_finished();
}
