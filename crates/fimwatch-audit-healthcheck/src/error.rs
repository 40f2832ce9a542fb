//! Health check outcome taxonomy.

use std::path::PathBuf;
use std::time::Duration;

use fimwatch_audit_rules::RuleError;
use thiserror::Error;

/// Ways a health check run can fail.
///
/// All of these are returned as values; the check never panics the process.
/// A rule-removal failure during teardown is deliberately absent: it is
/// logged, but the verdict of the check is about event delivery, not rule
/// bookkeeping.
#[derive(Debug, Error)]
pub enum HealthCheckError {
    /// The private check directory could not be prepared.
    #[error("could not prepare check directory {path}")]
    CheckDir {
        /// Directory that failed to be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The temporary watch rule could not be installed. "Already exists"
    /// does not produce this error.
    #[error("audit watch rule could not be installed")]
    RuleInstall(#[source] RuleError),

    /// The full retry budget elapsed without the reader reporting the
    /// marker event. The audit channel cannot be trusted.
    #[error("no audit event observed after {attempts} generation attempts")]
    EventNotObserved {
        /// Generation attempts performed.
        attempts: u32,
    },

    /// The reader thread did not signal readiness within the configured
    /// startup timeout. Only possible when
    /// [`HealthCheckConfig::startup_timeout`](crate::HealthCheckConfig::startup_timeout)
    /// is set.
    #[error("reader thread not ready within {waited:?}")]
    ReaderNotReady {
        /// How long the controller waited.
        waited: Duration,
    },
}
