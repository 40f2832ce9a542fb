//! Startup health check for the kernel audit event channel.
//!
//! A watch rule can be loaded into the kernel successfully and events can
//! still never reach the agent: the audit backlog may overflow, the daemon
//! may swallow records, or the dispatch socket may be misconfigured. Before
//! the file-integrity pipeline starts trusting audit events, this crate
//! empirically proves the channel end to end:
//!
//! 1. install a temporary watch rule over a private directory,
//! 2. start a background reader on the audit event stream,
//! 3. generate filesystem activity in the watched directory until the reader
//!    sees a record tagged with the health check's rule key,
//! 4. tear everything down again, bounded in time.
//!
//! The check succeeds only if a synthetic event made the full round trip
//! kernel → audit stream → reader. Everything else is reported as a typed
//! error so the caller can fall back to a degraded monitoring mode.

#![warn(missing_docs)]

mod check;
mod config;
mod context;
mod error;
mod reader;
mod source;

pub use check::HealthCheck;
pub use config::{
    HealthCheckConfig, DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY, DEFAULT_TEARDOWN_DEADLINE,
    HEALTHCHECK_FILE_NAME,
};
pub use context::HealthCheckContext;
pub use error::HealthCheckError;
pub use reader::reader_main;
pub use source::{EventSource, LineEventSource};
