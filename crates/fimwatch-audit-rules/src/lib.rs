//! Kernel audit watch-rule management.
//!
//! The agent installs filesystem watch rules into the kernel audit subsystem
//! and removes them again when monitoring stops. This crate provides the
//! rule model, the [`RuleManager`] seam the rest of the agent programs
//! against, an `auditctl`-backed manager for production, and an in-memory
//! manager for tests and dry runs.

mod auditctl;
mod memory;
mod rule;

pub use auditctl::AuditctlRuleManager;
pub use memory::MemoryRuleManager;
pub use rule::{AccessMask, WatchRule};

use thiserror::Error;

/// Result of installing a watch rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The rule was added to the kernel rule set.
    Installed,
    /// An identical rule was already loaded. Treated as success by callers:
    /// the watch is in place either way.
    AlreadyPresent,
}

/// Errors from rule install/remove operations.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule backend could not be invoked at all.
    #[error("failed to run rule backend: {0}")]
    Io(#[from] std::io::Error),

    /// The rule backend ran but rejected the operation.
    #[error("rule backend exited with {code:?}: {stderr}")]
    CommandFailed {
        /// Process exit code, if the backend terminated normally.
        code: Option<i32>,
        /// Captured standard error output.
        stderr: String,
    },
}

/// Installs and removes kernel audit watch rules.
///
/// Implementations must be idempotence-aware: installing a rule that is
/// already loaded reports [`InstallOutcome::AlreadyPresent`] rather than an
/// error.
pub trait RuleManager: Send + Sync {
    /// Install a watch rule.
    fn install(&self, rule: &WatchRule) -> Result<InstallOutcome, RuleError>;

    /// Remove a previously installed watch rule.
    fn remove(&self, rule: &WatchRule) -> Result<(), RuleError>;
}
