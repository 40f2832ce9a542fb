//! Rule management through the `auditctl` binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::{InstallOutcome, RuleError, RuleManager, WatchRule};

/// A [`RuleManager`] that shells out to `auditctl`.
///
/// Requires the stock audit userspace tool on `PATH` (or an explicit binary
/// path) and whatever privileges auditd demands for rule changes.
#[derive(Debug, Clone)]
pub struct AuditctlRuleManager {
    program: PathBuf,
}

impl Default for AuditctlRuleManager {
    fn default() -> Self {
        Self::new("auditctl")
    }
}

impl AuditctlRuleManager {
    /// Use the given `auditctl` binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: Vec<OsString>) -> Result<(), RuleError> {
        debug!(program = %self.program.display(), ?args, "invoking auditctl");
        let output = Command::new(&self.program).args(&args).output()?;
        if output.status.success() {
            return Ok(());
        }
        Err(RuleError::CommandFailed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Arguments for `auditctl -w <path> -p <perms> -k <key>`.
fn install_args(rule: &WatchRule) -> Vec<OsString> {
    vec![
        OsString::from("-w"),
        rule.path.clone().into_os_string(),
        OsString::from("-p"),
        OsString::from(rule.access.to_string()),
        OsString::from("-k"),
        OsString::from(&rule.key),
    ]
}

/// Arguments for `auditctl -W <path> -p <perms> -k <key>`.
fn remove_args(rule: &WatchRule) -> Vec<OsString> {
    vec![
        OsString::from("-W"),
        rule.path.clone().into_os_string(),
        OsString::from("-p"),
        OsString::from(rule.access.to_string()),
        OsString::from("-k"),
        OsString::from(&rule.key),
    ]
}

fn is_rule_exists(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("rule exists") || lower.contains("already exists")
}

impl RuleManager for AuditctlRuleManager {
    fn install(&self, rule: &WatchRule) -> Result<InstallOutcome, RuleError> {
        match self.run(install_args(rule)) {
            Ok(()) => Ok(InstallOutcome::Installed),
            Err(RuleError::CommandFailed { stderr, .. }) if is_rule_exists(&stderr) => {
                debug!(path = %rule.path.display(), key = %rule.key, "watch rule already loaded");
                Ok(InstallOutcome::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }

    fn remove(&self, rule: &WatchRule) -> Result<(), RuleError> {
        self.run(remove_args(rule))
    }
}
