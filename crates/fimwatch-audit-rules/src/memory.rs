//! In-memory rule manager.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::{InstallOutcome, RuleError, RuleManager, WatchRule};

/// A [`RuleManager`] that tracks rules in process memory.
///
/// Used by tests and by dry-run mode, where the agent goes through all the
/// motions without touching the kernel rule set. Failure injection is
/// available for exercising error paths.
#[derive(Debug, Default)]
pub struct MemoryRuleManager {
    rules: Mutex<HashSet<(PathBuf, String)>>,
    fail_installs: AtomicBool,
    fail_removals: AtomicBool,
}

impl MemoryRuleManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent install fail.
    pub fn fail_installs(&self) {
        self.fail_installs.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent removal fail.
    pub fn fail_removals(&self) {
        self.fail_removals.store(true, Ordering::SeqCst);
    }

    /// Whether the given rule is currently loaded.
    pub fn contains(&self, rule: &WatchRule) -> bool {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(rule.path.clone(), rule.key.clone()))
    }

    /// Number of loaded rules.
    pub fn len(&self) -> usize {
        self.rules.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no rules are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rejected(what: &str) -> RuleError {
        RuleError::CommandFailed {
            code: Some(1),
            stderr: format!("injected {what} failure"),
        }
    }
}

impl RuleManager for MemoryRuleManager {
    fn install(&self, rule: &WatchRule) -> Result<InstallOutcome, RuleError> {
        if self.fail_installs.load(Ordering::SeqCst) {
            return Err(Self::rejected("install"));
        }
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        if rules.insert((rule.path.clone(), rule.key.clone())) {
            debug!(path = %rule.path.display(), key = %rule.key, "rule loaded (memory)");
            Ok(InstallOutcome::Installed)
        } else {
            Ok(InstallOutcome::AlreadyPresent)
        }
    }

    fn remove(&self, rule: &WatchRule) -> Result<(), RuleError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(Self::rejected("removal"));
        }
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        if rules.remove(&(rule.path.clone(), rule.key.clone())) {
            Ok(())
        } else {
            Err(RuleError::CommandFailed {
                code: Some(1),
                stderr: "no matching rule".to_string(),
            })
        }
    }
}
