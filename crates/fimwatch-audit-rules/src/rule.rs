//! Watch rule model.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Access types a watch rule matches, as a small bitmask.
///
/// Mirrors the kernel audit permission filter: read, write, execute and
/// attribute change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessMask(u8);

impl AccessMask {
    /// Read access.
    pub const READ: Self = Self(0b0001);
    /// Write access.
    pub const WRITE: Self = Self(0b0010);
    /// Execute access.
    pub const EXECUTE: Self = Self(0b0100);
    /// Attribute change.
    pub const ATTRIBUTE: Self = Self(0b1000);

    /// Combine two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether all bits of `other` are set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Mask used by file-integrity watches: write plus attribute change.
    pub const fn whodata() -> Self {
        Self::WRITE.union(Self::ATTRIBUTE)
    }
}

impl fmt::Display for AccessMask {
    /// Renders in auditctl `-p` syntax, e.g. `wa`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::READ) {
            f.write_str("r")?;
        }
        if self.contains(Self::WRITE) {
            f.write_str("w")?;
        }
        if self.contains(Self::EXECUTE) {
            f.write_str("x")?;
        }
        if self.contains(Self::ATTRIBUTE) {
            f.write_str("a")?;
        }
        Ok(())
    }
}

/// A directory watch rule: path, access filter and identifying key.
///
/// The key tags matching audit records so the agent can tell its own rules
/// (and their events) apart from anything else loaded on the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRule {
    /// Directory the rule watches.
    pub path: PathBuf,
    /// Access types the rule matches.
    pub access: AccessMask,
    /// Key attached to matching records.
    pub key: String,
}

impl WatchRule {
    /// Create a rule.
    pub fn new(path: impl Into<PathBuf>, access: AccessMask, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            access,
            key: key.into(),
        }
    }
}
