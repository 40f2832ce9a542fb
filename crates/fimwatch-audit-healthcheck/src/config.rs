//! Health check configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of event-generation attempts before giving up.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Pause between event-generation attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How long teardown waits for the reader thread to acknowledge shutdown.
pub const DEFAULT_TEARDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Name of the artifact file created inside the watched directory.
pub const HEALTHCHECK_FILE_NAME: &str = "audit_hc";

/// Timing and placement knobs for one health check run.
///
/// The defaults reproduce the agent's stock behavior: ten attempts one
/// second apart, a five second teardown deadline, and an unbounded wait for
/// the reader thread to come up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Maximum event-generation attempts.
    pub retry_budget: u32,

    /// Pause after each generation attempt, in milliseconds.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,

    /// Teardown wait deadline, in milliseconds.
    #[serde(rename = "teardown_deadline_ms", with = "duration_ms")]
    pub teardown_deadline: Duration,

    /// Bound on the wait for the reader thread to signal readiness, in
    /// milliseconds. `None` waits forever: a channel that cannot be
    /// verified must not be silently trusted, so by default startup stalls
    /// instead of proceeding.
    #[serde(rename = "startup_timeout_ms", with = "opt_duration_ms")]
    pub startup_timeout: Option<Duration>,

    /// Private directory the temporary watch rule covers.
    pub check_dir: PathBuf,

    /// Key attached to the temporary rule, and the marker the reader scans
    /// incoming records for.
    pub rule_key: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_delay: DEFAULT_RETRY_DELAY,
            teardown_deadline: DEFAULT_TEARDOWN_DEADLINE,
            startup_timeout: None,
            check_dir: std::env::temp_dir().join("fimwatch"),
            rule_key: "fimwatch_hc".to_string(),
        }
    }
}

impl HealthCheckConfig {
    /// Path of the artifact file used to provoke audit events.
    pub fn artifact_path(&self) -> PathBuf {
        self.check_dir.join(HEALTHCHECK_FILE_NAME)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
