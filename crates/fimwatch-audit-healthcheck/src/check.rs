//! Health check controller.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fimwatch_audit_rules::{AccessMask, InstallOutcome, RuleManager, WatchRule};
use fimwatch_common_thread::spawn_named;
use tracing::{debug, warn};

use crate::config::HealthCheckConfig;
use crate::context::HealthCheckContext;
use crate::error::HealthCheckError;
use crate::reader::reader_main;
use crate::source::EventSource;

/// Drives one verification run of the audit event channel.
///
/// See the crate docs for the protocol. A `HealthCheck` holds only
/// configuration; all per-run state lives in a fresh
/// [`HealthCheckContext`], so a re-run starts clean. Runs must not overlap:
/// the watch rule and the artifact file are process-wide singletons for the
/// duration of a run.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    config: HealthCheckConfig,
}

impl HealthCheck {
    /// Create a check with the given configuration.
    pub fn new(config: HealthCheckConfig) -> Self {
        Self { config }
    }

    /// Create a check with stock timings.
    pub fn with_defaults() -> Self {
        Self::new(HealthCheckConfig::default())
    }

    /// The active configuration.
    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Run the health check.
    ///
    /// `Ok(())` means a synthetic filesystem event made the full round trip
    /// through the kernel audit channel and the channel can be trusted.
    /// The event `source` is consumed on a background thread; its handle's
    /// lifecycle (opening, closing) belongs to the caller.
    ///
    /// With the default configuration the wait for the reader thread to
    /// come up is unbounded. Teardown, by contrast, is always bounded: a
    /// reader that never acknowledges shutdown delays the return by at most
    /// the teardown deadline and is then abandoned.
    pub fn run<S: EventSource>(
        &self,
        rules: &dyn RuleManager,
        source: S,
    ) -> Result<(), HealthCheckError> {
        if let Err(e) = fs::create_dir_all(&self.config.check_dir) {
            return Err(HealthCheckError::CheckDir {
                path: self.config.check_dir.clone(),
                source: e,
            });
        }

        let rule = WatchRule::new(
            &self.config.check_dir,
            AccessMask::whodata(),
            &self.config.rule_key,
        );
        match rules.install(&rule) {
            Ok(InstallOutcome::Installed) => {}
            Ok(InstallOutcome::AlreadyPresent) => {
                debug!(key = %rule.key, "health check rule was already loaded");
            }
            Err(e) => {
                debug!(error = %e, "health check could not install its watch rule");
                return Err(HealthCheckError::RuleInstall(e));
            }
        }

        debug!(dir = %self.config.check_dir.display(), "starting audit health check");

        let ctx = Arc::new(HealthCheckContext::new());
        {
            let ctx = Arc::clone(&ctx);
            let mut source = source;
            spawn_named("fimwatch-audit-hc", move || reader_main(&ctx, &mut source));
        }

        match self.config.startup_timeout {
            None => ctx.wait_reader_started(),
            Some(timeout) => {
                if !ctx.wait_reader_started_timeout(timeout) {
                    self.cleanup(rules, &rule);
                    ctx.request_reader_stop();
                    return Err(HealthCheckError::ReaderNotReady { waited: timeout });
                }
            }
        }

        let artifact = self.config.artifact_path();
        let attempts = drive_generation(
            &ctx,
            self.config.retry_budget,
            self.config.retry_delay,
            |_attempt| provoke_event(&artifact),
        );

        let outcome = if ctx.is_event_observed() {
            debug!(attempts, "audit health check succeeded");
            Ok(())
        } else {
            debug!(attempts, "audit health check event was never delivered");
            Err(HealthCheckError::EventNotObserved { attempts })
        };

        self.cleanup(rules, &rule);
        ctx.request_reader_stop();

        if !ctx.wait_reader_finished_timeout(self.config.teardown_deadline) {
            // The check's verdict stands; startup must not hang on a stuck
            // reader thread.
            debug!("reader thread did not acknowledge shutdown in time");
        }

        outcome
    }

    fn cleanup(&self, rules: &dyn RuleManager, rule: &WatchRule) {
        let artifact = self.config.artifact_path();
        if let Err(e) = fs::remove_file(&artifact) {
            if e.kind() != ErrorKind::NotFound {
                debug!(error = %e, path = %artifact.display(), "could not remove health check artifact");
            }
        }
        if let Err(e) = rules.remove(rule) {
            warn!(error = %e, key = %rule.key, "could not remove health check watch rule");
        }
    }
}

/// Create then delete the artifact file to provoke an audit event.
///
/// Failures are logged and swallowed: a missed attempt just burns one
/// iteration of the retry budget.
fn provoke_event(artifact: &Path) {
    match fs::File::create(artifact) {
        Ok(file) => {
            drop(file);
            if let Err(e) = fs::remove_file(artifact) {
                debug!(error = %e, "could not delete health check artifact");
            }
        }
        Err(e) => {
            debug!(error = %e, "could not create health check artifact");
        }
    }
}

/// The bounded event-generation loop.
///
/// Runs up to `budget` iterations of provoke → sleep → recheck and stops
/// early once the marker event has been observed. Returns the number of
/// iterations performed. Kept free of filesystem concerns so the
/// iteration-count behavior is testable on its own.
fn drive_generation<F>(
    ctx: &HealthCheckContext,
    budget: u32,
    delay: Duration,
    mut provoke: F,
) -> u32
where
    F: FnMut(u32),
{
    let mut attempts = 0;
    for attempt in 1..=budget {
        attempts = attempt;
        provoke(attempt);
        thread::sleep(delay);
        if ctx.is_event_observed() {
            break;
        }
    }
    attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    use fimwatch_audit_rules::MemoryRuleManager;
    use proptest::prelude::*;
    use test_case::test_case;

    const TICK: Duration = Duration::from_millis(2);

    fn fast_config(dir: &Path, budget: u32) -> HealthCheckConfig {
        HealthCheckConfig {
            retry_budget: budget,
            retry_delay: Duration::from_millis(5),
            teardown_deadline: Duration::from_millis(200),
            startup_timeout: None,
            check_dir: dir.to_path_buf(),
            rule_key: "fimwatch_hc".to_string(),
        }
    }

    /// Polls the active flag like a well-behaved source; optionally flips
    /// the observed flag after a delay, simulating event delivery.
    struct FlagPollingSource {
        observe_after: Option<Duration>,
    }

    impl EventSource for FlagPollingSource {
        fn consume(&mut self, active: &AtomicBool, observed: &AtomicBool) -> io::Result<()> {
            let start = Instant::now();
            while active.load(Ordering::SeqCst) {
                if let Some(after) = self.observe_after {
                    if start.elapsed() >= after {
                        observed.store(true, Ordering::SeqCst);
                    }
                }
                thread::sleep(TICK);
            }
            Ok(())
        }
    }

    /// Ignores the active flag entirely; used to prove teardown is bounded.
    struct HangingSource;

    impl EventSource for HangingSource {
        fn consume(&mut self, _active: &AtomicBool, _observed: &AtomicBool) -> io::Result<()> {
            loop {
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    /// Records whether it was ever consumed.
    struct ConsumeProbe {
        consumed: Arc<AtomicBool>,
    }

    impl EventSource for ConsumeProbe {
        fn consume(&mut self, active: &AtomicBool, _observed: &AtomicBool) -> io::Result<()> {
            self.consumed.store(true, Ordering::SeqCst);
            while active.load(Ordering::SeqCst) {
                thread::sleep(TICK);
            }
            Ok(())
        }
    }

    #[test_case(1, 5; "first attempt")]
    #[test_case(3, 10; "third attempt")]
    #[test_case(10, 10; "last attempt")]
    fn generation_stops_on_the_observing_iteration(k: u32, budget: u32) {
        let ctx = HealthCheckContext::new();
        let attempts = drive_generation(&ctx, budget, Duration::ZERO, |attempt| {
            if attempt == k {
                ctx.event_observed().store(true, Ordering::SeqCst);
            }
        });
        assert_eq!(attempts, k);
    }

    #[test]
    fn generation_exhausts_budget_when_nothing_observed() {
        let ctx = HealthCheckContext::new();
        let mut calls = 0;
        let attempts = drive_generation(&ctx, 10, Duration::ZERO, |_| calls += 1);
        assert_eq!(attempts, 10);
        assert_eq!(calls, 10);
    }

    #[test]
    fn zero_budget_performs_no_iterations() {
        let ctx = HealthCheckContext::new();
        let mut calls = 0;
        let attempts = drive_generation(&ctx, 0, Duration::ZERO, |_| calls += 1);
        assert_eq!(attempts, 0);
        assert_eq!(calls, 0);
    }

    proptest! {
        #[test]
        fn generation_iteration_counts_hold(budget in 1u32..12, seed in 0u32..12) {
            let k = 1 + seed % budget;
            let ctx = HealthCheckContext::new();
            let mut calls = 0;
            let attempts = drive_generation(&ctx, budget, Duration::ZERO, |attempt| {
                calls += 1;
                if attempt == k {
                    ctx.event_observed().store(true, Ordering::SeqCst);
                }
            });
            prop_assert_eq!(attempts, k);
            prop_assert_eq!(calls, k);
        }
    }

    #[test]
    fn run_succeeds_when_marker_is_observed() {
        let dir = tempfile::tempdir().unwrap();
        let check = HealthCheck::new(fast_config(dir.path(), 10));
        let rules = MemoryRuleManager::new();

        let result = check.run(
            &rules,
            FlagPollingSource {
                observe_after: Some(Duration::from_millis(12)),
            },
        );

        assert!(result.is_ok());
        assert!(rules.is_empty(), "rule must be removed after the check");
        assert!(!check.config().artifact_path().exists());
    }

    #[test]
    fn run_reports_event_not_observed_after_full_budget() {
        let dir = tempfile::tempdir().unwrap();
        let check = HealthCheck::new(fast_config(dir.path(), 3));
        let rules = MemoryRuleManager::new();

        let result = check.run(&rules, FlagPollingSource { observe_after: None });

        match result {
            Err(HealthCheckError::EventNotObserved { attempts }) => assert_eq!(attempts, 3),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(rules.is_empty());
        assert!(!check.config().artifact_path().exists());
    }

    #[test]
    fn run_fails_fast_when_rule_install_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let check = HealthCheck::new(fast_config(dir.path(), 10));
        let rules = MemoryRuleManager::new();
        rules.fail_installs();

        let consumed = Arc::new(AtomicBool::new(false));
        let start = Instant::now();
        let result = check.run(
            &rules,
            ConsumeProbe {
                consumed: Arc::clone(&consumed),
            },
        );

        assert!(matches!(result, Err(HealthCheckError::RuleInstall(_))));
        // No reader, no generation loop, no artifact.
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!consumed.load(Ordering::SeqCst));
        assert!(!check.config().artifact_path().exists());
    }

    #[test]
    fn preexisting_rule_counts_as_success() {
        let dir = tempfile::tempdir().unwrap();
        let check = HealthCheck::new(fast_config(dir.path(), 10));
        let rules = MemoryRuleManager::new();
        let rule = WatchRule::new(dir.path(), AccessMask::whodata(), "fimwatch_hc");
        rules.install(&rule).unwrap();

        let result = check.run(
            &rules,
            FlagPollingSource {
                observe_after: Some(Duration::from_millis(5)),
            },
        );

        assert!(result.is_ok());
    }

    #[test]
    fn teardown_is_bounded_when_reader_hangs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path(), 1);
        config.teardown_deadline = Duration::from_millis(80);
        let check = HealthCheck::new(config);
        let rules = MemoryRuleManager::new();

        let start = Instant::now();
        let result = check.run(&rules, HangingSource);
        let elapsed = start.elapsed();

        // Budget of 1 with a 5ms delay, then at most the 80ms deadline.
        assert!(matches!(
            result,
            Err(HealthCheckError::EventNotObserved { attempts: 1 })
        ));
        assert!(
            elapsed < Duration::from_secs(2),
            "teardown took {elapsed:?}, deadline was 80ms"
        );
    }

    #[test]
    fn rule_removal_failure_does_not_change_the_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let check = HealthCheck::new(fast_config(dir.path(), 10));
        let rules = MemoryRuleManager::new();
        rules.fail_removals();

        let result = check.run(
            &rules,
            FlagPollingSource {
                observe_after: Some(Duration::from_millis(5)),
            },
        );

        assert!(result.is_ok());
    }

    /// Polls the active flag and records whether its loop was entered and
    /// whether it exited again.
    struct LifecycleSource {
        entered: Arc<AtomicBool>,
        exited: Arc<AtomicBool>,
    }

    impl EventSource for LifecycleSource {
        fn consume(&mut self, active: &AtomicBool, _observed: &AtomicBool) -> io::Result<()> {
            self.entered.store(true, Ordering::SeqCst);
            while active.load(Ordering::SeqCst) {
                thread::sleep(TICK);
            }
            self.exited.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn expired_startup_timeout_does_not_leak_the_late_reader() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path(), 1);
        // A zero timeout expires before the reader thread is scheduled in
        // virtually every run; the sticky stop request must then keep the
        // active flag clear so the late reader exits instead of polling a
        // flag nobody will ever clear again.
        config.startup_timeout = Some(Duration::ZERO);
        let check = HealthCheck::new(config);
        let rules = MemoryRuleManager::new();

        let entered = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));
        let result = check.run(
            &rules,
            LifecycleSource {
                entered: Arc::clone(&entered),
                exited: Arc::clone(&exited),
            },
        );

        if let Err(HealthCheckError::ReaderNotReady { .. }) = result {
            assert!(rules.is_empty(), "rule must be removed on the timeout path");
        } else {
            // The reader won the race and came up within the zero timeout;
            // the run then proceeds normally and must still wind down.
            assert!(matches!(
                result,
                Err(HealthCheckError::EventNotObserved { .. })
            ));
        }

        // Either way the reader thread must terminate promptly once a stop
        // has been requested.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !exited.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(TICK);
        }
        if entered.load(Ordering::SeqCst) {
            assert!(
                exited.load(Ordering::SeqCst),
                "reader consumption loop still running after stop request"
            );
        }
    }

    #[test]
    fn bounded_startup_wait_still_succeeds_with_a_healthy_reader() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path(), 10);
        config.startup_timeout = Some(Duration::from_secs(5));
        let check = HealthCheck::new(config);
        let rules = MemoryRuleManager::new();

        let result = check.run(
            &rules,
            FlagPollingSource {
                observe_after: Some(Duration::from_millis(5)),
            },
        );

        assert!(result.is_ok());
    }
}
