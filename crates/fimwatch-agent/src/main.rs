//! fimwatch agent entry point.
//!
//! Startup order matters: the audit health check runs before any monitoring
//! is trusted. On success the agent would hand the verified channel to the
//! monitoring pipeline; on failure it exits with a code the init system can
//! act on (restart, fall back to scan-only mode, alert).

use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use fimwatch_audit_healthcheck::{HealthCheck, HealthCheckConfig, HealthCheckError, LineEventSource};
use fimwatch_audit_rules::{AuditctlRuleManager, MemoryRuleManager, RuleManager};
use fimwatch_common_log::{LogConfig, LogLevel};

/// Application exit codes.
#[repr(u8)]
enum Exit {
    Success = 0,
    EventNotObserved = 1,
    RuleError = 2,
    SetupError = 3,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

/// Verify the kernel audit channel before starting file-integrity monitoring.
#[derive(Debug, Parser)]
#[command(name = "fimwatch-agent", version, about)]
struct Cli {
    /// Audit event stream socket (e.g. an audispd af_unix plugin socket).
    #[arg(long, default_value = "/var/run/audispd_events")]
    socket: PathBuf,

    /// YAML file with a health check configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the temporary watch rule covers.
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Rule key used to tag and recognize health check events.
    #[arg(long)]
    key: Option<String>,

    /// Maximum event-generation attempts.
    #[arg(long)]
    retry_budget: Option<u32>,

    /// Pause between attempts, in milliseconds.
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Teardown wait deadline, in milliseconds.
    #[arg(long)]
    teardown_deadline_ms: Option<u64>,

    /// Bound the wait for the reader thread, in milliseconds. Unbounded if
    /// not given.
    #[arg(long)]
    startup_timeout_ms: Option<u64>,

    /// Track rules in memory instead of loading them into the kernel.
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FIMWATCH_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn health_check_config(&self) -> anyhow::Result<HealthCheckConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => HealthCheckConfig::default(),
        };

        if let Some(dir) = &self.watch_dir {
            config.check_dir = dir.clone();
        }
        if let Some(key) = &self.key {
            config.rule_key = key.clone();
        }
        if let Some(budget) = self.retry_budget {
            config.retry_budget = budget;
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.teardown_deadline_ms {
            config.teardown_deadline = Duration::from_millis(ms);
        }
        if let Some(ms) = self.startup_timeout_ms {
            config.startup_timeout = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

fn init_logging(cli: &Cli) {
    let mut config = LogConfig::from_env();
    if let Some(level) = cli.log_level.as_deref().and_then(LogLevel::parse) {
        config.level = level;
    }
    // A second init only happens in tests; ignore it.
    let _ = fimwatch_common_log::init(config);
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => {
            info!("audit channel verified; proceeding with monitoring startup");
            Exit::Success.into()
        }
        Err(AgentError::HealthCheck(HealthCheckError::EventNotObserved { attempts })) => {
            error!(attempts, "audit channel is not delivering events");
            Exit::EventNotObserved.into()
        }
        Err(AgentError::HealthCheck(HealthCheckError::RuleInstall(e))) => {
            error!(error = %e, "could not install audit watch rule");
            Exit::RuleError.into()
        }
        Err(AgentError::HealthCheck(e)) => {
            error!(error = %e, "audit health check failed");
            Exit::SetupError.into()
        }
        Err(AgentError::Setup(e)) => {
            error!(error = %e, "agent setup failed");
            Exit::SetupError.into()
        }
    }
}

enum AgentError {
    Setup(anyhow::Error),
    HealthCheck(HealthCheckError),
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        Self::Setup(e)
    }
}

fn run(cli: &Cli) -> Result<(), AgentError> {
    let config = cli.health_check_config()?;

    let stream = UnixStream::connect(&cli.socket)
        .with_context(|| format!("connecting to audit socket {}", cli.socket.display()))?;
    stream
        .set_read_timeout(Some(Duration::from_millis(250)))
        .context("setting audit socket read timeout")?;
    let source = LineEventSource::new(stream, &config.rule_key);

    let rules: Box<dyn RuleManager> = if cli.dry_run {
        Box::new(MemoryRuleManager::new())
    } else {
        Box::new(AuditctlRuleManager::default())
    };

    info!(
        socket = %cli.socket.display(),
        dir = %config.check_dir.display(),
        dry_run = cli.dry_run,
        "running audit health check"
    );

    HealthCheck::new(config)
        .run(rules.as_ref(), source)
        .map_err(AgentError::HealthCheck)
}
