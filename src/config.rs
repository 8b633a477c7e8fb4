//! Harness configuration: defaults from spec §4-§6, overridable via
//! `ada-harness.toml`-style environment variables loaded through `dotenvy`,
//! mirroring the teacher's `RuntimeConfig::resolve_sqlite_db_name` pattern
//! of "explicit override, else env var, else hardcoded default".

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fully resolved configuration for one harness run, threaded through every
/// component via [`crate::scheduler::HarnessContext`] instead of read from
/// globals at point of use.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub project_root: PathBuf,
    pub retry: RetryConfig,
    pub session: SessionConfig,
    pub verification: VerificationConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
    pub alerts: AlertConfig,
    pub preflight: PreflightConfig,
}

impl HarnessConfig {
    /// Load configuration for `project_root`, applying `.env`/environment
    /// overrides on top of spec-mandated defaults.
    pub fn load(project_root: impl Into<PathBuf>) -> Self {
        dotenvy::dotenv().ok();
        Self {
            project_root: project_root.into(),
            retry: RetryConfig::from_env(),
            session: SessionConfig::from_env(),
            verification: VerificationConfig::from_env(),
            logging: LoggingConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
            alerts: AlertConfig::from_env(),
            preflight: PreflightConfig::from_env(),
        }
    }

    pub fn ada_dir(&self) -> PathBuf {
        self.project_root.join(".ada")
    }

    /// `feature-list.json` lives at the project root, not under `.ada/` —
    /// spec §6 treats it as a top-level project artifact alongside the
    /// progress log, not harness-internal state.
    pub fn backlog_path(&self) -> PathBuf {
        self.project_root.join("feature-list.json")
    }

    pub fn project_identity_path(&self) -> PathBuf {
        self.ada_dir().join("project.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.ada_dir().join("state").join("session.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.ada_dir().join("logs").join("sessions")
    }

    pub fn session_index_path(&self) -> PathBuf {
        self.ada_dir().join("logs").join("index.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.ada_dir().join("logs").join("archive")
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.ada_dir().join("alerts.json")
    }

    pub fn progress_log_path(&self) -> PathBuf {
        self.project_root.join("claude-progress.txt")
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.ada_dir().join("hooks")
    }

    fn pre_complete_hook_candidates(&self) -> [PathBuf; 3] {
        let dir = self.hooks_dir();
        [
            dir.join("pre-complete.sh"),
            dir.join("pre-complete.ps1"),
            dir.join("pre-complete.bat"),
        ]
    }

    /// The first pre-complete hook script that exists on disk, if any.
    pub fn pre_complete_hook(&self) -> Option<PathBuf> {
        self.pre_complete_hook_candidates()
            .into_iter()
            .find(|p| p.exists())
    }
}

fn env_duration_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_u64(key, default))
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Retry Policy defaults (spec §4.6).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub rate_limit_base_delay: Duration,
    pub exponential_base: f64,
    pub max_delay: Duration,
    pub jitter: f64,
    pub max_retries: u32,
}

impl RetryConfig {
    fn from_env() -> Self {
        Self {
            base_delay: env_duration_secs("ADA_HARNESS_RETRY_BASE_SECS", 5),
            rate_limit_base_delay: env_duration_secs("ADA_HARNESS_RETRY_RATE_LIMIT_BASE_SECS", 30),
            exponential_base: env_f64("ADA_HARNESS_RETRY_EXP_BASE", 2.0),
            max_delay: env_duration_secs("ADA_HARNESS_RETRY_MAX_DELAY_SECS", 300),
            jitter: env_f64("ADA_HARNESS_RETRY_JITTER", 0.10),
            max_retries: env_u64("ADA_HARNESS_RETRY_MAX_RETRIES", 3) as u32,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            rate_limit_base_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            max_delay: Duration::from_secs(300),
            jitter: 0.10,
            max_retries: 3,
        }
    }
}

/// Session Runtime defaults (spec §4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    pub stall_window: Duration,
    pub hard_timeout: Duration,
    pub handoff_context_threshold: f64,
    pub shutdown_grace_period: Duration,
    /// Model used when a feature has no `model_override` (spec §3's "chosen
    /// model" in the scheduler pseudocode).
    pub default_model: String,
}

impl SessionConfig {
    fn from_env() -> Self {
        Self {
            stall_window: env_duration_secs("ADA_HARNESS_STALL_WINDOW_SECS", 5 * 60),
            hard_timeout: env_duration_secs("ADA_HARNESS_HARD_TIMEOUT_SECS", 30 * 60),
            handoff_context_threshold: env_f64("ADA_HARNESS_HANDOFF_THRESHOLD", 0.70),
            shutdown_grace_period: env_duration_secs("ADA_HARNESS_SHUTDOWN_GRACE_SECS", 120),
            default_model: env_string("ADA_HARNESS_DEFAULT_MODEL", "default"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stall_window: Duration::from_secs(5 * 60),
            hard_timeout: Duration::from_secs(30 * 60),
            handoff_context_threshold: 0.70,
            shutdown_grace_period: Duration::from_secs(120),
            default_model: "default".to_string(),
        }
    }
}

/// One configured shell-command gate: program plus arguments, parsed from a
/// single whitespace-separated environment variable so project-local
/// verification commands don't need a TOML file of their own.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShellCommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

fn env_shell_command(key: &str) -> Option<ShellCommandSpec> {
    let raw = std::env::var(key).ok()?;
    let mut parts = raw.split_whitespace();
    let program = parts.next()?.to_string();
    let args = parts.map(|s| s.to_string()).collect();
    Some(ShellCommandSpec { program, args })
}

/// Verification Pipeline defaults (spec §4.8). Each gate command is
/// project-local configuration (spec §4.8 point 6's "project-local
/// script" idiom extended to every shell-command gate): absent from the
/// environment means the gate is simply not added to the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub coverage_threshold: f64,
    pub gate_timeout: Duration,
    pub max_captured_output_bytes: usize,
    pub lint_command: Option<ShellCommandSpec>,
    pub type_check_command: Option<ShellCommandSpec>,
    pub unit_test_command: Option<ShellCommandSpec>,
    pub e2e_command: Option<ShellCommandSpec>,
    pub e2e_filter: Option<String>,
    pub coverage_command: Option<ShellCommandSpec>,
    pub coverage_report_path: PathBuf,
    /// Whether manual approval is required for every feature, independent
    /// of `approval_feature_ids` (spec §4.8 point 7).
    pub approval_required_globally: bool,
    /// Feature ids that require manual approval even when
    /// `approval_required_globally` is false.
    pub approval_feature_ids: Vec<String>,
}

impl VerificationConfig {
    fn from_env() -> Self {
        Self {
            enabled: std::env::var("ADA_HARNESS_VERIFICATION_DISABLED").is_err(),
            coverage_threshold: env_f64("ADA_HARNESS_COVERAGE_THRESHOLD", 0.80),
            gate_timeout: env_duration_secs("ADA_HARNESS_GATE_TIMEOUT_SECS", 10 * 60),
            max_captured_output_bytes: env_u64("ADA_HARNESS_GATE_OUTPUT_CAP_BYTES", 64 * 1024)
                as usize,
            lint_command: env_shell_command("ADA_HARNESS_LINT_CMD"),
            type_check_command: env_shell_command("ADA_HARNESS_TYPE_CHECK_CMD"),
            unit_test_command: env_shell_command("ADA_HARNESS_UNIT_TEST_CMD"),
            e2e_command: env_shell_command("ADA_HARNESS_E2E_CMD"),
            e2e_filter: std::env::var("ADA_HARNESS_E2E_FILTER").ok(),
            coverage_command: env_shell_command("ADA_HARNESS_COVERAGE_CMD"),
            coverage_report_path: PathBuf::from(env_string(
                "ADA_HARNESS_COVERAGE_REPORT_PATH",
                "coverage/coverage-summary.json",
            )),
            approval_required_globally: std::env::var("ADA_HARNESS_APPROVAL_REQUIRED").is_ok(),
            approval_feature_ids: std::env::var("ADA_HARNESS_APPROVAL_FEATURE_IDS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            coverage_threshold: 0.80,
            gate_timeout: Duration::from_secs(10 * 60),
            max_captured_output_bytes: 64 * 1024,
            lint_command: None,
            type_check_command: None,
            unit_test_command: None,
            e2e_command: None,
            e2e_filter: None,
            coverage_command: None,
            coverage_report_path: PathBuf::from("coverage/coverage-summary.json"),
            approval_required_globally: false,
            approval_feature_ids: Vec::new(),
        }
    }
}

/// Session Logger defaults (spec §4.9).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub archive_size_cap_bytes: u64,
}

impl LoggingConfig {
    fn from_env() -> Self {
        Self {
            archive_size_cap_bytes: env_u64("ADA_HARNESS_LOG_ARCHIVE_CAP_BYTES", 100 * 1024 * 1024),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            archive_size_cap_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Telemetry API defaults (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub bind_addr: String,
    pub push_ping_interval: Duration,
    pub idle_client_deadline: Duration,
}

impl TelemetryConfig {
    fn from_env() -> Self {
        Self {
            bind_addr: env_string("ADA_HARNESS_BIND_ADDR", "127.0.0.1:4170"),
            push_ping_interval: env_duration_secs("ADA_HARNESS_PUSH_PING_SECS", 30),
            idle_client_deadline: env_duration_secs("ADA_HARNESS_IDLE_CLIENT_SECS", 120),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4170".to_string(),
            push_ping_interval: Duration::from_secs(30),
            idle_client_deadline: Duration::from_secs(120),
        }
    }
}

/// Alert Store defaults (spec §3, §7).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AlertConfig {
    pub dedup_window: Duration,
}

impl AlertConfig {
    fn from_env() -> Self {
        Self {
            dedup_window: env_duration_secs("ADA_HARNESS_ALERT_DEDUP_WINDOW_SECS", 60),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(60),
        }
    }
}

/// Preflight check defaults (spec §4.11: "verify VCS is clean-or-accepted-
/// dirty, the agent binary/transport is reachable, the backlog loads,
/// sufficient disk is free").
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PreflightConfig {
    pub allow_dirty_worktree: bool,
    pub min_disk_free_bytes: u64,
    /// Whether a startup checkpoint is resumed automatically rather than
    /// interactively confirmed (spec §4.7: "offers (interactive) or
    /// chooses (headless flag)").
    pub headless: bool,
}

impl PreflightConfig {
    fn from_env() -> Self {
        Self {
            allow_dirty_worktree: std::env::var("ADA_HARNESS_ALLOW_DIRTY_WORKTREE").is_ok(),
            min_disk_free_bytes: env_u64("ADA_HARNESS_MIN_DISK_FREE_BYTES", 500 * 1024 * 1024),
            headless: std::env::var("ADA_HARNESS_HEADLESS").is_ok(),
        }
    }
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            allow_dirty_worktree: false,
            min_disk_free_bytes: 500 * 1024 * 1024,
            headless: false,
        }
    }
}

/// Ensure the `.ada/` directory tree exists under `root`.
pub async fn ensure_ada_tree(root: &Path) -> std::io::Result<()> {
    let ada = root.join(".ada");
    for sub in ["state", "logs/sessions", "logs/archive", "hooks"] {
        tokio::fs::create_dir_all(ada.join(sub)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_nest_under_ada() {
        let cfg = HarnessConfig {
            project_root: PathBuf::from("/tmp/proj"),
            retry: RetryConfig::default(),
            session: SessionConfig::default(),
            verification: VerificationConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
            alerts: AlertConfig::default(),
            preflight: PreflightConfig::default(),
        };
        assert_eq!(cfg.backlog_path(), PathBuf::from("/tmp/proj/feature-list.json"));
        assert_eq!(
            cfg.checkpoint_path(),
            PathBuf::from("/tmp/proj/.ada/state/session.json")
        );
        assert_eq!(
            cfg.archive_dir(),
            PathBuf::from("/tmp/proj/.ada/logs/archive")
        );
    }

    #[test]
    fn retry_defaults_match_spec() {
        let r = RetryConfig::default();
        assert_eq!(r.base_delay, Duration::from_secs(5));
        assert_eq!(r.max_retries, 3);
        assert_eq!(r.max_delay, Duration::from_secs(300));
    }
}
