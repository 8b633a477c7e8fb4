//! Concrete verification gates (spec §4.8, points 1-7). Lint, type-check,
//! unit tests, and end-to-end tests are all shell commands run to
//! completion and judged by exit code, so they share one
//! [`ShellCommandGate`] implementation; coverage, the pre-complete hook,
//! and manual approval each need their own shape.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::coverage::parse_coverage_report;
use super::{truncate_tail, GateContext, GateOutput, VerificationError, VerificationGate};

/// Runs an arbitrary shell command to completion and treats a nonzero exit
/// as gate failure. Backs Lint, Type-check, Unit tests, and E2E tests
/// (spec §4.8 points 1-4), which differ only in name and the configured
/// command.
pub struct ShellCommandGate {
    name: String,
    program: String,
    args: Vec<String>,
}

impl ShellCommandGate {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    async fn run_captured(&self, ctx: &GateContext) -> Result<GateOutput, VerificationError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&ctx.project_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VerificationError::Spawn(self.name.clone(), e))?;

        let stdout_tail = truncate_tail(
            &String::from_utf8_lossy(&output.stdout),
            ctx.max_captured_output_bytes,
        );
        let stderr_tail = truncate_tail(
            &String::from_utf8_lossy(&output.stderr),
            ctx.max_captured_output_bytes,
        );

        if output.status.success() {
            Ok(GateOutput {
                stdout_tail,
                stderr_tail,
            })
        } else {
            Err(VerificationError::GateFailed {
                gate: self.name.clone(),
                exit_code: output.status.code(),
                stdout_tail,
                stderr_tail,
            })
        }
    }
}

#[async_trait]
impl VerificationGate for ShellCommandGate {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &GateContext) -> Result<GateOutput, VerificationError> {
        self.run_captured(ctx).await
    }
}

/// Convenience constructor aliases so pipeline assembly reads like spec
/// §4.8's numbered list rather than a pile of identical `ShellCommandGate`
/// calls.
pub struct LintGate;
impl LintGate {
    pub fn command(program: impl Into<String>, args: Vec<String>) -> ShellCommandGate {
        ShellCommandGate::new("lint", program, args)
    }
}

pub struct TypeCheckGate;
impl TypeCheckGate {
    pub fn command(program: impl Into<String>, args: Vec<String>) -> ShellCommandGate {
        ShellCommandGate::new("type_check", program, args)
    }
}

pub struct UnitTestGate;
impl UnitTestGate {
    pub fn command(program: impl Into<String>, args: Vec<String>) -> ShellCommandGate {
        ShellCommandGate::new("unit_tests", program, args)
    }
}

pub struct E2eTestGate;
impl E2eTestGate {
    /// `filter` is appended verbatim to `args` when configured (spec §4.8:
    /// "per-feature filter pattern if configured").
    pub fn command(program: impl Into<String>, mut args: Vec<String>, filter: Option<String>) -> ShellCommandGate {
        if let Some(filter) = filter {
            args.push(filter);
        }
        ShellCommandGate::new("e2e_tests", program, args)
    }
}

/// Runs a shell command, then parses a coverage report file and compares
/// against `threshold` (spec §4.8 point 5).
pub struct CoverageGate {
    program: String,
    args: Vec<String>,
    report_path: PathBuf,
    threshold: f64,
}

impl CoverageGate {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        report_path: impl Into<PathBuf>,
        threshold: f64,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            report_path: report_path.into(),
            threshold,
        }
    }
}

#[async_trait]
impl VerificationGate for CoverageGate {
    fn name(&self) -> &str {
        "coverage"
    }

    async fn run(&self, ctx: &GateContext) -> Result<GateOutput, VerificationError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&ctx.project_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VerificationError::Spawn("coverage".into(), e))?;

        let stdout_tail = truncate_tail(
            &String::from_utf8_lossy(&output.stdout),
            ctx.max_captured_output_bytes,
        );
        let stderr_tail = truncate_tail(
            &String::from_utf8_lossy(&output.stderr),
            ctx.max_captured_output_bytes,
        );

        if !output.status.success() {
            return Err(VerificationError::GateFailed {
                gate: "coverage".into(),
                exit_code: output.status.code(),
                stdout_tail,
                stderr_tail,
            });
        }

        let full_path = ctx.project_root.join(&self.report_path);
        let contents = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|_| VerificationError::CoverageMissing(full_path.clone()))?;
        let report = parse_coverage_report(&full_path, &contents)?;

        if report.pct / 100.0 < self.threshold {
            Err(VerificationError::GateFailed {
                gate: "coverage".into(),
                exit_code: None,
                stdout_tail: format!("coverage {:.1}% below threshold {:.1}%", report.pct, self.threshold * 100.0),
                stderr_tail,
            })
        } else {
            Ok(GateOutput {
                stdout_tail,
                stderr_tail,
            })
        }
    }
}

/// Runs the project-local pre-complete hook script, if one exists, passing
/// a fixed set of environment variables (spec §4.8 point 6).
pub struct PreCompleteHookGate {
    script: Option<PathBuf>,
}

impl PreCompleteHookGate {
    pub fn new(script: Option<PathBuf>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl VerificationGate for PreCompleteHookGate {
    fn name(&self) -> &str {
        "pre_complete_hook"
    }

    async fn run(&self, ctx: &GateContext) -> Result<GateOutput, VerificationError> {
        let Some(script) = &self.script else {
            return Ok(GateOutput::default());
        };

        let output = Command::new(script)
            .current_dir(&ctx.project_root)
            .env("PROJECT_ROOT", &ctx.project_root)
            .env("FEATURE_ID", &ctx.feature_id)
            .env("FEATURE_NAME", &ctx.feature_name)
            .env("FEATURE_CATEGORY", ctx.feature_category.to_string())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VerificationError::Spawn("pre_complete_hook".into(), e))?;

        let stdout_tail = truncate_tail(
            &String::from_utf8_lossy(&output.stdout),
            ctx.max_captured_output_bytes,
        );
        let stderr_tail = truncate_tail(
            &String::from_utf8_lossy(&output.stderr),
            ctx.max_captured_output_bytes,
        );

        if output.status.success() {
            Ok(GateOutput {
                stdout_tail,
                stderr_tail,
            })
        } else {
            Err(VerificationError::GateFailed {
                gate: "pre_complete_hook".into(),
                exit_code: output.status.code(),
                stdout_tail,
                stderr_tail,
            })
        }
    }
}

/// Narrow interface for the manual-approval gate's decision, so tests and
/// a future interactive CLI can both implement it (spec §4.8 point 7:
/// "interactive prompt or injected approver callback").
#[async_trait]
pub trait ManualApprover: Send + Sync {
    async fn approve(&self, ctx: &GateContext) -> bool;
}

/// Approver that always withholds approval; a safe default for headless
/// runs where no approver was configured.
pub struct AlwaysDeny;

#[async_trait]
impl ManualApprover for AlwaysDeny {
    async fn approve(&self, _ctx: &GateContext) -> bool {
        false
    }
}

pub struct ManualApprovalGate {
    approver: Box<dyn ManualApprover>,
}

impl ManualApprovalGate {
    pub fn new(approver: Box<dyn ManualApprover>) -> Self {
        Self { approver }
    }
}

#[async_trait]
impl VerificationGate for ManualApprovalGate {
    fn name(&self) -> &str {
        "manual_approval"
    }

    async fn run(&self, ctx: &GateContext) -> Result<GateOutput, VerificationError> {
        if self.approver.approve(ctx).await {
            Ok(GateOutput::default())
        } else {
            Err(VerificationError::ApprovalWithheld(ctx.feature_id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureCategory;
    use tempfile::tempdir;

    fn ctx(root: PathBuf) -> GateContext {
        GateContext {
            project_root: root,
            feature_id: "f1".into(),
            feature_name: "Feature one".into(),
            feature_category: FeatureCategory::Functional,
            max_captured_output_bytes: 4096,
        }
    }

    #[tokio::test]
    async fn shell_command_gate_passes_on_zero_exit() {
        let dir = tempdir().unwrap();
        let gate = ShellCommandGate::new("lint", "true", vec![]);
        assert!(gate.run(&ctx(dir.path().to_path_buf())).await.is_ok());
    }

    #[tokio::test]
    async fn shell_command_gate_fails_on_nonzero_exit() {
        let dir = tempdir().unwrap();
        let gate = ShellCommandGate::new("lint", "false", vec![]);
        let err = gate.run(&ctx(dir.path().to_path_buf())).await.unwrap_err();
        assert!(matches!(err, VerificationError::GateFailed { gate, .. } if gate == "lint"));
    }

    #[tokio::test]
    async fn pre_complete_hook_is_noop_when_unconfigured() {
        let dir = tempdir().unwrap();
        let gate = PreCompleteHookGate::new(None);
        assert!(gate.run(&ctx(dir.path().to_path_buf())).await.is_ok());
    }

    #[tokio::test]
    async fn manual_approval_fails_when_withheld() {
        let dir = tempdir().unwrap();
        let gate = ManualApprovalGate::new(Box::new(AlwaysDeny));
        let err = gate.run(&ctx(dir.path().to_path_buf())).await.unwrap_err();
        assert!(matches!(err, VerificationError::ApprovalWithheld(_)));
    }

    #[tokio::test]
    async fn coverage_gate_fails_below_threshold() {
        let dir = tempdir().unwrap();
        let report_path = dir.path().join("coverage.json");
        tokio::fs::write(&report_path, r#"{"percent": 50.0}"#)
            .await
            .unwrap();
        let gate = CoverageGate::new("true", vec![], "coverage.json", 0.80);
        let err = gate.run(&ctx(dir.path().to_path_buf())).await.unwrap_err();
        assert!(matches!(err, VerificationError::GateFailed { gate, .. } if gate == "coverage"));
    }

    #[tokio::test]
    async fn coverage_gate_passes_above_threshold() {
        let dir = tempdir().unwrap();
        let report_path = dir.path().join("coverage.json");
        tokio::fs::write(&report_path, r#"{"percent": 95.0}"#)
            .await
            .unwrap();
        let gate = CoverageGate::new("true", vec![], "coverage.json", 0.80);
        assert!(gate.run(&ctx(dir.path().to_path_buf())).await.is_ok());
    }
}
