//! Verification Pipeline (C8): ordered gates run before a feature is
//! accepted as `completed` (spec §4.8). Each gate is independently
//! optional by configuration; the first failing gate aborts the pipeline
//! and the feature stays `in_progress` for another attempt.

mod coverage;
mod gates;

pub use coverage::{parse_coverage_report, CoverageReport};
pub use gates::{
    CoverageGate, E2eTestGate, LintGate, ManualApprovalGate, ManualApprover, PreCompleteHookGate,
    ShellCommandGate, TypeCheckGate, UnitTestGate,
};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::config::VerificationConfig;
use crate::types::FeatureCategory;

#[derive(Debug, Error, Diagnostic)]
pub enum VerificationError {
    #[error("gate `{gate}` failed (exit {exit_code:?}):\n{stderr_tail}")]
    #[diagnostic(code(verification::gate_failed))]
    GateFailed {
        gate: String,
        exit_code: Option<i32>,
        stdout_tail: String,
        stderr_tail: String,
    },

    #[error("gate `{0}` exceeded its timeout")]
    #[diagnostic(code(verification::timeout))]
    Timeout(String),

    #[error("gate `{0}` could not be spawned: {1}")]
    #[diagnostic(code(verification::spawn))]
    Spawn(String, #[source] std::io::Error),

    #[error("coverage report at {0} is not in a recognized shape")]
    #[diagnostic(
        code(verification::coverage_unparseable),
        help("expected a root-level {{total, percent}} object or a total.lines.pct path")
    )]
    CoverageUnparseable(PathBuf),

    #[error("coverage report not found at {0}")]
    #[diagnostic(code(verification::coverage_missing))]
    CoverageMissing(PathBuf),

    #[error("manual approval was withheld for `{0}`")]
    #[diagnostic(code(verification::approval_withheld))]
    ApprovalWithheld(String),
}

/// Everything a gate needs to know about the feature it's verifying and
/// the project it runs in.
#[derive(Clone, Debug)]
pub struct GateContext {
    pub project_root: PathBuf,
    pub feature_id: String,
    pub feature_name: String,
    pub feature_category: FeatureCategory,
    pub max_captured_output_bytes: usize,
}

/// Captured output from a gate run, truncated to `max_captured_output_bytes`
/// (spec §4.8: "captured output... truncated to a bounded size").
#[derive(Clone, Debug, Default)]
pub struct GateOutput {
    pub stdout_tail: String,
    pub stderr_tail: String,
}

pub fn truncate_tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let start = s.len() - max_bytes;
    let boundary = (start..s.len())
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(start);
    format!("...{}", &s[boundary..])
}

/// One step of the verification pipeline. Gates that are disabled by
/// configuration are simply not added to the pipeline rather than being
/// called with a no-op implementation.
#[async_trait]
pub trait VerificationGate: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, ctx: &GateContext) -> Result<GateOutput, VerificationError>;
}

/// Runs its gates in order, aborting on the first failure (spec §4.8:
/// "any gate's failure aborts the pipeline").
pub struct VerificationPipeline {
    gates: Vec<Box<dyn VerificationGate>>,
    gate_timeout: Duration,
}

impl VerificationPipeline {
    pub fn new(config: &VerificationConfig) -> Self {
        Self {
            gates: Vec::new(),
            gate_timeout: config.gate_timeout,
        }
    }

    pub fn with_gate(mut self, gate: Box<dyn VerificationGate>) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn gate_names(&self) -> Vec<&str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Run every configured gate in order. Returns the name of the gate
    /// that failed (if any) alongside the underlying error; `Ok(())` means
    /// every gate passed.
    pub async fn run(&self, ctx: &GateContext) -> Result<(), VerificationError> {
        for gate in &self.gates {
            let outcome = tokio::time::timeout(self.gate_timeout, gate.run(ctx)).await;
            match outcome {
                Ok(Ok(_output)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => return Err(VerificationError::Timeout(gate.name().to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysPass;

    #[async_trait]
    impl VerificationGate for AlwaysPass {
        fn name(&self) -> &str {
            "always_pass"
        }
        async fn run(&self, _ctx: &GateContext) -> Result<GateOutput, VerificationError> {
            Ok(GateOutput::default())
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl VerificationGate for AlwaysFail {
        fn name(&self) -> &str {
            "always_fail"
        }
        async fn run(&self, _ctx: &GateContext) -> Result<GateOutput, VerificationError> {
            Err(VerificationError::GateFailed {
                gate: "always_fail".into(),
                exit_code: Some(1),
                stdout_tail: String::new(),
                stderr_tail: "boom".into(),
            })
        }
    }

    fn ctx() -> GateContext {
        GateContext {
            project_root: PathBuf::from("/tmp/proj"),
            feature_id: "f1".into(),
            feature_name: "Feature one".into(),
            feature_category: FeatureCategory::Functional,
            max_captured_output_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn all_gates_passing_succeeds() {
        let cfg = VerificationConfig {
            gate_timeout: Duration::from_secs(5),
            max_captured_output_bytes: 1024,
            ..VerificationConfig::default()
        };
        let pipeline = VerificationPipeline::new(&cfg)
            .with_gate(Box::new(AlwaysPass))
            .with_gate(Box::new(AlwaysPass));
        assert!(pipeline.run(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn first_failure_aborts_pipeline() {
        let cfg = VerificationConfig {
            gate_timeout: Duration::from_secs(5),
            max_captured_output_bytes: 1024,
            ..VerificationConfig::default()
        };
        let pipeline = VerificationPipeline::new(&cfg)
            .with_gate(Box::new(AlwaysFail))
            .with_gate(Box::new(AlwaysPass));
        let err = pipeline.run(&ctx()).await.unwrap_err();
        assert!(matches!(err, VerificationError::GateFailed { gate, .. } if gate == "always_fail"));
    }

    #[test]
    fn truncate_tail_keeps_suffix() {
        let long = "a".repeat(100);
        let truncated = truncate_tail(&long, 10);
        assert!(truncated.starts_with("..."));
        assert_eq!(truncated.len(), 13);
    }

    #[test]
    fn truncate_tail_passes_through_short_strings() {
        assert_eq!(truncate_tail("short", 10), "short");
    }
}
