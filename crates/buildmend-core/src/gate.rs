//! Convergence gate over a verification report.
//!
//! Decides whether a pass left the repository "green". Pure evaluation: no
//! IO, no retries, just the report.

use serde::{Deserialize, Serialize};

use crate::plan::{references_compose, CommandGroup};
use crate::report::VerifyReport;

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Evaluate the convergence rule against a report.
///
/// Rule:
/// - `build` and `test` must each have `failed == 0`, `passed >= 1`, and
///   `total >= 1` — a group that never executed anything is not green.
/// - `start` is held to `failed == 0 && passed >= 1` only when the container
///   runtime was available AND a `start` record references the compose
///   toolchain; otherwise it is best-effort and ignored.
pub fn evaluate_convergence(report: &VerifyReport) -> GateVerdict {
    let mut violations = Vec::new();

    for group in [CommandGroup::Build, CommandGroup::Test] {
        let summary = report.summary_for(group);
        if summary.failed > 0 {
            violations.push(format!("{}: {} command(s) failed", group.name(), summary.failed));
        }
        if summary.total < 1 {
            violations.push(format!("{}: no commands were attempted", group.name()));
        } else if summary.passed < 1 {
            violations.push(format!("{}: no command passed", group.name()));
        }
    }

    let compose_start = report
        .start
        .iter()
        .any(|record| references_compose(&record.command));
    if report.env.docker_available && compose_start {
        let summary = &report.summary.start;
        if summary.failed > 0 {
            violations.push(format!("start: {} command(s) failed", summary.failed));
        }
        if summary.passed < 1 {
            violations.push("start: compose up was exercised but did not pass".to_string());
        }
    }

    let passed = violations.is_empty();
    let message = if passed {
        "All required groups passed".to_string()
    } else {
        format!("Not green: {} violation(s)", violations.len())
    };

    GateVerdict {
        passed,
        violations,
        message,
    }
}

/// Whether a report satisfies the convergence rule.
pub fn is_green(report: &VerifyReport) -> bool {
    evaluate_convergence(report).passed
}
