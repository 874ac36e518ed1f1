//! Verification report schema and artifact persistence.
//!
//! One `VerifyReport` is produced per verification pass and is immutable once
//! returned. Persistence is a side effect: the report is written as a JSON
//! artifact with a digest sidecar so external tooling can detect corruption.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BuildmendError, Result};
use crate::plan::CommandGroup;

/// File name of the persisted report artifact, overwritten each pass.
pub const REPORT_FILE: &str = "verify_report.json";

/// File name of the report digest sidecar.
pub const REPORT_DIGEST_FILE: &str = "verify_report.digest";

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// Why a command was recorded without being executed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Command references the container-compose toolchain and the runtime
    /// probe reported it unavailable.
    DockerMissing,

    /// Start command does not match the detached compose-up shape; arbitrary
    /// long-running commands cannot be verified synchronously.
    Unsupported,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::DockerMissing => "docker_missing",
            SkipReason::Unsupported => "unsupported",
        }
    }
}

/// Outcome of one attempted command.
///
/// Invariant: `skipped == true` implies `return_code == None`.
/// `return_code == None` with `skipped == false` means the process did not
/// terminate normally (timeout or signal death).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    /// The command string as supplied by the plan.
    pub command: String,

    /// Real exit code on normal termination, `None` otherwise.
    pub return_code: Option<i32>,

    /// Captured stdout (full text; tails go in diagnostics payloads).
    pub stdout: String,

    /// Captured stderr. Suffixed with a `TIMEOUT` marker when the command
    /// exceeded its deadline.
    pub stderr: String,

    /// Whether the command was recorded without execution.
    pub skipped: bool,

    /// Skip reason; present iff `skipped`.
    pub reason: Option<SkipReason>,
}

impl RunRecord {
    /// Record for a command that ran to termination.
    pub fn completed(
        command: impl Into<String>,
        return_code: Option<i32>,
        stdout: String,
        stderr: String,
    ) -> Self {
        Self {
            command: command.into(),
            return_code,
            stdout,
            stderr,
            skipped: false,
            reason: None,
        }
    }

    /// Record for a command killed at its deadline. Partial output captured
    /// up to the timeout is retained and stderr gains the marker.
    pub fn timed_out(command: impl Into<String>, stdout: String, mut stderr: String) -> Self {
        stderr.push_str("\nTIMEOUT");
        Self {
            command: command.into(),
            return_code: None,
            stdout,
            stderr,
            skipped: false,
            reason: None,
        }
    }

    /// Record for a command that was not executed.
    pub fn skip(command: impl Into<String>, reason: SkipReason, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            return_code: None,
            stdout: String::new(),
            stderr: stderr.into(),
            skipped: true,
            reason: Some(reason),
        }
    }

    /// Executed and exited zero.
    pub fn passed(&self) -> bool {
        !self.skipped && self.return_code == Some(0)
    }

    /// Executed and did not exit zero. Timeouts (`return_code == None`,
    /// not skipped) count as failed: a hung command must never converge.
    pub fn failed(&self) -> bool {
        !self.skipped && self.return_code != Some(0)
    }

    /// Last `max_chars` characters of stderr, for bounded diagnostics.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        tail_chars(&self.stderr, max_chars)
    }
}

/// Last `max_chars` characters of a string, char-boundary safe.
fn tail_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else {
        s.chars().skip(count - max_chars).collect()
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Pass/fail/skip counts for one group's records.
///
/// Invariant: `passed + failed + skipped == total`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

impl GroupSummary {
    /// Derive counts from a group's records.
    pub fn from_records(records: &[RunRecord]) -> Self {
        let passed = records.iter().filter(|r| r.passed()).count();
        let failed = records.iter().filter(|r| r.failed()).count();
        let skipped = records.iter().filter(|r| r.skipped).count();
        Self {
            passed,
            failed,
            skipped,
            total: records.len(),
        }
    }
}

/// Per-group summaries of one verification pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub build: GroupSummary,
    pub test: GroupSummary,
    pub start: GroupSummary,
}

/// Environment facts probed once per verification pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvReport {
    /// Container CLI present and daemon reachable (or operator-forced).
    pub docker_available: bool,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Full outcome of one verification pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyReport {
    pub build: Vec<RunRecord>,
    pub test: Vec<RunRecord>,
    pub start: Vec<RunRecord>,
    pub env: EnvReport,
    pub summary: ReportSummary,

    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}

impl VerifyReport {
    /// Assemble a report, deriving the per-group summaries.
    pub fn new(
        build: Vec<RunRecord>,
        test: Vec<RunRecord>,
        start: Vec<RunRecord>,
        env: EnvReport,
    ) -> Self {
        let summary = ReportSummary {
            build: GroupSummary::from_records(&build),
            test: GroupSummary::from_records(&test),
            start: GroupSummary::from_records(&start),
        };
        Self {
            build,
            test,
            start,
            env,
            summary,
            generated_at: Utc::now(),
        }
    }

    /// Records for one group.
    pub fn records(&self, group: CommandGroup) -> &[RunRecord] {
        match group {
            CommandGroup::Build => &self.build,
            CommandGroup::Test => &self.test,
            CommandGroup::Start => &self.start,
        }
    }

    /// Summary for one group.
    pub fn summary_for(&self, group: CommandGroup) -> &GroupSummary {
        match group {
            CommandGroup::Build => &self.summary.build,
            CommandGroup::Test => &self.summary.test,
            CommandGroup::Start => &self.summary.start,
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact persistence
// ---------------------------------------------------------------------------

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Persist `<dir>/verify_report.json` and `<dir>/verify_report.digest`,
/// overwriting the previous pass.
pub fn write_report_artifact(report: &VerifyReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let artifact_path = dir.join(REPORT_FILE);
    let digest_path = dir.join(REPORT_DIGEST_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    let digest = digest_hex(&json);

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(&digest_path, digest.as_bytes())?;

    tracing::debug!(path = %artifact_path.display(), "Persisted verification report");
    Ok(artifact_path)
}

/// Read and verify `<dir>/verify_report.json` integrity.
pub fn read_report_artifact(dir: &Path) -> Result<VerifyReport> {
    let artifact_path = dir.join(REPORT_FILE);
    let digest_path = dir.join(REPORT_DIGEST_FILE);

    let json = std::fs::read(&artifact_path)?;
    let digest = std::fs::read_to_string(&digest_path)?;
    let actual = digest_hex(&json);
    if digest.trim() != actual {
        return Err(BuildmendError::DigestMismatch {
            expected: digest.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
