//! External repair collaborator seam.
//!
//! The repair agent consumes the latest report (and current plan) and may
//! rewrite build artifacts and/or the plan file in place. It returns nothing
//! the controller must trust beyond "attempt completed" — truth is always
//! re-derived from the next verification pass.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use buildmend_core::{BuildPlan, BuildmendError, Result, VerifyReport};

use crate::verifier::verify_dir;

/// File handed to a CLI repair agent, overwritten per attempt.
pub const REPAIR_INPUT_FILE: &str = "repair_input.json";

const DEFAULT_REPAIR_TIMEOUT: Duration = Duration::from_secs(1800);

/// Trait for repair backends (external CLI agent, local fixer, fakes).
#[async_trait]
pub trait RepairAgent: Send + Sync {
    /// Whether the agent can be invoked at all (binary resolvable,
    /// credentials configured).
    fn is_available(&self) -> bool;

    /// Attempt one repair in `working_dir` given the latest report and the
    /// current plan. Success means only that the attempt completed.
    async fn repair(
        &self,
        working_dir: &Path,
        report: &VerifyReport,
        plan: &BuildPlan,
    ) -> Result<()>;
}

/// Payload written for the external agent: everything it needs to choose
/// fixes, including the full candidate lists it may reorder.
#[derive(Serialize)]
struct RepairInput<'a> {
    plan: &'a BuildPlan,
    verify: &'a VerifyReport,
}

/// Repair agent backed by an external binary on PATH.
///
/// The binary is invoked in the repository working directory with the report
/// payload path as its final argument; exit zero is the completion signal.
pub struct CliRepairAgent {
    binary: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl CliRepairAgent {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            timeout: DEFAULT_REPAIR_TIMEOUT,
        }
    }

    /// Arguments inserted before the payload path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RepairAgent for CliRepairAgent {
    fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    async fn repair(
        &self,
        working_dir: &Path,
        report: &VerifyReport,
        plan: &BuildPlan,
    ) -> Result<()> {
        let input_dir = verify_dir(working_dir);
        std::fs::create_dir_all(&input_dir)?;
        let input_path = input_dir.join(REPAIR_INPUT_FILE);
        let payload = RepairInput {
            plan,
            verify: report,
        };
        std::fs::write(&input_path, serde_json::to_vec_pretty(&payload)?)?;

        info!(binary = %self.binary, input = %input_path.display(), "Invoking repair agent");

        let mut invocation = Command::new(&self.binary);
        invocation
            .args(&self.extra_args)
            .arg(&input_path)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, invocation.output())
            .await
            .map_err(|_| {
                BuildmendError::Repair(format!(
                    "repair agent `{}` timed out after {}s",
                    self.binary,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                BuildmendError::Repair(format!("failed to invoke `{}`: {}", self.binary, e))
            })?;

        if output.status.success() {
            debug!(binary = %self.binary, "Repair attempt completed");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BuildmendError::Repair(format!(
                "repair agent `{}` exited with {:?}: {}",
                self.binary,
                output.status.code(),
                stderr.trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildmend_core::{CommandGroups, EnvReport};

    fn empty_report() -> VerifyReport {
        VerifyReport::new(vec![], vec![], vec![], EnvReport::default())
    }

    #[test]
    fn test_unresolvable_binary_is_unavailable() {
        let agent = CliRepairAgent::new("buildmend-no-such-repair-agent");
        assert!(!agent.is_available());
    }

    #[test]
    fn test_shell_is_available() {
        // `sh` exists everywhere the verifier can run at all.
        let agent = CliRepairAgent::new("sh");
        assert!(agent.is_available());
    }

    #[tokio::test]
    async fn test_repair_success_on_exit_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let agent = CliRepairAgent::new("true");
        let plan = BuildPlan {
            version: "1".to_string(),
            commands: CommandGroups::default_make(),
        };
        agent
            .repair(dir.path(), &empty_report(), &plan)
            .await
            .expect("repair should succeed");

        // Payload was handed over on disk.
        let input = verify_dir(dir.path()).join(REPAIR_INPUT_FILE);
        let text = std::fs::read_to_string(input).expect("payload written");
        assert!(text.contains("\"plan\""));
        assert!(text.contains("\"verify\""));
    }

    #[tokio::test]
    async fn test_repair_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let agent = CliRepairAgent::new("false");
        let plan = BuildPlan::default();
        let err = agent
            .repair(dir.path(), &empty_report(), &plan)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildmendError::Repair(_)));
    }
}
