//! Verification pass orchestration and evidence persistence.
//!
//! Runs a bounded subset of each command group, classifies every attempt as
//! passed/failed/skipped, writes per-run logs plus the report artifact, and
//! returns the structured [`VerifyReport`]. The verifier itself only fails
//! when the execution environment is broken (unspawnable shell, unwritable
//! logs directory); command outcomes are always data.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use buildmend_core::plan::references_compose;
use buildmend_core::{
    write_report_artifact, CommandGroup, CommandGroups, EnvReport, Result, RunRecord, SkipReason,
    VerifyReport, STATE_DIR,
};

use crate::probe::EnvironmentProbe;
use crate::runner::{CommandRunner, COMMAND_TIMEOUT, DIAGNOSTIC_TIMEOUT, START_TIMEOUT};

/// Compose file assumed when the exercised up command names none.
const DEFAULT_COMPOSE_FILE: &str = "compose.buildmend.yaml";

/// Max characters of the sanitized command kept in a log file name.
const LOG_NAME_COMMAND_CHARS: usize = 60;

/// Logs directory for a repository: `<repo>/.buildmend/verify`.
pub fn verify_dir(working_dir: &Path) -> PathBuf {
    working_dir.join(STATE_DIR).join("verify")
}

/// Executes one verification pass over the plan's command groups.
pub struct Verifier {
    probe: EnvironmentProbe,
    command_timeout: Duration,
    start_timeout: Duration,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    /// Verifier with environment-derived probe and default timeouts.
    pub fn new() -> Self {
        Self {
            probe: EnvironmentProbe::from_env(),
            command_timeout: COMMAND_TIMEOUT,
            start_timeout: START_TIMEOUT,
        }
    }

    /// Replace the runtime probe (tests, callers with prior knowledge).
    pub fn with_probe(mut self, probe: EnvironmentProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Override the build/test command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Override the start/teardown timeout.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Run one pass: at most the first candidate of each group, compose
    /// commands gated on the runtime probe, `start` exercised only in its
    /// detached compose-up shape. Evidence lands under
    /// `<repo>/.buildmend/verify/`.
    pub async fn verify(
        &self,
        commands: &CommandGroups,
        working_dir: &Path,
    ) -> Result<VerifyReport> {
        let docker_available = self.probe.container_runtime_available().await;
        let logs_dir = verify_dir(working_dir);
        std::fs::create_dir_all(&logs_dir)?;

        info!(
            dir = %working_dir.display(),
            docker_available,
            "Starting verification pass"
        );

        let build = self
            .run_gated(commands, CommandGroup::Build, working_dir, &logs_dir, docker_available)
            .await?;
        let test = self
            .run_gated(commands, CommandGroup::Test, working_dir, &logs_dir, docker_available)
            .await?;
        let start = self
            .run_start(commands, working_dir, &logs_dir, docker_available)
            .await?;

        let report = VerifyReport::new(build, test, start, EnvReport { docker_available });
        write_report_artifact(&report, &logs_dir)?;

        info!(
            build_passed = report.summary.build.passed,
            build_failed = report.summary.build.failed,
            test_passed = report.summary.test.passed,
            test_failed = report.summary.test.failed,
            "Verification pass complete"
        );

        Ok(report)
    }

    /// Build/test policy: first candidate only, compose commands skipped
    /// when the runtime is unavailable.
    async fn run_gated(
        &self,
        commands: &CommandGroups,
        group: CommandGroup,
        working_dir: &Path,
        logs_dir: &Path,
        docker_available: bool,
    ) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();

        if let Some(command) = commands.first(group) {
            let record = if references_compose(command) && !docker_available {
                RunRecord::skip(command, SkipReason::DockerMissing, "docker not available")
            } else {
                CommandRunner::run(command, working_dir, self.command_timeout).await?
            };
            persist_record(logs_dir, group, &record)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Start policy: only the detached compose-up shape is exercised.
    /// The sequence is up, then a `ps` capture for diagnostics, then a
    /// best-effort teardown that is never recorded as a verification target.
    async fn run_start(
        &self,
        commands: &CommandGroups,
        working_dir: &Path,
        logs_dir: &Path,
        docker_available: bool,
    ) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();

        if let Some(command) = commands.first(CommandGroup::Start) {
            if is_detached_compose_up(command) {
                if !docker_available {
                    let record =
                        RunRecord::skip(command, SkipReason::DockerMissing, "docker not available");
                    persist_record(logs_dir, CommandGroup::Start, &record)?;
                    records.push(record);
                } else {
                    let compose_file =
                        compose_file_arg(command).unwrap_or_else(|| DEFAULT_COMPOSE_FILE.to_string());

                    let up = CommandRunner::run(command, working_dir, self.start_timeout).await?;
                    persist_record(logs_dir, CommandGroup::Start, &up)?;
                    records.push(up);

                    let ps_command = format!("docker compose -f {} ps", compose_file);
                    let ps =
                        CommandRunner::run(&ps_command, working_dir, DIAGNOSTIC_TIMEOUT).await?;
                    persist_record(logs_dir, CommandGroup::Start, &ps)?;
                    records.push(ps);

                    // Teardown always runs; cleanup failures are not verification
                    // failures and spawn errors here must not sink the pass.
                    let down_command = format!("docker compose -f {} down", compose_file);
                    if let Err(e) =
                        CommandRunner::run(&down_command, working_dir, self.start_timeout).await
                    {
                        debug!(error = %e, "Teardown failed");
                    }
                }
            } else {
                let record = RunRecord::skip(
                    command,
                    SkipReason::Unsupported,
                    "unsupported start verification",
                );
                persist_record(logs_dir, CommandGroup::Start, &record)?;
                records.push(record);
            }
        }

        Ok(records)
    }
}

/// Whether a start command matches the "bring up in background" shape the
/// verifier knows how to exercise and tear down.
fn is_detached_compose_up(command: &str) -> bool {
    references_compose(command) && command.contains("up -d")
}

/// Compose file named by the up command's `-f` argument, if any.
fn compose_file_arg(command: &str) -> Option<String> {
    let mut tokens = command.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "-f" || token == "--file" {
            return tokens.next().map(str::to_string);
        }
    }
    None
}

/// Write `<group>_<sanitized command>.out.log` / `.err.log`. Names are
/// deterministic so repeated passes overwrite instead of accumulating.
fn persist_record(logs_dir: &Path, group: CommandGroup, record: &RunRecord) -> Result<()> {
    let safe = sanitize_log_name(group, &record.command);
    std::fs::write(logs_dir.join(format!("{}.out.log", safe)), &record.stdout)?;
    std::fs::write(logs_dir.join(format!("{}.err.log", safe)), &record.stderr)?;
    Ok(())
}

fn sanitize_log_name(group: CommandGroup, command: &str) -> String {
    let mut safe: String = command
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    safe.truncate(LOG_NAME_COMMAND_CHARS);
    format!("{}_{}", group.name(), safe)
}
