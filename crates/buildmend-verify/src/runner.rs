//! Shell command execution with timeouts and full output capture.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use buildmend_core::{BuildmendError, Result, RunRecord};

/// Default timeout for build/test commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(900);

/// Default timeout for start/teardown commands.
pub const START_TIMEOUT: Duration = Duration::from_secs(300);

/// Default timeout for diagnostic commands (compose ps).
pub const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(120);

/// Executes a single shell command and reports the outcome as data.
///
/// Plan commands are arbitrary strings, so execution goes through a shell in
/// a controlled working directory. Command failure and timeout are recorded,
/// never raised; the only error is an unspawnable process, which means the
/// execution environment itself is broken.
pub struct CommandRunner;

impl CommandRunner {
    /// Run `command` through `sh -c` in `working_dir`, bounded by `timeout`.
    ///
    /// On timeout the child is killed and the record keeps whatever output
    /// was produced before the deadline, with a `TIMEOUT` marker on stderr
    /// and `return_code = None`.
    pub async fn run(command: &str, working_dir: &Path, timeout: Duration) -> Result<RunRecord> {
        debug!(command, dir = %working_dir.display(), "Running command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildmendError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // Streams are drained into buffers owned outside the timed future so
        // a timeout still keeps the partial output.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let waited = {
            let drain = async {
                let stdout_read = async {
                    if let Some(out) = stdout_pipe.as_mut() {
                        let _ = out.read_to_end(&mut stdout_buf).await;
                    }
                };
                let stderr_read = async {
                    if let Some(err) = stderr_pipe.as_mut() {
                        let _ = err.read_to_end(&mut stderr_buf).await;
                    }
                };
                tokio::join!(stdout_read, stderr_read);
                child.wait().await
            };
            tokio::time::timeout(timeout, drain).await
        };

        let stdout = String::from_utf8_lossy(&stdout_buf).to_string();
        let stderr = String::from_utf8_lossy(&stderr_buf).to_string();

        match waited {
            Ok(status) => {
                let status = status?;
                Ok(RunRecord::completed(command, status.code(), stdout, stderr))
            }
            Err(_elapsed) => {
                debug!(command, timeout_secs = timeout.as_secs(), "Command timed out");
                let _ = child.kill().await;
                Ok(RunRecord::timed_out(command, stdout, stderr))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout_and_exit_code() {
        let record = CommandRunner::run("echo hello", Path::new("."), COMMAND_TIMEOUT)
            .await
            .expect("run failed");
        assert_eq!(record.return_code, Some(0));
        assert!(record.stdout.contains("hello"));
        assert!(!record.skipped);
        assert!(record.passed());
    }

    #[tokio::test]
    async fn test_run_captures_nonzero_exit() {
        let record = CommandRunner::run("echo oops >&2; exit 3", Path::new("."), COMMAND_TIMEOUT)
            .await
            .expect("run failed");
        assert_eq!(record.return_code, Some(3));
        assert!(record.stderr.contains("oops"));
        assert!(record.failed());
    }

    #[tokio::test]
    async fn test_run_timeout_keeps_partial_output() {
        let record = CommandRunner::run(
            "echo started; sleep 30",
            Path::new("."),
            Duration::from_millis(800),
        )
        .await
        .expect("run failed");
        assert_eq!(record.return_code, None);
        assert!(!record.skipped);
        assert!(record.stderr.ends_with("TIMEOUT"));
        assert!(record.stdout.contains("started"), "partial stdout lost");
    }

    #[tokio::test]
    async fn test_run_spawn_failure_is_fatal() {
        let err = CommandRunner::run(
            "echo hi",
            Path::new("/nonexistent/working/dir"),
            COMMAND_TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BuildmendError::Spawn { .. }));
    }
}
