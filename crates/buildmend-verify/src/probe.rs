//! Container runtime availability probe.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::runner::CommandRunner;

/// Env flag forcing the probe to report the runtime available
/// (e.g. in CI where daemon probing is unreliable).
pub const ASSUME_DOCKER_ENV: &str = "BUILDMEND_ASSUME_DOCKER";

const DAEMON_PROBE_COMMAND: &str = "docker info --format {{.ServerVersion}}";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Decides whether the container runtime is usable: CLI binary present AND
/// daemon reachable. Probed once per verification pass; the result is cached
/// in the report so every compose-gated command in a pass sees the same
/// answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentProbe {
    forced: Option<bool>,
}

impl EnvironmentProbe {
    /// Probe honoring the `BUILDMEND_ASSUME_DOCKER` override.
    pub fn from_env() -> Self {
        Self {
            forced: parse_override(std::env::var(ASSUME_DOCKER_ENV).ok().as_deref()),
        }
    }

    /// Probe with a fixed answer, for callers with prior knowledge and tests.
    pub fn forced(available: bool) -> Self {
        Self {
            forced: Some(available),
        }
    }

    /// True iff the docker CLI resolves on PATH and the daemon answers a
    /// status query within 10 seconds. Probe failures of any kind are
    /// "unavailable", never propagated.
    pub async fn container_runtime_available(&self) -> bool {
        if let Some(forced) = self.forced {
            return forced;
        }

        if which::which("docker").is_err() {
            debug!("docker CLI not found on PATH");
            return false;
        }

        match CommandRunner::run(DAEMON_PROBE_COMMAND, Path::new("."), PROBE_TIMEOUT).await {
            Ok(record) => record.passed(),
            Err(e) => {
                debug!(error = %e, "Runtime probe failed");
                false
            }
        }
    }
}

/// Only an explicit `1` forces availability; anything else falls through to
/// the real probe.
fn parse_override(value: Option<&str>) -> Option<bool> {
    match value {
        Some("1") => Some(true),
        _ => None,
    }
}
