//! Build plan schema and command groups.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BuildmendError, Result};

/// One of the named verification purposes a command can serve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandGroup {
    Build,
    Test,
    Start,
}

impl CommandGroup {
    /// All groups in verification order.
    pub const ALL: [CommandGroup; 3] = [CommandGroup::Build, CommandGroup::Test, CommandGroup::Start];

    /// Group tag as used in log file names and report keys.
    pub fn name(&self) -> &'static str {
        match self {
            CommandGroup::Build => "build",
            CommandGroup::Test => "test",
            CommandGroup::Start => "start",
        }
    }
}

/// Ordered candidate command strings per group.
///
/// Only the first candidate of each group is executed per verification pass.
/// This is policy, not a limitation: the full lists are persisted in the plan
/// and the report so a repair agent can reorder candidates between iterations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandGroups {
    #[serde(default)]
    pub build: Vec<String>,

    #[serde(default)]
    pub test: Vec<String>,

    #[serde(default)]
    pub start: Vec<String>,
}

impl CommandGroups {
    /// Candidate commands for a group, in priority order.
    pub fn candidates(&self, group: CommandGroup) -> &[String] {
        match group {
            CommandGroup::Build => &self.build,
            CommandGroup::Test => &self.test,
            CommandGroup::Start => &self.start,
        }
    }

    /// The single candidate that will be exercised for a group this pass.
    pub fn first(&self, group: CommandGroup) -> Option<&str> {
        self.candidates(group).first().map(String::as_str)
    }

    /// Fallback commands used when no plan file exists: drive the
    /// generated `Makefile.build` targets directly.
    pub fn default_make() -> Self {
        Self {
            build: vec!["make -f Makefile.build build".to_string()],
            test: vec!["make -f Makefile.build test".to_string()],
            start: vec!["make -f Makefile.build start".to_string()],
        }
    }
}

/// Whether a command string drives the container-compose toolchain.
///
/// Compose-referencing commands are probe-gated by the verifier and, when the
/// runtime is available, hold the `start` group to the convergence bar.
pub fn references_compose(command: &str) -> bool {
    command.contains("docker compose")
}

fn default_plan_version() -> String {
    "1".to_string()
}

/// On-disk plan file written by the plan synthesizer
/// (`.buildmend/plan.json`).
///
/// Only `version` and `commands` matter to verification; any extra fields the
/// synthesizer records (language, compose hints, notes) are ignored on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildPlan {
    #[serde(default = "default_plan_version")]
    pub version: String,

    #[serde(default)]
    pub commands: CommandGroups,
}

impl Default for BuildPlan {
    fn default() -> Self {
        Self {
            version: default_plan_version(),
            commands: CommandGroups::default(),
        }
    }
}

impl BuildPlan {
    /// Load a plan file. A missing or unparseable plan is fatal: verification
    /// cannot proceed against commands it cannot read.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildmendError::InvalidPlan {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| BuildmendError::InvalidPlan {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}
