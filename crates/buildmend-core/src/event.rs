//! Heal loop lifecycle events.
//!
//! Events are notifications for an injected observer; the loop's correctness
//! does not depend on any observer being present. Payloads are bounded so
//! observers never receive full command output.

use serde::{Deserialize, Serialize};

use crate::plan::CommandGroup;
use crate::report::{GroupSummary, VerifyReport};

/// Max failing records sampled per group in iteration diagnostics.
pub const MAX_FAILING_SAMPLES: usize = 2;

/// Max stderr characters carried per failing sample.
pub const STDERR_TAIL_CHARS: usize = 400;

/// Max characters of a repair error surfaced to observers.
const REPAIR_ERROR_CHARS: usize = 200;

/// A failing record, reduced to what a repair operator needs to see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailingSample {
    pub command: String,
    pub stderr_tail: String,
}

/// Summary plus representative failures for one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupDiagnostics {
    pub summary: GroupSummary,
    pub failing: Vec<FailingSample>,
}

/// Diagnostic payload attached to `heal_iteration_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IterationDiagnostics {
    pub build: GroupDiagnostics,
    pub test: GroupDiagnostics,
    pub start: GroupDiagnostics,
}

impl IterationDiagnostics {
    /// Extract bounded diagnostics from the latest report.
    pub fn from_report(report: &VerifyReport) -> Self {
        let collect = |group: CommandGroup| {
            let failing = report
                .records(group)
                .iter()
                .filter(|r| r.failed())
                .take(MAX_FAILING_SAMPLES)
                .map(|r| FailingSample {
                    command: r.command.clone(),
                    stderr_tail: r.stderr_tail(STDERR_TAIL_CHARS),
                })
                .collect();
            GroupDiagnostics {
                summary: *report.summary_for(group),
                failing,
            }
        };

        Self {
            build: collect(CommandGroup::Build),
            test: collect(CommandGroup::Test),
            start: collect(CommandGroup::Start),
        }
    }

    /// Diagnostics for one group.
    pub fn group(&self, group: CommandGroup) -> &GroupDiagnostics {
        match group {
            CommandGroup::Build => &self.build,
            CommandGroup::Test => &self.test,
            CommandGroup::Start => &self.start,
        }
    }
}

/// Lifecycle notification emitted by the heal controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealEvent {
    /// Initial verification pass is starting (iteration 0).
    VerifyInitial,

    /// A heal iteration begins; carries bounded failure diagnostics.
    HealIterationStart {
        iteration: u32,
        diagnostics: IterationDiagnostics,
    },

    /// Repair attempt completed; re-verification follows.
    HealIterationDone { iteration: u32 },

    /// No repair agent is configured/resolvable; the loop terminates.
    HealNoRepairAgent,

    /// The repair invocation itself failed; the loop terminates.
    HealRepairError { message: String },
}

impl HealEvent {
    /// Build a `heal_repair_error` event with a truncated message.
    pub fn repair_error(message: impl AsRef<str>) -> Self {
        let message = message.as_ref();
        let truncated: String = message.chars().take(REPAIR_ERROR_CHARS).collect();
        HealEvent::HealRepairError { message: truncated }
    }

    /// Event kind tag, matching the serialized `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            HealEvent::VerifyInitial => "verify_initial",
            HealEvent::HealIterationStart { .. } => "heal_iteration_start",
            HealEvent::HealIterationDone { .. } => "heal_iteration_done",
            HealEvent::HealNoRepairAgent => "heal_no_repair_agent",
            HealEvent::HealRepairError { .. } => "heal_repair_error",
        }
    }
}
