//! Buildmend domain model
//!
//! Defines the typed schema shared by the verifier, the convergence gate,
//! and the heal controller:
//! - CommandGroups/BuildPlan: ordered candidate commands per verification purpose
//! - RunRecord/GroupSummary/VerifyReport: outcomes of one verification pass
//! - GateVerdict: the pass/fail convergence decision over a report
//! - HealEvent: lifecycle notifications emitted by the heal loop
//!
//! Reports are persisted as digest-verified JSON artifacts; everything here is
//! serializable and free of execution concerns.

pub mod error;
pub mod event;
pub mod gate;
pub mod plan;
pub mod report;
pub mod telemetry;

pub use error::{BuildmendError, Result};
pub use telemetry::init_tracing;
pub use event::{FailingSample, GroupDiagnostics, HealEvent, IterationDiagnostics};
pub use gate::{evaluate_convergence, is_green, GateVerdict};
pub use plan::{BuildPlan, CommandGroup, CommandGroups};
pub use report::{
    read_report_artifact, write_report_artifact, EnvReport, GroupSummary, ReportSummary,
    RunRecord, SkipReason, VerifyReport,
};

/// Directory under a repository root holding buildmend state
/// (plan file, verification logs, persisted reports).
pub const STATE_DIR: &str = ".buildmend";

/// Buildmend domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
