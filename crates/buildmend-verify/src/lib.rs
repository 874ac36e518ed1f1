//! Buildmend verification & self-heal execution
//!
//! Drives a repository's planned build/test/start commands and mends the repo
//! until it is green:
//! - `CommandRunner`: one shell command, bounded by a timeout, fully captured
//! - `EnvironmentProbe`: container runtime availability (with CI override)
//! - `Verifier`: runs the plan's command groups, persists evidence, builds a report
//! - `RepairAgent`: the external repair collaborator seam
//! - `HealController`: the bounded verify, judge, repair loop

pub mod heal;
pub mod probe;
pub mod repair;
pub mod runner;
pub mod verifier;

// Re-export key types
pub use heal::{CommandSource, HealController, PlanFileSource};
pub use probe::EnvironmentProbe;
pub use repair::{CliRepairAgent, RepairAgent};
pub use runner::CommandRunner;
pub use verifier::{verify_dir, Verifier};
