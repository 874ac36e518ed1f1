//! The bounded verify, judge, repair loop.
//!
//! State machine: Initial -> Verified -> {Green | NeedsRepair} -> Repairing
//! -> Verified -> ... terminating in Green or after `max_iterations` repair
//! attempts. The controller never trusts a repair agent's self-report: every
//! iteration re-derives truth from a fresh verification pass.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use buildmend_core::{
    is_green, BuildPlan, CommandGroups, HealEvent, IterationDiagnostics, Result, VerifyReport,
};

use crate::repair::RepairAgent;
use crate::verifier::Verifier;

/// Default repair-iteration budget.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Supplies the current command groups for a verification pass.
///
/// Loaded fresh before every pass: a repair step may have rewritten the plan
/// in between, and the controller passes the value explicitly instead of
/// sharing mutable state with the verifier.
pub trait CommandSource: Send + Sync {
    fn load(&self) -> Result<BuildPlan>;
}

/// File-backed command source with the default-make fallback.
pub struct PlanFileSource {
    path: PathBuf,
}

impl PlanFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandSource for PlanFileSource {
    fn load(&self) -> Result<BuildPlan> {
        if self.path.exists() {
            BuildPlan::load(&self.path)
        } else {
            Ok(BuildPlan {
                version: "1".to_string(),
                commands: CommandGroups::default_make(),
            })
        }
    }
}

/// Drives verification and repair until the repo is green or the iteration
/// budget is exhausted.
pub struct HealController {
    verifier: Verifier,
    max_iterations: u32,
}

impl HealController {
    pub fn new(verifier: Verifier, max_iterations: u32) -> Self {
        Self {
            verifier,
            max_iterations,
        }
    }

    /// Run the loop. Returns the final report regardless of outcome; the
    /// caller inspects its summary (or the gate) to learn whether
    /// convergence was reached. Terminates within `max_iterations + 1`
    /// verification passes.
    ///
    /// Lifecycle events go to `observer`; pass `|_| {}` when nobody is
    /// listening.
    pub async fn heal_until_green(
        &self,
        working_dir: &Path,
        source: &dyn CommandSource,
        repair: &dyn RepairAgent,
        mut observer: impl FnMut(&HealEvent),
    ) -> Result<VerifyReport> {
        let session = Uuid::new_v4();

        observer(&HealEvent::VerifyInitial);
        let mut plan = source.load()?;
        let mut report = self.verifier.verify(&plan.commands, working_dir).await?;
        info!(session = %session, green = is_green(&report), "Initial verification complete");

        let mut iteration = 0u32;
        while iteration < self.max_iterations && !is_green(&report) {
            iteration += 1;
            observer(&HealEvent::HealIterationStart {
                iteration,
                diagnostics: IterationDiagnostics::from_report(&report),
            });

            if !repair.is_available() {
                warn!(session = %session, iteration, "No repair agent available; stopping");
                observer(&HealEvent::HealNoRepairAgent);
                break;
            }

            info!(session = %session, iteration, "Requesting repair");
            if let Err(e) = repair.repair(working_dir, &report, &plan).await {
                warn!(session = %session, iteration, error = %e, "Repair attempt failed; stopping");
                observer(&HealEvent::repair_error(e.to_string()));
                break;
            }

            observer(&HealEvent::HealIterationDone { iteration });

            // The repair step may have rewritten the plan; re-derive both the
            // commands and the truth about the repo.
            plan = source.load()?;
            report = self.verifier.verify(&plan.commands, working_dir).await?;
        }

        info!(
            session = %session,
            iterations = iteration,
            green = is_green(&report),
            "Heal loop finished"
        );
        Ok(report)
    }
}
