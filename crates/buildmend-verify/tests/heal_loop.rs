//! Integration tests for the heal controller with fake repair agents.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use buildmend_core::{
    is_green, BuildPlan, BuildmendError, HealEvent, Result as MendResult, VerifyReport,
};
use buildmend_verify::{
    CommandSource, EnvironmentProbe, HealController, PlanFileSource, RepairAgent, Verifier,
};

fn controller(max_iterations: u32) -> HealController {
    HealController::new(
        Verifier::new().with_probe(EnvironmentProbe::forced(false)),
        max_iterations,
    )
}

fn write_plan(path: &Path, build: &str, test: &str) {
    let plan = serde_json::json!({
        "version": "1",
        "commands": { "build": [build], "test": [test], "start": [] }
    });
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, serde_json::to_vec_pretty(&plan).expect("json")).expect("write plan");
}

fn kinds(events: &[HealEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind()).collect()
}

/// Counts how many times the plan was (re)loaded — one load per verification pass.
struct CountingSource {
    inner: PlanFileSource,
    loads: AtomicU32,
}

impl CountingSource {
    fn new(path: PathBuf) -> Self {
        Self {
            inner: PlanFileSource::new(path),
            loads: AtomicU32::new(0),
        }
    }

    fn load_count(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

impl CommandSource for CountingSource {
    fn load(&self) -> MendResult<BuildPlan> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load()
    }
}

struct UnavailableAgent;

#[async_trait]
impl RepairAgent for UnavailableAgent {
    fn is_available(&self) -> bool {
        false
    }

    async fn repair(&self, _: &Path, _: &VerifyReport, _: &BuildPlan) -> MendResult<()> {
        Ok(())
    }
}

struct NoopAgent;

#[async_trait]
impl RepairAgent for NoopAgent {
    fn is_available(&self) -> bool {
        true
    }

    async fn repair(&self, _: &Path, _: &VerifyReport, _: &BuildPlan) -> MendResult<()> {
        Ok(())
    }
}

/// Rewrites the plan file to passing commands, like a repair agent that
/// fixed the build.
struct RewritePlanAgent {
    plan_path: PathBuf,
}

#[async_trait]
impl RepairAgent for RewritePlanAgent {
    fn is_available(&self) -> bool {
        true
    }

    async fn repair(&self, _: &Path, _: &VerifyReport, _: &BuildPlan) -> MendResult<()> {
        write_plan(&self.plan_path, "echo fixed-build", "echo fixed-test");
        Ok(())
    }
}

struct ExplodingAgent;

#[async_trait]
impl RepairAgent for ExplodingAgent {
    fn is_available(&self) -> bool {
        true
    }

    async fn repair(&self, _: &Path, _: &VerifyReport, _: &BuildPlan) -> MendResult<()> {
        Err(BuildmendError::Repair("agent exploded mid-repair".to_string()))
    }
}

/// No repair agent configured: the loop announces it and returns the initial
/// report without any extra verification pass.
#[tokio::test]
async fn test_unavailable_agent_stops_loop_immediately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join(".buildmend").join("plan.json");
    write_plan(&plan_path, "exit 1", "echo t");

    let source = CountingSource::new(plan_path);
    let mut events = Vec::new();
    let report = controller(3)
        .heal_until_green(dir.path(), &source, &UnavailableAgent, |e| {
            events.push(e.clone())
        })
        .await
        .expect("heal failed");

    assert_eq!(
        kinds(&events),
        vec!["verify_initial", "heal_iteration_start", "heal_no_repair_agent"]
    );
    assert!(!is_green(&report));
    assert_eq!(report.summary.build.failed, 1);
    assert_eq!(source.load_count(), 1, "no extra verification passes");
}

/// A repair that rewrites the plan to working commands converges in one iteration.
#[tokio::test]
async fn test_rewriting_agent_converges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join(".buildmend").join("plan.json");
    write_plan(&plan_path, "exit 1", "echo t");

    let agent = RewritePlanAgent {
        plan_path: plan_path.clone(),
    };
    let source = CountingSource::new(plan_path);
    let mut events = Vec::new();
    let report = controller(3)
        .heal_until_green(dir.path(), &source, &agent, |e| events.push(e.clone()))
        .await
        .expect("heal failed");

    assert!(is_green(&report), "rewritten plan should verify green");
    assert_eq!(report.summary.build.passed, 1);
    assert_eq!(
        kinds(&events),
        vec!["verify_initial", "heal_iteration_start", "heal_iteration_done"]
    );
    assert_eq!(source.load_count(), 2, "initial pass plus one re-verify");
}

/// A repair that never helps burns the whole budget: max_iterations + 1 passes.
#[tokio::test]
async fn test_noop_agent_exhausts_budget() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join(".buildmend").join("plan.json");
    write_plan(&plan_path, "exit 1", "echo t");

    let source = CountingSource::new(plan_path);
    let mut events = Vec::new();
    let report = controller(2)
        .heal_until_green(dir.path(), &source, &NoopAgent, |e| events.push(e.clone()))
        .await
        .expect("heal failed");

    assert!(!is_green(&report));
    assert_eq!(source.load_count(), 3, "initial + 2 repair iterations");
    assert_eq!(
        kinds(&events),
        vec![
            "verify_initial",
            "heal_iteration_start",
            "heal_iteration_done",
            "heal_iteration_start",
            "heal_iteration_done",
        ]
    );
}

/// A failed repair invocation terminates the loop with a truncated error event.
#[tokio::test]
async fn test_exploding_agent_stops_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join(".buildmend").join("plan.json");
    write_plan(&plan_path, "exit 1", "echo t");

    let source = CountingSource::new(plan_path);
    let mut events = Vec::new();
    let report = controller(3)
        .heal_until_green(dir.path(), &source, &ExplodingAgent, |e| {
            events.push(e.clone())
        })
        .await
        .expect("heal failed");

    assert!(!is_green(&report));
    assert_eq!(
        kinds(&events),
        vec!["verify_initial", "heal_iteration_start", "heal_repair_error"]
    );
    match events.last().expect("event") {
        HealEvent::HealRepairError { message } => {
            assert!(message.contains("agent exploded"));
        }
        other => panic!("expected HealRepairError, got {:?}", other),
    }
    assert_eq!(source.load_count(), 1, "no re-verify after a failed repair");
}

/// An already-green repo needs no repair at all.
#[tokio::test]
async fn test_green_repo_skips_repair() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join(".buildmend").join("plan.json");
    write_plan(&plan_path, "echo build-ok", "echo test-ok");

    let source = CountingSource::new(plan_path);
    let mut events = Vec::new();
    let report = controller(3)
        .heal_until_green(dir.path(), &source, &ExplodingAgent, |e| {
            events.push(e.clone())
        })
        .await
        .expect("heal failed");

    assert!(is_green(&report));
    assert_eq!(kinds(&events), vec!["verify_initial"]);
    assert_eq!(source.load_count(), 1);
}

/// The iteration-start event carries bounded diagnostics with stderr tails.
#[tokio::test]
async fn test_iteration_diagnostics_payload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join(".buildmend").join("plan.json");
    write_plan(&plan_path, "echo kaboom >&2; exit 1", "echo t");

    let source = CountingSource::new(plan_path);
    let mut events = Vec::new();
    let _ = controller(1)
        .heal_until_green(dir.path(), &source, &NoopAgent, |e| events.push(e.clone()))
        .await
        .expect("heal failed");

    let diags = events
        .iter()
        .find_map(|e| match e {
            HealEvent::HealIterationStart { diagnostics, .. } => Some(diagnostics.clone()),
            _ => None,
        })
        .expect("iteration start event");

    assert_eq!(diags.build.summary.failed, 1);
    assert_eq!(diags.build.failing.len(), 1);
    assert!(diags.build.failing[0].stderr_tail.contains("kaboom"));
    assert!(diags.test.failing.is_empty());
}
