//! buildmend - verify and self-heal a repository's generated build plan
//!
//! ## Commands
//!
//! - `verify`: execute the plan's build/test/start commands once and report
//!   per-group pass/fail/skip counts
//! - `heal`: verify, then invoke the configured repair agent and re-verify
//!   until green or the iteration budget is exhausted

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use buildmend_core::{
    evaluate_convergence, CommandGroup, GroupSummary, HealEvent, VerifyReport, STATE_DIR,
};
use buildmend_verify::heal::DEFAULT_MAX_ITERATIONS;
use buildmend_verify::{
    verify_dir, CliRepairAgent, CommandSource, HealController, PlanFileSource, Verifier,
};

#[derive(Parser)]
#[command(name = "buildmend")]
#[command(author = "Buildmend Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify and self-heal a repository's generated build plan", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute plan commands for build/test/start and report results
    Verify {
        /// Path to repo root
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Path to plan.json (defaults to .buildmend/plan.json under the repo)
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Verify and invoke the repair agent until green or the budget runs out
    Heal {
        /// Path to repo root
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Path to plan.json (defaults to .buildmend/plan.json under the repo)
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Maximum repair iterations
        #[arg(long, env = "BUILDMEND_MAX_HEAL", default_value_t = DEFAULT_MAX_ITERATIONS)]
        max_iter: u32,

        /// Repair agent binary to invoke on failures
        #[arg(long, default_value = "buildmend-repair")]
        repair_cmd: String,

        /// Extra argument passed to the repair agent (repeatable)
        #[arg(long = "repair-arg")]
        repair_args: Vec<String>,
    },
}

fn plan_path(repo: &Path, plan: Option<PathBuf>) -> PathBuf {
    plan.unwrap_or_else(|| repo.join(STATE_DIR).join("plan.json"))
}

fn fmt_summary(summary: &GroupSummary) -> String {
    format!(
        "passed={} failed={} total={}",
        summary.passed, summary.failed, summary.total
    )
}

fn print_summary(report: &VerifyReport) {
    println!("[buildmend] Verification summary:");
    for group in CommandGroup::ALL {
        let s = report.summary_for(group);
        println!(
            "  - {}: passed={} failed={} skipped={} total={}",
            group.name(),
            s.passed,
            s.failed,
            s.skipped,
            s.total
        );
    }
}

fn print_event(event: &HealEvent) {
    match event {
        HealEvent::VerifyInitial => {
            println!("[buildmend] Running initial verification…");
        }
        HealEvent::HealIterationStart {
            iteration,
            diagnostics,
        } => {
            println!(
                "[buildmend] Self-heal iteration {} (build {}, test {}, start {})…",
                iteration,
                fmt_summary(&diagnostics.build.summary),
                fmt_summary(&diagnostics.test.summary),
                fmt_summary(&diagnostics.start.summary),
            );
            for group in CommandGroup::ALL {
                for sample in &diagnostics.group(group).failing {
                    let last_line = sample.stderr_tail.trim().lines().last().unwrap_or("");
                    println!(
                        "    • {} failed: {} - {}",
                        group.name(),
                        sample.command,
                        last_line
                    );
                }
            }
        }
        HealEvent::HealNoRepairAgent => {
            println!("[buildmend] No repair agent available; stopping.");
        }
        HealEvent::HealRepairError { message } => {
            println!("[buildmend] Repair attempt failed; stopping ({})", message);
        }
        HealEvent::HealIterationDone { iteration } => {
            println!("[buildmend] Iteration {} complete; re-verifying…", iteration);
        }
    }
}

async fn cmd_verify(repo: &Path, plan: Option<PathBuf>) -> Result<bool> {
    let plan_path = plan_path(repo, plan);
    let source = PlanFileSource::new(plan_path);
    let loaded = source.load().context("Failed to load build plan")?;

    let report = Verifier::new()
        .verify(&loaded.commands, repo)
        .await
        .context("Verification pass failed")?;

    print_summary(&report);

    let verdict = evaluate_convergence(&report);
    if !verdict.passed {
        for violation in &verdict.violations {
            println!("  ! {}", violation);
        }
        println!(
            "[buildmend] Not green. Check {} for logs.",
            verify_dir(repo).display()
        );
    }
    Ok(verdict.passed)
}

async fn cmd_heal(
    repo: &Path,
    plan: Option<PathBuf>,
    max_iter: u32,
    repair_cmd: String,
    repair_args: Vec<String>,
) -> Result<bool> {
    let plan_path = plan_path(repo, plan);
    let source = PlanFileSource::new(plan_path);
    let agent = CliRepairAgent::new(repair_cmd).with_args(repair_args);
    let controller = HealController::new(Verifier::new(), max_iter);

    let report = controller
        .heal_until_green(repo, &source, &agent, print_event)
        .await
        .context("Heal loop failed")?;

    print_summary(&report);

    let verdict = evaluate_convergence(&report);
    if verdict.passed {
        println!("[buildmend] All critical steps passed.");
    } else {
        println!(
            "[buildmend] Some steps are still failing. Check {} for logs.",
            verify_dir(repo).display()
        );
    }
    Ok(verdict.passed)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    buildmend_core::init_tracing(cli.json, level);

    let green = match cli.command {
        Commands::Verify { repo, plan } => cmd_verify(&repo, plan).await?,
        Commands::Heal {
            repo,
            plan,
            max_iter,
            repair_cmd,
            repair_args,
        } => cmd_heal(&repo, plan, max_iter, repair_cmd, repair_args).await?,
    };

    if !green {
        std::process::exit(1);
    }
    Ok(())
}
