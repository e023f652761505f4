// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod process;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::load_or_default;
use crate::engine::Orchestrator;
use crate::pipeline::Topology;
use crate::process::NixBackend;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline description loading (or the built-in stages)
/// - topology construction, forwarding the CLI input to the producer
/// - the orchestrator with the real process backend
///
/// Returns the exit status for the process.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_or_default(args.config.as_deref())?;
    let topology = Topology::from_config(&cfg, &args.input)?;

    if args.dry_run {
        print_dry_run(&topology);
        return Ok(0);
    }

    let strict = args.strict || cfg.pipeline.strict;
    info!(stages = topology.stages().len(), pipes = topology.pipe_count(), strict, "starting pipeline");

    let mut orchestrator = Orchestrator::new(NixBackend::new(), topology);
    let report = orchestrator.run().await?;

    let failed = report.failed_stages();
    if failed.is_empty() {
        info!(stages = report.exits.len(), "pipeline finished");
    } else {
        warn!(?failed, strict, "pipeline finished with failed stages");
    }

    Ok(report.exit_code(strict))
}

/// Simple dry-run output: print stages, argv and wiring.
fn print_dry_run(topology: &Topology) {
    println!("trainer dry-run");
    println!("  pipes = {}", topology.pipe_count());
    println!();
    print!("{topology}");

    debug!("dry-run complete (nothing spawned)");
}
