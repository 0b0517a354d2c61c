//! `packet-quorum` CLI entry-point.
//!
//! Available sub-commands:
//! - `approvals` — counter-only flow: three groups, out-of-order approvals.
//! - `batches`   — payload race flow: first N of three types to fill win.
//! - `report`    — progress-report flow: poll collected service results.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use activities::uploader::SimulatedUploader;
use activities::Packet;
use engine::{CompletionMode, CoordinatorConfig, SeedPolicy, UploadCoordinator};

#[derive(Parser)]
#[command(
    name = "packet-quorum",
    about = "Signal-driven quorum upload workflows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the counter-only flow: approvals arrive out of order until each
    /// group's quorum is met and its batch uploads.
    Approvals {
        /// Approvals required per group.
        #[arg(long, default_value_t = 3)]
        quorum: usize,
    },
    /// Drive the payload race flow: submits interleave across three types;
    /// the run finishes once `required` types have filled and uploaded.
    Batches {
        /// Groups that must finish for the run to complete.
        #[arg(long, default_value_t = 2)]
        required: usize,
    },
    /// Drive the progress-report flow and poll the results query until all
    /// service results have arrived.
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Approvals { quorum } => run_approvals(quorum).await,
        Command::Batches { required } => run_batches(required).await,
        Command::Report => run_report().await,
    }
}

async fn run_approvals(quorum: usize) -> Result<()> {
    let activity = Arc::new(
        SimulatedUploader::new()
            .with_delays(Duration::from_millis(500), Duration::from_secs(1)),
    );
    let coord = Arc::new(UploadCoordinator::new(
        activity,
        CoordinatorConfig {
            per_group_quorum: quorum,
            ..CoordinatorConfig::default()
        },
    ));
    let router = coord.router();

    let runner = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.run().await })
    };

    // Give the coordinator time to seed its groups.
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("delivering approvals out of order");
    for key in [1, 2, 1, 2, 3, 3, 2, 3, 1] {
        router.approve(key);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let summary = runner.await??;

    for result in coord.collected_results() {
        println!("Got result: {result}");
    }
    println!("{summary}");
    Ok(())
}

async fn run_batches(required: usize) -> Result<()> {
    let activity = Arc::new(
        SimulatedUploader::new()
            .with_delays(Duration::from_millis(500), Duration::from_secs(1)),
    );
    let coord = Arc::new(UploadCoordinator::new(
        activity,
        CoordinatorConfig {
            per_group_quorum: 3,
            mode: CompletionMode::FirstN { required },
            seed_policy: SeedPolicy::KeysOnly,
            ..CoordinatorConfig::default()
        },
    ));
    let router = coord.router();

    let runner = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.run().await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("submitting packets interleaved across three types");
    let submits = [
        (1, 1),
        (2, 1),
        (3, 1),
        (1, 2),
        (2, 2),
        (1, 3),
        (2, 3),
        (3, 2),
        (3, 3),
    ];
    for (key, seq) in submits {
        router.submit(Packet::new(key, seq, format!("payload-{key}-{seq}")));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let summary = runner.await??;

    // The run resolved at the race quorum; give stragglers a moment so
    // their uploads show up in the log too.
    tokio::time::sleep(Duration::from_secs(1)).await;

    for result in coord.collected_results() {
        println!("Got result: {result}");
    }
    println!("{summary}");
    Ok(())
}

async fn run_report() -> Result<()> {
    let activity = Arc::new(
        SimulatedUploader::new()
            .with_delays(Duration::from_millis(500), Duration::from_millis(500)),
    );
    let coord = Arc::new(UploadCoordinator::new(
        activity,
        CoordinatorConfig::default(),
    ));

    let reporter = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.report_progress().await })
    };

    // Poll the query surface until all three service results arrived.
    let mut printed = 0;
    while printed < 3 {
        let results = coord.collected_results();
        for result in &results[printed..] {
            println!("Got result: {result}");
            printed += 1;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    reporter.await??;
    Ok(())
}
