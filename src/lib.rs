// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod schedule;
pub mod stage;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::dag::{RunSummary, Scheduler, TaskGraph};
use crate::engine::{spawn_ticker, CoreRuntime, Runtime, RuntimeEvent, TriggerReason};
use crate::exec::RealExecutorBackend;
use crate::pipeline::PipelineRunner;
use crate::schedule::GraphMetadata;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph assembly
/// - scheduler / run queue / runtime
/// - executor
/// - timetable ticker (or a single manual run with `--once`)
/// - Ctrl-C handling
///
/// Returns the summaries of every run that finished.
pub async fn run(args: CliArgs) -> Result<Vec<RunSummary>> {
    let cfg = load_and_validate(&args.config)?;

    let runner: Arc<dyn PipelineRunner> = Arc::new(cfg.process_runner());
    let graph = Arc::new(cfg.assemble(runner)?);
    let metadata = cfg.graph_metadata()?;

    if args.dry_run {
        print_dry_run(&metadata, &graph);
        return Ok(Vec::new());
    }

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let executor = RealExecutorBackend::new(Arc::clone(&graph), rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let ticker = if args.once {
        let logical_date = Utc::now();
        info!(%logical_date, "triggering a single manual run");
        rt_tx
            .send(RuntimeEvent::RunRequested {
                logical_date,
                reason: TriggerReason::Manual,
            })
            .await?;
        rt_tx.send(RuntimeEvent::TimetableExhausted).await?;
        None
    } else {
        Some(spawn_ticker(metadata.timetable.clone(), rt_tx.clone()))
    };

    info!(
        graph = %metadata.graph_id,
        tasks = graph.len(),
        edges = graph.edge_count(),
        max_active_runs = metadata.max_active_runs,
        "starting scheduler"
    );

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(Scheduler::new(graph), metadata.max_active_runs);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, executor);
    let summaries = runtime.run().await?;

    if let Some(ticker) = ticker {
        ticker.abort();
    }

    Ok(summaries)
}

/// Dry-run output: graph metadata plus every task in topological order.
fn print_dry_run(metadata: &GraphMetadata, graph: &TaskGraph) {
    let timetable = &metadata.timetable;

    println!("stagedag dry-run");
    println!("  graph.id = {}", metadata.graph_id);
    println!("  graph.start_date = {}", timetable.start_date.to_rfc3339());
    println!("  graph.schedule = {}", timetable.cadence);
    println!("  graph.catchup = {}", timetable.catchup);
    println!("  graph.max_active_runs = {}", metadata.max_active_runs);
    println!();

    println!("tasks ({}):", graph.len());
    for node in graph.nodes() {
        let context = node.executor().context();
        println!("  - {}", node.id());
        println!("      stages: {}", node.stages());
        println!(
            "      pipeline: {} (env {})",
            context.pipeline_name, context.environment
        );
        let upstream: Vec<&str> = graph
            .upstream_of(node.id().as_str())
            .map(|id| id.as_str())
            .collect();
        if !upstream.is_empty() {
            println!("      after: {:?}", upstream);
        }
        let retry = node.retry();
        println!(
            "      retries: {} (delay {:?})",
            retry.retries, retry.retry_delay
        );
    }

    debug!("dry-run complete (no execution)");
}
