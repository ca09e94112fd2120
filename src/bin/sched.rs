use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use serde_json::ser::PrettyFormatter;
use serde_json::Serializer;
use tracing::{info, warn};

use schedforge::loader::load_graph;
use schedforge::memory::arena_size;
use schedforge::sched::{
    compute_lifetime, estimate_peak, hierarchical_schedule, reverse_post_order, ScheduleConfig,
};

#[derive(Parser, Debug)]
#[command(name = "sched", version)]
#[command(about = "Memory-aware operator scheduler for tensor DAGs", long_about = None)]
struct Cli {
    /// Path to the JSON DAG description
    dag: PathBuf,

    /// Directory to write the schedule JSON into
    outdir: PathBuf,

    /// Peak memory budget in bytes (default: effectively unbounded)
    budget: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    schedforge::logging::init_logging_default();
    let cli = Cli::parse();

    let graph = load_graph(&cli.dag)?;
    info!(
        graph = %graph.name,
        ops = graph.ops.len(),
        values = graph.values.len(),
        "graph loaded"
    );

    let mut config = ScheduleConfig::default();
    if let Some(budget) = cli.budget {
        config = config.with_budget(budget);
    }

    let started = Instant::now();
    let report = hierarchical_schedule(&graph, &config)?;
    info!(ms = started.elapsed().as_millis() as u64, "scheduling done");
    for fb in &report.fallbacks {
        warn!(
            anchor = %fb.anchor,
            peak = fb.peak,
            budget = fb.budget,
            "group degraded to reverse post-order"
        );
    }

    let json_path = cli.outdir.join(format!("{}.json", graph.name));
    dump_schedule(&report.op_names(&graph), &json_path)?;
    info!(path = %json_path.display(), "schedule written");

    let stat = compute_lifetime(&report.order, &graph);
    info!(bytes = report.peak, "schedule peak");
    info!(bytes = arena_size(&stat), "schedule arena size");

    let rpo = reverse_post_order(&graph);
    let rpo_stat = compute_lifetime(&rpo, &graph);
    info!(bytes = estimate_peak(&rpo, &graph, &config), "RPO peak");
    info!(bytes = arena_size(&rpo_stat), "RPO arena size");

    Ok(())
}

/// Write the op names as a JSON array with 4-space indentation.
fn dump_schedule(names: &[&str], path: &PathBuf) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(file, formatter);
    serde::Serialize::serialize(names, &mut serializer)?;
    let mut file = serializer.into_inner();
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}
