use anyhow::Result;
use clap::Parser;
use serde_json::json;
use srcgraph::builder::scan::{self, ScanOptions};
use srcgraph::cli::{self, BuildArgs};
use srcgraph::{SourceGraph, SourceGraphBuilder};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

fn build_graph(opts: &BuildArgs) -> Result<SourceGraph> {
    let config = opts.builder_config();
    let tree = scan::load_file_tree(&opts.repo, ScanOptions::new(opts.no_ignore))?;
    let graph = SourceGraphBuilder::new(config).build(&tree)?;
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        diagnostics = graph.diagnostics().len(),
        "graph built"
    );
    Ok(graph)
}

fn main() -> Result<()> {
    init_tracing()?;
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Build { opts } => {
            let graph = build_graph(&opts)?;
            let report = json!({
                "repo": opts.repo.display().to_string(),
                "fingerprint": graph.fingerprint(),
                "stats": graph.stats(),
                "diagnostics": graph.diagnostics_summary(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        cli::Command::Dump { opts, pretty } => {
            let graph = build_graph(&opts)?;
            let nodes: Vec<_> = graph.nodes().collect();
            let edges: Vec<_> = graph.edges().collect();
            let dump = json!({
                "fingerprint": graph.fingerprint(),
                "nodes": nodes,
                "edges": edges,
                "diagnostics": graph.diagnostics(),
                "stats": graph.stats(),
            });
            if pretty {
                println!("{}", serde_json::to_string_pretty(&dump)?);
            } else {
                println!("{}", serde_json::to_string(&dump)?);
            }
            Ok(())
        }
    }
}
