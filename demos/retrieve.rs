//! Retrieves a catalogued graph and prints a few reproducible holdouts.
//!
//! ```text
//! cargo run --example retrieve -- <catalog.json[.gz]> <repository> <name>
//! ```

use graph_retrieval::{
    datasets::HoldoutSpec,
    graph::random_holdout,
    iterate_holdouts, AutomaticGraphBuilder, CacheConfig, Catalog, EdgeListEngine,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(catalog), Some(repository), Some(name)) = (args.next(), args.next(), args.next())
    else {
        eprintln!("usage: retrieve <catalog.json[.gz]> <repository> <name>");
        std::process::exit(2);
    };

    let builder = AutomaticGraphBuilder::with_curl(
        CacheConfig::from_env(),
        Catalog::from_path(catalog)?,
        EdgeListEngine,
    );
    let graph = builder.build_by_name(&repository, &name, false, true)?;
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "loaded {name}"
    );

    let spec = HoldoutSpec::new(0.8, 3)?.with_speedup(true);
    for holdout in iterate_holdouts(&graph, random_holdout, spec) {
        let holdout = holdout?;
        println!(
            "holdout {}: seed={} train={} test={}",
            holdout.index,
            spec.seed(holdout.index),
            holdout.train.edge_count(),
            holdout.test.edge_count()
        );
    }
    Ok(())
}
