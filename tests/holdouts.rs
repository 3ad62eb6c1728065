use graph_retrieval::{
    datasets::{GraphSource, HoldoutResult, HoldoutSpec, RemoteFile, Transport},
    graph::{random_holdout, GraphError},
    iterate_holdouts, AutomaticGraphBuilder, CacheConfig, Catalog, EdgeListEngine,
    EdgeListGraph, GraphOptions, RetrievalError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct RingTransport;

impl Transport for RingTransport {
    fn download(&self, _url: &str, _verbose: bool) -> Result<Vec<u8>, RetrievalError> {
        let mut edges = String::from("source,destination\n");
        for i in 0..30 {
            edges.push_str(&format!("n{},n{}\n", i, (i + 1) % 30));
            edges.push_str(&format!("n{},n{}\n", i, (i + 7) % 30));
        }
        Ok(edges.into_bytes())
    }
}

fn ring() -> EdgeListGraph {
    let tmp = TempDir::new().unwrap();
    let mut catalog = Catalog::new();
    catalog.insert(
        "test",
        "Ring",
        "v1",
        GraphSource {
            files: vec![RemoteFile::new("https://graphs.example.org/ring.csv")],
            arguments: GraphOptions::new()
                .with("edge_path", "ring.csv")
                .with("edge_list_separator", ",")
                .with("edge_list_header", true),
        },
    );
    let builder = AutomaticGraphBuilder::new(
        CacheConfig::new(tmp.path()),
        catalog,
        EdgeListEngine,
        RingTransport,
    )
    .auto_enable_tradeoffs(false);
    builder.build_by_name("test", "Ring", false, false).unwrap()
}

fn run(graph: &EdgeListGraph, spec: HoldoutSpec) -> Vec<HoldoutResult<EdgeListGraph>> {
    iterate_holdouts(graph, random_holdout, spec)
        .collect::<Result<_, GraphError>>()
        .unwrap()
}

#[test]
fn retrieved_graph_splits_reproducibly() {
    let graph = ring();
    assert_eq!(graph.node_count(), 30);
    assert_eq!(graph.edge_count(), 60);

    let spec = HoldoutSpec::new(0.8, 5)
        .unwrap()
        .with_random_state(42)
        .with_random_state_stride(1000);
    let first = run(&graph, spec);
    assert_eq!(first.len(), 5);
    assert_eq!(first, run(&graph, spec));

    for holdout in &first {
        assert_eq!(holdout.train.edge_count(), 48);
        assert_eq!(holdout.test.edge_count(), 12);
    }
    assert_ne!(first[0].test, first[1].test);
}

#[test]
fn each_holdout_matches_its_seed() {
    let graph = ring();
    let spec = HoldoutSpec::new(0.6, 3)
        .unwrap()
        .with_random_state(7)
        .with_random_state_stride(11);
    for holdout in run(&graph, spec) {
        let (index, (train, test)): (usize, (EdgeListGraph, EdgeListGraph)) = holdout.into();
        let expected = random_holdout(&graph, 0.6, 7 + 11 * index as u64).unwrap();
        assert_eq!((train, test), expected);
    }
}

#[test]
fn stopping_early_is_fine() {
    let graph = ring();
    let spec = HoldoutSpec::new(0.5, 100).unwrap().with_speedup(true);
    let taken: Vec<_> = iterate_holdouts(&graph, random_holdout, spec)
        .take(2)
        .map(|h| h.unwrap())
        .collect();
    assert_eq!(taken.len(), 2);
    assert!(taken.iter().all(|h| h.train.has_speedups()));
}
