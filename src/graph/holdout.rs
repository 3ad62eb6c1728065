use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{EdgeListGraph, GraphError};

/// Splits the edges of `graph` uniformly at random.
///
/// The first `round(train_size * m)` shuffled edges go to the training graph,
/// the rest to the test graph. Both keep every node of `graph`, so node ids
/// stay aligned across the pair. Usable directly as a holdout callback.
pub fn random_holdout(
    graph: &EdgeListGraph,
    train_size: f64,
    random_state: u64,
) -> Result<(EdgeListGraph, EdgeListGraph), GraphError> {
    if !(train_size > 0.0 && train_size < 1.0) {
        return Err(GraphError::InvalidTrainSize(train_size));
    }

    let mut edges: Vec<_> = graph.edges().collect();
    let mut rng = StdRng::seed_from_u64(random_state);
    edges.shuffle(&mut rng);

    let train_len = ((edges.len() as f64) * train_size).round() as usize;
    let test = edges.split_off(train_len.min(edges.len()));

    let names = graph.node_names().to_vec();
    let train = EdgeListGraph::from_edges(graph.name(), graph.is_directed(), names.clone(), edges)?;
    let test = EdgeListGraph::from_edges(graph.name(), graph.is_directed(), names, test)?;
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: u32) -> EdgeListGraph {
        let names = (0..n).map(|i| i.to_string()).collect();
        EdgeListGraph::from_edges("ring", false, names, (0..n).map(|i| (i, (i + 1) % n))).unwrap()
    }

    #[test]
    fn splits_partition_the_edges() {
        let g = ring(10);
        let (train, test) = random_holdout(&g, 0.8, 42).unwrap();
        assert_eq!(train.edge_count(), 8);
        assert_eq!(test.edge_count(), 2);
        assert_eq!(train.node_count(), 10);
        assert_eq!(test.node_count(), 10);
        for (src, dst) in g.edges() {
            assert!(train.has_edge(src, dst) != test.has_edge(src, dst));
        }
    }

    #[test]
    fn same_seed_same_split() {
        let g = ring(20);
        assert_eq!(
            random_holdout(&g, 0.5, 7).unwrap(),
            random_holdout(&g, 0.5, 7).unwrap()
        );
    }

    #[test]
    fn train_size_must_be_a_fraction() {
        let g = ring(3);
        for train_size in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                random_holdout(&g, train_size, 0),
                Err(GraphError::InvalidTrainSize(_))
            ));
        }
    }
}
