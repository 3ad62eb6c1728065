use std::ops::Range;

use super::{EnableOptions, GraphError, SpeedupOps};

pub type NodeId = u32;

/// An immutable graph stored as a sorted, de-duplicated edge list.
///
/// Undirected graphs keep both directions of every edge, so the outbound
/// neighbours of a node are always a contiguous run of `edges`. The
/// auxiliary vectors are only present after [`SpeedupOps::enable`] and are
/// ignored by equality.
#[derive(Debug, Clone)]
pub struct EdgeListGraph {
    name: String,
    directed: bool,
    node_names: Vec<String>,
    edges: Vec<(NodeId, NodeId)>,
    edge_count: usize,
    sources: Option<Vec<NodeId>>,
    destinations: Option<Vec<NodeId>>,
    outbounds: Option<Vec<usize>>,
}

impl PartialEq for EdgeListGraph {
    fn eq(&self, other: &Self) -> bool {
        self.directed == other.directed
            && self.node_names == other.node_names
            && self.edges == other.edges
    }
}

impl Eq for EdgeListGraph {}

impl EdgeListGraph {
    pub fn from_edges<S, I>(
        name: S,
        directed: bool,
        node_names: Vec<String>,
        edges: I,
    ) -> Result<Self, GraphError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (NodeId, NodeId)>,
    {
        let n = node_names.len();
        let mut list = Vec::new();
        for (src, dst) in edges {
            if src as usize >= n || dst as usize >= n {
                return Err(GraphError::Corrupted(format!(
                    "edge ({src}, {dst}) references a node outside 0..{n}"
                )));
            }
            list.push((src, dst));
            if !directed && src != dst {
                list.push((dst, src));
            }
        }
        list.sort_unstable();
        list.dedup();

        let edge_count = if directed {
            list.len()
        } else {
            list.iter().filter(|(src, dst)| src <= dst).count()
        };

        Ok(Self {
            name: name.into(),
            directed,
            node_names,
            edges: list,
            edge_count,
            sources: None,
            destinations: None,
            outbounds: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn node_count(&self) -> usize {
        self.node_names.len()
    }

    /// Number of edges, counting each undirected edge once.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Number of stored directed edges.
    pub fn directed_edges_number(&self) -> usize {
        self.edges.len()
    }

    pub fn node_names(&self) -> &[String] {
        &self.node_names
    }

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.node_names.get(node as usize).map(String::as_str)
    }

    /// Edges in canonical form: undirected edges are reported once with `src <= dst`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        let directed = self.directed;
        self.edges
            .iter()
            .copied()
            .filter(move |(src, dst)| directed || src <= dst)
    }

    pub fn has_edge(&self, src: NodeId, dst: NodeId) -> bool {
        self.edges.binary_search(&(src, dst)).is_ok()
    }

    pub fn neighbours(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let range = self.outbound_range(node);
        let edges = &self.edges[range.clone()];
        let destinations = self.destinations.as_deref().map(|d| &d[range]);
        (0..edges.len()).map(move |i| match destinations {
            Some(d) => d[i],
            None => edges[i].1,
        })
    }

    pub fn sources(&self) -> Option<&[NodeId]> {
        self.sources.as_deref()
    }

    pub fn destinations(&self) -> Option<&[NodeId]> {
        self.destinations.as_deref()
    }

    pub fn outbounds(&self) -> Option<&[usize]> {
        self.outbounds.as_deref()
    }

    pub fn has_speedups(&self) -> bool {
        self.sources.is_some() || self.destinations.is_some() || self.outbounds.is_some()
    }

    fn outbound_range(&self, node: NodeId) -> Range<usize> {
        match &self.outbounds {
            Some(offsets) if (node as usize) < self.node_count() => {
                offsets[node as usize]..offsets[node as usize + 1]
            }
            _ => {
                let start = self.edges.partition_point(|&(src, _)| src < node);
                let end = self.edges.partition_point(|&(src, _)| src <= node);
                start..end
            }
        }
    }
}

impl SpeedupOps for EdgeListGraph {
    fn enable(&mut self, options: EnableOptions) {
        if options.vector_sources && self.sources.is_none() {
            self.sources = Some(self.edges.iter().map(|&(src, _)| src).collect());
        }
        if options.vector_destinations && self.destinations.is_none() {
            self.destinations = Some(self.edges.iter().map(|&(_, dst)| dst).collect());
        }
        if options.vector_outbounds && self.outbounds.is_none() {
            let mut offsets = vec![0usize; self.node_count() + 1];
            for &(src, _) in &self.edges {
                offsets[src as usize + 1] += 1;
            }
            for i in 1..offsets.len() {
                offsets[i] += offsets[i - 1];
            }
            self.outbounds = Some(offsets);
        }
    }

    fn unique_edges_number(&self) -> u64 {
        self.edges.len() as u64
    }
}
