//! A [`GraphEngine`] over delimited edge-list files.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use indexmap::IndexSet;
use indicatif::ProgressBar;
use tracing::debug;

use super::{
    Artifact, EdgeListGraph, GraphCounts, GraphEngine, GraphError, GraphOptions, NodeId,
    ProcessedArtifact, RawArtifact,
};

pub const NODES_FILE: &str = "nodes.tsv";
pub const EDGES_FILE: &str = "edges.tsv";

/// Reads the edge list named by the `edge_path` option, with an optional node
/// list, and stores the preprocessed form as numeric tab separated files.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeListEngine;

struct ListFormat {
    path: PathBuf,
    separator: String,
    header: bool,
    comment: Option<String>,
}

impl ListFormat {
    fn from_options(
        options: &GraphOptions,
        path: &str,
        prefix: &str,
    ) -> Result<Self, GraphError> {
        Ok(Self {
            path: PathBuf::from(path),
            separator: options
                .get_str(&format!("{prefix}_list_separator"))?
                .unwrap_or("\t")
                .to_string(),
            header: options
                .get_bool(&format!("{prefix}_list_header"))?
                .unwrap_or(false),
            comment: options
                .get_str(&format!("{prefix}_list_comment_symbol"))?
                .map(str::to_string),
        })
    }

    /// Calls `f` with the fields of every data line.
    fn for_each_row<F>(&self, root: &Path, mut f: F) -> Result<(), GraphError>
    where
        F: FnMut(&[&str]) -> Result<(), String>,
    {
        let path = root.join(&self.path);
        let reader = BufReader::new(File::open(&path)?);
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if (i == 0 && self.header) || line.is_empty() {
                continue;
            }
            if let Some(comment) = &self.comment {
                if line.starts_with(comment.as_str()) {
                    continue;
                }
            }
            let fields: Vec<&str> = line.split(self.separator.as_str()).collect();
            f(&fields).map_err(|reason| GraphError::Parse {
                path: path.clone(),
                line: i + 1,
                reason,
            })?;
        }
        Ok(())
    }
}

fn column<'a>(fields: &[&'a str], index: usize) -> Result<&'a str, String> {
    fields
        .get(index)
        .copied()
        .ok_or_else(|| format!("expected at least {} columns, found {}", index + 1, fields.len()))
}

fn node_id(vocabulary: &mut IndexSet<String>, name: &str) -> Result<NodeId, String> {
    let (id, _) = vocabulary.insert_full(name.to_string());
    NodeId::try_from(id).map_err(|_| "too many nodes".to_string())
}

type RawEdgeList = (IndexSet<String>, Vec<(NodeId, NodeId)>);

fn read_raw(raw: &RawArtifact, options: &GraphOptions, pb: &ProgressBar) -> Result<RawEdgeList, GraphError> {
    let mut vocabulary = IndexSet::new();

    if let Some(node_path) = options.get_str("node_path")? {
        let format = ListFormat::from_options(options, node_path, "node")?;
        let nodes_column = options.get_usize("nodes_column_number")?.unwrap_or(0);
        format.for_each_row(&raw.dir, |fields| {
            node_id(&mut vocabulary, column(fields, nodes_column)?)?;
            Ok(())
        })?;
        debug!(nodes = vocabulary.len(), "read node list");
    }

    let edge_path = options
        .get_str("edge_path")?
        .ok_or(GraphError::MissingOption("edge_path"))?;
    let format = ListFormat::from_options(options, edge_path, "edge")?;
    let sources_column = options.get_usize("sources_column_number")?.unwrap_or(0);
    let destinations_column = options.get_usize("destinations_column_number")?.unwrap_or(1);

    let mut edges = Vec::new();
    format.for_each_row(&raw.dir, |fields| {
        let src = node_id(&mut vocabulary, column(fields, sources_column)?)?;
        let dst = node_id(&mut vocabulary, column(fields, destinations_column)?)?;
        edges.push((src, dst));
        pb.inc(1);
        Ok(())
    })?;
    debug!(nodes = vocabulary.len(), edges = edges.len(), "read edge list");

    Ok((vocabulary, edges))
}

fn read_processed(artifact: &ProcessedArtifact) -> Result<(Vec<String>, Vec<(NodeId, NodeId)>), GraphError> {
    let nodes = BufReader::new(File::open(artifact.path(NODES_FILE))?)
        .lines()
        .collect::<Result<Vec<_>, _>>()?;

    let edges_path = artifact.path(EDGES_FILE);
    let mut edges = Vec::new();
    for (i, line) in BufReader::new(File::open(&edges_path)?).lines().enumerate() {
        let line = line?;
        let parse_error = |reason: &str| GraphError::Parse {
            path: edges_path.clone(),
            line: i + 1,
            reason: reason.to_string(),
        };
        let (src, dst) = line
            .split_once('\t')
            .ok_or_else(|| parse_error("expected two tab separated node ids"))?;
        let src = src.parse::<NodeId>().map_err(|_| parse_error("invalid source id"))?;
        let dst = dst.parse::<NodeId>().map_err(|_| parse_error("invalid destination id"))?;
        edges.push((src, dst));
    }

    if nodes.len() as u64 != artifact.counts.nodes_number
        || edges.len() as u64 != artifact.counts.edges_number
    {
        return Err(GraphError::Corrupted(format!(
            "expected {} nodes and {} edges, found {} and {}",
            artifact.counts.nodes_number,
            artifact.counts.edges_number,
            nodes.len(),
            edges.len()
        )));
    }
    Ok((nodes, edges))
}

impl GraphEngine for EdgeListEngine {
    type Graph = EdgeListGraph;
    type Error = GraphError;

    fn preprocess(
        &self,
        raw: &RawArtifact,
        target: &Path,
        options: &GraphOptions,
        verbose: bool,
    ) -> Result<GraphCounts, GraphError> {
        let pb = if verbose {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        pb.set_message("reading edge list");
        let (vocabulary, mut edges) = read_raw(raw, options, &pb)?;
        edges.sort_unstable();
        edges.dedup();
        pb.finish_and_clear();

        let mut nodes = BufWriter::new(File::create(target.join(NODES_FILE))?);
        for name in &vocabulary {
            writeln!(nodes, "{name}")?;
        }
        nodes.flush()?;

        let mut out = BufWriter::new(File::create(target.join(EDGES_FILE))?);
        for (src, dst) in &edges {
            writeln!(out, "{src}\t{dst}")?;
        }
        out.flush()?;

        Ok(GraphCounts {
            nodes_number: vocabulary.len() as u64,
            edges_number: edges.len() as u64,
            node_types_number: None,
            edge_types_number: None,
        })
    }

    fn construct(
        &self,
        artifact: Artifact<'_>,
        name: &str,
        directed: bool,
        options: &GraphOptions,
    ) -> Result<EdgeListGraph, GraphError> {
        match artifact {
            Artifact::Raw(raw) => {
                let (vocabulary, edges) = read_raw(raw, options, &ProgressBar::hidden())?;
                EdgeListGraph::from_edges(name, directed, vocabulary.into_iter().collect(), edges)
            }
            Artifact::Processed(processed) => {
                let (nodes, edges) = read_processed(processed)?;
                EdgeListGraph::from_edges(name, directed, nodes, edges)
            }
        }
    }
}
