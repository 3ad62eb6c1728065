//! The graph-engine seam.
//!
//! The retrieval pipeline never looks inside a graph. It hands raw or
//! preprocessed files to a [`GraphEngine`] and gets a graph back, and the
//! holdout generator only needs [`SpeedupOps`] to trade memory for lookup
//! speed. [`EdgeListEngine`] and [`EdgeListGraph`] are a small reference
//! implementation of both.

pub mod edge_list;
pub mod engine;
pub mod holdout;

pub use edge_list::{EdgeListGraph, NodeId};
pub use engine::EdgeListEngine;
pub use holdout::random_holdout;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("missing graph option `{0}`")]
    MissingOption(&'static str),
    #[error("graph option `{key}` must be {expected}")]
    InvalidOption { key: String, expected: &'static str },
    #[error("corrupted preprocessed artifact: {0}")]
    Corrupted(String),
    #[error("train size must be strictly between 0 and 1, got {0}")]
    InvalidTrainSize(f64),
}

/// Graph construction options, forwarded verbatim to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphOptions(BTreeMap<String, Value>);

impl GraphOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a copy of `self` where every key of `overrides` wins.
    pub fn merged(&self, overrides: &GraphOptions) -> GraphOptions {
        let mut merged = self.clone();
        for (k, v) in &overrides.0 {
            merged.0.insert(k.clone(), v.clone());
        }
        merged
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, GraphError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(invalid(key, "a string")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, GraphError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(invalid(key, "a boolean")),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, GraphError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| invalid(key, "a non-negative integer")),
        }
    }
}

fn invalid(key: &str, expected: &'static str) -> GraphError {
    GraphError::InvalidOption {
        key: key.to_string(),
        expected,
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for GraphOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Which auxiliary indices to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnableOptions {
    pub vector_sources: bool,
    pub vector_destinations: bool,
    pub vector_outbounds: bool,
}

impl EnableOptions {
    pub fn all() -> Self {
        Self {
            vector_sources: true,
            vector_destinations: true,
            vector_outbounds: true,
        }
    }

    /// Destination and outbound lists, used after every holdout split.
    pub fn speedup() -> Self {
        Self {
            vector_sources: false,
            vector_destinations: true,
            vector_outbounds: true,
        }
    }
}

/// Memory/time tradeoffs on a graph.
///
/// `enable` must be idempotent and must never change the logical graph.
pub trait SpeedupOps {
    fn enable(&mut self, options: EnableOptions);

    fn unique_edges_number(&self) -> u64;
}

/// Counts produced by a preprocessing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub nodes_number: u64,
    pub edges_number: u64,
    pub node_types_number: Option<u64>,
    pub edge_types_number: Option<u64>,
}

/// Downloaded files of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifact {
    pub dir: PathBuf,
}

impl RawArtifact {
    pub fn path<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        self.dir.join(relative)
    }
}

/// Engine output persisted beside the raw files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedArtifact {
    pub dir: PathBuf,
    pub counts: GraphCounts,
}

impl ProcessedArtifact {
    pub fn path<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        self.dir.join(relative)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Artifact<'a> {
    Raw(&'a RawArtifact),
    Processed(&'a ProcessedArtifact),
}

/// The external producer of graphs.
pub trait GraphEngine: Send + Sync {
    type Graph;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Converts `raw` into the engine's optimized files under `target`.
    fn preprocess(
        &self,
        raw: &RawArtifact,
        target: &Path,
        options: &GraphOptions,
        verbose: bool,
    ) -> Result<GraphCounts, Self::Error>;

    fn construct(
        &self,
        artifact: Artifact<'_>,
        name: &str,
        directed: bool,
        options: &GraphOptions,
    ) -> Result<Self::Graph, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_win_when_merging() {
        let base = GraphOptions::new()
            .with("edge_path", "edges.tsv")
            .with("edge_list_header", false);
        let overrides = GraphOptions::new().with("edge_list_header", true);
        let merged = base.merged(&overrides);
        assert_eq!(merged.get_str("edge_path").unwrap(), Some("edges.tsv"));
        assert_eq!(merged.get_bool("edge_list_header").unwrap(), Some(true));
    }

    #[test]
    fn typed_getters_reject_wrong_types() {
        let options: GraphOptions = [("sources_column_number", json!("zero"))]
            .into_iter()
            .collect();
        assert!(matches!(
            options.get_usize("sources_column_number"),
            Err(GraphError::InvalidOption { .. })
        ));
        assert_eq!(options.get_usize("missing").unwrap(), None);
    }
}
