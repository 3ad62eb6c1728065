use std::fs;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    cache::{CacheKey, CacheStore},
    errors::RetrievalError,
};
use crate::graph::{GraphCounts, GraphEngine, GraphOptions, ProcessedArtifact, RawArtifact};

/// Stored as `metadata.json` beside the engine's files, written last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessedMetadata {
    #[serde(flatten)]
    pub counts: GraphCounts,
    /// md5 of the options the artifact was built with.
    pub fingerprint: String,
}

pub fn options_fingerprint(options: &GraphOptions) -> Result<String, RetrievalError> {
    let canonical = serde_json::to_vec(options)?;
    Ok(format!("{:x}", md5::compute(canonical)))
}

/// Metadata of the processed artifact, if one was committed.
pub fn read_metadata(
    store: &CacheStore,
    key: &CacheKey,
) -> Result<Option<PreprocessedMetadata>, RetrievalError> {
    let path = store.metadata_path(key);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RetrievalError::CorruptedCache {
                path,
                reason: e.to_string(),
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Brings a cache entry from `raw-present` to `processed-present` through the engine.
pub struct Preprocessor<'e, E> {
    engine: &'e E,
}

impl<'e, E: GraphEngine> Preprocessor<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Returns the cached artifact when it was built from the same options,
    /// unless `force` is set; otherwise rebuilds it and swaps it in atomically.
    pub fn build(
        &self,
        store: &CacheStore,
        key: &CacheKey,
        raw: &RawArtifact,
        options: &GraphOptions,
        force: bool,
        verbose: bool,
    ) -> Result<ProcessedArtifact, RetrievalError> {
        let dir = store.processed_dir(key);
        let fingerprint = options_fingerprint(options)?;

        let replace = match read_metadata(store, key) {
            Ok(Some(metadata)) if !force && metadata.fingerprint == fingerprint => {
                debug!(%key, "preprocessed graph already cached");
                return Ok(ProcessedArtifact {
                    dir,
                    counts: metadata.counts,
                });
            }
            Ok(Some(_)) => true,
            // Invalidated, or left without readable metadata.
            Ok(None) | Err(RetrievalError::CorruptedCache { .. }) => force || dir.try_exists()?,
            Err(e) => return Err(e),
        };

        info!(%key, "preprocessing graph");
        let staging = store.staging_dir(key)?;
        let counts = self
            .engine
            .preprocess(raw, staging.path(), options, verbose)
            .map_err(|e| RetrievalError::Preprocess {
                name: key.name.clone(),
                source: Box::new(e),
            })?;

        let metadata = PreprocessedMetadata {
            counts,
            fingerprint,
        };
        fs::write(
            staging.path().join("metadata.json"),
            serde_json::to_vec_pretty(&metadata)?,
        )?;
        store.commit(staging, &dir, replace)?;
        info!(
            %key,
            nodes = counts.nodes_number,
            edges = counts.edges_number,
            "preprocessed graph"
        );

        Ok(ProcessedArtifact { dir, counts })
    }
}
