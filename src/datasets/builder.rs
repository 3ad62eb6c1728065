use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    cache::{CacheConfig, CacheKey, CacheStore},
    catalog::{Catalog, DatasetDescriptor, GraphSource},
    download::Transport,
    errors::RetrievalError,
    preprocess::Preprocessor,
    retriever::Retriever,
};
use crate::graph::{Artifact, EnableOptions, GraphEngine, GraphOptions, SpeedupOps};

/// Graphs below this many directed edges get every auxiliary index enabled.
pub const AUTO_TRADEOFFS_EDGES_THRESHOLD: u64 = 50_000_000;

/// Turns a catalog entry into a loaded graph, downloading and preprocessing
/// at most once per cache key.
pub struct AutomaticGraphBuilder<E, T> {
    config: CacheConfig,
    catalog: Catalog,
    store: CacheStore,
    retriever: Retriever<T>,
    engine: E,
    auto_enable_tradeoffs: bool,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

#[cfg(feature = "download")]
impl<E> AutomaticGraphBuilder<E, super::download::CurlTransport>
where
    E: GraphEngine,
    E::Graph: SpeedupOps,
{
    pub fn with_curl(config: CacheConfig, catalog: Catalog, engine: E) -> Self {
        Self::new(config, catalog, engine, super::download::CurlTransport)
    }
}

impl<E, T> AutomaticGraphBuilder<E, T>
where
    E: GraphEngine,
    E::Graph: SpeedupOps,
    T: Transport,
{
    pub fn new(config: CacheConfig, catalog: Catalog, engine: E, transport: T) -> Self {
        Self {
            store: CacheStore::new(&config),
            config,
            catalog,
            retriever: Retriever::new(transport),
            engine,
            auto_enable_tradeoffs: true,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn auto_enable_tradeoffs(mut self, enable: bool) -> Self {
        self.auto_enable_tradeoffs = enable;
        self
    }

    /// Registers a callback run on freshly downloaded files before they are cached.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&std::path::Path) -> Result<(), RetrievalError> + Send + Sync + 'static,
    {
        self.retriever = self.retriever.with_callback(callback);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        self.retriever.transport()
    }

    /// Descriptor for `name` at the configured default version, or the
    /// catalog's latest one.
    pub fn descriptor(&self, repository: &str, name: &str) -> Result<DatasetDescriptor, RetrievalError> {
        let preferred = self.config.default_version.as_deref();
        let version = self
            .catalog
            .default_version(repository, name, preferred)
            .ok_or_else(|| RetrievalError::UnknownGraph {
                repository: repository.to_string(),
                name: name.to_string(),
                version: preferred.unwrap_or("<any>").to_string(),
            })?;
        Ok(DatasetDescriptor::new(name, repository, version))
    }

    /// Retrieves, preprocesses and loads the graph described by `descriptor`.
    ///
    /// `options` override the catalog's arguments and reach the engine verbatim.
    pub fn build(
        &self,
        descriptor: &DatasetDescriptor,
        options: &GraphOptions,
        verbose: bool,
    ) -> Result<E::Graph, RetrievalError> {
        let key = self.store.resolve(descriptor)?;
        let source = self
            .catalog
            .source(&descriptor.repository, &descriptor.name, &descriptor.version)?;
        let options = source.arguments.merged(options);

        let lock = self.lock(&key);
        let built = {
            let _guard = lock.lock();
            self.build_locked(descriptor, &key, source, &options, verbose)
        };
        self.release(&key, lock);
        built
    }

    fn build_locked(
        &self,
        descriptor: &DatasetDescriptor,
        key: &CacheKey,
        source: &GraphSource,
        options: &GraphOptions,
        verbose: bool,
    ) -> Result<E::Graph, RetrievalError> {
        let force = !descriptor.cache;
        info!(%key, directed = descriptor.directed, preprocess = descriptor.preprocess, "building graph");
        let raw = self.retriever.fetch(&self.store, key, source, force, verbose)?;

        let construct_error = |e: E::Error| RetrievalError::Construct {
            name: descriptor.name.clone(),
            source: Box::new(e),
        };
        let mut graph = if descriptor.preprocess {
            let processed = Preprocessor::new(&self.engine).build(
                &self.store,
                key,
                &raw,
                options,
                force,
                verbose,
            )?;
            self.engine
                .construct(
                    Artifact::Processed(&processed),
                    &descriptor.name,
                    descriptor.directed,
                    options,
                )
                .map_err(construct_error)?
        } else {
            self.engine
                .construct(Artifact::Raw(&raw), &descriptor.name, descriptor.directed, options)
                .map_err(construct_error)?
        };

        if self.auto_enable_tradeoffs && graph.unique_edges_number() < AUTO_TRADEOFFS_EDGES_THRESHOLD {
            debug!(%key, "enabling time-memory tradeoffs");
            graph.enable(EnableOptions::all());
        }
        Ok(graph)
    }

    /// [`build`](Self::build) for `name` at its default version.
    pub fn build_by_name(
        &self,
        repository: &str,
        name: &str,
        directed: bool,
        verbose: bool,
    ) -> Result<E::Graph, RetrievalError> {
        let descriptor = self.descriptor(repository, name)?.directed(directed);
        self.build(&descriptor, &GraphOptions::new(), verbose)
    }

    fn lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.locks.lock().entry(key.clone()).or_default().clone()
    }

    /// Forgets the key's lock once no other build holds or waits on it.
    fn release(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the table, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }
}
