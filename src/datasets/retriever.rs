use std::path::Path;

use tracing::{debug, info};

use super::{
    cache::{CacheKey, CacheState, CacheStore},
    catalog::GraphSource,
    download::{unpack, verify, Transport},
    errors::RetrievalError,
};
use crate::graph::RawArtifact;

/// Runs on the staged raw files, before they are committed to the cache.
pub type RawCallback = Box<dyn Fn(&Path) -> Result<(), RetrievalError> + Send + Sync>;

/// Brings a cache entry from `absent` to `raw-present`.
pub struct Retriever<T> {
    transport: T,
    callbacks: Vec<RawCallback>,
}

impl<T: Transport> Retriever<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            callbacks: Vec::new(),
        }
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Path) -> Result<(), RetrievalError> + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// A no-op when the raw files are already cached, unless `force` is set.
    ///
    /// Files are downloaded and verified into a staging directory that is
    /// renamed into place only once every file succeeded, so a failure at any
    /// point leaves the entry `absent`.
    pub fn fetch(
        &self,
        store: &CacheStore,
        key: &CacheKey,
        source: &GraphSource,
        force: bool,
        verbose: bool,
    ) -> Result<RawArtifact, RetrievalError> {
        let raw = RawArtifact {
            dir: store.raw_dir(key),
        };
        if !force && store.state(key)? != CacheState::Absent {
            debug!(%key, "raw files already cached");
            return Ok(raw);
        }

        info!(%key, files = source.files.len(), "retrieving raw files");
        let staging = store.staging_dir(key)?;
        for file in &source.files {
            let bytes = self.transport.download(&file.url, verbose)?;
            verify(file, &bytes)?;
            unpack(staging.path(), file, bytes)?;
        }
        for callback in &self.callbacks {
            callback(staging.path())?;
        }
        if force {
            // The processed artifact was derived from the files being replaced.
            store.invalidate_processed(key)?;
        }
        store.commit(staging, &raw.dir, force)?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{cache::CacheConfig, catalog::RemoteFile};
    use std::{
        collections::HashMap,
        fs,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    #[derive(Default)]
    struct MapTransport {
        files: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl MapTransport {
        fn serve(mut self, url: &str, bytes: &[u8]) -> Self {
            self.files.insert(url.to_string(), bytes.to_vec());
            self
        }
    }

    impl Transport for MapTransport {
        fn download(&self, url: &str, _verbose: bool) -> Result<Vec<u8>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| RetrievalError::network(url, "connection reset"))
        }
    }

    const EDGES: &str = "https://example.org/edges.tsv";
    const NODES: &str = "https://example.org/nodes.tsv";

    fn setup() -> (tempfile::TempDir, CacheStore, CacheKey) {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(&CacheConfig::new(tmp.path()));
        (tmp, store, CacheKey::new("test", "Tiny", "v1"))
    }

    fn source(files: &[&str]) -> GraphSource {
        GraphSource {
            files: files.iter().map(|url| RemoteFile::new(*url)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn second_fetch_is_a_no_op() {
        let (_tmp, store, key) = setup();
        let retriever = Retriever::new(MapTransport::default().serve(EDGES, b"a\tb\n"));
        let src = source(&[EDGES]);

        let raw = retriever.fetch(&store, &key, &src, false, false).unwrap();
        assert_eq!(fs::read(raw.path("edges.tsv")).unwrap(), b"a\tb\n");
        retriever.fetch(&store, &key, &src, false, false).unwrap();
        assert_eq!(retriever.transport().calls.load(Ordering::SeqCst), 1);

        retriever.fetch(&store, &key, &src, true, false).unwrap();
        assert_eq!(retriever.transport().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn forced_fetch_invalidates_the_processed_artifact() {
        let (_tmp, store, key) = setup();
        let retriever = Retriever::new(MapTransport::default().serve(EDGES, b"a\tb\n"));
        let src = source(&[EDGES]);
        retriever.fetch(&store, &key, &src, false, false).unwrap();
        fs::create_dir_all(store.processed_dir(&key)).unwrap();
        fs::write(store.metadata_path(&key), "{}").unwrap();

        retriever.fetch(&store, &key, &src, false, false).unwrap();
        assert_eq!(store.state(&key).unwrap(), CacheState::ProcessedPresent);
        retriever.fetch(&store, &key, &src, true, false).unwrap();
        assert_eq!(store.state(&key).unwrap(), CacheState::RawPresent);
    }

    #[test]
    fn interrupted_download_leaves_the_entry_absent() {
        let (_tmp, store, key) = setup();
        let retriever = Retriever::new(MapTransport::default().serve(EDGES, b"a\tb\n"));

        let err = retriever
            .fetch(&store, &key, &source(&[EDGES, NODES]), false, false)
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.state(&key).unwrap(), CacheState::Absent);
        assert_eq!(fs::read_dir(store.key_dir(&key)).unwrap().count(), 0);
    }

    #[test]
    fn corrupted_download_is_never_committed() {
        let (_tmp, store, key) = setup();
        let retriever = Retriever::new(MapTransport::default().serve(EDGES, b"a\tb\n"));
        let mut src = source(&[EDGES]);
        src.files[0].md5 = Some("0".repeat(32));

        let err = retriever.fetch(&store, &key, &src, false, false).unwrap_err();
        assert!(matches!(err, RetrievalError::Integrity { .. }));
        assert_eq!(store.state(&key).unwrap(), CacheState::Absent);
    }

    #[test]
    fn callbacks_run_once_before_commit() {
        let (_tmp, store, key) = setup();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let retriever = Retriever::new(MapTransport::default().serve(EDGES, b"a\tb\n"))
            .with_callback(move |dir| {
                counter.fetch_add(1, Ordering::SeqCst);
                let edges = fs::read_to_string(dir.join("edges.tsv"))?;
                fs::write(dir.join("edges.tsv"), edges.to_uppercase())?;
                Ok(())
            });
        let src = source(&[EDGES]);

        retriever.fetch(&store, &key, &src, false, false).unwrap();
        let raw = retriever.fetch(&store, &key, &src, false, false).unwrap();
        assert_eq!(fs::read_to_string(raw.path("edges.tsv")).unwrap(), "A\tB\n");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_callback_aborts_the_commit() {
        let (_tmp, store, key) = setup();
        let retriever = Retriever::new(MapTransport::default().serve(EDGES, b"a\tb\n"))
            .with_callback(|_| Err(RetrievalError::InvalidCatalog("bad columns".into())));

        assert!(retriever
            .fetch(&store, &key, &source(&[EDGES]), false, false)
            .is_err());
        assert_eq!(store.state(&key).unwrap(), CacheState::Absent);
    }
}
