//! On-disk layout of the graph cache.
//!
//! ```text
//! <root>/<repository>/<name>/<version>/
//! ├── raw/              # downloaded files, committed atomically
//! ├── processed/        # engine output + metadata.json, committed atomically
//! └── .staging-*        # in-flight writes, never read
//! ```

use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::{catalog::DatasetDescriptor, errors::RetrievalError};

pub const CACHE_DIR_VAR: &str = "GRAPH_CACHE_DIR";
pub const DEFAULT_CACHE_DIR: &str = "graphs";

const RAW_DIR: &str = "raw";
const PROCESSED_DIR: &str = "processed";
const METADATA_FILE: &str = "metadata.json";
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub root_path: PathBuf,
    /// Version used when the caller does not name one.
    pub default_version: Option<String>,
}

impl CacheConfig {
    pub fn new<P: Into<PathBuf>>(root_path: P) -> Self {
        Self {
            root_path: root_path.into(),
            default_version: None,
        }
    }

    /// Reads the root from `GRAPH_CACHE_DIR`, falling back to `graphs`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(CACHE_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        Self::new(root)
    }

    pub fn with_default_version<S: Into<String>>(mut self, version: S) -> Self {
        self.default_version = Some(version.into());
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub repository: String,
    pub name: String,
    pub version: String,
}

impl CacheKey {
    pub fn new<R: Into<String>, N: Into<String>, V: Into<String>>(
        repository: R,
        name: N,
        version: V,
    ) -> Self {
        Self {
            repository: repository.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn relative_path(&self) -> PathBuf {
        [&self.repository, &self.name, &self.version].iter().collect()
    }

    /// Each part must be a single plain path segment, so distinct keys never
    /// share a directory and no key leaves the cache root.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        check_segment("repository", &self.repository)?;
        check_segment("name", &self.name)?;
        check_segment("version", &self.version)
    }
}

fn check_segment(part: &str, segment: &str) -> Result<(), RetrievalError> {
    let mut components = Path::new(segment).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == segment
    );
    if !plain || segment.contains(['/', '\\']) {
        return Err(RetrievalError::InvalidCatalog(format!(
            "{part} `{segment}` is not a single path segment"
        )));
    }
    Ok(())
}

impl From<&DatasetDescriptor> for CacheKey {
    fn from(d: &DatasetDescriptor) -> Self {
        Self::new(&d.repository, &d.name, &d.version)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.repository, self.name, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheState {
    Absent,
    RawPresent,
    ProcessedPresent,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            root: config.root_path.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, descriptor: &DatasetDescriptor) -> Result<CacheKey, RetrievalError> {
        let key = CacheKey::from(descriptor);
        key.validate()?;
        Ok(key)
    }

    pub fn key_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    pub fn raw_dir(&self, key: &CacheKey) -> PathBuf {
        self.key_dir(key).join(RAW_DIR)
    }

    pub fn processed_dir(&self, key: &CacheKey) -> PathBuf {
        self.key_dir(key).join(PROCESSED_DIR)
    }

    pub fn metadata_path(&self, key: &CacheKey) -> PathBuf {
        self.processed_dir(key).join(METADATA_FILE)
    }

    /// Missing entries are a state, not an error.
    pub fn state(&self, key: &CacheKey) -> io::Result<CacheState> {
        if self.metadata_path(key).try_exists()? {
            Ok(CacheState::ProcessedPresent)
        } else if self.raw_dir(key).try_exists()? {
            Ok(CacheState::RawPresent)
        } else {
            Ok(CacheState::Absent)
        }
    }

    /// A fresh directory beside the final artifact, removed on drop.
    pub fn staging_dir(&self, key: &CacheKey) -> Result<TempDir, RetrievalError> {
        key.validate()?;
        let dir = self.key_dir(key);
        fs::create_dir_all(&dir)?;
        Ok(tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(dir)?)
    }

    /// Drops the processed artifact's metadata so it is rebuilt before reuse.
    pub fn invalidate_processed(&self, key: &CacheKey) -> io::Result<()> {
        match fs::remove_file(self.metadata_path(key)) {
            Ok(()) => {
                debug!(%key, "invalidated preprocessed graph");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Moves a finished staging directory to `target` with a single rename.
    ///
    /// Without `replace`, an artifact committed meanwhile by another writer
    /// is kept and the staged copy is discarded. With it, the old artifact is
    /// moved aside and only deleted once the new one is in place.
    pub fn commit(&self, staging: TempDir, target: &Path, replace: bool) -> io::Result<()> {
        if replace && target.try_exists()? {
            return swap(staging, target);
        }
        match fs::rename(staging.path(), target) {
            Ok(()) => Ok(()),
            Err(e) if !replace && target.try_exists()? => {
                warn!(
                    target = %target.display(),
                    error = %e,
                    "artifact committed by a concurrent writer, keeping it"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
        // `staging` is dropped here; its path no longer exists after a rename.
    }
}

fn swap(staging: TempDir, target: &Path) -> io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "artifact has no parent"))?;
    let retired = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)?;
    let old = retired.path().join("old");
    fs::rename(target, &old)?;

    if let Err(e) = fs::rename(staging.path(), target) {
        if let Err(restore) = fs::rename(&old, target) {
            warn!(
                target = %target.display(),
                error = %restore,
                "could not restore the previous artifact"
            );
        }
        return Err(e);
    }
    debug!(target = %target.display(), "replaced cached artifact");
    Ok(())
    // `retired` is dropped here along with the old artifact.
}
