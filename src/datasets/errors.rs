pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
pub enum RetrievalError {
    /// Transient transport failure; the whole build can be retried.
    #[error("failed to download {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("integrity check failed for {url}: expected {expected}, found {found}")]
    Integrity {
        url: String,
        expected: String,
        found: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid catalog: {0}")]
    Catalog(#[from] serde_json::Error),
    #[error("invalid catalog entry: {0}")]
    InvalidCatalog(String),
    #[error("graph `{name}` version `{version}` is not available in repository `{repository}`")]
    UnknownGraph {
        repository: String,
        name: String,
        version: String,
    },
    /// A cached file exists but cannot be read back; rebuilding the entry fixes it.
    #[error("corrupted cache file {}: {reason}", path.display())]
    CorruptedCache {
        path: std::path::PathBuf,
        reason: String,
    },
    #[error("failed to preprocess graph `{name}`: {source}")]
    Preprocess { name: String, source: BoxedError },
    #[error("failed to load graph `{name}`: {source}")]
    Construct { name: String, source: BoxedError },
}

impl RetrievalError {
    pub fn network<U: Into<String>, R: ToString>(url: U, reason: R) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Returned by [`HoldoutSpec::new`](super::split::HoldoutSpec::new).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum HoldoutSpecError {
    #[error("train size must be strictly between 0 and 1, got {0}")]
    TrainSize(f64),
    #[error("at least one holdout is required")]
    NoHoldouts,
}
