//! Catalogued graph retrieval: cache layout, downloads, preprocessing and
//! the [`AutomaticGraphBuilder`] tying them together, plus the holdout
//! generator used to split the retrieved graphs.

pub mod builder;
pub mod cache;
pub mod catalog;
pub mod download;
pub mod errors;
pub mod preprocess;
pub mod retriever;
pub mod split;

pub use builder::AutomaticGraphBuilder;
pub use cache::{CacheConfig, CacheKey, CacheState, CacheStore};
pub use catalog::{Catalog, DatasetDescriptor, GraphSource, RemoteFile};
#[cfg(feature = "download")]
pub use download::CurlTransport;
pub use download::Transport;
pub use errors::{HoldoutSpecError, RetrievalError};
pub use preprocess::{PreprocessedMetadata, Preprocessor};
pub use retriever::Retriever;
pub use split::{iterate_holdouts, HoldoutResult, HoldoutSpec, HoldoutState, Holdouts};
