//! Retrieve catalogued graph datasets once, cache them on disk, and split
//! them into reproducible train/test holdouts.

pub mod datasets;
pub mod graph;

pub use datasets::{
    iterate_holdouts, AutomaticGraphBuilder, CacheConfig, Catalog, DatasetDescriptor,
    HoldoutSpec, RetrievalError,
};
pub use graph::{EdgeListEngine, EdgeListGraph, GraphEngine, GraphOptions, SpeedupOps};
