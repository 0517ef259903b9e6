pub mod config;
pub mod config_processors;
pub mod error;
pub mod io;
pub mod knn;
pub mod logging;
pub mod metrics;
pub mod ratings;
pub mod resource_index;
pub mod stopwatch;
pub mod storage;

/// Dense identifier handed out by the [`resource_index::ResourceIndex`].
pub type ResourceId = u32;
