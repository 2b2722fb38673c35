//! Storage adapters.
//!
//! The knowledge base lives in an embedded sled database, one tree per
//! named collection.

pub mod sled_store;

pub use sled_store::{CollectionStatus, DistanceMetric, SledVectorStore};
