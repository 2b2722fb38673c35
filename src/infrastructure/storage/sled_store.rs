use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bincode::Options;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Config, Db, IVec, Tree};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::services::VectorStore,
    domain::{DomainError, RetrievedDocument, StoredDocument},
};

/// Registry of known collections: name -> bincode(`CollectionMeta`).
const REGISTRY_TREE: &str = "__collections";
const COLLECTION_PREFIX: &str = "collection/";

/// Distance function of a collection, named after Chroma's `hnsw:space`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// `1 - cosine similarity`.
    Cosine,
    /// `1 - dot product`.
    Ip,
}

impl DistanceMetric {
    pub fn distance(&self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => query
                .iter()
                .zip(candidate)
                .map(|(q, c)| (q - c) * (q - c))
                .sum(),
            DistanceMetric::Ip => 1.0 - dot(query, candidate),
            DistanceMetric::Cosine => {
                let denom = norm(query) * norm(candidate);
                if denom == 0.0 {
                    1.0
                } else {
                    1.0 - (dot(query, candidate) / denom).clamp(-1.0, 1.0)
                }
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Ip => "ip",
        };
        f.write_str(name)
    }
}

impl FromStr for DistanceMetric {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            "ip" => Ok(DistanceMetric::Ip),
            other => Err(DomainError::validation(format!(
                "unknown distance metric `{other}` (expected l2, cosine or ip)"
            ))),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    metric: DistanceMetric,
}

/// Whether [`SledVectorStore::open`] found the collection or had to create it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Existing,
    Created,
}

/// Knowledge base collection backed by `sled`.
///
/// Each named collection lives in its own tree holding full `StoredDocument`
/// payloads. Queries are an exhaustive scan, which is fine for the few
/// hundred thousand documents a call-centre dump produces.
pub struct SledVectorStore {
    db: Db,
    documents: Tree,
    collection: String,
    metric: DistanceMetric,
    status: CollectionStatus,
    _data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SledVectorStore {
    /// Opens the collection, creating it when the registry has no entry.
    ///
    /// An existing collection keeps the metric it was created with.
    pub fn open(
        data_dir: impl AsRef<Path>,
        collection: &str,
        metric: DistanceMetric,
    ) -> Result<Self, DomainError> {
        let db = Self::open_db(data_dir.as_ref())?;
        Self::with_db(db, data_dir.as_ref(), collection, Some(metric))
    }

    /// Opens a collection that must already exist.
    pub fn open_existing(data_dir: impl AsRef<Path>, collection: &str) -> Result<Self, DomainError> {
        let db = Self::open_db(data_dir.as_ref())?;
        Self::with_db(db, data_dir.as_ref(), collection, None)
    }

    fn open_db(dir: &Path) -> Result<Db, DomainError> {
        std::fs::create_dir_all(dir).map_err(|err| {
            DomainError::storage(format!("failed to create data directory {:?}: {err}", dir))
        })?;

        Config::default()
            .path(dir)
            .cache_capacity(64 * 1024 * 1024)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open sled db: {err}")))
    }

    fn with_db(
        db: Db,
        dir: &Path,
        collection: &str,
        create_with: Option<DistanceMetric>,
    ) -> Result<Self, DomainError> {
        let name = collection.trim();
        if name.is_empty() {
            return Err(DomainError::validation("collection name cannot be empty"));
        }

        let registry = db
            .open_tree(REGISTRY_TREE)
            .map_err(|err| DomainError::storage(format!("failed to open registry: {err}")))?;

        let existing = registry
            .get(name.as_bytes())
            .map_err(|err| DomainError::storage(format!("failed to read registry: {err}")))?;

        let (metric, status) = match (existing, create_with) {
            (Some(bytes), requested) => {
                let meta: CollectionMeta = Self::deserialize(bytes.as_ref())?;
                if let Some(requested) = requested.filter(|m| *m != meta.metric) {
                    warn!(
                        target: "kcc::store",
                        collection = name,
                        stored = %meta.metric,
                        %requested,
                        "collection keeps the metric it was created with"
                    );
                }
                (meta.metric, CollectionStatus::Existing)
            }
            (None, Some(metric)) => {
                let meta = Self::serialize(&CollectionMeta { metric })?;
                registry
                    .insert(name.as_bytes(), meta)
                    .map_err(|err| DomainError::storage(format!("failed to register collection: {err}")))?;
                registry
                    .flush()
                    .map_err(|err| DomainError::storage(format!("failed to flush registry: {err}")))?;
                info!(target: "kcc::store", collection = name, %metric, "created empty collection");
                (metric, CollectionStatus::Created)
            }
            (None, None) => {
                return Err(DomainError::not_found(format!("collection `{name}`")));
            }
        };

        let documents = db
            .open_tree(format!("{COLLECTION_PREFIX}{name}"))
            .map_err(|err| DomainError::storage(format!("failed to open collection tree: {err}")))?;

        Ok(Self {
            db,
            documents,
            collection: name.to_string(),
            metric,
            status,
            _data_dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| DomainError::storage(format!("serialization error: {err}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes)
            .map_err(|err| DomainError::storage(format!("deserialization error: {err}")))
    }

    fn encode_key(id: &Uuid) -> [u8; 16] {
        *id.as_bytes()
    }

    fn decode_document(bytes: &IVec) -> Result<StoredDocument, DomainError> {
        Self::deserialize(bytes.as_ref())
    }
}

impl VectorStore for SledVectorStore {
    fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievedDocument>, DomainError> {
        let mut scored: Vec<RetrievedDocument> = Vec::new();
        if limit == 0 {
            return Ok(scored);
        }

        for entry in self.documents.iter() {
            let (_, value) = entry.map_err(|err| {
                DomainError::search(format!("failed to read document: {err}"))
            })?;
            let document = Self::decode_document(&value).map_err(DomainError::into_search)?;

            if document.embedding.len() != vector.len() {
                return Err(DomainError::search(format!(
                    "embedding dimension mismatch: query {} vs stored {}",
                    vector.len(),
                    document.embedding.len()
                )));
            }

            let distance = self.metric.distance(vector, &document.embedding);
            scored.push(RetrievedDocument::new(document.text, distance));
        }

        // Stable sort keeps storage order among equal distances.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);

        Ok(scored)
    }

    fn persist(&self, document: &StoredDocument) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();

        let bytes = Self::serialize(document)?;
        self.documents
            .insert(Self::encode_key(&document.id), bytes)
            .map_err(|err| DomainError::storage(format!("failed to persist document: {err}")))?;

        self.documents
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush documents: {err}")))?;

        Ok(())
    }

    fn count(&self) -> Result<usize, DomainError> {
        Ok(self.documents.len())
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.db
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush db: {err}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc(text: &str, embedding: Vec<f32>) -> StoredDocument {
        StoredDocument::new(text, None, embedding)
    }

    #[test]
    fn open_creates_then_finds_collection() {
        let dir = tempdir().unwrap();
        {
            let store = SledVectorStore::open(dir.path(), "kcc_farm_qa", DistanceMetric::L2).unwrap();
            assert_eq!(store.status(), CollectionStatus::Created);
            assert_eq!(store.count().unwrap(), 0);
        }

        let store = SledVectorStore::open(dir.path(), "kcc_farm_qa", DistanceMetric::Cosine).unwrap();
        assert_eq!(store.status(), CollectionStatus::Existing);
        assert_eq!(store.metric(), DistanceMetric::L2);
    }

    #[test]
    fn open_existing_reports_missing_collection() {
        let dir = tempdir().unwrap();
        let err = SledVectorStore::open_existing(dir.path(), "absent").err().unwrap();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn query_orders_by_ascending_distance() {
        let dir = tempdir().unwrap();
        let store = SledVectorStore::open(dir.path(), "kcc", DistanceMetric::L2).unwrap();
        store.persist(&doc("far", vec![0.0, 1.0])).unwrap();
        store.persist(&doc("exact", vec![1.0, 0.0])).unwrap();
        store.persist(&doc("near", vec![0.8, 0.6])).unwrap();

        let hits = store.query(&[1.0, 0.0], 2).unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, ["exact", "near"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 0.4).abs() < 1e-5);
    }

    #[test]
    fn collections_are_isolated() {
        let dir = tempdir().unwrap();
        let db = SledVectorStore::open_db(dir.path()).unwrap();
        let a = SledVectorStore::with_db(db.clone(), dir.path(), "a", Some(DistanceMetric::L2)).unwrap();
        let b = SledVectorStore::with_db(db, dir.path(), "b", Some(DistanceMetric::L2)).unwrap();

        a.persist(&doc("only in a", vec![1.0])).unwrap();
        assert_eq!(a.count().unwrap(), 1);
        assert_eq!(b.count().unwrap(), 0);
        assert!(b.query(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_a_search_error() {
        let dir = tempdir().unwrap();
        let store = SledVectorStore::open(dir.path(), "kcc", DistanceMetric::L2).unwrap();
        store.persist(&doc("three dims", vec![1.0, 0.0, 0.0])).unwrap();

        let err = store.query(&[1.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, DomainError::Search(_)));
    }

    #[test]
    fn metrics_follow_chroma_definitions() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((DistanceMetric::L2.distance(&a, &b) - 2.0).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!((DistanceMetric::Ip.distance(&a, &a)).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&a, &[0.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn metric_parses_from_config_names() {
        assert_eq!("Cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::Ip.to_string(), "ip");
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
