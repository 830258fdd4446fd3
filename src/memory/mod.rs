//! Semantic memory of past planning episodes
//!
//! Records are embedded on write and recalled by cosine similarity.
//! Every store appends a new record under a fresh id.

pub mod embedding;

pub use embedding::{cosine_similarity, Embedder, HashingEmbedder, EMBEDDING_DIM};

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// Store a record, returning its id
    async fn store(&self, text: &str, metadata: Metadata) -> Result<String>;
    /// Up to `k` most similar records, best first
    async fn query(&self, text: &str, k: usize) -> Result<Vec<MemoryHit>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryRecord {
    id: String,
    text: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

pub struct InMemorySemanticStore {
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemorySemanticStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Write all records to a JSON snapshot.
    ///
    /// The JSON goes to a sibling temp file first and is renamed over `path`,
    /// so concurrent saves never leave a torn snapshot behind.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let records = self.records.read().await;
            serde_json::to_string_pretty(&*records)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file_name = path
            .file_name()
            .ok_or_else(|| {
                OrchestrationError::Persistence(format!(
                    "snapshot path {} has no file name",
                    path.display()
                ))
            })?
            .to_string_lossy();
        let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), "Semantic memory snapshot saved");
        Ok(())
    }

    /// Load a snapshot written by `save`. A missing file yields an empty store.
    pub async fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = Self::new(embedder);

        if !tokio::fs::try_exists(path).await? {
            return Ok(store);
        }

        let json = tokio::fs::read_to_string(path).await?;
        let records: Vec<MemoryRecord> = serde_json::from_str(&json)?;

        let dimension = store.embedder.dimension();
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            return Err(OrchestrationError::Persistence(format!(
                "snapshot record {} has dimension {}, expected {}",
                bad.id,
                bad.embedding.len(),
                dimension
            )));
        }

        info!(path = %path.display(), records = records.len(), "Semantic memory loaded");
        *store.records.write().await = records;
        Ok(store)
    }
}

impl Default for InMemorySemanticStore {
    fn default() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }
}

#[async_trait]
impl SemanticStore for InMemorySemanticStore {
    async fn store(&self, text: &str, metadata: Metadata) -> Result<String> {
        let embedding = self.embedder.embed(text).await?;
        let id = Uuid::new_v4().to_string();

        let record = MemoryRecord {
            id: id.clone(),
            text: text.to_string(),
            metadata,
            embedding,
        };

        self.records.write().await.push(record);

        Ok(id)
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<MemoryHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(text).await?;
        let records = self.records.read().await;

        let mut scored: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, cosine_similarity(&query, &r.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let record = &records[i];
                MemoryHit {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                    score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(kind: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("kind".into(), json!(kind));
        m
    }

    #[tokio::test]
    async fn test_query_ranks_similar_first() {
        let store = InMemorySemanticStore::default();
        store
            .store("Dining spend exceeded budget in March", meta("episode"))
            .await
            .unwrap();
        store
            .store("Equity heavy allocation suits a long horizon", meta("episode"))
            .await
            .unwrap();

        let hits = store.query("dining budget", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("Dining"));
        assert_eq!(hits[0].metadata["kind"], "episode");
    }

    #[tokio::test]
    async fn test_same_text_keeps_both_records() {
        let store = InMemorySemanticStore::default();
        let mut first = meta("episode");
        first.insert("profile_id".into(), json!("alice"));
        let mut second = meta("episode");
        second.insert("profile_id".into(), json!("bob"));

        let a = store.store("same episode", first).await.unwrap();
        let b = store.store("same episode", second).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
        let hits = store.query("same episode", 5).await.unwrap();
        let mut owners: Vec<&str> = hits
            .iter()
            .filter_map(|h| h.metadata["profile_id"].as_str())
            .collect();
        owners.sort();
        assert_eq!(owners, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_zero_k_and_empty_store() {
        let store = InMemorySemanticStore::default();
        assert!(store.query("anything", 3).await.unwrap().is_empty());
        store.store("something", Metadata::new()).await.unwrap();
        assert!(store.query("something", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = std::env::temp_dir().join(format!("fp-memory-{}", uuid::Uuid::new_v4()));
        let path = dir.join("memory.json");

        let store = InMemorySemanticStore::default();
        store.store("Emergency fund built", meta("episode")).await.unwrap();
        store.save(&path).await.unwrap();

        let loaded = InMemorySemanticStore::load(&path, Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        assert_eq!(loaded.len().await, 1);
        assert_eq!(
            loaded.query("emergency fund", 1).await.unwrap()[0].text,
            "Emergency fund built"
        );

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_concurrent_saves_leave_valid_snapshot() {
        let dir = std::env::temp_dir().join(format!("fp-concurrent-{}", uuid::Uuid::new_v4()));
        let path = dir.join("memory.json");

        let store = Arc::new(InMemorySemanticStore::default());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                store
                    .store(&format!("episode number {}", i), meta("episode"))
                    .await
                    .unwrap();
                store.save(&path).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        store.save(&path).await.unwrap();

        let loaded = InMemorySemanticStore::load(&path, Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        assert_eq!(loaded.len().await, 8);

        let leftovers = std::fs::read_dir(&dir)
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_load_missing_snapshot_is_empty() {
        let path = std::env::temp_dir().join(format!("fp-missing-{}.json", uuid::Uuid::new_v4()));
        let store = InMemorySemanticStore::load(&path, Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_rejects_dimension_mismatch() {
        let dir = std::env::temp_dir().join(format!("fp-dim-{}", uuid::Uuid::new_v4()));
        let path = dir.join("memory.json");

        let store = InMemorySemanticStore::new(Arc::new(HashingEmbedder::new(8)));
        store.store("short vectors", Metadata::new()).await.unwrap();
        store.save(&path).await.unwrap();

        let err = InMemorySemanticStore::load(&path, Arc::new(HashingEmbedder::default()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OrchestrationError::Persistence(_)));

        let _ = std::fs::remove_dir_all(dir);
    }
}
