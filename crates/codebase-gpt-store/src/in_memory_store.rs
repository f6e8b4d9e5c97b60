use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::vector_store::{
    BoxFuture, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
};

type Payload = HashMap<String, serde_json::Value>;
type Collections = HashMap<String, Collection>;

struct Collection {
    dimension: usize,
    points: HashMap<String, (Vec<f32>, Payload)>,
}

impl Collection {
    fn matching<'a>(
        &'a self,
        filter: Option<&'a VectorFilter>,
    ) -> impl Iterator<Item = (&'a String, &'a (Vec<f32>, Payload))> {
        self.points
            .iter()
            .filter(move |(_, (_, payload))| filter.is_none_or(|f| f.matches(payload)))
    }
}

/// Process-local store. Contents vanish with the process.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<Collections>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
        err: fn(String) -> VectorStoreError,
    ) -> Result<RwLockReadGuard<'_, Collections>, VectorStoreError> {
        self.collections.read().map_err(|e| err(e.to_string()))
    }

    fn write(
        &self,
        err: fn(String) -> VectorStoreError,
    ) -> Result<RwLockWriteGuard<'_, Collections>, VectorStoreError> {
        self.collections.write().map_err(|e| err(e.to_string()))
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .collections
            .read()
            .map(|cols| cols.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("InMemoryVectorStore")
            .field("collections", &names)
            .finish()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let dimension = usize::try_from(vector_size)
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            self.write(VectorStoreError::Collection)?
                .entry(name)
                .or_insert_with(|| Collection {
                    dimension,
                    points: HashMap::new(),
                });
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move { Ok(self.read(VectorStoreError::Collection)?.contains_key(&name)) })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.write(VectorStoreError::Upsert)?;
            let col = cols
                .get_mut(&name)
                .ok_or_else(|| VectorStoreError::Upsert(format!("collection {name} not found")))?;
            if let Some(bad) = points.iter().find(|p| p.vector.len() != col.dimension) {
                return Err(VectorStoreError::Upsert(format!(
                    "point {} has dimension {}, collection {name} expects {}",
                    bad.id,
                    bad.vector.len(),
                    col.dimension
                )));
            }
            col.points
                .extend(points.into_iter().map(|p| (p.id, (p.vector, p.payload))));
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let cols = self.read(VectorStoreError::Search)?;
            let col = cols
                .get(&name)
                .ok_or_else(|| VectorStoreError::Search(format!("collection {name} not found")))?;

            let mut hits: Vec<ScoredVectorPoint> = col
                .matching(filter.as_ref())
                .map(|(id, (stored, payload))| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, stored),
                    payload: payload.clone(),
                })
                .collect();
            // Ties break on id so results are stable across runs.
            hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(hits)
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            if let Some(col) = self.write(VectorStoreError::Delete)?.get_mut(&name) {
                col.points.retain(|_, (_, payload)| !filter.matches(payload));
            }
            Ok(())
        })
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let name = collection.to_owned();
        Box::pin(async move {
            let cols = self.read(VectorStoreError::Count)?;
            let n = cols
                .get(&name)
                .map_or(0, |col| col.matching(filter.as_ref()).count());
            u64::try_from(n).map_err(|e| VectorStoreError::Count(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, namespace: &str) -> VectorPoint {
        let mut payload = HashMap::new();
        payload.insert("namespace".into(), serde_json::json!(namespace));
        VectorPoint {
            id: id.into(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn ensure_collection_and_exists() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("c").await.unwrap());
        store.ensure_collection("c", 3).await.unwrap();
        assert!(store.collection_exists("c").await.unwrap());
        store.ensure_collection("c", 3).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_requires_collection() {
        let store = InMemoryVectorStore::new();
        let err = store
            .upsert("missing", vec![point("a", vec![1.0], "ns")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Upsert(_)));
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        let err = store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "ns")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimension 2"));
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("far", vec![0.0, 1.0], "ns"),
                    point("near", vec![1.0, 0.1], "ns"),
                ],
            )
            .await
            .unwrap();

        let results = store.search("c", vec![1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "near");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn search_with_filter_isolates_namespace() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0, 0.0], "https://github.com/acme/widget"),
                    point("b", vec![1.0, 0.0], "https://github.com/acme/gadget"),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter::text_eq("namespace", "https://github.com/acme/widget");
        let results = store
            .search("c", vec![1.0, 0.0], 10, Some(filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        let points = (0..5)
            .map(|i| point(&i.to_string(), vec![1.0], "ns"))
            .collect();
        store.upsert("c", points).await.unwrap();
        let results = store.search("c", vec![1.0], 3, None).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn delete_by_filter_and_count() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 1).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0], "x"),
                    point("b", vec![1.0], "x"),
                    point("c", vec![1.0], "y"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count("c", None).await.unwrap(), 3);
        assert_eq!(
            store
                .count("c", Some(VectorFilter::text_eq("namespace", "x")))
                .await
                .unwrap(),
            2
        );

        store
            .delete_by_filter("c", VectorFilter::text_eq("namespace", "x"))
            .await
            .unwrap();
        assert_eq!(store.count("c", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn count_missing_collection_is_zero() {
        let store = InMemoryVectorStore::new();
        assert_eq!(store.count("nope", None).await.unwrap(), 0);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!((cosine_similarity(&[0.0, 0.0], &[1.0, 0.0])).abs() < f32::EPSILON);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
