/// Search-qualifier vector store.
///
/// Documentation sections are embedded and kept in a vector index; the query chain retrieves
/// the top-k sections most similar to the user's request. Two backends implement
/// [`QualifierStore`]: [`InMemoryQualifierStore`] here and
/// [`LanceQualifierStore`](crate::lance_store::LanceQualifierStore) on disk.
///
/// Refreshes are double-buffered: a complete new index is built first and only then swapped in,
/// so concurrent searches always see either the old or the new index in full.
use std::sync::Arc;

use async_trait::async_trait;
use repo_insight_common::embedding::TextEmbedder;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::fetcher::DocsSource;
use crate::model::DocumentSection;

/// Where the sections to index come from.
#[async_trait]
pub trait SectionSource: Send + Sync {
    async fn load(&self) -> Result<Vec<DocumentSection>, AppError>;
}

#[async_trait]
impl SectionSource for DocsSource {
    async fn load(&self) -> Result<Vec<DocumentSection>, AppError> {
        DocsSource::load(self).await
    }
}

#[async_trait]
pub trait QualifierStore: Send + Sync {
    /// Build the index from the source unless one already exists.
    async fn initialize(&self) -> Result<(), AppError>;

    /// Embed and add sections to the active index. Returns the number stored.
    async fn save_documents(&self, docs: Vec<DocumentSection>) -> Result<usize, AppError>;

    /// Top-`k` sections by cosine similarity to `query`, most similar first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<DocumentSection>, AppError>;

    /// Reload the source into a fresh index and swap it in.
    async fn refresh_documents(&self) -> Result<usize, AppError>;
}

impl dyn QualifierStore {
    pub fn get_retriever(self: Arc<Self>, top_k: usize) -> Retriever {
        Retriever {
            store: self,
            top_k,
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn QualifierStore>,
    top_k: usize,
}

impl Retriever {
    pub async fn retrieve(&self, query: &str) -> Result<Vec<DocumentSection>, AppError> {
        self.store.similarity_search(query, self.top_k).await
    }
}

/// Embed each section's content, in order.
pub(crate) async fn embed_sections(
    embedder: &dyn TextEmbedder,
    docs: &[DocumentSection],
) -> Result<Vec<Vec<f32>>, AppError> {
    let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
    let embeddings = embedder.embed_documents(&texts).await?;
    if embeddings.len() != docs.len() {
        return Err(AppError::Common(
            repo_insight_common::error::CommonError::Embedding(format!(
                "embedding count mismatch: expected {}, got {}",
                docs.len(),
                embeddings.len()
            )),
        ));
    }
    Ok(embeddings)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Clone)]
struct IndexedSection {
    section: DocumentSection,
    embedding: Vec<f32>,
}

pub struct InMemoryQualifierStore {
    embedder: Arc<dyn TextEmbedder>,
    source: Arc<dyn SectionSource>,
    active: RwLock<Arc<Vec<IndexedSection>>>,
    /// Serializes writers; readers only touch `active`.
    write_lock: Mutex<()>,
}

impl InMemoryQualifierStore {
    pub fn new(embedder: Arc<dyn TextEmbedder>, source: Arc<dyn SectionSource>) -> Self {
        Self {
            embedder,
            source,
            active: RwLock::new(Arc::new(Vec::new())),
            write_lock: Mutex::new(()),
        }
    }

    async fn index(&self, docs: Vec<DocumentSection>) -> Result<Vec<IndexedSection>, AppError> {
        let embeddings = embed_sections(self.embedder.as_ref(), &docs).await?;
        Ok(docs
            .into_iter()
            .zip(embeddings)
            .map(|(mut section, embedding)| {
                section.id = Some(Uuid::new_v4());
                IndexedSection { section, embedding }
            })
            .collect())
    }

    async fn rebuild(&self) -> Result<usize, AppError> {
        let docs = self.source.load().await?;
        if docs.is_empty() {
            warn!("documentation source returned no sections, keeping current index");
            return Ok(0);
        }
        let next = self.index(docs).await?;
        let count = next.len();
        *self.active.write().await = Arc::new(next);
        Ok(count)
    }
}

#[async_trait]
impl QualifierStore for InMemoryQualifierStore {
    async fn initialize(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        if !self.active.read().await.is_empty() {
            info!("in-memory qualifier index already built");
            return Ok(());
        }
        let count = self.rebuild().await?;
        info!(sections = count, "in-memory qualifier index built");
        Ok(())
    }

    async fn save_documents(&self, docs: Vec<DocumentSection>) -> Result<usize, AppError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;
        let added = self.index(docs).await?;
        let count = added.len();

        let current = Arc::clone(&*self.active.read().await);
        let mut next: Vec<IndexedSection> = current.as_ref().clone();
        next.extend(added);
        *self.active.write().await = Arc::new(next);
        Ok(count)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<DocumentSection>, AppError> {
        let snapshot = Arc::clone(&*self.active.read().await);
        if snapshot.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_query(query).await?;

        let mut scored: Vec<(f32, &IndexedSection)> = snapshot
            .iter()
            .map(|s| (cosine_similarity(&query_embedding, &s.embedding), s))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, s)| s.section.clone())
            .collect())
    }

    async fn refresh_documents(&self) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let count = self.rebuild().await?;
        info!(sections = count, "in-memory qualifier index refreshed");
        Ok(count)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn store(source: Arc<StaticSource>) -> Arc<dyn QualifierStore> {
        Arc::new(InMemoryQualifierStore::new(Arc::new(KeywordEmbedder), source))
    }

    #[test]
    fn cosine_similarity_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn retriever_returns_most_similar_sections_first() {
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store = store(Arc::clone(&source));
        store.initialize().await.unwrap();

        let retriever = Arc::clone(&store).get_retriever(2);
        let docs = retriever.retrieve("repos with many stars").await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].metadata.topic.as_deref(),
            Some("Search by number of stars")
        );
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store = store(Arc::clone(&source));
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(source.load_count(), 1);
    }

    #[tokio::test]
    async fn refresh_swaps_in_the_new_generation() {
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store = store(Arc::clone(&source));
        store.initialize().await.unwrap();

        source.replace(vec![section("Search by license", "license:mit")]);
        assert_eq!(store.refresh_documents().await.unwrap(), 1);

        let docs = store.similarity_search("stars", 5).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.topic.as_deref(), Some("Search by license"));
    }

    #[tokio::test]
    async fn empty_refresh_keeps_current_index() {
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store = store(Arc::clone(&source));
        store.initialize().await.unwrap();

        source.replace(Vec::new());
        assert_eq!(store.refresh_documents().await.unwrap(), 0);
        assert_eq!(store.similarity_search("topic", 5).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn save_documents_appends() {
        let source = Arc::new(StaticSource::new(Vec::new()));
        let store = store(source);
        assert_eq!(
            store
                .save_documents(vec![section("Search by license", "license:apache-2.0")])
                .await
                .unwrap(),
            1
        );
        let docs = store.similarity_search("license", 1).await.unwrap();
        assert_eq!(docs[0].metadata.topic.as_deref(), Some("Search by license"));
    }

    #[tokio::test]
    async fn stored_sections_get_distinct_ids() {
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store = store(source);
        store.initialize().await.unwrap();
        store
            .save_documents(vec![section("Search by license", "license:mit")])
            .await
            .unwrap();

        let docs = store.similarity_search("license", 10).await.unwrap();
        assert_eq!(docs.len(), 4);
        let ids: std::collections::HashSet<_> = docs.iter().map(|d| d.id.unwrap()).collect();
        assert_eq!(ids.len(), 4);
    }
}
