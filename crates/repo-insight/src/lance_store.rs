/// LanceDB-backed qualifier store.
///
/// Each index generation is its own table, `<index>__<namespace>__<generation>`. A refresh
/// writes the next generation in full and swaps it in. Searches hold the generation they
/// started on, and a replaced table is dropped once its last search finishes. On startup the
/// newest existing generation is reused and stale ones are removed.
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use repo_insight_common::embedding::TextEmbedder;
use repo_insight_common::error::CommonError;
use repo_insight_common::vectordb::{Table, VectorDb};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{DocumentSection, SectionMetadata};
use crate::store::{embed_sections, QualifierStore, SectionSource};

/// A published index table.
struct Generation {
    name: String,
    table: Table,
}

pub struct LanceQualifierStore {
    db: Arc<VectorDb>,
    embedder: Arc<dyn TextEmbedder>,
    source: Arc<dyn SectionSource>,
    table_prefix: String,
    active: RwLock<Option<Arc<Generation>>>,
    /// Replaced generations still held by in-flight searches.
    retired: Mutex<Vec<Arc<Generation>>>,
    /// Last generation number handed out; also serializes writers.
    generation: Mutex<u64>,
}

impl LanceQualifierStore {
    pub fn new(
        db: Arc<VectorDb>,
        embedder: Arc<dyn TextEmbedder>,
        source: Arc<dyn SectionSource>,
        index_name: &str,
        namespace: &str,
    ) -> Self {
        Self {
            db,
            embedder,
            source,
            table_prefix: format!("{index_name}__{namespace}__"),
            active: RwLock::new(None),
            retired: Mutex::new(Vec::new()),
            generation: Mutex::new(0),
        }
    }

    fn table_name(&self, generation: u64) -> String {
        format!("{}{generation:08}", self.table_prefix)
    }

    fn parse_generation(&self, table: &str) -> Option<u64> {
        table.strip_prefix(&self.table_prefix)?.parse().ok()
    }

    #[cfg(test)]
    async fn active_table(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|g| g.name.clone())
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("topic", DataType::Utf8, true),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.embedder.dimensions() as i32,
                ),
                false,
            ),
        ]))
    }

    async fn build_batch(&self, docs: &[DocumentSection]) -> Result<RecordBatch, AppError> {
        let embeddings = embed_sections(self.embedder.as_ref(), docs).await?;
        let dims = self.embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dims) {
            return Err(CommonError::Embedding(format!(
                "embedding has {} dimensions, index expects {dims}",
                bad.len()
            ))
            .into());
        }

        let ids: Vec<String> = docs.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let topics: Vec<Option<&str>> = docs
            .iter()
            .map(|d| d.metadata.topic.as_deref())
            .collect();
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();

        let flat_values: Vec<f32> = embeddings.iter().flat_map(|e| e.iter().copied()).collect();
        let embedding_array: ArrayRef = Arc::new(
            FixedSizeListArray::try_new(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dims as i32,
                Arc::new(Float32Array::from(flat_values)),
                None,
            )
            .map_err(|e| CommonError::VectorDb(format!("failed to build embedding array: {e}")))?,
        );

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(topics)),
                Arc::new(StringArray::from(contents)),
                embedding_array,
            ],
        )
        .map_err(|e| {
            AppError::Common(CommonError::VectorDb(format!(
                "failed to build record batch: {e}"
            )))
        })
    }

    /// Write a complete new generation and make it active. Caller holds `generation`.
    async fn publish_generation(
        &self,
        generation: &mut u64,
        docs: &[DocumentSection],
    ) -> Result<usize, AppError> {
        let batch = self.build_batch(docs).await?;
        let next = *generation + 1;
        let name = self.table_name(next);
        let table = self.db.create_table(&name, self.schema(), vec![batch]).await?;
        *generation = next;

        let published = Arc::new(Generation {
            name: name.clone(),
            table,
        });
        let previous = self.active.write().await.replace(published);
        info!(table = %name, sections = docs.len(), "qualifier index generation active");

        if let Some(old) = previous {
            self.retired.lock().await.push(old);
        }
        self.drop_released_generations().await;
        Ok(docs.len())
    }

    /// Drop retired tables that no search holds any more.
    async fn drop_released_generations(&self) {
        let released: Vec<Arc<Generation>> = {
            let mut retired = self.retired.lock().await;
            let (released, leased): (Vec<_>, Vec<_>) = retired
                .drain(..)
                .partition(|g| Arc::strong_count(g) == 1);
            *retired = leased;
            released
        };
        for old in released {
            if let Err(e) = self.db.drop_table(&old.name).await {
                warn!(table = %old.name, error = %e, "failed to drop previous index generation");
            }
        }
    }

    async fn search_generation(
        &self,
        generation: &Generation,
        query: &str,
        k: usize,
    ) -> Result<Vec<DocumentSection>, AppError> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let batches = self
            .db
            .search(&generation.table, &query_embedding, k)
            .await?;
        Ok(extract_sections(&batches))
    }
}

#[async_trait]
impl QualifierStore for LanceQualifierStore {
    async fn initialize(&self) -> Result<(), AppError> {
        let mut generation = self.generation.lock().await;
        if self.active.read().await.is_some() {
            return Ok(());
        }

        let mut existing: Vec<(u64, String)> = self
            .db
            .table_names()
            .await?
            .into_iter()
            .filter_map(|t| self.parse_generation(&t).map(|g| (g, t)))
            .collect();
        existing.sort();

        if let Some((latest, name)) = existing.pop() {
            for (_, stale) in &existing {
                if let Err(e) = self.db.drop_table(stale).await {
                    warn!(table = %stale, error = %e, "failed to drop stale index generation");
                }
            }
            let table = self.db.open_table(&name).await?;
            *generation = latest;
            info!(table = %name, "reusing existing qualifier index");
            *self.active.write().await = Some(Arc::new(Generation { name, table }));
            return Ok(());
        }

        let docs = self.source.load().await?;
        if docs.is_empty() {
            warn!("documentation source returned no sections, qualifier index left empty");
            return Ok(());
        }
        self.publish_generation(&mut generation, &docs).await?;
        Ok(())
    }

    async fn save_documents(&self, docs: Vec<DocumentSection>) -> Result<usize, AppError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let mut generation = self.generation.lock().await;
        let active = self.active.read().await.clone();
        match active {
            Some(current) => {
                let batch = self.build_batch(&docs).await?;
                self.db
                    .append(&current.table, self.schema(), vec![batch])
                    .await?;
                Ok(docs.len())
            }
            None => self.publish_generation(&mut generation, &docs).await,
        }
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<DocumentSection>, AppError> {
        let Some(current) = self.active.read().await.clone() else {
            warn!("similarity search before the qualifier index was built");
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let result = self.search_generation(&current, query, k).await;
        drop(current);
        self.drop_released_generations().await;
        result
    }

    async fn refresh_documents(&self) -> Result<usize, AppError> {
        let mut generation = self.generation.lock().await;
        let docs = self.source.load().await?;
        if docs.is_empty() {
            warn!("documentation source returned no sections, keeping current index");
            return Ok(0);
        }
        self.publish_generation(&mut generation, &docs).await
    }
}

/// Expected columns: id, topic (nullable), content, all Utf8. Rows arrive nearest first.
fn extract_sections(batches: &[RecordBatch]) -> Vec<DocumentSection> {
    let mut sections = Vec::new();

    for batch in batches {
        let schema = batch.schema();
        let id_col = get_string_column(batch, &schema, "id");
        let topic_col = get_string_column(batch, &schema, "topic");
        let content_col = get_string_column(batch, &schema, "content");

        let (Some(topic_col), Some(content_col)) = (topic_col, content_col) else {
            warn!("search result batch missing expected columns");
            continue;
        };

        for row in 0..batch.num_rows() {
            let id = id_col.and_then(|c| Uuid::parse_str(c.value(row)).ok());
            let topic = (!topic_col.is_null(row)).then(|| topic_col.value(row).to_string());
            sections.push(DocumentSection {
                id,
                content: content_col.value(row).to_string(),
                metadata: SectionMetadata { topic },
            });
        }
    }

    sections
}

fn get_string_column<'a>(
    batch: &'a RecordBatch,
    schema: &Schema,
    name: &str,
) -> Option<&'a StringArray> {
    let idx = schema.index_of(name).ok()?;
    batch.column(idx).as_any().downcast_ref::<StringArray>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use crate::store::testing::{
        qualifier_docs, section, KeywordEmbedder, SlowQueryEmbedder, StaticSource,
    };

    async fn open(dir: &tempfile::TempDir, source: Arc<StaticSource>) -> LanceQualifierStore {
        let db = VectorDb::connect(dir.path().to_str().unwrap()).await.unwrap();
        LanceQualifierStore::new(
            Arc::new(db),
            Arc::new(KeywordEmbedder),
            source,
            "github-search-qualifiers",
            "repo-qualifiers",
        )
    }

    #[tokio::test]
    async fn builds_then_searches_first_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, Arc::new(StaticSource::new(qualifier_docs()))).await;
        store.initialize().await.unwrap();

        assert_eq!(
            store.active_table().await.as_deref(),
            Some("github-search-qualifiers__repo-qualifiers__00000001")
        );
        let docs = store.similarity_search("topic labels", 1).await.unwrap();
        assert_eq!(docs[0].metadata.topic.as_deref(), Some("Search by topic"));
    }

    #[tokio::test]
    async fn refresh_replaces_generation_and_drops_old_table() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store = open(&dir, Arc::clone(&source)).await;
        store.initialize().await.unwrap();

        source.replace(vec![section("Search by license", "license:mit")]);
        assert_eq!(store.refresh_documents().await.unwrap(), 1);

        let tables = store.db.table_names().await.unwrap();
        assert_eq!(
            tables,
            vec!["github-search-qualifiers__repo-qualifiers__00000002".to_string()]
        );
        let docs = store.similarity_search("stars", 5).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn reopening_reuses_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let first = open(&dir, Arc::new(StaticSource::new(qualifier_docs()))).await;
        first.initialize().await.unwrap();

        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let second = open(&dir, Arc::clone(&source)).await;
        second.initialize().await.unwrap();

        assert_eq!(source.load_count(), 0);
        assert_eq!(second.similarity_search("language", 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn save_appends_to_active_generation_with_fresh_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, Arc::new(StaticSource::new(qualifier_docs()))).await;
        store.initialize().await.unwrap();

        let saved = store
            .save_documents(vec![section("Search by license", "license:mit")])
            .await
            .unwrap();
        assert_eq!(saved, 1);
        assert_eq!(
            store.active_table().await.as_deref(),
            Some("github-search-qualifiers__repo-qualifiers__00000001")
        );

        let docs = store.similarity_search("license", 10).await.unwrap();
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].metadata.topic.as_deref(), Some("Search by license"));
        let ids: HashSet<Uuid> = docs.iter().map(|d| d.id.unwrap()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn search_spanning_a_refresh_reads_the_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(VectorDb::connect(dir.path().to_str().unwrap()).await.unwrap());
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store = Arc::new(LanceQualifierStore::new(
            Arc::clone(&db),
            Arc::new(SlowQueryEmbedder(Duration::from_secs(1))),
            Arc::clone(&source) as Arc<dyn SectionSource>,
            "idx",
            "ns",
        ));
        store.initialize().await.unwrap();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.similarity_search("stars", 5).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        source.replace(vec![section("Search by license", "license:mit")]);
        assert_eq!(store.refresh_documents().await.unwrap(), 1);
        // The in-flight search still holds generation 1.
        assert_eq!(db.table_names().await.unwrap().len(), 2);

        let docs = reader.await.unwrap().unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(
            db.table_names().await.unwrap(),
            vec!["idx__ns__00000002".to_string()]
        );
    }
}
