/// LanceDB vector database wrapper.
///
/// Provides a typed interface over LanceDB for storing and searching vector embeddings.
/// Similarity search uses cosine distance; callers own their table schemas.
use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchIterator};
use arrow_schema::Schema;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
pub use lancedb::Table;
use tracing::info;

use crate::error::CommonError;

pub struct VectorDb {
    db: lancedb::Connection,
}

impl VectorDb {
    /// Connect to a LanceDB database at the given filesystem path.
    pub async fn connect(path: &str) -> Result<Self, CommonError> {
        let db = lancedb::connect(path)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("connection failed: {e}")))?;
        Ok(Self { db })
    }

    /// Names of all tables in the database.
    pub async fn table_names(&self) -> Result<Vec<String>, CommonError> {
        self.db
            .table_names()
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("listing tables failed: {e}")))
    }

    /// Create a new table with the given schema and data and return a handle to it. Fails if
    /// the table exists.
    pub async fn create_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
        batches: Vec<RecordBatch>,
    ) -> Result<Table, CommonError> {
        let batch_iter = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
        let table = self
            .db
            .create_table(table_name, Box::new(batch_iter))
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("create table failed: {e}")))?;

        info!(table = table_name, "vector table created");
        Ok(table)
    }

    pub async fn open_table(&self, table_name: &str) -> Result<Table, CommonError> {
        self.db
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("open table failed: {e}")))
    }

    /// Append rows through an open table handle.
    pub async fn append(
        &self,
        table: &Table,
        schema: Arc<Schema>,
        batches: Vec<RecordBatch>,
    ) -> Result<(), CommonError> {
        let batch_iter = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
        table
            .add(Box::new(batch_iter))
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("append failed: {e}")))?;
        Ok(())
    }

    pub async fn drop_table(&self, table_name: &str) -> Result<(), CommonError> {
        self.db
            .drop_table(table_name)
            .await
            .map_err(|e| CommonError::VectorDb(format!("drop table failed: {e}")))?;
        info!(table = table_name, "vector table dropped");
        Ok(())
    }

    /// Search for the nearest vectors to the given query embedding by cosine distance.
    ///
    /// Returns up to `limit` results as RecordBatches, including a `_distance` column
    /// added by LanceDB.
    pub async fn search(
        &self,
        table: &Table,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RecordBatch>, CommonError> {
        let results = table
            .vector_search(query_embedding)
            .map_err(|e| CommonError::VectorDb(format!("vector search setup failed: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("vector search failed: {e}")))?;

        futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| CommonError::VectorDb(format!("collecting search results failed: {e}")))
    }
}
