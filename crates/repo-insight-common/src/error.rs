/// Error types shared by the repo-insight crates.
///
/// These errors represent failures in infrastructure components (Redis, vector DB, embeddings).
/// Application-specific errors are defined in the server crate and wrap `CommonError` via
/// `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("vector db error: {0}")]
    VectorDb(String),

    #[error("embedding error: {0}")]
    Embedding(String),
}
