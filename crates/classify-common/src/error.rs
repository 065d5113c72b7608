/// Infrastructure errors shared by the classifier crates.
///
/// These cover the backends behind classification (Redis, LanceDB, the embedding model).
/// Crate-level error enums wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("vector db error: {0}")]
    VectorDb(String),

    #[error("embedding error: {0}")]
    Embedding(String),
}
