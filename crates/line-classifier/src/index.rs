/// Index service for the category similarity index.
///
/// Exports the hierarchy as documents, embeds them and writes them to LanceDB. A SHA-256
/// fingerprint of the documents is kept in Redis so an unchanged hierarchy is not
/// re-embedded on every start.
use std::sync::Arc;

use arrow_array::{ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::category::CategoryTree;
use crate::documents::{hierarchy_to_documents, CategoryDocument};
use crate::error::AppError;
use crate::vector::path_column;
use classify_common::embedding::Embedder;
use classify_common::error::CommonError;
use classify_common::redis::RedisCache;
use classify_common::vectordb::VectorDb;

pub const CATEGORY_TABLE: &str = "categories";

const KEY_PREFIX: &str = "lic:v1:";

/// Redis-backed store for the fingerprint of what is currently indexed.
pub struct IndexCache {
    redis: RedisCache,
}

impl IndexCache {
    pub fn new(redis: RedisCache) -> Self {
        Self { redis }
    }

    pub async fn get_fingerprint(&self, table: &str) -> Option<String> {
        self.redis.get(&fingerprint_key(table)).await
    }

    pub async fn set_fingerprint(&self, table: &str, fingerprint: &str) {
        self.redis.set(&fingerprint_key(table), fingerprint).await;
    }

    pub async fn invalidate(&self, table: &str) {
        self.redis.delete(&fingerprint_key(table)).await;
    }
}

fn fingerprint_key(table: &str) -> String {
    format!("{KEY_PREFIX}index:{table}:fingerprint")
}

/// Result of an indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    /// False when the index was already current.
    pub updated: bool,
    pub fingerprint: String,
    pub document_count: usize,
}

pub struct IndexService {
    embedder: Arc<Embedder>,
    vectordb: Arc<VectorDb>,
    cache: Arc<IndexCache>,
    table: String,
}

impl IndexService {
    pub fn new(
        embedder: Arc<Embedder>,
        vectordb: Arc<VectorDb>,
        cache: Arc<IndexCache>,
        table: &str,
    ) -> Self {
        Self {
            embedder,
            vectordb,
            cache,
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// True unless the cached fingerprint matches and the table still exists.
    pub async fn needs_update(&self, fingerprint: &str) -> Result<bool, AppError> {
        match self.cache.get_fingerprint(&self.table).await {
            Some(cached) if cached == fingerprint => {
                if self.vectordb.table_exists(&self.table).await? {
                    Ok(false)
                } else {
                    info!(table = %self.table, "vector table missing, re-index needed");
                    Ok(true)
                }
            }
            _ => Ok(true),
        }
    }

    /// Embed every document and replace the table.
    pub async fn full_reindex(&self, documents: &[CategoryDocument]) -> Result<String, AppError> {
        let fingerprint = fingerprint(documents, self.embedder.dimensions());
        info!(table = %self.table, documents = documents.len(), "starting full re-index");

        self.cache.invalidate(&self.table).await;

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        let batch = build_record_batch(documents, &embeddings, self.embedder.dimensions())?;
        let schema = batch.schema();
        self.vectordb
            .create_or_replace_table(&self.table, schema, vec![batch])
            .await?;

        self.cache.set_fingerprint(&self.table, &fingerprint).await;
        info!(table = %self.table, fingerprint = %fingerprint, "re-index complete");
        Ok(fingerprint)
    }

    /// Index `tree` unless the index already holds exactly these documents.
    pub async fn ensure_indexed(
        &self,
        tree: &CategoryTree,
        force: bool,
    ) -> Result<IndexReport, AppError> {
        let documents = hierarchy_to_documents(tree);
        let current = fingerprint(&documents, self.embedder.dimensions());

        if !force && !self.needs_update(&current).await? {
            info!(table = %self.table, fingerprint = %current, "index up to date, skipping re-index");
            return Ok(IndexReport {
                updated: false,
                fingerprint: current,
                document_count: documents.len(),
            });
        }

        let fingerprint = self.full_reindex(&documents).await?;
        Ok(IndexReport {
            updated: true,
            fingerprint,
            document_count: documents.len(),
        })
    }
}

/// Stable hex digest of the documents and the embedding width.
pub fn fingerprint(documents: &[CategoryDocument], dimensions: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dimensions.to_string().as_bytes());
    for doc in documents {
        hasher.update(b"\x1e");
        for field in [doc.code.as_str(), doc.name.as_str(), doc.text.as_str()] {
            hasher.update(field.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(doc.level.to_string().as_bytes());
        for ancestor in &doc.path {
            hasher.update(b"\x1f");
            hasher.update(ancestor.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

fn batch_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Common(CommonError::VectorDb(format!("{context}: {e}")))
}

/// Arrow batch for LanceDB: `code`, `name`, `level`, `text`, one nullable `l<depth>` column
/// per ancestor depth, and the `embedding` vector.
pub fn build_record_batch(
    documents: &[CategoryDocument],
    embeddings: &[Vec<f32>],
    dimensions: usize,
) -> Result<RecordBatch, AppError> {
    if embeddings.len() != documents.len() {
        return Err(AppError::Common(CommonError::Embedding(format!(
            "embedding count mismatch: expected {}, got {}",
            documents.len(),
            embeddings.len()
        ))));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
        return Err(AppError::Common(CommonError::Embedding(format!(
            "embedding width {} does not match {dimensions}",
            bad.len()
        ))));
    }
    let dim = i32::try_from(dimensions).map_err(|e| batch_error("embedding width", e))?;
    let path_depth = documents.iter().map(|d| d.path.len()).max().unwrap_or(0);

    let mut fields = vec![
        Field::new("code", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("level", DataType::UInt32, false),
        Field::new("text", DataType::Utf8, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(documents.iter().map(|d| d.code.as_str()))),
        Arc::new(StringArray::from_iter_values(documents.iter().map(|d| d.name.as_str()))),
        Arc::new(UInt32Array::from_iter_values(documents.iter().map(|d| d.level))),
        Arc::new(StringArray::from_iter_values(documents.iter().map(|d| d.text.as_str()))),
    ];

    for depth in 0..path_depth {
        fields.push(Field::new(path_column(depth as u32), DataType::Utf8, true));
        let names: StringArray = documents.iter().map(|d| d.ancestor(depth)).collect();
        columns.push(Arc::new(names));
    }

    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let flat: Vec<f32> = embeddings.iter().flat_map(|e| e.iter().copied()).collect();
    let embedding_array = FixedSizeListArray::try_new(
        item.clone(),
        dim,
        Arc::new(Float32Array::from(flat)),
        None,
    )
    .map_err(|e| batch_error("failed to build embedding array", e))?;
    fields.push(Field::new("embedding", DataType::FixedSizeList(item, dim), false));
    columns.push(Arc::new(embedding_array));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| batch_error("failed to build record batch", e))
}
