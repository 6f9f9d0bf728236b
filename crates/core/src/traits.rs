use crate::{IndexRecord, IndexStats, ServiceError};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Embeds `texts` in order, one vector per input.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the index if it is missing and waits until it accepts writes.
    async fn ensure_ready(&self) -> Result<(), ServiceError>;

    /// Inserts or overwrites `records` by id in a single call.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), ServiceError>;

    async fn describe_stats(&self) -> Result<IndexStats, ServiceError>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        (**self).embed_documents(texts).await
    }
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Box<T> {
    async fn ensure_ready(&self) -> Result<(), ServiceError> {
        (**self).ensure_ready().await
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), ServiceError> {
        (**self).upsert(records).await
    }

    async fn describe_stats(&self) -> Result<IndexStats, ServiceError> {
        (**self).describe_stats().await
    }
}
