use crate::models::{QuerySpec, SearchHit, StoredChunk};
use crate::SearchError;
use async_trait::async_trait;

/// Low-level operations against a named collection in the document store.
/// The store owns chunk data once indexed; retrieval never mutates it.
#[async_trait]
pub trait SearchIndex {
    async fn collection_exists(&self, collection: &str) -> Result<bool, SearchError>;

    /// Creates the collection with the fixed schema. The embedding field
    /// dimension is set here and never changes for the collection's lifetime.
    async fn create_collection(&self, collection: &str, dimensions: usize)
        -> Result<(), SearchError>;

    async fn delete_collection(&self, collection: &str) -> Result<(), SearchError>;

    /// One bulk operation for the whole slice; partial item failures are
    /// reported as a single error for the batch.
    async fn bulk_index(&self, collection: &str, chunks: &[StoredChunk])
        -> Result<(), SearchError>;

    async fn search(
        &self,
        collection: &str,
        spec: &QuerySpec,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}
