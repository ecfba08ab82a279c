use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{QuerySpec, SearchHit, SearchStrategy};
use crate::traits::SearchIndex;

/// Stateless query engine over one index store. Every call is idempotent for
/// the current index contents; ranking authority stays with the store.
pub struct Retriever<S, E> {
    store: S,
    embedder: E,
}

impl<S, E> Retriever<S, E>
where
    S: SearchIndex + Sync,
    E: Embedder + Sync,
{
    pub fn new(store: S, embedder: E) -> Self {
        Self { store, embedder }
    }

    pub async fn search(
        &self,
        strategy: SearchStrategy,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Vec<SearchHit> {
        match strategy {
            SearchStrategy::Keyword => self.keyword(collection, query, top_k).await,
            SearchStrategy::Semantic => self.semantic(collection, query, top_k).await,
            SearchStrategy::Hybrid => self.hybrid(collection, query, top_k).await,
        }
    }

    /// Analyzed text match on chunk content. Failures are logged and return
    /// an empty result set.
    pub async fn keyword(&self, collection: &str, query: &str, top_k: usize) -> Vec<SearchHit> {
        let spec = QuerySpec::Match {
            text: query.to_string(),
        };

        match self.store.search(collection, &spec, top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(collection, %error, "keyword search failed");
                Vec::new()
            }
        }
    }

    /// Embeds the query and runs a k-nearest-neighbour search. Failures in
    /// either round-trip are logged and return an empty result set.
    pub async fn semantic(&self, collection: &str, query: &str, top_k: usize) -> Vec<SearchHit> {
        match self.try_semantic(collection, query, top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(collection, %error, "semantic search failed");
                Vec::new()
            }
        }
    }

    /// Single combined query matching either the vector-similarity condition
    /// or the keyword condition; the store combines both scores. If the
    /// combined query fails, falls back to keyword search with the same
    /// parameters; the original strategy is never retried.
    pub async fn hybrid(&self, collection: &str, query: &str, top_k: usize) -> Vec<SearchHit> {
        match self.try_hybrid(collection, query, top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(collection, %error, "hybrid search failed, falling back to keyword");
                self.keyword(collection, query, top_k).await
            }
        }
    }

    async fn try_semantic(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let vector = self.embedder.embed(query).await?;
        let spec = QuerySpec::Nearest {
            vector,
            k: top_k,
        };

        self.store.search(collection, &spec, top_k).await
    }

    async fn try_hybrid(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let vector = self.embedder.embed(query).await?;
        let spec = QuerySpec::Should {
            vector,
            k: top_k,
            text: query.to_string(),
        };

        self.store.search(collection, &spec, top_k).await
    }
}
