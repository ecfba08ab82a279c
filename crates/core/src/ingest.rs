use crate::describe::Describer;
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extract::{derive_collection_name, Partitioner};
use crate::models::{
    Chunk, ChunkSources, ContentType, ImageChunk, IngestStatus, IngestionReport, PartitionOptions,
    SkippedChunk, StoredChunk, TableChunk,
};
use crate::normalize::{
    collect_image_chunks, collect_table_chunks, collect_text_chunks, describe_images,
    describe_tables,
};
use crate::traits::SearchIndex;
use chrono::Utc;
use std::path::Path;

/// Embeds one group of chunks, skipping any chunk that cannot be stored.
/// A skip never aborts the batch; the reasons are collected for the report.
async fn prepare_group<E>(
    embedder: &E,
    dimensions: usize,
    group: ContentType,
    chunks: Vec<Chunk>,
    skipped: &mut Vec<SkippedChunk>,
) -> Vec<StoredChunk>
where
    E: Embedder + Sync,
{
    let mut prepared = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.into_iter().enumerate() {
        if chunk.content.trim().is_empty() {
            tracing::warn!(%group, index, "skipping chunk with empty content");
            skipped.push(SkippedChunk {
                group,
                index,
                reason: "empty content".to_string(),
            });
            continue;
        }

        let embedding = match embedder.embed(&chunk.content).await {
            Ok(embedding) => embedding,
            Err(error) => {
                tracing::warn!(%group, index, %error, "skipping chunk, embedding failed");
                skipped.push(SkippedChunk {
                    group,
                    index,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        if embedding.len() != dimensions {
            tracing::warn!(
                %group,
                index,
                actual = embedding.len(),
                expected = dimensions,
                "skipping chunk, embedding dimension mismatch"
            );
            skipped.push(SkippedChunk {
                group,
                index,
                reason: format!(
                    "embedding dimension {} does not match collection dimension {}",
                    embedding.len(),
                    dimensions
                ),
            });
            continue;
        }

        let token_count = chunk.content.split_whitespace().count() as u64;
        prepared.push(StoredChunk {
            content: chunk.content,
            content_type: chunk.content_type,
            filename: chunk.filename,
            token_count,
            embedding,
        });
    }

    prepared
}

/// Ingests normalized chunks into the named collection.
///
/// Provisioning: an existing collection is left untouched unless `force` is
/// set, in which case it is dropped and recreated. Groups are bulk-loaded in
/// the order images, tables, text; a bulk failure aborts its group and
/// propagates, but groups already committed stay committed.
pub async fn ingest_chunks<S, E>(
    store: &S,
    embedder: &E,
    collection: &str,
    sources: ChunkSources,
    force: bool,
) -> Result<IngestionReport, IngestError>
where
    S: SearchIndex + Sync,
    E: Embedder + Sync,
{
    let exists = store.collection_exists(collection).await?;

    if exists && !force {
        tracing::info!(collection, "collection already exists, skipping ingestion");
        return Ok(IngestionReport {
            collection: collection.to_string(),
            status: IngestStatus::AlreadyExists,
            skipped: Vec::new(),
            ingested_at: Utc::now(),
        });
    }

    if exists {
        store.delete_collection(collection).await?;
    }

    let dimensions = embedder.dimensions();
    store.create_collection(collection, dimensions).await?;

    let mut skipped = Vec::new();

    let images = prepare_group(
        embedder,
        dimensions,
        ContentType::Image,
        sources.images,
        &mut skipped,
    )
    .await;
    store.bulk_index(collection, &images).await?;

    let tables = prepare_group(
        embedder,
        dimensions,
        ContentType::Table,
        sources.tables,
        &mut skipped,
    )
    .await;
    store.bulk_index(collection, &tables).await?;

    let text = prepare_group(
        embedder,
        dimensions,
        ContentType::Text,
        sources.text,
        &mut skipped,
    )
    .await;
    store.bulk_index(collection, &text).await?;

    tracing::info!(
        collection,
        images = images.len(),
        tables = tables.len(),
        text = text.len(),
        skipped = skipped.len(),
        "ingestion complete"
    );

    Ok(IngestionReport {
        collection: collection.to_string(),
        status: IngestStatus::Ingested {
            images: images.len(),
            tables: tables.len(),
            text: text.len(),
        },
        skipped,
        ingested_at: Utc::now(),
    })
}

/// End-to-end ingestion of one PDF: extraction, normalization, optional
/// description generation, embedding and indexing.
pub struct IngestionPipeline<P, S, E> {
    partitioner: P,
    store: S,
    embedder: E,
}

impl<P, S, E> IngestionPipeline<P, S, E>
where
    P: Partitioner + Sync,
    S: SearchIndex + Sync,
    E: Embedder + Sync,
{
    pub fn new(partitioner: P, store: S, embedder: E) -> Self {
        Self {
            partitioner,
            store,
            embedder,
        }
    }

    /// Derives the collection name, then runs the two extraction passes, the
    /// normalizer and the chunk ingestion. When the collection exists and
    /// `force` is unset, no extraction work is done at all.
    pub async fn ingest_document(
        &self,
        pdf_path: &Path,
        describer: Option<&(dyn Describer + Sync)>,
        force: bool,
    ) -> Result<IngestionReport, IngestError> {
        let collection = derive_collection_name(pdf_path);

        if !force && self.store.collection_exists(&collection).await? {
            return Ok(IngestionReport {
                collection,
                status: IngestStatus::AlreadyExists,
                skipped: Vec::new(),
                ingested_at: Utc::now(),
            });
        }

        let structural = self
            .partitioner
            .partition(pdf_path, &PartitionOptions::structural())
            .await?;

        let mut images = collect_image_chunks(&structural);
        let mut tables = collect_table_chunks(&structural);

        if let Some(describer) = describer {
            describe_images(describer, &mut images).await?;
            describe_tables(describer, &mut tables).await?;
        }

        let chunked = self
            .partitioner
            .partition(pdf_path, &PartitionOptions::by_title())
            .await?;
        let text = collect_text_chunks(&chunked);

        let sources = ChunkSources {
            images: images.into_iter().map(ImageChunk::into_chunk).collect(),
            tables: tables.into_iter().map(TableChunk::into_chunk).collect(),
            text,
        };

        ingest_chunks(&self.store, &self.embedder, &collection, sources, force).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbedError, SearchError};
    use crate::models::{QuerySpec, SearchHit};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeEmbedder {
        dimensions: usize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if text.contains("unembeddable") {
                return Err(EmbedError::MissingVector {
                    model: "fake".to_string(),
                });
            }

            // A marked chunk comes back with the wrong dimension.
            let dimensions = if text.contains("misshapen") {
                self.dimensions + 1
            } else {
                self.dimensions
            };

            Ok(vec![0.5; dimensions])
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        state: Mutex<IndexState>,
        fail_bulk_for: Option<ContentType>,
    }

    #[derive(Default)]
    struct IndexState {
        collections: HashMap<String, Vec<StoredChunk>>,
        deleted: Vec<String>,
    }

    impl FakeIndex {
        fn with_existing(collection: &str) -> Self {
            let index = Self::default();
            index
                .state
                .lock()
                .unwrap()
                .collections
                .insert(collection.to_string(), Vec::new());
            index
        }

        fn documents(&self, collection: &str) -> Vec<StoredChunk> {
            self.state
                .lock()
                .unwrap()
                .collections
                .get(collection)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SearchIndex for FakeIndex {
        async fn collection_exists(&self, collection: &str) -> Result<bool, SearchError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .collections
                .contains_key(collection))
        }

        async fn create_collection(
            &self,
            collection: &str,
            _dimensions: usize,
        ) -> Result<(), SearchError> {
            self.state
                .lock()
                .unwrap()
                .collections
                .insert(collection.to_string(), Vec::new());
            Ok(())
        }

        async fn delete_collection(&self, collection: &str) -> Result<(), SearchError> {
            let mut state = self.state.lock().unwrap();
            state.collections.remove(collection);
            state.deleted.push(collection.to_string());
            Ok(())
        }

        async fn bulk_index(
            &self,
            collection: &str,
            chunks: &[StoredChunk],
        ) -> Result<(), SearchError> {
            if let Some(group) = self.fail_bulk_for {
                if chunks.iter().any(|chunk| chunk.content_type == group) {
                    return Err(SearchError::Request("bulk rejected".to_string()));
                }
            }

            self.state
                .lock()
                .unwrap()
                .collections
                .get_mut(collection)
                .expect("collection must exist before bulk")
                .extend_from_slice(chunks);
            Ok(())
        }

        async fn search(
            &self,
            _collection: &str,
            _spec: &QuerySpec,
            _top_k: usize,
        ) -> Result<Vec<SearchHit>, SearchError> {
            Ok(Vec::new())
        }
    }

    fn chunk(content: &str, content_type: ContentType) -> Chunk {
        Chunk {
            content: content.to_string(),
            content_type,
            filename: Some("survey.pdf".to_string()),
        }
    }

    fn sources() -> ChunkSources {
        ChunkSources {
            images: vec![chunk("an image description", ContentType::Image)],
            tables: vec![chunk("a table description", ContentType::Table)],
            text: vec![
                chunk("first section", ContentType::Text),
                chunk("second section", ContentType::Text),
            ],
        }
    }

    #[tokio::test]
    async fn ingestion_counts_chunks_per_group() {
        let store = FakeIndex::default();
        let embedder = FakeEmbedder { dimensions: 4 };

        let report = ingest_chunks(&store, &embedder, "survey", sources(), false)
            .await
            .unwrap();

        assert_eq!(
            report.status,
            IngestStatus::Ingested {
                images: 1,
                tables: 1,
                text: 2
            }
        );
        assert_eq!(report.total_ingested(), 4);
        assert!(report.skipped.is_empty());
        assert_eq!(store.documents("survey").len(), 4);
    }

    #[tokio::test]
    async fn stored_embeddings_always_match_the_collection_dimension() {
        let store = FakeIndex::default();
        let embedder = FakeEmbedder { dimensions: 4 };

        let mut sources = sources();
        sources.text.push(chunk("misshapen vector", ContentType::Text));

        let report = ingest_chunks(&store, &embedder, "survey", sources, false)
            .await
            .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("dimension"));
        assert!(store
            .documents("survey")
            .iter()
            .all(|chunk| chunk.embedding.len() == 4));
    }

    #[tokio::test]
    async fn empty_and_unembeddable_chunks_are_skipped_not_fatal() {
        let store = FakeIndex::default();
        let embedder = FakeEmbedder { dimensions: 4 };

        let mut sources = sources();
        sources.images.push(chunk("   ", ContentType::Image));
        sources.tables.push(chunk("unembeddable rows", ContentType::Table));

        let report = ingest_chunks(&store, &embedder, "survey", sources, false)
            .await
            .unwrap();

        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].group, ContentType::Image);
        assert_eq!(report.skipped[0].reason, "empty content");
        assert_eq!(report.skipped[1].group, ContentType::Table);
        assert_eq!(report.total_ingested(), 4);
    }

    #[tokio::test]
    async fn existing_collection_without_force_is_left_untouched() {
        let store = FakeIndex::with_existing("survey");
        let embedder = FakeEmbedder { dimensions: 4 };

        let report = ingest_chunks(&store, &embedder, "survey", sources(), false)
            .await
            .unwrap();

        assert_eq!(report.status, IngestStatus::AlreadyExists);
        assert!(store.documents("survey").is_empty());
        assert!(store.state.lock().unwrap().deleted.is_empty());
    }

    #[tokio::test]
    async fn force_reingest_drops_and_recreates_the_collection() {
        let store = FakeIndex::with_existing("survey");
        store
            .state
            .lock()
            .unwrap()
            .collections
            .get_mut("survey")
            .unwrap()
            .push(StoredChunk {
                content: "stale".to_string(),
                content_type: ContentType::Text,
                filename: None,
                token_count: 1,
                embedding: vec![0.0; 4],
            });

        let embedder = FakeEmbedder { dimensions: 4 };
        let report = ingest_chunks(&store, &embedder, "survey", sources(), true)
            .await
            .unwrap();

        assert_eq!(report.total_ingested(), 4);
        assert_eq!(store.state.lock().unwrap().deleted, vec!["survey"]);
        let documents = store.documents("survey");
        assert!(documents.iter().all(|chunk| chunk.content != "stale"));
    }

    #[tokio::test]
    async fn bulk_failure_aborts_its_group_but_keeps_prior_groups() {
        let store = FakeIndex {
            fail_bulk_for: Some(ContentType::Table),
            ..FakeIndex::default()
        };
        let embedder = FakeEmbedder { dimensions: 4 };

        let result = ingest_chunks(&store, &embedder, "survey", sources(), false).await;

        assert!(matches!(result, Err(IngestError::Store(_))));
        // images were committed before the table group failed
        let documents = store.documents("survey");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content_type, ContentType::Image);
    }
}
