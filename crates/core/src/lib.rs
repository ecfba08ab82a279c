pub mod describe;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod generate;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use describe::{Describer, GeminiClient, GeminiConfig, DEFAULT_DESCRIPTION_MODEL};
pub use embeddings::{
    Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_MODEL, EMBEDDING_DIMENSIONS,
};
pub use error::{EmbedError, GenerateError, IngestError, SearchError};
pub use extract::{
    collection_name_from, derive_collection_name, pdf_title, Partitioner, UnstructuredClient,
};
pub use generate::{answer, build_context, build_prompt, OllamaGenerator, DEFAULT_GENERATION_MODEL};
pub use ingest::{ingest_chunks, IngestionPipeline};
pub use models::{
    Chunk, ChunkSources, ChunkingOptions, ContentType, Element, ImageChunk, IngestStatus,
    IngestionReport, PartitionOptions, QuerySpec, SearchHit, SearchStrategy, SkippedChunk,
    StoredChunk, TableChunk,
};
pub use normalize::{
    collect_image_chunks, collect_table_chunks, collect_text_chunks, describe_images,
    describe_tables, NO_CAPTION,
};
pub use retrieval::Retriever;
pub use stores::OpenSearchStore;
pub use traits::SearchIndex;
