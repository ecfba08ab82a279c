use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Table,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Table => "table",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed element from the partitioner, in document order. Captions pair
/// with the image directly preceding them by position, so order must be kept.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text {
        text: String,
        /// True for title-anchored segments merged from smaller fragments by
        /// the partitioner's chunking pass; atomic leftovers stay false.
        composite: bool,
        filename: Option<String>,
    },
    Image {
        text: String,
        /// Base64-encoded image block payload.
        payload: String,
        filename: Option<String>,
    },
    Caption {
        text: String,
    },
    Table {
        text: String,
        html: String,
        filename: Option<String>,
    },
}

/// The uniform ingestible record all extracted content is normalized into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub content_type: ContentType,
    pub filename: Option<String>,
}

/// Image content before it is flattened into a [`Chunk`]. Keeps the caption,
/// the raw extracted text and the binary payload for description generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageChunk {
    pub caption: String,
    pub image_text: String,
    pub image_base64: String,
    pub content: String,
    pub filename: Option<String>,
}

impl ImageChunk {
    pub fn into_chunk(self) -> Chunk {
        Chunk {
            content: self.content,
            content_type: ContentType::Image,
            filename: self.filename,
        }
    }
}

/// Table content before it is flattened into a [`Chunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableChunk {
    pub html: String,
    pub text: String,
    pub content: String,
    pub filename: Option<String>,
}

impl TableChunk {
    pub fn into_chunk(self) -> Chunk {
        Chunk {
            content: self.content,
            content_type: ContentType::Table,
            filename: self.filename,
        }
    }
}

/// Ingestion input, grouped by content type. Groups are bulk-loaded
/// independently in the order images, tables, text.
#[derive(Debug, Clone, Default)]
pub struct ChunkSources {
    pub images: Vec<Chunk>,
    pub tables: Vec<Chunk>,
    pub text: Vec<Chunk>,
}

impl ChunkSources {
    pub fn len(&self) -> usize {
        self.images.len() + self.tables.len() + self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A chunk augmented with its embedding, as written to the index store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredChunk {
    pub content: String,
    pub content_type: ContentType,
    pub filename: Option<String>,
    pub token_count: u64,
    pub embedding: Vec<f32>,
}

/// One of the three query shapes the index store understands.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    /// Analyzed text match on `content`.
    Match { text: String },
    /// K-nearest-neighbour similarity over the `embedding` field.
    Nearest { vector: Vec<f32>, k: usize },
    /// Boolean should of both conditions; the store combines the scores.
    Should {
        vector: Vec<f32>,
        k: usize,
        text: String,
    },
}

/// A ranked fragment returned by every search strategy. Ordering follows the
/// store's native relevance score, descending.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub score: f64,
    pub content: String,
    pub content_type: ContentType,
    pub token_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Keyword,
    Semantic,
    Hybrid,
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "keyword" => Ok(SearchStrategy::Keyword),
            "semantic" => Ok(SearchStrategy::Semantic),
            "hybrid" => Ok(SearchStrategy::Hybrid),
            other => Err(format!(
                "unknown search strategy '{other}', expected keyword, semantic or hybrid"
            )),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStrategy::Keyword => f.write_str("keyword"),
            SearchStrategy::Semantic => f.write_str("semantic"),
            SearchStrategy::Hybrid => f.write_str("hybrid"),
        }
    }
}

/// Partitioner settings for one extraction pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartitionOptions {
    pub strategy: String,
    pub infer_table_structure: bool,
    pub extract_image_payloads: bool,
    pub chunking: Option<ChunkingOptions>,
}

/// Title-anchored chunking thresholds for the semantic pass.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ChunkingOptions {
    pub max_characters: usize,
    pub combine_under_chars: usize,
    pub new_after_chars: usize,
}

impl PartitionOptions {
    /// Structural pass: typed elements with image payloads and table HTML,
    /// no chunking.
    pub fn structural() -> Self {
        Self {
            strategy: "fast".to_string(),
            infer_table_structure: true,
            extract_image_payloads: true,
            chunking: None,
        }
    }

    /// Semantic pass: title-anchored composite chunks with size thresholds.
    pub fn by_title() -> Self {
        Self {
            strategy: "fast".to_string(),
            infer_table_structure: false,
            extract_image_payloads: false,
            chunking: Some(ChunkingOptions {
                max_characters: 2_000,
                combine_under_chars: 500,
                new_after_chars: 1_500,
            }),
        }
    }
}

/// Which chunk group a skipped chunk belonged to, and why it was dropped.
#[derive(Debug, Clone)]
pub struct SkippedChunk {
    pub group: ContentType,
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestStatus {
    /// Per-group counts of chunks that made it into the store.
    Ingested {
        images: usize,
        tables: usize,
        text: usize,
    },
    /// The collection was already present and `force` was not set.
    AlreadyExists,
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub collection: String,
    pub status: IngestStatus,
    pub skipped: Vec<SkippedChunk>,
    pub ingested_at: DateTime<Utc>,
}

impl IngestionReport {
    pub fn total_ingested(&self) -> usize {
        match self.status {
            IngestStatus::Ingested {
                images,
                tables,
                text,
            } => images + tables + text,
            IngestStatus::AlreadyExists => 0,
        }
    }

    pub fn status_message(&self) -> String {
        match self.status {
            IngestStatus::Ingested { .. } => format!(
                "ingested {} chunks into collection '{}'",
                self.total_ingested(),
                self.collection
            ),
            IngestStatus::AlreadyExists => format!(
                "collection '{}' already exists, skipping ingestion",
                self.collection
            ),
        }
    }
}
