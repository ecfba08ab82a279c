use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid embedding endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding service returned {status}")]
    Backend { status: reqwest::StatusCode },

    #[error("no embedding vector in response from model {model}")]
    MissingVector { model: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf metadata error: {0}")]
    Pdf(String),

    #[error("partitioner error: {0}")]
    Partition(String),

    #[error("description model error: {0}")]
    Description(String),

    #[error("missing api credentials: {0}")]
    MissingCredentials(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("index store error: {0}")]
    Store(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedError),
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid generation endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("generation backend returned {status}")]
    Backend { status: reqwest::StatusCode },

    #[error("malformed stream payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
