use crate::embeddings::Embedder;
use crate::error::GenerateError;
use crate::models::{SearchHit, SearchStrategy};
use crate::retrieval::Retriever;
use crate::traits::SearchIndex;
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

pub const DEFAULT_GENERATION_MODEL: &str = "deepseek-r1:1.5b";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Joins retrieved fragments into the grounding context block, in the
/// store's ranking order.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are answering a question about a document. Use only the context below; \
         if the context does not contain the answer, say so.\n\n\
         Context:\n{context}\n\nQuestion: {query}\n\nAnswer:"
    )
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: Option<bool>,
}

/// One decoded fragment of the generation stream.
#[derive(Debug, Clone, PartialEq)]
enum StreamEvent {
    Fragment(String),
    Done,
}

fn parse_stream_line(line: &str) -> Result<Option<StreamEvent>, GenerateError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let decoded: GenerateLine = serde_json::from_str(line)?;

    if decoded.done.unwrap_or(false) {
        return Ok(Some(StreamEvent::Done));
    }

    match decoded.response {
        Some(fragment) if !fragment.is_empty() => Ok(Some(StreamEvent::Fragment(fragment))),
        _ => Ok(None),
    }
}

/// Streaming text generation against an Ollama-compatible `/api/generate`
/// endpoint. Cancellation is the consumer dropping the stream.
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(endpoint: &str, model: impl Into<String>) -> Result<Self, GenerateError> {
        Url::parse(endpoint)?;

        // No overall timeout: generations legitimately run for minutes.
        Ok(Self {
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Yields incremental text fragments until the backend reports done.
    pub fn stream(
        &self,
        prompt: String,
    ) -> impl Stream<Item = Result<String, GenerateError>> + '_ {
        try_stream! {
            let response = self
                .client
                .post(format!("{}/api/generate", self.endpoint))
                .json(&json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": true,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                Err(GenerateError::Backend {
                    status: response.status(),
                })?;
            }

            let body = response.bytes_stream();
            pin_mut!(body);

            let mut buffer = String::new();

            'body: while let Some(bytes) = body.next().await {
                let bytes = bytes?;
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(position) = buffer.find('\n') {
                    let line: String = buffer.drain(..=position).collect();
                    match parse_stream_line(&line)? {
                        Some(StreamEvent::Fragment(fragment)) => yield fragment,
                        Some(StreamEvent::Done) => {
                            buffer.clear();
                            break 'body;
                        }
                        None => {}
                    }
                }
            }

            // A final line without a trailing newline still counts.
            if let Some(StreamEvent::Fragment(fragment)) = parse_stream_line(&buffer)? {
                yield fragment;
            }
        }
    }
}

/// Retrieval-grounded answer stream: retrieval completes fully, then the
/// generator streams the answer text.
pub fn answer<'a, S, E>(
    retriever: &'a Retriever<S, E>,
    generator: &'a OllamaGenerator,
    query: &'a str,
    collection: &'a str,
    strategy: SearchStrategy,
    top_k: usize,
) -> impl Stream<Item = Result<String, GenerateError>> + 'a
where
    S: SearchIndex + Sync,
    E: Embedder + Sync,
{
    try_stream! {
        let hits = retriever.search(strategy, collection, query, top_k).await;
        tracing::debug!(collection, %strategy, hits = hits.len(), "retrieval complete");

        let prompt = build_prompt(query, &build_context(&hits));
        let stream = generator.stream(prompt);
        pin_mut!(stream);

        while let Some(fragment) = stream.next().await {
            yield fragment?;
        }
    }
}
