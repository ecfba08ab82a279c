use crate::models::{ContentType, QuerySpec, SearchHit, StoredChunk};
use crate::traits::SearchIndex;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_ATTEMPTS: u32 = 3;

const SOURCE_FIELDS: [&str; 3] = ["content", "content_type", "token_count"];

/// Index store client for an OpenSearch endpoint. One instance serves any
/// number of collections; names are passed per call.
pub struct OpenSearchStore {
    client: Client,
    endpoint: String,
}

impl OpenSearchStore {
    pub fn new(endpoint: &str) -> Result<Self, SearchError> {
        Url::parse(endpoint)?;

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.endpoint, collection)
    }

    /// Retries transient connection failures a bounded number of times; any
    /// other error or a completed response ends the loop.
    async fn send_with_retry(&self, request: RequestBuilder) -> Result<Response, SearchError> {
        for attempt in 1..CONNECT_ATTEMPTS {
            let Some(builder) = request.try_clone() else {
                break;
            };

            match builder.send().await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_connect() || error.is_timeout() => {
                    tracing::warn!(attempt, error = %error, "transient index store error, retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(request.send().await?)
    }
}

#[async_trait]
impl SearchIndex for OpenSearchStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, SearchError> {
        let response = self
            .send_with_retry(self.client.head(self.collection_url(collection)))
            .await?;

        if response.status() == StatusCode::OK {
            return Ok(true);
        }

        if response.status().is_client_error() {
            return Ok(false);
        }

        Err(SearchError::BackendResponse {
            backend: "opensearch".to_string(),
            details: response.status().to_string(),
        })
    }

    async fn create_collection(
        &self,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), SearchError> {
        let response = self
            .send_with_retry(
                self.client
                    .put(self.collection_url(collection))
                    .json(&collection_schema(dimensions)),
            )
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "collection setup for '{collection}' failed with {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), SearchError> {
        let response = self
            .send_with_retry(self.client.delete(self.collection_url(collection)))
            .await?;

        // A concurrent delete is indistinguishable from success here.
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(SearchError::BackendResponse {
            backend: "opensearch".to_string(),
            details: response.status().to_string(),
        })
    }

    async fn bulk_index(
        &self,
        collection: &str,
        chunks: &[StoredChunk],
    ) -> Result<(), SearchError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let payload = bulk_payload(collection, chunks)?;

        let response = self
            .send_with_retry(
                self.client
                    .post(format!("{}/_bulk", self.endpoint))
                    .header("Content-Type", "application/x-ndjson")
                    .body(payload),
            )
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        // Bulk responses come back 200 even when individual items failed.
        let body: Value = response.json().await?;
        if body
            .pointer("/errors")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(SearchError::Request(format!(
                "bulk indexing into '{collection}' reported item failures"
            )));
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        spec: &QuerySpec,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .send_with_retry(
                self.client
                    .post(format!("{}/_search", self.collection_url(collection)))
                    .json(&query_body(spec, top_k)),
            )
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        Ok(hits_from_payload(&payload))
    }
}

fn collection_schema(dimensions: usize) -> Value {
    json!({
        "settings": {
            "index": { "knn": true }
        },
        "mappings": {
            "properties": {
                "content": { "type": "text" },
                "content_type": { "type": "keyword" },
                "filename": { "type": "keyword" },
                "token_count": { "type": "integer" },
                "embedding": { "type": "knn_vector", "dimension": dimensions }
            }
        }
    })
}

fn bulk_payload(collection: &str, chunks: &[StoredChunk]) -> Result<String, SearchError> {
    let mut operations = Vec::with_capacity(chunks.len() * 2);

    for chunk in chunks {
        operations.push(json!({ "index": { "_index": collection } }));
        operations.push(serde_json::to_value(chunk)?);
    }

    let payload = operations
        .into_iter()
        .map(|value| serde_json::to_string(&value))
        .collect::<Result<Vec<_>, serde_json::Error>>()?
        .join("\n")
        + "\n";

    Ok(payload)
}

fn query_body(spec: &QuerySpec, top_k: usize) -> Value {
    let query = match spec {
        QuerySpec::Match { text } => json!({ "match": { "content": text } }),
        QuerySpec::Nearest { vector, k } => json!({
            "knn": { "embedding": { "vector": vector, "k": k } }
        }),
        QuerySpec::Should { vector, k, text } => json!({
            "bool": {
                "should": [
                    { "knn": { "embedding": { "vector": vector, "k": k } } },
                    { "match": { "content": text } }
                ]
            }
        }),
    };

    json!({
        "size": top_k,
        "query": query,
        "_source": SOURCE_FIELDS,
    })
}

fn hits_from_payload(payload: &Value) -> Vec<SearchHit> {
    let hits = payload
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::new();

    for raw in hits {
        let score = raw.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0);
        let content = raw
            .pointer("/_source/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content_type = raw
            .pointer("/_source/content_type")
            .cloned()
            .and_then(|value| serde_json::from_value::<ContentType>(value).ok())
            .unwrap_or(ContentType::Text);
        let token_count = raw.pointer("/_source/token_count").and_then(Value::as_u64);

        result.push(SearchHit {
            score,
            content,
            content_type,
            token_count,
        });
    }

    result
}
