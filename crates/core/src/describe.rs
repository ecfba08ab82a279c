use crate::error::IngestError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

pub const DEFAULT_DESCRIPTION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_DESCRIPTION_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Generates a natural-language description from a prompt and an optional
/// inline image. One round-trip per call; failures are fatal for the
/// ingestion run that requested the description.
#[async_trait]
pub trait Describer {
    async fn describe(
        &self,
        prompt: &str,
        image_base64: Option<&str>,
    ) -> Result<String, IngestError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_DESCRIPTION_MODEL.to_string(),
            endpoint: DEFAULT_DESCRIPTION_ENDPOINT.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Description client for the Gemini `generateContent` API.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Fails fast on missing credentials so no extraction work starts with a
    /// describer that cannot run.
    pub fn new(config: GeminiConfig) -> Result<Self, IngestError> {
        if config.api_key.trim().is_empty() {
            return Err(IngestError::MissingCredentials(
                "description model api key is not set".to_string(),
            ));
        }
        Url::parse(&config.endpoint)?;

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            config,
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl Describer for GeminiClient {
    async fn describe(
        &self,
        prompt: &str,
        image_base64: Option<&str>,
    ) -> Result<String, IngestError> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(data) = image_base64 {
            parts.push(json!({
                "inline_data": { "mime_type": "image/png", "data": data }
            }));
        }

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&json!({ "contents": [{ "parts": parts }] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::Description(format!(
                "description request failed with {}",
                response.status()
            )));
        }

        let payload: GenerateContentResponse = response.json().await?;
        let description = collect_text(&payload);

        if description.is_empty() {
            return Err(IngestError::Description(
                "description response contained no text".to_string(),
            ));
        }

        Ok(description)
    }
}

fn collect_text(payload: &GenerateContentResponse) -> String {
    payload
        .candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_fails_fast() {
        let result = GeminiClient::new(GeminiConfig::new("  "));
        assert!(matches!(result, Err(IngestError::MissingCredentials(_))));
    }

    #[test]
    fn response_text_is_collected_across_parts() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "A bar chart " }, { "text": "of losses." }] }
            }]
        }))
        .unwrap();

        assert_eq!(collect_text(&payload), "A bar chart of losses.");
    }

    #[test]
    fn empty_candidates_yield_empty_text() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(collect_text(&payload), "");
    }
}
