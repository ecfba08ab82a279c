use crate::error::IngestError;
use crate::models::{Element, PartitionOptions};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::{Document, Object};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Splits a PDF into typed content elements, preserving document order.
#[async_trait]
pub trait Partitioner {
    async fn partition(
        &self,
        path: &Path,
        options: &PartitionOptions,
    ) -> Result<Vec<Element>, IngestError>;
}

#[derive(Debug, Clone, Serialize)]
struct PartitionRequest<'a> {
    pdf_base64: String,
    filename: &'a str,
    #[serde(flatten)]
    options: &'a PartitionOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct RawElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    image_base64: Option<String>,
    #[serde(default)]
    text_as_html: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

/// Client for an unstructured-compatible partitioner service.
pub struct UnstructuredClient {
    client: Client,
    endpoint: String,
}

impl UnstructuredClient {
    pub fn new(endpoint: &str) -> Result<Self, IngestError> {
        Url::parse(endpoint)?;

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Partitioner for UnstructuredClient {
    async fn partition(
        &self,
        path: &Path,
        options: &PartitionOptions,
    ) -> Result<Vec<Element>, IngestError> {
        let pdf = std::fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document.pdf");

        let response = self
            .client
            .post(format!("{}/partition", self.endpoint))
            .json(&PartitionRequest {
                pdf_base64: STANDARD.encode(pdf),
                filename,
                options,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::Partition(format!(
                "partition request for {} returned {}",
                path.display(),
                response.status()
            )));
        }

        let payload: Vec<RawElement> = response.json().await?;
        Ok(elements_from_payload(payload))
    }
}

fn elements_from_payload(payload: Vec<RawElement>) -> Vec<Element> {
    let mut elements = Vec::with_capacity(payload.len());

    for raw in payload {
        let metadata = raw.metadata.unwrap_or_default();
        let text = raw.text.unwrap_or_default().trim().to_string();

        let element = match raw.kind.as_str() {
            "Image" | "Figure" => Element::Image {
                text,
                payload: metadata.image_base64.unwrap_or_default(),
                filename: metadata.filename,
            },
            "FigureCaption" => Element::Caption { text },
            "Table" => Element::Table {
                text,
                html: metadata.text_as_html.unwrap_or_default(),
                filename: metadata.filename,
            },
            "CompositeElement" => Element::Text {
                text,
                composite: true,
                filename: metadata.filename,
            },
            _ => {
                if text.is_empty() {
                    continue;
                }
                Element::Text {
                    text,
                    composite: false,
                    filename: metadata.filename,
                }
            }
        };

        elements.push(element);
    }

    elements
}

/// Collection name for one document. Title metadata wins; otherwise the
/// filename stem, truncated at the first "20" to strip date-like suffixes.
/// The rule must stay stable: retrieval reuses the derived name.
pub fn collection_name_from(title: Option<&str>, path: &Path) -> String {
    if let Some(title) = title.map(str::trim).filter(|value| !value.is_empty()) {
        return title.to_lowercase().replace(' ', "_");
    }

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_lowercase();

    stem.split("20")
        .next()
        .unwrap_or_default()
        .replace(' ', "_")
}

pub fn derive_collection_name(path: &Path) -> String {
    let title = match pdf_title(path) {
        Ok(title) => title,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "could not read pdf metadata, using filename");
            None
        }
    };

    collection_name_from(title.as_deref(), path)
}

pub fn pdf_title(path: &Path) -> Result<Option<String>, IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::Pdf(error.to_string()))?;
    Ok(title_from_document(&document))
}

fn title_from_document(document: &Document) -> Option<String> {
    let info = document.trailer.get(b"Info").ok()?;
    let dictionary = match info {
        Object::Reference(id) => document.get_object(*id).ok()?.as_dict().ok()?,
        Object::Dictionary(dictionary) => dictionary,
        _ => return None,
    };

    let bytes = dictionary.get(b"Title").ok()?.as_str().ok()?;
    let title = decode_pdf_text(bytes);
    let title = title.trim();

    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

// PDF text strings are either UTF-16BE with a BOM or PDFDocEncoding; the
// latter is close enough to Latin-1 for title extraction.
fn decode_pdf_text(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|&byte| byte as char).collect()
}
