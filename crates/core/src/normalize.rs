use crate::describe::Describer;
use crate::error::IngestError;
use crate::models::{Chunk, ContentType, Element, ImageChunk, TableChunk};

pub const NO_CAPTION: &str = "No caption";

/// Collects every image element, pairing it with the caption element that
/// directly follows it. Pairing is positional, not semantic: a caption
/// belongs to the image immediately preceding it, and nothing else.
pub fn collect_image_chunks(elements: &[Element]) -> Vec<ImageChunk> {
    let mut chunks = Vec::new();

    for (index, element) in elements.iter().enumerate() {
        let Element::Image {
            text,
            payload,
            filename,
        } = element
        else {
            continue;
        };

        let caption = match elements.get(index + 1) {
            Some(Element::Caption { text }) => text.clone(),
            _ => NO_CAPTION.to_string(),
        };

        chunks.push(ImageChunk {
            caption,
            image_text: text.clone(),
            image_base64: payload.clone(),
            // Survives as the stored content when no description model runs.
            content: text.clone(),
            filename: filename.clone(),
        });
    }

    chunks
}

pub fn collect_table_chunks(elements: &[Element]) -> Vec<TableChunk> {
    elements
        .iter()
        .filter_map(|element| {
            let Element::Table {
                text,
                html,
                filename,
            } = element
            else {
                return None;
            };

            Some(TableChunk {
                html: html.clone(),
                text: text.clone(),
                content: text.clone(),
                filename: filename.clone(),
            })
        })
        .collect()
}

/// Keeps only composite text segments. Atomic fragments the partitioner did
/// not merge under a title anchor are leftovers and are dropped.
pub fn collect_text_chunks(elements: &[Element]) -> Vec<Chunk> {
    elements
        .iter()
        .filter_map(|element| match element {
            Element::Text {
                text,
                composite: true,
                filename,
            } => Some(Chunk {
                content: text.clone(),
                content_type: ContentType::Text,
                filename: filename.clone(),
            }),
            _ => None,
        })
        .collect()
}

pub fn image_prompt(chunk: &ImageChunk) -> String {
    format!(
        "Describe the image in detail. The caption is: {}. The image text is: {}. \
         Directly analyze the image and provide a detailed description without any additional text.",
        chunk.caption, chunk.image_text
    )
}

pub fn table_prompt(chunk: &TableChunk) -> String {
    format!(
        "Analyze the following table and provide a detailed description of its contents, \
         including the structure, key data points and any notable trends. \
         Here is the table in HTML format: {}. \
         Directly analyze the table and provide a detailed description without any additional text.",
        chunk.html
    )
}

/// One description round-trip per image; the generated text replaces the
/// extracted fallback content. Any failure aborts the document's run.
pub async fn describe_images<D>(describer: &D, chunks: &mut [ImageChunk]) -> Result<(), IngestError>
where
    D: Describer + Sync + ?Sized,
{
    for chunk in chunks.iter_mut() {
        let prompt = image_prompt(chunk);
        let image = (!chunk.image_base64.is_empty()).then_some(chunk.image_base64.as_str());
        chunk.content = describer.describe(&prompt, image).await?;
    }

    Ok(())
}

pub async fn describe_tables<D>(describer: &D, chunks: &mut [TableChunk]) -> Result<(), IngestError>
where
    D: Describer + Sync + ?Sized,
{
    for chunk in chunks.iter_mut() {
        let prompt = table_prompt(chunk);
        chunk.content = describer.describe(&prompt, None).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn image(text: &str) -> Element {
        Element::Image {
            text: text.to_string(),
            payload: "cGF5bG9hZA==".to_string(),
            filename: Some("survey.pdf".to_string()),
        }
    }

    fn caption(text: &str) -> Element {
        Element::Caption {
            text: text.to_string(),
        }
    }

    fn narrative(text: &str) -> Element {
        Element::Text {
            text: text.to_string(),
            composite: false,
            filename: Some("survey.pdf".to_string()),
        }
    }

    fn composite(text: &str) -> Element {
        Element::Text {
            text: text.to_string(),
            composite: true,
            filename: Some("survey.pdf".to_string()),
        }
    }

    struct FakeDescriber {
        prompts: Mutex<Vec<(String, bool)>>,
        fail: bool,
    }

    impl FakeDescriber {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Describer for FakeDescriber {
        async fn describe(
            &self,
            prompt: &str,
            image_base64: Option<&str>,
        ) -> Result<String, IngestError> {
            if self.fail {
                return Err(IngestError::Description("model unavailable".to_string()));
            }

            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), image_base64.is_some()));
            Ok("a generated description".to_string())
        }
    }

    #[test]
    fn caption_following_an_image_is_paired_with_it() {
        let elements = vec![
            image("loss curve"),
            caption("Figure 1: training losses"),
            image("architecture diagram"),
            narrative("unrelated paragraph"),
        ];

        let chunks = collect_image_chunks(&elements);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].caption, "Figure 1: training losses");
        assert_eq!(chunks[1].caption, NO_CAPTION);
    }

    #[test]
    fn image_at_end_of_document_gets_default_caption() {
        let chunks = collect_image_chunks(&[image("final figure")]);
        assert_eq!(chunks[0].caption, NO_CAPTION);
    }

    #[test]
    fn image_content_defaults_to_extracted_text() {
        let chunks = collect_image_chunks(&[image("loss curve")]);
        assert_eq!(chunks[0].content, "loss curve");
        assert_eq!(chunks[0].image_text, "loss curve");
        assert_eq!(chunks[0].image_base64, "cGF5bG9hZA==");
    }

    #[test]
    fn table_content_defaults_to_plain_text_rendering() {
        let elements = vec![Element::Table {
            text: "model loss".to_string(),
            html: "<table><tr><td>model</td></tr></table>".to_string(),
            filename: None,
        }];

        let chunks = collect_table_chunks(&elements);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "model loss");
        assert!(chunks[0].html.starts_with("<table>"));
    }

    #[test]
    fn only_composite_text_chunks_are_kept() {
        let elements = vec![
            composite("1 Introduction. Retrieval augments generation."),
            narrative("leftover fragment"),
            composite("2 Methods. We embed every chunk."),
        ];

        let chunks = collect_text_chunks(&elements);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content_type, ContentType::Text);
        assert!(chunks[1].content.starts_with("2 Methods"));
    }

    #[tokio::test]
    async fn descriptions_overwrite_fallback_content() {
        let describer = FakeDescriber::new();
        let mut images = collect_image_chunks(&[image("loss curve"), caption("Figure 1")]);

        describe_images(&describer, &mut images).await.unwrap();

        assert_eq!(images[0].content, "a generated description");
        assert_eq!(images[0].caption, "Figure 1");

        let prompts = describer.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("Figure 1"));
        assert!(prompts[0].0.contains("loss curve"));
        assert!(prompts[0].1, "image payload should be inlined");
    }

    #[tokio::test]
    async fn table_descriptions_use_the_html_rendering() {
        let describer = FakeDescriber::new();
        let mut tables = collect_table_chunks(&[Element::Table {
            text: "model loss".to_string(),
            html: "<table><td>0.12</td></table>".to_string(),
            filename: None,
        }]);

        describe_tables(&describer, &mut tables).await.unwrap();

        assert_eq!(tables[0].content, "a generated description");

        let prompts = describer.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("<table><td>0.12</td></table>"));
        assert!(!prompts[0].1, "tables carry no inline image");
    }

    #[tokio::test]
    async fn describer_failure_is_fatal_for_the_run() {
        let describer = FakeDescriber::failing();
        let mut images = collect_image_chunks(&[image("loss curve")]);

        let result = describe_images(&describer, &mut images).await;

        assert!(matches!(result, Err(IngestError::Description(_))));
        // content keeps the extracted-text fallback untouched
        assert_eq!(images[0].content, "loss curve");
    }
}
