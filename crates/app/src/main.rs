use chrono::Utc;
use clap::{Parser, Subcommand};
use futures_util::{pin_mut, StreamExt};
use pdf_rag_core::{
    answer, Describer, GeminiClient, GeminiConfig, IngestionPipeline, OllamaEmbedder,
    OllamaGenerator, OpenSearchStore, Retriever, SearchStrategy, UnstructuredClient,
    DEFAULT_DESCRIPTION_MODEL, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL,
};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL
    #[arg(long, default_value = "http://localhost:9200")]
    opensearch_url: String,

    /// Ollama base URL, used for embeddings and answer generation
    #[arg(long, default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Embedding model served by Ollama
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Partitioner service base URL
    #[arg(long, default_value = "http://localhost:8000")]
    partitioner_url: String,

    /// API key for the description model; required unless descriptions are
    /// disabled
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Description model for image and table content
    #[arg(long, default_value = DEFAULT_DESCRIPTION_MODEL)]
    description_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, describe, embed and index one PDF document.
    Ingest {
        /// Path to the PDF file
        #[arg(long)]
        pdf: String,
        /// Drop and recreate the collection if it already exists.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Skip the description model; images and tables keep their
        /// extracted text as content.
        #[arg(long, default_value_t = false)]
        no_descriptions: bool,
    },
    /// Answer a question against an ingested document.
    Ask {
        /// The question to answer
        #[arg(long)]
        query: String,
        /// Collection name reported by ingest
        #[arg(long)]
        collection: String,
        /// Search strategy: keyword, semantic or hybrid
        #[arg(long, default_value = "hybrid")]
        strategy: String,
        /// Number of fragments to ground the answer on
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Generation model served by Ollama
        #[arg(long, default_value = DEFAULT_GENERATION_MODEL)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Ingest {
            pdf,
            force,
            no_descriptions,
        } => {
            let describer = if no_descriptions {
                None
            } else {
                let api_key = cli.gemini_api_key.ok_or_else(|| {
                    anyhow::anyhow!(
                        "GEMINI_API_KEY is not set; pass --no-descriptions to ingest without it"
                    )
                })?;
                let config = GeminiConfig::new(api_key).with_model(cli.description_model);
                Some(GeminiClient::new(config).map_err(|error| anyhow::anyhow!(error.to_string()))?)
            };

            let pipeline = IngestionPipeline::new(
                UnstructuredClient::new(&cli.partitioner_url)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
                OpenSearchStore::new(&cli.opensearch_url)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
                OllamaEmbedder::new(&cli.ollama_url, cli.embedding_model)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
            );

            let report = pipeline
                .ingest_document(
                    Path::new(&pdf),
                    describer.as_ref().map(|client| client as &(dyn Describer + Sync)),
                    force,
                )
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.skipped {
                warn!(group = %skipped.group, index = skipped.index, reason = %skipped.reason, "skipped chunk");
            }

            println!("collection: {}", report.collection);
            println!("{}", report.status_message());
        }
        Command::Ask {
            query,
            collection,
            strategy,
            top_k,
            model,
        } => {
            let strategy: SearchStrategy = strategy
                .parse()
                .map_err(|error: String| anyhow::anyhow!(error))?;

            let retriever = Retriever::new(
                OpenSearchStore::new(&cli.opensearch_url)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
                OllamaEmbedder::new(&cli.ollama_url, cli.embedding_model)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
            );
            let generator = OllamaGenerator::new(&cli.ollama_url, model)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let stream = answer(&retriever, &generator, &query, &collection, strategy, top_k);
            pin_mut!(stream);

            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                let fragment = fragment.map_err(|error| anyhow::anyhow!(error.to_string()))?;
                stdout.write_all(fragment.as_bytes())?;
                stdout.flush()?;
            }
            println!();
        }
    }

    Ok(())
}
