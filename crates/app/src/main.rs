mod server;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    load_folder_uploads, DistanceMetric, Embedder, GeminiConfig, GeminiEmbedder, HashingEmbedder,
    InMemoryIndex, IngestionOptions, IngestionPipeline, LopdfExtractor, PineconeConfig,
    PineconeIndex, PipelineConfig, VectorIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Pipeline = IngestionPipeline<LopdfExtractor, Box<dyn Embedder>, Box<dyn VectorIndex>>;

#[derive(Parser)]
#[command(name = "pdf-rag-server", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Google API key for the embedding model
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "models/embedding-001")]
    embedding_model: String,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: Option<String>,

    /// Pinecone index name
    #[arg(long, env = "PINECONE_INDEX_NAME", default_value = "rag-ai-laywer")]
    index_name: String,

    /// Serverless cloud used when the index has to be created
    #[arg(long, env = "PINECONE_CLOUD", default_value = "aws")]
    pinecone_cloud: String,

    /// Serverless region used when the index has to be created
    #[arg(long, env = "PINECONE_REGION", default_value = "us-east-1")]
    pinecone_region: String,

    /// Directory where uploads are staged before indexing
    #[arg(long, env = "STAGING_DIR", default_value = "./uploaded_docs")]
    staging_dir: PathBuf,

    /// Largest accepted PDF, in bytes
    #[arg(long, default_value_t = pdf_rag_core::DEFAULT_MAX_FILE_BYTES)]
    max_file_bytes: u64,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Gemini)]
    embedder: EmbedderKind,

    /// Vector index backend
    #[arg(long, value_enum, default_value_t = IndexKind::Pinecone)]
    index: IndexKind,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the PDF upload endpoint.
    Serve {
        /// Address to bind (host:port).
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: String,
        /// Maximum size of one multipart request body, in bytes. Larger
        /// requests are refused as a whole with 413; single files above
        /// --max-file-bytes are only skipped.
        #[arg(long, default_value_t = 100 * 1024 * 1024)]
        max_body_bytes: usize,
    },
    /// Ingest every PDF under a folder once and exit.
    Ingest {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Google Generative Language embeddings.
    Gemini,
    /// Offline character-trigram hashing.
    Hashing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IndexKind {
    Pinecone,
    /// Process-local index, lost on exit.
    Memory,
}

fn required(value: &Option<String>, name: &str) -> anyhow::Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("{name} is not set"))
}

async fn build_pipeline(cli: &Cli) -> anyhow::Result<Pipeline> {
    let options = IngestionOptions {
        max_file_bytes: cli.max_file_bytes,
        ..IngestionOptions::default()
    };

    let embedder: Box<dyn Embedder> = match cli.embedder {
        EmbedderKind::Gemini => {
            let mut config = GeminiConfig::new(required(&cli.google_api_key, "GOOGLE_API_KEY")?);
            config.model = cli.embedding_model.clone();
            config.dimensions = options.embedding_dimensions;
            Box::new(GeminiEmbedder::new(config)?)
        }
        EmbedderKind::Hashing => Box::new(HashingEmbedder {
            dimensions: options.embedding_dimensions,
        }),
    };

    let index: Box<dyn VectorIndex> = match cli.index {
        IndexKind::Pinecone => {
            let mut config = PineconeConfig::new(
                required(&cli.pinecone_api_key, "PINECONE_API_KEY")?,
                &cli.index_name,
            );
            config.dimension = options.embedding_dimensions;
            config.metric = DistanceMetric::Dotproduct;
            config.cloud = cli.pinecone_cloud.clone();
            config.region = cli.pinecone_region.clone();
            Box::new(PineconeIndex::new(config)?)
        }
        IndexKind::Memory => Box::new(InMemoryIndex::new(options.embedding_dimensions)),
    };

    let config = PipelineConfig {
        staging_dir: cli.staging_dir.clone(),
        options,
    };

    IngestionPipeline::initialize(config, LopdfExtractor, embedder, index)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index = %cli.index_name,
        "pdf-rag-server boot"
    );

    let pipeline = build_pipeline(&cli).await?;

    match cli.command {
        Command::Serve {
            bind,
            max_body_bytes,
        } => {
            let pipeline = Arc::new(pipeline);
            server::serve(Arc::clone(&pipeline), &bind, max_body_bytes).await?;

            match Arc::try_unwrap(pipeline) {
                Ok(pipeline) => pipeline
                    .shutdown()
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?,
                Err(_) => warn!("pipeline still in use at shutdown; staging left as is"),
            }
        }
        Command::Ingest { folder } => {
            let uploads = load_folder_uploads(&folder)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            info!(folder = %folder.display(), files = uploads.len(), "ingesting folder");

            let report = pipeline
                .ingest(uploads)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for (filename, reason) in report.skipped() {
                warn!(file = %filename, %reason, "skipped pdf");
            }
            if report.indexed_chunks == 0 {
                println!("0 chunks ingested (all files were skipped)");
            } else {
                println!(
                    "{} chunks ingested in {} batches at {}",
                    report.indexed_chunks,
                    report.upsert_batches,
                    Utc::now().to_rfc3339()
                );
            }
            if let Some(total) = report.index_total_vectors {
                println!("index now contains {total} vectors");
            }

            pipeline
                .shutdown()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        }
    }

    Ok(())
}
