pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod staging;
pub mod stores;
pub mod traits;
pub mod validation;

pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use embeddings::{GeminiConfig, GeminiEmbedder, HashingEmbedder};
pub use error::{IngestError, ServiceError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{digest_bytes, discover_pdf_files, load_folder_uploads};
pub use models::{
    Chunk, DistanceMetric, FileOutcome, FileStatus, IndexRecord, IndexStats, IngestionOptions,
    IngestionReport, Metadata, SkipReason, UploadedFile, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_MAX_FILE_BYTES, TEXT_METADATA_KEY,
};
pub use pipeline::{IngestionPipeline, PipelineConfig};
pub use staging::{StagedFile, StagingArea};
pub use stores::{InMemoryIndex, PineconeConfig, PineconeIndex};
pub use traits::{Embedder, VectorIndex};
pub use validation::{validate_uploads, ValidatedUploads};
