use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no files provided")]
    NoFiles,

    #[error("no files selected")]
    NoFilesSelected,

    #[error("no valid PDF files found")]
    NoValidFiles,

    #[error("embedding failed: {0}")]
    Embedding(#[source] ServiceError),

    #[error(
        "upsert batch {batch} of {total_batches} failed after {committed_records} records were committed: {source}"
    )]
    UpsertAborted {
        batch: usize,
        total_batches: usize,
        committed_records: usize,
        #[source]
        source: ServiceError,
    },

    #[error("vector index error: {0}")]
    Index(#[from] ServiceError),
}

impl IngestError {
    /// Errors caused by the caller's input rather than by a backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoFiles | Self::NoFilesSelected | Self::NoValidFiles
        )
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("backend not available yet: {0}")]
    NotReady(String),

    #[error("vector dimension {actual} does not match configured {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}
