use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chunk and record metadata, kept as a JSON object so it can be sent to the
/// index unchanged.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Reserved metadata key holding the original chunk text.
pub const TEXT_METADATA_KEY: &str = "text";

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
    pub declared_size: Option<u64>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: Some(filename.into()),
            bytes: bytes.into(),
            declared_size: None,
        }
    }

    /// The filename, if one was supplied and is not blank.
    pub fn name(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

impl IndexRecord {
    pub fn from_chunk(chunk: Chunk, values: Vec<f32>) -> Self {
        let mut metadata = chunk.metadata;
        metadata.insert(
            TEXT_METADATA_KEY.to_string(),
            serde_json::Value::String(chunk.text),
        );
        Self {
            id: chunk.id,
            values,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub total_vector_count: u64,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dotproduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Dotproduct => "dotproduct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingFileName,
    NotPdf,
    TooLarge { size: u64, limit: u64 },
    Empty,
    DuplicateStem { stem: String },
    StagingFailed { message: String },
    ExtractionFailed { message: String },
    NoPages,
    NoChunks,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFileName => write!(f, "empty filename"),
            Self::NotPdf => write!(f, "not a PDF file"),
            Self::TooLarge { size, limit } => {
                write!(f, "file too large: {size} bytes (limit {limit})")
            }
            Self::Empty => write!(f, "file is empty"),
            Self::DuplicateStem { stem } => {
                write!(f, "another file in this upload already uses the name {stem}")
            }
            Self::StagingFailed { message } => write!(f, "could not stage file: {message}"),
            Self::ExtractionFailed { message } => write!(f, "could not read pdf: {message}"),
            Self::NoPages => write!(f, "no content extracted"),
            Self::NoChunks => write!(f, "no text chunks created"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Indexed { pages: usize, chunks: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub filename: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn skipped(filename: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            filename: filename.into(),
            status: FileStatus::Skipped(reason),
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.status, FileStatus::Indexed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub request_id: Uuid,
    pub files: Vec<FileOutcome>,
    pub indexed_chunks: usize,
    pub upsert_batches: usize,
    pub index_total_vectors: Option<u64>,
}

impl IngestionReport {
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.files.iter().filter_map(|outcome| match &outcome.status {
            FileStatus::Skipped(reason) => Some((outcome.filename.as_str(), reason)),
            FileStatus::Indexed { .. } => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_file_bytes: u64,
    pub upsert_batch_size: usize,
    pub embedding_dimensions: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            upsert_batch_size: 100,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_chunk_text_in_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("page".to_string(), serde_json::json!(0));
        let chunk = Chunk {
            id: "manual-0".to_string(),
            text: "Torque the bolts to 40 Nm.".to_string(),
            metadata,
        };

        let record = IndexRecord::from_chunk(chunk, vec![0.5; 4]);

        assert_eq!(record.id, "manual-0");
        assert_eq!(record.metadata["text"], "Torque the bolts to 40 Nm.");
        assert_eq!(record.metadata["page"], 0);
    }

    #[test]
    fn blank_filename_has_no_name() {
        let file = UploadedFile {
            filename: Some("   ".to_string()),
            bytes: b"%PDF".to_vec(),
            declared_size: None,
        };
        assert_eq!(file.name(), None);
    }

    #[test]
    fn file_outcome_serializes_flat() {
        let outcome = FileOutcome::skipped("notes.txt", SkipReason::NotPdf);
        let value = serde_json::to_value(&outcome).expect("outcome should serialize");
        assert_eq!(value["filename"], "notes.txt");
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "not_pdf");
    }
}
