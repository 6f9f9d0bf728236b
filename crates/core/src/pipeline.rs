use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::{PageText, PdfExtractor};
use crate::models::{
    Chunk, FileOutcome, FileStatus, IndexRecord, IngestionOptions, IngestionReport, Metadata,
    SkipReason, UploadedFile,
};
use crate::staging::{StagedFile, StagingArea};
use crate::traits::{Embedder, VectorIndex};
use crate::validation::validate_uploads;
use crate::{IngestError, ServiceError};
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub staging_dir: PathBuf,
    pub options: IngestionOptions,
}

impl PipelineConfig {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            options: IngestionOptions::default(),
        }
    }
}

/// Validate, stage, extract, chunk, embed, and upsert a batch of uploads.
///
/// Built once at startup through [`IngestionPipeline::initialize`], which
/// prepares the staging directory and makes sure the vector index exists.
/// Each call to [`IngestionPipeline::ingest`] runs one upload request to
/// completion.
pub struct IngestionPipeline<X, E, V> {
    options: IngestionOptions,
    staging: StagingArea,
    extractor: Arc<X>,
    embedder: E,
    index: V,
}

struct FileChunks {
    staged: StagedFile,
    pages: usize,
    chunks: Vec<Chunk>,
}

impl<X, E, V> IngestionPipeline<X, E, V>
where
    X: PdfExtractor + 'static,
    E: Embedder,
    V: VectorIndex,
{
    pub async fn initialize(
        config: PipelineConfig,
        extractor: X,
        embedder: E,
        index: V,
    ) -> Result<Self, IngestError> {
        ChunkingConfig::from(&config.options).validate()?;
        if config.options.upsert_batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "upsert batch size must be positive".to_string(),
            ));
        }
        if embedder.dimensions() != config.options.embedding_dimensions {
            return Err(IngestError::InvalidArgument(format!(
                "embedder produces {} dimensions but the index expects {}",
                embedder.dimensions(),
                config.options.embedding_dimensions
            )));
        }

        let staging = StagingArea::new(config.staging_dir);
        staging.prepare().await?;
        index.ensure_ready().await?;

        Ok(Self {
            options: config.options,
            staging,
            extractor: Arc::new(extractor),
            embedder,
            index,
        })
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestionReport, IngestError> {
        let request_id = Uuid::new_v4();
        info!(%request_id, files = files.len(), "processing upload");

        let validated = validate_uploads(files, self.options.max_file_bytes)?;
        let mut outcomes = validated.rejected;

        let mut scope = self.staging.open_scope(request_id).await?;
        let mut staged_files = Vec::new();
        for file in &validated.accepted {
            match scope.stage(file).await {
                Ok(staged) => {
                    info!(file = %staged.filename, bytes = staged.size, "staged upload");
                    staged_files.push(staged);
                }
                Err(reason) => {
                    let filename = file.name().unwrap_or_default().to_string();
                    warn!(file = %filename, %reason, "skipping upload");
                    outcomes.push(FileOutcome::skipped(filename, reason));
                }
            }
        }

        let mut chunks = Vec::new();
        for staged in staged_files {
            match self.chunk_file(staged).await {
                Ok(file) => {
                    info!(
                        file = %file.staged.filename,
                        pages = file.pages,
                        chunks = file.chunks.len(),
                        "chunked document"
                    );
                    outcomes.push(FileOutcome {
                        filename: file.staged.filename,
                        status: FileStatus::Indexed {
                            pages: file.pages,
                            chunks: file.chunks.len(),
                        },
                    });
                    chunks.extend(file.chunks);
                }
                Err((filename, reason)) => {
                    warn!(file = %filename, %reason, "skipping document");
                    outcomes.push(FileOutcome::skipped(filename, reason));
                }
            }
        }

        if chunks.is_empty() {
            warn!(%request_id, "no text chunks to index");
            scope.cleanup().await;
            return Ok(IngestionReport {
                request_id,
                files: outcomes,
                indexed_chunks: 0,
                upsert_batches: 0,
                index_total_vectors: None,
            });
        }

        let records = self.embed_chunks(chunks).await?;
        let indexed_chunks = records.len();
        let upsert_batches = self.upsert_batches(&records).await?;

        let index_total_vectors = match self.index.describe_stats().await {
            Ok(stats) => {
                info!(total_vectors = stats.total_vector_count, "index stats");
                Some(stats.total_vector_count)
            }
            Err(error) => {
                warn!(%error, "could not read index stats");
                None
            }
        };

        scope.cleanup().await;
        info!(%request_id, indexed_chunks, upsert_batches, "upload indexed");

        Ok(IngestionReport {
            request_id,
            files: outcomes,
            indexed_chunks,
            upsert_batches,
            index_total_vectors,
        })
    }

    /// Removes staging leftovers from requests that failed mid-way.
    pub async fn shutdown(self) -> Result<(), IngestError> {
        let purged = self.staging.purge().await?;
        info!(purged, "ingestion pipeline stopped");
        Ok(())
    }

    async fn chunk_file(&self, staged: StagedFile) -> Result<FileChunks, (String, SkipReason)> {
        let pages = match self.extract(&staged).await {
            Ok(pages) => pages,
            Err(error) => {
                return Err((
                    staged.filename,
                    SkipReason::ExtractionFailed {
                        message: error.to_string(),
                    },
                ))
            }
        };
        if pages.is_empty() {
            return Err((staged.filename, SkipReason::NoPages));
        }
        info!(file = %staged.filename, pages = pages.len(), "loaded document");

        let mut base = Metadata::new();
        base.insert("source".to_string(), Value::from(staged.filename.as_str()));
        base.insert("checksum".to_string(), Value::from(staged.checksum.as_str()));
        base.insert("ingested_at".to_string(), Value::from(Utc::now().to_rfc3339()));

        let chunks = match build_chunks(
            &staged.stem,
            &pages,
            &base,
            ChunkingConfig::from(&self.options),
        ) {
            Ok(chunks) => chunks,
            Err(error) => {
                return Err((
                    staged.filename,
                    SkipReason::ExtractionFailed {
                        message: error.to_string(),
                    },
                ))
            }
        };
        if chunks.is_empty() {
            return Err((staged.filename, SkipReason::NoChunks));
        }

        Ok(FileChunks {
            pages: pages.len(),
            staged,
            chunks,
        })
    }

    async fn extract(&self, staged: &StagedFile) -> Result<Vec<PageText>, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let path = staged.path.clone();
        tokio::task::spawn_blocking(move || extractor.extract_pages(&path))
            .await
            .map_err(|error| IngestError::PdfParse(format!("extraction task failed: {error}")))?
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexRecord>, IngestError> {
        info!(chunks = chunks.len(), "embedding chunks");
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(IngestError::Embedding)?;

        if vectors.len() != chunks.len() {
            return Err(IngestError::Embedding(ServiceError::BackendResponse {
                backend: "embedder".to_string(),
                details: format!("{} vectors for {} chunks", vectors.len(), chunks.len()),
            }));
        }
        let expected = self.options.embedding_dimensions;
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(IngestError::Embedding(ServiceError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }));
        }
        info!(embeddings = vectors.len(), "generated embeddings");

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, values)| IndexRecord::from_chunk(chunk, values))
            .collect())
    }

    /// Sends records in order, one batch at a time. A failed batch stops the
    /// upload; batches already sent stay in the index.
    async fn upsert_batches(&self, records: &[IndexRecord]) -> Result<usize, IngestError> {
        let batch_size = self.options.upsert_batch_size;
        let total_batches = records.len().div_ceil(batch_size);
        let mut committed_records = 0;

        for (position, batch) in records.chunks(batch_size).enumerate() {
            let batch_number = position + 1;
            if let Err(source) = self.index.upsert(batch).await {
                warn!(batch = batch_number, total_batches, %source, "upsert failed");
                return Err(IngestError::UpsertAborted {
                    batch: batch_number,
                    total_batches,
                    committed_records,
                    source,
                });
            }
            committed_records += batch.len();
            info!(
                batch = batch_number,
                total_batches,
                records = batch.len(),
                "upserted batch"
            );
        }

        Ok(total_batches)
    }
}
