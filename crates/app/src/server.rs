use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_rag_core::{
    validate_uploads, Embedder, FileOutcome, IngestError, IngestionPipeline, PdfExtractor,
    UploadedFile, VectorIndex,
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Multipart field name used by the upload form.
const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    processed_files: usize,
    file_names: Vec<String>,
    indexed_chunks: usize,
    skipped: Vec<FileOutcome>,
}

pub fn router<X, E, V>(pipeline: Arc<IngestionPipeline<X, E, V>>, max_body_bytes: usize) -> Router
where
    X: PdfExtractor + 'static,
    E: Embedder + 'static,
    V: VectorIndex + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/upload_pdfs/", post(upload_pdfs::<X, E, V>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(pipeline)
}

pub async fn serve<X, E, V>(
    pipeline: Arc<IngestionPipeline<X, E, V>>,
    bind: &str,
    max_body_bytes: usize,
) -> anyhow::Result<()>
where
    X: PdfExtractor + 'static,
    E: Embedder + 'static,
    V: VectorIndex + 'static,
{
    let addr: SocketAddr = bind
        .parse()
        .map_err(|error| anyhow::anyhow!("invalid bind address {bind}: {error}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening for uploads");

    axum::serve(listener, router(pipeline, max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

fn error_response(status: StatusCode, error: impl Into<String>, detail: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": error.into(), "detail": detail.into() })),
    )
        .into_response()
}

fn client_error(error: &IngestError) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        error.to_string(),
        "Upload at least one non-empty .pdf file within the size limit",
    )
}

/// Streams every file part of the form. Bytes past `max_file_bytes` are
/// counted but not kept, so an oversized part is reported as too large
/// without being buffered.
async fn read_uploads(
    multipart: &mut Multipart,
    max_file_bytes: u64,
) -> Result<Vec<UploadedFile>, MultipartError> {
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        let filename = field.file_name().map(str::to_string);
        let is_file = filename.is_some() || field.name() == Some(FILES_FIELD);
        if !is_file {
            continue;
        }

        let mut bytes = Vec::new();
        let mut received = 0u64;
        while let Some(chunk) = field.chunk().await? {
            received += chunk.len() as u64;
            if received <= max_file_bytes {
                bytes.extend_from_slice(&chunk);
            } else if !bytes.is_empty() {
                bytes = Vec::new();
            }
        }

        files.push(UploadedFile {
            filename,
            declared_size: Some(received),
            bytes,
        });
    }

    Ok(files)
}

async fn upload_pdfs<X, E, V>(
    State(pipeline): State<Arc<IngestionPipeline<X, E, V>>>,
    mut multipart: Multipart,
) -> Response
where
    X: PdfExtractor + 'static,
    E: Embedder + 'static,
    V: VectorIndex + 'static,
{
    let files = match read_uploads(&mut multipart, pipeline.options().max_file_bytes).await {
        Ok(files) => files,
        Err(error) => {
            let status = error.status();
            let detail = error.body_text();
            warn!(%status, %detail, "unreadable multipart upload");
            let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                "request body too large"
            } else {
                "invalid multipart body"
            };
            return error_response(status, message, detail);
        }
    };

    let validated = match validate_uploads(files, pipeline.options().max_file_bytes) {
        Ok(validated) => validated,
        Err(error) => return client_error(&error),
    };

    let file_names = validated.accepted_names();
    info!(files = file_names.len(), "received valid PDF files");
    for name in &file_names {
        info!(file = %name, "processing file");
    }

    match pipeline.ingest(validated.accepted).await {
        Ok(report) => {
            info!(
                request_id = %report.request_id,
                indexed_chunks = report.indexed_chunks,
                "documents added to vector index"
            );
            let mut skipped = validated.rejected;
            skipped.extend(report.files.into_iter().filter(|outcome| !outcome.is_indexed()));

            Json(UploadResponse {
                message: "Files processed and vectorstore updated successfully",
                processed_files: file_names.len(),
                file_names,
                indexed_chunks: report.indexed_chunks,
                skipped,
            })
            .into_response()
        }
        Err(error) if error.is_client_error() => client_error(&error),
        Err(error) => {
            error!(%error, "error during PDF upload");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing files: {error}"),
                "Please check your files and try again",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pdf_rag_core::{
        HashingEmbedder, InMemoryIndex, PageText, PipelineConfig, ServiceError,
    };
    use reqwest::multipart::{Form, Part};
    use serde_json::Value;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    /// Reads staged files as plain text, one page per file.
    struct PlainTextExtractor;

    impl PdfExtractor for PlainTextExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let text = std::fs::read_to_string(path)?;
            Ok(vec![PageText { number: 1, text }])
        }
    }

    struct UnavailableEmbedder;

    #[async_trait]
    impl Embedder for UnavailableEmbedder {
        fn dimensions(&self) -> usize {
            768
        }

        async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            Err(ServiceError::BackendResponse {
                backend: "gemini".to_string(),
                details: "503 Service Unavailable".to_string(),
            })
        }
    }

    async fn spawn<E: Embedder + 'static>(
        embedder: E,
    ) -> anyhow::Result<(
        TempDir,
        String,
        Arc<IngestionPipeline<PlainTextExtractor, E, InMemoryIndex>>,
    )> {
        spawn_with_limit(embedder, 32 * 1024 * 1024).await
    }

    async fn spawn_with_limit<E: Embedder + 'static>(
        embedder: E,
        max_body_bytes: usize,
    ) -> anyhow::Result<(
        TempDir,
        String,
        Arc<IngestionPipeline<PlainTextExtractor, E, InMemoryIndex>>,
    )> {
        let dir = tempdir()?;
        let pipeline = IngestionPipeline::initialize(
            PipelineConfig::new(dir.path().join("staging")),
            PlainTextExtractor,
            embedder,
            InMemoryIndex::new(768),
        )
        .await?;
        let pipeline = Arc::new(pipeline);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(Arc::clone(&pipeline), max_body_bytes);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok((dir, format!("http://{addr}"), pipeline))
    }

    fn file_part(name: &str, body: &str) -> Part {
        Part::bytes(body.as_bytes().to_vec()).file_name(name.to_string())
    }

    #[tokio::test]
    async fn healthz_is_ok() -> anyhow::Result<()> {
        let (_dir, base, _pipeline) = spawn(HashingEmbedder::default()).await?;
        let response = reqwest::get(format!("{base}/healthz")).await?;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn pdf_and_text_upload_processes_only_the_pdf() -> anyhow::Result<()> {
        let (_dir, base, pipeline) = spawn(HashingEmbedder::default()).await?;
        let form = Form::new()
            .part("files", file_part("manual.pdf", "Hydraulic pump maintenance"))
            .part("files", file_part("notes.txt", "shopping list"));

        let response = reqwest::Client::new()
            .post(format!("{base}/upload_pdfs/"))
            .multipart(form)
            .send()
            .await?;

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await?;
        assert_eq!(body["processed_files"], 1);
        assert_eq!(body["file_names"], serde_json::json!(["manual.pdf"]));
        assert_eq!(body["indexed_chunks"], 1);
        assert_eq!(body["skipped"][0]["filename"], "notes.txt");
        assert_eq!(pipeline.index().len(), 1);
        assert!(pipeline.index().get("manual-0").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn oversized_part_is_skipped_without_failing_the_request() -> anyhow::Result<()> {
        let (_dir, base, pipeline) = spawn(HashingEmbedder::default()).await?;
        let oversized = "x".repeat(pdf_rag_core::DEFAULT_MAX_FILE_BYTES as usize + 1);
        let form = Form::new()
            .part("files", file_part("scan.pdf", &oversized))
            .part("files", file_part("manual.pdf", "Hydraulic pump maintenance"));

        let response = reqwest::Client::new()
            .post(format!("{base}/upload_pdfs/"))
            .multipart(form)
            .send()
            .await?;

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await?;
        assert_eq!(body["processed_files"], 1);
        assert_eq!(body["file_names"], serde_json::json!(["manual.pdf"]));
        assert_eq!(body["skipped"][0]["filename"], "scan.pdf");
        assert_eq!(body["skipped"][0]["reason"], "too_large");
        assert_eq!(pipeline.index().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn body_over_request_limit_is_payload_too_large() -> anyhow::Result<()> {
        let (_dir, base, pipeline) = spawn_with_limit(HashingEmbedder::default(), 1024).await?;
        let form = Form::new().part("files", file_part("manual.pdf", &"pump ".repeat(800)));

        let response = reqwest::Client::new()
            .post(format!("{base}/upload_pdfs/"))
            .multipart(form)
            .send()
            .await?;

        assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
        assert!(pipeline.index().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn only_non_pdf_files_is_a_bad_request() -> anyhow::Result<()> {
        let (_dir, base, pipeline) = spawn(HashingEmbedder::default()).await?;
        let form = Form::new().part("files", file_part("notes.txt", "shopping list"));

        let response = reqwest::Client::new()
            .post(format!("{base}/upload_pdfs/"))
            .multipart(form)
            .send()
            .await?;

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert_eq!(body["error"], "no valid PDF files found");
        assert!(body["detail"].is_string());
        assert!(pipeline.index().upsert_calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn form_without_files_is_a_bad_request() -> anyhow::Result<()> {
        let (_dir, base, _pipeline) = spawn(HashingEmbedder::default()).await?;
        let form = Form::new().text("comment", "forgot the attachment");

        let response = reqwest::Client::new()
            .post(format!("{base}/upload_pdfs/"))
            .multipart(form)
            .send()
            .await?;

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await?;
        assert_eq!(body["error"], "no files provided");
        Ok(())
    }

    #[tokio::test]
    async fn embedding_outage_is_a_server_error() -> anyhow::Result<()> {
        let (_dir, base, pipeline) = spawn(UnavailableEmbedder).await?;
        let form = Form::new().part("files", file_part("manual.pdf", "Hydraulic pump"));

        let response = reqwest::Client::new()
            .post(format!("{base}/upload_pdfs/"))
            .multipart(form)
            .send()
            .await?;

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await?;
        assert!(body["error"]
            .as_str()
            .is_some_and(|error| error.starts_with("Error processing files:")));
        assert_eq!(body["detail"], "Please check your files and try again");
        assert!(pipeline.index().is_empty());
        Ok(())
    }
}
