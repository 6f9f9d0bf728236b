use crate::error::IngestError;
use crate::models::{FileOutcome, SkipReason, UploadedFile};
use tracing::warn;

#[derive(Debug, Default)]
pub struct ValidatedUploads {
    pub accepted: Vec<UploadedFile>,
    pub rejected: Vec<FileOutcome>,
}

impl ValidatedUploads {
    pub fn accepted_names(&self) -> Vec<String> {
        self.accepted
            .iter()
            .filter_map(|file| file.name().map(str::to_string))
            .collect()
    }
}

pub fn has_pdf_extension(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}

/// Checks a single upload, returning the reason it cannot be ingested.
pub fn check_upload(file: &UploadedFile, max_file_bytes: u64) -> Result<(), SkipReason> {
    let name = file.name().ok_or(SkipReason::MissingFileName)?;

    if !has_pdf_extension(name) {
        return Err(SkipReason::NotPdf);
    }

    let size = file
        .declared_size
        .unwrap_or(0)
        .max(file.bytes.len() as u64);
    if size > max_file_bytes {
        return Err(SkipReason::TooLarge {
            size,
            limit: max_file_bytes,
        });
    }

    Ok(())
}

/// Filters the upload list down to named, size-bounded PDF files. Individual
/// rejections are reported, not raised; only an unusable list is an error.
pub fn validate_uploads(
    files: Vec<UploadedFile>,
    max_file_bytes: u64,
) -> Result<ValidatedUploads, IngestError> {
    if files.is_empty() {
        warn!("no files provided");
        return Err(IngestError::NoFiles);
    }

    if files.iter().all(|file| file.name().is_none()) {
        warn!("no files selected (empty filenames)");
        return Err(IngestError::NoFilesSelected);
    }

    let mut validated = ValidatedUploads::default();
    for file in files {
        match check_upload(&file, max_file_bytes) {
            Ok(()) => validated.accepted.push(file),
            Err(reason) => {
                let filename = file.name().unwrap_or_default().to_string();
                warn!(file = %filename, %reason, "skipping upload");
                validated.rejected.push(FileOutcome::skipped(filename, reason));
            }
        }
    }

    if validated.accepted.is_empty() {
        warn!("no valid PDF files found");
        return Err(IngestError::NoValidFiles);
    }

    Ok(validated)
}
