//! Local staging of uploaded bytes. Every request writes into its own
//! directory under the staging root so concurrent uploads with the same
//! filename cannot clobber each other.

use crate::error::IngestError;
use crate::ingest::digest_bytes;
use crate::models::{SkipReason, UploadedFile};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Name as supplied by the client.
    pub filename: String,
    pub path: PathBuf,
    pub stem: String,
    pub checksum: String,
    pub size: usize,
}

#[derive(Debug)]
pub struct StagingScope {
    dir: PathBuf,
    stems: HashSet<String>,
    staged: Vec<PathBuf>,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn prepare(&self) -> Result<(), IngestError> {
        fs::create_dir_all(&self.root).await?;
        info!(root = %self.root.display(), "staging directory ready");
        Ok(())
    }

    pub async fn open_scope(&self, request_id: Uuid) -> Result<StagingScope, IngestError> {
        let dir = self.root.join(request_id.to_string());
        fs::create_dir_all(&dir).await?;
        Ok(StagingScope {
            dir,
            stems: HashSet::new(),
            staged: Vec::new(),
        })
    }

    /// Removes request directories left behind by uploads that failed before
    /// their cleanup ran. Returns how many were removed.
    pub async fn purge(&self) -> Result<usize, IngestError> {
        let mut removed = 0;
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let is_scope = entry
                .file_name()
                .to_str()
                .is_some_and(|name| Uuid::parse_str(name).is_ok());
            if !is_scope || !entry.file_type().await?.is_dir() {
                continue;
            }

            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(error) => {
                    warn!(path = %entry.path().display(), %error, "could not purge staging scope")
                }
            }
        }

        Ok(removed)
    }
}

impl StagingScope {
    /// Writes one upload to disk. Empty files and stems already used in this
    /// request are skipped. The stem keeps the client's spelling; only the
    /// local file name is sanitized and prefixed with its staging position.
    pub async fn stage(&mut self, file: &UploadedFile) -> Result<StagedFile, SkipReason> {
        let filename = file.name().ok_or(SkipReason::MissingFileName)?.to_string();

        if file.bytes.is_empty() {
            return Err(SkipReason::Empty);
        }

        let base = base_name(&filename).ok_or(SkipReason::MissingFileName)?;
        let stem = Path::new(base)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(base)
            .to_string();

        let safe_name = sanitize_filename(&filename).map_err(|error| SkipReason::StagingFailed {
            message: error.to_string(),
        })?;

        if !self.stems.insert(stem.clone()) {
            return Err(SkipReason::DuplicateStem { stem });
        }

        let path = self
            .dir
            .join(format!("{:04}-{safe_name}", self.staged.len()));
        if let Err(error) = fs::write(&path, &file.bytes).await {
            self.stems.remove(&stem);
            return Err(SkipReason::StagingFailed {
                message: error.to_string(),
            });
        }
        self.staged.push(path.clone());

        Ok(StagedFile {
            filename,
            path,
            stem,
            checksum: digest_bytes(&file.bytes),
            size: file.bytes.len(),
        })
    }

    /// Deletes staged files and the scope directory. Failures are logged only.
    pub async fn cleanup(self) {
        for path in &self.staged {
            match fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "removed staged file"),
                Err(error) => warn!(path = %path.display(), %error, "could not remove staged file"),
            }
        }

        if let Err(error) = fs::remove_dir(&self.dir).await {
            warn!(path = %self.dir.display(), %error, "could not remove staging scope");
        }
    }
}

/// Final path component of a client supplied name, or `None` when nothing
/// usable is left.
fn base_name(filename: &str) -> Option<&str> {
    let last = filename
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(filename)
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last)
    }
}

fn unsafe_chars() -> Result<&'static Regex, IngestError> {
    if let Some(regex) = UNSAFE_CHARS.get() {
        return Ok(regex);
    }
    let regex = Regex::new(r"[^A-Za-z0-9._ -]")?;
    Ok(UNSAFE_CHARS.get_or_init(|| regex))
}

/// Keeps only the final path component of a client supplied name and
/// replaces characters that are unsafe in a local filename.
pub fn sanitize_filename(filename: &str) -> Result<String, IngestError> {
    let last =
        base_name(filename).ok_or_else(|| IngestError::MissingFileName(filename.to_string()))?;
    Ok(unsafe_chars()?.replace_all(last, "_").into_owned())
}
