//! Spooling of multipart archive uploads to anonymous temp files.
//!
//! The HTTP request is finished before ingestion starts, so the body has to
//! live somewhere the background worker can read it afterwards. It is
//! streamed chunk by chunk into an unlinked temp file; memory use does not
//! depend on the archive size.

use std::{fs::File, io, path::Path};

use axum::extract::{Multipart, multipart::MultipartError};
use thiserror::Error;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Multipart field that carries the archive.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("multipart field `file` is required")]
    MissingFile,
    #[error("uploaded file is empty")]
    EmptyFile,
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("failed to spool upload: {0}")]
    Spool(#[from] io::Error),
}

/// An upload written to disk and rewound to its start.
#[derive(Debug)]
pub struct SpooledUpload {
    file: File,
    len: u64,
    file_name: Option<String>,
}

impl SpooledUpload {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

/// Writes the first `file` field of `multipart` to a temp file in
/// `spool_dir` (or the system temp directory). Other fields are skipped.
pub async fn spool_archive(
    multipart: &mut Multipart,
    spool_dir: Option<&Path>,
) -> Result<SpooledUpload, UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);

        let mut spool = create_spool_file(spool_dir).await?;

        let mut len = 0u64;
        while let Some(chunk) = field.chunk().await? {
            spool.write_all(&chunk).await?;
            len += chunk.len() as u64;
        }
        if len == 0 {
            return Err(UploadError::EmptyFile);
        }

        spool.flush().await?;
        spool.rewind().await?;
        let file = spool.into_std().await;

        return Ok(SpooledUpload {
            file,
            len,
            file_name,
        });
    }

    Err(UploadError::MissingFile)
}

/// Creates an unlinked temp file on the blocking pool.
async fn create_spool_file(
    spool_dir: Option<&Path>,
) -> io::Result<tokio::fs::File> {
    let dir = spool_dir.map(Path::to_path_buf);
    let file = tokio::task::spawn_blocking(move || match dir {
        Some(dir) => tempfile::tempfile_in(dir),
        None => tempfile::tempfile(),
    })
    .await
    .map_err(io::Error::other)??;
    Ok(tokio::fs::File::from_std(file))
}
