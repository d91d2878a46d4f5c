use std::io;

use thiserror::Error;

/// Failures visible to whoever asked for an ingestion run.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("an ingestion run is already in progress")]
    AlreadyRunning,

    #[error("ingestion source could not be opened: {0}")]
    Acquisition(#[from] io::Error),

    #[error("ingestion requires a running Tokio runtime")]
    NoRuntime,

    #[error("ingestion worker failed: {0}")]
    Worker(String),
}

/// Failure to pull a sender out of a single message.
///
/// The ingestion pipeline treats every variant as skip-and-continue; the
/// distinction only changes how loudly the entry is logged.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("I/O error while reading message: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl ExtractError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// The outer compressed/container stream could not be decoded.
///
/// Fatal to the run that hit it. Cloneable so a poisoned reader can keep
/// handing the same error back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamCorruptError {
    #[error("archive stream could not be read: {message}")]
    Read {
        kind: io::ErrorKind,
        message: String,
    },

    #[error("archive truncated while reading {0}")]
    Truncated(&'static str),

    #[error("invalid tar header at block {block}: {reason}")]
    InvalidHeader { block: u64, reason: &'static str },
}

impl StreamCorruptError {
    pub(crate) fn from_io(err: &io::Error, context: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated(context)
        } else {
            Self::Read {
                kind: err.kind(),
                message: err.to_string(),
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("limit must be greater than zero")]
    InvalidLimit,
}

pub type Result<T> = std::result::Result<T, IngestionError>;
