use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpError;

#[derive(Debug, Error)]
pub enum Error {
    /// Transfer still failing after the retry budget was spent.
    #[error("download of {archive} failed after {attempts} attempt(s): {source}")]
    Download {
        archive: String,
        attempts: u32,
        source: HttpError,
    },

    /// Checksum mismatch that survived the single automatic re-download.
    #[error("integrity check for {archive} failed: expected sha256 {expected}, got {actual}")]
    Integrity {
        archive: String,
        expected: String,
        actual: String,
    },

    /// Transfer delivered a different byte count than the descriptor expects.
    #[error("size check for {archive} failed: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        archive: String,
        expected: u64,
        actual: u64,
    },

    #[error("cache I/O at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
