use std::io;
use std::path::PathBuf;

use citibike_core::SchemaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The archive cannot be opened or decompressed at all.
    #[error("archive {archive} is corrupt or not a zip file")]
    CorruptArchive { archive: String },

    /// An annual bundle is missing one of its expected monthly members.
    #[error("archive {archive} is missing expected member '{member}'")]
    MissingMember { archive: String, member: String },

    /// A shard's header row matches no dialect this epoch publishes.
    #[error("shard '{member}' in {archive}: {source}")]
    Schema {
        archive: String,
        member: String,
        source: SchemaError,
    },

    /// The CSV stream broke mid-shard (encoding damage, not a bad row).
    #[error("shard '{member}' in {archive} is unreadable: {source}")]
    ShardRead {
        archive: String,
        member: String,
        source: csv::Error,
    },

    #[error("extraction I/O at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
