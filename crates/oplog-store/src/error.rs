use std::io;
use std::path::PathBuf;

use oplog_types::ObjectId;

/// Errors from the persistence engine.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The data directory is missing, not a directory, or not read/writable.
    /// Fatal at database construction; never retried.
    #[error("invalid data dir {path}: {source}")]
    InvalidDataDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A log line could not be decoded during replay. Fatal to the whole
    /// database load.
    #[error("collection {collection}: invalid record on line {line}: {reason}")]
    Decode {
        collection: String,
        line: u64,
        reason: String,
    },

    /// A `set`/`unset` record referenced an id with no preceding `add` in
    /// the same log. Fatal to the whole database load.
    #[error("collection {collection}: object {id} not found (line {line})")]
    UnknownObject {
        collection: String,
        id: ObjectId,
        line: u64,
    },

    /// A collection was re-registered with a different record kind.
    #[error("collection {collection} is registered with kind `{registered}`, not `{requested}`")]
    KindMismatch {
        collection: String,
        registered: String,
        requested: String,
    },

    /// I/O error from the underlying log file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
