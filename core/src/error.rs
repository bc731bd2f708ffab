use std::io;

use thiserror::Error;

/// An error that happened while encoding, decoding or storing a chunk
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("unable to serialize records: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("unable to parse records: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("unable to compress chunk: {0}")]
    Compress(#[source] io::Error),

    #[error("unable to decompress chunk: {0}")]
    Decompress(#[source] io::Error),

    #[error("chunk header is truncated ({len} bytes)")]
    TruncatedHeader { len: usize },

    #[error("unsupported chunk format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown chunk flags {0:#04x}")]
    UnknownFlags(u8),

    #[error("compression task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An invalid chunk store configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk store name must not be empty")]
    EmptyName,

    #[error("chunk store name `{0}' must not contain path separators")]
    InvalidName(String),

    #[error("maximum chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk store must be created inside a tokio runtime")]
    NoRuntime,
}
