use std::{
    path::{is_separator, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File extension of chunk files
pub const CHUNK_EXTENSION: &str = "chunker";

/// Default number of records per chunk
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 50;

/// Default delay between two checks of the store-wide read barrier
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(300);

/// How chunk files are laid out on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFormat {
    /// A header describing version and compression precedes the payload
    #[default]
    Framed,

    /// Only the payload. Readers must know whether it is compressed.
    Raw,
}

/// What a read waits for before it touches the storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadBarrier {
    /// Wait only for the write of the chunk being read
    #[default]
    Chunk,

    /// Wait until no write at all is pending, checking every `retry_delay`
    Store,
}

/// Configuration of a [`ChunkStore`](crate::ChunkStore)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkStoreConfig {
    name: String,
    temp_dir: PathBuf,
    max_chunk_size: usize,
    compress: bool,
    auto_remove: bool,
    format: ChunkFormat,
    barrier: ReadBarrier,
    #[serde(with = "humantime_duration")]
    retry_delay: Duration,
    #[serde(
        with = "humantime_duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    read_timeout: Option<Duration>,
}

impl ChunkStoreConfig {
    /// Create a configuration with default settings for the stream `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    pub fn with_format(mut self, format: ChunkFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_barrier(mut self, barrier: ReadBarrier) -> Self {
        self.barrier = barrier;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temp_dir(&self) -> &PathBuf {
        &self.temp_dir
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn auto_remove(&self) -> bool {
        self.auto_remove
    }

    pub fn format(&self) -> ChunkFormat {
        self.format
    }

    pub fn barrier(&self) -> ReadBarrier {
        self.barrier
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Path of the chunk file with the given index
    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.temp_dir
            .join(format!("{}-{}.{}", self.name, index, CHUNK_EXTENSION))
    }

    /// Check that the configuration can be used to create a store
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.name.chars().any(is_separator) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        if self.max_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}

impl Default for ChunkStoreConfig {
    fn default() -> Self {
        Self {
            name: "chunker".to_string(),
            temp_dir: std::env::temp_dir(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            compress: true,
            auto_remove: true,
            format: ChunkFormat::default(),
            barrier: ReadBarrier::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
            read_timeout: None,
        }
    }
}

/// (De)serialize durations as human readable strings such as `300ms`
mod humantime_duration {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(D::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<Duration>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] Duration);

            let v: Option<Wrapper> = Option::deserialize(d)?;
            Ok(v.map(|Wrapper(d)| d))
        }
    }
}
