//! Conversion between record batches and the bytes of a chunk file.
//!
//! A chunk is a JSON array of records, optionally zlib-compressed. Framed
//! chunks start with a small header so that a reader can tell how the
//! payload was written:
//!
//! ```text
//! +-----+-----+-----+---------+-------+-----------------
//! | 'C' | 'H' | 'K' | version | flags | payload ...
//! +-----+-----+-----+---------+-------+-----------------
//! ```
//!
//! Headerless ("raw") chunks carry only the payload. Their compression must
//! be known by the reader. A raw payload always starts with `[` or with a
//! zlib header byte, so it can never be mistaken for a frame.

use std::{
    borrow::Cow,
    io::{Read, Write},
};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};

use crate::{config::ChunkFormat, error::ChunkError};

/// Magic bytes at the beginning of a framed chunk
pub const MAGIC: &[u8; 3] = b"CHK";

/// The current frame version
pub const VERSION: u8 = 1;

/// Length of the frame header in bytes
pub const HEADER_LEN: usize = MAGIC.len() + 2;

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const KNOWN_FLAGS: u8 = FLAG_COMPRESSED;

/// Describes how a chunk file was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// `true` if the chunk starts with a frame header
    pub framed: bool,

    /// The frame version, if the chunk is framed
    pub version: Option<u8>,

    /// `true` if the payload is compressed. For headerless chunks this is
    /// the codec's own setting.
    pub compressed: bool,

    /// Number of payload bytes after the header
    pub payload_len: usize,
}

/// Encodes and decodes chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCodec {
    compress: bool,
    format: ChunkFormat,
}

impl ChunkCodec {
    /// Create a codec. `compress` decides how new chunks are written and how
    /// headerless chunks are read.
    pub fn new(compress: bool, format: ChunkFormat) -> Self {
        Self { compress, format }
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn format(&self) -> ChunkFormat {
        self.format
    }

    /// Serialize records to the JSON text stored in a chunk
    pub fn serialize<T: Serialize>(records: &[T]) -> Result<Vec<u8>, ChunkError> {
        serde_json::to_vec(records).map_err(ChunkError::Serialize)
    }

    /// Compress (if enabled) and frame (if enabled) serialized records
    pub fn seal(&self, json: &[u8]) -> Result<Vec<u8>, ChunkError> {
        let mut out = Vec::with_capacity(HEADER_LEN + json.len());
        if self.format == ChunkFormat::Framed {
            out.extend_from_slice(MAGIC);
            out.push(VERSION);
            out.push(if self.compress { FLAG_COMPRESSED } else { 0 });
        }

        if self.compress {
            let mut encoder = ZlibEncoder::new(out, Compression::default());
            encoder.write_all(json).map_err(ChunkError::Compress)?;
            encoder.finish().map_err(ChunkError::Compress)
        } else {
            out.extend_from_slice(json);
            Ok(out)
        }
    }

    /// Serialize and seal records in one step
    pub fn encode<T: Serialize>(&self, records: &[T]) -> Result<Vec<u8>, ChunkError> {
        self.seal(&Self::serialize(records)?)
    }

    /// Look at the beginning of a chunk and report how it was written
    pub fn inspect(&self, bytes: &[u8]) -> Result<FrameInfo, ChunkError> {
        if !bytes.starts_with(MAGIC) {
            return Ok(FrameInfo {
                framed: false,
                version: None,
                compressed: self.compress,
                payload_len: bytes.len(),
            });
        }

        if bytes.len() < HEADER_LEN {
            return Err(ChunkError::TruncatedHeader { len: bytes.len() });
        }

        let version = bytes[MAGIC.len()];
        if version != VERSION {
            return Err(ChunkError::UnsupportedVersion(version));
        }

        let flags = bytes[MAGIC.len() + 1];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(ChunkError::UnknownFlags(flags));
        }

        Ok(FrameInfo {
            framed: true,
            version: Some(version),
            compressed: flags & FLAG_COMPRESSED != 0,
            payload_len: bytes.len() - HEADER_LEN,
        })
    }

    /// Strip the frame header and decompress the payload. Returns the JSON
    /// text of the chunk.
    pub fn open<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, [u8]>, ChunkError> {
        let info = self.inspect(bytes)?;
        let payload = if info.framed {
            &bytes[HEADER_LEN..]
        } else {
            bytes
        };

        if info.compressed {
            let mut json = Vec::with_capacity(payload.len() * 4);
            ZlibDecoder::new(payload)
                .read_to_end(&mut json)
                .map_err(ChunkError::Decompress)?;
            Ok(Cow::Owned(json))
        } else {
            Ok(Cow::Borrowed(payload))
        }
    }

    /// Decode the records stored in a chunk
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Vec<T>, ChunkError> {
        let json = self.open(bytes)?;
        serde_json::from_slice(&json).map_err(ChunkError::Parse)
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new(true, ChunkFormat::Framed)
    }
}
