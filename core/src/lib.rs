//! Bounded-memory, disk-backed record spooling.
//!
//! A [`ChunkStore`] accepts an unbounded stream of records, keeps at most one
//! chunk of them in memory and spills every full chunk to a temporary file in
//! the background. The chunks can later be replayed in their original order
//! with a consumer-paced [`Replay`] cursor. Every chunk file is deleted after
//! it has been read once.

pub mod chunker;
pub mod codec;
pub mod config;
pub mod error;
pub mod latch;
pub mod storage;

pub use chunker::{replay::Replay, ChunkRead, ChunkStore, ReadStatus};
pub use codec::{ChunkCodec, FrameInfo};
pub use config::{ChunkFormat, ChunkStoreConfig, ReadBarrier};
pub use error::{ChunkError, ConfigError};
pub use latch::Latch;
pub use storage::{local::LocalStorage, memory::MemoryStorage, ChunkStorage};
