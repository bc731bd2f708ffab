use std::ops::ControlFlow;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{ChunkRead, ChunkStore};
use crate::storage::ChunkStorage;

/// A consumer-paced replay over the chunks of a [`ChunkStore`].
///
/// The next chunk is only read when [`Replay::next`] is called, so at most
/// one chunk is being read at a time no matter how many writes are still in
/// flight. The cursor is advanced before the read is awaited: if a call to
/// `next` is abandoned, the chunk it was reading is skipped by the following
/// call.
pub struct Replay<'a, T, S> {
    store: &'a ChunkStore<T, S>,
    cursor: usize,
}

impl<'a, T, S> Replay<'a, T, S>
where
    T: Serialize + DeserializeOwned,
    S: ChunkStorage,
{
    pub(super) fn new(store: &'a ChunkStore<T, S>, cursor: usize) -> Self {
        Self { store, cursor }
    }

    /// Index of the chunk the next call to [`Replay::next`] will read
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Read the next chunk. Returns `None` once all chunks created so far
    /// have been delivered.
    pub async fn next(&mut self) -> Option<ChunkRead<T>> {
        if self.cursor >= self.store.next_chunk_index() {
            debug!(store = self.store.name(), "replay finished");
            return None;
        }

        let index = self.cursor;
        self.cursor += 1;

        let chunk = self.store.read(index).await;
        self.store.set_replay_progress(self.cursor);
        Some(chunk)
    }

    /// Deliver every remaining chunk to `on_item` until it returns
    /// [`ControlFlow::Break`]. Returns the number of chunks delivered.
    pub async fn for_each<F>(mut self, mut on_item: F) -> usize
    where
        F: FnMut(ChunkRead<T>) -> ControlFlow<()>,
    {
        let mut delivered = 0;
        while let Some(chunk) = self.next().await {
            delivered += 1;
            if on_item(chunk).is_break() {
                break;
            }
        }
        delivered
    }

    /// Concatenate the records of all remaining chunks
    pub async fn collect(mut self) -> Vec<T> {
        let mut records = Vec::new();
        while let Some(chunk) = self.next().await {
            records.extend(chunk.records);
        }
        records
    }
}
