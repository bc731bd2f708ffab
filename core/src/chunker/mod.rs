//! The chunk store: spills batches of records to temporary files and replays
//! them later in the order in which they were appended.

mod pending;
pub mod replay;

use std::{
    collections::HashSet,
    io::ErrorKind,
    mem,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use crate::{
    codec::ChunkCodec,
    config::{ChunkStoreConfig, ReadBarrier},
    error::{ChunkError, ConfigError},
    latch::Latch,
    storage::{local::LocalStorage, ChunkStorage},
};

use self::{
    pending::{PendingWrites, WriteTicket},
    replay::Replay,
};

/// Outcome of reading a chunk. Reads never fail with an error; this status
/// tells whether an empty result means "no data" or "something went wrong".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The chunk was read and decoded
    Loaded,

    /// No chunk with this index has been flushed
    OutOfRange,

    /// The chunk has already been read and removed
    Consumed,

    /// The chunk was flushed but its file does not exist
    Missing,

    /// The chunk file could not be decompressed or parsed
    Corrupt,

    /// The chunk file could not be read
    Failed,

    /// The write of the chunk did not complete within the read timeout
    TimedOut,
}

impl ReadStatus {
    /// `true` if data was lost or could not be accessed
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ReadStatus::Missing | ReadStatus::Corrupt | ReadStatus::Failed | ReadStatus::TimedOut
        )
    }
}

/// The records of one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRead<T> {
    /// Index of the chunk
    pub index: usize,

    /// The records in the order in which they were appended. Empty unless
    /// `status` is [`ReadStatus::Loaded`].
    pub records: Vec<T>,

    pub status: ReadStatus,
}

impl<T> ChunkRead<T> {
    fn empty(index: usize, status: ReadStatus) -> Self {
        Self {
            index,
            records: Vec::new(),
            status,
        }
    }
}

/// State shared with background tasks
struct Shared<S> {
    config: ChunkStoreConfig,
    codec: ChunkCodec,
    storage: S,
    pending: PendingWrites,
}

impl<S: ChunkStorage> Shared<S> {
    /// Seal serialized records and write them to the chunk file
    async fn persist(&self, json: Result<Vec<u8>, ChunkError>, ticket: WriteTicket) {
        let index = ticket.index();
        let path = self.config.chunk_path(index);

        let sealed = match json {
            // compression runs off the async workers
            Ok(json) if self.codec.compress() => {
                let codec = self.codec;
                tokio::task::spawn_blocking(move || codec.seal(&json))
                    .await
                    .unwrap_or_else(|err| Err(err.into()))
            }
            json => json.and_then(|json| self.codec.seal(&json)),
        };

        let result = match sealed {
            Ok(bytes) => self
                .storage
                .write(&path, bytes)
                .await
                .map_err(ChunkError::from),
            Err(err) => Err(err),
        };

        match &result {
            Ok(()) => debug!(store = self.config.name(), index, "chunk written"),
            Err(err) => warn!(
                store = self.config.name(),
                index,
                path = %path.display(),
                "unable to write chunk: {err}"
            ),
        }

        if !self.pending.finish(ticket) && result.is_ok() {
            // the store was destroyed while this chunk was in flight
            debug!(store = self.config.name(), index, "removing orphaned chunk");
            self.remove(&path).await;
        }
    }

    /// Best-effort removal of a chunk file
    async fn remove(&self, path: &Path) {
        if let Err(err) = self.storage.remove(path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), "unable to remove chunk: {err}");
            }
        }
    }
}

/// A bounded-memory record spooler.
///
/// Records are collected in a staging buffer. As soon as the buffer holds
/// `max_chunk_size` records, it is serialized and handed to a background
/// task that compresses and writes it to a chunk file named
/// `<temp_dir>/<name>-<index>.chunker`. [`ChunkStore::end`] flushes the last,
/// partial chunk.
///
/// The chunks can be replayed with [`ChunkStore::each`]. A read waits for the
/// write of the chunk it reads, so writes may still be in flight when the
/// replay starts. Chunk files are removed after they have been read unless
/// `auto_remove` is disabled.
///
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// use chunker_core::{ChunkStore, ChunkStoreConfig};
///
/// let store = ChunkStore::new(ChunkStoreConfig::new("export").with_max_chunk_size(2))?;
/// for record in ["A", "B", "C"] {
///     store.append(record.to_string());
/// }
/// store.end();
///
/// let mut replay = store.each();
/// while let Some(chunk) = replay.next().await {
///     println!("{:?} ({}%)", chunk.records, store.replay_percentage());
/// }
/// store.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct ChunkStore<T, S = LocalStorage> {
    shared: Arc<Shared<S>>,
    runtime: Handle,
    staging: Mutex<Vec<T>>,
    chunk_count: AtomicUsize,
    total_records: AtomicUsize,
    replay_percentage: AtomicU8,
    consumed: Mutex<HashSet<usize>>,
}

impl<T> ChunkStore<T, LocalStorage>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a store that keeps its chunks on the local file system. Must
    /// be called from within a tokio runtime.
    pub fn new(config: ChunkStoreConfig) -> Result<Self, ConfigError> {
        Self::with_storage(config, LocalStorage)
    }
}

impl<T, S> ChunkStore<T, S>
where
    T: Serialize + DeserializeOwned,
    S: ChunkStorage,
{
    /// Create a store that keeps its chunks in the given storage. Must be
    /// called from within a tokio runtime.
    pub fn with_storage(config: ChunkStoreConfig, storage: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let codec = ChunkCodec::new(config.compress(), config.format());
        let staging = Vec::with_capacity(config.max_chunk_size());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                codec,
                storage,
                pending: PendingWrites::new(),
            }),
            runtime,
            staging: Mutex::new(staging),
            chunk_count: AtomicUsize::new(0),
            total_records: AtomicUsize::new(0),
            replay_percentage: AtomicU8::new(0),
            consumed: Mutex::new(HashSet::new()),
        })
    }

    /// Add a record. Flushes the staging buffer in the background if it has
    /// reached the maximum chunk size.
    pub fn append(&self, record: T) -> &Self {
        let chunk = {
            let mut staging = self.staging.lock();
            staging.push(record);
            (staging.len() >= self.shared.config.max_chunk_size())
                .then(|| self.take_chunk(&mut staging))
        };
        if let Some((records, ticket)) = chunk {
            self.spawn_write(records, ticket);
        }
        self
    }

    /// Alias for [`ChunkStore::append`]
    pub fn write(&self, record: T) -> &Self {
        self.append(record)
    }

    /// Flush the remaining records. Must be called after the last record
    /// has been appended, otherwise the tail of the stream is lost.
    pub fn end(&self) -> &Self {
        let chunk = {
            let mut staging = self.staging.lock();
            (!staging.is_empty()).then(|| self.take_chunk(&mut staging))
        };
        if let Some((records, ticket)) = chunk {
            self.spawn_write(records, ticket);
        }
        self
    }

    /// Move the staging buffer into a new chunk. The caller holds the
    /// staging lock, so indexes are allocated in the order of the records.
    ///
    /// The write is registered before the index is published. A reader that
    /// sees the index always finds its completion token.
    fn take_chunk(&self, staging: &mut Vec<T>) -> (Vec<T>, WriteTicket) {
        let records = mem::replace(
            staging,
            Vec::with_capacity(self.shared.config.max_chunk_size()),
        );

        let index = self.chunk_count.load(Ordering::Acquire);
        let ticket = self.shared.pending.begin(index);
        self.total_records.fetch_add(records.len(), Ordering::AcqRel);
        self.chunk_count.store(index + 1, Ordering::Release);

        (records, ticket)
    }

    /// Serialize a chunk and write it in the background. Runs outside the
    /// staging lock.
    fn spawn_write(&self, records: Vec<T>, ticket: WriteTicket) {
        debug!(
            store = self.name(),
            index = ticket.index(),
            records = records.len(),
            "flushing chunk"
        );

        let json = ChunkCodec::serialize(&records);
        drop(records);

        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            shared.persist(json, ticket).await;
        });
    }

    /// Read the records of the chunk with the given index.
    ///
    /// Waits until the chunk has been written. Never fails: if the chunk
    /// cannot be read, the result is empty and its status tells why. After a
    /// successful read, the chunk file is removed in the background if
    /// `auto_remove` is enabled.
    #[instrument(level = "debug", skip(self), fields(store = self.name()))]
    pub async fn read(&self, index: usize) -> ChunkRead<T> {
        if index >= self.next_chunk_index() {
            return ChunkRead::empty(index, ReadStatus::OutOfRange);
        }
        if self.consumed.lock().contains(&index) {
            return ChunkRead::empty(index, ReadStatus::Consumed);
        }

        if !self.wait_for_write(index).await {
            warn!("timed out waiting for chunk to be written");
            return ChunkRead::empty(index, ReadStatus::TimedOut);
        }

        let path = self.chunk_path(index);
        let bytes = match self.shared.storage.read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "chunk file does not exist");
                return ChunkRead::empty(index, ReadStatus::Missing);
            }
            Err(err) => {
                warn!(path = %path.display(), "unable to read chunk: {err}");
                return ChunkRead::empty(index, ReadStatus::Failed);
            }
        };

        let records = match self.shared.codec.decode(&bytes) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %path.display(), "unable to decode chunk: {err}");
                return ChunkRead::empty(index, ReadStatus::Corrupt);
            }
        };

        if self.shared.config.auto_remove() {
            self.consumed.lock().insert(index);
            let shared = Arc::clone(&self.shared);
            self.runtime.spawn(async move {
                shared.remove(&path).await;
            });
        }

        ChunkRead {
            index,
            records,
            status: ReadStatus::Loaded,
        }
    }

    /// Wait until the chunk with the given index can be read. Returns
    /// `false` if the read timeout elapsed first.
    async fn wait_for_write(&self, index: usize) -> bool {
        let config = &self.shared.config;
        let pending = &self.shared.pending;

        let barrier = async {
            match config.barrier() {
                ReadBarrier::Chunk => pending.wait_for(index).await,
                ReadBarrier::Store => {
                    while pending.count() > 0 {
                        debug!(pending = pending.count(), "writes pending, retrying later");
                        tokio::time::sleep(config.retry_delay()).await;
                    }
                }
            }
        };

        match config.read_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, barrier).await.is_ok(),
            None => {
                barrier.await;
                true
            }
        }
    }

    /// Start a replay over all chunks and reset the replay percentage
    pub fn each(&self) -> Replay<'_, T, S> {
        self.replay_percentage.store(0, Ordering::Release);
        Replay::new(self, 0)
    }

    /// Continue a replay at the given chunk index
    pub fn each_from(&self, cursor: usize) -> Replay<'_, T, S> {
        Replay::new(self, cursor)
    }

    /// Record the progress of a replay that has advanced to `cursor`
    fn set_replay_progress(&self, cursor: usize) {
        let pages = self.pages_created();
        if pages == 0 {
            return;
        }
        let percentage = (cursor * 100).div_ceil(pages).min(100);
        self.replay_percentage
            .store(percentage as u8, Ordering::Release);
    }

    /// Remove all chunk files created so far, including those that have
    /// already been consumed. Errors are ignored.
    ///
    /// Waits for writes in flight first, so no chunk file can appear after
    /// `clear` has returned. Chunks flushed while `clear` runs are not
    /// removed.
    #[instrument(level = "debug", skip(self), fields(store = self.name()))]
    pub async fn clear(&self) {
        self.shared.pending.wait_idle().await;
        let count = self.next_chunk_index();
        let latch = Arc::new(Latch::new(count as i64));

        for index in 0..count {
            let shared = Arc::clone(&self.shared);
            let latch = Arc::clone(&latch);
            self.runtime.spawn(async move {
                shared.remove(&shared.config.chunk_path(index)).await;
                latch.next();
            });
        }

        latch.wait().await;
        self.consumed.lock().extend(0..count);
        debug!(chunks = count, "cleared chunks");
    }

    /// Remove all chunk files and release the store. Writes that are still
    /// in flight are not awaited; their files are removed as soon as they
    /// complete.
    #[instrument(level = "debug", skip(self), fields(store = self.name()))]
    pub async fn destroy(self) {
        // fence in-flight writes first so that no file can appear after
        // the clear below
        self.shared.pending.reset();
        self.clear().await;
        self.staging.lock().clear();
    }

    /// Wait until all chunks flushed so far have been written
    pub async fn settled(&self) {
        self.shared.pending.wait_idle().await;
    }
}

impl<T, S> ChunkStore<T, S> {
    pub fn name(&self) -> &str {
        self.shared.config.name()
    }

    pub fn config(&self) -> &ChunkStoreConfig {
        &self.shared.config
    }

    pub fn storage(&self) -> &S {
        &self.shared.storage
    }

    /// Path of the chunk file with the given index
    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.shared.config.chunk_path(index)
    }

    /// The index the next flushed chunk will get
    pub fn next_chunk_index(&self) -> usize {
        self.chunk_count.load(Ordering::Acquire)
    }

    /// Number of chunks created so far. Always equal to
    /// [`ChunkStore::next_chunk_index`].
    pub fn pages_created(&self) -> usize {
        self.next_chunk_index()
    }

    /// Number of records flushed to chunks so far
    pub fn total_record_count(&self) -> usize {
        self.total_records.load(Ordering::Acquire)
    }

    /// Progress of the current or last replay in percent
    pub fn replay_percentage(&self) -> u8 {
        self.replay_percentage.load(Ordering::Acquire)
    }

    /// Number of chunk writes that have not completed yet
    pub fn pending_writes(&self) -> usize {
        self.shared.pending.count()
    }

    /// Number of records waiting in the staging buffer
    pub fn staged(&self) -> usize {
        self.staging.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use assertor::{assert_that, BooleanAssertion, EqualityAssertion};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::{ChunkStore, ReadStatus};
    use crate::{
        codec::ChunkCodec,
        config::{ChunkFormat, ChunkStoreConfig, ReadBarrier},
        error::ConfigError,
        storage::memory::MemoryStorage,
    };

    type Store = ChunkStore<String, Arc<MemoryStorage>>;

    fn config(max_chunk_size: usize) -> ChunkStoreConfig {
        ChunkStoreConfig::new("test")
            .with_temp_dir("/spool")
            .with_max_chunk_size(max_chunk_size)
            .with_compress(false)
    }

    fn store_with(config: ChunkStoreConfig, storage: MemoryStorage) -> (Store, Arc<MemoryStorage>) {
        let storage = Arc::new(storage);
        let store = ChunkStore::with_storage(config, Arc::clone(&storage)).unwrap();
        (store, storage)
    }

    fn letters(store: &Store, letters: &str) {
        for c in letters.chars() {
            store.append(c.to_string());
        }
    }

    /// Give background removals a chance to run
    async fn drain() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn five_records_in_chunks_of_two() {
        let (store, storage) = store_with(config(2), MemoryStorage::new());
        letters(&store, "ABCDE");
        assert_that!(store.staged()).is_equal_to(1);
        store.end();
        assert_that!(store.staged()).is_equal_to(0);

        assert_that!(store.pages_created()).is_equal_to(3);
        assert_that!(store.next_chunk_index()).is_equal_to(3);
        assert_that!(store.total_record_count()).is_equal_to(5);

        store.settled().await;
        assert_that!(store.pending_writes()).is_equal_to(0);
        let codec = ChunkCodec::new(false, ChunkFormat::Framed);
        let chunk = |i| {
            codec
                .decode::<String>(&storage.get(&store.chunk_path(i)).unwrap())
                .unwrap()
        };
        assert_eq!(chunk(0), vec!["A", "B"]);
        assert_eq!(chunk(1), vec!["C", "D"]);
        assert_eq!(chunk(2), vec!["E"]);

        let mut replay = store.each();
        let mut percentages = Vec::new();
        let mut records = Vec::new();
        let mut indexes = Vec::new();
        while let Some(chunk) = replay.next().await {
            assert_that!(chunk.status).is_equal_to(ReadStatus::Loaded);
            percentages.push(store.replay_percentage());
            indexes.push(chunk.index);
            records.extend(chunk.records);
        }
        assert_eq!(percentages, vec![34, 67, 100]);
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(records, vec!["A", "B", "C", "D", "E"]);

        drain().await;
        assert_that!(storage.is_empty()).is_true();
    }

    #[tokio::test]
    async fn chunk_count() {
        for (n, m, expected) in [(0, 3, 0), (1, 3, 1), (3, 3, 1), (6, 3, 2), (7, 3, 3), (10, 1, 10)] {
            let (store, _) = store_with(config(m), MemoryStorage::new());
            for i in 0..n {
                store.append(i.to_string());
            }
            store.end();
            assert_that!(store.pages_created()).is_equal_to(expected);
            assert_that!(store.total_record_count()).is_equal_to(n);
        }
    }

    #[tokio::test]
    async fn end_twice() {
        let (store, _) = store_with(config(4), MemoryStorage::new());
        letters(&store, "AB");
        store.end().end();
        assert_that!(store.pages_created()).is_equal_to(1);
    }

    #[tokio::test]
    async fn empty_replay() {
        let (store, _) = store_with(config(4), MemoryStorage::new());
        store.end();
        assert_that!(store.each().next().await.is_none()).is_true();
        assert_that!(store.replay_percentage()).is_equal_to(0);
    }

    #[tokio::test]
    async fn single_consumption() {
        let (store, _) = store_with(config(2), MemoryStorage::new());
        letters(&store, "AB");
        store.end();

        let first = store.read(0).await;
        assert_that!(first.status).is_equal_to(ReadStatus::Loaded);
        assert_eq!(first.records, vec!["A", "B"]);

        let second = store.read(0).await;
        assert_that!(second.status).is_equal_to(ReadStatus::Consumed);
        assert_that!(second.records.is_empty()).is_true();
        assert_that!(second.status.is_failure()).is_false();

        let beyond = store.read(1).await;
        assert_that!(beyond.status).is_equal_to(ReadStatus::OutOfRange);
    }

    #[tokio::test]
    async fn keep_chunks() {
        let (store, storage) = store_with(config(2).with_auto_remove(false), MemoryStorage::new());
        letters(&store, "ABC");
        store.end();

        let first: Vec<_> = store.each().collect().await;
        let second: Vec<_> = store.each().collect().await;
        assert_eq!(first, vec!["A", "B", "C"]);
        assert_eq!(first, second);

        drain().await;
        assert_that!(storage.len()).is_equal_to(2);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_writes() {
        let storage = MemoryStorage::new().with_write_delay(Duration::from_millis(5));
        storage.delay_writes_to("/spool/test-0.chunker", Duration::from_secs(30));
        let (store, _) = store_with(config(2), storage);
        letters(&store, "ABCDEFG");
        store.end();

        // chunk 1 is available long before chunk 0
        let start = tokio::time::Instant::now();
        let chunk = store.read(1).await;
        assert_eq!(chunk.records, vec!["C", "D"]);
        assert_that!(start.elapsed() < Duration::from_secs(1)).is_true();
        assert_that!(store.pending_writes()).is_equal_to(1);

        let records = store.each().collect().await;
        assert_eq!(records, vec!["A", "B", "E", "F", "G"]);
        assert_that!(start.elapsed() >= Duration::from_secs(30)).is_true();
    }

    #[tokio::test(start_paused = true)]
    async fn store_wide_barrier() {
        let storage = MemoryStorage::new();
        storage.delay_writes_to("/spool/test-0.chunker", Duration::from_secs(2));
        let (store, _) = store_with(config(1).with_barrier(ReadBarrier::Store), storage);
        letters(&store, "AB");

        // chunk 1 is written immediately but the read waits for chunk 0
        let start = tokio::time::Instant::now();
        let chunk = store.read(1).await;
        assert_eq!(chunk.records, vec!["B"]);
        assert_that!(start.elapsed() >= Duration::from_secs(2)).is_true();
        // retries happen in steps of the retry delay
        assert_that!(start.elapsed() < Duration::from_secs(3)).is_true();
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout() {
        let storage = MemoryStorage::new().with_write_delay(Duration::from_secs(60));
        let (store, _) = store_with(
            config(1).with_read_timeout(Some(Duration::from_secs(1))),
            storage,
        );
        store.append("A".to_string());

        let chunk = store.read(0).await;
        assert_that!(chunk.status).is_equal_to(ReadStatus::TimedOut);
        assert_that!(chunk.status.is_failure()).is_true();

        // once the write has completed the chunk can be read
        store.settled().await;
        let chunk = store.read(0).await;
        assert_eq!(chunk.records, vec!["A"]);
    }

    #[tokio::test]
    async fn failed_write() {
        let storage = MemoryStorage::new();
        storage.fail_writes_to("/spool/test-1.chunker");
        let (store, _) = store_with(config(1), storage);
        letters(&store, "ABC");

        let mut replay = store.each();
        let mut statuses = Vec::new();
        while let Some(chunk) = replay.next().await {
            statuses.push(chunk.status);
        }
        assert_eq!(
            statuses,
            vec![ReadStatus::Loaded, ReadStatus::Missing, ReadStatus::Loaded]
        );
        assert_that!(store.pending_writes()).is_equal_to(0);
    }

    #[tokio::test]
    async fn corrupt_chunk() {
        let (store, storage) = store_with(config(1), MemoryStorage::new());
        store.append("A".to_string());
        store.settled().await;
        storage.insert(store.chunk_path(0), b"CHK\x01\x00[not json".to_vec());

        let chunk = store.read(0).await;
        assert_that!(chunk.status).is_equal_to(ReadStatus::Corrupt);
        assert_that!(chunk.records.is_empty()).is_true();

        // corrupt chunks are not removed
        drain().await;
        assert_that!(storage.contains(&store.chunk_path(0))).is_true();
    }

    #[tokio::test]
    async fn headerless_chunks() {
        let config = config(2).with_format(ChunkFormat::Raw).with_compress(true);
        let (store, storage) = store_with(config, MemoryStorage::new());
        letters(&store, "ABC");
        store.end();
        store.settled().await;

        // written without a frame header
        let raw = storage.get(&store.chunk_path(0)).unwrap();
        assert_that!(raw.starts_with(b"CHK")).is_false();

        assert_eq!(store.each().collect().await, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn clear() {
        let (store, storage) = store_with(config(1), MemoryStorage::new());
        letters(&store, "ABC");
        store.settled().await;
        assert_that!(store.read(0).await.status).is_equal_to(ReadStatus::Loaded);

        store.clear().await;
        assert_that!(storage.is_empty()).is_true();
        assert_that!(store.read(1).await.status).is_equal_to(ReadStatus::Consumed);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_waits_for_writes() {
        let storage = MemoryStorage::new();
        storage.delay_writes_to("/spool/test-1.chunker", Duration::from_secs(5));
        let (store, storage) = store_with(config(1), storage);
        letters(&store, "AB");

        let start = tokio::time::Instant::now();
        store.clear().await;
        assert_that!(start.elapsed() >= Duration::from_secs(5)).is_true();
        assert_that!(store.pending_writes()).is_equal_to(0);

        // nothing lands after the clear
        tokio::time::sleep(Duration::from_secs(10)).await;
        drain().await;
        assert_that!(storage.is_empty()).is_true();
    }

    #[tokio::test]
    async fn compressed_chunks() {
        let (store, storage) = store_with(config(2).with_compress(true), MemoryStorage::new());
        letters(&store, "ABCDE");
        store.end();
        store.settled().await;

        let codec = ChunkCodec::default();
        for i in 0..3 {
            let bytes = storage.get(&store.chunk_path(i)).unwrap();
            assert_that!(codec.inspect(&bytes).unwrap().compressed).is_true();
        }
        assert_eq!(store.each().collect().await, vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_while_appending() {
        for _ in 0..50 {
            let (store, storage) = store_with(config(1), MemoryStorage::new());
            let store = Arc::new(store);

            let producer = {
                let store = Arc::clone(&store);
                tokio::task::spawn_blocking(move || {
                    for i in 0..200 {
                        store.append(i.to_string());
                    }
                    store.end();
                })
            };

            // read every chunk as soon as its index is visible
            let mut records = Vec::new();
            let mut index = 0;
            while index < 200 {
                if index < store.next_chunk_index() {
                    let chunk = store.read(index).await;
                    assert_that!(chunk.status).is_equal_to(ReadStatus::Loaded);
                    records.extend(chunk.records);
                    index += 1;
                } else {
                    tokio::task::yield_now().await;
                }
            }
            producer.await.unwrap();

            let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
            assert_eq!(records, expected);

            store.clear().await;
            assert_that!(storage.is_empty()).is_true();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_with_writes_in_flight() {
        let storage = MemoryStorage::new();
        for i in 1..4 {
            storage.delay_writes_to(format!("/spool/test-{i}.chunker"), Duration::from_secs(5));
        }
        let (store, storage) = store_with(config(1), storage);
        letters(&store, "ABC");
        store.append("D".to_string());
        drain().await;
        assert_that!(storage.len()).is_equal_to(1);
        assert_that!(store.pending_writes()).is_equal_to(3);

        store.destroy().await;
        assert_that!(storage.is_empty()).is_true();

        // the remaining writes land after the destroy and clean up after
        // themselves
        tokio::time::sleep(Duration::from_secs(10)).await;
        drain().await;
        assert_that!(storage.is_empty()).is_true();
    }

    #[tokio::test]
    async fn json_records() {
        let storage = Arc::new(MemoryStorage::new());
        let store: ChunkStore<Value, _> = ChunkStore::with_storage(
            ChunkStoreConfig::new("json").with_max_chunk_size(2),
            Arc::clone(&storage),
        )
        .unwrap();
        let records = vec![
            json!({ "id": 1, "tags": ["a", "b"] }),
            json!({ "id": 2, "nested": { "x": 1.5 } }),
            json!({ "id": 3 }),
        ];
        for r in records.clone() {
            store.append(r);
        }
        store.end();
        assert_eq!(store.each().collect().await, records);
    }

    #[tokio::test]
    async fn invalid_config() {
        let r = ChunkStore::<String, _>::with_storage(config(0), MemoryStorage::new());
        assert_eq!(r.err(), Some(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn requires_runtime() {
        let r = ChunkStore::<String, _>::with_storage(config(1), MemoryStorage::new());
        assert_eq!(r.err(), Some(ConfigError::NoRuntime));
    }
}
