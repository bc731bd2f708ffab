use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::watch;

/// Keeps track of chunk writes that have been issued but not completed yet.
///
/// Every write gets its own completion token, so a reader can wait for
/// exactly the chunk it wants to read. The total number of pending writes is
/// published through a watch channel for the store-wide barrier and for
/// [`PendingWrites::wait_idle`].
///
/// Writes are fenced by an epoch. After [`PendingWrites::reset`] tickets
/// issued earlier no longer touch the counters when they finish.
#[derive(Debug)]
pub(crate) struct PendingWrites {
    count: watch::Sender<usize>,
    tokens: Mutex<HashMap<usize, watch::Receiver<bool>>>,
    epoch: AtomicU64,
}

/// Handed to the task performing a write. Must be passed back to
/// [`PendingWrites::finish`] when the write is done, successful or not.
#[derive(Debug)]
pub(crate) struct WriteTicket {
    index: usize,
    epoch: u64,
    done: watch::Sender<bool>,
}

impl WriteTicket {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl PendingWrites {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count,
            tokens: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Register a write of the chunk with the given index
    pub fn begin(&self, index: usize) -> WriteTicket {
        let (done, token) = watch::channel(false);
        self.tokens.lock().insert(index, token);
        self.count.send_modify(|count| *count += 1);
        WriteTicket {
            index,
            epoch: self.epoch.load(Ordering::Acquire),
            done,
        }
    }

    /// Mark a write as completed. Returns `false` if the ticket was issued
    /// before the last [`PendingWrites::reset`].
    pub fn finish(&self, ticket: WriteTicket) -> bool {
        let current = ticket.epoch == self.epoch.load(Ordering::Acquire);
        if current {
            self.tokens.lock().remove(&ticket.index);
            self.count
                .send_modify(|count| *count = count.saturating_sub(1));
        }
        ticket.done.send_replace(true);
        current
    }

    /// Number of writes that have not completed yet
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until the write of the chunk with the given index has completed.
    /// Returns immediately if there is no such write.
    pub async fn wait_for(&self, index: usize) {
        let token = self.tokens.lock().get(&index).cloned();
        if let Some(mut token) = token {
            // a dropped ticket means the write task is gone
            let _ = token.wait_for(|done| *done).await;
        }
    }

    /// Wait until no write is pending
    pub async fn wait_idle(&self) {
        let mut count = self.count.subscribe();
        let _ = count.wait_for(|count| *count == 0).await;
    }

    /// Forget all pending writes and advance the epoch
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.tokens.lock().clear();
        self.count.send_replace(0);
    }
}
