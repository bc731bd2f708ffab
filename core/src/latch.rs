use std::{
    fmt,
    sync::atomic::{AtomicI64, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::watch;

type Handler = Box<dyn FnOnce() + Send + 'static>;

/// A single-use countdown latch. Invokes a completion handler exactly once
/// when the counter goes from 1 to 0 and wakes up everyone waiting in
/// [`Latch::wait`].
///
/// Calling [`Latch::next`] more often than the initial count lets the counter
/// go negative but never invokes the handler a second time.
pub struct Latch {
    remaining: AtomicI64,
    handler: Mutex<Option<Handler>>,
    completed: watch::Sender<bool>,
}

impl Latch {
    /// Create a latch that completes after `remaining` calls to [`Latch::next`]
    pub fn new(remaining: i64) -> Self {
        let (completed, _) = watch::channel(remaining <= 0);
        Self {
            remaining: AtomicI64::new(remaining),
            handler: Mutex::new(None),
            completed,
        }
    }

    /// Create a latch with a completion handler
    pub fn with_callback<F>(remaining: i64, on_complete: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let latch = Self::new(remaining);
        latch.done(on_complete);
        latch
    }

    /// Replace the completion handler. The handler only runs if the counter
    /// reaches zero after this call.
    pub fn done<F>(&self, on_complete: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        *self.handler.lock() = Some(Box::new(on_complete));
        self
    }

    /// Decrement the counter
    pub fn next(&self) -> &Self {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.completed.send_replace(true);

            // don't hold the lock while the handler runs
            let handler = self.handler.lock().take();
            if let Some(handler) = handler {
                handler();
            }
        }
        self
    }

    /// The current value of the counter. May be negative.
    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Wait until the counter has reached zero
    pub async fn wait(&self) {
        let mut rx = self.completed.subscribe();
        let _ = rx.wait_for(|completed| *completed).await;
    }
}

impl fmt::Debug for Latch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latch")
            .field("remaining", &self.remaining())
            .field("has_handler", &self.handler.lock().is_some())
            .finish()
    }
}
