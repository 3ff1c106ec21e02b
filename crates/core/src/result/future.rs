use super::CompositeResultSet;
use crate::error::Error;
use crate::transport::RawResultSet;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

enum Slot<R> {
    Pending,
    Ready(Result<R, Error>),
    Consumed,
}

/// Shared completion cell: one producer task, many waiters, callbacks run
/// exactly once at completion. Cancellation is sticky — once cancelled,
/// every later `get` reports it.
struct ResultCell<R> {
    slot: Mutex<Slot<R>>,
    notify: Notify,
    done: AtomicBool,
    callbacks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl<R> ResultCell<R> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::Pending),
            notify: Notify::new(),
            done: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    fn complete(&self, result: Result<R, Error>) {
        *self.slot.lock() = Slot::Ready(result);
        self.done.store(true, Ordering::Release);
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            callback();
        }
        self.notify.notify_waiters();
    }

    fn on_complete(&self, callback: Box<dyn FnOnce() + Send>) {
        if self.done.load(Ordering::Acquire) {
            callback();
            return;
        }
        let mut callbacks = self.callbacks.lock();
        // Re-check under the lock so a racing complete() cannot strand us.
        if self.done.load(Ordering::Acquire) {
            drop(callbacks);
            callback();
        } else {
            callbacks.push(callback);
        }
    }

    async fn get(&self, cancel: &CancellationToken) -> Result<R, Error> {
        loop {
            let notified = self.notify.notified();
            {
                let mut slot = self.slot.lock();
                match std::mem::replace(&mut *slot, Slot::Pending) {
                    Slot::Ready(result) => {
                        *slot = Slot::Consumed;
                        return result;
                    }
                    Slot::Consumed => {
                        *slot = Slot::Consumed;
                        return Err(if cancel.is_cancelled() {
                            Error::Cancelled
                        } else {
                            Error::ResultConsumed
                        });
                    }
                    Slot::Pending => {}
                }
            }
            notified.await;
        }
    }
}

macro_rules! spawned_future {
    ($(#[$doc:meta])* $name:ident, $output:ty) => {
        $(#[$doc])*
        pub struct $name {
            cell: Arc<ResultCell<$output>>,
            cancel: CancellationToken,
        }

        impl $name {
            /// Spawns `work` on the runtime; the returned handle observes it.
            pub(crate) fn spawn<F, Fut>(work: F) -> Self
            where
                F: FnOnce(CancellationToken) -> Fut + Send + 'static,
                Fut: Future<Output = Result<$output, Error>> + Send + 'static,
            {
                let cell = ResultCell::new();
                let cancel = CancellationToken::new();
                let task_cell = cell.clone();
                let task_cancel = cancel.clone();
                tokio::spawn(async move {
                    let result = work(task_cancel).await;
                    task_cell.complete(result);
                });
                Self { cell, cancel }
            }

            /// Cancels every outstanding child. Already-submitted statements
            /// may still complete on the transport side; there is no remote
            /// cancel.
            pub fn cancel(&self) {
                self.cancel.cancel();
            }

            pub fn is_cancelled(&self) -> bool {
                self.cancel.is_cancelled()
            }

            /// Whether the underlying execution has finished, one way or the
            /// other.
            pub fn is_done(&self) -> bool {
                self.cell.done.load(Ordering::Acquire)
            }

            /// Waits for completion. The result can be taken once; later
            /// calls report cancellation (sticky) or consumption.
            pub async fn get(&self) -> Result<$output, Error> {
                self.cell.get(&self.cancel).await
            }

            /// Runs `callback` once, at completion — immediately if already
            /// complete.
            pub fn on_complete(&self, callback: impl FnOnce() + Send + 'static) {
                self.cell.on_complete(Box::new(callback));
            }
        }
    };
}

spawned_future!(
    /// A spawned composite execution resolving with every statement's
    /// result, collated in input order.
    CompositeResultFuture,
    CompositeResultSet
);

spawned_future!(
    /// A spawned wave execution resolving with only the last completed
    /// statement's result (or the first error).
    LastResultParallelFuture,
    Option<Box<dyn RawResultSet>>
);
