//! Serialized latest-wins executor
//!
//! One worker task, one pending slot. A submission made while the worker is
//! busy replaces whatever is waiting in the slot; the replaced task is dropped
//! without running. A task that has started always runs to completion.
//!
//! ```text
//!   submit(A)  ──► [A running]
//!   submit(B)  ──► [A running] slot=B
//!   submit(C)  ──► [A running] slot=C     (B dropped)
//!   A done     ──► [C running] slot=∅
//!   C done     ──► idle
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use relaypush_core::prelude::*;
use tokio::sync::{watch, Notify};

/// A unit of work accepted by [`LatestWinsExecutor::submit`]
pub type Task = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

#[derive(Default)]
struct Slot {
    /// Most recently submitted task that has not started yet
    pending: Option<Task>,
    /// True from the submission that woke the worker until it finds the slot empty
    busy: bool,
    closed: bool,
}

struct Shared {
    name: String,
    slot: Mutex<Slot>,
    wake: Notify,
    idle_tx: watch::Sender<bool>,
    dropped: AtomicU64,
    completed: AtomicU64,
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        // The slot is only touched in short non-panicking sections.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next task, or mark the worker idle when there is none
    fn next_task(&self) -> Option<Task> {
        let mut slot = self.lock_slot();
        let task = if slot.closed {
            slot.pending = None;
            None
        } else {
            slot.pending.take()
        };
        if task.is_none() {
            slot.busy = false;
            self.idle_tx.send_replace(true);
        }
        task
    }

    async fn run(&self, task: Task) {
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(executor = %self.name, "Queued task failed: {}", e);
            }
            Err(payload) => {
                error!(
                    executor = %self.name,
                    "Queued task panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Single-worker executor that keeps at most one task pending
///
/// Must be created inside a tokio runtime; the worker is spawned on creation.
/// Dropping the executor lets the running task finish, discards the pending
/// one and stops the worker.
pub struct LatestWinsExecutor {
    shared: Arc<Shared>,
    idle_rx: watch::Receiver<bool>,
}

impl LatestWinsExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        let (idle_tx, idle_rx) = watch::channel(true);
        let shared = Arc::new(Shared {
            name: name.into(),
            slot: Mutex::new(Slot::default()),
            wake: Notify::new(),
            idle_tx,
            dropped: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        });

        tokio::spawn(Self::worker(Arc::clone(&shared)));

        Self { shared, idle_rx }
    }

    /// Queue `task`, replacing any task that has not started yet
    ///
    /// Never blocks. There is no acknowledgement: a replaced task is dropped
    /// silently (it is only counted in [`dropped_count`](Self::dropped_count)).
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut slot = self.shared.lock_slot();
        if slot.closed {
            debug!(executor = %self.shared.name, "Executor closed, ignoring task");
            return;
        }

        if slot.pending.replace(Box::pin(task)).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(executor = %self.shared.name, "Dropped superseded pending task");
        }

        if !slot.busy {
            slot.busy = true;
            self.shared.idle_tx.send_replace(false);
            self.shared.wake.notify_one();
        }
    }

    /// Wait until nothing is running and nothing is pending
    pub async fn wait_idle(&self) {
        let mut idle_rx = self.idle_rx.clone();
        // Err only if the worker is gone, which means idle too.
        let _ = idle_rx.wait_for(|idle| *idle).await;
    }

    pub fn is_idle(&self) -> bool {
        *self.idle_rx.borrow()
    }

    /// Tasks discarded because a newer one replaced them
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Tasks that ran to completion, successfully or not
    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    async fn worker(shared: Arc<Shared>) {
        debug!(executor = %shared.name, "Executor worker started");
        loop {
            shared.wake.notified().await;

            while let Some(task) = shared.next_task() {
                shared.run(task).await;
            }

            if shared.lock_slot().closed {
                break;
            }
        }
        debug!(executor = %shared.name, "Executor worker stopped");
    }
}

impl Drop for LatestWinsExecutor {
    fn drop(&mut self) {
        let mut slot = self.shared.lock_slot();
        slot.closed = true;
        if slot.pending.take().is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        drop(slot);
        self.shared.wake.notify_one();
    }
}

impl std::fmt::Debug for LatestWinsExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestWinsExecutor")
            .field("name", &self.shared.name)
            .field("idle", &self.is_idle())
            .field("dropped", &self.dropped_count())
            .field("completed", &self.completed_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
