//! Shape queue — ordered persist-then-broadcast for admitted shape events.
//!
//! DESIGN
//! ======
//! Admitted events are pushed onto a FIFO and the drain worker is woken.
//! Exactly one worker task consumes the queue. It pops the oldest event,
//! awaits persistence, fans the record out to the room, and only then pops
//! the next one, so persistence order and broadcast order both equal
//! admission order.
//!
//! Waking is idempotent: `Notify` keeps at most one permit, so a burst of
//! enqueues, or a sweeper tick landing mid-drain, costs at most one extra
//! empty pass. Events pushed while a drain is running are picked up by that
//! same drain because it loops until the queue is empty.
//!
//! ERROR HANDLING
//! ==============
//! A failed or timed-out `create_shape` is logged and the event is dropped.
//! The drain moves on to the next event; nothing is retried or re-queued.
//!
//! The store enforces `persist_timeout` itself. The drain waits up to twice
//! that before giving up on an unresponsive store; only that case leaves the
//! write outcome unknown, and it is logged as such.
//!
//! A panic while persisting or broadcasting one event is caught at the event
//! boundary and logged like a failed persist. The `draining` flag is reset by
//! a guard, so an aborted drain never wedges the sweeper.
//!
//! TRADE-OFFS
//! ==========
//! Room membership is checked at admission only. A leave between admission
//! and drain does not retract the event.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::broadcast;
use crate::services::persistence::StoreError;
use crate::shape::Shape;
use crate::state::AppState;

/// A validated shape waiting to be persisted and broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub room_id: String,
    pub shape: Shape,
    pub author_user_id: String,
    /// Connection that submitted the event. Used for logging only.
    pub connection_id: Uuid,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("shape queue full ({capacity} pending)")]
    Full { capacity: usize },
}

#[derive(Clone)]
pub struct ShapeQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    pending: Mutex<VecDeque<PendingEvent>>,
    wake: Notify,
    draining: AtomicBool,
    capacity: usize,
}

impl ShapeQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                draining: AtomicBool::new(false),
                capacity,
            }),
        }
    }

    /// Append an event and wake the drain worker. Returns the new depth.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] when `capacity` events are already pending.
    pub fn enqueue(&self, event: PendingEvent) -> Result<usize, QueueError> {
        let depth = {
            let mut pending = self.lock();
            if pending.len() >= self.inner.capacity {
                return Err(QueueError::Full { capacity: self.inner.capacity });
            }
            pending.push_back(event);
            pending.len()
        };
        self.wake();
        Ok(depth)
    }

    /// Nudge the drain worker. Safe to call any number of times.
    pub fn wake(&self) {
        self.inner.wake.notify_one();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True while a drain pass is in progress.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    pub(crate) fn pop(&self) -> Option<PendingEvent> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingEvent>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// DRAIN WORKER
// =============================================================================

/// Spawn the single drain worker. Returns a handle for shutdown.
pub fn spawn_drain_worker(state: AppState) -> JoinHandle<()> {
    info!(
        capacity = state.queue.inner.capacity,
        persist_timeout_ms = u64::try_from(state.engine.persist_timeout.as_millis()).unwrap_or(u64::MAX),
        "queue: drain worker started"
    );
    tokio::spawn(async move {
        loop {
            state.queue.inner.wake.notified().await;
            drain(&state).await;
        }
    })
}

/// Process pending events until the queue is empty. Returns how many events
/// were taken off the queue, or 0 if another drain already owns it.
pub(crate) async fn drain(state: &AppState) -> usize {
    let queue = &state.queue;
    let Some(_guard) = DrainGuard::acquire(queue) else {
        return 0;
    };

    let mut processed = 0;
    while let Some(event) = queue.pop() {
        let outcome = AssertUnwindSafe(persist_and_broadcast(state, &event))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            error!(
                panic = panic_message(panic.as_ref()),
                room_id = %event.room_id,
                user_id = %event.author_user_id,
                connection_id = %event.connection_id,
                kind = %event.shape.kind(),
                "queue: shape persist panicked; dropping event"
            );
        }
        processed += 1;
    }
    processed
}

/// Owns the `draining` flag for one drain pass. Cleared on drop, including
/// when the drain future is cancelled.
struct DrainGuard<'a> {
    queue: &'a ShapeQueue,
}

impl<'a> DrainGuard<'a> {
    fn acquire(queue: &'a ShapeQueue) -> Option<Self> {
        if queue.inner.draining.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { queue })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.queue.inner.draining.store(false, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// How long the drain waits on the store before abandoning a write.
fn client_deadline(persist_timeout: Duration) -> Duration {
    persist_timeout.saturating_mul(2)
}

async fn persist_and_broadcast(state: &AppState, event: &PendingEvent) {
    let deadline = client_deadline(state.engine.persist_timeout);
    let persisted = tokio::time::timeout(
        deadline,
        state
            .store
            .create_shape(&event.room_id, &event.shape, &event.author_user_id),
    )
    .await
    .unwrap_or(Err(StoreError::Unresponsive(deadline)));

    let record = match persisted {
        Ok(record) => record,
        Err(e) => {
            error!(
                error = %e,
                room_id = %event.room_id,
                user_id = %event.author_user_id,
                connection_id = %event.connection_id,
                kind = %event.shape.kind(),
                "queue: shape persist failed; dropping event"
            );
            return;
        }
    };

    let delivered = broadcast::fan_out(&state.registry, &record).await;
    debug!(id = %record.id, room_id = %record.room_id, delivered, "queue: shape persisted and broadcast");
}

// =============================================================================
// LIVENESS SWEEPER
// =============================================================================

/// Spawn the backstop timer that wakes the drain worker if events are
/// waiting and nobody is draining them.
pub fn spawn_liveness_sweeper(queue: ShapeQueue, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            sweep(&queue);
        }
    })
}

/// One sweeper tick. Returns `true` if it woke the worker.
fn sweep(queue: &ShapeQueue) -> bool {
    if queue.is_draining() || queue.is_empty() {
        return false;
    }
    let pending = queue.len();
    if pending > queue.inner.capacity / 2 {
        warn!(pending, capacity = queue.inner.capacity, "queue: backlog above half capacity");
    }
    debug!(pending, "queue: sweeper waking idle drain worker");
    queue.wake();
    true
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
