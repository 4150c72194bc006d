//! Batch flusher
//!
//! Drains the whole pending queue into one transaction. On failure the batch
//! is rolled back and put back at the head of the queue; on success every
//! entry is published on the [`EventBus`] (strictly after commit).
//!
//! Also owns the deferred-flush slot: at most one delayed flush is pending at
//! any time, and every flush cancels it.
//!
//! Every pass holds a shared guard on `passes`. Overlapping passes never wait
//! on each other (the second one sees an empty queue), while [`BatchFlusher::drain`]
//! takes the guard exclusively and so runs only once no pass is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use shared::realtime::LogStream;
use shared::{AuditEntry, AuditLogView};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::queue::AuditQueue;
use super::store::AuditStore;
use crate::bus::EventBus;
use crate::error::AuditResult;

/// Result of one flush pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue was empty
    Empty,
    /// Batch committed and published
    Committed(usize),
    /// Batch failed and went back to the queue
    Requeued(usize),
}

struct DelayedFlush {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct BatchFlusher {
    queue: Arc<AuditQueue>,
    store: Arc<dyn AuditStore>,
    bus: EventBus,
    delayed: Mutex<Option<DelayedFlush>>,
    passes: RwLock<()>,
    next_generation: AtomicU64,
    backlog_warn: usize,
}

impl std::fmt::Debug for BatchFlusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchFlusher")
            .field("queued", &self.queue.len())
            .field("delayed_pending", &self.has_pending_delayed())
            .finish_non_exhaustive()
    }
}

impl BatchFlusher {
    pub fn new(
        queue: Arc<AuditQueue>,
        store: Arc<dyn AuditStore>,
        bus: EventBus,
        backlog_warn: usize,
    ) -> Self {
        Self {
            queue,
            store,
            bus,
            delayed: Mutex::new(None),
            passes: RwLock::new(()),
            next_generation: AtomicU64::new(0),
            backlog_warn,
        }
    }

    /// Flush everything queued right now
    pub async fn flush(&self) -> FlushOutcome {
        let _pass = self.passes.read().await;
        self.flush_pass().await
    }

    /// Final flush: waits for in-flight passes (a failed one requeues its
    /// batch first), then flushes the queue with no other pass running.
    pub async fn drain(&self) -> FlushOutcome {
        let _exclusive = self.passes.write().await;
        self.cancel_delayed();
        self.flush_pass().await
    }

    async fn flush_pass(&self) -> FlushOutcome {
        let batch = self.queue.take_all();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        self.cancel_delayed();

        let count = batch.len();
        match self.write_batch(&batch).await {
            Ok(()) => {
                tracing::debug!(entry_count = count, "Audit batch committed");
                self.publish(&batch);
                FlushOutcome::Committed(count)
            }
            Err(e) => {
                tracing::error!(entry_count = count, error = %e, "Audit batch write failed, requeueing");
                let queued = self.queue.requeue_front(batch);
                if queued > self.backlog_warn {
                    tracing::error!(
                        queued,
                        threshold = self.backlog_warn,
                        "Audit backlog above threshold, store still failing"
                    );
                }
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// One transaction: acquire, begin, insert, commit; rollback on any failure.
    ///
    /// The transaction (and its pooled connection) is dropped before returning.
    async fn write_batch(&self, batch: &[AuditEntry]) -> AuditResult<()> {
        let mut tx = self.store.begin().await?;

        let result = match tx.insert_batch(batch).await {
            Ok(()) => tx.commit().await,
            Err(e) => Err(e),
        };

        if result.is_err()
            && let Err(rollback_err) = tx.rollback().await
        {
            tracing::warn!(error = %rollback_err, "Audit batch rollback failed");
        }
        drop(tx);
        result
    }

    fn publish(&self, batch: &[AuditEntry]) {
        let timestamp = Utc::now();
        let topic = LogStream::Audit.as_str();
        for entry in batch {
            let view = AuditLogView::of(entry, timestamp);
            match serde_json::to_value(&view) {
                Ok(payload) => {
                    self.bus.publish(topic, &payload);
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize audit view"),
            }
        }
    }

    /// Arm the deferred flush unless one is already pending.
    ///
    /// Returns `true` if a new timer was armed.
    pub fn schedule_delayed(self: &Arc<Self>, delay: Duration) -> bool {
        let mut slot = self.delayed.lock();
        if slot.is_some() {
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let flusher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flusher.clear_delayed(generation);
            flusher.flush().await;
        });
        *slot = Some(DelayedFlush { generation, handle });
        true
    }

    pub fn has_pending_delayed(&self) -> bool {
        self.delayed.lock().is_some()
    }

    /// Abort the pending deferred flush, if any
    pub fn cancel_delayed(&self) {
        if let Some(pending) = self.delayed.lock().take() {
            pending.handle.abort();
        }
    }

    /// A fired timer releases its own slot, never a newer one
    fn clear_delayed(&self, generation: u64) {
        let mut slot = self.delayed.lock();
        if slot.as_ref().is_some_and(|p| p.generation == generation) {
            *slot = None;
        }
    }

    /// Safety-net loop: flush every `period` until cancelled
    pub async fn run_periodic(self: Arc<Self>, period: Duration, shutdown: CancellationToken) {
        tracing::info!(period_secs = period.as_secs(), "Audit periodic flush started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // skip immediate

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let FlushOutcome::Requeued(n) = self.flush().await {
                        tracing::warn!(entry_count = n, "Periodic audit flush failed");
                    }
                }
            }
        }
        tracing::info!("Audit periodic flush stopped");
    }
}
