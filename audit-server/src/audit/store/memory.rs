//! In-process audit store
//!
//! Keeps committed rows in memory and counts connection / transaction
//! lifecycle events. Failures can be injected per step, which is how the
//! requeue path is exercised without a database.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::AuditEntry;

use super::{AuditStore, AuditTransaction};
use crate::error::{AuditError, AuditResult};

/// Step at which an injected failure fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    Insert,
    Commit,
}

/// Lifecycle counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub acquired: usize,
    pub released: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Row count of every committed batch, in commit order
    pub committed_batches: Vec<usize>,
}

#[derive(Default)]
struct Inner {
    rows: Mutex<Vec<AuditEntry>>,
    stats: Mutex<StoreStats>,
    failures: Mutex<VecDeque<FailPoint>>,
}

impl Inner {
    fn should_fail(&self, point: FailPoint) -> bool {
        let mut failures = self.failures.lock();
        if failures.front() == Some(&point) {
            failures.pop_front();
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryAuditStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAuditStore")
            .field("rows", &self.inner.rows.lock().len())
            .finish()
    }
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction fail at `point`.
    ///
    /// Multiple calls queue up, one per subsequent transaction.
    pub fn fail_next(&self, point: FailPoint) {
        self.inner.failures.lock().push_back(point);
    }

    /// Committed rows in commit order
    pub fn rows(&self) -> Vec<AuditEntry> {
        self.inner.rows.lock().clone()
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.stats.lock().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn begin(&self) -> AuditResult<Box<dyn AuditTransaction>> {
        if self.inner.should_fail(FailPoint::Begin) {
            return Err(AuditError::Store("connection pool exhausted".into()));
        }
        self.inner.stats.lock().acquired += 1;
        Ok(Box::new(MemoryTransaction {
            store: self.inner.clone(),
            staged: Vec::new(),
            finished: false,
        }))
    }
}

struct MemoryTransaction {
    store: Arc<Inner>,
    staged: Vec<AuditEntry>,
    finished: bool,
}

#[async_trait]
impl AuditTransaction for MemoryTransaction {
    async fn insert_batch(&mut self, entries: &[AuditEntry]) -> AuditResult<()> {
        if self.store.should_fail(FailPoint::Insert) {
            return Err(AuditError::Store("insert failed".into()));
        }
        self.staged.extend_from_slice(entries);
        Ok(())
    }

    async fn commit(&mut self) -> AuditResult<()> {
        if self.finished {
            return Err(AuditError::Store("transaction already finished".into()));
        }
        self.finished = true;
        if self.store.should_fail(FailPoint::Commit) {
            return Err(AuditError::Store("commit failed".into()));
        }
        let staged = std::mem::take(&mut self.staged);
        let mut stats = self.store.stats.lock();
        stats.commits += 1;
        stats.committed_batches.push(staged.len());
        self.store.rows.lock().extend(staged);
        Ok(())
    }

    async fn rollback(&mut self) -> AuditResult<()> {
        self.finished = true;
        self.staged.clear();
        self.store.stats.lock().rollbacks += 1;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.store.stats.lock().released += 1;
    }
}
