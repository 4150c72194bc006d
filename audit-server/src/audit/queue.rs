//! Pending-entry queue shared by the recorder and the flusher

use std::collections::VecDeque;

use parking_lot::Mutex;
use shared::AuditEntry;

/// FIFO of entries waiting for a flush.
///
/// Each method holds the lock for its whole body, so `take_all` is a single
/// atomic snapshot-and-clear: a concurrent flush observes an empty queue.
#[derive(Debug, Default)]
pub struct AuditQueue {
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl AuditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail, returning the new length
    pub fn push(&self, entry: AuditEntry) -> usize {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        entries.len()
    }

    /// Take everything, leaving a fresh empty queue
    pub fn take_all(&self) -> Vec<AuditEntry> {
        let mut entries = self.entries.lock();
        std::mem::take(&mut *entries).into()
    }

    /// Put a failed batch back ahead of anything queued since, keeping its order.
    ///
    /// Returns the new length.
    pub fn requeue_front(&self, batch: Vec<AuditEntry>) -> usize {
        let mut entries = self.entries.lock();
        let newer = std::mem::take(&mut *entries);
        let mut merged: VecDeque<AuditEntry> = batch.into();
        merged.extend(newer);
        *entries = merged;
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::audit::DataAction;

    fn entry(id: &str) -> AuditEntry {
        let mut e = AuditEntry::new(DataAction::Update);
        e.resource_id = Some(id.to_string());
        e
    }

    fn ids(entries: &[AuditEntry]) -> Vec<&str> {
        entries
            .iter()
            .map(|e| e.resource_id.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn take_all_clears() {
        let q = AuditQueue::new();
        assert_eq!(q.push(entry("a")), 1);
        assert_eq!(q.push(entry("b")), 2);

        let batch = q.take_all();
        assert_eq!(ids(&batch), vec!["a", "b"]);
        assert!(q.is_empty());
        assert!(q.take_all().is_empty());
    }

    #[test]
    fn requeue_goes_ahead_of_newer_entries() {
        let q = AuditQueue::new();
        q.push(entry("a"));
        q.push(entry("b"));
        let failed = q.take_all();

        q.push(entry("c"));
        assert_eq!(q.requeue_front(failed), 3);

        assert_eq!(ids(&q.take_all()), vec!["a", "b", "c"]);
    }
}
