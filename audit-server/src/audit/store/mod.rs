//! Transactional store contract consumed by the flusher
//!
//! ```text
//! begin()  ── acquires one pooled connection + BEGIN
//!   insert_batch(entries)  ── one multi-row INSERT
//!   commit() | rollback()
//! drop     ── connection goes back to the pool
//! ```

mod memory;
mod postgres;

pub use memory::{FailPoint, MemoryAuditStore, StoreStats};
pub use postgres::PgAuditStore;

use async_trait::async_trait;
use shared::AuditEntry;

use crate::error::AuditResult;

/// Column order of every inserted row
pub const AUDIT_COLUMNS: [&str; 12] = [
    "category",
    "action",
    "actor_id",
    "actor_name",
    "ip_address",
    "user_agent",
    "session_id",
    "resource_type",
    "resource_id",
    "details",
    "success",
    "error_message",
];

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Acquire a connection and open a transaction on it
    async fn begin(&self) -> AuditResult<Box<dyn AuditTransaction>>;
}

/// An open transaction holding a pooled connection until dropped
#[async_trait]
pub trait AuditTransaction: Send {
    /// Insert one row per entry, in order
    async fn insert_batch(&mut self, entries: &[AuditEntry]) -> AuditResult<()>;

    async fn commit(&mut self) -> AuditResult<()>;

    async fn rollback(&mut self) -> AuditResult<()>;
}
