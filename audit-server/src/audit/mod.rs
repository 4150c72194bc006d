//! Audit pipeline: batching recorder + transactional flusher
//!
//! ```text
//! caller
//!   └─ AuditRecorder::record()
//!        ├─ side log (tracing, target "audit")
//!        ├─ AuditQueue (FIFO)
//!        └─ schedule: batch_size → flush now
//!                     else       → one delayed flush (coalesced)
//!                     periodic   → safety net
//!
//! BatchFlusher::flush()
//!   take_all ─▶ begin ─▶ INSERT … VALUES (…),(…) ─▶ commit ─▶ EventBus("audit")
//!                 └── any failure ─▶ rollback ─▶ requeue_front
//! ```

pub mod context;
pub mod flusher;
pub mod queue;
pub mod recorder;
pub mod store;

pub use context::{AuditContext, Outcome, RequestContext};
pub use flusher::{BatchFlusher, FlushOutcome};
pub use queue::AuditQueue;
pub use recorder::AuditRecorder;
pub use store::{AuditStore, AuditTransaction, FailPoint, MemoryAuditStore, PgAuditStore};
