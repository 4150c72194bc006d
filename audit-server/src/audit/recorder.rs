//! Audit recorder
//!
//! Accepts entries, side-logs them, queues them, and decides when to flush:
//!
//! - queue length reached `batch_size` → flush now, the caller awaits it
//! - otherwise → arm the coalesced delayed flush (no-op if already armed)
//! - independently → periodic safety net (see [`BatchFlusher::run_periodic`])
//!
//! `record` only fails on validation. Store failures stay inside the flush.

use std::sync::Arc;

use shared::audit::{
    AccessAction, AdministrativeAction, AuditAction, AuditCategory, AuthenticationAction,
    DataAction, SecurityAction, SystemAction,
};
use shared::{AuditEntry, Details, ResourceRef};
use tokio_util::sync::CancellationToken;

use super::context::{AuditContext, Outcome};
use super::flusher::{BatchFlusher, FlushOutcome};
use super::queue::AuditQueue;
use super::store::AuditStore;
use crate::bus::EventBus;
use crate::config::RecorderConfig;
use crate::error::{AuditError, AuditResult};

#[derive(Clone)]
pub struct AuditRecorder {
    queue: Arc<AuditQueue>,
    flusher: Arc<BatchFlusher>,
    config: RecorderConfig,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("queued", &self.queue.len())
            .field("config", &self.config)
            .finish()
    }
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, bus: EventBus, config: RecorderConfig) -> Self {
        let queue = Arc::new(AuditQueue::new());
        let flusher = Arc::new(BatchFlusher::new(
            queue.clone(),
            store,
            bus,
            config.backlog_warn,
        ));
        Self {
            queue,
            flusher,
            config,
        }
    }

    /// Validate, side-log, enqueue, then schedule a flush.
    pub async fn record(&self, entry: AuditEntry) -> AuditResult<()> {
        if !entry.category().allows_actor() && entry.carries_actor() {
            return Err(AuditError::ActorNotAllowed);
        }

        if let Err(e) = side_log(&entry) {
            tracing::error!(error = %e, action = %entry.action, "Audit side log failed");
        }

        let queued = self.queue.push(entry);
        self.schedule_flush(queued).await;
        Ok(())
    }

    /// Entry point for untyped callers: `category` and `action` are checked
    /// against the closed per-category sets.
    pub async fn record_raw(
        &self,
        category: &str,
        action: &str,
        ctx: &AuditContext,
        resource: Option<ResourceRef>,
        details: Details,
        outcome: Outcome,
    ) -> AuditResult<()> {
        let category_value = AuditCategory::parse(category)
            .ok_or_else(|| AuditError::UnknownCategory(category.to_string()))?;
        let action_value =
            AuditAction::parse(category_value, action).ok_or_else(|| AuditError::InvalidAction {
                category: category.to_string(),
                action: action.to_string(),
            })?;

        let entry = build_entry(action_value, Some(ctx), resource, details, outcome);
        self.record(entry).await
    }

    pub async fn authentication(
        &self,
        action: AuthenticationAction,
        ctx: &AuditContext,
        details: Details,
        outcome: Outcome,
    ) -> AuditResult<()> {
        self.record(build_entry(action.into(), Some(ctx), None, details, outcome))
            .await
    }

    pub async fn access(
        &self,
        action: AccessAction,
        ctx: &AuditContext,
        resource: Option<ResourceRef>,
        details: Details,
        outcome: Outcome,
    ) -> AuditResult<()> {
        self.record(build_entry(action.into(), Some(ctx), resource, details, outcome))
            .await
    }

    pub async fn administrative(
        &self,
        action: AdministrativeAction,
        ctx: &AuditContext,
        resource: Option<ResourceRef>,
        details: Details,
        outcome: Outcome,
    ) -> AuditResult<()> {
        self.record(build_entry(action.into(), Some(ctx), resource, details, outcome))
            .await
    }

    pub async fn security(
        &self,
        action: SecurityAction,
        ctx: &AuditContext,
        resource: Option<ResourceRef>,
        details: Details,
        outcome: Outcome,
    ) -> AuditResult<()> {
        self.record(build_entry(action.into(), Some(ctx), resource, details, outcome))
            .await
    }

    pub async fn data(
        &self,
        action: DataAction,
        ctx: &AuditContext,
        resource: Option<ResourceRef>,
        details: Details,
        outcome: Outcome,
    ) -> AuditResult<()> {
        self.record(build_entry(action.into(), Some(ctx), resource, details, outcome))
            .await
    }

    /// System entries take no actor or request context
    pub async fn system(
        &self,
        action: SystemAction,
        details: Details,
        outcome: Outcome,
    ) -> AuditResult<()> {
        self.record(build_entry(action.into(), None, None, details, outcome))
            .await
    }

    async fn schedule_flush(&self, queued: usize) {
        if queued >= self.config.batch_size {
            self.flusher.flush().await;
        } else {
            self.flusher.schedule_delayed(self.config.flush_delay);
        }
    }

    /// Flush now regardless of thresholds
    pub async fn force_flush(&self) -> FlushOutcome {
        self.flusher.flush().await
    }

    /// Run the periodic safety-net flush until `shutdown` fires
    pub async fn run_periodic_flush(&self, shutdown: CancellationToken) {
        self.flusher
            .clone()
            .run_periodic(self.config.flush_interval, shutdown)
            .await;
    }

    /// Cancel the pending timer, wait out any running flush, then flush
    /// whatever is queued
    pub async fn shutdown(&self) -> FlushOutcome {
        let outcome = self.flusher.drain().await;
        match outcome {
            FlushOutcome::Requeued(n) => {
                tracing::error!(entry_count = n, "Final audit flush failed, entries not persisted")
            }
            FlushOutcome::Committed(n) => tracing::info!(entry_count = n, "Final audit flush committed"),
            FlushOutcome::Empty => {}
        }
        outcome
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending_delayed_flush(&self) -> bool {
        self.flusher.has_pending_delayed()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }
}

fn build_entry(
    action: AuditAction,
    ctx: Option<&AuditContext>,
    resource: Option<ResourceRef>,
    details: Details,
    outcome: Outcome,
) -> AuditEntry {
    let mut entry = AuditEntry::new(action)
        .with_resource(resource)
        .with_details(details)
        .with_outcome(outcome.success, outcome.error_message);

    if let Some(ctx) = ctx {
        entry.actor_id = ctx.actor_id.clone();
        entry.actor_name = ctx.actor_name.clone();
        entry.session_id = ctx.session_id.clone();
        if let Some(req) = &ctx.request {
            entry.ip_address = req.client_ip();
            entry.user_agent = req.user_agent();
        }
    }
    entry
}

/// Operational log line for the entry (target `audit`)
fn side_log(entry: &AuditEntry) -> serde_json::Result<()> {
    let details = serde_json::to_string(&entry.details)?;
    if entry.success {
        tracing::info!(
            target: "audit",
            category = %entry.category(),
            action = entry.action.as_str(),
            actor_id = ?entry.actor_id,
            resource_type = ?entry.resource_type,
            resource_id = ?entry.resource_id,
            ip = ?entry.ip_address,
            details = %details,
            "AUDIT"
        );
    } else {
        tracing::warn!(
            target: "audit",
            category = %entry.category(),
            action = entry.action.as_str(),
            actor_id = ?entry.actor_id,
            resource_type = ?entry.resource_type,
            resource_id = ?entry.resource_id,
            ip = ?entry.ip_address,
            error = ?entry.error_message,
            details = %details,
            "AUDIT"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::context::RequestContext;
    use crate::audit::store::{FailPoint, MemoryAuditStore};
    use http::{HeaderMap, HeaderValue};
    use std::time::Duration;

    fn recorder(store: &MemoryAuditStore) -> AuditRecorder {
        AuditRecorder::new(
            Arc::new(store.clone()),
            EventBus::new(),
            RecorderConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn every_valid_action_enqueues_exactly_one() {
        let store = MemoryAuditStore::new();
        for action in AuditAction::all() {
            let rec = AuditRecorder::new(
                Arc::new(store.clone()),
                EventBus::new(),
                RecorderConfig {
                    batch_size: usize::MAX,
                    ..Default::default()
                },
            );
            let ctx = if action.category() == AuditCategory::System {
                AuditContext::anonymous()
            } else {
                AuditContext::actor("u1", "alice")
            };
            rec.record(build_entry(action, Some(&ctx), None, Details::new(), Outcome::default()))
                .await
                .unwrap();
            assert_eq!(rec.queued(), 1, "{action}");
            rec.flusher.cancel_delayed();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn raw_record_validates_category_and_action() {
        let store = MemoryAuditStore::new();
        let rec = recorder(&store);
        let ctx = AuditContext::actor("u1", "alice");

        let err = rec
            .record_raw("authentication", "delete", &ctx, None, Details::new(), Outcome::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidAction { .. }));

        let err = rec
            .record_raw("billing", "login", &ctx, None, Details::new(), Outcome::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::UnknownCategory(_)));

        rec.record_raw("authentication", "login", &ctx, None, Details::new(), Outcome::default())
            .await
            .unwrap();
        assert_eq!(rec.queued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn system_entry_with_actor_is_rejected() {
        let store = MemoryAuditStore::new();
        let rec = recorder(&store);
        let ctx = AuditContext::actor("u1", "alice");

        let err = rec
            .record_raw("system", "startup", &ctx, None, Details::new(), Outcome::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::ActorNotAllowed));
        assert_eq!(rec.queued(), 0);

        rec.system(SystemAction::Startup, Details::new(), Outcome::default())
            .await
            .unwrap();
        assert_eq!(rec.queued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_size_triggers_single_synchronous_flush() {
        let store = MemoryAuditStore::new();
        let rec = recorder(&store);
        let ctx = AuditContext::actor("u1", "alice");

        for _ in 0..10 {
            rec.data(DataAction::Update, &ctx, None, Details::new(), Outcome::default())
                .await
                .unwrap();
        }

        assert_eq!(store.stats().committed_batches, vec![10]);
        assert_eq!(rec.queued(), 0);
        assert!(!rec.has_pending_delayed_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn sparse_entries_share_one_delayed_flush() {
        let store = MemoryAuditStore::new();
        let rec = recorder(&store);
        let ctx = AuditContext::actor("u1", "alice");

        for _ in 0..4 {
            rec.access(AccessAction::View, &ctx, None, Details::new(), Outcome::default())
                .await
                .unwrap();
            assert!(rec.has_pending_delayed_flush());
        }
        assert!(store.stats().commits == 0);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.stats().committed_batches, vec![4]);
        assert!(!rec.has_pending_delayed_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn record_succeeds_even_when_flush_fails() {
        let store = MemoryAuditStore::new();
        store.fail_next(FailPoint::Insert);
        let rec = AuditRecorder::new(
            Arc::new(store.clone()),
            EventBus::new(),
            RecorderConfig {
                batch_size: 2,
                ..Default::default()
            },
        );
        let ctx = AuditContext::actor("u1", "alice");

        for _ in 0..2 {
            rec.security(SecurityAction::PasswordChanged, &ctx, None, Details::new(), Outcome::default())
                .await
                .unwrap();
        }
        assert_eq!(rec.queued(), 2);
        assert_eq!(store.stats().rollbacks, 1);

        assert_eq!(rec.force_flush().await, FlushOutcome::Committed(2));
    }

    #[tokio::test(start_paused = true)]
    async fn request_metadata_is_derived() {
        let store = MemoryAuditStore::new();
        let rec = recorder(&store);

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.100, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        headers.insert("user-agent", HeaderValue::from_static("dashboard/1.0"));
        let ctx = AuditContext::actor("u7", "bob")
            .with_request(RequestContext::new(headers, None))
            .with_session("s-1");

        rec.authentication(AuthenticationAction::Login, &ctx, Details::new(), Outcome::default())
            .await
            .unwrap();
        rec.shutdown().await;

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ip_address.as_deref(), Some("192.168.1.100"));
        assert_eq!(rows[0].user_agent.as_deref(), Some("dashboard/1.0"));
        assert_eq!(rows[0].session_id.as_deref(), Some("s-1"));
        assert_eq!(rows[0].actor_name.as_deref(), Some("bob"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_request_context_leaves_ip_unset() {
        let store = MemoryAuditStore::new();
        let rec = recorder(&store);
        rec.administrative(
            AdministrativeAction::RoleAssigned,
            &AuditContext::actor("u1", "alice"),
            Some(ResourceRef::new("role", "admin")),
            Details::new(),
            Outcome::failure("quota exceeded"),
        )
        .await
        .unwrap();
        rec.shutdown().await;

        let rows = store.rows();
        assert_eq!(rows[0].ip_address, None);
        assert!(!rows[0].success);
        assert_eq!(rows[0].error_message.as_deref(), Some("quota exceeded"));
        assert_eq!(rows[0].resource_id.as_deref(), Some("admin"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_timer_and_flushes() {
        let store = MemoryAuditStore::new();
        let rec = recorder(&store);
        rec.system(SystemAction::Shutdown, Details::new(), Outcome::default())
            .await
            .unwrap();
        assert!(rec.has_pending_delayed_flush());

        assert_eq!(rec.shutdown().await, FlushOutcome::Committed(1));
        assert!(!rec.has_pending_delayed_flush());
    }
}
