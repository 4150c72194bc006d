//! Application state (composition root)
//!
//! Wires one store, one bus, one recorder and one gateway together. Nothing
//! here is global; tests build as many independent instances as they need.

use std::sync::Arc;

use shared::audit::AccessAction;
use shared::{Details, ResourceRef};

use crate::audit::{AuditContext, AuditRecorder, AuditStore, Outcome, PgAuditStore, RequestContext};
use crate::bus::EventBus;
use crate::config::{Config, GatewayConfig, RecorderConfig};
use crate::error::BoxError;
use crate::gateway::{JwtTokenVerifier, RealtimeGateway, TokenVerifier};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub recorder: AuditRecorder,
    pub gateway: Arc<RealtimeGateway>,
    /// Verifies both gateway handshakes and admin bearer tokens
    pub verifier: Arc<dyn TokenVerifier>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("recorder", &self.recorder)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble the pipeline: recorder → store → bus → gateway
    pub fn new(
        store: Arc<dyn AuditStore>,
        verifier: Arc<dyn TokenVerifier>,
        recorder_config: RecorderConfig,
        gateway_config: GatewayConfig,
    ) -> Self {
        let bus = EventBus::new();
        let recorder = AuditRecorder::new(store, bus.clone(), recorder_config);
        let gateway = Arc::new(RealtimeGateway::new(verifier.clone(), gateway_config));
        gateway.attach(&bus);

        Self {
            bus,
            recorder,
            gateway,
            verifier,
        }
    }

    /// Production wiring: PostgreSQL store + HS256 verifier
    pub async fn from_config(config: &Config) -> Result<Self, BoxError> {
        let store = PgAuditStore::connect(
            &config.database_url,
            config.db_max_connections,
            config.db_write_timeout,
        )
        .await?;
        tracing::info!("Audit store connected, migrations applied");

        Ok(Self::new(
            Arc::new(store),
            Arc::new(JwtTokenVerifier::new(&config.jwt_secret)),
            config.recorder.clone(),
            config.gateway.clone(),
        ))
    }

    /// Record a refused authentication attempt against `resource`
    pub async fn record_access_denied(&self, request: RequestContext, resource: &str, reason: &str) {
        let ctx = AuditContext::anonymous().with_request(request);
        if let Err(e) = self
            .recorder
            .access(
                AccessAction::AccessDenied,
                &ctx,
                Some(ResourceRef::kind(resource)),
                Details::new(),
                Outcome::failure(reason),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to record access denial");
        }
    }
}
