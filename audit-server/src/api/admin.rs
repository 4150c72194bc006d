//! Administrative endpoints for the realtime gateway and the audit queue

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::error::{ApiResponse, AppError, AppResult};

use crate::audit::{FlushOutcome, RequestContext};
use crate::gateway::GatewayStats;
use crate::gateway::auth::{self, Principal, extract_credential};
use crate::state::AppState;

/// Verify the bearer token and attach the [`Principal`] to the request
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request_ctx: RequestContext,
    mut request: Request,
    next: Next,
) -> Response {
    let credential = extract_credential(None, request.headers());
    match auth::authenticate(state.verifier.as_ref(), credential.as_deref()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), reason = %e, "Admin request refused");
            state
                .record_access_denied(request_ctx, "admin_api", &e.to_string())
                .await;
            e.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct EmitRequest {
    pub principal_ids: Vec<String>,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct DeliveryReport {
    pub recipients: usize,
}

#[derive(Debug, Serialize)]
pub struct FlushReport {
    /// Queue length before the flush
    pub queued: usize,
    pub committed: usize,
    pub requeued: usize,
}

fn require_event_name(event: &str) -> AppResult<()> {
    if event.trim().is_empty() {
        return Err(AppError::validation("event name must not be empty"));
    }
    Ok(())
}

/// GET /api/realtime/stats
pub async fn realtime_stats(State(state): State<AppState>) -> Json<ApiResponse<GatewayStats>> {
    Json(ApiResponse::success(state.gateway.stats()))
}

/// POST /api/realtime/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<BroadcastRequest>,
) -> AppResult<Json<ApiResponse<DeliveryReport>>> {
    require_event_name(&req.event)?;
    let recipients = state.gateway.broadcast(&req.event, &req.payload);
    tracing::info!(principal_id = %principal.id, event = %req.event, recipients, "Admin broadcast");
    Ok(Json(ApiResponse::success(DeliveryReport { recipients })))
}

/// POST /api/realtime/emit
pub async fn emit_to_principals(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<EmitRequest>,
) -> AppResult<Json<ApiResponse<DeliveryReport>>> {
    require_event_name(&req.event)?;
    if req.principal_ids.is_empty() {
        return Err(AppError::validation("principal_ids must not be empty"));
    }
    let recipients = state
        .gateway
        .emit_to_principals(&req.principal_ids, &req.event, &req.payload);
    tracing::info!(
        principal_id = %principal.id,
        event = %req.event,
        targets = req.principal_ids.len(),
        recipients,
        "Admin emit"
    );
    Ok(Json(ApiResponse::success(DeliveryReport { recipients })))
}

/// POST /api/audit/flush
pub async fn force_flush(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Json<ApiResponse<FlushReport>> {
    let queued = state.recorder.queued();
    let report = match state.recorder.force_flush().await {
        FlushOutcome::Empty => FlushReport {
            queued,
            committed: 0,
            requeued: 0,
        },
        FlushOutcome::Committed(n) => FlushReport {
            queued,
            committed: n,
            requeued: 0,
        },
        FlushOutcome::Requeued(n) => FlushReport {
            queued,
            committed: 0,
            requeued: n,
        },
    };
    tracing::info!(principal_id = %principal.id, queued, "Forced audit flush");
    Json(ApiResponse::success(report))
}

