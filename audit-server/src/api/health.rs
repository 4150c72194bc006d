//! Health check endpoint

use axum::Json;
use axum::extract::State;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.gateway.stats();
    let status = if state.gateway.is_closed() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(serde_json::json!({
        "status": status,
        "service": "audit-server",
        "version": env!("CARGO_PKG_VERSION"),
        "audit_queue": state.recorder.queued(),
        "realtime_connections": stats.active_connections,
    }))
}
