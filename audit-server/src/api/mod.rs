//! HTTP routes for audit-server

pub mod admin;
pub mod health;

use axum::routing::{get, post};
use axum::{Router, middleware};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::gateway::session::handle_gateway_ws;
use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Admin operations (bearer authenticated)
    let admin = Router::new()
        .route("/api/realtime/stats", get(admin::realtime_stats))
        .route("/api/realtime/broadcast", post(admin::broadcast))
        .route("/api/realtime/emit", post(admin::emit_to_principals))
        .route("/api/audit/flush", post(admin::force_flush))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ws", get(handle_gateway_ws))
        .merge(admin)
        // Dashboards are served from other origins
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditStore;
    use crate::config::{GatewayConfig, RecorderConfig};
    use crate::gateway::JwtTokenVerifier;
    use axum::body::Body;
    use http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn state(store: &MemoryAuditStore) -> AppState {
        AppState::new(
            Arc::new(store.clone()),
            Arc::new(JwtTokenVerifier::new(SECRET)),
            RecorderConfig {
                flush_delay: Duration::from_secs(3600),
                ..Default::default()
            },
            GatewayConfig::default(),
        )
    }

    fn bearer() -> String {
        let token = JwtTokenVerifier::new(SECRET).create_token("admin-1").unwrap();
        format!("Bearer {token}")
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_public() {
        let store = MemoryAuditStore::new();
        let app = create_router(state(&store));
        let req = Request::get("/health").body(Body::empty()).unwrap();

        let (status, body) = call(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "audit-server");
    }

    #[tokio::test]
    async fn admin_routes_refuse_and_record_missing_token() {
        let store = MemoryAuditStore::new();
        let state = state(&store);
        let app = create_router(state.clone());
        let req = Request::get("/api/realtime/stats")
            .header("x-real-ip", "10.1.1.1")
            .body(Body::empty())
            .unwrap();

        let (status, body) = call(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Authentication token required");

        state.recorder.force_flush().await;
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action.as_str(), "access_denied");
        assert_eq!(rows[0].ip_address.as_deref(), Some("10.1.1.1"));
        assert!(!rows[0].success);
    }

    #[tokio::test]
    async fn stats_with_valid_token() {
        let store = MemoryAuditStore::new();
        let app = create_router(state(&store));
        let req = Request::get("/api/realtime/stats")
            .header(header::AUTHORIZATION, bearer())
            .body(Body::empty())
            .unwrap();

        let (status, body) = call(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["activeConnections"], 0);
        assert_eq!(body["data"]["rooms"]["combined"], 0);
    }

    #[tokio::test]
    async fn broadcast_rejects_empty_event_name() {
        let store = MemoryAuditStore::new();
        let app = create_router(state(&store));
        let req = Request::post("/api/realtime/broadcast")
            .header(header::AUTHORIZATION, bearer())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"event": " ", "payload": {}}).to_string()))
            .unwrap();

        let (status, _) = call(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forced_flush_reports_queue_length() {
        let store = MemoryAuditStore::new();
        let state = state(&store);
        state
            .record_access_denied(Default::default(), "admin_api", "test")
            .await;
        let app = create_router(state);
        let req = Request::post("/api/audit/flush")
            .header(header::AUTHORIZATION, bearer())
            .body(Body::empty())
            .unwrap();

        let (status, body) = call(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["queued"], 1);
        assert_eq!(body["data"]["committed"], 1);
        assert_eq!(store.rows().len(), 1);
    }
}
