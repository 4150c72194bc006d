//! WebSocket transport for the realtime gateway
//!
//! GET /ws?token=<JWT>  (or `Authorization: Bearer <JWT>`)
//!
//! Protocol (text frames, `{"event": ..., "data": ...}`):
//! - Server → Client: connected, subscribed, unsubscribed, filtersSet,
//!   newLog, filteredLog, serverShutdown
//! - Client → Server: subscribe, unsubscribe, setFilters

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use http::HeaderMap;
use serde::Deserialize;
use shared::error::{AppError, ErrorCode};

use super::auth::{Principal, extract_credential};
use super::{RealtimeGateway, Registration};
use crate::audit::RequestContext;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// GET /ws
pub async fn handle_gateway_ws(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    request: RequestContext,
    ws: WebSocketUpgrade,
) -> Response {
    let gateway = state.gateway.clone();
    let credential = extract_credential(query.token.as_deref(), &headers);

    let principal = match gateway.authenticate(credential.as_deref()).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::debug!(reason = %e, "Gateway handshake refused");
            state
                .record_access_denied(request, "realtime_gateway", &e.to_string())
                .await;
            return e.into_response();
        }
    };

    if gateway.is_closed() {
        return AppError::new(ErrorCode::GatewayClosed).into_response();
    }

    ws.on_upgrade(move |socket| gateway_session(socket, gateway, principal))
        .into_response()
}

async fn gateway_session(mut socket: WebSocket, gateway: Arc<RealtimeGateway>, principal: Principal) {
    // Registered only once the upgrade succeeded
    let registration = match gateway.connect(principal) {
        Ok(registration) => registration,
        Err(e) => {
            tracing::debug!(error = %e, "Gateway closed during upgrade");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let Registration {
        connection_id,
        principal_id,
        mut outbound,
    } = registration;
    let (mut sink, mut stream) = socket.split();

    tracing::info!(connection_id = %connection_id, principal_id = %principal_id, "Gateway WS connected");

    let period = gateway.config().ping_interval.max(Duration::from_secs(1));
    let mut ping_interval = tokio::time::interval(period);
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            biased;

            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Gateway dropped the connection (shutdown)
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        gateway.handle_text(connection_id, &text);
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "Gateway WS read error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }

    gateway.disconnect(connection_id);
    tracing::info!(connection_id = %connection_id, principal_id = %principal_id, "Gateway WS disconnected");
}
