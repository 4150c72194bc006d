//! Realtime log gateway
//!
//! Multicasts published logs to WebSocket connections.
//!
//! - Rooms: one per [`LogStream`] plus one `user:<principal>` room per principal
//! - Delivery: every published log goes to its stream room and to `combined`,
//!   then separately to each connection whose stored filter matches. Audit
//!   entries of the security category also reach the `security` room.
//!   `application` and `system` traffic comes from other producers
//!   publishing on the bus
//! - Outbound: each connection owns a bounded queue; a full queue drops the
//!   frame, and removing the connection closes it
//!
//! Registration and room membership changes hold the shared side of the
//! lifecycle lock and re-check `closed` under it; shutdown takes the
//! exclusive side, so nothing is registered once it has cleared the tables.
//!
//! The WebSocket transport lives in [`session`]; this module only tracks
//! state and produces frames, so it is usable without a socket.

pub mod auth;
pub mod filter;
pub mod session;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use shared::audit::AuditCategory;
use shared::error::{AppError, ErrorCode};
use shared::realtime::custom_frame;
use shared::{GatewayCommand, GatewayEvent, LogFilter, LogStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::config::GatewayConfig;
pub use auth::{HandshakeError, JwtTokenVerifier, Principal, TokenVerifier};

const SHUTDOWN_MESSAGE: &str = "Server is shutting down";

/// Room that addresses a single principal
pub fn principal_room(principal_id: &str) -> String {
    format!("user:{principal_id}")
}

/// Extra stream room for a published log, beside its own topic
fn mirror_room(topic: &str, log: &Value) -> Option<&'static str> {
    let category = log.get("category").and_then(Value::as_str)?;
    (topic == LogStream::Audit.as_str() && category == AuditCategory::Security.as_str())
        .then(|| LogStream::Security.as_str())
}

struct Connection {
    principal_id: String,
    rooms: HashSet<String>,
    filter: Option<LogFilter>,
    tx: mpsc::Sender<String>,
}

/// Handle returned by [`RealtimeGateway::connect`]
#[derive(Debug)]
pub struct Registration {
    pub connection_id: Uuid,
    pub principal_id: String,
    /// Outbound text frames; `None` once the gateway dropped the connection
    pub outbound: mpsc::Receiver<String>,
}

/// Statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub active_connections: usize,
    /// Member count of every stream room
    pub rooms: BTreeMap<String, usize>,
}

pub struct RealtimeGateway {
    verifier: Arc<dyn TokenVerifier>,
    config: GatewayConfig,
    connections: DashMap<Uuid, Connection>,
    rooms: DashMap<String, HashSet<Uuid>>,
    closed: AtomicBool,
    lifecycle: RwLock<()>,
}

impl std::fmt::Debug for RealtimeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeGateway")
            .field("connections", &self.connections.len())
            .field("rooms", &self.rooms.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RealtimeGateway {
    pub fn new(verifier: Arc<dyn TokenVerifier>, config: GatewayConfig) -> Self {
        Self {
            verifier,
            config,
            connections: DashMap::new(),
            rooms: DashMap::new(),
            closed: AtomicBool::new(false),
            lifecycle: RwLock::new(()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Route every source stream published on the bus into this gateway
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        for stream in LogStream::SOURCES {
            let gateway = Arc::clone(self);
            bus.subscribe(stream.as_str(), move |topic, log| {
                gateway.distribute(topic, log);
            });
        }
    }

    // ========== Handshake & lifecycle ==========

    /// Verify a handshake credential. No state is created on failure.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Principal, HandshakeError> {
        auth::authenticate(self.verifier.as_ref(), credential).await
    }

    /// Register an authenticated connection, join its principal room and
    /// queue the `connected` acknowledgement.
    pub fn connect(&self, principal: Principal) -> Result<Registration, AppError> {
        let _open = self.lifecycle.read();
        if self.is_closed() {
            return Err(AppError::new(ErrorCode::GatewayClosed));
        }

        let connection_id = Uuid::new_v4();
        let (tx, outbound) = mpsc::channel(self.config.outbound_capacity.max(1));
        let room = principal_room(&principal.id);

        let mut rooms = HashSet::new();
        rooms.insert(room.clone());
        self.connections.insert(
            connection_id,
            Connection {
                principal_id: principal.id.clone(),
                rooms,
                filter: None,
                tx,
            },
        );
        self.join_room(&room, connection_id);

        let ack = GatewayEvent::Connected {
            timestamp: Utc::now(),
            principal_id: principal.id.clone(),
            connection_id,
        };
        self.send_event(connection_id, &ack);

        tracing::info!(connection_id = %connection_id, principal_id = %principal.id, "Gateway connection registered");
        Ok(Registration {
            connection_id,
            principal_id: principal.id,
            outbound,
        })
    }

    /// Remove a connection and release its rooms. Idempotent.
    pub fn disconnect(&self, connection_id: Uuid) {
        let Some((_, conn)) = self.connections.remove(&connection_id) else {
            return;
        };
        for room in &conn.rooms {
            self.leave_room(room, connection_id);
        }
        tracing::info!(connection_id = %connection_id, principal_id = %conn.principal_id, "Gateway connection removed");
    }

    pub fn is_connected(&self, connection_id: Uuid) -> bool {
        self.connections.contains_key(&connection_id)
    }

    // ========== Client protocol ==========

    /// Parse and apply one client text frame; malformed frames are ignored
    pub fn handle_text(&self, connection_id: Uuid, text: &str) -> Option<GatewayEvent> {
        match serde_json::from_str::<GatewayCommand>(text) {
            Ok(cmd) => self.handle_command(connection_id, cmd),
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Ignoring malformed gateway frame");
                None
            }
        }
    }

    /// Apply a command and queue its acknowledgement.
    ///
    /// Returns the acknowledgement, or `None` if the connection is gone.
    pub fn handle_command(&self, connection_id: Uuid, cmd: GatewayCommand) -> Option<GatewayEvent> {
        let _open = self.lifecycle.read();
        if !self.is_connected(connection_id) {
            return None;
        }

        let ack = match cmd {
            GatewayCommand::Subscribe(requested) => {
                let accepted: Vec<String> = requested
                    .into_iter()
                    .filter(|name| LogStream::parse(name).is_some())
                    .collect();
                for room in &accepted {
                    if let Some(mut conn) = self.connections.get_mut(&connection_id) {
                        conn.rooms.insert(room.clone());
                    }
                    self.join_room(room, connection_id);
                }
                tracing::debug!(connection_id = %connection_id, rooms = ?accepted, "Subscribed");
                GatewayEvent::Subscribed { types: accepted }
            }
            GatewayCommand::Unsubscribe(requested) => {
                for room in &requested {
                    if let Some(mut conn) = self.connections.get_mut(&connection_id) {
                        conn.rooms.remove(room);
                    }
                    self.leave_room(room, connection_id);
                }
                GatewayEvent::Unsubscribed { types: requested }
            }
            GatewayCommand::SetFilters(filters) => {
                if let Some(mut conn) = self.connections.get_mut(&connection_id) {
                    conn.filter = Some(filters.clone());
                }
                GatewayEvent::FiltersSet { filters }
            }
        };

        self.send_event(connection_id, &ack);
        Some(ack)
    }

    // ========== Distribution ==========

    /// Fan one published log out to its stream room, the `combined` room and
    /// every connection whose filter matches.
    ///
    /// Returns the number of personalised `filteredLog` sends.
    pub fn distribute(&self, topic: &str, log: &Value) -> usize {
        let room_event = GatewayEvent::NewLog {
            log_type: topic.to_string(),
            log: log.clone(),
        };
        match room_event.to_frame() {
            Ok(frame) => {
                self.send_to_room(topic, &frame);
                if let Some(room) = mirror_room(topic, log) {
                    self.send_to_room(room, &frame);
                }
                self.send_to_room(LogStream::Combined.as_str(), &frame);
            }
            Err(e) => tracing::warn!(topic, error = %e, "Failed to serialize log frame"),
        }

        let targets: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|c| c.filter.is_some() && filter::matches(c.filter.as_ref(), log))
            .map(|c| *c.key())
            .collect();
        if targets.is_empty() {
            return 0;
        }

        let personal = GatewayEvent::FilteredLog {
            log_type: topic.to_string(),
            log: log.clone(),
        };
        let frame = match personal.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(topic, error = %e, "Failed to serialize filtered log frame");
                return 0;
            }
        };
        for id in &targets {
            self.send_frame(*id, frame.clone());
        }
        targets.len()
    }

    // ========== Administrative ==========

    /// Send a custom event to every connection of the given principals.
    ///
    /// Returns the number of connections addressed.
    pub fn emit_to_principals(&self, principal_ids: &[String], event: &str, payload: &Value) -> usize {
        let frame = match custom_frame(event, payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(event, error = %e, "Failed to serialize admin frame");
                return 0;
            }
        };
        principal_ids
            .iter()
            .map(|id| self.send_to_room(&principal_room(id), &frame))
            .sum()
    }

    /// Send a custom event to every connection
    pub fn broadcast(&self, event: &str, payload: &Value) -> usize {
        match custom_frame(event, payload) {
            Ok(frame) => self.send_to_all(&frame),
            Err(e) => {
                tracing::warn!(event, error = %e, "Failed to serialize broadcast frame");
                0
            }
        }
    }

    pub fn stats(&self) -> GatewayStats {
        let rooms = LogStream::ALL
            .iter()
            .map(|stream| {
                let members = self.rooms.get(stream.as_str()).map_or(0, |r| r.len());
                (stream.as_str().to_string(), members)
            })
            .collect();
        GatewayStats {
            active_connections: self.connections.len(),
            rooms,
        }
    }

    /// Notify every connection, then close them all and refuse new ones.
    ///
    /// Returns the number of connections closed.
    pub fn shutdown(&self) -> usize {
        let _closing = self.lifecycle.write();
        self.closed.store(true, Ordering::Release);

        let notice = GatewayEvent::ServerShutdown {
            message: SHUTDOWN_MESSAGE.to_string(),
            timestamp: Utc::now(),
        };
        match notice.to_frame() {
            Ok(frame) => {
                self.send_to_all(&frame);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize shutdown frame"),
        }

        // Dropping each sender ends its session once the queue drains
        let closed = self.connections.len();
        self.connections.clear();
        self.rooms.clear();
        tracing::info!(connections = closed, "Realtime gateway shut down");
        closed
    }

    // ========== Internals ==========

    fn join_room(&self, room: &str, connection_id: Uuid) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);
    }

    fn leave_room(&self, room: &str, connection_id: Uuid) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    fn send_event(&self, connection_id: Uuid, event: &GatewayEvent) {
        match event.to_frame() {
            Ok(frame) => {
                self.send_frame(connection_id, frame);
            }
            Err(e) => tracing::warn!(connection_id = %connection_id, error = %e, "Failed to serialize gateway event"),
        }
    }

    fn send_to_room(&self, room: &str, frame: &str) -> usize {
        let members: Vec<Uuid> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };
        members
            .into_iter()
            .filter(|id| self.send_frame(*id, frame.to_string()))
            .count()
    }

    fn send_to_all(&self, frame: &str) -> usize {
        let ids: Vec<Uuid> = self.connections.iter().map(|c| *c.key()).collect();
        ids.into_iter()
            .filter(|id| self.send_frame(*id, frame.to_string()))
            .count()
    }

    /// Fire-and-forget; `false` if the frame was not queued
    fn send_frame(&self, connection_id: Uuid, frame: String) -> bool {
        let Some(tx) = self.connections.get(&connection_id).map(|c| c.tx.clone()) else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(connection_id = %connection_id, "Outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
