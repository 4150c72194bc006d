//! Realtime gateway: handshake, rooms, bus wiring, shutdown

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use audit_server::gateway::{
    HandshakeError, JwtTokenVerifier, Principal, RealtimeGateway, Registration, TokenVerifier,
};
use audit_server::{BoxError, EventBus, GatewayConfig};
use serde_json::{Value, json};

const SECRET: &str = "gateway-test-secret";

struct Unreachable;

#[async_trait]
impl TokenVerifier for Unreachable {
    async fn verify(&self, _token: &str) -> Result<Option<Principal>, BoxError> {
        Err("identity provider timed out".into())
    }
}

fn jwt_gateway() -> (Arc<RealtimeGateway>, JwtTokenVerifier) {
    let verifier = JwtTokenVerifier::new(SECRET);
    let gateway = Arc::new(RealtimeGateway::new(
        Arc::new(verifier.clone()),
        GatewayConfig::default(),
    ));
    (gateway, verifier)
}

async fn connect(gateway: &RealtimeGateway, verifier: &JwtTokenVerifier, who: &str) -> Registration {
    let token = verifier.create_token(who).unwrap();
    let principal = gateway.authenticate(Some(&token)).await.unwrap();
    let mut reg = gateway.connect(principal).unwrap();
    drain(&mut reg);
    reg
}

fn drain(reg: &mut Registration) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = reg.outbound.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

#[tokio::test]
async fn handshake_rejections_carry_distinct_reasons() {
    let (gateway, _) = jwt_gateway();

    let missing = gateway.authenticate(None).await.unwrap_err();
    assert_eq!(missing, HandshakeError::MissingToken);
    assert_eq!(missing.to_string(), "Authentication token required");

    let forged = JwtTokenVerifier::new("someone-else")
        .create_token("mallory")
        .unwrap();
    let invalid = gateway.authenticate(Some(&forged)).await.unwrap_err();
    assert_eq!(invalid.to_string(), "Invalid authentication token");

    let failing = RealtimeGateway::new(Arc::new(Unreachable), GatewayConfig::default());
    let failed = failing.authenticate(Some("anything")).await.unwrap_err();
    assert_eq!(failed.to_string(), "Authentication failed");

    assert_eq!(gateway.stats().active_connections, 0);
    assert_eq!(failing.stats().active_connections, 0);
}

#[tokio::test]
async fn successful_handshake_acknowledges_identity() {
    let (gateway, verifier) = jwt_gateway();
    let token = verifier.create_token("user-7").unwrap();
    let principal = gateway.authenticate(Some(&token)).await.unwrap();
    let mut reg = gateway.connect(principal).unwrap();

    let frames = drain(&mut reg);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["event"], "connected");
    assert_eq!(frames[0]["data"]["principalId"], "user-7");
    assert_eq!(frames[0]["data"]["connectionId"], reg.connection_id.to_string());
    assert!(frames[0]["data"]["timestamp"].is_string());
    assert_eq!(gateway.stats().active_connections, 1);
}

#[tokio::test]
async fn subscribe_filters_unknown_streams() {
    let (gateway, verifier) = jwt_gateway();
    let mut reg = connect(&gateway, &verifier, "u1").await;

    let ack = gateway
        .handle_text(
            reg.connection_id,
            r#"{"event":"subscribe","data":["audit","system","bogus"]}"#,
        )
        .unwrap();
    let ack = serde_json::to_value(&ack).unwrap();
    assert_eq!(ack, json!({"event": "subscribed", "data": {"types": ["audit", "system"]}}));
    assert_eq!(drain(&mut reg), vec![ack]);

    let stats = gateway.stats();
    let joined: usize = stats.rooms.values().sum();
    assert_eq!(joined, 2);
}

#[tokio::test]
async fn set_filters_acknowledges_stored_predicate() {
    let (gateway, verifier) = jwt_gateway();
    let mut reg = connect(&gateway, &verifier, "u1").await;

    gateway.handle_text(
        reg.connection_id,
        r#"{"event":"setFilters","data":{"search":"alice","startDate":"2026-01-01T00:00:00Z"}}"#,
    );
    let frames = drain(&mut reg);
    assert_eq!(frames[0]["event"], "filtersSet");
    assert_eq!(frames[0]["data"]["filters"]["search"], "alice");
    assert!(frames[0]["data"]["filters"].get("eventType").is_none());
}

#[tokio::test]
async fn set_filters_accepts_date_only_bounds() {
    let (gateway, verifier) = jwt_gateway();
    let mut reg = connect(&gateway, &verifier, "u1").await;

    gateway.handle_text(
        reg.connection_id,
        r#"{"event":"setFilters","data":{"search":"alice","startDate":"2026-01-01","endDate":"soon"}}"#,
    );
    let frames = drain(&mut reg);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["event"], "filtersSet");
    assert_eq!(frames[0]["data"]["filters"]["startDate"], "2026-01-01");
    assert_eq!(frames[0]["data"]["filters"]["endDate"], "soon");

    let before = json!({"actorName": "Alice", "timestamp": "2025-12-31T23:00:00Z"});
    let after = json!({"actorName": "Alice", "timestamp": "2026-01-01T08:00:00Z"});
    assert_eq!(gateway.distribute("audit", &before), 0);
    assert_eq!(gateway.distribute("audit", &after), 1);
}

#[tokio::test]
async fn bus_publications_reach_stream_and_combined_rooms() {
    let (gateway, verifier) = jwt_gateway();
    let bus = EventBus::new();
    gateway.attach(&bus);

    let mut system = connect(&gateway, &verifier, "ops").await;
    let mut everything = connect(&gateway, &verifier, "lead").await;
    let mut audit_only = connect(&gateway, &verifier, "auditor").await;
    gateway.handle_text(system.connection_id, r#"{"event":"subscribe","data":["system"]}"#);
    gateway.handle_text(everything.connection_id, r#"{"event":"subscribe","data":["combined"]}"#);
    gateway.handle_text(audit_only.connection_id, r#"{"event":"subscribe","data":["audit"]}"#);
    for reg in [&mut system, &mut everything, &mut audit_only] {
        drain(reg);
    }

    let handlers = bus.publish("system", &json!({"message": "disk almost full", "level": "warn"}));
    assert_eq!(handlers, 1);

    let got = drain(&mut system);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0]["event"], "newLog");
    assert_eq!(got[0]["data"]["type"], "system");
    assert_eq!(got[0]["data"]["log"]["level"], "warn");

    assert_eq!(drain(&mut everything).len(), 1);
    assert!(drain(&mut audit_only).is_empty());
}

#[tokio::test]
async fn admin_emit_targets_principal_connections() {
    let (gateway, verifier) = jwt_gateway();
    let mut first = connect(&gateway, &verifier, "alice").await;
    let mut second = connect(&gateway, &verifier, "alice").await;
    let mut other = connect(&gateway, &verifier, "bob").await;

    let sent = gateway.emit_to_principals(&["alice".into()], "notice", &json!({"text": "hi"}));
    assert_eq!(sent, 2);
    assert_eq!(drain(&mut first)[0], json!({"event": "notice", "data": {"text": "hi"}}));
    assert_eq!(drain(&mut second).len(), 1);
    assert!(drain(&mut other).is_empty());

    assert_eq!(gateway.broadcast("maintenance", &json!(null)), 3);
}

#[tokio::test]
async fn shutdown_notifies_closes_and_empties_stats() {
    let (gateway, verifier) = jwt_gateway();
    let mut a = connect(&gateway, &verifier, "a").await;
    let mut b = connect(&gateway, &verifier, "b").await;
    gateway.handle_text(a.connection_id, r#"{"event":"subscribe","data":["audit","combined"]}"#);
    drain(&mut a);

    assert_eq!(gateway.shutdown(), 2);

    for reg in [&mut a, &mut b] {
        let notice: Value = serde_json::from_str(&reg.outbound.recv().await.unwrap()).unwrap();
        assert_eq!(notice["event"], "serverShutdown");
        assert!(notice["data"]["message"].is_string());
        assert!(reg.outbound.recv().await.is_none());
    }

    let stats = gateway.stats();
    assert_eq!(stats.active_connections, 0);
    assert!(stats.rooms.values().all(|members| *members == 0));
    assert!(gateway.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connections_racing_shutdown_are_never_left_registered() {
    let (gateway, _) = jwt_gateway();

    let mut joins = Vec::new();
    for i in 0..64 {
        let gateway = gateway.clone();
        joins.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            let reg = gateway.connect(Principal::new(format!("p{i}"))).ok()?;
            gateway.handle_text(reg.connection_id, r#"{"event":"subscribe","data":["audit"]}"#);
            Some(reg)
        }));
    }
    gateway.shutdown();

    for join in joins {
        let Some(mut reg) = join.await.unwrap() else {
            continue;
        };
        // Every registration that got through was closed by the shutdown
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while reg.outbound.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "connection {} outlived shutdown", reg.connection_id);
    }

    let stats = gateway.stats();
    assert_eq!(stats.active_connections, 0);
    assert!(stats.rooms.values().all(|members| *members == 0));
}
