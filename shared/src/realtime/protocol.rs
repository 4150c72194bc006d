//! Realtime log protocol
//!
//! Server → Client: [`GatewayEvent`] (acks + pushes)
//! Client → Server: [`GatewayCommand`] (room and filter control)
//!
//! Every frame is a JSON text message shaped `{"event": <name>, "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LogFilter;

/// Rooms a connection may join with `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Audit,
    Application,
    System,
    Security,
    /// Aggregate room that receives every stream
    Combined,
}

impl LogStream {
    pub const ALL: [LogStream; 5] = [
        Self::Audit,
        Self::Application,
        Self::System,
        Self::Security,
        Self::Combined,
    ];

    /// Streams that producers publish on (everything but the aggregate)
    pub const SOURCES: [LogStream; 4] = [Self::Audit, Self::Application, Self::System, Self::Security];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audit => "audit",
            Self::Application => "application",
            Self::System => "system",
            Self::Security => "security",
            Self::Combined => "combined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client → Server command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum GatewayCommand {
    /// Join one room per known stream name; unknown names are dropped
    Subscribe(Vec<String>),
    /// Leave the named rooms
    Unsubscribe(Vec<String>),
    /// Replace the connection's personal filter
    SetFilters(LogFilter),
}

/// Server → Client event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Handshake accepted
    #[serde(rename_all = "camelCase")]
    Connected {
        timestamp: DateTime<Utc>,
        principal_id: String,
        connection_id: Uuid,
    },

    /// Accepted subset of a subscribe request
    Subscribed { types: Vec<String> },

    /// Echo of an unsubscribe request
    Unsubscribed { types: Vec<String> },

    /// The filter now stored on the connection
    FiltersSet { filters: LogFilter },

    /// Room broadcast
    NewLog {
        #[serde(rename = "type")]
        log_type: String,
        log: serde_json::Value,
    },

    /// Personalised push for a connection whose filter matched
    FilteredLog {
        #[serde(rename = "type")]
        log_type: String,
        log: serde_json::Value,
    },

    ServerShutdown {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl GatewayEvent {
    /// Serialized text frame
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frame for an arbitrary administrative event name
pub fn custom_frame(event: &str, data: &serde_json::Value) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Frame<'a> {
        event: &'a str,
        data: &'a serde_json::Value,
    }
    serde_json::to_string(&Frame { event, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_wire_shape() {
        let cmd: GatewayCommand =
            serde_json::from_value(json!({"event": "subscribe", "data": ["audit", "system"]}))
                .unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::Subscribe(vec!["audit".into(), "system".into()])
        );

        let cmd: GatewayCommand = serde_json::from_value(
            json!({"event": "setFilters", "data": {"eventType": "login", "search": "ali"}}),
        )
        .unwrap();
        match cmd {
            GatewayCommand::SetFilters(f) => {
                assert_eq!(f.event_type.as_deref(), Some("login"));
                assert_eq!(f.search.as_deref(), Some("ali"));
            }
            other => panic!("Expected SetFilters, got {other:?}"),
        }
    }

    #[test]
    fn connected_uses_camel_case_fields() {
        let id = Uuid::new_v4();
        let event = GatewayEvent::Connected {
            timestamp: Utc::now(),
            principal_id: "u-1".into(),
            connection_id: id,
        };
        let v: serde_json::Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(v["event"], "connected");
        assert_eq!(v["data"]["principalId"], "u-1");
        assert_eq!(v["data"]["connectionId"], id.to_string());
    }

    #[test]
    fn log_push_carries_type_field() {
        let event = GatewayEvent::FilteredLog {
            log_type: "audit".into(),
            log: json!({"action": "login"}),
        };
        let v: serde_json::Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(v["event"], "filteredLog");
        assert_eq!(v["data"]["type"], "audit");
        assert_eq!(v["data"]["log"]["action"], "login");
    }

    #[test]
    fn custom_frame_keeps_event_name() {
        let text = custom_frame("maintenance", &json!({"in": 5})).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["event"], "maintenance");
        assert_eq!(v["data"]["in"], 5);
    }

    #[test]
    fn stream_names() {
        assert_eq!(LogStream::parse("combined"), Some(LogStream::Combined));
        assert_eq!(LogStream::parse("bogus"), None);
        assert!(!LogStream::SOURCES.contains(&LogStream::Combined));
    }
}
