//! Realtime log gateway protocol types
//!
//! Shared by the gateway and by dashboard clients.

pub mod protocol;

pub use protocol::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-connection predicate set with `setFilters`.
///
/// Every populated field must hold for a log to match. A new filter replaces
/// the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Case-insensitive substring over message / actor name / action / module / service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Time bounds are kept as sent (RFC 3339, `YYYY-MM-DD` or epoch millis)
    /// and interpreted at match time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Value>,
}
