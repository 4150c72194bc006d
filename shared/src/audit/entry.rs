//! Audit entry and its published projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::action::{AuditAction, AuditCategory};

/// Opaque structured payload attached to an entry.
///
/// The audit pipeline never inspects its shape.
pub type Details = serde_json::Map<String, serde_json::Value>;

/// Reference to the resource an entry is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: String,
    pub resource_id: Option<String>,
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: Some(resource_id.into()),
        }
    }

    /// A resource type without a specific instance (e.g. a list endpoint)
    pub fn kind(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: None,
        }
    }
}

/// One recorded occurrence, immutable once queued
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Details,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// Successful entry with no actor, metadata or details
    pub fn new(action: impl Into<AuditAction>) -> Self {
        Self {
            action: action.into(),
            actor_id: None,
            actor_name: None,
            ip_address: None,
            user_agent: None,
            session_id: None,
            resource_type: None,
            resource_id: None,
            details: Details::new(),
            success: true,
            error_message: None,
        }
    }

    pub fn category(&self) -> AuditCategory {
        self.action.category()
    }

    pub fn carries_actor(&self) -> bool {
        self.actor_id.is_some() || self.actor_name.is_some()
    }

    pub fn with_resource(mut self, resource: Option<ResourceRef>) -> Self {
        if let Some(r) = resource {
            self.resource_type = Some(r.resource_type);
            self.resource_id = r.resource_id;
        }
        self
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    pub fn with_outcome(mut self, success: bool, error_message: Option<String>) -> Self {
        self.success = success;
        self.error_message = error_message;
        self
    }
}

/// Read-only view published to realtime subscribers after commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogView {
    pub category: AuditCategory,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub success: bool,
}

impl AuditLogView {
    pub fn of(entry: &AuditEntry, timestamp: DateTime<Utc>) -> Self {
        Self {
            category: entry.category(),
            id: Uuid::new_v4(),
            timestamp,
            action: entry.action.as_str().to_string(),
            actor_name: entry.actor_name.clone(),
            success: entry.success,
        }
    }
}
