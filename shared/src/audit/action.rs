//! Audit categories and their closed action sets
//!
//! Every category owns a fixed set of actions. The typed [`AuditAction`]
//! makes an invalid category/action pair unrepresentable; string input from
//! untyped callers goes through [`AuditAction::parse`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    Access,
    Administrative,
    Security,
    Data,
    System,
}

impl AuditCategory {
    pub const ALL: [AuditCategory; 6] = [
        Self::Authentication,
        Self::Access,
        Self::Administrative,
        Self::Security,
        Self::Data,
        Self::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Access => "access",
            Self::Administrative => "administrative",
            Self::Security => "security",
            Self::Data => "data",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// System entries are emitted by the service itself and never name an actor
    pub fn allows_actor(&self) -> bool {
        !matches!(self, Self::System)
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declares a per-category action enum with its wire names.
macro_rules! action_set {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

action_set! {
    /// Sign-in lifecycle
    AuthenticationAction {
        Login => "login",
        Logout => "logout",
        TokenRefresh => "token_refresh",
        LoginFailed => "login_failed",
        AccountLocked => "account_locked",
        AccountUnlocked => "account_unlocked",
    }
}

action_set! {
    /// Reads of protected resources
    AccessAction {
        View => "view",
        List => "list",
        Search => "search",
        Download => "download",
        AccessDenied => "access_denied",
    }
}

action_set! {
    /// Account, role and settings management
    AdministrativeAction {
        UserCreated => "user_created",
        UserUpdated => "user_updated",
        UserDeleted => "user_deleted",
        RoleAssigned => "role_assigned",
        RoleRevoked => "role_revoked",
        PermissionChanged => "permission_changed",
        SettingsChanged => "settings_changed",
    }
}

action_set! {
    SecurityAction {
        PasswordChanged => "password_changed",
        PasswordReset => "password_reset",
        MfaEnabled => "mfa_enabled",
        MfaDisabled => "mfa_disabled",
        ApiKeyCreated => "api_key_created",
        ApiKeyRevoked => "api_key_revoked",
        SuspiciousActivity => "suspicious_activity",
        RateLimitExceeded => "rate_limit_exceeded",
    }
}

action_set! {
    /// Mutations of business records
    DataAction {
        Create => "create",
        Update => "update",
        Delete => "delete",
        Import => "import",
        Export => "export",
        BulkUpdate => "bulk_update",
    }
}

action_set! {
    SystemAction {
        Startup => "startup",
        Shutdown => "shutdown",
        ConfigReload => "config_reload",
        Maintenance => "maintenance",
        Backup => "backup",
        Error => "error",
    }
}

/// A category-qualified action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Authentication(AuthenticationAction),
    Access(AccessAction),
    Administrative(AdministrativeAction),
    Security(SecurityAction),
    Data(DataAction),
    System(SystemAction),
}

impl AuditAction {
    pub fn category(&self) -> AuditCategory {
        match self {
            Self::Authentication(_) => AuditCategory::Authentication,
            Self::Access(_) => AuditCategory::Access,
            Self::Administrative(_) => AuditCategory::Administrative,
            Self::Security(_) => AuditCategory::Security,
            Self::Data(_) => AuditCategory::Data,
            Self::System(_) => AuditCategory::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication(a) => a.as_str(),
            Self::Access(a) => a.as_str(),
            Self::Administrative(a) => a.as_str(),
            Self::Security(a) => a.as_str(),
            Self::Data(a) => a.as_str(),
            Self::System(a) => a.as_str(),
        }
    }

    /// Resolve an action name within a category's closed set.
    ///
    /// Returns `None` when the action does not belong to the category.
    pub fn parse(category: AuditCategory, action: &str) -> Option<Self> {
        match category {
            AuditCategory::Authentication => {
                AuthenticationAction::parse(action).map(Self::Authentication)
            }
            AuditCategory::Access => AccessAction::parse(action).map(Self::Access),
            AuditCategory::Administrative => {
                AdministrativeAction::parse(action).map(Self::Administrative)
            }
            AuditCategory::Security => SecurityAction::parse(action).map(Self::Security),
            AuditCategory::Data => DataAction::parse(action).map(Self::Data),
            AuditCategory::System => SystemAction::parse(action).map(Self::System),
        }
    }

    /// Every valid action across all categories
    pub fn all() -> Vec<AuditAction> {
        let mut all = Vec::new();
        all.extend(AuthenticationAction::ALL.iter().map(|a| Self::Authentication(*a)));
        all.extend(AccessAction::ALL.iter().map(|a| Self::Access(*a)));
        all.extend(AdministrativeAction::ALL.iter().map(|a| Self::Administrative(*a)));
        all.extend(SecurityAction::ALL.iter().map(|a| Self::Security(*a)));
        all.extend(DataAction::ALL.iter().map(|a| Self::Data(*a)));
        all.extend(SystemAction::ALL.iter().map(|a| Self::System(*a)));
        all
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category(), self.as_str())
    }
}

impl From<AuthenticationAction> for AuditAction {
    fn from(a: AuthenticationAction) -> Self {
        Self::Authentication(a)
    }
}

impl From<AccessAction> for AuditAction {
    fn from(a: AccessAction) -> Self {
        Self::Access(a)
    }
}

impl From<AdministrativeAction> for AuditAction {
    fn from(a: AdministrativeAction) -> Self {
        Self::Administrative(a)
    }
}

impl From<SecurityAction> for AuditAction {
    fn from(a: SecurityAction) -> Self {
        Self::Security(a)
    }
}

impl From<DataAction> for AuditAction {
    fn from(a: DataAction) -> Self {
        Self::Data(a)
    }
}

impl From<SystemAction> for AuditAction {
    fn from(a: SystemAction) -> Self {
        Self::System(a)
    }
}
