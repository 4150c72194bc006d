//! Caller context for audit entries: actor, request metadata, outcome

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use http::HeaderMap;
use http::header::USER_AGENT;
use http::request::Parts;

/// Inbound request metadata used to derive network fields
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl RequestContext {
    pub fn new(headers: HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            headers,
            remote_addr,
        }
    }

    /// Client IP, by priority:
    ///
    /// 1. first address of `x-forwarded-for`
    /// 2. `x-real-ip`
    /// 3. the raw connection address
    pub fn client_ip(&self) -> Option<String> {
        if let Some(first) = self
            .header("x-forwarded-for")
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Some(first.to_string());
        }

        if let Some(real) = self
            .header("x-real-ip")
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Some(real.to_string());
        }

        self.remote_addr.map(|addr| addr.ip().to_string())
    }

    pub fn user_agent(&self) -> Option<String> {
        self.headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Headers plus the peer address when the server was started with connect info
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::new(parts.headers.clone(), remote_addr))
    }
}

/// Who did it, and from where
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub request: Option<RequestContext>,
    pub session_id: Option<String>,
}

impl AuditContext {
    pub fn actor(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            actor_id: Some(id.into()),
            actor_name: Some(name.into()),
            ..Default::default()
        }
    }

    /// No known actor (e.g. a failed login for an unknown user)
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Result of the audited operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub error_message: Option<String>,
}

impl Default for Outcome {
    fn default() -> Self {
        Self::success()
    }
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn ctx(headers: &[(&'static str, &'static str)]) -> RequestContext {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(*k, HeaderValue::from_static(v));
        }
        RequestContext::new(map, Some("172.16.0.9:51000".parse().unwrap()))
    }

    #[test]
    fn forwarded_for_wins_over_real_ip() {
        let req = ctx(&[
            ("x-forwarded-for", "192.168.1.100, 10.0.0.1"),
            ("x-real-ip", "10.1.1.1"),
        ]);
        assert_eq!(req.client_ip().as_deref(), Some("192.168.1.100"));
    }

    #[test]
    fn real_ip_used_without_forwarded_for() {
        let req = ctx(&[("x-real-ip", "10.1.1.1")]);
        assert_eq!(req.client_ip().as_deref(), Some("10.1.1.1"));
    }

    #[test]
    fn falls_back_to_connection_address() {
        let req = ctx(&[]);
        assert_eq!(req.client_ip().as_deref(), Some("172.16.0.9"));
    }

    #[test]
    fn no_address_at_all() {
        let req = RequestContext::new(HeaderMap::new(), None);
        assert_eq!(req.client_ip(), None);
    }

    #[test]
    fn user_agent_is_read() {
        let req = ctx(&[("user-agent", "curl/8.5")]);
        assert_eq!(req.user_agent().as_deref(), Some("curl/8.5"));
    }

    #[test]
    fn outcome_defaults_to_success() {
        assert_eq!(Outcome::default(), Outcome::success());
        assert!(!Outcome::failure("denied").success);
    }
}
