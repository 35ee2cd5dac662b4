use actix_web::{dev::Payload, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::basic::BasicAuth;

use crate::error::ApiError;

/// One way of recognising an administrator.
pub trait AccessCheck: Send + Sync {
    fn check(&self, req: &HttpRequest) -> bool;
}

/// Trusts an identity header injected by the fronting access layer. The
/// upstream has already authenticated the caller; nothing is re-verified here.
pub struct TrustedHeader {
    name: String,
}

impl TrustedHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AccessCheck for TrustedHeader {
    fn check(&self, req: &HttpRequest) -> bool {
        req.headers()
            .get(self.name.as_str())
            .map_or(false, |v| !v.as_bytes().is_empty())
    }
}

/// HTTP Basic with a single configured username/password pair.
pub struct BasicCredentials {
    user: String,
    pass: String,
}

impl BasicCredentials {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self { user: user.into(), pass: pass.into() }
    }
}

impl AccessCheck for BasicCredentials {
    fn check(&self, req: &HttpRequest) -> bool {
        // BasicAuth's extractor is synchronous; the Ready future resolves immediately.
        match BasicAuth::from_request(req, &mut Payload::None).into_inner() {
            Ok(creds) => creds.user_id() == self.user && creds.password() == Some(self.pass.as_str()),
            Err(_) => false,
        }
    }
}

pub struct DenyAll;

impl AccessCheck for DenyAll {
    fn check(&self, _req: &HttpRequest) -> bool {
        false
    }
}

/// Ordered, short-circuiting chain of checks ending in [`DenyAll`].
pub struct AccessGate {
    checks: Vec<Box<dyn AccessCheck>>,
}

impl AccessGate {
    /// Builds the chain from configuration: trusted header first, then Basic
    /// (only when both halves are configured), then deny.
    pub fn from_settings(
        trusted_header: Option<&str>,
        admin_user: Option<&str>,
        admin_pass: Option<&str>,
    ) -> Self {
        let mut checks: Vec<Box<dyn AccessCheck>> = Vec::new();
        if let Some(h) = trusted_header.filter(|h| !h.is_empty()) {
            checks.push(Box::new(TrustedHeader::new(h)));
        }
        if let (Some(u), Some(p)) = (admin_user, admin_pass) {
            if !u.is_empty() && !p.is_empty() {
                checks.push(Box::new(BasicCredentials::new(u, p)));
            }
        }
        Self::with_checks(checks)
    }

    pub fn with_checks(mut checks: Vec<Box<dyn AccessCheck>>) -> Self {
        checks.push(Box::new(DenyAll));
        Self { checks }
    }

    pub fn deny_all() -> Self {
        Self::with_checks(Vec::new())
    }

    /// `true` once the chain holds something besides the terminal deny.
    pub fn is_configured(&self) -> bool {
        self.checks.len() > 1
    }

    pub fn is_authorized(&self, req: &HttpRequest) -> bool {
        self.checks.iter().any(|c| c.check(req))
    }

    pub fn authorize(&self, req: &HttpRequest) -> Result<(), ApiError> {
        if self.is_authorized(req) {
            Ok(())
        } else {
            tracing::debug!(path = %req.path(), "admin access denied");
            Err(ApiError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    // "admin:s3cret"
    const GOOD: &str = "Basic YWRtaW46czNjcmV0";
    // "admin:wrong"
    const BAD: &str = "Basic YWRtaW46d3Jvbmc=";

    #[test]
    fn unconfigured_gate_denies_everything() {
        let gate = AccessGate::from_settings(None, None, None);
        assert!(!gate.is_configured());
        let req = TestRequest::default().insert_header(("Authorization", GOOD)).to_http_request();
        assert!(!gate.is_authorized(&req));
        let req = TestRequest::default().insert_header(("Cf-Access-Jwt-Assertion", "x")).to_http_request();
        assert!(!gate.is_authorized(&req));
    }

    #[test]
    fn half_configured_basic_is_ignored() {
        let gate = AccessGate::from_settings(None, Some("admin"), None);
        assert!(!gate.is_configured());
        let req = TestRequest::default().insert_header(("Authorization", GOOD)).to_http_request();
        assert!(!gate.is_authorized(&req));
    }

    #[test]
    fn basic_credentials_must_match_exactly() {
        let gate = AccessGate::from_settings(None, Some("admin"), Some("s3cret"));
        let ok = TestRequest::default().insert_header(("Authorization", GOOD)).to_http_request();
        let wrong = TestRequest::default().insert_header(("Authorization", BAD)).to_http_request();
        let garbage = TestRequest::default().insert_header(("Authorization", "Basic !!!")).to_http_request();
        let bearer = TestRequest::default().insert_header(("Authorization", "Bearer abc")).to_http_request();
        let none = TestRequest::default().to_http_request();
        assert!(gate.is_authorized(&ok));
        assert!(!gate.is_authorized(&wrong));
        assert!(!gate.is_authorized(&garbage));
        assert!(!gate.is_authorized(&bearer));
        assert!(!gate.is_authorized(&none));
    }

    #[test]
    fn trusted_header_short_circuits() {
        let gate = AccessGate::from_settings(Some("Cf-Access-Jwt-Assertion"), Some("admin"), Some("s3cret"));
        let req = TestRequest::default()
            .insert_header(("Cf-Access-Jwt-Assertion", "eyJ..."))
            .insert_header(("Authorization", BAD))
            .to_http_request();
        assert!(gate.is_authorized(&req));
        let empty = TestRequest::default().insert_header(("Cf-Access-Jwt-Assertion", "")).to_http_request();
        assert!(!gate.is_authorized(&empty));
    }
}
