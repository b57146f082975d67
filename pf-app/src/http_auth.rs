use crate::config::GatewayConfig;
use axum::Json;
use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use pf_tools::{CapabilityContext, SubscriptionStatus, SubscriptionTier, VerifiedIdentity};
use serde_json::json;

pub const USER_ID_HEADER: &str = "x-pfinance-user-id";
pub const SUBSCRIPTION_TIER_HEADER: &str = "x-pfinance-subscription-tier";
pub const SUBSCRIPTION_STATUS_HEADER: &str = "x-pfinance-subscription-status";

/// Which callers may speak for an end user. Only the authenticating proxy holds one of these
/// tokens; identity headers from anyone else are never read.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyPolicy {
    pub tokens: Vec<String>,
}

impl TrustedProxyPolicy {
    pub fn from_config(cfg: &GatewayConfig) -> Self {
        let mut tokens = Vec::new();
        for token in &cfg.security.trusted_proxy_tokens {
            let token = token.trim();
            if !token.is_empty() && !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
        Self { tokens }
    }

    fn accepts(&self, provided: &str) -> bool {
        self.tokens.iter().any(|t| t == provided)
    }
}

#[derive(Debug, Clone)]
pub struct TrustedProxyPolicyExt(pub TrustedProxyPolicy);

fn parse_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = raw.trim().splitn(2, char::is_whitespace);
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = parts.next()?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn verified_identity(headers: &HeaderMap) -> Option<VerifiedIdentity> {
    let user_id = header_value(headers, USER_ID_HEADER)?;
    Some(VerifiedIdentity {
        user_id: user_id.to_string(),
        tier: SubscriptionTier::parse(header_value(headers, SUBSCRIPTION_TIER_HEADER).unwrap_or("")),
        status: SubscriptionStatus::parse(
            header_value(headers, SUBSCRIPTION_STATUS_HEADER).unwrap_or(""),
        ),
    })
}

fn unauthorized(code: &str, message: impl Into<String>) -> Response {
    let message = message.into();
    tracing::warn!(error_code = code, error = %message, "trusted identity rejected");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "error",
            "error": message,
            "error_code": code,
        })),
    )
        .into_response()
}

/// Authenticates the proxy and attaches the request's `CapabilityContext`.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn require_trusted_identity(mut req: Request<Body>, next: Next) -> Response {
    let policy = req
        .extensions()
        .get::<TrustedProxyPolicyExt>()
        .map(|v| v.0.clone())
        .unwrap_or_default();

    if policy.tokens.is_empty() {
        return unauthorized(
            "missing_trusted_proxy_config",
            "tool requests require security.trusted_proxy_tokens",
        );
    }
    let Some(provided) = parse_bearer_token(req.headers()) else {
        return unauthorized("missing_bearer_token", "missing bearer token");
    };
    if !policy.accepts(&provided) {
        return unauthorized("invalid_bearer_token", "invalid bearer token");
    }
    let Some(identity) = verified_identity(req.headers()) else {
        return unauthorized(
            "missing_user_id",
            format!("missing {USER_ID_HEADER} header"),
        );
    };

    let ctx = CapabilityContext::from_verified(&identity);
    tracing::debug!(
        user_id = %ctx.user_id(),
        tier = ?identity.tier,
        status = ?identity.status,
        is_pro = ctx.is_pro(),
        "trusted identity attached"
    );
    req.extensions_mut().insert(ctx);
    next.run(req).await
}
