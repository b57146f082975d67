//! Gateway HTTP server.
//!
//! Builds the tool registry over the Ledger Service client and mounts the agent-facing routes.

use crate::config::GatewayConfig;
use crate::http_auth;
use crate::routes;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use pf_ledger::HttpLedgerClient;
use pf_tools::{
    CapabilityContext, LedgerAccess, SubscriptionStatus, SubscriptionTier, ToolRegistry,
    VerifiedIdentity,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct GatewayState {
    pub registry: ToolRegistry,
    pub started_at: Instant,
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = GatewayConfig::load_with_path(config_path).await?;
    let registry = build_registry(&cfg)?;
    let pro = cli_context(true);
    tracing::info!(
        config_path = %path.display(),
        ledger_base_url = %cfg.ledger.base_url,
        ledger_token_configured = cfg.ledger.api_token.is_some(),
        bind_addr = %cfg.bind_addr()?,
        trusted_proxy_tokens = cfg.security.trusted_proxy_tokens.len(),
        action_count = registry.names(&pro).len(),
        disabled_actions = ?cfg.tools.disabled,
        "config ok"
    );
    if cfg.security.trusted_proxy_tokens.is_empty() {
        tracing::warn!("security.trusted_proxy_tokens is empty; every tool request will be rejected");
    }
    Ok(())
}

/// Prints the tool definitions an agent would see, as JSON.
pub async fn print_tools(config_path: Option<PathBuf>, pro: bool) -> Result<()> {
    let cfg = GatewayConfig::load(config_path).await?;
    let registry = build_registry(&cfg)?;
    let definitions = registry.definitions(&cli_context(pro));
    println!("{}", serde_json::to_string_pretty(&definitions)?);
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, cfg_path) = GatewayConfig::load_with_path(config_path).await?;
    let addr = cfg.bind_addr()?;
    tracing::info!(
        config_path = %cfg_path.display(),
        bind_addr = %addr,
        ledger_base_url = %cfg.ledger.base_url,
        ledger_request_timeout_ms = cfg.ledger.request_timeout_ms,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.max_in_flight,
        batch_concurrency = cfg.tools.batch_concurrency,
        disabled_actions = ?cfg.tools.disabled,
        trusted_proxy_tokens = cfg.security.trusted_proxy_tokens.len(),
        "server configuration loaded"
    );
    let listener = preflight_bind_listener(addr).await?;

    let state = Arc::new(GatewayState {
        registry: build_registry(&cfg)?,
        started_at: Instant::now(),
    });
    let auth_policy = http_auth::TrustedProxyPolicy::from_config(&cfg);
    if auth_policy.tokens.is_empty() {
        tracing::warn!("no trusted proxy tokens configured; tool routes will reject every request");
    }

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router()
        .layer(Extension(http_auth::TrustedProxyPolicyExt(auth_policy)))
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "pfinance gateway serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

fn build_registry(cfg: &GatewayConfig) -> Result<ToolRegistry> {
    let client = HttpLedgerClient::new(&cfg.ledger_client_config())?;
    let ledger = LedgerAccess::new(Arc::new(client))
        .with_timeout(cfg.ledger_timeout())
        .with_batch_concurrency(cfg.tools.batch_concurrency);
    preflight_validate_disabled_actions(&ledger, &cfg.tools.disabled)?;
    Ok(ToolRegistry::new(ledger, &cfg.tools.disabled))
}

/// A typo in `tools.disabled` would silently leave the action enabled.
fn preflight_validate_disabled_actions(ledger: &LedgerAccess, disabled: &[String]) -> Result<()> {
    let full = ToolRegistry::new(ledger.clone(), &[]);
    for name in disabled {
        if full.kind_of(name).is_none() {
            return Err(anyhow::anyhow!(
                "tools.disabled names unknown action '{name}'"
            ));
        }
    }
    Ok(())
}

fn cli_context(pro: bool) -> CapabilityContext {
    CapabilityContext::from_verified(&VerifiedIdentity {
        user_id: "cli".to_string(),
        tier: if pro {
            SubscriptionTier::Pro
        } else {
            SubscriptionTier::Free
        },
        status: SubscriptionStatus::Active,
    })
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
}
