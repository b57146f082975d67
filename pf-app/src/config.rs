//! Gateway configuration loader.
//!
//! TOML file, then `.env`/environment overrides, then validation. Validation errors name the
//! offending key.

use pf_ledger::LedgerClientConfig;
use pf_tools::MAX_BATCH_TARGETS;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub base_url: String,
    /// Service token presented to the Ledger Service as a bearer.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    300
}

fn default_max_in_flight() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Bearer tokens accepted from the authenticating proxy. Empty means every tool request is
    /// rejected.
    #[serde(default)]
    pub trusted_proxy_tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Action names removed from the registry.
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn default_batch_concurrency() -> usize {
    pf_tools::DEFAULT_BATCH_CONCURRENCY
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: default_batch_concurrency(),
            disabled: Vec::new(),
        }
    }
}

const MAX_BATCH_CONCURRENCY: usize = 16;

impl GatewayConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg = Self::parse(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok((cfg, path))
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("PFINANCE_LEDGER_URL") {
            self.ledger.base_url = v;
        }
        if let Some(v) = non_empty("PFINANCE_LEDGER_TOKEN") {
            self.ledger.api_token = Some(v);
        }
        if let Some(v) = non_empty("PFINANCE_TRUSTED_PROXY_TOKEN") {
            if !self.security.trusted_proxy_tokens.contains(&v) {
                self.security.trusted_proxy_tokens.push(v);
            }
        }
        if let Some(v) = non_empty("PFINANCE_GATEWAY_BIND") {
            self.server.bind_addr = v;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.ledger.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("ledger.base_url is required"));
        }
        if self.ledger.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("ledger.request_timeout_ms must be > 0"));
        }
        self.bind_addr()?;
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if self.server.max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.max_in_flight must be > 0"));
        }
        if self
            .security
            .trusted_proxy_tokens
            .iter()
            .any(|t| t.trim().is_empty())
        {
            return Err(anyhow::anyhow!(
                "security.trusted_proxy_tokens must not contain empty tokens"
            ));
        }
        if !(1..=MAX_BATCH_CONCURRENCY).contains(&self.tools.batch_concurrency) {
            return Err(anyhow::anyhow!(
                "tools.batch_concurrency must be between 1 and {MAX_BATCH_CONCURRENCY}"
            ));
        }
        let worst_case = self.batch_worst_case();
        if Duration::from_secs(self.server.http_timeout_seconds) < worst_case {
            return Err(anyhow::anyhow!(
                "server.http_timeout_seconds ({}) is shorter than a full batch can take ({}s: \
                 {MAX_BATCH_TARGETS} items at tools.batch_concurrency {} with \
                 ledger.request_timeout_ms {}); raise it, raise batch_concurrency or lower the \
                 ledger timeout",
                self.server.http_timeout_seconds,
                worst_case.as_secs_f64().ceil(),
                self.tools.batch_concurrency,
                self.ledger.request_timeout_ms
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server.bind_addr.trim().parse().map_err(|e| {
            anyhow::anyhow!(
                "server.bind_addr {:?} is not a socket address: {e}",
                self.server.bind_addr
            )
        })
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.request_timeout_ms)
    }

    /// Longest a batch action can hold its HTTP request: every concurrency slot working
    /// through its share of a full batch, each ledger call running to its timeout.
    pub fn batch_worst_case(&self) -> Duration {
        let rounds = MAX_BATCH_TARGETS.div_ceil(self.tools.batch_concurrency.max(1));
        self.ledger_timeout() * rounds as u32
    }

    pub fn ledger_client_config(&self) -> LedgerClientConfig {
        LedgerClientConfig {
            base_url: self.ledger.base_url.clone(),
            api_token: self.ledger.api_token.clone(),
            request_timeout: self.ledger_timeout(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".pfinance").join("gateway.toml")
}
