use crate::error::{Result, ToolError};
use pf_ledger::LedgerService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Shared handle every tool uses to reach the Ledger Service.
#[derive(Clone)]
pub struct LedgerAccess {
    service: Arc<dyn LedgerService>,
    timeout: Duration,
    batch_concurrency: usize,
}

impl LedgerAccess {
    pub fn new(service: Arc<dyn LedgerService>) -> Self {
        Self {
            service,
            timeout: DEFAULT_CALL_TIMEOUT,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    pub fn service(&self) -> &dyn LedgerService {
        self.service.as_ref()
    }

    pub fn batch_concurrency(&self) -> usize {
        self.batch_concurrency
    }

    /// Runs one ledger RPC under the caller-visible deadline. No retries.
    pub async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = pf_ledger::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = ToolError::from(e);
                if matches!(err, ToolError::Transport(_) | ToolError::Timeout(_)) {
                    tracing::warn!(op, error = %err, "ledger call failed");
                } else {
                    tracing::debug!(op, error = %err, "ledger call rejected");
                }
                Err(err)
            }
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ledger call timed out"
                );
                Err(ToolError::Timeout(format!(
                    "{op} exceeded {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}
