//! Multi-target mutations with per-item outcomes.

use crate::error::{Result, ToolError};
use futures_util::StreamExt;
use serde::Serialize;
use std::future::Future;

/// Ledger limit for a single batch request.
pub const MAX_BATCH_TARGETS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub target_id: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub target_id: String,
    pub error: String,
}

/// Structurally successful even when every item failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub items: Vec<ItemOutcome>,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub errors: Vec<ItemError>,
}

impl BatchOutcome {
    pub fn from_items(items: Vec<ItemOutcome>) -> Self {
        let errors: Vec<ItemError> = items
            .iter()
            .filter(|item| !item.succeeded)
            .map(|item| ItemError {
                target_id: item.target_id.clone(),
                error: item.error.clone().unwrap_or_default(),
            })
            .collect();
        Self {
            succeeded_count: items.len() - errors.len(),
            failed_count: errors.len(),
            items,
            errors,
        }
    }
}

#[derive(Debug)]
pub struct ResolvedBatch<R> {
    /// In request order.
    pub records: Vec<(String, R)>,
    pub skipped_ids: Vec<String>,
}

pub struct BatchExecutor {
    concurrency: usize,
}

impl BatchExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Resolves every id, skipping the ones that fail. Zero resolved is an error.
    pub async fn resolve<R, F, Fut>(&self, ids: &[String], fetch: F) -> Result<ResolvedBatch<R>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let results = self.fan_out(ids, fetch).await;
        let mut resolved = ResolvedBatch {
            records: Vec::with_capacity(results.len()),
            skipped_ids: Vec::new(),
        };
        for (id, result) in results {
            match result {
                Ok(record) => resolved.records.push((id, record)),
                Err(e) => {
                    tracing::debug!(target_id = %id, error = %e, "batch target skipped");
                    resolved.skipped_ids.push(id);
                }
            }
        }
        if resolved.records.is_empty() {
            return Err(ToolError::NotFound(
                "no valid records found for the given ids".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Attempts `op` for every id independently; never aborts early.
    pub async fn execute<F, Fut>(&self, ids: &[String], op: F) -> BatchOutcome
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let items = self
            .fan_out(ids, op)
            .await
            .into_iter()
            .map(|(target_id, result)| match result {
                Ok(()) => ItemOutcome {
                    target_id,
                    succeeded: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(target_id = %target_id, error = %e, "batch item failed");
                    ItemOutcome {
                        target_id,
                        succeeded: false,
                        error: Some(e.user_message()),
                    }
                }
            })
            .collect();
        BatchOutcome::from_items(items)
    }

    /// Bounded fan-out/fan-in; results come back in request order.
    async fn fan_out<T, F, Fut>(&self, ids: &[String], f: F) -> Vec<(String, Result<T>)>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let f = &f;
        let mut results: Vec<(usize, String, Result<T>)> =
            futures_util::stream::iter(ids.iter().cloned().enumerate())
                .map(|(index, id)| async move {
                    let result = f(id.clone()).await;
                    (index, id, result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);
        results
            .into_iter()
            .map(|(_, id, result)| (id, result))
            .collect()
    }
}
