use crate::ledger::LedgerAccess;
use crate::money::{Monetary, format_dollars, outgoing_pair};
use chrono::NaiveDate;
use pf_ledger::{DuplicateCheck, DuplicateProbe};
use serde::Serialize;
use std::collections::HashSet;

const PROBE_ID: &str = "proposed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            Self::High
        } else if score > 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCandidate {
    pub existing_record_id: String,
    pub description: String,
    pub amount: f64,
    pub date: String,
    pub match_score: f64,
    pub match_reason: String,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct ProposedTransaction {
    pub description: String,
    pub amount: f64,
    pub date: Option<NaiveDate>,
}

pub struct DuplicateDetector<'a> {
    ledger: &'a LedgerAccess,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(ledger: &'a LedgerAccess) -> Self {
        Self { ledger }
    }

    /// Advisory lookup. `None` means the lookup itself failed and nothing is known;
    /// `Some(vec![])` means the ledger found no matches.
    pub async fn find_duplicates(
        &self,
        user_id: &str,
        proposed: &ProposedTransaction,
    ) -> Option<Vec<DuplicateCandidate>> {
        let (amount, amount_cents) = outgoing_pair(proposed.amount);
        let check = DuplicateCheck {
            user_id: user_id.to_string(),
            transactions: vec![DuplicateProbe {
                id: PROBE_ID.to_string(),
                description: proposed.description.clone(),
                amount,
                amount_cents,
                date: proposed
                    .date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            }],
        };

        let response = match self
            .ledger
            .call("CheckDuplicates", self.ledger.service().check_duplicates(&check))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "duplicate lookup failed; continuing without it");
                return None;
            }
        };

        let mut candidates: Vec<DuplicateCandidate> = response
            .into_values()
            .flat_map(|list| list.candidates)
            .map(|m| DuplicateCandidate {
                amount: m.resolved_amount(),
                severity: Severity::from_score(m.match_score),
                existing_record_id: m.existing_expense_id,
                description: m.description,
                date: m.date,
                match_score: m.match_score.clamp(0.0, 1.0),
                match_reason: m.match_reason,
            })
            .collect();
        candidates.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
        // Sorted, so the first entry per record is its best score.
        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.existing_record_id.clone()));
        Some(candidates)
    }
}

/// One-sentence warning for a preview; `None` when there is nothing to warn about.
pub fn duplicate_warning(candidates: &[DuplicateCandidate]) -> Option<String> {
    let top = candidates.first()?;
    let others = candidates.len() - 1;
    let lead = match top.severity {
        Severity::High => "This looks like a duplicate of",
        Severity::Medium => "This may duplicate",
        Severity::Low => "This is somewhat similar to",
    };
    let on = if top.date.is_empty() {
        String::new()
    } else {
        format!(" on {}", top.date)
    };
    let mut warning = format!(
        "{lead} \"{}\" ({}{on}, {:.0}% match)",
        top.description,
        format_dollars(top.amount),
        top.match_score * 100.0
    );
    if others > 0 {
        warning.push_str(&format!(
            " and {others} other existing expense{}",
            if others == 1 { "" } else { "s" }
        ));
    }
    warning.push_str(". Only confirm if this is a new expense.");
    Some(warning)
}
