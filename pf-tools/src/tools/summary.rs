use crate::capability::CapabilityContext;
use crate::error::{Result, ToolError};
use crate::labels::{ExpenseCategory, Label};
use crate::ledger::LedgerAccess;
use crate::money::{Monetary, cents_to_dollars, format_cents};
use crate::records::{end_of_day, start_of_day};
use crate::traits::{
    PAGE_SIZE_CAP, Tool, ToolInvocation, ToolKind, ToolSpec, ToolTier, optional_date,
};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use pf_ledger::{ListFilter, Page};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;

/// Upper bound on pages walked per record type.
const MAX_SUMMARY_PAGES: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryTotal {
    category: &'static str,
    amount: f64,
    count: usize,
}

pub struct FinancialSummaryTool {
    ledger: LedgerAccess,
}

impl FinancialSummaryTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

/// Walks pages until exhausted or the page budget runs out; `true` means truncated.
async fn collect_pages<T, F, Fut>(base: &ListFilter, fetch: F) -> Result<(Vec<T>, bool)>
where
    F: Fn(ListFilter) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut filter = base.clone();
    for _ in 0..MAX_SUMMARY_PAGES {
        let page = fetch(filter.clone()).await?;
        let has_more = page.has_more();
        items.extend(page.items);
        if !has_more {
            return Ok((items, false));
        }
        filter.page_token = page.next_page_token;
    }
    Ok((items, true))
}

#[async_trait]
impl Tool for FinancialSummaryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_financial_summary".to_string(),
            description: "Summarise income, spending and net position over a date range, with spending broken down by category. Defaults to the current month.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "start_date": { "type": "string", "description": "Inclusive start, YYYY-MM-DD. Defaults to the first of this month." },
                    "end_date": { "type": "string", "description": "Inclusive end, YYYY-MM-DD. Defaults to today." }
                }
            }),
            kind: ToolKind::Read,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let today = Utc::now().date_naive();
        let end = optional_date(args, "end_date")?.unwrap_or(today);
        let start = match optional_date(args, "start_date")? {
            Some(start) => start,
            None => NaiveDate::from_ymd_opt(end.year(), end.month(), 1).unwrap_or(end),
        };
        if start > end {
            return Err(ToolError::InvalidArguments(
                "start_date must not be after end_date".to_string(),
            ));
        }

        let filter = ListFilter {
            user_id: ctx.user_id().to_string(),
            start_date: Some(start_of_day(start)),
            end_date: Some(end_of_day(end)),
            status: None,
            page_size: PAGE_SIZE_CAP,
            page_token: None,
        };
        let ledger = &self.ledger;
        let ((expenses, expenses_truncated), (incomes, incomes_truncated)) = tokio::try_join!(
            collect_pages(&filter, |f| async move {
                ledger
                    .call("ListExpenses", ledger.service().list_expenses(&f))
                    .await
            }),
            collect_pages(&filter, |f| async move {
                ledger
                    .call("ListIncomes", ledger.service().list_incomes(&f))
                    .await
            }),
        )?;

        let mut by_category: BTreeMap<&'static str, (i64, usize)> = BTreeMap::new();
        for expense in &expenses {
            let entry = by_category
                .entry(ExpenseCategory::from_code(expense.category).label())
                .or_default();
            entry.0 += expense.amount_in_cents();
            entry.1 += 1;
        }
        let mut categories: Vec<CategoryTotal> = by_category
            .into_iter()
            .map(|(category, (cents, count))| CategoryTotal {
                category,
                amount: cents_to_dollars(cents),
                count,
            })
            .collect();
        categories.sort_by(|a, b| b.amount.total_cmp(&a.amount));

        let spent: i64 = expenses.iter().map(Monetary::amount_in_cents).sum();
        let earned: i64 = incomes.iter().map(Monetary::amount_in_cents).sum();
        let truncated = expenses_truncated || incomes_truncated;
        let mut message = format!(
            "From {start} to {end}: income {}, spending {}, net {}.",
            format_cents(earned),
            format_cents(spent),
            format_cents(earned - spent)
        );
        if truncated {
            message.push_str(" Only the most recent records were included; narrow the date range for exact totals.");
        }

        Ok(json!({
            "startDate": start.to_string(),
            "endDate": end.to_string(),
            "totalIncome": cents_to_dollars(earned),
            "totalExpenses": cents_to_dollars(spent),
            "net": cents_to_dollars(earned - spent),
            "expenseCount": expenses.len(),
            "incomeCount": incomes.len(),
            "byCategory": categories,
            "truncated": truncated,
            "message": message,
        }))
    }
}
