//! Pro-only actions: opaque ledger analytics and bulk tax classification.

use super::expenses::validate_percent;
use crate::batch::{BatchExecutor, BatchOutcome, ItemOutcome, MAX_BATCH_TARGETS};
use crate::capability::CapabilityContext;
use crate::confirm::{self, Mutation, Outcome, body, to_json};
use crate::error::{Result, ToolError};
use crate::labels::{Label, LabelWarnings, TaxDeductionCategory, label_schema};
use crate::ledger::LedgerAccess;
use crate::money::{Monetary, cents_to_dollars, format_cents};
use crate::records::{ExpenseView, end_of_day, start_of_day};
use crate::traits::{
    Tool, ToolInvocation, ToolKind, ToolSpec, ToolTier, mutating_schema, optional_bool,
    optional_date, optional_f64, optional_string, require_id_list,
};
use async_trait::async_trait;
use pf_ledger::{InsightsRequest, TaxStatusUpdate};
use serde_json::{Map, Value, json};

const PERIODS: [&str; 4] = ["week", "month", "quarter", "year"];

#[derive(Debug, Clone, Copy)]
enum AnalyticsKind {
    SpendingInsights,
    CategoryComparison,
    Anomalies,
}

impl AnalyticsKind {
    fn name(self) -> &'static str {
        match self {
            Self::SpendingInsights => "get_spending_insights",
            Self::CategoryComparison => "compare_categories",
            Self::Anomalies => "detect_anomalies",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::SpendingInsights => "Generate spending insights (trends, unusual categories, savings opportunities) for a period.",
            Self::CategoryComparison => "Compare spending per category against the previous period.",
            Self::Anomalies => "Find unusual transactions such as spikes, duplicates or new merchants in a period.",
        }
    }
}

/// One tool per ledger analytics endpoint; the result is passed through untouched.
pub struct AnalyticsTool {
    ledger: LedgerAccess,
    kind: AnalyticsKind,
}

impl AnalyticsTool {
    pub fn spending_insights(ledger: LedgerAccess) -> Self {
        Self {
            ledger,
            kind: AnalyticsKind::SpendingInsights,
        }
    }

    pub fn category_comparison(ledger: LedgerAccess) -> Self {
        Self {
            ledger,
            kind: AnalyticsKind::CategoryComparison,
        }
    }

    pub fn anomalies(ledger: LedgerAccess) -> Self {
        Self {
            ledger,
            kind: AnalyticsKind::Anomalies,
        }
    }
}

#[async_trait]
impl Tool for AnalyticsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.kind.name().to_string(),
            description: self.kind.description().to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "period": { "type": "string", "enum": PERIODS, "description": "Reporting period. Defaults to month." },
                    "start_date": { "type": "string", "description": "Inclusive start, YYYY-MM-DD. Overrides period." },
                    "end_date": { "type": "string", "description": "Inclusive end, YYYY-MM-DD." }
                }
            }),
            kind: ToolKind::Read,
            tier: ToolTier::Pro,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let period = optional_string(args, "period")?;
        if period.as_deref().is_some_and(|p| !PERIODS.contains(&p)) {
            return Err(ToolError::InvalidArguments(format!(
                "period must be one of: {}",
                PERIODS.join(", ")
            )));
        }
        let request = InsightsRequest {
            user_id: ctx.user_id().to_string(),
            period,
            start_date: optional_date(args, "start_date")?.map(start_of_day),
            end_date: optional_date(args, "end_date")?.map(end_of_day),
        };
        let service = self.ledger.service();
        match self.kind {
            AnalyticsKind::SpendingInsights => {
                self.ledger
                    .call("GetSpendingInsights", service.get_spending_insights(&request))
                    .await
            }
            AnalyticsKind::CategoryComparison => {
                self.ledger
                    .call(
                        "GetCategoryComparison",
                        service.get_category_comparison(&request),
                    )
                    .await
            }
            AnalyticsKind::Anomalies => {
                self.ledger
                    .call("DetectAnomalies", service.detect_anomalies(&request))
                    .await
            }
        }
    }
}

#[derive(Debug, Clone)]
struct TaxClassification {
    is_tax_deductible: bool,
    category: TaxDeductionCategory,
    percent: f64,
    note: String,
}

impl TaxClassification {
    fn update_for(&self, expense_id: &str) -> TaxStatusUpdate {
        TaxStatusUpdate {
            expense_id: expense_id.to_string(),
            is_tax_deductible: self.is_tax_deductible,
            tax_deduction_category: if self.is_tax_deductible {
                self.category.code()
            } else {
                0
            },
            tax_deduction_note: self.note.clone(),
            tax_deductible_percent: if self.is_tax_deductible {
                self.percent
            } else {
                0.0
            },
        }
    }

    fn describe(&self) -> String {
        if self.is_tax_deductible {
            format!(
                "tax deductible ({}, {:.0}%)",
                self.category.label(),
                self.percent * 100.0
            )
        } else {
            "not tax deductible".to_string()
        }
    }
}

struct ClassifyTaxDeductibility<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    expense_ids: Vec<String>,
    classification: TaxClassification,
}

#[async_trait]
impl Mutation for ClassifyTaxDeductibility<'_> {
    type Target = ();

    async fn fetch(&self) -> Result<()> {
        Ok(())
    }

    async fn preview(&self, _: &()) -> Result<Outcome> {
        let (ledger, user_id) = (self.ledger, self.user_id);
        let resolved = BatchExecutor::new(ledger.batch_concurrency())
            .resolve(&self.expense_ids, |id| async move {
                ledger
                    .call("GetExpense", ledger.service().get_expense(user_id, &id))
                    .await
            })
            .await?;

        let total_cents: i64 = resolved
            .records
            .iter()
            .map(|(_, e)| e.amount_in_cents())
            .sum();
        let deductible_cents = if self.classification.is_tax_deductible {
            (total_cents as f64 * self.classification.percent).round() as i64
        } else {
            0
        };
        let count = resolved.records.len();
        let expenses: Vec<ExpenseView> = resolved
            .records
            .iter()
            .map(|(_, e)| ExpenseView::from(e))
            .collect();

        let mut message = format!(
            "This will mark {count} expense{} totalling {} as {}.",
            if count == 1 { "" } else { "s" },
            format_cents(total_cents),
            self.classification.describe()
        );
        if !resolved.skipped_ids.is_empty() {
            message.push_str(&format!(
                " {} of the requested ids could not be found and will be skipped.",
                resolved.skipped_ids.len()
            ));
        }
        message.push_str(" Confirm to apply.");

        Ok(Outcome::previewed(
            body([
                ("expenses", to_json(&expenses)),
                ("count", Value::from(count)),
                ("totalAmount", Value::from(cents_to_dollars(total_cents))),
                (
                    "deductibleAmount",
                    Value::from(cents_to_dollars(deductible_cents)),
                ),
                ("skippedIds", to_json(&resolved.skipped_ids)),
            ]),
            message,
        ))
    }

    /// One batch RPC; the ledger's failed-id list becomes per-item outcomes.
    async fn apply(&self, _: ()) -> Result<Outcome> {
        let updates: Vec<TaxStatusUpdate> = self
            .expense_ids
            .iter()
            .map(|id| self.classification.update_for(id))
            .collect();
        let result = self
            .ledger
            .call(
                "BatchUpdateExpenseTaxStatus",
                self.ledger
                    .service()
                    .batch_update_expense_tax_status(self.user_id, &updates),
            )
            .await;

        let items: Vec<ItemOutcome> = match result {
            Ok(result) => self
                .expense_ids
                .iter()
                .map(|id| {
                    let failed = result.failed_expense_ids.contains(id);
                    ItemOutcome {
                        target_id: id.clone(),
                        succeeded: !failed,
                        error: failed.then(|| "the ledger could not update this expense".to_string()),
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "tax status batch failed");
                let message = e.user_message();
                self.expense_ids
                    .iter()
                    .map(|id| ItemOutcome {
                        target_id: id.clone(),
                        succeeded: false,
                        error: Some(message.clone()),
                    })
                    .collect()
            }
        };
        let outcome = BatchOutcome::from_items(items);
        let message = if outcome.failed_count == 0 {
            format!(
                "Marked {} expenses as {}.",
                outcome.succeeded_count,
                self.classification.describe()
            )
        } else {
            format!(
                "Marked {} of {} expenses as {}; {} could not be updated.",
                outcome.succeeded_count,
                outcome.items.len(),
                self.classification.describe(),
                outcome.failed_count
            )
        };
        let body = match to_json(&outcome) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Outcome::executed(body, message))
    }
}

pub struct ClassifyTaxDeductibilityTool {
    ledger: LedgerAccess,
}

impl ClassifyTaxDeductibilityTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for ClassifyTaxDeductibilityTool {
    fn spec(&self) -> ToolSpec {
        let mut props = Map::new();
        props.insert(
            "expense_ids".into(),
            json!({
                "type": "array",
                "items": {"type": "string"},
                "minItems": 1,
                "maxItems": MAX_BATCH_TARGETS,
                "description": "Expenses to classify (up to 100)."
            }),
        );
        props.insert(
            "is_tax_deductible".into(),
            json!({"type": "boolean", "description": "Mark as deductible (true) or clear the deduction (false)."}),
        );
        props.insert(
            "tax_deduction_category".into(),
            label_schema::<TaxDeductionCategory>("Deduction category. Defaults to other."),
        );
        props.insert(
            "tax_deductible_percent".into(),
            json!({"type": "number", "description": "Deductible share as a fraction. Defaults to 1."}),
        );
        props.insert(
            "tax_deduction_note".into(),
            json!({"type": "string", "description": "Short justification shown in tax reports."}),
        );
        ToolSpec {
            name: "classify_tax_deductibility".to_string(),
            description: "Set the tax-deduction status of several expenses at once. The preview lists the affected expenses and the deductible total; repeat with confirmed=true after the user approves.".to_string(),
            parameters_schema: mutating_schema(props, &["expense_ids", "is_tax_deductible"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Pro,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let expense_ids = require_id_list(args, "expense_ids", MAX_BATCH_TARGETS)?;
        let is_tax_deductible = optional_bool(args, "is_tax_deductible")?.ok_or_else(|| {
            ToolError::InvalidArguments("missing key: is_tax_deductible".to_string())
        })?;
        let category = warnings
            .parse::<TaxDeductionCategory>(args, "tax_deduction_category")?
            .unwrap_or(TaxDeductionCategory::Other);
        let percent = optional_f64(args, "tax_deductible_percent")?.unwrap_or(1.0);
        validate_percent(percent)?;

        let mutation = ClassifyTaxDeductibility {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            expense_ids,
            classification: TaxClassification {
                is_tax_deductible,
                category,
                percent,
                note: optional_string(args, "tax_deduction_note")?.unwrap_or_default(),
            },
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}
