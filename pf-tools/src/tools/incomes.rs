use super::expenses::optional_positive_amount;
use crate::capability::CapabilityContext;
use crate::confirm::{self, Changes, Mutation, Outcome, body, to_json};
use crate::error::{Result, ToolError};
use crate::labels::{IncomeFrequency, Label, LabelWarnings, TaxStatus, label_schema};
use crate::ledger::LedgerAccess;
use crate::money::{Monetary, cents_to_dollars, format_dollars, outgoing_pair};
use crate::records::{IncomeView, end_of_day, start_of_day};
use crate::traits::{
    Tool, ToolInvocation, ToolKind, ToolSpec, ToolTier, mutating_schema, optional_date,
    optional_string, parse_page_size, require_string,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use pf_ledger::{Income, IncomeUpdate, ListFilter};
use serde_json::{Map, Value, json};

#[derive(Debug, Default)]
struct IncomeArgs {
    source: Option<String>,
    amount: Option<f64>,
    frequency: Option<IncomeFrequency>,
    tax_status: Option<TaxStatus>,
    date: Option<NaiveDate>,
}

impl IncomeArgs {
    fn parse(args: &Value, warnings: &mut LabelWarnings) -> Result<Self> {
        Ok(Self {
            source: optional_string(args, "source")?,
            amount: optional_positive_amount(args, "amount")?,
            frequency: warnings.parse(args, "frequency")?,
            tax_status: warnings.parse(args, "tax_status")?,
            date: optional_date(args, "date")?,
        })
    }

    fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.amount.is_none()
            && self.frequency.is_none()
            && self.tax_status.is_none()
            && self.date.is_none()
    }
}

fn income_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "source".into(),
        json!({"type": "string", "description": "Where the income comes from, e.g. \"Salary\"."}),
    );
    props.insert(
        "amount".into(),
        json!({"type": "number", "description": "Amount per period in dollars. Must be positive."}),
    );
    props.insert(
        "frequency".into(),
        label_schema::<IncomeFrequency>("How often this income is received. Defaults to monthly."),
    );
    props.insert(
        "tax_status".into(),
        label_schema::<TaxStatus>("Whether the amount is before or after tax. Defaults to pre_tax."),
    );
    props.insert(
        "date".into(),
        json!({"type": "string", "description": "Date received, YYYY-MM-DD. Defaults to today."}),
    );
    props
}

fn describe(i: &Income) -> String {
    format!(
        "\"{}\" ({} {})",
        i.source,
        format_dollars(i.resolved_amount()),
        IncomeFrequency::from_code(i.frequency).label()
    )
}

pub struct ListIncomesTool {
    ledger: LedgerAccess,
}

impl ListIncomesTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for ListIncomesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_incomes".to_string(),
            description: "List the user's income entries, optionally within a date range. Returns at most 50 per call with a next_page_token when more exist.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "start_date": { "type": "string", "description": "Inclusive start, YYYY-MM-DD." },
                    "end_date": { "type": "string", "description": "Inclusive end, YYYY-MM-DD." },
                    "page_size": { "type": "integer", "minimum": 1, "maximum": 50 },
                    "page_token": { "type": "string" }
                }
            }),
            kind: ToolKind::Read,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let filter = ListFilter {
            user_id: ctx.user_id().to_string(),
            start_date: optional_date(args, "start_date")?.map(start_of_day),
            end_date: optional_date(args, "end_date")?.map(end_of_day),
            status: None,
            page_size: parse_page_size(args)?,
            page_token: optional_string(args, "page_token")?,
        };
        let page = self
            .ledger
            .call("ListIncomes", self.ledger.service().list_incomes(&filter))
            .await?;
        let total_cents: i64 = page.items.iter().map(Monetary::amount_in_cents).sum();
        let incomes: Vec<IncomeView> = page.items.iter().map(IncomeView::from).collect();
        let mut out = json!({
            "incomes": incomes,
            "count": incomes.len(),
            "totalAmount": cents_to_dollars(total_cents),
            "hasMore": page.has_more(),
        });
        if let Some(token) = page.next_page_token.filter(|t| !t.is_empty()) {
            out["nextPageToken"] = Value::from(token);
        }
        Ok(out)
    }
}

struct CreateIncome<'a> {
    ledger: &'a LedgerAccess,
    income: Income,
}

#[async_trait]
impl Mutation for CreateIncome<'_> {
    type Target = ();

    async fn fetch(&self) -> Result<()> {
        Ok(())
    }

    async fn preview(&self, _: &()) -> Result<Outcome> {
        let mut details = to_json(&IncomeView::from(&self.income));
        if let Value::Object(map) = &mut details {
            map.remove("id");
        }
        Ok(Outcome::previewed(
            body([("details", details)]),
            format!(
                "Ready to add income {}. Confirm to save it.",
                describe(&self.income)
            ),
        ))
    }

    async fn apply(&self, _: ()) -> Result<Outcome> {
        let created = self
            .ledger
            .call("CreateIncome", self.ledger.service().create_income(&self.income))
            .await?;
        Ok(Outcome::executed(
            body([("income", to_json(&IncomeView::from(&created)))]),
            format!("Added income {}.", describe(&created)),
        ))
    }
}

pub struct CreateIncomeTool {
    ledger: LedgerAccess,
}

impl CreateIncomeTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for CreateIncomeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_income".to_string(),
            description: "Record a new income source. First call returns a preview for the user; repeat with confirmed=true after they approve.".to_string(),
            parameters_schema: mutating_schema(income_properties(), &["source", "amount"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let source = require_string(args, "source")?;
        let fields = IncomeArgs::parse(args, &mut warnings)?;
        let amount = fields
            .amount
            .ok_or_else(|| ToolError::InvalidArguments("missing key: amount".to_string()))?;
        let (amount, amount_cents) = outgoing_pair(amount);
        let date = fields.date.unwrap_or_else(|| Utc::now().date_naive());
        let income = Income {
            id: String::new(),
            user_id: ctx.user_id().to_string(),
            source,
            amount,
            amount_cents,
            frequency: fields.frequency.unwrap_or(IncomeFrequency::Monthly).code(),
            tax_status: fields.tax_status.unwrap_or(TaxStatus::PreTax).code(),
            date: Some(start_of_day(date)),
        };
        let mutation = CreateIncome {
            ledger: &self.ledger,
            income,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct UpdateIncome<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    income_id: String,
    fields: IncomeArgs,
}

impl UpdateIncome<'_> {
    fn changes(&self, current: &Income) -> Changes {
        let f = &self.fields;
        let mut changes = Changes::default();
        changes.field("source", current.source.clone(), f.source.clone());
        changes.field_with(
            "amount",
            current.resolved_amount(),
            f.amount.map(|a| outgoing_pair(a).0),
            |v| format_dollars(*v),
        );
        changes.field(
            "frequency",
            IncomeFrequency::from_code(current.frequency).label(),
            f.frequency.map(Label::label),
        );
        changes.field(
            "tax_status",
            TaxStatus::from_code(current.tax_status).label(),
            f.tax_status.map(Label::label),
        );
        changes.field(
            "date",
            current.date.map(|d| d.format("%Y-%m-%d").to_string()),
            f.date.map(|d| Some(d.to_string())),
        );
        changes
    }
}

#[async_trait]
impl Mutation for UpdateIncome<'_> {
    type Target = Income;

    async fn fetch(&self) -> Result<Income> {
        self.ledger
            .call(
                "GetIncome",
                self.ledger.service().get_income(self.user_id, &self.income_id),
            )
            .await
    }

    async fn preview(&self, current: &Income) -> Result<Outcome> {
        let changes = self.changes(current);
        let message = format!(
            "Ready to update income {}: {}. Confirm to apply.",
            describe(current),
            changes.summary()
        );
        Ok(Outcome::previewed(
            body([
                ("incomeId", Value::from(self.income_id.clone())),
                ("current", to_json(&IncomeView::from(current))),
                ("changes", changes.into_value()),
            ]),
            message,
        ))
    }

    async fn apply(&self, current: Income) -> Result<Outcome> {
        let summary = self.changes(&current).summary();
        let f = &self.fields;
        let pair = f.amount.map(outgoing_pair);
        let update = IncomeUpdate {
            user_id: self.user_id.to_string(),
            income_id: self.income_id.clone(),
            source: f.source.clone(),
            amount: pair.map(|(dollars, _)| dollars),
            amount_cents: pair.map(|(_, cents)| cents),
            frequency: f.frequency.map(Label::code),
            tax_status: f.tax_status.map(Label::code),
            date: f.date.map(start_of_day),
        };
        let updated = self
            .ledger
            .call("UpdateIncome", self.ledger.service().update_income(&update))
            .await?;
        Ok(Outcome::executed(
            body([("income", to_json(&IncomeView::from(&updated)))]),
            format!("Updated income \"{}\": {summary}.", updated.source),
        ))
    }
}

pub struct UpdateIncomeTool {
    ledger: LedgerAccess,
}

impl UpdateIncomeTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for UpdateIncomeTool {
    fn spec(&self) -> ToolSpec {
        let mut props = income_properties();
        props.insert(
            "income_id".into(),
            json!({"type": "string", "description": "Id of the income entry to change."}),
        );
        ToolSpec {
            name: "update_income".to_string(),
            description: "Change fields of an income entry. Pass only the fields that change. First call returns a from/to preview; repeat with confirmed=true after the user approves.".to_string(),
            parameters_schema: mutating_schema(props, &["income_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let income_id = require_string(args, "income_id")?;
        let fields = IncomeArgs::parse(args, &mut warnings)?;
        if fields.is_empty() {
            return Err(ToolError::InvalidArguments(
                "provide at least one field to change".to_string(),
            ));
        }
        let mutation = UpdateIncome {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            income_id,
            fields,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct DeleteIncome<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    income_id: String,
}

#[async_trait]
impl Mutation for DeleteIncome<'_> {
    type Target = Income;

    async fn fetch(&self) -> Result<Income> {
        self.ledger
            .call(
                "GetIncome",
                self.ledger.service().get_income(self.user_id, &self.income_id),
            )
            .await
    }

    async fn preview(&self, current: &Income) -> Result<Outcome> {
        Ok(Outcome::previewed(
            body([("income", to_json(&IncomeView::from(current)))]),
            format!(
                "This will permanently delete income {}. Confirm to delete it.",
                describe(current)
            ),
        ))
    }

    async fn apply(&self, current: Income) -> Result<Outcome> {
        self.ledger
            .call(
                "DeleteIncome",
                self.ledger
                    .service()
                    .delete_income(self.user_id, &self.income_id),
            )
            .await?;
        Ok(Outcome::executed(
            body([("deletedId", Value::from(self.income_id.clone()))]),
            format!("Deleted income {}.", describe(&current)),
        ))
    }
}

pub struct DeleteIncomeTool {
    ledger: LedgerAccess,
}

impl DeleteIncomeTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for DeleteIncomeTool {
    fn spec(&self) -> ToolSpec {
        let mut props = Map::new();
        props.insert(
            "income_id".into(),
            json!({"type": "string", "description": "Id of the income entry to delete."}),
        );
        ToolSpec {
            name: "delete_income".to_string(),
            description: "Delete one income entry. First call shows what will be removed; repeat with confirmed=true after the user approves.".to_string(),
            parameters_schema: mutating_schema(props, &["income_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let mutation = DeleteIncome {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            income_id: require_string(&invocation.arguments, "income_id")?,
        };
        Ok(confirm::run(&mutation, invocation.confirmed).await?.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::{CreateIncomeTool, DeleteIncomeTool, ListIncomesTool, UpdateIncomeTool};
    use crate::capability::test_context;
    use crate::ledger::LedgerAccess;
    use crate::testing::MockLedger;
    use crate::traits::{Tool, ToolInvocation};
    use pf_ledger::Income;
    use std::sync::Arc;

    fn salary_ledger() -> Arc<MockLedger> {
        let mock = Arc::new(MockLedger::default());
        mock.put_income(Income {
            id: "inc-1".to_string(),
            user_id: "user-1".to_string(),
            source: "Salary".to_string(),
            amount: 4000.0,
            amount_cents: 0,
            frequency: 3,
            tax_status: 1,
            date: None,
        });
        mock
    }

    async fn run(tool: &dyn Tool, args: serde_json::Value) -> serde_json::Value {
        let inv = ToolInvocation::from_call(tool.spec().name, args).expect("invocation");
        tool.execute(&test_context(false), &inv)
            .await
            .expect("tool call")
    }

    #[tokio::test]
    async fn create_income_sends_cents() {
        let mock = Arc::new(MockLedger::default());
        let tool = CreateIncomeTool::new(LedgerAccess::new(mock.clone()));
        let preview = run(&tool, serde_json::json!({"source": "Freelance", "amount": 1250.75})).await;
        assert_eq!(preview["status"], "pending_confirmation");
        assert_eq!(preview["details"]["frequency"], "monthly");
        assert!(mock.mutating_calls().is_empty());

        run(
            &tool,
            serde_json::json!({"source": "Freelance", "amount": 1250.75, "confirmed": true}),
        )
        .await;
        let sent = mock.last_payload("CreateIncome").expect("payload");
        assert_eq!(sent["amountCents"], 125_075);
    }

    #[tokio::test]
    async fn update_income_diff_uses_legacy_dollars_when_cents_missing() {
        let mock = salary_ledger();
        let tool = UpdateIncomeTool::new(LedgerAccess::new(mock.clone()));
        let preview = run(&tool, serde_json::json!({"income_id": "inc-1", "amount": 4200})).await;
        assert_eq!(preview["changes"]["amount"]["from"], 4000.0);
        assert_eq!(preview["changes"]["amount"]["to"], 4200.0);

        let done = run(
            &tool,
            serde_json::json!({"income_id": "inc-1", "amount": 4200, "confirmed": true}),
        )
        .await;
        assert!(done["message"].as_str().unwrap_or_default().contains("$4200.00"));
        assert_eq!(mock.count("UpdateIncome"), 1);
    }

    #[tokio::test]
    async fn delete_income_requires_confirmation() {
        let mock = salary_ledger();
        let tool = DeleteIncomeTool::new(LedgerAccess::new(mock.clone()));
        run(&tool, serde_json::json!({"income_id": "inc-1"})).await;
        assert_eq!(mock.count("DeleteIncome"), 0);
        run(&tool, serde_json::json!({"income_id": "inc-1", "confirmed": true})).await;
        assert_eq!(mock.count("DeleteIncome"), 1);
    }

    #[tokio::test]
    async fn list_incomes_totals_resolved_amounts() {
        let tool = ListIncomesTool::new(LedgerAccess::new(salary_ledger()));
        let page = run(&tool, serde_json::json!({})).await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["totalAmount"], 4000.0);
        assert_eq!(page["incomes"][0]["taxStatus"], "pre_tax");
    }
}
