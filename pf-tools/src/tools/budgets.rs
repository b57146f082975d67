use super::expenses::optional_positive_amount;
use crate::capability::CapabilityContext;
use crate::confirm::{self, Changes, Mutation, Outcome, body, to_json};
use crate::error::{Result, ToolError};
use crate::labels::{BudgetPeriod, ExpenseCategory, Label, LabelWarnings, label_schema};
use crate::ledger::LedgerAccess;
use crate::money::{Monetary, format_dollars, outgoing_pair};
use crate::records::BudgetView;
use crate::traits::{
    Tool, ToolInvocation, ToolKind, ToolSpec, ToolTier, mutating_schema, optional_bool,
    optional_string, parse_page_size, require_string,
};
use async_trait::async_trait;
use pf_ledger::{Budget, BudgetUpdate, ListFilter};
use serde_json::{Map, Value, json};

#[derive(Debug, Default)]
struct BudgetArgs {
    name: Option<String>,
    description: Option<String>,
    amount: Option<f64>,
    period: Option<BudgetPeriod>,
    categories: Option<Vec<ExpenseCategory>>,
    is_active: Option<bool>,
}

impl BudgetArgs {
    fn parse(args: &Value, warnings: &mut LabelWarnings) -> Result<Self> {
        Ok(Self {
            name: optional_string(args, "name")?,
            description: optional_string(args, "description")?,
            amount: optional_positive_amount(args, "amount")?,
            period: warnings.parse(args, "period")?,
            categories: warnings.parse_list(args, "categories")?,
            is_active: optional_bool(args, "is_active")?,
        })
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.amount.is_none()
            && self.period.is_none()
            && self.categories.is_none()
            && self.is_active.is_none()
    }
}

fn budget_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "name".into(),
        json!({"type": "string", "description": "Short name, e.g. \"Groceries\"."}),
    );
    props.insert(
        "description".into(),
        json!({"type": "string", "description": "Optional longer description."}),
    );
    props.insert(
        "amount".into(),
        json!({"type": "number", "description": "Spending limit per period in dollars."}),
    );
    props.insert(
        "period".into(),
        label_schema::<BudgetPeriod>("Budget period. Defaults to monthly."),
    );
    props.insert(
        "categories".into(),
        json!({
            "type": "array",
            "items": label_schema::<ExpenseCategory>("Expense category tracked by this budget."),
            "description": "Expense categories that count against this budget."
        }),
    );
    props.insert(
        "is_active".into(),
        json!({"type": "boolean", "description": "Whether the budget is currently tracked."}),
    );
    props
}

fn describe(b: &Budget) -> String {
    format!(
        "\"{}\" ({} {})",
        b.name,
        format_dollars(b.resolved_amount()),
        BudgetPeriod::from_code(b.period).label()
    )
}

fn category_labels(codes: &[i32]) -> Vec<&'static str> {
    codes
        .iter()
        .map(|code| ExpenseCategory::from_code(*code).label())
        .collect()
}

pub struct ListBudgetsTool {
    ledger: LedgerAccess,
}

impl ListBudgetsTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for ListBudgetsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_budgets".to_string(),
            description: "List the user's budgets with their limits, periods and tracked categories.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
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
            page_size: parse_page_size(args)?,
            page_token: optional_string(args, "page_token")?,
            ..ListFilter::default()
        };
        let page = self
            .ledger
            .call("ListBudgets", self.ledger.service().list_budgets(&filter))
            .await?;
        let budgets: Vec<BudgetView> = page.items.iter().map(BudgetView::from).collect();
        let mut out = json!({
            "budgets": budgets,
            "count": budgets.len(),
            "hasMore": page.has_more(),
        });
        if let Some(token) = page.next_page_token.filter(|t| !t.is_empty()) {
            out["nextPageToken"] = Value::from(token);
        }
        Ok(out)
    }
}

struct CreateBudget<'a> {
    ledger: &'a LedgerAccess,
    budget: Budget,
}

#[async_trait]
impl Mutation for CreateBudget<'_> {
    type Target = ();

    async fn fetch(&self) -> Result<()> {
        Ok(())
    }

    async fn preview(&self, _: &()) -> Result<Outcome> {
        let mut details = to_json(&BudgetView::from(&self.budget));
        if let Value::Object(map) = &mut details {
            map.remove("id");
        }
        Ok(Outcome::previewed(
            body([("details", details)]),
            format!(
                "Ready to create budget {}. Confirm to save it.",
                describe(&self.budget)
            ),
        ))
    }

    async fn apply(&self, _: ()) -> Result<Outcome> {
        let created = self
            .ledger
            .call("CreateBudget", self.ledger.service().create_budget(&self.budget))
            .await?;
        Ok(Outcome::executed(
            body([("budget", to_json(&BudgetView::from(&created)))]),
            format!("Created budget {}.", describe(&created)),
        ))
    }
}

pub struct CreateBudgetTool {
    ledger: LedgerAccess,
}

impl CreateBudgetTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for CreateBudgetTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_budget".to_string(),
            description: "Create a spending budget. First call returns a preview for the user; repeat with confirmed=true after they approve.".to_string(),
            parameters_schema: mutating_schema(budget_properties(), &["name", "amount"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let name = require_string(args, "name")?;
        let fields = BudgetArgs::parse(args, &mut warnings)?;
        let amount = fields
            .amount
            .ok_or_else(|| ToolError::InvalidArguments("missing key: amount".to_string()))?;
        let (amount, amount_cents) = outgoing_pair(amount);
        let budget = Budget {
            id: String::new(),
            user_id: ctx.user_id().to_string(),
            name,
            description: fields.description.unwrap_or_default(),
            amount,
            amount_cents,
            period: fields.period.unwrap_or(BudgetPeriod::Monthly).code(),
            category_ids: fields
                .categories
                .unwrap_or_default()
                .into_iter()
                .map(Label::code)
                .collect(),
            is_active: fields.is_active.unwrap_or(true),
        };
        let mutation = CreateBudget {
            ledger: &self.ledger,
            budget,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct UpdateBudget<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    budget_id: String,
    fields: BudgetArgs,
}

impl UpdateBudget<'_> {
    fn changes(&self, current: &Budget) -> Changes {
        let f = &self.fields;
        let mut changes = Changes::default();
        changes.field("name", current.name.clone(), f.name.clone());
        changes.field(
            "description",
            current.description.clone(),
            f.description.clone(),
        );
        changes.field_with(
            "amount",
            current.resolved_amount(),
            f.amount.map(|a| outgoing_pair(a).0),
            |v| format_dollars(*v),
        );
        changes.field(
            "period",
            BudgetPeriod::from_code(current.period).label(),
            f.period.map(Label::label),
        );
        changes.field(
            "categories",
            category_labels(&current.category_ids),
            f.categories
                .as_ref()
                .map(|c| c.iter().map(|v| v.label()).collect()),
        );
        changes.field("is_active", current.is_active, f.is_active);
        changes
    }

    /// Every field is sent; unspecified ones keep their current value.
    fn build_update(&self, current: &Budget) -> BudgetUpdate {
        let f = &self.fields;
        let (amount, amount_cents) = match f.amount {
            Some(dollars) => outgoing_pair(dollars),
            None => (current.resolved_amount(), current.amount_in_cents()),
        };
        BudgetUpdate {
            user_id: self.user_id.to_string(),
            budget_id: self.budget_id.clone(),
            name: Some(f.name.clone().unwrap_or_else(|| current.name.clone())),
            description: Some(
                f.description
                    .clone()
                    .unwrap_or_else(|| current.description.clone()),
            ),
            amount: Some(amount),
            amount_cents: Some(amount_cents),
            period: Some(f.period.map(Label::code).unwrap_or(current.period)),
            category_ids: Some(match &f.categories {
                Some(categories) => categories.iter().map(|c| c.code()).collect(),
                None => current.category_ids.clone(),
            }),
            is_active: Some(f.is_active.unwrap_or(current.is_active)),
        }
    }
}

#[async_trait]
impl Mutation for UpdateBudget<'_> {
    type Target = Budget;

    async fn fetch(&self) -> Result<Budget> {
        self.ledger
            .call(
                "GetBudget",
                self.ledger.service().get_budget(self.user_id, &self.budget_id),
            )
            .await
    }

    async fn preview(&self, current: &Budget) -> Result<Outcome> {
        let changes = self.changes(current);
        let message = format!(
            "Ready to update budget {}: {}. Confirm to apply.",
            describe(current),
            changes.summary()
        );
        Ok(Outcome::previewed(
            body([
                ("budgetId", Value::from(self.budget_id.clone())),
                ("current", to_json(&BudgetView::from(current))),
                ("changes", changes.into_value()),
            ]),
            message,
        ))
    }

    async fn apply(&self, current: Budget) -> Result<Outcome> {
        let summary = self.changes(&current).summary();
        let update = self.build_update(&current);
        let updated = self
            .ledger
            .call("UpdateBudget", self.ledger.service().update_budget(&update))
            .await?;
        Ok(Outcome::executed(
            body([("budget", to_json(&BudgetView::from(&updated)))]),
            format!("Updated budget \"{}\": {summary}.", updated.name),
        ))
    }
}

pub struct UpdateBudgetTool {
    ledger: LedgerAccess,
}

impl UpdateBudgetTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for UpdateBudgetTool {
    fn spec(&self) -> ToolSpec {
        let mut props = budget_properties();
        props.insert(
            "budget_id".into(),
            json!({"type": "string", "description": "Id of the budget to change."}),
        );
        ToolSpec {
            name: "update_budget".to_string(),
            description: "Change a budget. Pass only the fields that change. First call returns a from/to preview; repeat with confirmed=true after the user approves.".to_string(),
            parameters_schema: mutating_schema(props, &["budget_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let budget_id = require_string(args, "budget_id")?;
        let fields = BudgetArgs::parse(args, &mut warnings)?;
        if fields.is_empty() {
            return Err(ToolError::InvalidArguments(
                "provide at least one field to change".to_string(),
            ));
        }
        let mutation = UpdateBudget {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            budget_id,
            fields,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct DeleteBudget<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    budget_id: String,
}

#[async_trait]
impl Mutation for DeleteBudget<'_> {
    type Target = Budget;

    async fn fetch(&self) -> Result<Budget> {
        self.ledger
            .call(
                "GetBudget",
                self.ledger.service().get_budget(self.user_id, &self.budget_id),
            )
            .await
    }

    async fn preview(&self, current: &Budget) -> Result<Outcome> {
        Ok(Outcome::previewed(
            body([("budget", to_json(&BudgetView::from(current)))]),
            format!(
                "This will permanently delete budget {}. Confirm to delete it.",
                describe(current)
            ),
        ))
    }

    async fn apply(&self, current: Budget) -> Result<Outcome> {
        self.ledger
            .call(
                "DeleteBudget",
                self.ledger
                    .service()
                    .delete_budget(self.user_id, &self.budget_id),
            )
            .await?;
        Ok(Outcome::executed(
            body([("deletedId", Value::from(self.budget_id.clone()))]),
            format!("Deleted budget {}.", describe(&current)),
        ))
    }
}

pub struct DeleteBudgetTool {
    ledger: LedgerAccess,
}

impl DeleteBudgetTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for DeleteBudgetTool {
    fn spec(&self) -> ToolSpec {
        let mut props = Map::new();
        props.insert(
            "budget_id".into(),
            json!({"type": "string", "description": "Id of the budget to delete."}),
        );
        ToolSpec {
            name: "delete_budget".to_string(),
            description: "Delete a budget. First call shows what will be removed; repeat with confirmed=true after the user approves.".to_string(),
            parameters_schema: mutating_schema(props, &["budget_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let mutation = DeleteBudget {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            budget_id: require_string(&invocation.arguments, "budget_id")?,
        };
        Ok(confirm::run(&mutation, invocation.confirmed).await?.into_value())
    }
}
