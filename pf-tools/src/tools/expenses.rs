use crate::batch::{BatchExecutor, MAX_BATCH_TARGETS};
use crate::capability::CapabilityContext;
use crate::confirm::{self, Changes, Mutation, Outcome, body, to_json};
use crate::duplicates::{DuplicateDetector, ProposedTransaction, duplicate_warning};
use crate::error::{Result, ToolError};
use crate::labels::{
    ExpenseCategory, ExpenseFrequency, Label, LabelWarnings, TaxDeductionCategory, label_schema,
    require_known,
};
use crate::ledger::LedgerAccess;
use crate::money::{Monetary, cents_to_dollars, format_cents, format_dollars, outgoing_pair};
use crate::records::{ExpenseView, end_of_day, start_of_day};
use crate::traits::{
    Tool, ToolInvocation, ToolKind, ToolSpec, ToolTier, mutating_schema, optional_bool,
    optional_date, optional_f64, optional_string, optional_string_list, parse_page_size,
    require_id_list, require_string,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use pf_ledger::{Expense, ExpenseUpdate, ListFilter};
use serde_json::{Map, Value, json};

/// Fields shared by create and update; every one is optional at parse time.
#[derive(Debug, Default)]
pub(crate) struct ExpenseArgs {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<ExpenseCategory>,
    pub frequency: Option<ExpenseFrequency>,
    pub date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
    pub is_tax_deductible: Option<bool>,
    pub tax_deduction_category: Option<TaxDeductionCategory>,
    pub tax_deductible_percent: Option<f64>,
    pub tax_deduction_note: Option<String>,
}

impl ExpenseArgs {
    fn parse(args: &Value, warnings: &mut LabelWarnings) -> Result<Self> {
        let parsed = Self {
            description: optional_string(args, "description")?,
            amount: optional_positive_amount(args, "amount")?,
            category: warnings.parse(args, "category")?,
            frequency: warnings.parse(args, "frequency")?,
            date: optional_date(args, "date")?,
            tags: optional_string_list(args, "tags")?,
            is_tax_deductible: optional_bool(args, "is_tax_deductible")?,
            tax_deduction_category: warnings.parse(args, "tax_deduction_category")?,
            tax_deductible_percent: optional_f64(args, "tax_deductible_percent")?,
            tax_deduction_note: optional_string(args, "tax_deduction_note")?,
        };
        if let Some(percent) = parsed.tax_deductible_percent {
            validate_percent(percent)?;
        }
        Ok(parsed)
    }

    fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.amount.is_none()
            && self.category.is_none()
            && self.frequency.is_none()
            && self.date.is_none()
            && self.tags.is_none()
            && self.is_tax_deductible.is_none()
            && self.tax_deduction_category.is_none()
            && self.tax_deductible_percent.is_none()
            && self.tax_deduction_note.is_none()
    }
}

pub(crate) fn optional_positive_amount(args: &Value, key: &str) -> Result<Option<f64>> {
    match optional_f64(args, key)? {
        Some(amount) if amount <= 0.0 => Err(ToolError::InvalidArguments(format!(
            "{key} must be greater than zero"
        ))),
        other => Ok(other),
    }
}

pub(crate) fn validate_percent(percent: f64) -> Result<()> {
    if !(percent > 0.0 && percent <= 1.0) {
        return Err(ToolError::InvalidArguments(
            "tax_deductible_percent must be a fraction between 0 (exclusive) and 1".to_string(),
        ));
    }
    Ok(())
}

fn expense_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "description".into(),
        json!({"type": "string", "description": "What the money was spent on, as the user described it."}),
    );
    props.insert(
        "amount".into(),
        json!({"type": "number", "description": "Amount in dollars, e.g. 5.50. Must be positive."}),
    );
    props.insert(
        "category".into(),
        label_schema::<ExpenseCategory>("Spending category. Use \"other\" when unsure."),
    );
    props.insert(
        "frequency".into(),
        label_schema::<ExpenseFrequency>("How often the expense recurs. \"once\" for one-off purchases."),
    );
    props.insert(
        "date".into(),
        json!({"type": "string", "description": "Date of the expense, YYYY-MM-DD. Defaults to today."}),
    );
    props.insert(
        "tags".into(),
        json!({"type": "array", "items": {"type": "string"}, "description": "Optional free-form tags."}),
    );
    props.insert(
        "is_tax_deductible".into(),
        json!({"type": "boolean", "description": "Whether the expense is a work-related tax deduction."}),
    );
    props.insert(
        "tax_deduction_category".into(),
        label_schema::<TaxDeductionCategory>("Deduction category when is_tax_deductible is true."),
    );
    props.insert(
        "tax_deductible_percent".into(),
        json!({"type": "number", "description": "Deductible share as a fraction (0.5 = half). Defaults to 1 when deductible."}),
    );
    props.insert(
        "tax_deduction_note".into(),
        json!({"type": "string", "description": "Short justification for the deduction."}),
    );
    props
}

fn without_id(view: ExpenseView) -> Value {
    let mut value = to_json(&view);
    if let Value::Object(map) = &mut value {
        map.remove("id");
    }
    value
}

fn describe(e: &Expense) -> String {
    match e.date {
        Some(date) => format!(
            "\"{}\" ({} on {})",
            e.description,
            format_dollars(e.resolved_amount()),
            date.format("%Y-%m-%d")
        ),
        None => format!("\"{}\" ({})", e.description, format_dollars(e.resolved_amount())),
    }
}

/// Upper bound on ledger reads for one category-filtered page.
const MAX_FILTERED_FETCHES: usize = 10;

pub struct ListExpensesTool {
    ledger: LedgerAccess,
}

impl ListExpensesTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for ListExpensesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_expenses".to_string(),
            description: "List the user's expenses, newest first, optionally within a date range or category. Returns at most page_size (max 50) per call; with a category, pages are read until page_size matches are found or the ledger runs out. Pass next_page_token back as page_token for more.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "start_date": { "type": "string", "description": "Inclusive start, YYYY-MM-DD." },
                    "end_date": { "type": "string", "description": "Inclusive end, YYYY-MM-DD." },
                    "category": label_schema::<ExpenseCategory>("Only return expenses in this category."),
                    "page_size": { "type": "integer", "minimum": 1, "maximum": 50, "description": "Defaults to 20." },
                    "page_token": { "type": "string", "description": "Continuation token from a previous call." }
                }
            }),
            kind: ToolKind::Read,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let category = optional_string(args, "category")?
            .map(|raw| require_known::<ExpenseCategory>(&raw))
            .transpose()?;
        let page_size = parse_page_size(args)?;
        let mut filter = ListFilter {
            user_id: ctx.user_id().to_string(),
            start_date: optional_date(args, "start_date")?.map(start_of_day),
            end_date: optional_date(args, "end_date")?.map(end_of_day),
            status: None,
            page_size,
            page_token: optional_string(args, "page_token")?,
        };

        // The ledger cannot filter by category, so keep reading until the page is full.
        // Each follow-up fetch asks only for the matches still missing.
        let mut matched: Vec<Expense> = Vec::new();
        let mut fetches = 0;
        let next_page_token = loop {
            let page = self
                .ledger
                .call("ListExpenses", self.ledger.service().list_expenses(&filter))
                .await?;
            fetches += 1;
            let token = page.next_page_token.filter(|t| !t.is_empty());
            matched.extend(
                page.items
                    .into_iter()
                    .filter(|e| category.is_none_or(|c| ExpenseCategory::from_code(e.category) == c)),
            );
            let remaining = (page_size as usize).saturating_sub(matched.len());
            match token {
                Some(token)
                    if category.is_some() && remaining > 0 && fetches < MAX_FILTERED_FETCHES =>
                {
                    filter.page_size = remaining as u32;
                    filter.page_token = Some(token);
                }
                token => break token,
            }
        };
        tracing::debug!(fetches, matched = matched.len(), "listed expenses");

        let expenses: Vec<ExpenseView> = matched.iter().map(ExpenseView::from).collect();
        let total_cents: i64 = matched.iter().map(Monetary::amount_in_cents).sum();
        let has_more = next_page_token.is_some();

        let mut out = json!({
            "expenses": expenses,
            "count": expenses.len(),
            "totalAmount": cents_to_dollars(total_cents),
            "hasMore": has_more,
        });
        if let Some(token) = next_page_token {
            out["nextPageToken"] = Value::from(token);
        }
        Ok(out)
    }
}

struct CreateExpense<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    expense: Expense,
    date: NaiveDate,
}

#[async_trait]
impl Mutation for CreateExpense<'_> {
    type Target = ();

    async fn fetch(&self) -> Result<()> {
        Ok(())
    }

    async fn preview(&self, _: &()) -> Result<Outcome> {
        let mut preview = body([("details", without_id(ExpenseView::from(&self.expense)))]);
        let mut message = format!(
            "Ready to add {} as {}. Confirm to save it.",
            describe(&self.expense),
            ExpenseCategory::from_code(self.expense.category).label()
        );

        let proposed = ProposedTransaction {
            description: self.expense.description.clone(),
            amount: self.expense.resolved_amount(),
            date: Some(self.date),
        };
        let found = DuplicateDetector::new(self.ledger)
            .find_duplicates(self.user_id, &proposed)
            .await;
        if let Some(candidates) = found.filter(|c| !c.is_empty()) {
            if let Some(warning) = duplicate_warning(&candidates) {
                message = format!("{warning} {message}");
                preview.insert("duplicateWarning".to_string(), Value::from(warning));
            }
            preview.insert("duplicates".to_string(), to_json(&candidates));
        }
        Ok(Outcome::previewed(preview, message))
    }

    async fn apply(&self, _: ()) -> Result<Outcome> {
        let created = self
            .ledger
            .call("CreateExpense", self.ledger.service().create_expense(&self.expense))
            .await?;
        Ok(Outcome::executed(
            body([("expense", to_json(&ExpenseView::from(&created)))]),
            format!("Added expense {}.", describe(&created)),
        ))
    }
}

pub struct CreateExpenseTool {
    ledger: LedgerAccess,
}

impl CreateExpenseTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for CreateExpenseTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_expense".to_string(),
            description: "Record a new expense. First call without confirmed to get a preview (including possible duplicates) and show it to the user; call again with confirmed=true only after they approve.".to_string(),
            parameters_schema: mutating_schema(expense_properties(), &["description", "amount"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let description = require_string(args, "description")?;
        let fields = ExpenseArgs::parse(args, &mut warnings)?;
        let amount = fields
            .amount
            .ok_or_else(|| ToolError::InvalidArguments("missing key: amount".to_string()))?;
        let date = fields.date.unwrap_or_else(|| Utc::now().date_naive());
        let (amount, amount_cents) = outgoing_pair(amount);
        let is_tax_deductible = fields.is_tax_deductible.unwrap_or(false);

        let expense = Expense {
            id: String::new(),
            user_id: ctx.user_id().to_string(),
            description,
            amount,
            amount_cents,
            category: fields.category.unwrap_or(ExpenseCategory::Other).code(),
            frequency: fields.frequency.unwrap_or(ExpenseFrequency::Once).code(),
            date: Some(start_of_day(date)),
            tags: fields.tags.unwrap_or_default(),
            is_tax_deductible,
            tax_deduction_category: if is_tax_deductible {
                fields
                    .tax_deduction_category
                    .unwrap_or(TaxDeductionCategory::Other)
                    .code()
            } else {
                0
            },
            tax_deduction_note: fields.tax_deduction_note.unwrap_or_default(),
            tax_deductible_percent: if is_tax_deductible {
                fields.tax_deductible_percent.unwrap_or(1.0)
            } else {
                0.0
            },
        };

        let mutation = CreateExpense {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            expense,
            date,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct UpdateExpense<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    expense_id: String,
    fields: ExpenseArgs,
}

impl UpdateExpense<'_> {
    /// Diffs the outgoing update, so implied tax-field resets show up alongside the
    /// fields the caller named.
    fn changes(&self, current: &Expense, update: &ExpenseUpdate) -> Changes {
        let f = &self.fields;
        let mut changes = Changes::default();
        changes.field("description", current.description.clone(), update.description.clone());
        changes.field_with(
            "amount",
            current.resolved_amount(),
            update.amount,
            |v| format_dollars(*v),
        );
        changes.field(
            "category",
            ExpenseCategory::from_code(current.category).label(),
            update.category.map(|c| ExpenseCategory::from_code(c).label()),
        );
        changes.field(
            "frequency",
            ExpenseFrequency::from_code(current.frequency).label(),
            update.frequency.map(|c| ExpenseFrequency::from_code(c).label()),
        );
        changes.field(
            "date",
            current.date.map(|d| d.format("%Y-%m-%d").to_string()),
            update.date.map(|d| Some(d.format("%Y-%m-%d").to_string())),
        );
        changes.field("tags", current.tags.clone(), update.tags.clone());
        changes.field(
            "is_tax_deductible",
            current.is_tax_deductible,
            (f.is_tax_deductible.is_some()
                || current.is_tax_deductible != update.is_tax_deductible)
            .then_some(update.is_tax_deductible),
        );
        let category_from = current
            .is_tax_deductible
            .then(|| TaxDeductionCategory::from_code(current.tax_deduction_category).label());
        let category_to = update
            .is_tax_deductible
            .then(|| TaxDeductionCategory::from_code(update.tax_deduction_category).label());
        changes.field_with(
            "tax_deduction_category",
            category_from,
            (f.tax_deduction_category.is_some() || category_from != category_to)
                .then_some(category_to),
            |v| v.map_or_else(|| "none".to_string(), |label| format!("\"{label}\"")),
        );
        let percent_from = current
            .is_tax_deductible
            .then_some(current.tax_deductible_percent);
        let percent_to = update
            .is_tax_deductible
            .then_some(update.tax_deductible_percent);
        changes.field_with(
            "tax_deductible_percent",
            percent_from,
            (f.tax_deductible_percent.is_some() || percent_from != percent_to)
                .then_some(percent_to),
            |v| v.map_or_else(|| "none".to_string(), |p| p.to_string()),
        );
        changes.field(
            "tax_deduction_note",
            current.tax_deduction_note.clone(),
            (f.tax_deduction_note.is_some()
                || current.tax_deduction_note != update.tax_deduction_note)
            .then(|| update.tax_deduction_note.clone()),
        );
        changes
    }

    /// The ledger overwrites every tax field on update, so unspecified ones carry forward.
    fn build_update(&self, current: &Expense) -> Result<ExpenseUpdate> {
        let f = &self.fields;
        let (amount, amount_cents) = match f.amount.map(outgoing_pair) {
            Some((dollars, cents)) => (Some(dollars), Some(cents)),
            None => (None, None),
        };
        let is_tax_deductible = f.is_tax_deductible.unwrap_or(current.is_tax_deductible);
        let (tax_deduction_category, tax_deductible_percent) = if is_tax_deductible {
            let category = f
                .tax_deduction_category
                .map(Label::code)
                .unwrap_or(current.tax_deduction_category);
            let percent = f
                .tax_deductible_percent
                .unwrap_or(current.tax_deductible_percent);
            let category = if category == 0 {
                TaxDeductionCategory::Other.code()
            } else {
                category
            };
            (category, if percent > 0.0 { percent } else { 1.0 })
        } else if f.tax_deduction_category.is_some() || f.tax_deductible_percent.is_some() {
            return Err(ToolError::InvalidArguments(
                "tax_deduction_category and tax_deductible_percent only apply to tax-deductible \
                 expenses; set is_tax_deductible to true"
                    .into(),
            ));
        } else {
            (0, 0.0)
        };
        Ok(ExpenseUpdate {
            user_id: self.user_id.to_string(),
            expense_id: self.expense_id.clone(),
            description: f.description.clone(),
            amount,
            amount_cents,
            category: f.category.map(Label::code),
            frequency: f.frequency.map(Label::code),
            date: f.date.map(start_of_day),
            tags: f.tags.clone(),
            is_tax_deductible,
            tax_deduction_category,
            tax_deduction_note: f
                .tax_deduction_note
                .clone()
                .unwrap_or_else(|| current.tax_deduction_note.clone()),
            tax_deductible_percent,
        })
    }
}

#[async_trait]
impl Mutation for UpdateExpense<'_> {
    type Target = Expense;

    async fn fetch(&self) -> Result<Expense> {
        self.ledger
            .call(
                "GetExpense",
                self.ledger.service().get_expense(self.user_id, &self.expense_id),
            )
            .await
    }

    async fn preview(&self, current: &Expense) -> Result<Outcome> {
        let update = self.build_update(current)?;
        let changes = self.changes(current, &update);
        let message = format!(
            "Ready to update {}: {}. Confirm to apply.",
            describe(current),
            changes.summary()
        );
        Ok(Outcome::previewed(
            body([
                ("expenseId", Value::from(self.expense_id.clone())),
                ("current", to_json(&ExpenseView::from(current))),
                ("changes", changes.into_value()),
            ]),
            message,
        ))
    }

    async fn apply(&self, current: Expense) -> Result<Outcome> {
        let update = self.build_update(&current)?;
        let summary = self.changes(&current, &update).summary();
        let updated = self
            .ledger
            .call("UpdateExpense", self.ledger.service().update_expense(&update))
            .await?;
        Ok(Outcome::executed(
            body([("expense", to_json(&ExpenseView::from(&updated)))]),
            format!("Updated \"{}\": {summary}.", updated.description),
        ))
    }
}

pub struct UpdateExpenseTool {
    ledger: LedgerAccess,
}

impl UpdateExpenseTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for UpdateExpenseTool {
    fn spec(&self) -> ToolSpec {
        let mut props = expense_properties();
        props.insert(
            "expense_id".into(),
            json!({"type": "string", "description": "Id of the expense to change, from list_expenses."}),
        );
        ToolSpec {
            name: "update_expense".to_string(),
            description: "Change fields of an existing expense. Only pass the fields that should change. First call returns a from/to preview for the user; repeat with confirmed=true after they approve.".to_string(),
            parameters_schema: mutating_schema(props, &["expense_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let args = &invocation.arguments;
        let mut warnings = LabelWarnings::default();
        let expense_id = require_string(args, "expense_id")?;
        let fields = ExpenseArgs::parse(args, &mut warnings)?;
        if fields.is_empty() {
            return Err(ToolError::InvalidArguments(
                "provide at least one field to change".to_string(),
            ));
        }
        let mutation = UpdateExpense {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            expense_id,
            fields,
        };
        Ok(confirm::run(&mutation, invocation.confirmed)
            .await?
            .with_warnings(warnings.into_vec())
            .into_value())
    }
}

struct DeleteExpense<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    expense_id: String,
}

#[async_trait]
impl Mutation for DeleteExpense<'_> {
    type Target = Expense;

    async fn fetch(&self) -> Result<Expense> {
        self.ledger
            .call(
                "GetExpense",
                self.ledger.service().get_expense(self.user_id, &self.expense_id),
            )
            .await
    }

    async fn preview(&self, current: &Expense) -> Result<Outcome> {
        Ok(Outcome::previewed(
            body([("expense", to_json(&ExpenseView::from(current)))]),
            format!(
                "This will permanently delete {}. Confirm to delete it.",
                describe(current)
            ),
        ))
    }

    async fn apply(&self, current: Expense) -> Result<Outcome> {
        self.ledger
            .call(
                "DeleteExpense",
                self.ledger
                    .service()
                    .delete_expense(self.user_id, &self.expense_id),
            )
            .await?;
        Ok(Outcome::executed(
            body([("deletedId", Value::from(self.expense_id.clone()))]),
            format!("Deleted expense {}.", describe(&current)),
        ))
    }
}

pub struct DeleteExpenseTool {
    ledger: LedgerAccess,
}

impl DeleteExpenseTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for DeleteExpenseTool {
    fn spec(&self) -> ToolSpec {
        let mut props = Map::new();
        props.insert(
            "expense_id".into(),
            json!({"type": "string", "description": "Id of the expense to delete."}),
        );
        ToolSpec {
            name: "delete_expense".to_string(),
            description: "Delete one expense. First call shows the user exactly what will be removed; repeat with confirmed=true after they approve.".to_string(),
            parameters_schema: mutating_schema(props, &["expense_id"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let mutation = DeleteExpense {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            expense_id: require_string(&invocation.arguments, "expense_id")?,
        };
        Ok(confirm::run(&mutation, invocation.confirmed).await?.into_value())
    }
}

struct DeleteExpenses<'a> {
    ledger: &'a LedgerAccess,
    user_id: &'a str,
    expense_ids: Vec<String>,
}

#[async_trait]
impl Mutation for DeleteExpenses<'_> {
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
        let count = resolved.records.len();
        let records: Vec<ExpenseView> = resolved
            .records
            .iter()
            .map(|(_, e)| ExpenseView::from(e))
            .collect();

        let mut message = format!(
            "This will permanently delete {count} expense{} totalling {}.",
            if count == 1 { "" } else { "s" },
            format_cents(total_cents)
        );
        if !resolved.skipped_ids.is_empty() {
            message.push_str(&format!(
                " {} of the requested ids could not be found and will be skipped.",
                resolved.skipped_ids.len()
            ));
        }
        message.push_str(" Confirm to delete them.");

        Ok(Outcome::previewed(
            body([
                ("expenses", to_json(&records)),
                ("count", Value::from(count)),
                ("totalAmount", Value::from(cents_to_dollars(total_cents))),
                ("skippedIds", to_json(&resolved.skipped_ids)),
            ]),
            message,
        ))
    }

    async fn apply(&self, _: ()) -> Result<Outcome> {
        let (ledger, user_id) = (self.ledger, self.user_id);
        let outcome = BatchExecutor::new(ledger.batch_concurrency())
            .execute(&self.expense_ids, |id| async move {
                ledger
                    .call("DeleteExpense", ledger.service().delete_expense(user_id, &id))
                    .await
            })
            .await;
        let message = if outcome.failed_count == 0 {
            format!("Deleted {} expenses.", outcome.succeeded_count)
        } else {
            format!(
                "Deleted {} of {} expenses; {} could not be deleted.",
                outcome.succeeded_count,
                outcome.items.len(),
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

pub struct DeleteExpensesTool {
    ledger: LedgerAccess,
}

impl DeleteExpensesTool {
    pub fn new(ledger: LedgerAccess) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for DeleteExpensesTool {
    fn spec(&self) -> ToolSpec {
        let mut props = Map::new();
        props.insert(
            "expense_ids".into(),
            json!({
                "type": "array",
                "items": {"type": "string"},
                "minItems": 1,
                "maxItems": MAX_BATCH_TARGETS,
                "description": "Ids of the expenses to delete (up to 100)."
            }),
        );
        ToolSpec {
            name: "delete_expenses".to_string(),
            description: "Delete several expenses at once. The preview lists every expense that will be removed and the total; ids that no longer exist are skipped. Repeat with confirmed=true after the user approves. Each deletion succeeds or fails independently.".to_string(),
            parameters_schema: mutating_schema(props, &["expense_ids"]),
            kind: ToolKind::Mutating,
            tier: ToolTier::Base,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, ctx: &CapabilityContext, invocation: &ToolInvocation) -> Result<Value> {
        let mutation = DeleteExpenses {
            ledger: &self.ledger,
            user_id: ctx.user_id(),
            expense_ids: require_id_list(&invocation.arguments, "expense_ids", MAX_BATCH_TARGETS)?,
        };
        Ok(confirm::run(&mutation, invocation.confirmed).await?.into_value())
    }
}
