//! In-memory `LedgerService` double for handler tests.

use async_trait::async_trait;
use pf_ledger::{
    Budget, BudgetUpdate, DuplicateCandidateList, DuplicateCheck, Expense, ExpenseUpdate, Goal,
    GoalUpdate, Income, IncomeUpdate, InsightsRequest, LedgerError, LedgerService, ListFilter,
    Page, Result, TaxStatusUpdate, TaxStatusUpdateResult,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: String,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub(crate) struct MockLedger {
    expenses: Mutex<BTreeMap<String, Expense>>,
    incomes: Mutex<BTreeMap<String, Income>>,
    budgets: Mutex<BTreeMap<String, Budget>>,
    goals: Mutex<BTreeMap<String, Goal>>,
    duplicates: Mutex<HashMap<String, DuplicateCandidateList>>,
    failures: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
    next_id: AtomicU64,
}

const MUTATING_PREFIXES: [&str; 4] = ["Create", "Update", "Delete", "Batch"];

impl MockLedger {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_expense(self, id: &str, description: &str, amount_cents: i64) -> Self {
        let expense = Expense {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            description: description.to_string(),
            amount: amount_cents as f64 / 100.0,
            amount_cents,
            category: 1,
            frequency: 7,
            ..Expense::default()
        };
        self.put_expense(expense);
        self
    }

    pub fn put_expense(&self, expense: Expense) {
        lock(&self.expenses).insert(expense.id.clone(), expense);
    }

    pub fn put_income(&self, income: Income) {
        lock(&self.incomes).insert(income.id.clone(), income);
    }

    pub fn put_budget(&self, budget: Budget) {
        lock(&self.budgets).insert(budget.id.clone(), budget);
    }

    pub fn put_goal(&self, goal: Goal) {
        lock(&self.goals).insert(goal.id.clone(), goal);
    }

    pub fn with_duplicates(self, key: &str, candidates: DuplicateCandidateList) -> Self {
        lock(&self.duplicates).insert(key.to_string(), candidates);
        self
    }

    /// `id = "*"` fails every call to `method`.
    pub fn fail_on(self, method: &str, id: &str) -> Self {
        lock(&self.failures).insert((method.to_string(), id.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, method: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn mutating_calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| MUTATING_PREFIXES.iter().any(|p| c.method.starts_with(p)))
            .cloned()
            .collect()
    }

    pub fn last_payload(&self, method: &str) -> Option<serde_json::Value> {
        lock(&self.calls)
            .iter()
            .rev()
            .find(|c| c.method == method)
            .map(|c| c.payload.clone())
    }

    async fn enter<P: Serialize>(&self, method: &str, id: &str, payload: &P) -> Result<()> {
        lock(&self.calls).push(RecordedCall {
            method: method.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failures = lock(&self.failures);
        if failures.contains(&(method.to_string(), id.to_string()))
            || failures.contains(&(method.to_string(), "*".to_string()))
        {
            return Err(LedgerError::Status {
                code: "internal".to_string(),
                message: format!("{method} failed for {id}"),
            });
        }
        Ok(())
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{prefix}-new-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().expect("mock ledger lock")
}

fn page_of<T: Clone>(items: Vec<T>, filter: &ListFilter) -> Page<T> {
    let offset: usize = filter
        .page_token
        .as_deref()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let size = filter.page_size.max(1) as usize;
    let end = (offset + size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    Page {
        items: items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default(),
        next_page_token: next,
    }
}

fn in_range(date: Option<chrono::DateTime<chrono::Utc>>, filter: &ListFilter) -> bool {
    let Some(date) = date else {
        return filter.start_date.is_none() && filter.end_date.is_none();
    };
    filter.start_date.is_none_or(|s| date >= s) && filter.end_date.is_none_or(|e| date <= e)
}

fn not_found(kind: &str, id: &str) -> LedgerError {
    LedgerError::NotFound(format!("{kind} {id} not found"))
}

#[async_trait]
impl LedgerService for MockLedger {
    async fn list_expenses(&self, filter: &ListFilter) -> Result<Page<Expense>> {
        self.enter("ListExpenses", "", filter).await?;
        let items = lock(&self.expenses)
            .values()
            .filter(|e| in_range(e.date, filter))
            .cloned()
            .collect();
        Ok(page_of(items, filter))
    }

    async fn list_incomes(&self, filter: &ListFilter) -> Result<Page<Income>> {
        self.enter("ListIncomes", "", filter).await?;
        let items = lock(&self.incomes)
            .values()
            .filter(|i| in_range(i.date, filter))
            .cloned()
            .collect();
        Ok(page_of(items, filter))
    }

    async fn list_budgets(&self, filter: &ListFilter) -> Result<Page<Budget>> {
        self.enter("ListBudgets", "", filter).await?;
        let items = lock(&self.budgets).values().cloned().collect();
        Ok(page_of(items, filter))
    }

    async fn list_goals(&self, filter: &ListFilter) -> Result<Page<Goal>> {
        self.enter("ListGoals", "", filter).await?;
        let items = lock(&self.goals)
            .values()
            .filter(|g| filter.status.is_none_or(|s| g.status == s))
            .cloned()
            .collect();
        Ok(page_of(items, filter))
    }

    async fn get_expense(&self, user_id: &str, expense_id: &str) -> Result<Expense> {
        self.enter("GetExpense", expense_id, &user_id).await?;
        lock(&self.expenses)
            .get(expense_id)
            .cloned()
            .ok_or_else(|| not_found("expense", expense_id))
    }

    async fn get_income(&self, user_id: &str, income_id: &str) -> Result<Income> {
        self.enter("GetIncome", income_id, &user_id).await?;
        lock(&self.incomes)
            .get(income_id)
            .cloned()
            .ok_or_else(|| not_found("income", income_id))
    }

    async fn get_budget(&self, user_id: &str, budget_id: &str) -> Result<Budget> {
        self.enter("GetBudget", budget_id, &user_id).await?;
        lock(&self.budgets)
            .get(budget_id)
            .cloned()
            .ok_or_else(|| not_found("budget", budget_id))
    }

    async fn get_goal(&self, user_id: &str, goal_id: &str) -> Result<Goal> {
        self.enter("GetGoal", goal_id, &user_id).await?;
        lock(&self.goals)
            .get(goal_id)
            .cloned()
            .ok_or_else(|| not_found("goal", goal_id))
    }

    async fn create_expense(&self, expense: &Expense) -> Result<Expense> {
        self.enter("CreateExpense", &expense.id, expense).await?;
        let mut created = expense.clone();
        created.id = self.fresh_id("exp");
        self.put_expense(created.clone());
        Ok(created)
    }

    async fn update_expense(&self, update: &ExpenseUpdate) -> Result<Expense> {
        self.enter("UpdateExpense", &update.expense_id, update).await?;
        let mut expenses = lock(&self.expenses);
        let current = expenses
            .get_mut(&update.expense_id)
            .ok_or_else(|| not_found("expense", &update.expense_id))?;
        if let Some(description) = &update.description {
            current.description = description.clone();
        }
        if let (Some(amount), Some(cents)) = (update.amount, update.amount_cents) {
            current.amount = amount;
            current.amount_cents = cents;
        }
        if let Some(category) = update.category {
            current.category = category;
        }
        if let Some(frequency) = update.frequency {
            current.frequency = frequency;
        }
        if update.date.is_some() {
            current.date = update.date;
        }
        if let Some(tags) = &update.tags {
            current.tags = tags.clone();
        }
        current.is_tax_deductible = update.is_tax_deductible;
        current.tax_deduction_category = update.tax_deduction_category;
        current.tax_deduction_note = update.tax_deduction_note.clone();
        current.tax_deductible_percent = update.tax_deductible_percent;
        Ok(current.clone())
    }

    async fn delete_expense(&self, user_id: &str, expense_id: &str) -> Result<()> {
        self.enter("DeleteExpense", expense_id, &user_id).await?;
        lock(&self.expenses)
            .remove(expense_id)
            .map(|_| ())
            .ok_or_else(|| not_found("expense", expense_id))
    }

    async fn create_income(&self, income: &Income) -> Result<Income> {
        self.enter("CreateIncome", &income.id, income).await?;
        let mut created = income.clone();
        created.id = self.fresh_id("inc");
        self.put_income(created.clone());
        Ok(created)
    }

    async fn update_income(&self, update: &IncomeUpdate) -> Result<Income> {
        self.enter("UpdateIncome", &update.income_id, update).await?;
        let mut incomes = lock(&self.incomes);
        let current = incomes
            .get_mut(&update.income_id)
            .ok_or_else(|| not_found("income", &update.income_id))?;
        if let Some(source) = &update.source {
            current.source = source.clone();
        }
        if let (Some(amount), Some(cents)) = (update.amount, update.amount_cents) {
            current.amount = amount;
            current.amount_cents = cents;
        }
        if let Some(frequency) = update.frequency {
            current.frequency = frequency;
        }
        if let Some(tax_status) = update.tax_status {
            current.tax_status = tax_status;
        }
        if update.date.is_some() {
            current.date = update.date;
        }
        Ok(current.clone())
    }

    async fn delete_income(&self, user_id: &str, income_id: &str) -> Result<()> {
        self.enter("DeleteIncome", income_id, &user_id).await?;
        lock(&self.incomes)
            .remove(income_id)
            .map(|_| ())
            .ok_or_else(|| not_found("income", income_id))
    }

    async fn create_budget(&self, budget: &Budget) -> Result<Budget> {
        self.enter("CreateBudget", &budget.id, budget).await?;
        let mut created = budget.clone();
        created.id = self.fresh_id("bud");
        self.put_budget(created.clone());
        Ok(created)
    }

    async fn update_budget(&self, update: &BudgetUpdate) -> Result<Budget> {
        self.enter("UpdateBudget", &update.budget_id, update).await?;
        let mut budgets = lock(&self.budgets);
        let current = budgets
            .get_mut(&update.budget_id)
            .ok_or_else(|| not_found("budget", &update.budget_id))?;
        if let Some(name) = &update.name {
            current.name = name.clone();
        }
        if let Some(description) = &update.description {
            current.description = description.clone();
        }
        if let (Some(amount), Some(cents)) = (update.amount, update.amount_cents) {
            current.amount = amount;
            current.amount_cents = cents;
        }
        if let Some(period) = update.period {
            current.period = period;
        }
        if let Some(category_ids) = &update.category_ids {
            current.category_ids = category_ids.clone();
        }
        if let Some(is_active) = update.is_active {
            current.is_active = is_active;
        }
        Ok(current.clone())
    }

    async fn delete_budget(&self, user_id: &str, budget_id: &str) -> Result<()> {
        self.enter("DeleteBudget", budget_id, &user_id).await?;
        lock(&self.budgets)
            .remove(budget_id)
            .map(|_| ())
            .ok_or_else(|| not_found("budget", budget_id))
    }

    async fn create_goal(&self, goal: &Goal) -> Result<Goal> {
        self.enter("CreateGoal", &goal.id, goal).await?;
        let mut created = goal.clone();
        created.id = self.fresh_id("goal");
        self.put_goal(created.clone());
        Ok(created)
    }

    async fn update_goal(&self, update: &GoalUpdate) -> Result<Goal> {
        self.enter("UpdateGoal", &update.goal_id, update).await?;
        let mut goals = lock(&self.goals);
        let current = goals
            .get_mut(&update.goal_id)
            .ok_or_else(|| not_found("goal", &update.goal_id))?;
        if let Some(name) = &update.name {
            current.name = name.clone();
        }
        if let Some(description) = &update.description {
            current.description = description.clone();
        }
        if let (Some(amount), Some(cents)) = (update.target_amount, update.target_amount_cents) {
            current.target_amount = amount;
            current.target_amount_cents = cents;
        }
        if update.target_date.is_some() {
            current.target_date = update.target_date;
        }
        if let Some(status) = update.status {
            current.status = status;
        }
        Ok(current.clone())
    }

    async fn delete_goal(&self, user_id: &str, goal_id: &str) -> Result<()> {
        self.enter("DeleteGoal", goal_id, &user_id).await?;
        lock(&self.goals)
            .remove(goal_id)
            .map(|_| ())
            .ok_or_else(|| not_found("goal", goal_id))
    }

    async fn check_duplicates(
        &self,
        check: &DuplicateCheck,
    ) -> Result<HashMap<String, DuplicateCandidateList>> {
        self.enter("CheckDuplicates", "", check).await?;
        Ok(lock(&self.duplicates).clone())
    }

    async fn batch_update_expense_tax_status(
        &self,
        user_id: &str,
        updates: &[TaxStatusUpdate],
    ) -> Result<TaxStatusUpdateResult> {
        self.enter(
            "BatchUpdateExpenseTaxStatus",
            "",
            &serde_json::json!({"userId": user_id, "updates": updates}),
        )
        .await?;
        let failures = lock(&self.failures).clone();
        let mut expenses = lock(&self.expenses);
        let mut result = TaxStatusUpdateResult::default();
        for update in updates {
            let injected = failures.contains(&(
                "BatchUpdateExpenseTaxStatus".to_string(),
                update.expense_id.clone(),
            ));
            match expenses.get_mut(&update.expense_id) {
                Some(expense) if !injected => {
                    expense.is_tax_deductible = update.is_tax_deductible;
                    expense.tax_deduction_category = update.tax_deduction_category;
                    expense.tax_deduction_note = update.tax_deduction_note.clone();
                    expense.tax_deductible_percent = update.tax_deductible_percent;
                    result.updated_count += 1;
                }
                _ => result.failed_expense_ids.push(update.expense_id.clone()),
            }
        }
        Ok(result)
    }

    async fn get_spending_insights(&self, request: &InsightsRequest) -> Result<serde_json::Value> {
        self.enter("GetSpendingInsights", "", request).await?;
        Ok(serde_json::json!({"insights": [], "userId": request.user_id}))
    }

    async fn get_category_comparison(
        &self,
        request: &InsightsRequest,
    ) -> Result<serde_json::Value> {
        self.enter("GetCategoryComparison", "", request).await?;
        Ok(serde_json::json!({"categories": [], "userId": request.user_id}))
    }

    async fn detect_anomalies(&self, request: &InsightsRequest) -> Result<serde_json::Value> {
        self.enter("DetectAnomalies", "", request).await?;
        Ok(serde_json::json!({"anomalies": [], "userId": request.user_id}))
    }
}
