use crate::error::Result;
use crate::types::{
    Budget, BudgetUpdate, DuplicateCandidateList, DuplicateCheck, Expense, ExpenseUpdate, Goal,
    GoalUpdate, Income, IncomeUpdate, InsightsRequest, ListFilter, Page, TaxStatusUpdate,
    TaxStatusUpdateResult,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// The RPC surface of the external Ledger Service that the gateway consumes.
///
/// Implementations own transport concerns only. Ownership checks, persistence and similarity
/// search all happen on the other side of this trait.
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn list_expenses(&self, filter: &ListFilter) -> Result<Page<Expense>>;
    async fn list_incomes(&self, filter: &ListFilter) -> Result<Page<Income>>;
    async fn list_budgets(&self, filter: &ListFilter) -> Result<Page<Budget>>;
    async fn list_goals(&self, filter: &ListFilter) -> Result<Page<Goal>>;

    async fn get_expense(&self, user_id: &str, expense_id: &str) -> Result<Expense>;
    async fn get_income(&self, user_id: &str, income_id: &str) -> Result<Income>;
    async fn get_budget(&self, user_id: &str, budget_id: &str) -> Result<Budget>;
    async fn get_goal(&self, user_id: &str, goal_id: &str) -> Result<Goal>;

    async fn create_expense(&self, expense: &Expense) -> Result<Expense>;
    async fn update_expense(&self, update: &ExpenseUpdate) -> Result<Expense>;
    async fn delete_expense(&self, user_id: &str, expense_id: &str) -> Result<()>;

    async fn create_income(&self, income: &Income) -> Result<Income>;
    async fn update_income(&self, update: &IncomeUpdate) -> Result<Income>;
    async fn delete_income(&self, user_id: &str, income_id: &str) -> Result<()>;

    async fn create_budget(&self, budget: &Budget) -> Result<Budget>;
    async fn update_budget(&self, update: &BudgetUpdate) -> Result<Budget>;
    async fn delete_budget(&self, user_id: &str, budget_id: &str) -> Result<()>;

    async fn create_goal(&self, goal: &Goal) -> Result<Goal>;
    async fn update_goal(&self, update: &GoalUpdate) -> Result<Goal>;
    async fn delete_goal(&self, user_id: &str, goal_id: &str) -> Result<()>;

    /// Keyed by probe id (or description when the probe has no id); probes without
    /// matches are absent from the map.
    async fn check_duplicates(
        &self,
        check: &DuplicateCheck,
    ) -> Result<HashMap<String, DuplicateCandidateList>>;

    async fn batch_update_expense_tax_status(
        &self,
        user_id: &str,
        updates: &[TaxStatusUpdate],
    ) -> Result<TaxStatusUpdateResult>;

    async fn get_spending_insights(&self, request: &InsightsRequest) -> Result<serde_json::Value>;
    async fn get_category_comparison(&self, request: &InsightsRequest)
    -> Result<serde_json::Value>;
    async fn detect_anomalies(&self, request: &InsightsRequest) -> Result<serde_json::Value>;
}
