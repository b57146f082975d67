//! Agent-facing views of ledger records: resolved amounts, labels instead of codes,
//! `YYYY-MM-DD` dates.

use crate::labels::{
    BudgetPeriod, ExpenseCategory, ExpenseFrequency, GoalStatus, IncomeFrequency, Label,
    TaxDeductionCategory, TaxStatus,
};
use crate::money::{Monetary, resolve_amount};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use pf_ledger::{Budget, Expense, Goal, Income};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseView {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub category: &'static str,
    pub frequency: &'static str,
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub is_tax_deductible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_deduction_category: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_deductible_percent: Option<f64>,
}

impl From<&Expense> for ExpenseView {
    fn from(e: &Expense) -> Self {
        Self {
            id: e.id.clone(),
            description: e.description.clone(),
            amount: e.resolved_amount(),
            category: ExpenseCategory::from_code(e.category).label(),
            frequency: ExpenseFrequency::from_code(e.frequency).label(),
            date: format_date(e.date),
            tags: e.tags.clone(),
            is_tax_deductible: e.is_tax_deductible,
            tax_deduction_category: e
                .is_tax_deductible
                .then(|| TaxDeductionCategory::from_code(e.tax_deduction_category).label()),
            tax_deductible_percent: e.is_tax_deductible.then_some(e.tax_deductible_percent),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeView {
    pub id: String,
    pub source: String,
    pub amount: f64,
    pub frequency: &'static str,
    pub tax_status: &'static str,
    pub date: Option<String>,
}

impl From<&Income> for IncomeView {
    fn from(i: &Income) -> Self {
        Self {
            id: i.id.clone(),
            source: i.source.clone(),
            amount: i.resolved_amount(),
            frequency: IncomeFrequency::from_code(i.frequency).label(),
            tax_status: TaxStatus::from_code(i.tax_status).label(),
            date: format_date(i.date),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub amount: f64,
    pub period: &'static str,
    pub categories: Vec<&'static str>,
    pub is_active: bool,
}

impl From<&Budget> for BudgetView {
    fn from(b: &Budget) -> Self {
        Self {
            id: b.id.clone(),
            name: b.name.clone(),
            description: b.description.clone(),
            amount: b.resolved_amount(),
            period: BudgetPeriod::from_code(b.period).label(),
            categories: b
                .category_ids
                .iter()
                .map(|code| ExpenseCategory::from_code(*code).label())
                .collect(),
            is_active: b.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub target_amount: f64,
    pub current_amount: f64,
    /// Whole percent towards the target, capped at 100.
    pub progress_percent: u32,
    pub target_date: Option<String>,
    pub status: &'static str,
}

impl From<&Goal> for GoalView {
    fn from(g: &Goal) -> Self {
        let target = goal_target(g);
        let current = goal_current(g);
        let progress = if target > 0.0 {
            ((current / target) * 100.0).clamp(0.0, 100.0).floor() as u32
        } else {
            0
        };
        Self {
            id: g.id.clone(),
            name: g.name.clone(),
            description: g.description.clone(),
            target_amount: target,
            current_amount: current,
            progress_percent: progress,
            target_date: format_date(g.target_date),
            status: GoalStatus::from_code(g.status).label(),
        }
    }
}

pub fn goal_target(g: &Goal) -> f64 {
    resolve_amount(g.target_amount, g.target_amount_cents)
}

pub fn goal_current(g: &Goal) -> f64 {
    resolve_amount(g.current_amount, g.current_amount_cents)
}

pub fn format_date(date: Option<DateTime<Utc>>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(last).and_utc()
}
