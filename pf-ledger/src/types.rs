//! Wire types for the `pfinance.v1.FinanceService` Connect API.
//!
//! Every money value travels as a pair: a legacy `f64` dollar field and an authoritative
//! `i64` cents field. This crate carries both untouched; resolving them is the gateway's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Only honoured by `ListGoals`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_page_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Expense {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub user_id: String,
    pub description: String,
    pub amount: f64,
    #[serde(deserialize_with = "de_int64")]
    pub amount_cents: i64,
    pub category: i32,
    pub frequency: i32,
    pub date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub is_tax_deductible: bool,
    pub tax_deduction_category: i32,
    pub tax_deduction_note: String,
    pub tax_deductible_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Income {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub user_id: String,
    pub source: String,
    pub amount: f64,
    #[serde(deserialize_with = "de_int64")]
    pub amount_cents: i64,
    pub frequency: i32,
    pub tax_status: i32,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Budget {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub amount: f64,
    #[serde(deserialize_with = "de_int64")]
    pub amount_cents: i64,
    pub period: i32,
    pub category_ids: Vec<i32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Goal {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub target_amount: f64,
    #[serde(deserialize_with = "de_int64")]
    pub target_amount_cents: i64,
    pub current_amount: f64,
    #[serde(deserialize_with = "de_int64")]
    pub current_amount_cents: i64,
    pub target_date: Option<DateTime<Utc>>,
    pub status: i32,
}

/// `UpdateExpense` overwrites the tax-deduction fields on every call, so they are not optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUpdate {
    pub user_id: String,
    pub expense_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub is_tax_deductible: bool,
    pub tax_deduction_category: i32,
    pub tax_deduction_note: String,
    pub tax_deductible_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeUpdate {
    pub user_id: String,
    pub income_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

/// `UpdateBudget` replaces every field, so callers send the complete record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUpdate {
    pub user_id: String,
    pub budget_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_ids: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    pub user_id: String,
    pub goal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_amount_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

/// One prospective transaction sent to `CheckDuplicates`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateProbe {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub amount_cents: i64,
    /// `YYYY-MM-DD`; empty when unknown.
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheck {
    pub user_id: String,
    pub transactions: Vec<DuplicateProbe>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplicateMatch {
    pub existing_expense_id: String,
    pub description: String,
    pub amount: f64,
    #[serde(deserialize_with = "de_int64")]
    pub amount_cents: i64,
    pub date: String,
    pub category: i32,
    pub match_score: f64,
    pub match_reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplicateCandidateList {
    pub candidates: Vec<DuplicateMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxStatusUpdate {
    pub expense_id: String,
    pub is_tax_deductible: bool,
    pub tax_deduction_category: i32,
    pub tax_deduction_note: String,
    pub tax_deductible_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaxStatusUpdateResult {
    pub updated_count: i32,
    pub failed_expense_ids: Vec<String>,
}

/// Shared request shape for the analytics endpoints.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsRequest {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

/// Protobuf JSON encodes int64 as a decimal string; accept both forms.
fn de_int64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64Repr {
        Number(i64),
        Text(String),
    }

    match Int64Repr::deserialize(deserializer)? {
        Int64Repr::Number(value) => Ok(value),
        Int64Repr::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}
