//! Ledger Service RPC client for the pfinance agent gateway.
//!
//! Pure transport crate: wire types, the `LedgerService` seam and a Connect-JSON HTTP client.
//! Nothing here knows about tools, previews or confirmation.

mod client;
mod error;
mod service;
mod types;

pub use client::{HttpLedgerClient, LedgerClientConfig};
pub use error::{LedgerError, Result};
pub use service::LedgerService;
pub use types::{
    Budget, BudgetUpdate, DuplicateCandidateList, DuplicateCheck,
    DuplicateMatch, DuplicateProbe, Expense, ExpenseUpdate, Goal, GoalUpdate, Income, IncomeUpdate,
    InsightsRequest, ListFilter, Page, TaxStatusUpdate, TaxStatusUpdateResult,
};
