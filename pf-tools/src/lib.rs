//! Agent-facing action gateway over the personal-finance ledger.
//!
//! Reads execute immediately. Mutations run a preview/confirm protocol: an unconfirmed call
//! returns what would change and never writes. Pro actions are only registered for callers
//! whose verified subscription allows them.

mod batch;
mod capability;
mod confirm;
mod duplicates;
mod error;
mod labels;
mod ledger;
mod money;
mod records;
mod registry;
#[cfg(test)]
mod testing;
mod tools;
mod traits;

pub use batch::{BatchOutcome, ItemError, ItemOutcome, MAX_BATCH_TARGETS};
pub use capability::{
    CapabilityContext, CapabilityGate, SubscriptionStatus, SubscriptionTier, VerifiedIdentity,
};
pub use confirm::ProtocolState;
pub use duplicates::{DuplicateCandidate, Severity};
pub use error::{Result, ToolError};
pub use labels::{
    BudgetPeriod, ExpenseCategory, ExpenseFrequency, GoalStatus, IncomeFrequency, Label,
    TaxDeductionCategory, TaxStatus,
};
pub use ledger::{DEFAULT_BATCH_CONCURRENCY, DEFAULT_CALL_TIMEOUT, LedgerAccess};
pub use money::{Monetary, resolve_amount, to_cents};
pub use registry::ToolRegistry;
pub use tools::*;
pub use traits::{
    DEFAULT_PAGE_SIZE, PAGE_SIZE_CAP, Tool, ToolDefinition, ToolInvocation, ToolKind, ToolSpec,
    ToolTier, to_tool_definition,
};
