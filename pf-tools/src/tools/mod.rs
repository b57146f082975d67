mod analytics;
mod budgets;
mod expenses;
mod goals;
mod incomes;
mod summary;

pub use analytics::{AnalyticsTool, ClassifyTaxDeductibilityTool};
pub use budgets::{CreateBudgetTool, DeleteBudgetTool, ListBudgetsTool, UpdateBudgetTool};
pub use expenses::{
    CreateExpenseTool, DeleteExpenseTool, DeleteExpensesTool, ListExpensesTool, UpdateExpenseTool,
};
pub use goals::{CreateGoalTool, DeleteGoalTool, ListGoalsTool, UpdateGoalTool};
pub use incomes::{CreateIncomeTool, DeleteIncomeTool, ListIncomesTool, UpdateIncomeTool};
pub use summary::FinancialSummaryTool;
