use crate::capability::{CapabilityContext, CapabilityGate};
use crate::error::{Result, ToolError};
use crate::ledger::LedgerAccess;
use crate::tools::{
    AnalyticsTool, ClassifyTaxDeductibilityTool, CreateBudgetTool, CreateExpenseTool,
    CreateGoalTool, CreateIncomeTool, DeleteBudgetTool, DeleteExpenseTool, DeleteExpensesTool,
    DeleteGoalTool, DeleteIncomeTool, FinancialSummaryTool, ListBudgetsTool, ListExpensesTool,
    ListGoalsTool, ListIncomesTool, UpdateBudgetTool, UpdateExpenseTool, UpdateGoalTool,
    UpdateIncomeTool,
};
use crate::traits::{Tool, ToolDefinition, ToolInvocation, ToolKind, ToolSpec, ToolTier};
use std::sync::Arc;

struct RegisteredTool {
    spec: ToolSpec,
    tool: Arc<dyn Tool>,
}

/// Named actions visible to the agent. The base set is always present; the pro extension
/// is merged in only for entitled callers.
#[derive(Default)]
pub struct ToolRegistry {
    base: Vec<RegisteredTool>,
    pro: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Every built-in action except those named in `disabled`.
    pub fn new(ledger: LedgerAccess, disabled: &[String]) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ListExpensesTool::new(ledger.clone())),
            Arc::new(ListIncomesTool::new(ledger.clone())),
            Arc::new(ListBudgetsTool::new(ledger.clone())),
            Arc::new(ListGoalsTool::new(ledger.clone())),
            Arc::new(FinancialSummaryTool::new(ledger.clone())),
            Arc::new(CreateExpenseTool::new(ledger.clone())),
            Arc::new(UpdateExpenseTool::new(ledger.clone())),
            Arc::new(DeleteExpenseTool::new(ledger.clone())),
            Arc::new(DeleteExpensesTool::new(ledger.clone())),
            Arc::new(CreateIncomeTool::new(ledger.clone())),
            Arc::new(UpdateIncomeTool::new(ledger.clone())),
            Arc::new(DeleteIncomeTool::new(ledger.clone())),
            Arc::new(CreateBudgetTool::new(ledger.clone())),
            Arc::new(UpdateBudgetTool::new(ledger.clone())),
            Arc::new(DeleteBudgetTool::new(ledger.clone())),
            Arc::new(CreateGoalTool::new(ledger.clone())),
            Arc::new(UpdateGoalTool::new(ledger.clone())),
            Arc::new(DeleteGoalTool::new(ledger.clone())),
            Arc::new(AnalyticsTool::spending_insights(ledger.clone())),
            Arc::new(AnalyticsTool::category_comparison(ledger.clone())),
            Arc::new(AnalyticsTool::anomalies(ledger.clone())),
            Arc::new(ClassifyTaxDeductibilityTool::new(ledger)),
        ];

        let mut registry = Self::default();
        for tool in tools {
            if disabled.iter().any(|name| *name == tool.spec().name) {
                tracing::info!(tool = %tool.spec().name, "action disabled by configuration");
                continue;
            }
            registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let spec = tool.spec();
        let entry = RegisteredTool { spec, tool };
        match entry.spec.tier {
            ToolTier::Base => self.base.push(entry),
            ToolTier::Pro => self.pro.push(entry),
        }
    }

    fn visible<'a>(
        &'a self,
        ctx: &'a CapabilityContext,
    ) -> impl Iterator<Item = &'a RegisteredTool> + 'a {
        self.base
            .iter()
            .chain(self.pro.iter())
            .filter(move |entry| CapabilityGate::is_available(&entry.spec, ctx))
    }

    pub fn names(&self, ctx: &CapabilityContext) -> Vec<String> {
        self.visible(ctx).map(|e| e.spec.name.clone()).collect()
    }

    pub fn kind_of(&self, name: &str) -> Option<ToolKind> {
        self.base
            .iter()
            .chain(self.pro.iter())
            .find(|e| e.spec.name == name)
            .map(|e| e.spec.kind)
    }

    pub fn definitions(&self, ctx: &CapabilityContext) -> Vec<ToolDefinition> {
        self.visible(ctx)
            .map(|e| ToolDefinition {
                name: e.spec.name.clone(),
                description: e.spec.description.clone(),
                parameters: e.spec.parameters_schema.clone(),
            })
            .collect()
    }

    /// Typed result; pro actions look exactly like unknown ones to callers without entitlement.
    pub async fn try_invoke(
        &self,
        ctx: &CapabilityContext,
        invocation: &ToolInvocation,
    ) -> Result<serde_json::Value> {
        let Some(entry) = self.visible(ctx).find(|e| e.spec.name == invocation.name) else {
            if self.pro.iter().any(|e| e.spec.name == invocation.name) {
                tracing::info!(tool = %invocation.name, "pro action requested without entitlement");
            }
            return Err(ToolError::UnknownAction(invocation.name.clone()));
        };
        entry.tool.execute(ctx, invocation).await
    }

    /// Never fails: errors become `{status: "error", error, errorKind}`.
    pub async fn invoke(
        &self,
        ctx: &CapabilityContext,
        invocation: &ToolInvocation,
    ) -> serde_json::Value {
        tracing::info!(tool = %invocation.name, confirmed = invocation.confirmed, "tool invocation started");
        match self.try_invoke(ctx, invocation).await {
            Ok(value) => {
                let status = value
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("ok");
                tracing::info!(tool = %invocation.name, status, "tool invocation finished");
                value
            }
            Err(e) => {
                tracing::info!(tool = %invocation.name, error_kind = e.kind(), error = %e, "tool invocation failed");
                self.error_value(ctx, &e)
            }
        }
    }

    /// Entry point for raw agent output: `confirmed` is taken from the arguments.
    pub async fn invoke_call(
        &self,
        ctx: &CapabilityContext,
        name: &str,
        arguments: serde_json::Value,
    ) -> serde_json::Value {
        match ToolInvocation::from_call(name, arguments) {
            Ok(invocation) => self.invoke(ctx, &invocation).await,
            Err(e) => self.error_value(ctx, &e),
        }
    }

    fn error_value(&self, ctx: &CapabilityContext, e: &ToolError) -> serde_json::Value {
        let mut out = serde_json::json!({
            "status": "error",
            "error": e.user_message(),
            "errorKind": e.kind(),
        });
        if matches!(e, ToolError::UnknownAction(_)) {
            out["availableActions"] = serde_json::json!(self.names(ctx));
        }
        out
    }
}
