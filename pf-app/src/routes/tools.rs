use crate::server::GatewayState;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json};
use pf_tools::CapabilityContext;
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/tools", get(list_tools))
        .route("/api/v1/tools/invoke", post(invoke_tool))
}

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_tools(
    Extension(state): Extension<Arc<GatewayState>>,
    Extension(ctx): Extension<CapabilityContext>,
) -> Json<serde_json::Value> {
    let tools = state.registry.definitions(&ctx);
    Json(serde_json::json!({ "tools": tools }))
}

/// Invocation results are always 200; failures are carried in the body.
#[tracing::instrument(level = "info", skip_all)]
async fn invoke_tool(
    Extension(state): Extension<Arc<GatewayState>>,
    Extension(ctx): Extension<CapabilityContext>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "invoke request rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "status": "error",
                    "error": "Invalid request: body must be {\"name\": string, \"arguments\": object}.",
                    "errorKind": "validation",
                })),
            )
                .into_response();
        }
    };
    let result = state
        .registry
        .invoke_call(&ctx, &request.name, request.arguments)
        .await;
    Json(result).into_response()
}

#[cfg(test)]
mod tests {
    use crate::http_auth::{
        SUBSCRIPTION_STATUS_HEADER, SUBSCRIPTION_TIER_HEADER, TrustedProxyPolicy,
        TrustedProxyPolicyExt, USER_ID_HEADER,
    };
    use crate::routes;
    use crate::server::GatewayState;
    use async_trait::async_trait;
    use axum::Extension;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use pf_ledger::{
        Budget, BudgetUpdate, DuplicateCandidateList, DuplicateCheck, Expense, ExpenseUpdate,
        Goal, GoalUpdate, Income, IncomeUpdate, InsightsRequest, LedgerError, LedgerService,
        ListFilter, Page, Result, TaxStatusUpdate, TaxStatusUpdateResult,
    };
    use pf_tools::{LedgerAccess, ToolRegistry};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tower::util::ServiceExt;

    /// Ledger with a single expense; records which user each call was made for.
    #[derive(Default)]
    struct SingleExpenseLedger {
        users: Mutex<Vec<String>>,
        mutations: Mutex<Vec<&'static str>>,
    }

    impl SingleExpenseLedger {
        fn saw(&self, user_id: &str) {
            self.users
                .lock()
                .expect("users lock")
                .push(user_id.to_string());
        }

        fn expense(user_id: &str) -> Expense {
            Expense {
                id: "exp-1".to_string(),
                user_id: user_id.to_string(),
                description: "Coffee".to_string(),
                amount: 5.5,
                amount_cents: 550,
                category: 1,
                frequency: 7,
                ..Expense::default()
            }
        }

        fn mutated(&self, method: &'static str) {
            self.mutations.lock().expect("mutations lock").push(method);
        }
    }

    fn unused<T>() -> Result<T> {
        Err(LedgerError::Transport("not available in this test".to_string()))
    }

    #[async_trait]
    impl LedgerService for SingleExpenseLedger {
        async fn list_expenses(&self, filter: &ListFilter) -> Result<Page<Expense>> {
            self.saw(&filter.user_id);
            Ok(Page {
                items: vec![Self::expense(&filter.user_id)],
                next_page_token: None,
            })
        }
        async fn list_incomes(&self, filter: &ListFilter) -> Result<Page<Income>> {
            self.saw(&filter.user_id);
            Ok(Page {
                items: Vec::new(),
                next_page_token: None,
            })
        }
        async fn list_budgets(&self, _filter: &ListFilter) -> Result<Page<Budget>> {
            unused()
        }
        async fn list_goals(&self, _filter: &ListFilter) -> Result<Page<Goal>> {
            unused()
        }
        async fn get_expense(&self, user_id: &str, expense_id: &str) -> Result<Expense> {
            self.saw(user_id);
            if expense_id == "exp-1" {
                Ok(Self::expense(user_id))
            } else {
                Err(LedgerError::NotFound(format!("expense {expense_id} not found")))
            }
        }
        async fn get_income(&self, _user_id: &str, _income_id: &str) -> Result<Income> {
            unused()
        }
        async fn get_budget(&self, _user_id: &str, _budget_id: &str) -> Result<Budget> {
            unused()
        }
        async fn get_goal(&self, _user_id: &str, _goal_id: &str) -> Result<Goal> {
            unused()
        }
        async fn create_expense(&self, _expense: &Expense) -> Result<Expense> {
            unused()
        }
        async fn update_expense(&self, _update: &ExpenseUpdate) -> Result<Expense> {
            unused()
        }
        async fn delete_expense(&self, user_id: &str, _expense_id: &str) -> Result<()> {
            self.saw(user_id);
            self.mutated("DeleteExpense");
            Ok(())
        }
        async fn create_income(&self, _income: &Income) -> Result<Income> {
            unused()
        }
        async fn update_income(&self, _update: &IncomeUpdate) -> Result<Income> {
            unused()
        }
        async fn delete_income(&self, _user_id: &str, _income_id: &str) -> Result<()> {
            unused()
        }
        async fn create_budget(&self, _budget: &Budget) -> Result<Budget> {
            unused()
        }
        async fn update_budget(&self, _update: &BudgetUpdate) -> Result<Budget> {
            unused()
        }
        async fn delete_budget(&self, _user_id: &str, _budget_id: &str) -> Result<()> {
            unused()
        }
        async fn create_goal(&self, _goal: &Goal) -> Result<Goal> {
            unused()
        }
        async fn update_goal(&self, _update: &GoalUpdate) -> Result<Goal> {
            unused()
        }
        async fn delete_goal(&self, _user_id: &str, _goal_id: &str) -> Result<()> {
            unused()
        }
        async fn check_duplicates(
            &self,
            _check: &DuplicateCheck,
        ) -> Result<HashMap<String, DuplicateCandidateList>> {
            Ok(HashMap::new())
        }
        async fn batch_update_expense_tax_status(
            &self,
            _user_id: &str,
            _updates: &[TaxStatusUpdate],
        ) -> Result<TaxStatusUpdateResult> {
            unused()
        }
        async fn get_spending_insights(
            &self,
            _request: &InsightsRequest,
        ) -> Result<serde_json::Value> {
            unused()
        }
        async fn get_category_comparison(
            &self,
            _request: &InsightsRequest,
        ) -> Result<serde_json::Value> {
            unused()
        }
        async fn detect_anomalies(&self, request: &InsightsRequest) -> Result<serde_json::Value> {
            self.saw(&request.user_id);
            Ok(serde_json::json!({ "anomalies": [] }))
        }
    }

    fn app(ledger: Arc<SingleExpenseLedger>) -> axum::Router {
        let state = Arc::new(GatewayState {
            registry: ToolRegistry::new(LedgerAccess::new(ledger), &[]),
            started_at: Instant::now(),
        });
        routes::router()
            .layer(Extension(TrustedProxyPolicyExt(TrustedProxyPolicy {
                tokens: vec!["proxy-token".to_string()],
            })))
            .layer(Extension(state))
    }

    fn authed(method: &str, uri: &str, tier: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer proxy-token")
            .header(USER_ID_HEADER, "user-42")
            .header(SUBSCRIPTION_TIER_HEADER, tier)
            .header(SUBSCRIPTION_STATUS_HEADER, "ACTIVE");
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    async fn response_body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        serde_json::from_slice(&body).expect("response json")
    }

    fn tool_names(body: &serde_json::Value) -> Vec<String> {
        body["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|t| t["name"].as_str().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn health_needs_no_identity() {
        let response = app(Arc::default())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn tool_list_requires_trusted_proxy() {
        let response = app(Arc::default())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tools")
                    .header(USER_ID_HEADER, "user-42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tool_list_depends_on_subscription() {
        let free = response_body_json(
            app(Arc::default())
                .oneshot(authed("GET", "/api/v1/tools", "FREE", None))
                .await
                .expect("response"),
        )
        .await;
        let pro = response_body_json(
            app(Arc::default())
                .oneshot(authed("GET", "/api/v1/tools", "PRO", None))
                .await
                .expect("response"),
        )
        .await;
        let free = tool_names(&free);
        let pro = tool_names(&pro);
        assert!(free.contains(&"list_expenses".to_string()));
        assert!(!free.contains(&"detect_anomalies".to_string()));
        assert!(pro.contains(&"detect_anomalies".to_string()));
        assert!(pro.contains(&"classify_tax_deductibility".to_string()));
    }

    #[tokio::test]
    async fn invoke_uses_header_identity_not_arguments() {
        let ledger = Arc::new(SingleExpenseLedger::default());
        let response = app(ledger.clone())
            .oneshot(authed(
                "POST",
                "/api/v1/tools/invoke",
                "FREE",
                Some(serde_json::json!({
                    "name": "list_expenses",
                    "arguments": {"user_id": "someone-else", "is_pro": true},
                })),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_body_json(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["totalAmount"], 5.5);
        assert_eq!(*ledger.users.lock().expect("users lock"), vec!["user-42"]);
    }

    #[tokio::test]
    async fn free_caller_cannot_reach_pro_action() {
        let ledger = Arc::new(SingleExpenseLedger::default());
        let response = app(ledger.clone())
            .oneshot(authed(
                "POST",
                "/api/v1/tools/invoke",
                "FREE",
                Some(serde_json::json!({"name": "detect_anomalies", "arguments": {"is_pro": true}})),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_body_json(response).await;
        assert_eq!(body["errorKind"], "unknown_action");
        assert!(ledger.users.lock().expect("users lock").is_empty());
    }

    #[tokio::test]
    async fn delete_previews_then_executes_on_confirmation() {
        let ledger = Arc::new(SingleExpenseLedger::default());
        let preview = response_body_json(
            app(ledger.clone())
                .oneshot(authed(
                    "POST",
                    "/api/v1/tools/invoke",
                    "FREE",
                    Some(serde_json::json!({"name": "delete_expense", "arguments": {"expense_id": "exp-1"}})),
                ))
                .await
                .expect("response"),
        )
        .await;
        assert_eq!(preview["status"], "pending_confirmation");
        assert!(ledger.mutations.lock().expect("mutations lock").is_empty());

        let executed = response_body_json(
            app(ledger.clone())
                .oneshot(authed(
                    "POST",
                    "/api/v1/tools/invoke",
                    "FREE",
                    Some(serde_json::json!({
                        "name": "delete_expense",
                        "arguments": {"expense_id": "exp-1", "confirmed": true},
                    })),
                ))
                .await
                .expect("response"),
        )
        .await;
        assert_eq!(executed["status"], "success");
        assert_eq!(
            *ledger.mutations.lock().expect("mutations lock"),
            vec!["DeleteExpense"]
        );
    }

    #[tokio::test]
    async fn malformed_invoke_body_is_a_validation_error() {
        let response = app(Arc::default())
            .oneshot(authed(
                "POST",
                "/api/v1/tools/invoke",
                "FREE",
                Some(serde_json::json!({"arguments": {}})),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_body_json(response).await;
        assert_eq!(body["errorKind"], "validation");
    }
}
