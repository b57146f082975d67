use crate::error::{LedgerError, Result};
use crate::service::LedgerService;
use crate::types::{
    Budget, BudgetUpdate, DuplicateCandidateList, DuplicateCheck, Expense, ExpenseUpdate, Goal,
    GoalUpdate, Income, IncomeUpdate, InsightsRequest, ListFilter, Page, TaxStatusUpdate,
    TaxStatusUpdateResult,
};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

const SERVICE_PATH: &str = "pfinance.v1.FinanceService";
const CONNECT_PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

/// Connect unary-JSON client for the Ledger Service.
#[derive(Clone)]
pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerClientConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(LedgerError::InvalidInput(
                "ledger base_url is required".to_string(),
            ));
        }
        Url::parse(&base_url)
            .map_err(|e| LedgerError::InvalidInput(format!("invalid ledger base_url: {e}")))?;
        if config.request_timeout.is_zero() {
            return Err(LedgerError::InvalidInput(
                "ledger request timeout must be > 0".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let api_token = config
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);

        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        Url::parse(&format!("{}/{SERVICE_PATH}/{method}", self.base_url))
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))
    }

    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn unary<B>(&self, method: &str, body: &B) -> Result<serde_json::Value>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.method_url(method)?;
        let mut req = self
            .http
            .post(url)
            .header("Connect-Protocol-Version", CONNECT_PROTOCOL_VERSION)
            .json(body);
        if let Some(token) = self.api_token.as_deref() {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| {
            tracing::warn!(method, error = %e, "ledger rpc transport failure");
            LedgerError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response body>".to_string());
            tracing::warn!(method, status = status.as_u16(), "ledger rpc returned error status");
            return Err(decode_connect_error(status, &body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        method: &str,
        field: &str,
        filter: &ListFilter,
    ) -> Result<Page<T>> {
        let body = self.unary(method, filter).await?;
        let items = match body.get(field) {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())?,
        };
        let next_page_token = body
            .get("nextPageToken")
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        Ok(Page {
            items,
            next_page_token,
        })
    }

    async fn record<T, B>(&self, method: &str, field: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let payload = self.unary(method, body).await?;
        let record = payload.get(field).cloned().ok_or_else(|| {
            LedgerError::ResponseFormat(format!("{method} response missing {field}"))
        })?;
        Ok(serde_json::from_value(record)?)
    }
}

#[async_trait]
impl LedgerService for HttpLedgerClient {
    async fn list_expenses(&self, filter: &ListFilter) -> Result<Page<Expense>> {
        self.list("ListExpenses", "expenses", filter).await
    }

    async fn list_incomes(&self, filter: &ListFilter) -> Result<Page<Income>> {
        self.list("ListIncomes", "incomes", filter).await
    }

    async fn list_budgets(&self, filter: &ListFilter) -> Result<Page<Budget>> {
        self.list("ListBudgets", "budgets", filter).await
    }

    async fn list_goals(&self, filter: &ListFilter) -> Result<Page<Goal>> {
        self.list("ListGoals", "goals", filter).await
    }

    async fn get_expense(&self, user_id: &str, expense_id: &str) -> Result<Expense> {
        let body = json!({ "userId": user_id, "expenseId": expense_id });
        self.record("GetExpense", "expense", &body).await
    }

    async fn get_income(&self, user_id: &str, income_id: &str) -> Result<Income> {
        let body = json!({ "userId": user_id, "incomeId": income_id });
        self.record("GetIncome", "income", &body).await
    }

    async fn get_budget(&self, user_id: &str, budget_id: &str) -> Result<Budget> {
        let body = json!({ "userId": user_id, "budgetId": budget_id });
        self.record("GetBudget", "budget", &body).await
    }

    async fn get_goal(&self, user_id: &str, goal_id: &str) -> Result<Goal> {
        let body = json!({ "userId": user_id, "goalId": goal_id });
        self.record("GetGoal", "goal", &body).await
    }

    async fn create_expense(&self, expense: &Expense) -> Result<Expense> {
        self.record("CreateExpense", "expense", expense).await
    }

    async fn update_expense(&self, update: &ExpenseUpdate) -> Result<Expense> {
        self.record("UpdateExpense", "expense", update).await
    }

    async fn delete_expense(&self, user_id: &str, expense_id: &str) -> Result<()> {
        let body = json!({ "userId": user_id, "expenseId": expense_id });
        self.unary("DeleteExpense", &body).await.map(|_| ())
    }

    async fn create_income(&self, income: &Income) -> Result<Income> {
        self.record("CreateIncome", "income", income).await
    }

    async fn update_income(&self, update: &IncomeUpdate) -> Result<Income> {
        self.record("UpdateIncome", "income", update).await
    }

    async fn delete_income(&self, user_id: &str, income_id: &str) -> Result<()> {
        let body = json!({ "userId": user_id, "incomeId": income_id });
        self.unary("DeleteIncome", &body).await.map(|_| ())
    }

    async fn create_budget(&self, budget: &Budget) -> Result<Budget> {
        self.record("CreateBudget", "budget", budget).await
    }

    async fn update_budget(&self, update: &BudgetUpdate) -> Result<Budget> {
        self.record("UpdateBudget", "budget", update).await
    }

    async fn delete_budget(&self, user_id: &str, budget_id: &str) -> Result<()> {
        let body = json!({ "userId": user_id, "budgetId": budget_id });
        self.unary("DeleteBudget", &body).await.map(|_| ())
    }

    async fn create_goal(&self, goal: &Goal) -> Result<Goal> {
        self.record("CreateGoal", "goal", goal).await
    }

    async fn update_goal(&self, update: &GoalUpdate) -> Result<Goal> {
        self.record("UpdateGoal", "goal", update).await
    }

    async fn delete_goal(&self, user_id: &str, goal_id: &str) -> Result<()> {
        let body = json!({ "userId": user_id, "goalId": goal_id });
        self.unary("DeleteGoal", &body).await.map(|_| ())
    }

    async fn check_duplicates(
        &self,
        check: &DuplicateCheck,
    ) -> Result<HashMap<String, DuplicateCandidateList>> {
        let payload = self.unary("CheckDuplicates", check).await?;
        match payload.get("duplicates") {
            None | Some(serde_json::Value::Null) => Ok(HashMap::new()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }

    async fn batch_update_expense_tax_status(
        &self,
        user_id: &str,
        updates: &[TaxStatusUpdate],
    ) -> Result<TaxStatusUpdateResult> {
        let body = json!({ "userId": user_id, "updates": updates });
        let payload = self.unary("BatchUpdateExpenseTaxStatus", &body).await?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn get_spending_insights(&self, request: &InsightsRequest) -> Result<serde_json::Value> {
        self.unary("GetSpendingInsights", request).await
    }

    async fn get_category_comparison(
        &self,
        request: &InsightsRequest,
    ) -> Result<serde_json::Value> {
        self.unary("GetCategoryComparison", request).await
    }

    async fn detect_anomalies(&self, request: &InsightsRequest) -> Result<serde_json::Value> {
        self.unary("DetectAnomalies", request).await
    }
}

#[derive(Debug, Deserialize)]
struct ConnectErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn decode_connect_error(status: reqwest::StatusCode, body: &str) -> LedgerError {
    let parsed: Option<ConnectErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(err) if !err.code.is_empty() => (err.code, err.message),
        _ => (
            status
                .canonical_reason()
                .unwrap_or("unknown")
                .to_ascii_lowercase()
                .replace(' ', "_"),
            body.trim().to_string(),
        ),
    };

    match code.as_str() {
        "not_found" => LedgerError::NotFound(message),
        "deadline_exceeded" => LedgerError::Timeout,
        "unavailable" => LedgerError::Transport(message),
        _ if status.is_server_error() && code != "internal" => LedgerError::Transport(message),
        _ => LedgerError::Status { code, message },
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpLedgerClient, LedgerClientConfig, decode_connect_error};
    use crate::error::LedgerError;
    use crate::service::LedgerService;
    use crate::types::ListFilter;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> LedgerClientConfig {
        LedgerClientConfig {
            base_url: base_url.to_string(),
            api_token: Some("svc-token".to_string()),
            request_timeout: Duration::from_secs(5),
        }
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            read_full_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}")
    }

    async fn read_full_request(socket: &mut tokio::net::TcpStream) {
        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(n) = socket.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            received.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&received);
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.trim()
                        .eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if received.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }

    #[test]
    fn new_rejects_empty_base_url() {
        let err = HttpLedgerClient::new(&config("  ")).err().expect("empty base url");
        assert!(err.to_string().contains("base_url is required"));
    }

    #[test]
    fn method_url_appends_service_path() {
        let client = HttpLedgerClient::new(&config("http://ledger.local:8080/")).expect("client");
        let url = client.method_url("ListExpenses").expect("url");
        assert_eq!(
            url.as_str(),
            "http://ledger.local:8080/pfinance.v1.FinanceService/ListExpenses"
        );
    }

    #[test]
    fn connect_not_found_maps_to_not_found() {
        let err = decode_connect_error(
            reqwest::StatusCode::NOT_FOUND,
            r#"{"code":"not_found","message":"expense not found"}"#,
        );
        match err {
            LedgerError::NotFound(msg) => assert_eq!(msg, "expense not found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bare_gateway_error_maps_to_transport() {
        let err = decode_connect_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, LedgerError::Transport(_)));
    }

    #[test]
    fn permission_denied_keeps_status_code() {
        let err = decode_connect_error(
            reqwest::StatusCode::FORBIDDEN,
            r#"{"code":"permission_denied","message":"cannot delete another user's expense"}"#,
        );
        match err {
            LedgerError::Status { code, message } => {
                assert_eq!(code, "permission_denied");
                assert!(message.contains("another user's"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_expenses_decodes_page_and_token() {
        let base = serve_once(
            "200 OK",
            r#"{"expenses":[{"id":"exp-1","description":"Coffee","amount":5.5,"amountCents":"550"}],"nextPageToken":"p2"}"#,
        )
        .await;
        let client = HttpLedgerClient::new(&config(&base)).expect("client");
        let page = client
            .list_expenses(&ListFilter {
                user_id: "user-1".to_string(),
                page_size: 20,
                ..ListFilter::default()
            })
            .await
            .expect("list expenses");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].amount_cents, 550);
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn get_expense_surfaces_not_found() {
        let base = serve_once(
            "404 Not Found",
            r#"{"code":"not_found","message":"expense not found"}"#,
        )
        .await;
        let client = HttpLedgerClient::new(&config(&base)).expect("client");
        let err = client
            .get_expense("user-1", "missing")
            .await
            .expect_err("missing expense");
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_accepts_empty_message() {
        let base = serve_once("200 OK", "{}").await;
        let client = HttpLedgerClient::new(&config(&base)).expect("client");
        client
            .delete_expense("user-1", "exp-1")
            .await
            .expect("delete expense");
    }
}
