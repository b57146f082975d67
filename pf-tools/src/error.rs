use pf_ledger::LedgerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("ledger call timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl ToolError {
    /// Stable machine-readable kind, reported next to (never inside) the user-facing message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::UnknownAction(_) => "unknown_action",
            Self::Unauthorized(_) => "unauthorized",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::ExecutionFailed(_) => "execution_failed",
        }
    }

    /// Short sentence suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidArguments(msg) => format!("Invalid request: {msg}."),
            Self::NotFound(msg) => msg.clone(),
            Self::UnknownAction(name) => format!("There is no action named \"{name}\"."),
            Self::Unauthorized(msg) => msg.clone(),
            Self::Timeout(_) => {
                "The ledger service did not respond in time (timeout). Please try again.".to_string()
            }
            Self::Transport(_) => {
                "The ledger service could not be reached. Please try again shortly.".to_string()
            }
            Self::ExecutionFailed(msg) => msg.clone(),
        }
    }
}

impl From<LedgerError> for ToolError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidInput(msg) => Self::InvalidArguments(msg),
            LedgerError::NotFound(msg) => Self::NotFound(if msg.contains("not found") {
                msg
            } else {
                format!("{msg} not found")
            }),
            LedgerError::Timeout => Self::Timeout("ledger rpc deadline exceeded".to_string()),
            LedgerError::Transport(msg) => Self::Transport(msg),
            LedgerError::Status { code, message } => match code.as_str() {
                "permission_denied" | "unauthenticated" => Self::Unauthorized(message),
                "invalid_argument" | "failed_precondition" => Self::InvalidArguments(message),
                _ => Self::ExecutionFailed(message),
            },
            LedgerError::ResponseFormat(msg) => {
                Self::ExecutionFailed(format!("unexpected ledger response: {msg}"))
            }
        }
    }
}
