//! Two-phase preview/execute protocol shared by every mutating action.
//!
//! Stateless across turns: a preview is recomputed from the ledger each time, and an execute
//! call performs the mutation directly from its own arguments.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Previewed,
    Executed,
}

impl ProtocolState {
    pub fn status(self) -> &'static str {
        match self {
            Self::Previewed => "pending_confirmation",
            Self::Executed => "success",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub state: ProtocolState,
    pub body: Map<String, Value>,
    pub message: String,
    pub warnings: Vec<String>,
}

impl Outcome {
    pub fn previewed(body: Map<String, Value>, message: impl Into<String>) -> Self {
        Self {
            state: ProtocolState::Previewed,
            body,
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    pub fn executed(body: Map<String, Value>, message: impl Into<String>) -> Self {
        Self {
            state: ProtocolState::Executed,
            body,
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// `{status, ...body, message, warnings?}`.
    pub fn into_value(self) -> Value {
        let mut out = Map::new();
        out.insert("status".to_string(), Value::from(self.state.status()));
        out.extend(self.body);
        out.insert("message".to_string(), Value::from(self.message));
        if !self.warnings.is_empty() {
            out.insert("warnings".to_string(), Value::from(self.warnings));
        }
        Value::Object(out)
    }
}

#[async_trait]
pub trait Mutation: Send + Sync {
    type Target: Send + Sync;

    /// Loads whatever the arguments reference. A failure here ends the call whatever
    /// `confirmed` says.
    async fn fetch(&self) -> Result<Self::Target>;

    /// Must not issue a mutating RPC.
    async fn preview(&self, target: &Self::Target) -> Result<Outcome>;

    /// Issues exactly the mutating RPC.
    async fn apply(&self, target: Self::Target) -> Result<Outcome>;
}

pub async fn run<M: Mutation>(mutation: &M, confirmed: bool) -> Result<Outcome> {
    let target = mutation.fetch().await?;
    let outcome = if confirmed {
        mutation.apply(target).await?
    } else {
        mutation.preview(&target).await?
    };
    tracing::debug!(confirmed, status = outcome.state.status(), "mutation finished");
    Ok(outcome)
}

/// `{field: {from, to}}` for every field the caller supplied.
#[derive(Debug, Default)]
pub struct Changes {
    fields: Map<String, Value>,
    summary: Vec<String>,
}

impl Changes {
    pub fn field<T: Serialize>(&mut self, name: &str, from: T, to: Option<T>) {
        self.field_with(name, from, to, |v| {
            serde_json::to_value(v)
                .map(|v| match v {
                    Value::String(s) => format!("\"{s}\""),
                    other => other.to_string(),
                })
                .unwrap_or_default()
        });
    }

    /// Like `field`, with a custom rendering for the human summary.
    pub fn field_with<T: Serialize>(
        &mut self,
        name: &str,
        from: T,
        to: Option<T>,
        render: impl Fn(&T) -> String,
    ) {
        let Some(to) = to else {
            return;
        };
        self.summary.push(format!(
            "{} from {} to {}",
            name.replace('_', " "),
            render(&from),
            render(&to)
        ));
        self.fields.insert(
            camel(name),
            serde_json::json!({
                "from": serde_json::to_value(&from).unwrap_or(Value::Null),
                "to": serde_json::to_value(&to).unwrap_or(Value::Null),
            }),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn summary(&self) -> String {
        self.summary.join(", ")
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

fn camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Builds a JSON object body from `(key, value)` pairs.
pub(crate) fn body<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
