use crate::capability::CapabilityContext;
use crate::error::{Result, ToolError};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const PAGE_SIZE_CAP: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Never mutates, never needs confirmation.
    Read,
    /// Goes through the preview/execute protocol.
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolTier {
    Base,
    Pro,
}

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    pub kind: ToolKind,
    pub tier: ToolTier,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(
        &self,
        ctx: &CapabilityContext,
        invocation: &ToolInvocation,
    ) -> Result<serde_json::Value>;
}

/// What the agent runtime sees for each action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema.
    pub parameters: serde_json::Value,
}

pub fn to_tool_definition(tool: &dyn Tool) -> ToolDefinition {
    let spec = tool.spec();
    ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters_schema,
    }
}

/// One agent call. A re-invocation with `confirmed = true` is a new value, never a continuation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
    pub confirmed: bool,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value, confirmed: bool) -> Self {
        Self {
            name: name.into(),
            arguments,
            confirmed,
        }
    }

    /// Builds an invocation from raw agent output; `confirmed` is read from the arguments.
    pub fn from_call(name: impl Into<String>, arguments: serde_json::Value) -> Result<Self> {
        let arguments = match arguments {
            serde_json::Value::Null => serde_json::json!({}),
            serde_json::Value::Object(map) => serde_json::Value::Object(map),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "arguments must be a JSON object, got {other}"
                )));
            }
        };
        let confirmed = optional_bool(&arguments, "confirmed")?.unwrap_or(false);
        Ok(Self::new(name, arguments, confirmed))
    }
}

/// Adds the `confirmed` flag every mutating action accepts.
pub(crate) fn mutating_schema(
    mut properties: serde_json::Map<String, serde_json::Value>,
    required: &[&str],
) -> serde_json::Value {
    properties.insert(
        "confirmed".to_string(),
        serde_json::json!({
            "type": "boolean",
            "description": "Leave false (default) to get a preview to show the user. Set true only after the user has explicitly approved that exact preview."
        }),
    );
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties,
        "required": required,
    })
}

pub(crate) fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        serde_json::Value::String(_) => Err(ToolError::InvalidArguments(format!(
            "{key} must not be empty"
        ))),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_string(args: &serde_json::Value, key: &str) -> Result<Option<String>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_f64(args: &serde_json::Value, key: &str) -> Result<Option<f64>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => {
            let value = n.as_f64().ok_or_else(|| {
                ToolError::InvalidArguments(format!("{key} must be a finite number"))
            })?;
            if !value.is_finite() {
                return Err(ToolError::InvalidArguments(format!(
                    "{key} must be a finite number"
                )));
            }
            Ok(Some(value))
        }
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be number, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_bool(args: &serde_json::Value, key: &str) -> Result<Option<bool>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Bool(b) => Ok(Some(*b)),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be boolean, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_string_list(
    args: &serde_json::Value,
    key: &str,
) -> Result<Option<Vec<String>>> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let values = value.as_array().ok_or_else(|| {
        ToolError::InvalidArguments(format!("key {key} must be an array of strings"))
    })?;
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        let Some(item) = value.as_str() else {
            return Err(ToolError::InvalidArguments(format!(
                "key {key} must be an array of strings"
            )));
        };
        let item = item.trim();
        if item.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "key {key} cannot contain empty strings"
            )));
        }
        items.push(item.to_string());
    }
    Ok(Some(items))
}

/// Ids for batch actions: trimmed, deduplicated in first-seen order, 1..=`max` entries.
pub(crate) fn require_id_list(args: &serde_json::Value, key: &str, max: usize) -> Result<Vec<String>> {
    let ids = optional_string_list(args, key)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing key: {key}")))?;
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    if unique.is_empty() {
        return Err(ToolError::InvalidArguments(format!(
            "{key} must contain at least one id"
        )));
    }
    if unique.len() > max {
        return Err(ToolError::InvalidArguments(format!(
            "{key} accepts at most {max} ids per batch"
        )));
    }
    Ok(unique)
}

/// Dates are exchanged with the agent as `YYYY-MM-DD`.
pub(crate) fn optional_date(args: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>> {
    let Some(raw) = optional_string(args, key)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ToolError::InvalidArguments(format!("{key} must be a date in YYYY-MM-DD form")))
}

pub(crate) fn parse_page_size(args: &serde_json::Value) -> Result<u32> {
    match args.get("page_size") {
        None | Some(serde_json::Value::Null) => Ok(DEFAULT_PAGE_SIZE),
        Some(value) => {
            let value = value.as_u64().ok_or_else(|| {
                ToolError::InvalidArguments("page_size must be an integer".to_string())
            })?;
            let value = u32::try_from(value).map_err(|_| {
                ToolError::InvalidArguments("page_size is out of range".to_string())
            })?;
            if !(1..=PAGE_SIZE_CAP).contains(&value) {
                return Err(ToolError::InvalidArguments(format!(
                    "page_size must be between 1 and {PAGE_SIZE_CAP}"
                )));
            }
            Ok(value)
        }
    }
}
