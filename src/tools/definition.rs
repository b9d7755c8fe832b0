//! Core tool abstraction: the [`Tool`] trait, [`ToolResult`], [`ToolInfo`],
//! [`ToolContext`], and [`ToolError`].

use crate::tools::guard::PermissionGuard;
use crate::tools::store::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Maximum allowed length for a tool name
const MAX_TOOL_NAME_LEN: usize = 64;

/// A tool an agent can invoke.
///
/// Implementations are `Send + Sync` so the registry can share
/// `Arc<dyn Tool>` across tasks.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (alphanumeric + underscores, max 64 chars)
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the accepted arguments
    fn parameters(&self) -> Value;

    /// Whether the tool changes the document store
    fn mutating(&self) -> bool {
        false
    }

    /// Run the tool. The returned value becomes `ToolResult.data`.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Structured outcome of a tool call. Failures are data, never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Advertised description of a registered tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub mutating: bool,
}

/// What every executor gets: the store and the permission gate
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn DocumentStore>,
    pub guard: PermissionGuard,
}

impl ToolContext {
    pub fn new(store: Arc<dyn DocumentStore>, guard: PermissionGuard) -> Self {
        Self { store, guard }
    }
}

/// Tool-level failures, surfaced only as `ToolResult.error` strings
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("restricted folder: {0}")]
    PermissionDenied(String),

    #[error("approval required: {0}")]
    ApprovalRequired(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("tool registration rejected: {0}")]
    Registration(String),
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => ToolError::NotFound(path),
            StoreError::AlreadyExists(path) => ToolError::AlreadyExists(path),
            StoreError::InvalidPath(msg) => ToolError::InvalidArgument(msg),
            StoreError::Io(msg) => ToolError::Store(msg),
        }
    }
}

/// Validate a tool name
pub fn validate_tool_name(name: &str) -> Result<(), ToolError> {
    if name.is_empty() {
        return Err(ToolError::Registration("tool name must not be empty".to_string()));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(ToolError::Registration(format!(
            "tool name exceeds {} characters: {}",
            MAX_TOOL_NAME_LEN, name
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ToolError::Registration(format!(
            "tool name must contain only alphanumeric characters and underscores: {}",
            name
        )));
    }
    Ok(())
}

/// Validate that a parameter schema is an object schema
pub fn validate_parameters(schema: &Value) -> Result<(), ToolError> {
    let obj = schema.as_object().ok_or_else(|| {
        ToolError::Registration("parameter schema must be a JSON object".to_string())
    })?;
    if obj.get("type").and_then(Value::as_str) != Some("object") {
        return Err(ToolError::Registration(
            "parameter schema must have \"type\": \"object\"".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_tool_names() {
        assert!(validate_tool_name("read_file").is_ok());
        assert!(validate_tool_name("a").is_ok());
        assert!(validate_tool_name(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_invalid_tool_names() {
        assert!(validate_tool_name("").is_err());
        assert!(validate_tool_name(&"x".repeat(65)).is_err());
        assert!(validate_tool_name("read-file").is_err());
        assert!(validate_tool_name("read file").is_err());
    }

    #[test]
    fn test_parameter_schema_validation() {
        assert!(validate_parameters(&json!({"type": "object", "properties": {}})).is_ok());
        assert!(validate_parameters(&json!({"type": "string"})).is_err());
        assert!(validate_parameters(&json!({"properties": {}})).is_err());
        assert!(validate_parameters(&json!("object")).is_err());
    }

    #[test]
    fn test_tool_result_serialization() {
        let ok = serde_json::to_value(ToolResult::ok(json!({"n": 1}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"n": 1}}));

        let err = serde_json::to_value(ToolResult::error("boom")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_store_errors_map_to_tool_errors() {
        let err: ToolError = StoreError::NotFound("a.md".to_string()).into();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert_eq!(err.to_string(), "not found: a.md");

        let err: ToolError = StoreError::InvalidPath("..".to_string()).into();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }

    #[test]
    fn test_error_messages_name_the_gate() {
        assert!(ToolError::PermissionDenied("Private/a.md".to_string())
            .to_string()
            .contains("restricted folder"));
        assert!(ToolError::ApprovalRequired("write_file".to_string())
            .to_string()
            .contains("approval required"));
    }
}
