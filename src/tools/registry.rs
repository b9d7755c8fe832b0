//! Thread-safe tool registry.
//!
//! [`ToolRegistry`] stores tools behind `Arc<RwLock<...>>` so they can be
//! registered and dispatched from any async task. Dispatch never fails:
//! unknown names, executor errors, and executor panics all come back as
//! `ToolResult { success: false, .. }`.

use crate::tools::definition::{
    validate_parameters, validate_tool_name, Tool, ToolContext, ToolError, ToolInfo, ToolResult,
};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

/// A registry of named tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Rejects duplicate names, invalid names, and
    /// non-object parameter schemas.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        validate_tool_name(&name)?;
        validate_parameters(&tool.parameters())?;

        let mut map = self.tools.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&name) {
            return Err(ToolError::Registration(format!(
                "tool already registered: {}",
                name
            )));
        }

        tracing::debug!(tool = %name, "Registered tool");
        map.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All registered tools, sorted by name
    pub fn definitions(&self) -> Vec<ToolInfo> {
        let map = self.tools.read().unwrap_or_else(|e| e.into_inner());
        let mut infos: Vec<ToolInfo> = map
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
                mutating: t.mutating(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch a call by name
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = %name, "Call for unknown tool");
            return ToolResult::error(ToolError::ToolNotFound(name.to_string()).to_string());
        };

        match AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind().await {
            Ok(Ok(data)) => ToolResult::ok(data),
            Ok(Err(e)) => {
                tracing::debug!(tool = %name, error = %e, "Tool call failed");
                ToolResult::error(e.to_string())
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(tool = %name, "Tool panicked: {}", reason);
                ToolResult::error(format!("tool '{}' failed: {}", name, reason))
            }
        }
    }
}
