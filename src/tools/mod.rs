//! Permission-gated document tools
//!
//! Agents call tools through `function_call` messages. The bridge hands each
//! call to a [`ToolDispatcher`], which looks the tool up in the
//! [`ToolRegistry`] and runs it against a [`DocumentStore`] behind a
//! [`PermissionGuard`]. Every outcome, failures and panics included, comes
//! back as a [`ToolResult`].

pub mod builtin;
pub mod definition;
pub mod guard;
pub mod registry;
pub mod store;

pub use definition::{Tool, ToolContext, ToolError, ToolInfo, ToolResult};
pub use guard::{Approval, ApprovalReader, BlockedPaths, PermissionGuard};
pub use registry::ToolRegistry;
pub use store::fs::FsStore;
pub use store::memory::MemoryStore;
pub use store::DocumentStore;

use crate::bridge::session::ToolCallHandler;
use crate::config::ToolsConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Routes agent tool calls into a registry and context
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self { registry, context }
    }

    /// Dispatcher over every built-in tool, guarded per `config`.
    ///
    /// Returns the dispatcher and the [`Approval`] handle that controls
    /// mutating tools for this session.
    pub fn with_builtins(
        store: Arc<dyn DocumentStore>,
        config: &ToolsConfig,
    ) -> Result<(Self, Approval), ToolError> {
        let registry = ToolRegistry::new();
        builtin::register_all(&registry)?;

        let approval = Approval::new(config.approved);
        let guard = PermissionGuard::new(
            BlockedPaths::new(config.blocked_paths.iter()),
            approval.reader(),
        );
        let dispatcher = Self::new(Arc::new(registry), ToolContext::new(store, guard));
        Ok((dispatcher, approval))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        self.registry.execute(name, args, &self.context).await
    }
}

#[async_trait]
impl ToolCallHandler for ToolDispatcher {
    async fn call_tool(&self, agent_id: &str, name: &str, args: Value) -> ToolResult {
        let started = Instant::now();
        let result = self.dispatch(name, args).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if result.success {
            tracing::debug!(agent_id = %agent_id, tool = name, elapsed_ms, "Tool call succeeded");
        } else {
            tracing::warn!(
                agent_id = %agent_id,
                tool = name,
                elapsed_ms,
                error = result.error.as_deref().unwrap_or(""),
                "Tool call failed"
            );
        }
        result
    }
}
