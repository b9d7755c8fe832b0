//! Built-in document tools
//!
//! Every executor follows the same order: parse the target paths, run the
//! [`PermissionGuard`](crate::tools::guard::PermissionGuard) check (blocked
//! paths, then approval for mutating tools), validate the remaining
//! arguments, then call the store. Store not-found conditions come back as
//! `ToolError::NotFound`.

mod manage;
mod read;
mod search;
mod write;

pub use manage::{CopyFile, CreateFolder, DeleteFile, MoveFile, RenameFile};
pub use read::{GetMetadata, ListFiles, ReadFile};
pub use search::{Search, SearchMode};
pub use write::{CreateFile, ModifyFile, WriteFile};

use crate::tools::definition::{Tool, ToolError};
use crate::tools::guard::normalize_path;
use crate::tools::registry::ToolRegistry;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Every built-in tool
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadFile),
        Arc::new(ListFiles),
        Arc::new(Search),
        Arc::new(GetMetadata),
        Arc::new(CreateFile),
        Arc::new(WriteFile),
        Arc::new(ModifyFile),
        Arc::new(DeleteFile),
        Arc::new(RenameFile),
        Arc::new(MoveFile),
        Arc::new(CopyFile),
        Arc::new(CreateFolder),
    ]
}

/// Register every built-in tool
pub fn register_all(registry: &ToolRegistry) -> Result<(), ToolError> {
    for tool in builtin_tools() {
        registry.register(tool)?;
    }
    Ok(())
}

// =============================================================================
// Argument helpers
// =============================================================================

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    optional_str(args, key)?
        .ok_or_else(|| ToolError::InvalidArgument(format!("missing required argument '{}'", key)))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ToolError::InvalidArgument(format!("'{}' must be a string", key))),
    }
}

pub(crate) fn optional_bool(args: &Value, key: &str, default: bool) -> Result<bool, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ToolError::InvalidArgument(format!("'{}' must be a boolean", key))),
    }
}

pub(crate) fn optional_usize(args: &Value, key: &str, default: usize) -> Result<usize, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| {
                ToolError::InvalidArgument(format!("'{}' must be a non-negative integer", key))
            }),
    }
}

/// A normalized, non-root path argument
pub(crate) fn target_path(args: &Value, key: &str) -> Result<String, ToolError> {
    let path = normalize_path(required_str(args, key)?);
    if path.is_empty() {
        return Err(ToolError::InvalidArgument(format!(
            "'{}' must name a file or folder",
            key
        )));
    }
    Ok(path)
}

/// A single path segment
pub(crate) fn validate_name(name: &str) -> Result<(), ToolError> {
    if name.trim().is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ToolError::InvalidArgument(format!(
            "'{}' is not a valid file name",
            name
        )));
    }
    Ok(())
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Store(e.to_string()))
}

pub(crate) fn schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
pub(crate) mod fixture {
    use crate::tools::definition::ToolContext;
    use crate::tools::guard::{Approval, BlockedPaths, PermissionGuard};
    use crate::tools::registry::ToolRegistry;
    use crate::tools::store::spy::SpyStore;
    use std::sync::Arc;

    pub struct Fixture {
        pub registry: ToolRegistry,
        pub store: Arc<SpyStore>,
        pub approval: Approval,
        pub ctx: ToolContext,
    }

    /// Seeded spy store, `Private` blocked, approval unset
    pub async fn fixture() -> Fixture {
        fixture_with_blocked(&["Private"]).await
    }

    pub async fn fixture_with_blocked(blocked: &[&str]) -> Fixture {
        let store = Arc::new(SpyStore::new());
        store.seed("Notes/alpha.md", "# Alpha\nFirst note #project\n## Tasks\n- write docs\n").await;
        store.seed("Notes/beta.md", "# Beta\nmentions alpha in passing\n").await;
        store.seed("Notes/Archive/old.md", "old #archive\n").await;
        store.seed("Private/secret.md", "alpha secret #project\n").await;
        store.seed("todo.md", "- [ ] alpha\n").await;

        let approval = Approval::new(false);
        let guard = PermissionGuard::new(BlockedPaths::new(blocked.iter()), approval.reader());
        let registry = ToolRegistry::new();
        super::register_all(&registry).unwrap();
        let ctx = ToolContext::new(store.clone(), guard);
        Fixture {
            registry,
            store,
            approval,
            ctx,
        }
    }
}
