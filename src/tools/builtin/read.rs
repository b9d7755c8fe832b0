//! Read-only tools: `read_file`, `list_files`, `get_metadata`

use super::{optional_bool, optional_str, schema, target_path, to_json};
use crate::tools::definition::{Tool, ToolContext, ToolError};
use crate::tools::guard::normalize_path;
use crate::tools::store::Entry;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the full content of a document"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document path relative to the vault root"}
            }),
            &["path"],
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        ctx.guard.check(self.name(), &[path.as_str()], self.mutating())?;

        let file = ctx.store.read_file(&path).await?;
        Ok(json!({
            "path": path,
            "content": file.content,
            "stat": to_json(&file.stat)?,
        }))
    }
}

pub struct ListFiles;

#[async_trait]
impl Tool for ListFiles {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files and folders inside a folder"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Folder to list; the vault root when omitted"},
                "recursive": {"type": "boolean", "description": "Include nested entries", "default": false}
            }),
            &[],
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = normalize_path(optional_str(&args, "path")?.unwrap_or(""));
        let recursive = optional_bool(&args, "recursive", false)?;
        ctx.guard.check(self.name(), &[path.as_str()], self.mutating())?;

        let entries: Vec<Entry> = ctx
            .store
            .list_children(&path, recursive)
            .await?
            .into_iter()
            .filter(|entry| !ctx.guard.is_blocked(&entry.path))
            .collect();

        Ok(json!({
            "path": path,
            "count": entries.len(),
            "entries": to_json(&entries)?,
        }))
    }
}

pub struct GetMetadata;

#[async_trait]
impl Tool for GetMetadata {
    fn name(&self) -> &str {
        "get_metadata"
    }

    fn description(&self) -> &str {
        "Get a document's tags, links, headings, and file stats"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document path relative to the vault root"}
            }),
            &["path"],
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        ctx.guard.check(self.name(), &[path.as_str()], self.mutating())?;

        let metadata = ctx.store.metadata(&path).await?;
        let mut out = to_json(&metadata)?;
        out["path"] = json!(path);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::builtin::fixture::fixture;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_file() {
        let f = fixture().await;
        let result = f
            .registry
            .execute("read_file", json!({"path": "./Notes/beta.md"}), &f.ctx)
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["path"], "Notes/beta.md");
        assert!(data["content"].as_str().unwrap().starts_with("# Beta"));
        assert_eq!(data["stat"]["is_dir"], false);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let f = fixture().await;
        let result = f
            .registry
            .execute("read_file", json!({"path": "nope.md"}), &f.ctx)
            .await;
        assert_eq!(result.error.as_deref(), Some("not found: nope.md"));
    }

    #[tokio::test]
    async fn test_list_root_hides_blocked_children() {
        let f = fixture().await;
        let result = f
            .registry
            .execute("list_files", json!({"recursive": true}), &f.ctx)
            .await;
        let data = result.data.unwrap();
        let paths: Vec<&str> = data["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["path"].as_str().unwrap())
            .collect();
        assert!(paths.contains(&"Notes/alpha.md"));
        assert!(paths.contains(&"todo.md"));
        assert!(paths.iter().all(|p| !p.starts_with("Private")));
        assert_eq!(data["count"], paths.len());
    }

    #[tokio::test]
    async fn test_list_non_recursive() {
        let f = fixture().await;
        let result = f
            .registry
            .execute("list_files", json!({"path": "Notes"}), &f.ctx)
            .await;
        let data = result.data.unwrap();
        let names: Vec<&str> = data["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Archive", "alpha.md", "beta.md"]);
    }

    #[tokio::test]
    async fn test_get_metadata() {
        let f = fixture().await;
        let result = f
            .registry
            .execute("get_metadata", json!({"path": "Notes/alpha.md"}), &f.ctx)
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["path"], "Notes/alpha.md");
        assert_eq!(data["tags"], json!(["project"]));
        assert_eq!(data["headings"][1]["text"], "Tasks");
    }
}
