//! Content-changing tools: `create_file`, `write_file`, `modify_file`

use super::{optional_str, required_str, schema, target_path};
use crate::tools::definition::{Tool, ToolContext, ToolError};
use crate::tools::store::markdown;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct CreateFile;

#[async_trait]
impl Tool for CreateFile {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new document; fails if it already exists"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Path of the new document"},
                "content": {"type": "string", "description": "Initial content", "default": ""}
            }),
            &["path"],
        )
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        ctx.guard.check(self.name(), &[path.as_str()], self.mutating())?;
        let content = optional_str(&args, "content")?.unwrap_or("");

        if ctx.store.exists(&path).await {
            return Err(ToolError::AlreadyExists(path));
        }
        ctx.store.write_file(&path, content).await?;
        Ok(json!({"path": path, "status": "created"}))
    }
}

pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a document, replacing any existing content"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document path relative to the vault root"},
                "content": {"type": "string", "description": "Full new content"}
            }),
            &["path", "content"],
        )
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        ctx.guard.check(self.name(), &[path.as_str()], self.mutating())?;
        let content = required_str(&args, "content")?;

        let outcome = ctx.store.write_file(&path, content).await?;
        Ok(json!({"path": path, "status": outcome}))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Append,
    Prepend,
    ReplaceSection,
}

pub struct ModifyFile;

#[async_trait]
impl Tool for ModifyFile {
    fn name(&self) -> &str {
        "modify_file"
    }

    fn description(&self) -> &str {
        "Append to, prepend to, or replace one section of an existing document"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document path relative to the vault root"},
                "operation": {"type": "string", "enum": ["append", "prepend", "replace_section"]},
                "content": {"type": "string", "description": "Text to insert"},
                "heading": {"type": "string", "description": "Section heading, required for replace_section"}
            }),
            &["path", "operation", "content"],
        )
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        ctx.guard.check(self.name(), &[path.as_str()], self.mutating())?;

        let edit = match required_str(&args, "operation")? {
            "append" => Edit::Append,
            "prepend" => Edit::Prepend,
            "replace_section" => Edit::ReplaceSection,
            other => {
                return Err(ToolError::InvalidArgument(format!(
                    "unknown operation '{}' (expected append, prepend, or replace_section)",
                    other
                )))
            }
        };
        let content = required_str(&args, "content")?;
        let heading = optional_str(&args, "heading")?.map(str::trim);
        if edit == Edit::ReplaceSection && heading.map_or(true, str::is_empty) {
            return Err(ToolError::InvalidArgument(
                "replace_section requires a 'heading'".to_string(),
            ));
        }

        let existing = ctx.store.read_file(&path).await?.content;
        let updated = match edit {
            Edit::Append => append(&existing, content),
            Edit::Prepend => prepend(&existing, content),
            Edit::ReplaceSection => {
                let heading = heading.unwrap_or_default();
                markdown::replace_section(&existing, heading, content)
                    .ok_or_else(|| ToolError::NotFound(format!("heading '{}' in {}", heading, path)))?
            }
        };

        ctx.store.write_file(&path, &updated).await?;
        tracing::debug!(path = %path, operation = ?edit, "Document modified");
        Ok(json!({"path": path, "status": "modified"}))
    }
}

fn append(existing: &str, content: &str) -> String {
    if existing.is_empty() || existing.ends_with('\n') {
        format!("{}{}", existing, content)
    } else {
        format!("{}\n{}", existing, content)
    }
}

/// Insert after any frontmatter block
fn prepend(existing: &str, content: &str) -> String {
    let (frontmatter, body) = markdown::split_frontmatter(existing);
    let separator = if content.ends_with('\n') || body.is_empty() { "" } else { "\n" };
    let frontmatter_break = if !frontmatter.is_empty() && !frontmatter.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    format!("{}{}{}{}{}", frontmatter, frontmatter_break, content, separator, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::fixture::fixture;
    use crate::tools::store::DocumentStore;

    #[test]
    fn test_append_adds_missing_newline() {
        assert_eq!(append("a", "b"), "a\nb");
        assert_eq!(append("a\n", "b"), "a\nb");
        assert_eq!(append("", "b"), "b");
    }

    #[test]
    fn test_prepend_keeps_frontmatter_first() {
        assert_eq!(prepend("body\n", "top"), "top\nbody\n");
        assert_eq!(
            prepend("---\ntags: [x]\n---\nbody\n", "top\n"),
            "---\ntags: [x]\n---\ntop\nbody\n"
        );
    }

    #[tokio::test]
    async fn test_create_file() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("create_file", json!({"path": "Notes/gamma.md"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["status"], "created");

        let result = f
            .registry
            .execute("create_file", json!({"path": "Notes/gamma.md", "content": "x"}), &f.ctx)
            .await;
        assert!(result.error.unwrap().starts_with("already exists"));
    }

    #[tokio::test]
    async fn test_write_file_reports_outcome() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("write_file", json!({"path": "todo.md", "content": "done\n"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["status"], "modified");

        let result = f
            .registry
            .execute("write_file", json!({"path": "Inbox/new.md", "content": "hi"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["status"], "created");
        assert_eq!(f.store.read_file("Inbox/new.md").await.unwrap().content, "hi");
    }

    #[tokio::test]
    async fn test_modify_append_and_prepend() {
        let f = fixture().await;
        f.approval.grant();

        f.registry
            .execute(
                "modify_file",
                json!({"path": "todo.md", "operation": "append", "content": "- [ ] beta\n"}),
                &f.ctx,
            )
            .await;
        f.registry
            .execute(
                "modify_file",
                json!({"path": "todo.md", "operation": "prepend", "content": "# Todo"}),
                &f.ctx,
            )
            .await;

        let content = f.store.read_file("todo.md").await.unwrap().content;
        assert_eq!(content, "# Todo\n- [ ] alpha\n- [ ] beta\n");
    }

    #[tokio::test]
    async fn test_modify_replace_section() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute(
                "modify_file",
                json!({
                    "path": "Notes/alpha.md",
                    "operation": "replace_section",
                    "heading": "## Tasks",
                    "content": "- ship it\n"
                }),
                &f.ctx,
            )
            .await;
        assert!(result.success, "{:?}", result.error);

        let content = f.store.read_file("Notes/alpha.md").await.unwrap().content;
        assert!(content.contains("## Tasks\n- ship it\n"));
        assert!(!content.contains("write docs"));
        assert!(content.starts_with("# Alpha\nFirst note #project\n"));
    }

    #[tokio::test]
    async fn test_modify_replace_section_errors() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute(
                "modify_file",
                json!({"path": "Notes/alpha.md", "operation": "replace_section", "content": "x"}),
                &f.ctx,
            )
            .await;
        assert!(result.error.unwrap().starts_with("invalid argument"));
        assert!(f.store.calls().is_empty());

        let result = f
            .registry
            .execute(
                "modify_file",
                json!({
                    "path": "Notes/alpha.md",
                    "operation": "replace_section",
                    "heading": "Missing",
                    "content": "x"
                }),
                &f.ctx,
            )
            .await;
        assert!(result.error.unwrap().starts_with("not found"));
        assert_eq!(f.store.calls(), vec!["read_file"]);
    }

    #[tokio::test]
    async fn test_modify_missing_file_and_bad_operation() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute(
                "modify_file",
                json!({"path": "ghost.md", "operation": "append", "content": "x"}),
                &f.ctx,
            )
            .await;
        assert_eq!(result.error.as_deref(), Some("not found: ghost.md"));

        let result = f
            .registry
            .execute(
                "modify_file",
                json!({"path": "todo.md", "operation": "rewrite", "content": "x"}),
                &f.ctx,
            )
            .await;
        assert!(result.error.unwrap().contains("unknown operation"));
    }
}
