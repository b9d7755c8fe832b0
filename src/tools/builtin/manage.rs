//! File management tools: delete, rename, move, copy, create folder

use super::{optional_bool, optional_str, required_str, schema, target_path, validate_name};
use crate::tools::definition::{Tool, ToolContext, ToolError};
use crate::tools::guard::normalize_path;
use crate::tools::store::{base_name, join, parent_dir};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct DeleteFile;

#[async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a document or folder, moving it to the trash unless permanent is set"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document or folder to delete"},
                "permanent": {"type": "boolean", "description": "Skip the trash", "default": false}
            }),
            &["path"],
        )
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        ctx.guard
            .check_tree(self.name(), &[path.as_str()], &[], self.mutating())?;
        let permanent = optional_bool(&args, "permanent", false)?;

        if !ctx.store.exists(&path).await {
            return Err(ToolError::NotFound(path));
        }
        ctx.store.delete(&path, !permanent).await?;
        tracing::info!(path = %path, permanent, "Deleted");
        Ok(json!({"path": path, "trashed": !permanent}))
    }
}

pub struct RenameFile;

#[async_trait]
impl Tool for RenameFile {
    fn name(&self) -> &str {
        "rename_file"
    }

    fn description(&self) -> &str {
        "Rename a document or folder within its folder"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document or folder to rename"},
                "new_name": {"type": "string", "description": "New base name, without folders"}
            }),
            &["path", "new_name"],
        )
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        let new_name = required_str(&args, "new_name")?;
        let dest = join(parent_dir(&path), new_name);
        ctx.guard
            .check_tree(self.name(), &[path.as_str()], &[dest.as_str()], self.mutating())?;
        validate_name(new_name)?;

        if !ctx.store.exists(&path).await {
            return Err(ToolError::NotFound(path));
        }
        let renamed = ctx.store.rename(&path, new_name).await?;
        Ok(json!({"from": path, "to": renamed}))
    }
}

pub struct MoveFile;

#[async_trait]
impl Tool for MoveFile {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move a document or folder into another folder, optionally renaming it"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document or folder to move"},
                "destination": {"type": "string", "description": "Target folder; created when missing"},
                "new_name": {"type": "string", "description": "Base name at the destination"}
            }),
            &["path", "destination"],
        )
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        let dest_dir = normalize_path(required_str(&args, "destination")?);
        let new_name = optional_str(&args, "new_name")?;
        let final_name = new_name.unwrap_or_else(|| base_name(&path)).to_string();
        let dest_path = join(&dest_dir, &final_name);
        ctx.guard.check_tree(
            self.name(),
            &[path.as_str()],
            &[dest_path.as_str()],
            self.mutating(),
        )?;
        if let Some(name) = new_name {
            validate_name(name)?;
        }

        if !ctx.store.exists(&path).await {
            return Err(ToolError::NotFound(path));
        }
        if dest_path == path {
            return Ok(json!({"from": path, "to": dest_path}));
        }
        if ctx.store.exists(&dest_path).await {
            return Err(ToolError::AlreadyExists(dest_path));
        }
        if !dest_dir.is_empty() && !ctx.store.exists(&dest_dir).await {
            ctx.store.create_directory(&dest_dir).await?;
        }

        let moved = if parent_dir(&path) == dest_dir {
            ctx.store.rename(&path, &final_name).await?
        } else {
            let moved = ctx.store.move_to(&path, &dest_dir).await?;
            if final_name != base_name(&path) {
                ctx.store.rename(&moved, &final_name).await?
            } else {
                moved
            }
        };
        tracing::info!(from = %path, to = %moved, "Moved");
        Ok(json!({"from": path, "to": moved}))
    }
}

pub struct CopyFile;

#[async_trait]
impl Tool for CopyFile {
    fn name(&self) -> &str {
        "copy_file"
    }

    fn description(&self) -> &str {
        "Copy a document to a new path, or into an existing folder"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Document to copy"},
                "destination": {"type": "string", "description": "New document path or existing folder"}
            }),
            &["path", "destination"],
        )
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = target_path(&args, "path")?;
        let mut dest = target_path(&args, "destination")?;
        ctx.guard
            .check_tree(self.name(), &[path.as_str()], &[dest.as_str()], self.mutating())?;

        if !ctx.store.exists(&path).await {
            return Err(ToolError::NotFound(path));
        }
        if ctx.store.stat(&dest).await.map(|s| s.is_dir).unwrap_or(false) {
            dest = join(&dest, base_name(&path));
            ctx.guard.check(self.name(), &[dest.as_str()], self.mutating())?;
        }
        ctx.store.copy(&path, &dest).await?;
        Ok(json!({"from": path, "to": dest}))
    }
}

pub struct CreateFolder;

#[async_trait]
impl Tool for CreateFolder {
    fn name(&self) -> &str {
        "create_folder"
    }

    fn description(&self) -> &str {
        "Create a folder, including any missing parents"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "path": {"type": "string", "description": "Folder to create"}
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

        let created = match ctx.store.stat(&path).await {
            Ok(stat) if stat.is_dir => false,
            Ok(_) => return Err(ToolError::AlreadyExists(path)),
            Err(_) => {
                ctx.store.create_directory(&path).await?;
                true
            }
        };
        Ok(json!({"path": path, "created": created}))
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::builtin::fixture::fixture;
    use crate::tools::store::{DocumentStore, MemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_delete_to_trash_and_permanent() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("delete_file", json!({"path": "todo.md"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["trashed"], true);
        assert!(!f.store.exists("todo.md").await);

        let result = f
            .registry
            .execute("delete_file", json!({"path": "Notes/Archive", "permanent": true}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["trashed"], false);
        assert!(!f.store.exists("Notes/Archive/old.md").await);

        let result = f
            .registry
            .execute("delete_file", json!({"path": "todo.md"}), &f.ctx)
            .await;
        assert_eq!(result.error.as_deref(), Some("not found: todo.md"));
    }

    #[tokio::test]
    async fn test_trash_lands_in_trash_folder() {
        let store = MemoryStore::new();
        store.insert("a.md", "x").await.unwrap();
        store.delete("a.md", true).await.unwrap();
        assert!(store.paths().await.contains(&".trash/a.md".to_string()));
    }

    #[tokio::test]
    async fn test_rename() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("rename_file", json!({"path": "Notes/beta.md", "new_name": "b.md"}), &f.ctx)
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["to"], "Notes/b.md");
        assert!(f.store.exists("Notes/b.md").await);

        let result = f
            .registry
            .execute("rename_file", json!({"path": "Notes/b.md", "new_name": "alpha.md"}), &f.ctx)
            .await;
        assert!(result.error.unwrap().starts_with("already exists"));

        let result = f
            .registry
            .execute("rename_file", json!({"path": "Notes/b.md", "new_name": "x/y.md"}), &f.ctx)
            .await;
        assert!(result.error.unwrap().starts_with("invalid argument"));
    }

    #[tokio::test]
    async fn test_rename_into_blocked_name_is_denied() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("rename_file", json!({"path": "todo.md", "new_name": "Private"}), &f.ctx)
            .await;
        assert!(result.error.unwrap().contains("restricted folder"));
    }

    #[tokio::test]
    async fn test_move_creates_destination_folder() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("move_file", json!({"path": "todo.md", "destination": "Inbox/Later"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["to"], "Inbox/Later/todo.md");
        assert!(f.store.exists("Inbox/Later/todo.md").await);
        assert!(!f.store.exists("todo.md").await);
    }

    #[tokio::test]
    async fn test_move_with_new_name() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute(
                "move_file",
                json!({"path": "Notes/beta.md", "destination": "", "new_name": "beta-top.md"}),
                &f.ctx,
            )
            .await;
        assert_eq!(result.data.unwrap()["to"], "beta-top.md");

        let result = f
            .registry
            .execute(
                "move_file",
                json!({"path": "Notes/alpha.md", "destination": "Notes", "new_name": "a.md"}),
                &f.ctx,
            )
            .await;
        assert_eq!(result.data.unwrap()["to"], "Notes/a.md");
        assert!(f.store.calls().contains(&"rename".to_string()));
    }

    #[tokio::test]
    async fn test_move_errors() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("move_file", json!({"path": "ghost.md", "destination": "Notes"}), &f.ctx)
            .await;
        assert!(result.error.unwrap().starts_with("not found"));

        f.store.seed("Notes/todo.md", "dup").await;
        let result = f
            .registry
            .execute("move_file", json!({"path": "todo.md", "destination": "Notes"}), &f.ctx)
            .await;
        assert_eq!(result.error.as_deref(), Some("already exists: Notes/todo.md"));
    }

    #[tokio::test]
    async fn test_copy_to_path_and_folder() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("copy_file", json!({"path": "todo.md", "destination": "todo-copy.md"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["to"], "todo-copy.md");

        let result = f
            .registry
            .execute("copy_file", json!({"path": "todo.md", "destination": "Notes"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["to"], "Notes/todo.md");
        assert_eq!(
            f.store.read_file("Notes/todo.md").await.unwrap().content,
            "- [ ] alpha\n"
        );
        assert!(f.store.exists("todo.md").await);

        let result = f
            .registry
            .execute("copy_file", json!({"path": "ghost.md", "destination": "x.md"}), &f.ctx)
            .await;
        assert!(result.error.unwrap().starts_with("not found"));
    }

    #[tokio::test]
    async fn test_create_folder() {
        let f = fixture().await;
        f.approval.grant();

        let result = f
            .registry
            .execute("create_folder", json!({"path": "Projects/2026"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["created"], true);

        let result = f
            .registry
            .execute("create_folder", json!({"path": "Projects"}), &f.ctx)
            .await;
        assert_eq!(result.data.unwrap()["created"], false);

        let result = f
            .registry
            .execute("create_folder", json!({"path": "todo.md"}), &f.ctx)
            .await;
        assert!(result.error.unwrap().starts_with("already exists"));
    }
}
