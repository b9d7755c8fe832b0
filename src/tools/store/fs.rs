//! Directory-backed document store
//!
//! Maps store paths onto a root folder. Deleted entries go to a trash folder
//! under the root unless deletion is permanent. Metadata is cached per path
//! and keyed by modification time.

use crate::tools::guard::normalize_path;
use crate::tools::store::{
    base_name, is_hidden, join, markdown, parent_dir, unique_name, DocumentMetadata,
    DocumentStore, Entry, FileContent, FileStat, StoreError, StoreResult, WriteOutcome,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;

/// A [`DocumentStore`] over a local folder
pub struct FsStore {
    root: PathBuf,
    trash_dir: String,
    metadata_cache: RwLock<HashMap<String, DocumentMetadata>>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_trash_dir(root, ".trash")
    }

    pub fn with_trash_dir(root: impl Into<PathBuf>, trash_dir: &str) -> Self {
        Self {
            root: root.into(),
            trash_dir: normalize_path(trash_dir),
            metadata_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalized store path and its location on disk
    fn resolve(&self, path: &str) -> StoreResult<(String, PathBuf)> {
        let path = normalize_path(path);
        if path.split('/').any(|s| s == "..") {
            return Err(StoreError::InvalidPath(format!("{} escapes the store", path)));
        }
        let full = if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&path)
        };
        Ok((path, full))
    }

    /// Like `resolve`, but the root itself is rejected
    fn resolve_target(&self, path: &str) -> StoreResult<(String, PathBuf)> {
        let (path, full) = self.resolve(path)?;
        if path.is_empty() {
            return Err(StoreError::InvalidPath(
                "the store root is not a valid target".to_string(),
            ));
        }
        Ok((path, full))
    }

    async fn invalidate(&self, path: &str) {
        let prefix = format!("{}/", path);
        self.metadata_cache
            .write()
            .await
            .retain(|key, _| key != path && !key.starts_with(&prefix));
    }
}

fn io_error(path: &str, err: std::io::Error) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
        ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.to_string()),
        _ => StoreError::Io(format!("{}: {}", path, err)),
    }
}

fn millis(time: std::io::Result<SystemTime>) -> Option<i64> {
    time.ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
}

fn to_stat(meta: &std::fs::Metadata) -> FileStat {
    FileStat {
        size: if meta.is_dir() { 0 } else { meta.len() },
        is_dir: meta.is_dir(),
        created: millis(meta.created()),
        modified: millis(meta.modified()),
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn read_file(&self, path: &str) -> StoreResult<FileContent> {
        let (path, full) = self.resolve_target(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| io_error(&path, e))?;
        if meta.is_dir() {
            return Err(StoreError::InvalidPath(format!("{} is a folder", path)));
        }
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(FileContent {
            content,
            stat: to_stat(&meta),
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> StoreResult<WriteOutcome> {
        let (path, full) = self.resolve_target(path)?;
        let outcome = match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => {
                return Err(StoreError::InvalidPath(format!("{} is a folder", path)));
            }
            Ok(_) => WriteOutcome::Modified,
            Err(_) => WriteOutcome::Created,
        };
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent_dir(&path), e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| io_error(&path, e))?;
        self.invalidate(&path).await;
        Ok(outcome)
    }

    async fn list_children(&self, path: &str, recursive: bool) -> StoreResult<Vec<Entry>> {
        let (dir, full) = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| io_error(&dir, e))?;
        if !meta.is_dir() {
            return Err(StoreError::InvalidPath(format!("{} is a file", dir)));
        }

        let mut entries = Vec::new();
        let mut pending = vec![(dir.clone(), full)];
        while let Some((rel_dir, abs_dir)) = pending.pop() {
            let mut reader = tokio::fs::read_dir(&abs_dir)
                .await
                .map_err(|e| io_error(&rel_dir, e))?;
            while let Some(item) = reader
                .next_entry()
                .await
                .map_err(|e| io_error(&rel_dir, e))?
            {
                let name = item.file_name().to_string_lossy().to_string();
                if is_hidden(&name) {
                    continue;
                }
                let meta = match item.metadata().await {
                    Ok(meta) => meta,
                    Err(e) => {
                        tracing::debug!(path = %name, error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                let rel = join(&rel_dir, &name);
                if recursive && meta.is_dir() {
                    pending.push((rel.clone(), item.path()));
                }
                entries.push(Entry {
                    path: rel,
                    name,
                    is_dir: meta.is_dir(),
                    size: if meta.is_dir() { 0 } else { meta.len() },
                });
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn delete(&self, path: &str, to_trash: bool) -> StoreResult<()> {
        let (path, full) = self.resolve_target(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| io_error(&path, e))?;

        if to_trash {
            let trash = self.root.join(&self.trash_dir);
            tokio::fs::create_dir_all(&trash)
                .await
                .map_err(|e| io_error(&self.trash_dir, e))?;
            let name = unique_name(base_name(&path), |n| trash.join(n).exists());
            tokio::fs::rename(&full, trash.join(&name))
                .await
                .map_err(|e| io_error(&path, e))?;
            tracing::debug!(path = %path, trashed_as = %name, "Moved to trash");
        } else if meta.is_dir() {
            tokio::fs::remove_dir_all(&full)
                .await
                .map_err(|e| io_error(&path, e))?;
        } else {
            tokio::fs::remove_file(&full)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        self.invalidate(&path).await;
        Ok(())
    }

    async fn rename(&self, path: &str, new_name: &str) -> StoreResult<String> {
        let (path, full) = self.resolve_target(path)?;
        if new_name.is_empty() || new_name.contains('/') || new_name.contains('\\') {
            return Err(StoreError::InvalidPath(format!("invalid name: {}", new_name)));
        }
        if !full.exists() {
            return Err(StoreError::NotFound(path));
        }
        let dest = join(parent_dir(&path), new_name);
        let (_, dest_full) = self.resolve_target(&dest)?;
        if dest_full.exists() {
            return Err(StoreError::AlreadyExists(dest));
        }
        tokio::fs::rename(&full, &dest_full)
            .await
            .map_err(|e| io_error(&path, e))?;
        self.invalidate(&path).await;
        Ok(dest)
    }

    async fn move_to(&self, path: &str, dest_dir: &str) -> StoreResult<String> {
        let (path, full) = self.resolve_target(path)?;
        let (dest_dir, dest_dir_full) = self.resolve(dest_dir)?;
        if dest_dir == path || dest_dir.starts_with(&format!("{}/", path)) {
            return Err(StoreError::InvalidPath(format!(
                "cannot move {} into itself",
                path
            )));
        }
        if !full.exists() {
            return Err(StoreError::NotFound(path));
        }
        let dest = join(&dest_dir, base_name(&path));
        let dest_full = dest_dir_full.join(base_name(&path));
        if dest_full.exists() {
            return Err(StoreError::AlreadyExists(dest));
        }
        tokio::fs::create_dir_all(&dest_dir_full)
            .await
            .map_err(|e| io_error(&dest_dir, e))?;
        tokio::fs::rename(&full, &dest_full)
            .await
            .map_err(|e| io_error(&path, e))?;
        self.invalidate(&path).await;
        Ok(dest)
    }

    async fn copy(&self, src: &str, dest: &str) -> StoreResult<()> {
        let (src, src_full) = self.resolve_target(src)?;
        let (dest, dest_full) = self.resolve_target(dest)?;
        let meta = tokio::fs::metadata(&src_full)
            .await
            .map_err(|e| io_error(&src, e))?;
        if meta.is_dir() {
            return Err(StoreError::InvalidPath(format!("{} is a folder", src)));
        }
        if dest_full.exists() {
            return Err(StoreError::AlreadyExists(dest));
        }
        if let Some(parent) = dest_full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent_dir(&dest), e))?;
        }
        tokio::fs::copy(&src_full, &dest_full)
            .await
            .map_err(|e| io_error(&dest, e))?;
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> StoreResult<()> {
        let (path, full) = self.resolve_target(path)?;
        if full.is_file() {
            return Err(StoreError::AlreadyExists(path));
        }
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn metadata(&self, path: &str) -> StoreResult<DocumentMetadata> {
        let file = self.read_file(path).await?;
        let key = normalize_path(path);

        if let Some(cached) = self.metadata_cache.read().await.get(&key) {
            if cached.stat.modified == file.stat.modified && cached.stat.size == file.stat.size {
                return Ok(cached.clone());
            }
        }

        let scan = markdown::scan(&file.content);
        let metadata = DocumentMetadata {
            tags: scan.tags,
            links: scan.links,
            headings: scan.headings,
            stat: file.stat,
        };
        self.metadata_cache
            .write()
            .await
            .insert(key, metadata.clone());
        Ok(metadata)
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok((_, full)) => tokio::fs::try_exists(&full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn stat(&self, path: &str) -> StoreResult<FileStat> {
        let (path, full) = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(to_stat(&meta))
    }

    async fn cached_metadata(&self, path: &str) -> Option<DocumentMetadata> {
        self.metadata_cache
            .read()
            .await
            .get(&normalize_path(path))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsStore) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_write_read_roundtrip_with_parents() {
        let (dir, store) = store();
        assert_eq!(
            store.write_file("Notes/day/one.md", "hello").await.unwrap(),
            WriteOutcome::Created
        );
        assert!(dir.path().join("Notes/day/one.md").is_file());
        assert_eq!(
            store.write_file("Notes/day/one.md", "hello!").await.unwrap(),
            WriteOutcome::Modified
        );

        let file = store.read_file("./Notes/day/one.md").await.unwrap();
        assert_eq!(file.content, "hello!");
        assert_eq!(file.stat.size, 6);
        assert!(file.stat.modified.is_some());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read_file("nope.md").await,
            Err(StoreError::NotFound(p)) if p == "nope.md"
        ));
        assert!(!store.exists("nope.md").await);
    }

    #[tokio::test]
    async fn test_list_children_skips_hidden() {
        let (_dir, store) = store();
        store.write_file("a.md", "a").await.unwrap();
        store.write_file("Sub/b.md", "b").await.unwrap();
        store.write_file(".obsidian/config", "{}").await.unwrap();

        let top: Vec<String> = store
            .list_children("", false)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(top, vec!["Sub", "a.md"]);

        let all: Vec<String> = store
            .list_children("", true)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(all, vec!["Sub", "Sub/b.md", "a.md"]);
    }

    #[tokio::test]
    async fn test_trash_and_permanent_delete() {
        let (dir, store) = store();
        store.write_file("a.md", "a").await.unwrap();
        store.delete("a.md", true).await.unwrap();
        assert!(dir.path().join(".trash/a.md").is_file());

        store.write_file("a.md", "again").await.unwrap();
        store.delete("a.md", true).await.unwrap();
        assert!(dir.path().join(".trash/a 1.md").is_file());

        store.write_file("Old/x.md", "x").await.unwrap();
        store.delete("Old", false).await.unwrap();
        assert!(!dir.path().join("Old").exists());

        assert!(matches!(
            store.delete("ghost.md", true).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_move_copy() {
        let (_dir, store) = store();
        store.write_file("Inbox/a.md", "a").await.unwrap();

        assert_eq!(store.rename("Inbox/a.md", "b.md").await.unwrap(), "Inbox/b.md");
        assert_eq!(
            store.move_to("Inbox/b.md", "Archive/2024").await.unwrap(),
            "Archive/2024/b.md"
        );
        store.copy("Archive/2024/b.md", "Copies/b.md").await.unwrap();
        assert_eq!(store.read_file("Copies/b.md").await.unwrap().content, "a");

        assert!(matches!(
            store.rename("Inbox/missing.md", "x.md").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.copy("Archive/2024/b.md", "Copies/b.md").await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let (_dir, store) = store();
        assert!(matches!(
            store.write_file("../escape.md", "x").await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_cache() {
        let (_dir, store) = store();
        store
            .write_file("n.md", "# Head\nbody #tag [[Link]]\n")
            .await
            .unwrap();
        assert!(store.cached_metadata("n.md").await.is_none());

        let metadata = store.metadata("n.md").await.unwrap();
        assert_eq!(metadata.tags, vec!["tag"]);
        assert_eq!(metadata.links, vec!["Link"]);
        assert_eq!(metadata.headings[0].text, "Head");
        assert_eq!(store.cached_metadata("n.md").await, Some(metadata));

        store.write_file("n.md", "plain").await.unwrap();
        assert!(store.cached_metadata("n.md").await.is_none());
    }

    #[tokio::test]
    async fn test_create_directory() {
        let (dir, store) = store();
        store.create_directory("A/B/C").await.unwrap();
        store.create_directory("A/B/C").await.unwrap();
        assert!(dir.path().join("A/B/C").is_dir());

        store.write_file("file.md", "").await.unwrap();
        assert!(matches!(
            store.create_directory("file.md").await,
            Err(StoreError::AlreadyExists(_))
        ));
    }
}
