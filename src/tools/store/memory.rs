//! In-memory document store

use crate::tools::guard::normalize_path;
use crate::tools::store::{
    base_name, is_hidden, join, markdown, parent_dir, unique_name, DocumentMetadata,
    DocumentStore, Entry, FileContent, FileStat, StoreError, StoreResult, WriteOutcome,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Node {
    File {
        content: String,
        created: i64,
        modified: i64,
    },
    Dir {
        created: i64,
    },
}

impl Node {
    fn stat(&self) -> FileStat {
        match self {
            Node::File {
                content,
                created,
                modified,
            } => FileStat {
                size: content.len() as u64,
                is_dir: false,
                created: Some(*created),
                modified: Some(*modified),
            },
            Node::Dir { created } => FileStat {
                size: 0,
                is_dir: true,
                created: Some(*created),
                modified: Some(*created),
            },
        }
    }
}

type Nodes = BTreeMap<String, Node>;

/// A [`DocumentStore`] kept entirely in memory
pub struct MemoryStore {
    nodes: RwLock<Nodes>,
    metadata_cache: RwLock<HashMap<String, DocumentMetadata>>,
    trash_dir: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_trash_dir(".trash")
    }

    pub fn with_trash_dir(trash_dir: &str) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            metadata_cache: RwLock::new(HashMap::new()),
            trash_dir: normalize_path(trash_dir),
        }
    }

    /// Seed a file, creating parent folders
    pub async fn insert(&self, path: &str, content: &str) -> StoreResult<()> {
        self.write_file(path, content).await.map(|_| ())
    }

    /// All stored paths, trash included
    pub async fn paths(&self) -> Vec<String> {
        self.nodes.read().await.keys().cloned().collect()
    }

    async fn invalidate(&self, path: &str) {
        let prefix = format!("{}/", path);
        self.metadata_cache
            .write()
            .await
            .retain(|key, _| key != path && !key.starts_with(&prefix));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn target(path: &str) -> StoreResult<String> {
    let path = normalize_path(path);
    if path.is_empty() {
        return Err(StoreError::InvalidPath("the store root is not a valid target".to_string()));
    }
    if path.split('/').any(|s| s == "..") {
        return Err(StoreError::InvalidPath(format!("{} escapes the store", path)));
    }
    Ok(path)
}

/// Make sure every ancestor of `path` is a folder
fn ensure_parents(nodes: &mut Nodes, path: &str, now: i64) -> StoreResult<()> {
    let mut dir = String::new();
    let parent = parent_dir(path);
    if parent.is_empty() {
        return Ok(());
    }
    for segment in parent.split('/') {
        dir = join(&dir, segment);
        match nodes.get(&dir) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(StoreError::InvalidPath(format!("{} is a file", dir)));
            }
            None => {
                nodes.insert(dir.clone(), Node::Dir { created: now });
            }
        }
    }
    Ok(())
}

/// Keys of `path` and everything beneath it
fn subtree(nodes: &Nodes, path: &str) -> Vec<String> {
    let prefix = format!("{}/", path);
    nodes
        .keys()
        .filter(|k| k.as_str() == path || k.starts_with(&prefix))
        .cloned()
        .collect()
}

fn move_subtree(nodes: &mut Nodes, from: &str, to: &str) {
    for key in subtree(nodes, from) {
        if let Some(node) = nodes.remove(&key) {
            let moved = format!("{}{}", to, &key[from.len()..]);
            nodes.insert(moved, node);
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_file(&self, path: &str) -> StoreResult<FileContent> {
        let path = target(path)?;
        match self.nodes.read().await.get(&path) {
            Some(node @ Node::File { content, .. }) => Ok(FileContent {
                content: content.clone(),
                stat: node.stat(),
            }),
            Some(Node::Dir { .. }) => Err(StoreError::InvalidPath(format!("{} is a folder", path))),
            None => Err(StoreError::NotFound(path)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> StoreResult<WriteOutcome> {
        let path = target(path)?;
        let now = now_millis();
        let outcome = {
            let mut nodes = self.nodes.write().await;
            match nodes.get_mut(&path) {
                Some(Node::File {
                    content: existing,
                    modified,
                    ..
                }) => {
                    *existing = content.to_string();
                    *modified = now;
                    WriteOutcome::Modified
                }
                Some(Node::Dir { .. }) => {
                    return Err(StoreError::InvalidPath(format!("{} is a folder", path)));
                }
                None => {
                    ensure_parents(&mut nodes, &path, now)?;
                    nodes.insert(
                        path.clone(),
                        Node::File {
                            content: content.to_string(),
                            created: now,
                            modified: now,
                        },
                    );
                    WriteOutcome::Created
                }
            }
        };
        self.invalidate(&path).await;
        Ok(outcome)
    }

    async fn list_children(&self, path: &str, recursive: bool) -> StoreResult<Vec<Entry>> {
        let dir = normalize_path(path);
        let nodes = self.nodes.read().await;
        if !dir.is_empty() {
            match nodes.get(&dir) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(StoreError::InvalidPath(format!("{} is a file", dir)));
                }
                None => return Err(StoreError::NotFound(dir)),
            }
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let entries = nodes
            .iter()
            .filter_map(|(key, node)| {
                let relative = key.strip_prefix(&prefix)?;
                if relative.is_empty() || is_hidden(relative) {
                    return None;
                }
                if !recursive && relative.contains('/') {
                    return None;
                }
                let stat = node.stat();
                Some(Entry {
                    path: key.clone(),
                    name: base_name(key).to_string(),
                    is_dir: stat.is_dir,
                    size: stat.size,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn delete(&self, path: &str, to_trash: bool) -> StoreResult<()> {
        let path = target(path)?;
        {
            let mut nodes = self.nodes.write().await;
            if !nodes.contains_key(&path) {
                return Err(StoreError::NotFound(path));
            }
            if to_trash {
                let now = now_millis();
                let trash = self.trash_dir.clone();
                if !nodes.contains_key(&trash) {
                    ensure_parents(&mut nodes, &join(&trash, "x"), now)?;
                    nodes.insert(trash.clone(), Node::Dir { created: now });
                }
                let name = unique_name(base_name(&path), |n| nodes.contains_key(&join(&trash, n)));
                move_subtree(&mut nodes, &path, &join(&trash, &name));
            } else {
                for key in subtree(&nodes, &path) {
                    nodes.remove(&key);
                }
            }
        }
        self.invalidate(&path).await;
        Ok(())
    }

    async fn rename(&self, path: &str, new_name: &str) -> StoreResult<String> {
        let path = target(path)?;
        if new_name.is_empty() || new_name.contains('/') || new_name.contains('\\') {
            return Err(StoreError::InvalidPath(format!("invalid name: {}", new_name)));
        }
        let dest = join(parent_dir(&path), new_name);
        {
            let mut nodes = self.nodes.write().await;
            if !nodes.contains_key(&path) {
                return Err(StoreError::NotFound(path));
            }
            if nodes.contains_key(&dest) {
                return Err(StoreError::AlreadyExists(dest));
            }
            move_subtree(&mut nodes, &path, &dest);
        }
        self.invalidate(&path).await;
        Ok(dest)
    }

    async fn move_to(&self, path: &str, dest_dir: &str) -> StoreResult<String> {
        let path = target(path)?;
        let dest_dir = normalize_path(dest_dir);
        let dest = join(&dest_dir, base_name(&path));
        if dest_dir == path || dest_dir.starts_with(&format!("{}/", path)) {
            return Err(StoreError::InvalidPath(format!(
                "cannot move {} into itself",
                path
            )));
        }
        {
            let mut nodes = self.nodes.write().await;
            if !nodes.contains_key(&path) {
                return Err(StoreError::NotFound(path));
            }
            if nodes.contains_key(&dest) {
                return Err(StoreError::AlreadyExists(dest));
            }
            let now = now_millis();
            ensure_parents(&mut nodes, &dest, now)?;
            move_subtree(&mut nodes, &path, &dest);
        }
        self.invalidate(&path).await;
        Ok(dest)
    }

    async fn copy(&self, src: &str, dest: &str) -> StoreResult<()> {
        let src = target(src)?;
        let dest = target(dest)?;
        let mut nodes = self.nodes.write().await;
        let content = match nodes.get(&src) {
            Some(Node::File { content, .. }) => content.clone(),
            Some(Node::Dir { .. }) => {
                return Err(StoreError::InvalidPath(format!("{} is a folder", src)));
            }
            None => return Err(StoreError::NotFound(src)),
        };
        if nodes.contains_key(&dest) {
            return Err(StoreError::AlreadyExists(dest));
        }
        let now = now_millis();
        ensure_parents(&mut nodes, &dest, now)?;
        nodes.insert(
            dest,
            Node::File {
                content,
                created: now,
                modified: now,
            },
        );
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> StoreResult<()> {
        let path = target(path)?;
        let mut nodes = self.nodes.write().await;
        match nodes.get(&path) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(StoreError::AlreadyExists(path)),
            None => {
                let now = now_millis();
                ensure_parents(&mut nodes, &path, now)?;
                nodes.insert(path, Node::Dir { created: now });
                Ok(())
            }
        }
    }

    async fn metadata(&self, path: &str) -> StoreResult<DocumentMetadata> {
        let file = self.read_file(path).await?;
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
            .insert(normalize_path(path), metadata.clone());
        Ok(metadata)
    }

    async fn exists(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path.is_empty() || self.nodes.read().await.contains_key(&path)
    }

    async fn stat(&self, path: &str) -> StoreResult<FileStat> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Ok(FileStat {
                is_dir: true,
                ..Default::default()
            });
        }
        self.nodes
            .read()
            .await
            .get(&path)
            .map(Node::stat)
            .ok_or(StoreError::NotFound(path))
    }

    async fn cached_metadata(&self, path: &str) -> Option<DocumentMetadata> {
        self.metadata_cache
            .read()
            .await
            .get(&normalize_path(path))
            .cloned()
    }
}
