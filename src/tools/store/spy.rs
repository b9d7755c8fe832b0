//! Call-recording store for permission tests

use crate::tools::store::{
    DocumentMetadata, DocumentStore, Entry, FileContent, FileStat, MemoryStore, StoreResult,
    WriteOutcome,
};
use async_trait::async_trait;
use std::sync::Mutex;

/// Wraps a [`MemoryStore`] and records every call by method name
#[derive(Default)]
pub struct SpyStore {
    inner: MemoryStore,
    calls: Mutex<Vec<String>>,
}

impl SpyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed content without recording a call
    pub async fn seed(&self, path: &str, content: &str) {
        self.inner.insert(path, content).await.unwrap();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl DocumentStore for SpyStore {
    async fn read_file(&self, path: &str) -> StoreResult<FileContent> {
        self.record("read_file");
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> StoreResult<WriteOutcome> {
        self.record("write_file");
        self.inner.write_file(path, content).await
    }

    async fn list_children(&self, path: &str, recursive: bool) -> StoreResult<Vec<Entry>> {
        self.record("list_children");
        self.inner.list_children(path, recursive).await
    }

    async fn delete(&self, path: &str, to_trash: bool) -> StoreResult<()> {
        self.record("delete");
        self.inner.delete(path, to_trash).await
    }

    async fn rename(&self, path: &str, new_name: &str) -> StoreResult<String> {
        self.record("rename");
        self.inner.rename(path, new_name).await
    }

    async fn move_to(&self, path: &str, dest_dir: &str) -> StoreResult<String> {
        self.record("move_to");
        self.inner.move_to(path, dest_dir).await
    }

    async fn copy(&self, src: &str, dest: &str) -> StoreResult<()> {
        self.record("copy");
        self.inner.copy(src, dest).await
    }

    async fn create_directory(&self, path: &str) -> StoreResult<()> {
        self.record("create_directory");
        self.inner.create_directory(path).await
    }

    async fn metadata(&self, path: &str) -> StoreResult<DocumentMetadata> {
        self.record("metadata");
        self.inner.metadata(path).await
    }

    async fn exists(&self, path: &str) -> bool {
        self.record("exists");
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &str) -> StoreResult<FileStat> {
        self.record("stat");
        self.inner.stat(path).await
    }

    async fn cached_metadata(&self, path: &str) -> Option<DocumentMetadata> {
        self.record("cached_metadata");
        self.inner.cached_metadata(path).await
    }
}
