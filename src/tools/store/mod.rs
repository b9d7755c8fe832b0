//! Document store collaborator
//!
//! Tools reach the host's documents only through [`DocumentStore`]. Paths are
//! store-relative and `/`-separated; the store itself applies no
//! permissioning.

pub mod fs;
pub mod markdown;
pub mod memory;

#[cfg(test)]
pub(crate) mod spy;

pub use fs::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Store-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidPath(String),

    #[error("{0}")]
    Io(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Size and timestamps of a file or folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub size: u64,
    pub is_dir: bool,
    /// Epoch milliseconds
    pub created: Option<i64>,
    /// Epoch milliseconds
    pub modified: Option<i64>,
}

/// File content with its stat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub content: String,
    pub stat: FileStat,
}

/// Whether `write_file` made a new file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Modified,
}

/// One listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Store-relative path
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Markdown heading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Derived document metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub headings: Vec<Heading>,
    pub stat: FileStat,
}

/// Narrow capability interface over the host's documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_file(&self, path: &str) -> StoreResult<FileContent>;

    /// Create or overwrite a file, creating parent folders
    async fn write_file(&self, path: &str, content: &str) -> StoreResult<WriteOutcome>;

    /// Children of a folder (`""` is the root), sorted by path
    async fn list_children(&self, path: &str, recursive: bool) -> StoreResult<Vec<Entry>>;

    /// Delete a file or folder, into the trash folder unless `to_trash` is false
    async fn delete(&self, path: &str, to_trash: bool) -> StoreResult<()>;

    /// Rename within the same folder; returns the new path
    async fn rename(&self, path: &str, new_name: &str) -> StoreResult<String>;

    /// Move into `dest_dir`, keeping the base name; returns the new path
    async fn move_to(&self, path: &str, dest_dir: &str) -> StoreResult<String>;

    async fn copy(&self, src: &str, dest: &str) -> StoreResult<()>;

    /// Create a folder and its parents; succeeds if it already exists
    async fn create_directory(&self, path: &str) -> StoreResult<()>;

    async fn metadata(&self, path: &str) -> StoreResult<DocumentMetadata>;

    async fn exists(&self, path: &str) -> bool;

    async fn stat(&self, path: &str) -> StoreResult<FileStat>;

    /// Metadata from the cache, without touching the document
    async fn cached_metadata(&self, path: &str) -> Option<DocumentMetadata>;
}

/// Last segment of a store path
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent folder of a store path (`""` for top-level entries)
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Join a folder and a name
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Hidden entries (dot-prefixed, including the trash folder) are not listed
pub(crate) fn is_hidden(relative: &str) -> bool {
    relative.split('/').any(|segment| segment.starts_with('.'))
}

/// `name`, or `stem 1.ext`, `stem 2.ext`, ... until `taken` says no
pub(crate) fn unique_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    let mut n = 1;
    loop {
        let candidate = format!("{} {}{}", stem, n, ext);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
