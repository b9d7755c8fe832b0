//! `search` tool

use super::{optional_str, optional_usize, required_str, schema};
use crate::tools::definition::{Tool, ToolContext, ToolError};
use crate::tools::guard::normalize_path;
use crate::tools::store::{base_name, DocumentMetadata};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;
const SNIPPET_CHARS: usize = 200;

/// What a query is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Name,
    Path,
    Tag,
    Content,
    /// Name, then content, then tag, then path; first hit wins
    All,
}

impl SearchMode {
    const ALL_ORDER: [SearchMode; 4] = [
        SearchMode::Name,
        SearchMode::Content,
        SearchMode::Tag,
        SearchMode::Path,
    ];

    pub fn parse(mode: &str) -> Result<Self, ToolError> {
        match mode {
            "name" => Ok(SearchMode::Name),
            "path" => Ok(SearchMode::Path),
            "tag" => Ok(SearchMode::Tag),
            "content" => Ok(SearchMode::Content),
            "all" => Ok(SearchMode::All),
            other => Err(ToolError::InvalidArgument(format!(
                "unknown search mode '{}' (expected name, content, tag, path, or all)",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct Hit {
    path: String,
    matched: SearchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
}

pub struct Search;

#[async_trait]
impl Tool for Search {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search documents by file name, full text, tag, or path"
    }

    fn parameters(&self) -> Value {
        schema(
            json!({
                "query": {"type": "string", "description": "Text, name fragment, or tag to look for"},
                "mode": {
                    "type": "string",
                    "enum": ["name", "content", "tag", "path", "all"],
                    "default": "all"
                },
                "path": {"type": "string", "description": "Limit the search to this folder"},
                "limit": {"type": "integer", "minimum": 1, "default": DEFAULT_LIMIT}
            }),
            &["query"],
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let scope = normalize_path(optional_str(&args, "path")?.unwrap_or(""));
        ctx.guard.check(self.name(), &[scope.as_str()], self.mutating())?;

        let query = required_str(&args, "query")?.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArgument("query must not be empty".to_string()));
        }
        let mode = SearchMode::parse(optional_str(&args, "mode")?.unwrap_or("all"))?;
        let limit = optional_usize(&args, "limit", DEFAULT_LIMIT)?;
        if limit == 0 {
            return Err(ToolError::InvalidArgument("limit must be at least 1".to_string()));
        }
        let limit = limit.min(MAX_LIMIT);

        let needle = query.to_lowercase();
        let candidates = ctx.store.list_children(&scope, true).await?;

        let mut hits = Vec::new();
        let mut truncated = false;
        for entry in candidates.iter().filter(|e| !e.is_dir) {
            // Blocked folders may sit anywhere below the scope
            if ctx.guard.is_blocked(&entry.path) {
                continue;
            }
            if let Some(hit) = match_candidate(ctx, &entry.path, mode, &needle).await {
                if hits.len() == limit {
                    truncated = true;
                    break;
                }
                hits.push(hit);
            }
        }

        tracing::debug!(query, mode = ?mode, hits = hits.len(), "Search finished");
        Ok(json!({
            "query": query,
            "mode": mode,
            "count": hits.len(),
            "truncated": truncated,
            "results": hits,
        }))
    }
}

async fn match_candidate(ctx: &ToolContext, path: &str, mode: SearchMode, needle: &str) -> Option<Hit> {
    match mode {
        SearchMode::All => {
            for single in SearchMode::ALL_ORDER {
                if let Some(hit) = match_single(ctx, path, single, needle).await {
                    return Some(hit);
                }
            }
            None
        }
        single => match_single(ctx, path, single, needle).await,
    }
}

async fn match_single(ctx: &ToolContext, path: &str, mode: SearchMode, needle: &str) -> Option<Hit> {
    let hit = |snippet: Option<String>| Hit {
        path: path.to_string(),
        matched: mode,
        snippet,
    };

    match mode {
        SearchMode::Name => base_name(path)
            .to_lowercase()
            .contains(needle)
            .then(|| hit(None)),
        SearchMode::Path => path.to_lowercase().contains(needle).then(|| hit(None)),
        SearchMode::Tag => {
            let tag = needle.trim_start_matches('#');
            let metadata = fresh_metadata(ctx, path).await?;
            let nested = format!("{}/", tag);
            metadata
                .tags
                .iter()
                .map(|t| t.to_lowercase())
                .any(|t| t == tag || t.starts_with(&nested))
                .then(|| hit(None))
        }
        SearchMode::Content => {
            let file = ctx.store.read_file(path).await.ok()?;
            file.content
                .lines()
                .find(|line| line.to_lowercase().contains(needle))
                .map(|line| hit(Some(snippet(line))))
        }
        SearchMode::All => None,
    }
}

/// Cached metadata while its stat still matches the file, else a fresh parse
async fn fresh_metadata(ctx: &ToolContext, path: &str) -> Option<DocumentMetadata> {
    if let Some(cached) = ctx.store.cached_metadata(path).await {
        let stat = ctx.store.stat(path).await.ok()?;
        if stat.modified == cached.stat.modified && stat.size == cached.stat.size {
            return Some(cached);
        }
    }
    ctx.store.metadata(path).await.ok()
}

fn snippet(line: &str) -> String {
    let line = line.trim();
    match line.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None => line.to_string(),
    }
}
