//! Permission gate for tool executors
//!
//! Two checks, always in this order:
//! 1. every target path is tested against the blocked-path set
//! 2. mutating operations require the session approval flag
//!
//! Blocked-path matching works on normalized paths: `\` becomes `/`, `.`
//! segments and empty segments are dropped (so leading `./`, leading or
//! trailing `/` and repeated `/` vanish), `..` pops a segment, and
//! comparison is case-sensitive. A path is blocked when it equals a
//! prefix or lies below it on a `/` boundary.
//!
//! Operations that act on a whole subtree (delete, rename, move, folder
//! copy) also refuse a source that encloses a blocked prefix, since the
//! blocked content would travel with it.

use crate::tools::definition::ToolError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Normalize a store-relative path
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in replaced.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Configured folder prefixes no tool may touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockedPaths {
    prefixes: Vec<String>,
}

impl BlockedPaths {
    /// Build from raw prefixes; empty ones (including `/` and `.`) are ignored
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = prefixes
            .into_iter()
            .map(|p| normalize_path(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();
        Self {
            prefixes: normalized,
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn is_blocked(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.prefixes.iter().any(|prefix| {
            path == *prefix
                || (path.starts_with(prefix.as_str())
                    && path.as_bytes().get(prefix.len()) == Some(&b'/'))
        })
    }

    /// True when a blocked prefix lies strictly below `path`.
    /// The store root encloses every prefix.
    pub fn encloses_blocked(&self, path: &str) -> bool {
        let path = normalize_path(path);
        if path.is_empty() {
            return !self.prefixes.is_empty();
        }
        self.prefixes.iter().any(|prefix| {
            prefix.starts_with(path.as_str()) && prefix.as_bytes().get(path.len()) == Some(&b'/')
        })
    }
}

/// Host-owned approval flag
#[derive(Debug, Clone, Default)]
pub struct Approval {
    flag: Arc<AtomicBool>,
}

impl Approval {
    pub fn new(approved: bool) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(approved)),
        }
    }

    pub fn grant(&self) {
        self.set(true);
    }

    pub fn revoke(&self) {
        self.set(false);
    }

    pub fn set(&self, approved: bool) {
        self.flag.store(approved, Ordering::SeqCst);
        tracing::info!(approved, "Tool approval changed");
    }

    pub fn is_approved(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Read-only view handed to executors
    pub fn reader(&self) -> ApprovalReader {
        ApprovalReader {
            flag: self.flag.clone(),
        }
    }
}

/// Read-only view of [`Approval`]
#[derive(Debug, Clone)]
pub struct ApprovalReader {
    flag: Arc<AtomicBool>,
}

impl ApprovalReader {
    pub fn is_approved(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Blocked-path and approval checks for one session
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    blocked: Arc<BlockedPaths>,
    approval: ApprovalReader,
}

impl PermissionGuard {
    pub fn new(blocked: BlockedPaths, approval: ApprovalReader) -> Self {
        Self {
            blocked: Arc::new(blocked),
            approval,
        }
    }

    /// Check `paths` for `operation`. Blocked paths win over approval.
    pub fn check(&self, operation: &str, paths: &[&str], mutating: bool) -> Result<(), ToolError> {
        self.check_tree(operation, &[], paths, mutating)
    }

    /// Like [`check`](Self::check), with `subtrees` additionally denied when
    /// they enclose a blocked prefix.
    pub fn check_tree(
        &self,
        operation: &str,
        subtrees: &[&str],
        paths: &[&str],
        mutating: bool,
    ) -> Result<(), ToolError> {
        if let Some(path) = subtrees
            .iter()
            .find(|p| self.blocked.is_blocked(p) || self.blocked.encloses_blocked(p))
        {
            tracing::warn!(operation, path = %path, "Denied access to folder holding a restricted folder");
            return Err(ToolError::PermissionDenied(path.to_string()));
        }
        if let Some(path) = paths.iter().find(|p| self.blocked.is_blocked(p)) {
            tracing::warn!(operation, path = %path, "Denied access to restricted folder");
            return Err(ToolError::PermissionDenied(path.to_string()));
        }
        if mutating && !self.approval.is_approved() {
            tracing::info!(operation, "Mutating tool call without approval");
            return Err(ToolError::ApprovalRequired(format!(
                "{} changes documents and needs approval",
                operation
            )));
        }
        Ok(())
    }

    pub fn is_blocked(&self, path: &str) -> bool {
        self.blocked.is_blocked(path)
    }

    pub fn is_approved(&self) -> bool {
        self.approval.is_approved()
    }
}
