//! Notebridge configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main Notebridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotebridgeConfig {
    /// How to launch the agent process
    #[serde(default)]
    pub agent: AgentConfig,

    /// Bridge timing
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Message cache sizing
    #[serde(default)]
    pub cache: CacheConfig,

    /// Tool permissioning
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl NotebridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be at least 1".to_string()));
        }
        if self.timeouts.completion_timeout_secs == 0 {
            return Err(Error::Config(
                "timeouts.completion_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.timeouts.request_timeout_secs == 0 {
            return Err(Error::Config(
                "timeouts.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.agent.command.trim().is_empty() && self.agent.executable_path.is_none() {
            return Err(Error::Config(
                "agent.command must not be empty when no executable_path is set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Agent process launch configuration
///
/// Command resolution prefers `runtime_path` + `entrypoint_path` (or their
/// discovered equivalents), then `executable_path`, then the bare `command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Bare command name used as the last resort
    pub command: String,

    /// User-supplied override path to the agent executable
    pub executable_path: Option<PathBuf>,

    /// Explicit runtime (e.g. node) path
    pub runtime_path: Option<PathBuf>,

    /// Explicit agent entry script path
    pub entrypoint_path: Option<PathBuf>,

    /// Runtime executable name searched for during discovery
    pub runtime: String,

    /// Package directory name searched for during discovery
    pub package: String,

    /// Entry script relative to the package directory
    pub entry_script: String,

    /// Extra arguments passed to the agent
    pub args: Vec<String>,

    /// Working directory for the agent process
    pub cwd: Option<PathBuf>,

    /// Extra environment variables
    pub env: HashMap<String, String>,

    /// Skip runtime/entrypoint discovery entirely
    pub disable_discovery: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "letta".to_string(),
            executable_path: None,
            runtime_path: None,
            entrypoint_path: None,
            runtime: "node".to_string(),
            package: "@letta-ai/letta-code".to_string(),
            entry_script: "letta.js".to_string(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            disable_discovery: false,
        }
    }
}

/// Bridge timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Grace period after spawn during which the process must stay alive
    pub ready_grace_ms: u64,

    /// How long `stop` waits for a natural exit before escalating
    pub stop_grace_ms: u64,

    /// Inactivity window that completes an exchange
    pub completion_timeout_secs: u64,

    /// How long a correlated request waits for its response
    pub request_timeout_secs: u64,
}

impl TimeoutConfig {
    pub fn ready_grace(&self) -> Duration {
        Duration::from_millis(self.ready_grace_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ready_grace_ms: 500,
            stop_grace_ms: 2000,
            completion_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

/// Message cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum agent messages retained per session
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: crate::bridge::cache::DEFAULT_CAPACITY,
        }
    }
}

/// Tool permission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Folder prefixes no tool may touch
    pub blocked_paths: Vec<String>,

    /// Initial value of the session approval flag
    pub approved: bool,

    /// Folder (relative to the store root) receiving trashed files
    pub trash_dir: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            blocked_paths: Vec::new(),
            approved: false,
            trash_dir: ".trash".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NotebridgeConfig::default();
        assert_eq!(config.cache.capacity, 200);
        assert_eq!(config.timeouts.completion_timeout_secs, 30);
        assert_eq!(config.agent.command, "letta");
        assert!(!config.tools.approved);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: NotebridgeConfig = toml::from_str(
            r#"
            [tools]
            blocked_paths = ["Private", "Journal/2024"]

            [agent]
            command = "my-agent"
            args = ["--stdio"]
            "#,
        )
        .unwrap();

        assert_eq!(config.tools.blocked_paths.len(), 2);
        assert_eq!(config.tools.trash_dir, ".trash");
        assert_eq!(config.agent.command, "my-agent");
        assert_eq!(config.agent.runtime, "node");
        assert_eq!(config.timeouts.ready_grace_ms, 500);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = NotebridgeConfig::default();
        config.cache.capacity = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = NotebridgeConfig::default();
        config.agent.command = "  ".to_string();
        assert!(config.validate().is_err());

        config.agent.executable_path = Some(PathBuf::from("/opt/agent"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notebridge.toml");
        std::fs::write(&path, "[cache]\ncapacity = 50\n").unwrap();

        let config = NotebridgeConfig::load(&path).unwrap();
        assert_eq!(config.cache.capacity, 50);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[cache\ncapacity = ").unwrap();

        assert!(matches!(
            NotebridgeConfig::load(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let config = NotebridgeConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: NotebridgeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.agent.entry_script, config.agent.entry_script);
    }
}
