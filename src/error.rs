//! Notebridge error types

use thiserror::Error;

/// Notebridge error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The agent executable could not be launched, or died during startup
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// `start` called on a supervisor that is already running
    #[error("Agent process already started: {0}")]
    AlreadyStarted(String),

    /// Write attempted before the process signalled readiness
    #[error("Agent process not ready: {0}")]
    NotReady(String),

    /// The agent process exited while work was outstanding
    #[error("Bridge closed: {0}")]
    ProcessClosed(String),

    /// Writing to the agent's stdin failed
    #[error("Write error: {0}")]
    Write(String),

    /// A request or exchange did not complete in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The agent reported an error for a correlated request
    #[error("Agent error: {0}")]
    Agent(String),

    /// No session exists for the agent id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Notebridge operations
pub type Result<T> = std::result::Result<T, Error>;
