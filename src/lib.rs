//! Notebridge - stdio agent bridge with permission-gated document tools
//!
//! Notebridge lets a host application drive external AI agent processes
//! that speak newline-delimited JSON over stdin/stdout, and answers the
//! agents' tool calls with a set of document tools that run against a
//! note store behind a permission gate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        BridgeManager                          │
//! │   agent id ──► AgentSession (one exchange in flight)          │
//! │                   │                                           │
//! │                   ▼                                           │
//! │            ProcessSupervisor ──► agent stdin (NDJSON)         │
//! │                   ▲                                           │
//! │   agent stdout ──► LineProtocolCodec ──► MessageRouter        │
//! │                                   │        │        │         │
//! │                               exchange   events   cache       │
//! └───────────────────────────────────┼───────────────────────────┘
//!                                     │ function_call
//! ┌───────────────────────────────────▼───────────────────────────┐
//! │                        ToolDispatcher                          │
//! │   ToolRegistry ──► PermissionGuard ──► DocumentStore           │
//! │                    (blocked paths,      (FsStore /             │
//! │                     approval)            MemoryStore)          │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`bridge`]: process supervision, wire protocol, routing, sessions
//! - [`tools`]: tool registry, permission guard, document stores, built-in tools
//! - [`config`]: configuration management
//! - [`error`]: error types

pub mod bridge;
pub mod config;
pub mod error;
pub mod tools;

pub use bridge::{AgentMessage, AgentSession, BridgeEvent, BridgeManager, Completion, Exchange};
pub use config::NotebridgeConfig;
pub use error::{Error, Result};
pub use tools::{ToolDispatcher, ToolRegistry, ToolResult};
