//! Agent process bridge
//!
//! Drives external agent processes over newline-delimited JSON on
//! stdin/stdout:
//!
//! ```text
//! BridgeManager ──► AgentSession ──► ProcessSupervisor ──► agent stdin
//!                        ▲
//! agent stdout ──► LineProtocolCodec ──► MessageRouter ──► exchange / events / cache
//! ```

pub mod cache;
pub mod codec;
pub mod locator;
pub mod manager;
pub mod protocol;
pub mod router;
pub mod session;
pub mod supervisor;

pub use cache::MessageCache;
pub use codec::LineProtocolCodec;
pub use locator::{CandidateProvider, Launch, PathLocator, UnixCandidates, WindowsCandidates};
pub use manager::BridgeManager;
pub use protocol::{AgentMessage, BridgeEvent, BridgeMessage, MessageKind};
pub use router::MessageRouter;
pub use session::{AgentSession, Completion, Exchange, ToolCallHandler};
pub use supervisor::{ProcessSupervisor, SupervisorState};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::bridge::protocol::{AgentMessage, BridgeEvent};
    use crate::config::{AgentConfig, TimeoutConfig};
    use std::future::Future;
    use std::time::Duration;
    use tokio::sync::broadcast;

    pub fn fast_timeouts() -> TimeoutConfig {
        TimeoutConfig {
            ready_grace_ms: 100,
            stop_grace_ms: 300,
            completion_timeout_secs: 1,
            request_timeout_secs: 2,
        }
    }

    /// `/bin/sh -c <script>` as a stand-in agent
    pub fn sh_config(script: &str) -> AgentConfig {
        AgentConfig {
            executable_path: Some("/bin/sh".into()),
            args: vec!["-c".to_string(), script.to_string()],
            disable_discovery: true,
            ..Default::default()
        }
    }

    /// Next event within a few seconds, skipping lag notices
    pub async fn next_event(rx: &mut broadcast::Receiver<BridgeEvent>) -> Option<BridgeEvent> {
        let deadline = Duration::from_secs(5);
        loop {
            match tokio::time::timeout(deadline, rx.recv()).await {
                Ok(Ok(event)) => return Some(event),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    /// Poll a cache snapshot until it holds `expected` messages
    pub async fn wait_for_cache<F, Fut>(snapshot: F, expected: usize)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Vec<AgentMessage>>,
    {
        for _ in 0..100 {
            if snapshot().await.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("cache never reached {} messages", expected);
    }
}
