//! Bridge manager
//!
//! Composition root that owns one [`AgentSession`] per agent identity and
//! multiplexes their lifecycle events onto a single broadcast channel.

use crate::bridge::locator::{LocateSpec, PathLocator};
use crate::bridge::protocol::{AgentMessage, BridgeEvent};
use crate::bridge::session::{AgentSession, Exchange, ToolCallHandler};
use crate::config::{AgentConfig, NotebridgeConfig};
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

const MANAGER_EVENT_CAPACITY: usize = 1024;

/// Manages every agent session of the host
pub struct BridgeManager {
    config: NotebridgeConfig,
    sessions: Arc<RwLock<HashMap<String, Arc<AgentSession>>>>,
    tools: Option<Arc<dyn ToolCallHandler>>,
    locator: Option<Arc<PathLocator>>,
    events: broadcast::Sender<BridgeEvent>,
}

impl BridgeManager {
    /// Create a manager. Discovery uses the host's conventional install
    /// locations unless `agent.disable_discovery` is set.
    pub fn new(config: NotebridgeConfig, tools: Option<Arc<dyn ToolCallHandler>>) -> Self {
        let locator = if config.agent.disable_discovery {
            None
        } else {
            Some(Arc::new(PathLocator::for_host(LocateSpec::from(&config.agent))))
        };
        Self::with_locator(config, tools, locator)
    }

    /// Create a manager with an explicit locator (or none)
    pub fn with_locator(
        config: NotebridgeConfig,
        tools: Option<Arc<dyn ToolCallHandler>>,
        locator: Option<Arc<PathLocator>>,
    ) -> Self {
        let (events, _) = broadcast::channel(MANAGER_EVENT_CAPACITY);
        Self {
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            tools,
            locator,
            events,
        }
    }

    pub fn config(&self) -> &NotebridgeConfig {
        &self.config
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Connect an agent using the configured `[agent]` launch settings
    pub async fn connect(&self, agent_id: &str) -> Result<Arc<AgentSession>> {
        self.connect_with(agent_id, self.config.agent.clone()).await
    }

    /// Connect an agent with its own launch settings.
    ///
    /// Reuses a ready session; restarts a closed one.
    pub async fn connect_with(&self, agent_id: &str, agent: AgentConfig) -> Result<Arc<AgentSession>> {
        let (session, created) = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(agent_id) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let session = Arc::new(AgentSession::new(
                        agent_id,
                        agent,
                        self.config.timeouts.clone(),
                        self.config.cache.capacity,
                        self.tools.clone(),
                    ));
                    sessions.insert(agent_id.to_string(), session.clone());
                    (session, true)
                }
            }
        };

        if created {
            self.forward_events(&session);
        }

        match session.ensure_started(self.locator.as_deref()).await {
            Ok(true) => tracing::info!(agent_id, "Agent connected"),
            Ok(false) => {}
            Err(e) => {
                if created {
                    let mut sessions = self.sessions.write().await;
                    if sessions.get(agent_id).is_some_and(|s| Arc::ptr_eq(s, &session)) {
                        sessions.remove(agent_id);
                    }
                }
                return Err(e);
            }
        }
        Ok(session)
    }

    /// Copy a session's events onto the manager channel
    fn forward_events(&self, session: &AgentSession) {
        let mut rx = session.subscribe();
        let tx = self.events.clone();
        let agent_id = session.agent_id().to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(agent_id = %agent_id, skipped, "Event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Stop an agent and discard its session and cache
    pub async fn disconnect(&self, agent_id: &str) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(agent_id)
            .ok_or_else(|| Error::SessionNotFound(agent_id.to_string()))?;
        session.stop().await;
        tracing::info!(agent_id, "Agent disconnected");
        Ok(())
    }

    /// Stop every agent
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<AgentSession>> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        let count = sessions.len();
        futures::future::join_all(sessions.iter().map(|s| s.stop())).await;
        tracing::info!(count, "Bridge manager shut down");
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Send text to an agent and wait for the exchange to complete
    pub async fn send(&self, agent_id: &str, content: &str) -> Result<Exchange> {
        self.send_streaming(agent_id, content, None, |_| {}, None)
            .await
    }

    /// Send with a streaming callback, optional images, and cancellation
    pub async fn send_streaming<F>(
        &self,
        agent_id: &str,
        content: &str,
        images: Option<&[Value]>,
        on_message: F,
        cancel: Option<CancellationToken>,
    ) -> Result<Exchange>
    where
        F: FnMut(&AgentMessage) + Send,
    {
        let session = self.session(agent_id).await?;
        session.send_message(content, images, on_message, cancel).await
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub async fn session(&self, agent_id: &str) -> Result<Arc<AgentSession>> {
        self.sessions
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(agent_id.to_string()))
    }

    pub async fn is_connected(&self, agent_id: &str) -> bool {
        match self.session(agent_id).await {
            Ok(session) => session.is_ready().await,
            Err(_) => false,
        }
    }

    /// Cached messages of one agent, oldest first
    pub async fn snapshot(&self, agent_id: &str) -> Result<Vec<AgentMessage>> {
        Ok(self.session(agent_id).await?.snapshot().await)
    }

    pub async fn clear_cache(&self, agent_id: &str) -> Result<()> {
        self.session(agent_id).await?.clear_cache().await;
        Ok(())
    }

    /// Known agent ids, sorted
    pub async fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Events from every session
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }
}
