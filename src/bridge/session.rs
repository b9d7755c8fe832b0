//! One agent session: a supervised process, its router and cache, and the
//! outbound queue that keeps a single exchange in flight.

use crate::bridge::locator::PathLocator;
use crate::bridge::protocol::{AgentMessage, BridgeEvent, BridgeMessage, FunctionCall, ReturnStatus};
use crate::bridge::router::{ExchangeSignal, MessageRouter, Routed};
use crate::bridge::supervisor::{ProcessSupervisor, SupervisorState};
use crate::config::{AgentConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::tools::ToolResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Host-side handler for `function_call` messages
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    async fn call_tool(&self, agent_id: &str, name: &str, args: Value) -> ToolResult;
}

/// Why an exchange stopped waiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// An `assistant_message` arrived
    Assistant,
    /// The agent printed the completion sentinel
    Sentinel,
    /// No activity within the completion timeout
    IdleTimeout,
    /// Cancelled by the caller; the process keeps running
    Cancelled,
    /// Agent output ended
    Closed(String),
}

/// Result of one `send_message`
#[derive(Debug, Clone)]
pub struct Exchange {
    pub request_id: String,
    /// Agent messages streamed during the exchange, in arrival order
    pub messages: Vec<AgentMessage>,
    pub completion: Completion,
}

impl Exchange {
    /// Content of the final assistant message, if there was one
    pub fn reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_terminal())
            .and_then(|m| m.content())
    }
}

/// A single agent identity's process, cache, and exchange state
pub struct AgentSession {
    agent_id: String,
    agent: AgentConfig,
    timeouts: TimeoutConfig,
    supervisor: Arc<ProcessSupervisor>,
    router: Arc<MessageRouter>,
    tools: Option<Arc<dyn ToolCallHandler>>,
    /// Held for the duration of an exchange
    outbound: Mutex<()>,
    queued: AtomicUsize,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Serializes starts
    lifecycle: Mutex<()>,
}

impl AgentSession {
    pub fn new(
        agent_id: impl Into<String>,
        agent: AgentConfig,
        timeouts: TimeoutConfig,
        cache_capacity: usize,
        tools: Option<Arc<dyn ToolCallHandler>>,
    ) -> Self {
        let agent_id = agent_id.into();
        let supervisor = Arc::new(ProcessSupervisor::new(agent_id.clone(), timeouts.clone()));
        let router = Arc::new(MessageRouter::new(
            agent_id.clone(),
            cache_capacity,
            supervisor.event_sender(),
            supervisor.pending(),
        ));
        Self {
            agent_id,
            agent,
            timeouts,
            supervisor,
            router,
            tools,
            outbound: Mutex::new(()),
            queued: AtomicUsize::new(0),
            pump: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn state(&self) -> SupervisorState {
        self.supervisor.state().await
    }

    pub async fn is_ready(&self) -> bool {
        self.supervisor.is_ready().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.supervisor.subscribe()
    }

    /// Sends waiting behind the active exchange
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the agent process and the routing pump
    pub async fn start(&self, locator: Option<&PathLocator>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked(locator).await
    }

    /// Start unless already ready. Returns whether this call started it.
    ///
    /// Concurrent callers queue behind the first; later ones see it ready.
    pub async fn ensure_started(&self, locator: Option<&PathLocator>) -> Result<bool> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.supervisor.is_ready().await {
            return Ok(false);
        }
        self.start_locked(locator).await?;
        Ok(true)
    }

    async fn start_locked(&self, locator: Option<&PathLocator>) -> Result<()> {
        let values = self.supervisor.start(&self.agent, locator).await?;

        let pump = tokio::spawn(pump(
            self.agent_id.clone(),
            self.router.clone(),
            self.supervisor.clone(),
            self.tools.clone(),
            values,
        ));
        if let Some(previous) = self.pump.lock().await.replace(pump) {
            previous.abort();
        }

        tracing::info!(agent_id = %self.agent_id, "Agent session started");
        Ok(())
    }

    /// Stop the process. The cache survives until the session is dropped.
    pub async fn stop(&self) {
        self.supervisor.stop().await;
        self.router.close_active("session stopped").await;
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
    }

    // =========================================================================
    // Exchanges
    // =========================================================================

    /// Send user input and collect messages until the exchange completes
    pub async fn send_message<F>(
        &self,
        content: &str,
        images: Option<&[Value]>,
        mut on_message: F,
        cancel: Option<CancellationToken>,
    ) -> Result<Exchange>
    where
        F: FnMut(&AgentMessage) + Send,
    {
        let cancel = cancel.unwrap_or_default();

        self.queued.fetch_add(1, Ordering::SeqCst);
        let turn = tokio::select! {
            guard = self.outbound.lock() => Some(guard),
            _ = cancel.cancelled() => None,
        };
        self.queued.fetch_sub(1, Ordering::SeqCst);
        let Some(_turn) = turn else {
            return Ok(Exchange {
                request_id: String::new(),
                messages: Vec::new(),
                completion: Completion::Cancelled,
            });
        };

        if !self.supervisor.is_ready().await {
            return Err(Error::NotReady(self.agent_id.clone()));
        }

        let request = BridgeMessage::user_request(content, images);
        let mut signals = self.router.open_exchange(&request.id).await;
        if let Err(e) = self.supervisor.write(&request).await {
            self.router.close_exchange(&request.id).await;
            return Err(e);
        }
        tracing::debug!(agent_id = %self.agent_id, request_id = %request.id, "Exchange started");

        let idle = self.timeouts.completion_timeout();
        let mut messages = Vec::new();
        let completion = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Completion::Cancelled,
                signal = tokio::time::timeout(idle, signals.recv()) => match signal {
                    Err(_) => break Completion::IdleTimeout,
                    Ok(None) => break Completion::Closed("exchange channel closed".to_string()),
                    Ok(Some(ExchangeSignal::Done)) => break Completion::Sentinel,
                    Ok(Some(ExchangeSignal::Closed(reason))) => break Completion::Closed(reason),
                    Ok(Some(ExchangeSignal::Message(message))) => {
                        on_message(&message);
                        let terminal = message.is_terminal();
                        messages.push(message);
                        if terminal {
                            break Completion::Assistant;
                        }
                    }
                },
            }
        };

        self.router.close_exchange(&request.id).await;
        tracing::debug!(
            agent_id = %self.agent_id,
            request_id = %request.id,
            completion = ?completion,
            messages = messages.len(),
            "Exchange finished"
        );

        Ok(Exchange {
            request_id: request.id,
            messages,
            completion,
        })
    }

    /// Correlated request/response with the configured timeout
    pub async fn request(&self, payload: Value) -> Result<Value> {
        self.supervisor
            .request(payload, self.timeouts.request_timeout())
            .await
    }

    // =========================================================================
    // Cache
    // =========================================================================

    pub async fn snapshot(&self) -> Vec<AgentMessage> {
        self.router.snapshot().await
    }

    pub async fn clear_cache(&self) {
        self.router.clear_cache().await;
    }
}

/// Drain parsed stdout values through the router
async fn pump(
    agent_id: String,
    router: Arc<MessageRouter>,
    supervisor: Arc<ProcessSupervisor>,
    tools: Option<Arc<dyn ToolCallHandler>>,
    mut values: mpsc::UnboundedReceiver<Value>,
) {
    while let Some(value) = values.recv().await {
        if let Routed::Message(AgentMessage::FunctionCall { function_call }) = router.route(value).await {
            match &tools {
                Some(handler) => {
                    tokio::spawn(dispatch_tool_call(
                        agent_id.clone(),
                        supervisor.clone(),
                        handler.clone(),
                        function_call,
                    ));
                }
                None => {
                    tracing::warn!(
                        agent_id = %agent_id,
                        tool = %function_call.name,
                        "Tool call received but no tool handler is configured"
                    );
                    let reply = BridgeMessage::function_return(
                        &function_call.name,
                        ReturnStatus::Error,
                        "no tools are available in this session",
                    );
                    if let Err(e) = supervisor.write(&reply).await {
                        tracing::warn!(agent_id = %agent_id, "Failed to return tool result: {}", e);
                    }
                }
            }
        }
    }
    router.close_active("agent output closed").await;
    tracing::debug!(agent_id = %agent_id, "Routing pump finished");
}

/// Run one tool call and write its `function_return`
async fn dispatch_tool_call(
    agent_id: String,
    supervisor: Arc<ProcessSupervisor>,
    handler: Arc<dyn ToolCallHandler>,
    call: FunctionCall,
) {
    let result = match call.parsed_arguments() {
        Ok(args) => handler.call_tool(&agent_id, &call.name, args).await,
        Err(e) => ToolResult::error(e),
    };

    let (status, message) = if result.success {
        let message = result
            .data
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string());
        (ReturnStatus::Success, message)
    } else {
        let message = result
            .error
            .unwrap_or_else(|| format!("tool '{}' failed", call.name));
        (ReturnStatus::Error, message)
    };

    tracing::info!(
        agent_id = %agent_id,
        tool = %call.name,
        success = result.success,
        "Tool call finished"
    );

    let reply = BridgeMessage::function_return(&call.name, status, &message);
    if let Err(e) = supervisor.write(&reply).await {
        tracing::warn!(agent_id = %agent_id, tool = %call.name, "Failed to return tool result: {}", e);
    }
}
