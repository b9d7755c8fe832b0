//! Message routing for one agent session
//!
//! Classifies each parsed stdout value and delivers it:
//! - agent messages go to the cache first, then to the active exchange and
//!   to persistent subscribers
//! - `response` envelopes resolve pending requests
//! - `error` envelopes become `BridgeEvent::Error`
//! - the completion sentinel finishes the active exchange

use crate::bridge::cache::MessageCache;
use crate::bridge::protocol::{AgentMessage, BridgeEvent, DONE_SENTINEL};
use crate::bridge::supervisor::PendingRequests;
use crate::error::Error;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

/// A parsed stdout value, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Agent(AgentMessage),
    Response { id: String, payload: Value },
    Error { id: Option<String>, message: String },
    Done,
    Ignored,
}

impl Inbound {
    pub fn classify(value: Value) -> Self {
        if is_sentinel(&value) {
            return Inbound::Done;
        }

        let Some(map) = value.as_object() else {
            return Inbound::Ignored;
        };

        if map.contains_key("message_type") {
            return match serde_json::from_value::<AgentMessage>(value) {
                Ok(message) => Inbound::Agent(message),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring unrecognized agent message");
                    Inbound::Ignored
                }
            };
        }

        let id = map.get("id").and_then(Value::as_str).map(str::to_string);
        match map.get("type").and_then(Value::as_str) {
            Some("response") => match id {
                Some(id) => Inbound::Response {
                    id,
                    payload: map.get("payload").cloned().unwrap_or(Value::Null),
                },
                None => Inbound::Ignored,
            },
            Some("error") => {
                let payload = map.get("payload").unwrap_or(&value);
                Inbound::Error {
                    id,
                    message: error_text(payload),
                }
            }
            _ => Inbound::Ignored,
        }
    }
}

/// `"[DONE]"` or `{"type":"done"}`
pub fn is_sentinel(value: &Value) -> bool {
    match value {
        Value::String(s) => s == DONE_SENTINEL,
        Value::Object(map) => map.get("type").and_then(Value::as_str) == Some("done"),
        _ => false,
    }
}

fn error_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        other => other.to_string(),
    }
}

/// What reached an active exchange
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeSignal {
    Message(AgentMessage),
    /// Completion sentinel
    Done,
    /// Agent output ended; carries the reason
    Closed(String),
}

/// Outcome of routing one value
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Message(AgentMessage),
    Resolved(String),
    /// Response for an id nobody is waiting on
    Unmatched(String),
    Error(String),
    Done,
    Ignored,
}

struct ExchangeSlot {
    request_id: String,
    tx: mpsc::UnboundedSender<ExchangeSignal>,
}

/// Per-session router
pub struct MessageRouter {
    agent_id: String,
    cache: Mutex<MessageCache>,
    /// At most one exchange receives streamed messages
    exchange: Mutex<Option<ExchangeSlot>>,
    events: broadcast::Sender<BridgeEvent>,
    pending: Arc<PendingRequests>,
}

impl MessageRouter {
    pub fn new(
        agent_id: impl Into<String>,
        cache_capacity: usize,
        events: broadcast::Sender<BridgeEvent>,
        pending: Arc<PendingRequests>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            cache: Mutex::new(MessageCache::new(cache_capacity)),
            exchange: Mutex::new(None),
            events,
            pending,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Route one parsed value
    pub async fn route(&self, value: Value) -> Routed {
        match Inbound::classify(value) {
            Inbound::Agent(message) => {
                // Cache before any delivery
                self.cache.lock().await.push(message.clone());
                self.forward(ExchangeSignal::Message(message.clone())).await;
                let _ = self.events.send(BridgeEvent::Message {
                    agent_id: self.agent_id.clone(),
                    message: message.clone(),
                });
                Routed::Message(message)
            }
            Inbound::Response { id, payload } => {
                if self.pending.resolve(&id, payload).await {
                    Routed::Resolved(id)
                } else {
                    tracing::debug!(agent_id = %self.agent_id, id = %id, "Response for unknown request");
                    Routed::Unmatched(id)
                }
            }
            Inbound::Error { id, message } => {
                tracing::warn!(agent_id = %self.agent_id, "Agent reported error: {}", message);
                if let Some(id) = &id {
                    self.pending.fail(id, Error::Agent(message.clone())).await;
                }
                let _ = self.events.send(BridgeEvent::Error {
                    agent_id: self.agent_id.clone(),
                    message: message.clone(),
                });
                Routed::Error(message)
            }
            Inbound::Done => {
                self.forward(ExchangeSignal::Done).await;
                Routed::Done
            }
            Inbound::Ignored => Routed::Ignored,
        }
    }

    async fn forward(&self, signal: ExchangeSignal) {
        let mut slot = self.exchange.lock().await;
        if let Some(active) = slot.as_ref() {
            if active.tx.send(signal).is_err() {
                // Receiver went away without closing the exchange
                *slot = None;
            }
        }
    }

    // =========================================================================
    // Exchange slot
    // =========================================================================

    /// Install the active exchange and return its signal stream
    pub async fn open_exchange(&self, request_id: &str) -> mpsc::UnboundedReceiver<ExchangeSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.exchange.lock().await.replace(ExchangeSlot {
            request_id: request_id.to_string(),
            tx,
        });
        if let Some(previous) = previous {
            tracing::warn!(
                agent_id = %self.agent_id,
                superseded = %previous.request_id,
                "Exchange replaced while still active"
            );
            let _ = previous
                .tx
                .send(ExchangeSignal::Closed("superseded".to_string()));
        }
        rx
    }

    /// Clear the slot if it still belongs to `request_id`
    pub async fn close_exchange(&self, request_id: &str) {
        let mut slot = self.exchange.lock().await;
        if slot.as_ref().map(|s| s.request_id.as_str()) == Some(request_id) {
            *slot = None;
        }
    }

    /// End whatever exchange is active
    pub async fn close_active(&self, reason: &str) {
        if let Some(active) = self.exchange.lock().await.take() {
            let _ = active.tx.send(ExchangeSignal::Closed(reason.to_string()));
        }
    }

    /// Request id of the active exchange
    pub async fn active_exchange(&self) -> Option<String> {
        self.exchange
            .lock()
            .await
            .as_ref()
            .map(|s| s.request_id.clone())
    }

    // =========================================================================
    // Cache access
    // =========================================================================

    pub async fn snapshot(&self) -> Vec<AgentMessage> {
        self.cache.lock().await.snapshot()
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}
