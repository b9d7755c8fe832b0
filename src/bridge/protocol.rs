//! NDJSON protocol types for agent process communication
//!
//! Defines the messages exchanged with an agent over stdin/stdout:
//! - Host → Agent envelopes (`BridgeMessage`)
//! - Agent → Host conversational messages (`AgentMessage`)
//! - Bridge lifecycle events surfaced to subscribers (`BridgeEvent`)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bare JSON string line some agents print when a turn is over
pub const DONE_SENTINEL: &str = "[DONE]";

// =============================================================================
// Host → Agent envelope
// =============================================================================

/// Envelope kind, serialized as the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Event,
    Error,
}

/// Outbound envelope written to the agent's stdin, one per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    /// Correlates a response to its request
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: Value,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl BridgeMessage {
    /// Create a message with a fresh id and the current timestamp
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self {
            id: new_message_id(),
            kind,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// User input for the agent
    pub fn user_request(content: &str, images: Option<&[Value]>) -> Self {
        let mut payload = serde_json::json!({ "content": content });
        if let Some(images) = images {
            if !images.is_empty() {
                payload["images"] = Value::Array(images.to_vec());
            }
        }
        Self::new(MessageKind::Request, payload)
    }

    /// Tool result returned to the agent after a `function_call`
    pub fn function_return(tool_name: &str, status: ReturnStatus, message: &str) -> Self {
        Self::new(
            MessageKind::Response,
            serde_json::json!({
                "message_type": "function_return",
                "function_return": {
                    "name": tool_name,
                    "status": status,
                    "message": message,
                },
            }),
        )
    }

    /// Serialize as a single NDJSON line, terminator included
    pub fn to_line(&self) -> crate::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Generate a collision-resistant message id
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Outcome reported in a `function_return`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Success,
    Error,
}

// =============================================================================
// Agent → Host messages
// =============================================================================

/// Conversational message emitted by the agent, tagged by `message_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Echo of submitted input
    UserMessage {
        #[serde(default)]
        content: Option<String>,
    },
    /// Agent reasoning, not final
    InternalMonologue {
        #[serde(default)]
        content: Option<String>,
    },
    /// Agent requests a tool
    FunctionCall { function_call: FunctionCall },
    /// Tool result acknowledgment
    FunctionReturn { function_return: FunctionReturn },
    /// Terminal response for the exchange
    AssistantMessage {
        #[serde(default)]
        content: Option<String>,
    },
}

impl AgentMessage {
    /// Wire tag of this message
    pub fn message_type(&self) -> &'static str {
        match self {
            AgentMessage::UserMessage { .. } => "user_message",
            AgentMessage::InternalMonologue { .. } => "internal_monologue",
            AgentMessage::FunctionCall { .. } => "function_call",
            AgentMessage::FunctionReturn { .. } => "function_return",
            AgentMessage::AssistantMessage { .. } => "assistant_message",
        }
    }

    /// Text content, for the variants that carry any
    pub fn content(&self) -> Option<&str> {
        match self {
            AgentMessage::UserMessage { content }
            | AgentMessage::InternalMonologue { content }
            | AgentMessage::AssistantMessage { content } => content.as_deref(),
            AgentMessage::FunctionCall { .. } | AgentMessage::FunctionReturn { .. } => None,
        }
    }

    /// Whether this message ends a conversational exchange
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentMessage::AssistantMessage { .. })
    }
}

/// Tool invocation requested by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Either a JSON object or a JSON-encoded string
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Arguments as a JSON object.
    ///
    /// String-encoded arguments are decoded; an empty or null value becomes `{}`.
    pub fn parsed_arguments(&self) -> std::result::Result<Value, String> {
        match &self.arguments {
            Value::Null => Ok(Value::Object(Default::default())),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Object(Default::default())),
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| format!("arguments for '{}' are not valid JSON: {}", self.name, e)),
            other => Ok(other.clone()),
        }
    }
}

/// Tool result acknowledgment echoed by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionReturn {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Bridge events
// =============================================================================

/// Lifecycle and traffic notifications for persistent subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The agent process passed its startup grace period
    Ready { agent_id: String },
    /// An agent message was routed
    Message { agent_id: String, message: AgentMessage },
    /// Error-like stderr output or an agent `error` envelope
    Error { agent_id: String, message: String },
    /// The agent process is gone
    Closed {
        agent_id: String,
        /// True when the exit was requested through `stop`
        expected: bool,
        exit_code: Option<i32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_request_wire_shape() {
        let msg = BridgeMessage::user_request("hello", None);
        let line = msg.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let v: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(v["type"], "request");
        assert_eq!(v["payload"]["content"], "hello");
        assert!(v["payload"].get("images").is_none());
        assert!(v["timestamp"].as_i64().unwrap() > 1_700_000_000_000);
        assert!(!v["id"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_user_request_with_images() {
        let images = vec![serde_json::json!({"data": "abc", "mime": "image/png"})];
        let msg = BridgeMessage::user_request("look", Some(&images));
        assert_eq!(msg.payload["images"][0]["mime"], "image/png");
    }

    #[test]
    fn test_function_return_wire_shape() {
        let msg = BridgeMessage::function_return("read_file", ReturnStatus::Success, "{}");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "response");
        assert_eq!(v["payload"]["message_type"], "function_return");
        assert_eq!(v["payload"]["function_return"]["name"], "read_file");
        assert_eq!(v["payload"]["function_return"]["status"], "success");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = BridgeMessage::new(MessageKind::Event, Value::Null);
        let b = BridgeMessage::new(MessageKind::Event, Value::Null);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_parse_assistant_message() {
        let msg: AgentMessage =
            serde_json::from_str(r#"{"message_type":"assistant_message","content":"hi"}"#)
                .unwrap();
        assert_eq!(msg.content(), Some("hi"));
        assert!(msg.is_terminal());
        assert_eq!(msg.message_type(), "assistant_message");
    }

    #[test]
    fn test_parse_function_call_with_string_arguments() {
        let msg: AgentMessage = serde_json::from_str(
            r#"{"message_type":"function_call","function_call":{"name":"read_file","arguments":"{\"path\":\"a.md\"}"}}"#,
        )
        .unwrap();
        match msg {
            AgentMessage::FunctionCall { function_call } => {
                let args = function_call.parsed_arguments().unwrap();
                assert_eq!(args["path"], "a.md");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_function_call_bad_string_arguments() {
        let call = FunctionCall {
            name: "x".to_string(),
            arguments: Value::String("{not json".to_string()),
        };
        assert!(call.parsed_arguments().is_err());
    }

    #[test]
    fn test_function_call_missing_arguments() {
        let call = FunctionCall {
            name: "x".to_string(),
            arguments: Value::Null,
        };
        assert_eq!(call.parsed_arguments().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_unknown_message_type_is_not_agent_message() {
        let res: std::result::Result<AgentMessage, _> =
            serde_json::from_str(r#"{"message_type":"reasoning_message","content":"x"}"#);
        assert!(res.is_err());

        let res: std::result::Result<AgentMessage, _> =
            serde_json::from_str(r#"{"content":"untagged"}"#);
        assert!(res.is_err());
    }
}
