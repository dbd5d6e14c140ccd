use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::ids::MessageId;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Lifecycle of one tool invocation inside an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

impl ToolState {
    fn as_wire(self) -> &'static str {
        match self {
            Self::InputStreaming => "input-streaming",
            Self::InputAvailable => "input-available",
            Self::OutputAvailable => "output-available",
            Self::OutputError => "output-error",
        }
    }
}

/// Tool call/result segment. On the wire its `type` is `tool-<tool_name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPart {
    pub tool_name: String,
    pub tool_call_id: String,
    pub state: ToolState,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error_text: Option<String>,
}

impl ToolPart {
    pub fn with_input(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            state: ToolState::InputAvailable,
            input: Some(input),
            output: None,
            error_text: None,
        }
    }
}

/// One typed segment of a message.
///
/// Parts this client does not understand are kept verbatim in `Unknown` so that
/// a loaded conversation is written back exactly as the server produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum MessagePart {
    Text { text: String },
    Reasoning { text: String },
    StepStart,
    Tool(ToolPart),
    Unknown(Value),
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

impl From<Value> for MessagePart {
    fn from(value: Value) -> Self {
        let Some(kind) = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return Self::Unknown(value);
        };

        match kind.as_str() {
            "text" => match value.get("text").and_then(Value::as_str) {
                Some(text) => Self::text(text),
                None => Self::Unknown(value),
            },
            "reasoning" => match value.get("text").and_then(Value::as_str) {
                Some(text) => Self::Reasoning {
                    text: text.to_string(),
                },
                None => Self::Unknown(value),
            },
            "step-start" => Self::StepStart,
            _ => match kind.strip_prefix("tool-") {
                Some(tool_name) => decode_tool_part(tool_name, &value)
                    .map(Self::Tool)
                    .unwrap_or(Self::Unknown(value)),
                None => Self::Unknown(value),
            },
        }
    }
}

fn decode_tool_part(tool_name: &str, value: &Value) -> Option<ToolPart> {
    let tool_call_id = value.get("toolCallId")?.as_str()?.to_string();
    let state = serde_json::from_value::<ToolState>(value.get("state")?.clone()).ok()?;

    Some(ToolPart {
        tool_name: tool_name.to_string(),
        tool_call_id,
        state,
        input: value.get("input").cloned(),
        output: value.get("output").cloned(),
        error_text: value
            .get("errorText")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

impl From<MessagePart> for Value {
    fn from(part: MessagePart) -> Self {
        match part {
            MessagePart::Text { text } => json!({ "type": "text", "text": text }),
            MessagePart::Reasoning { text } => json!({ "type": "reasoning", "text": text }),
            MessagePart::StepStart => json!({ "type": "step-start" }),
            MessagePart::Tool(tool) => {
                let mut object = Map::new();
                object.insert(
                    "type".to_string(),
                    Value::String(format!("tool-{}", tool.tool_name)),
                );
                object.insert("toolCallId".to_string(), Value::String(tool.tool_call_id));
                object.insert(
                    "state".to_string(),
                    Value::String(tool.state.as_wire().to_string()),
                );
                if let Some(input) = tool.input {
                    object.insert("input".to_string(), input);
                }
                if let Some(output) = tool.output {
                    object.insert("output".to_string(), output);
                }
                if let Some(error_text) = tool.error_text {
                    object.insert("errorText".to_string(), Value::String(error_text));
                }
                Value::Object(object)
            }
            MessagePart::Unknown(value) => value,
        }
    }
}

/// One chat message: a role plus an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    pub fn new(id: MessageId, role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id,
            role,
            parts,
            metadata: None,
        }
    }

    /// Creates a user message with a freshly minted id and one text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(
            MessageId::generate(),
            Role::User,
            vec![MessagePart::text(text)],
        )
    }

    /// Creates the empty assistant message that stream deltas are accumulated into.
    pub fn assistant(id: MessageId) -> Self {
        Self::new(id, Role::Assistant, Vec::new())
    }

    /// Display text: every text part joined by newlines, trimmed.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    pub fn push_text_delta(&mut self, delta: &str) {
        if let Some(MessagePart::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
            return;
        }
        self.parts.push(MessagePart::text(delta));
    }

    pub fn push_reasoning_delta(&mut self, delta: &str) {
        if let Some(MessagePart::Reasoning { text }) = self.parts.last_mut() {
            text.push_str(delta);
            return;
        }
        self.parts.push(MessagePart::Reasoning {
            text: delta.to_string(),
        });
    }

    /// Records tool input; an existing part with the same call id is updated in place.
    pub fn upsert_tool_input(&mut self, tool_name: &str, tool_call_id: &str, input: Value) {
        if let Some(tool) = self.tool_part_mut(tool_call_id) {
            tool.input = Some(input);
            tool.state = ToolState::InputAvailable;
            return;
        }
        self.parts.push(MessagePart::Tool(ToolPart::with_input(
            tool_name,
            tool_call_id,
            input,
        )));
    }

    /// Returns false when no tool part with this call id exists.
    pub fn apply_tool_output(&mut self, tool_call_id: &str, output: Value) -> bool {
        let Some(tool) = self.tool_part_mut(tool_call_id) else {
            return false;
        };
        tool.output = Some(output);
        tool.state = ToolState::OutputAvailable;
        true
    }

    pub fn apply_tool_error(&mut self, tool_call_id: &str, error_text: &str) -> bool {
        let Some(tool) = self.tool_part_mut(tool_call_id) else {
            return false;
        };
        tool.error_text = Some(error_text.to_string());
        tool.state = ToolState::OutputError;
        true
    }

    fn tool_part_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolPart> {
        self.parts.iter_mut().find_map(|part| match part {
            MessagePart::Tool(tool) if tool.tool_call_id == tool_call_id => Some(tool),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_text_parts_and_skips_everything_else() {
        let mut message = Message::assistant(MessageId::parse("m1").expect("id"));
        message.push_reasoning_delta("thinking");
        message.push_text_delta("Hi");
        message.push_text_delta(" there");
        message.upsert_tool_input("getWeather", "call-1", json!({ "city": "Paris" }));
        message.push_text_delta("  second  ");

        assert_eq!(message.parts.len(), 4);
        assert_eq!(message.text(), "Hi there\n  second");
    }

    #[test]
    fn message_without_text_parts_has_empty_text() {
        let message = Message::new(
            MessageId::parse("m2").expect("id"),
            Role::Assistant,
            vec![MessagePart::StepStart],
        );
        assert_eq!(message.text(), "");
    }

    #[test]
    fn tool_output_updates_the_matching_call_only() {
        let mut message = Message::assistant(MessageId::parse("m3").expect("id"));
        message.upsert_tool_input("getWeather", "call-1", json!({}));

        assert!(message.apply_tool_output("call-1", json!({ "temp": 21 })));
        assert!(!message.apply_tool_output("call-404", json!(null)));

        let MessagePart::Tool(tool) = &message.parts[0] else {
            panic!("expected a tool part");
        };
        assert_eq!(tool.state, ToolState::OutputAvailable);
        assert_eq!(tool.output, Some(json!({ "temp": 21 })));
    }

    #[test]
    fn parts_decode_from_the_wire_and_keep_unknown_shapes() {
        let raw = json!({
            "id": "m4",
            "role": "assistant",
            "parts": [
                { "type": "step-start" },
                { "type": "text", "text": "Hello" },
                {
                    "type": "tool-createDocument",
                    "toolCallId": "call-9",
                    "state": "output-available",
                    "input": { "title": "Essay" },
                    "output": { "id": "doc-1" }
                },
                { "type": "data-suggestion", "data": { "x": 1 } }
            ]
        });

        let message: Message = serde_json::from_value(raw.clone()).expect("decode message");
        assert_eq!(message.role, Role::Assistant);
        assert!(matches!(message.parts[0], MessagePart::StepStart));
        assert!(matches!(
            &message.parts[2],
            MessagePart::Tool(tool) if tool.tool_name == "createDocument"
        ));
        assert!(matches!(message.parts[3], MessagePart::Unknown(_)));

        let encoded = serde_json::to_value(&message).expect("encode message");
        assert_eq!(encoded, raw);
    }
}
