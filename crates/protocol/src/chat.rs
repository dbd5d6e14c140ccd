use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{EncodePayloadSnafu, ProtocolResult};
use super::ids::ChatId;
use super::message::Message;

/// Title shown for a conversation before the server generates one.
pub const DEFAULT_CHAT_TITLE: &str = "New Conversation";

/// Header carrying the server-assigned chat id on a streaming response.
pub const CHAT_ID_HEADER: &str = "x-ai-chat-id";

/// Response of `GET /api/ai/chat/{chatId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetail {
    pub id: ChatId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ChatDetail {
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            DEFAULT_CHAT_TITLE
        } else {
            &self.title
        }
    }
}

/// One row of the chat history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListItem {
    pub id: ChatId,
    #[serde(default)]
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Response of `GET /api/ai/history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryPage {
    #[serde(default)]
    pub chats: Vec<ChatListItem>,
    #[serde(default)]
    pub has_more: bool,
}

/// What caused a streaming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamTrigger {
    SubmitMessage,
    RegenerateMessage,
}

/// Body of `POST /api/ai/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub trigger: StreamTrigger,
}

impl ChatStreamBody {
    pub fn submit(
        chat_id: Option<ChatId>,
        provider: impl Into<String>,
        model: Option<String>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            chat_id,
            provider: provider.into(),
            model,
            messages,
            trigger: StreamTrigger::SubmitMessage,
        }
    }
}

/// Body of `PUT /api/ai/chat/{chatId}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavePayload<'a> {
    pub messages: &'a [Message],
    pub provider: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
}

impl<'a> SavePayload<'a> {
    pub fn new(messages: &'a [Message], provider: &'a str, model: Option<&'a str>) -> Self {
        Self {
            messages,
            provider,
            model,
        }
    }

    /// Serialized form used both as the request body and as the change-detection snapshot.
    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).context(EncodePayloadSnafu {
            stage: "encode-save-payload",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_detail_decodes_camel_case_fields() {
        let detail: ChatDetail = serde_json::from_value(json!({
            "id": "abc123",
            "title": "",
            "provider": "openai",
            "model": null,
            "createdAt": "2026-10-01T08:00:00Z",
            "updatedAt": "2026-10-01T08:05:00Z",
            "messages": [
                { "id": "m1", "role": "user", "parts": [{ "type": "text", "text": "hello" }] }
            ]
        }))
        .expect("decode chat detail");

        assert_eq!(detail.id.as_str(), "abc123");
        assert_eq!(detail.display_title(), DEFAULT_CHAT_TITLE);
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.messages[0].text(), "hello");
    }

    #[test]
    fn stream_body_omits_unknown_chat_id() {
        let body = ChatStreamBody::submit(None, "openai", None, Vec::new());
        let value = serde_json::to_value(&body).expect("encode body");

        assert_eq!(
            value,
            json!({ "provider": "openai", "messages": [], "trigger": "submit-message" })
        );
    }

    #[test]
    fn save_payload_snapshot_is_stable_for_equal_content() {
        let messages = vec![Message::user_text("hello")];
        let first = SavePayload::new(&messages, "openai", Some("gpt-4o-mini"))
            .to_json()
            .expect("encode");
        let second = SavePayload::new(&messages.clone(), "openai", Some("gpt-4o-mini"))
            .to_json()
            .expect("encode");
        let other_model = SavePayload::new(&messages, "openai", None)
            .to_json()
            .expect("encode");

        assert_eq!(first, second);
        assert_ne!(first, other_model);
    }
}
