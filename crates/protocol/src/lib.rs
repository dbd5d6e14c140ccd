pub mod chat;
pub mod chunk;
pub mod error;
pub mod history;
pub mod ids;
pub mod message;

pub use chat::{
    CHAT_ID_HEADER, ChatDetail, ChatHistoryPage, ChatListItem, ChatStreamBody,
    DEFAULT_CHAT_TITLE, SavePayload, StreamTrigger,
};
pub use chunk::{STREAM_DONE_MARKER, StreamChunk, StreamFrame, decode_frame};
pub use error::{ProtocolError, ProtocolResult};
pub use history::{
    GroupedChats, HISTORY_PAGE_SIZE, HISTORY_PATH, HistoryPageKey, group_chats_by_date,
    history_page_key, is_history_key,
};
pub use ids::{ChatId, MessageId};
pub use message::{Message, MessagePart, Role, ToolPart, ToolState};

/// Browser-facing path of a conversation.
pub fn chat_path(chat_id: &ChatId) -> String {
    format!("/ai/{chat_id}")
}

/// Path of the empty assistant screen.
pub const CHAT_HOME_PATH: &str = "/ai";
