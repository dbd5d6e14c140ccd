use std::sync::Arc;

mod api;
mod http;
mod sse;

pub use api::{
    BoxFuture, CHAT_STREAM_PATH, ChatApi, ChatEventStream, ChatStreamRequest,
    DEFAULT_REQUEST_TIMEOUT, OpenedChatStream, SessionBind, StreamEvent, StreamEventPayload,
    StreamSessionId, StreamWorker, TransportConfig, TransportError, TransportResult,
    make_event_stream,
};
pub use http::HttpChatApi;
pub use sse::SseLineBuffer;

pub fn create_api(config: TransportConfig) -> TransportResult<Arc<dyn ChatApi>> {
    tracing::info!(base_url = %config.base_url, "creating chat api client");
    Ok(Arc::new(HttpChatApi::new(config)?))
}
