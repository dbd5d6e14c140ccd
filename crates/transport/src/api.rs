use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use campus_protocol::{
    ChatDetail, ChatHistoryPage, ChatId, ChatStreamBody, HistoryPageKey, MessageId,
    ProtocolError,
};
use serde_json::Value;
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

pub const CHAT_STREAM_PATH: &str = "/api/ai/chat";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub base_url: String,
    /// Applies to every request except the streaming one, whose body may stay open for minutes.
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// Identifier for one streaming exchange.
///
/// This must change on every send so events from a stopped stream can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamSessionId(pub u64);

impl StreamSessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Identity learned from a streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBind {
    Unbound,
    Bound(ChatId),
}

impl SessionBind {
    /// Interprets the raw chat id header; blank or missing values leave the session unbound.
    pub fn from_header_value(raw: Option<&str>) -> Self {
        raw.and_then(|value| ChatId::parse(value).ok())
            .map_or(Self::Unbound, Self::Bound)
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::Bound(chat_id) => Some(chat_id),
            Self::Unbound => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatStreamRequest {
    pub session: StreamSessionId,
    pub body: ChatStreamBody,
}

impl ChatStreamRequest {
    pub fn new(session: StreamSessionId, body: ChatStreamBody) -> Self {
        Self { session, body }
    }
}

/// Stream payload mapped into chat domain language.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventPayload {
    MessageStart {
        message_id: Option<MessageId>,
    },
    TextDelta(String),
    ReasoningDelta(String),
    ToolInput {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolOutput {
        tool_call_id: String,
        output: Value,
    },
    ToolError {
        tool_call_id: String,
        error_text: String,
    },
    Done,
    Error(String),
}

impl StreamEventPayload {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub session: StreamSessionId,
    pub payload: StreamEventPayload,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type StreamWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    Request {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("{url} returned status {status}: {body}"))]
    UnexpectedStatus {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode response from {url} on `{stage}`: {source}"))]
    DecodeResponse {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("stream protocol error on `{stage}`: {source}"))]
    Protocol {
        stage: &'static str,
        source: ProtocolError,
    },
}

impl TransportError {
    /// Short text suitable for an inline error slot or a toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnexpectedStatus { status, body, .. } if !body.trim().is_empty() => {
                format!("request failed ({status}): {}", body.trim())
            }
            Self::UnexpectedStatus { status, .. } => format!("request failed ({status})"),
            other => other.to_string(),
        }
    }
}

pub struct ChatEventStream {
    session: StreamSessionId,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl ChatEventStream {
    pub(crate) fn new(
        session: StreamSessionId,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            session,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn session(&self) -> StreamSessionId {
        self.session
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ChatEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// A stream whose response headers have arrived with a success status.
pub struct OpenedChatStream {
    pub bind: SessionBind,
    pub stream: ChatEventStream,
    pub worker: StreamWorker,
}

/// Remote chat endpoints consumed by a chat session.
pub trait ChatApi: Send + Sync {
    /// `POST /api/ai/chat`; resolves once headers are in, the body is read by the returned worker.
    fn open_chat_stream<'a>(
        &'a self,
        request: ChatStreamRequest,
    ) -> BoxFuture<'a, TransportResult<OpenedChatStream>>;

    /// `GET /api/ai/chat/{chatId}`.
    fn fetch_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, TransportResult<ChatDetail>>;

    /// `PUT /api/ai/chat/{chatId}` with an already serialized JSON body.
    fn save_chat<'a>(&'a self, chat_id: &'a ChatId, body: String)
    -> BoxFuture<'a, TransportResult<()>>;

    /// `GET /api/ai/history?...`.
    fn fetch_history<'a>(
        &'a self,
        key: &'a HistoryPageKey,
    ) -> BoxFuture<'a, TransportResult<ChatHistoryPage>>;

    /// `DELETE /api/ai/chat/{chatId}`.
    fn delete_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, TransportResult<()>>;
}

/// Wires an event channel and a cancel signal for one stream.
///
/// Returns the sender half for the worker, the consumer-facing stream, and the
/// cancel receiver the worker must watch.
pub fn make_event_stream(
    session: StreamSessionId,
) -> (
    mpsc::UnboundedSender<StreamEvent>,
    ChatEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ChatEventStream::new(session, event_rx, cancel_tx),
        cancel_rx,
    )
}
