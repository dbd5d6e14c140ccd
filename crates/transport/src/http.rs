use campus_protocol::{
    CHAT_ID_HEADER, ChatDetail, ChatHistoryPage, ChatId, HistoryPageKey, MessageId,
    StreamChunk, StreamFrame, decode_frame,
};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};

use super::api::{
    BoxFuture, BuildClientSnafu, CHAT_STREAM_PATH, ChatApi, ChatStreamRequest,
    DecodeResponseSnafu, OpenedChatStream, RequestSnafu, SessionBind, StreamEvent,
    StreamEventPayload, StreamSessionId, StreamWorker, TransportConfig, TransportResult,
    UnexpectedStatusSnafu, make_event_stream,
};
use super::sse::SseLineBuffer;

/// `ChatApi` over HTTP against the web application's `/api/ai` routes.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    config: TransportConfig,
    client: reqwest::Client,
}

impl HttpChatApi {
    pub fn new(config: TransportConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .context(BuildClientSnafu {
                stage: "build-http-client",
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn chat_url(&self, chat_id: &ChatId) -> String {
        self.url(&format!("{CHAT_STREAM_PATH}/{chat_id}"))
    }

    async fn ensure_success(
        response: reqwest::Response,
        url: &str,
        stage: &'static str,
    ) -> TransportResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        UnexpectedStatusSnafu {
            stage,
            url: url.to_string(),
            status: status.as_u16(),
            body,
        }
        .fail()
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> TransportResult<T> {
        let response = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-get",
                url: url.clone(),
            })?;
        let response = Self::ensure_success(response, &url, "get-status").await?;
        response.json::<T>().await.context(DecodeResponseSnafu {
            stage: "decode-get-json",
            url,
        })
    }

    fn map_chunk(chunk: StreamChunk) -> Option<StreamEventPayload> {
        let payload = match chunk {
            StreamChunk::Start { message_id } => StreamEventPayload::MessageStart {
                message_id: message_id.and_then(|raw| MessageId::parse(&raw).ok()),
            },
            StreamChunk::TextDelta { delta, .. } => {
                if delta.is_empty() {
                    return None;
                }
                StreamEventPayload::TextDelta(delta)
            }
            StreamChunk::ReasoningDelta { delta } => {
                if delta.is_empty() {
                    return None;
                }
                StreamEventPayload::ReasoningDelta(delta)
            }
            StreamChunk::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => StreamEventPayload::ToolInput {
                tool_call_id,
                tool_name,
                input,
            },
            StreamChunk::ToolOutputAvailable {
                tool_call_id,
                output,
            } => StreamEventPayload::ToolOutput {
                tool_call_id,
                output,
            },
            StreamChunk::ToolOutputError {
                tool_call_id,
                error_text,
            } => StreamEventPayload::ToolError {
                tool_call_id,
                error_text,
            },
            StreamChunk::Error { error_text } => StreamEventPayload::Error(error_text),
            StreamChunk::Abort => StreamEventPayload::Error("stream aborted by server".to_string()),
            StreamChunk::StartStep
            | StreamChunk::FinishStep
            | StreamChunk::TextStart { .. }
            | StreamChunk::TextEnd { .. }
            | StreamChunk::ReasoningStart
            | StreamChunk::ReasoningEnd
            | StreamChunk::Finish
            | StreamChunk::Unknown => return None,
        };
        Some(payload)
    }

    /// Maps decoded data lines to events; returns true once a terminal event was sent
    /// or the consumer went away.
    fn forward_payloads(
        session: StreamSessionId,
        payloads: Vec<String>,
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> bool {
        for data in payloads {
            let payload = match decode_frame(&data) {
                Ok(StreamFrame::Done) => StreamEventPayload::Done,
                Ok(StreamFrame::Chunk(chunk)) => match Self::map_chunk(chunk) {
                    Some(payload) => payload,
                    None => continue,
                },
                Err(error) => {
                    tracing::warn!(
                        session = session.0,
                        error = %error,
                        "skipping undecodable stream chunk"
                    );
                    continue;
                }
            };

            let terminal = payload.is_terminal();
            if event_tx.send(StreamEvent { session, payload }).is_err() || terminal {
                return true;
            }
        }
        false
    }

    async fn run_stream_worker(
        session: StreamSessionId,
        response: reqwest::Response,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut body = response.bytes_stream();
        let mut lines = SseLineBuffer::new();

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // Dropping the body stream closes the connection; no terminal event follows.
                    tracing::debug!(session = session.0, "chat stream cancelled");
                    return;
                }
                next_chunk = body.next() => {
                    match next_chunk {
                        Some(Ok(bytes)) => {
                            if Self::forward_payloads(session, lines.feed(&bytes), &event_tx) {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            tracing::warn!(
                                session = session.0,
                                error = %source,
                                "chat stream body failed"
                            );
                            let _ = event_tx.send(StreamEvent {
                                session,
                                payload: StreamEventPayload::Error(format!(
                                    "stream read failed: {source}"
                                )),
                            });
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        if Self::forward_payloads(session, lines.flush(), &event_tx) {
            return;
        }

        // A body that closes without `[DONE]` still counts as a finished answer.
        let _ = event_tx.send(StreamEvent {
            session,
            payload: StreamEventPayload::Done,
        });
    }
}

impl ChatApi for HttpChatApi {
    fn open_chat_stream<'a>(
        &'a self,
        request: ChatStreamRequest,
    ) -> BoxFuture<'a, TransportResult<OpenedChatStream>> {
        Box::pin(async move {
            let url = self.url(CHAT_STREAM_PATH);
            let response = self
                .client
                .post(&url)
                .json(&request.body)
                .send()
                .await
                .context(RequestSnafu {
                    stage: "open-chat-stream",
                    url: url.clone(),
                })?;
            let response = Self::ensure_success(response, &url, "chat-stream-status").await?;

            let bind = SessionBind::from_header_value(
                response
                    .headers()
                    .get(CHAT_ID_HEADER)
                    .and_then(|value| value.to_str().ok()),
            );
            tracing::debug!(
                session = request.session.0,
                bound = ?bind.chat_id(),
                "chat stream opened"
            );

            let (event_tx, stream, cancel_rx) = make_event_stream(request.session);
            let worker: StreamWorker = Box::pin(Self::run_stream_worker(
                request.session,
                response,
                event_tx,
                cancel_rx,
            ));

            Ok(OpenedChatStream {
                bind,
                stream,
                worker,
            })
        })
    }

    fn fetch_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, TransportResult<ChatDetail>> {
        Box::pin(async move { self.get_json(self.chat_url(chat_id)).await })
    }

    fn save_chat<'a>(
        &'a self,
        chat_id: &'a ChatId,
        body: String,
    ) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            let url = self.chat_url(chat_id);
            let response = self
                .client
                .put(&url)
                .timeout(self.config.request_timeout)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .context(RequestSnafu {
                    stage: "send-save-chat",
                    url: url.clone(),
                })?;
            Self::ensure_success(response, &url, "save-chat-status").await?;
            Ok(())
        })
    }

    fn fetch_history<'a>(
        &'a self,
        key: &'a HistoryPageKey,
    ) -> BoxFuture<'a, TransportResult<ChatHistoryPage>> {
        Box::pin(async move { self.get_json(self.url(&key.to_path())).await })
    }

    fn delete_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            let url = self.chat_url(chat_id);
            let response = self
                .client
                .delete(&url)
                .timeout(self.config.request_timeout)
                .send()
                .await
                .context(RequestSnafu {
                    stage: "send-delete-chat",
                    url: url.clone(),
                })?;
            Self::ensure_success(response, &url, "delete-chat-status").await?;
            Ok(())
        })
    }
}
