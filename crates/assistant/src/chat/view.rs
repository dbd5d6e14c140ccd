use std::sync::Arc;
use std::time::Duration;

use campus_protocol::{ChatId, ChatStreamBody, Message, MessageId, SavePayload, chat_path};
use campus_transport::{
    ChatApi, ChatEventStream, ChatStreamRequest, SessionBind, StreamEvent, StreamEventPayload,
    StreamSessionId, StreamWorker,
};
use snafu::{ResultExt, ensure};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::autosave::{AutosaveWriter, DEFAULT_AUTOSAVE_DEBOUNCE, ScheduleOutcome};
use super::cache::HistoryCache;
use super::identity::{IdentityChange, SessionIdentity};
use super::navigation::{Navigator, Notifier};
use super::phase::{ChatStatus, StreamPhase, StreamTransition};
use crate::error::{
    EmptyInputSnafu, EncodeSnapshotSnafu, LoadChatSnafu, OpenStreamSnafu, SessionResult,
    StreamInFlightSnafu,
};
use crate::settings::AssistantSettings;
use crate::settings::state::DEFAULT_PROVIDER;

/// Collaborators shared by every session and the history feed.
#[derive(Clone)]
pub struct SessionContext {
    pub api: Arc<dyn ChatApi>,
    pub history: Arc<HistoryCache>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
    pub provider: String,
    pub model: Option<String>,
    pub autosave_delay: Duration,
}

impl SessionContext {
    pub fn new(
        api: Arc<dyn ChatApi>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            history: Arc::new(HistoryCache::new()),
            navigator,
            notifier,
            provider: DEFAULT_PROVIDER.to_string(),
            model: None,
            autosave_delay: DEFAULT_AUTOSAVE_DEBOUNCE,
        }
    }

    pub fn from_settings(
        settings: &AssistantSettings,
        api: Arc<dyn ChatApi>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            autosave_delay: settings.autosave_delay(),
            ..Self::new(api, navigator, notifier)
        }
    }
}

/// What one call to [`ChatSession::pump`] applied.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MessageStarted,
    TextDelta(String),
    ReasoningDelta(String),
    ToolCall {
        tool_call_id: String,
        tool_name: String,
    },
    ToolResult {
        tool_call_id: String,
    },
    ToolFailed {
        tool_call_id: String,
        error_text: String,
    },
    Finished,
    Failed(String),
    Stopped,
}

/// Requests a stop from outside the task that pumps the session.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl StopHandle {
    pub fn stop(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

struct ActiveStream {
    stream: ChatEventStream,
    worker: JoinHandle<()>,
}

impl ActiveStream {
    fn spawn(stream: ChatEventStream, worker: StreamWorker) -> Self {
        Self {
            stream,
            worker: tokio::spawn(worker),
        }
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.stream.cancel();
        self.worker.abort();
    }
}

enum Wake {
    Event(Option<StreamEvent>),
    Stop,
}

/// One open conversation: its messages, request status and persistence.
///
/// Every state change ends in an autosave check; a save is only scheduled
/// for a bound, idle session that has messages.
pub struct ChatSession {
    context: SessionContext,
    identity: SessionIdentity,
    title: Option<String>,
    messages: Vec<Message>,
    phase: StreamPhase,
    error: Option<String>,
    autosave: AutosaveWriter,
    active: Option<ActiveStream>,
    assistant_index: Option<usize>,
    next_session: StreamSessionId,
    stop_tx: mpsc::UnboundedSender<()>,
    stop_rx: mpsc::UnboundedReceiver<()>,
}

impl ChatSession {
    pub fn new(context: SessionContext, chat_id: Option<ChatId>) -> Self {
        let autosave = AutosaveWriter::new(
            context.api.clone(),
            context.history.clone(),
            context.autosave_delay,
        );
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        Self {
            context,
            identity: SessionIdentity::mounted(chat_id),
            title: None,
            messages: Vec::new(),
            phase: StreamPhase::Idle,
            error: None,
            autosave,
            active: None,
            assistant_index: None,
            next_session: StreamSessionId::new(1),
            stop_tx,
            stop_rx,
        }
    }

    /// Creates the session and, for an existing conversation, loads it.
    ///
    /// A failed load is reported through the notifier and the error slot.
    pub async fn mount(context: SessionContext, chat_id: Option<ChatId>) -> Self {
        let mut session = Self::new(context, chat_id);
        if session.identity.is_bound()
            && let Err(error) = session.load().await
        {
            tracing::warn!(error = %error, "failed to load chat");
            session.report_error(error.user_message());
        }
        session
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.identity.chat_id()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> ChatStatus {
        self.phase.status()
    }

    pub fn is_loading(&self) -> bool {
        self.status().is_loading()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_pending_save(&self) -> bool {
        self.autosave.has_pending()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Replaces the conversation with the server copy and records it as saved.
    pub async fn load(&mut self) -> SessionResult<()> {
        ensure!(!self.is_loading(), StreamInFlightSnafu { stage: "load-chat" });
        let Some(chat_id) = self.identity.chat_id().cloned() else {
            return Ok(());
        };

        let detail = self
            .context
            .api
            .fetch_chat(&chat_id)
            .await
            .context(LoadChatSnafu {
                stage: "fetch-chat",
                chat_id: chat_id.to_string(),
            })?;

        self.title = Some(detail.display_title().to_string());
        self.messages = detail.messages;
        let baseline = self.snapshot()?;
        self.autosave.record_baseline(baseline);
        tracing::info!(chat_id = %chat_id, messages = self.messages.len(), "loaded chat");
        self.sync_autosave();
        Ok(())
    }

    /// Replaces the message list, e.g. after an edit.
    pub fn set_messages(&mut self, messages: Vec<Message>) -> SessionResult<()> {
        ensure!(
            !self.is_loading(),
            StreamInFlightSnafu {
                stage: "set-messages"
            }
        );
        self.messages = messages;
        self.sync_autosave();
        Ok(())
    }

    /// Appends the user's message and opens a streaming request for the reply.
    ///
    /// Resolves once response headers arrive; drive the reply with [`Self::pump`].
    pub async fn send(&mut self, text: &str) -> SessionResult<()> {
        let text = text.trim();
        ensure!(!text.is_empty(), EmptyInputSnafu { stage: "send" });
        ensure!(!self.is_loading(), StreamInFlightSnafu { stage: "send" });

        // Stop requests aimed at an earlier stream must not cancel this one.
        while self.stop_rx.try_recv().is_ok() {}
        self.autosave.cancel_pending();
        self.error = None;

        let session = self.next_session;
        self.next_session = session.next();
        self.transition(StreamTransition::Submit(session));
        self.messages.push(Message::user_text(text));
        self.assistant_index = None;

        let body = ChatStreamBody::submit(
            self.identity.chat_id().cloned(),
            self.context.provider.clone(),
            self.context.model.clone(),
            self.messages.clone(),
        );
        tracing::info!(
            chat_id = ?self.identity.chat_id().map(ChatId::as_str),
            stream_session = session.0,
            "sending chat message"
        );

        let opened = match self
            .context
            .api
            .open_chat_stream(ChatStreamRequest::new(session, body))
            .await
        {
            Ok(opened) => opened,
            Err(source) => {
                let message = source.user_message();
                tracing::warn!(error = %source, "failed to open chat stream");
                self.transition(StreamTransition::Fail {
                    session,
                    message: message.clone(),
                });
                self.report_error(message);
                self.sync_autosave();
                return Err(source).context(OpenStreamSnafu {
                    stage: "open-chat-stream",
                });
            }
        };

        self.bind_identity(&opened.bind).await;
        self.active = Some(ActiveStream::spawn(opened.stream, opened.worker));
        Ok(())
    }

    /// Waits for and applies the next event of the active stream.
    ///
    /// Returns `None` once no stream is active.
    pub async fn pump(&mut self) -> Option<SessionEvent> {
        loop {
            let active = self.active.as_mut()?;
            let wake = tokio::select! {
                event = active.stream.recv() => Wake::Event(event),
                Some(()) = self.stop_rx.recv() => Wake::Stop,
            };

            match wake {
                Wake::Stop => {
                    self.stop();
                    return Some(SessionEvent::Stopped);
                }
                Wake::Event(None) => {
                    let Some(session) = self.phase.active_session() else {
                        self.active = None;
                        return None;
                    };
                    let message = "response stream ended unexpectedly".to_string();
                    return Some(self.fail(session, message));
                }
                Wake::Event(Some(event)) => {
                    if let Some(applied) = self.apply_stream_event(event) {
                        return Some(applied);
                    }
                }
            }
        }
    }

    /// Pumps until the active stream reaches a terminal event or is stopped.
    pub async fn run_until_idle(&mut self) -> Vec<SessionEvent> {
        let mut applied = Vec::new();
        while let Some(event) = self.pump().await {
            applied.push(event);
        }
        applied
    }

    /// Aborts the active stream, keeping whatever content already arrived.
    pub fn stop(&mut self) -> bool {
        let Some(session) = self.phase.active_session() else {
            return false;
        };
        tracing::info!(stream_session = session.0, "stopping chat stream");
        self.finish(StreamTransition::Cancel(session));
        true
    }

    /// Stops any active stream and waits for outstanding autosaves.
    pub async fn settle(&mut self) {
        self.stop();
        self.autosave.settle().await;
    }

    async fn bind_identity(&mut self, bind: &SessionBind) {
        if let IdentityChange::Bound(chat_id) = self.identity.observe(bind) {
            tracing::info!(chat_id = %chat_id, "chat bound to server id");
            self.context.navigator.replace(&chat_path(&chat_id));
            self.context.history.invalidate_history().await;
        }
    }

    fn apply_stream_event(&mut self, event: StreamEvent) -> Option<SessionEvent> {
        let session = event.session;
        if !self.phase.accepts(session) {
            tracing::debug!(stream_session = session.0, "dropping event from a stale stream");
            return None;
        }

        let applied = match event.payload {
            StreamEventPayload::Done => {
                self.finish(StreamTransition::Complete(session));
                SessionEvent::Finished
            }
            StreamEventPayload::Error(message) => self.fail(session, message),
            StreamEventPayload::MessageStart { message_id } => {
                self.receive(session, message_id);
                SessionEvent::MessageStarted
            }
            StreamEventPayload::TextDelta(delta) => {
                self.receive(session, None).push_text_delta(&delta);
                SessionEvent::TextDelta(delta)
            }
            StreamEventPayload::ReasoningDelta(delta) => {
                self.receive(session, None).push_reasoning_delta(&delta);
                SessionEvent::ReasoningDelta(delta)
            }
            StreamEventPayload::ToolInput {
                tool_call_id,
                tool_name,
                input,
            } => {
                self.receive(session, None)
                    .upsert_tool_input(&tool_name, &tool_call_id, input);
                SessionEvent::ToolCall {
                    tool_call_id,
                    tool_name,
                }
            }
            StreamEventPayload::ToolOutput {
                tool_call_id,
                output,
            } => {
                if !self
                    .receive(session, None)
                    .apply_tool_output(&tool_call_id, output)
                {
                    tracing::debug!(tool_call_id = %tool_call_id, "tool output for an unknown call");
                }
                SessionEvent::ToolResult { tool_call_id }
            }
            StreamEventPayload::ToolError {
                tool_call_id,
                error_text,
            } => {
                if !self
                    .receive(session, None)
                    .apply_tool_error(&tool_call_id, &error_text)
                {
                    tracing::debug!(tool_call_id = %tool_call_id, "tool error for an unknown call");
                }
                SessionEvent::ToolFailed {
                    tool_call_id,
                    error_text,
                }
            }
        };

        self.sync_autosave();
        Some(applied)
    }

    /// Moves to streaming and returns the assistant message being built.
    fn receive(&mut self, session: StreamSessionId, message_id: Option<MessageId>) -> &mut Message {
        self.transition(StreamTransition::Receive(session));

        let index = match self.assistant_index {
            Some(index) if index < self.messages.len() => index,
            _ => {
                let id = message_id.unwrap_or_else(MessageId::generate);
                self.messages.push(Message::assistant(id));
                let index = self.messages.len() - 1;
                self.assistant_index = Some(index);
                index
            }
        };
        &mut self.messages[index]
    }

    fn fail(&mut self, session: StreamSessionId, message: String) -> SessionEvent {
        tracing::warn!(stream_session = session.0, error = %message, "chat stream failed");
        self.finish(StreamTransition::Fail {
            session,
            message: message.clone(),
        });
        self.report_error(message.clone());
        SessionEvent::Failed(message)
    }

    fn finish(&mut self, transition: StreamTransition) {
        self.transition(transition);
        self.active = None;
        self.assistant_index = None;
        self.sync_autosave();
    }

    fn transition(&mut self, transition: StreamTransition) -> bool {
        match self.phase.apply(transition) {
            Ok(next) => {
                self.phase = next;
                true
            }
            Err(rejection) => {
                tracing::debug!(?rejection, "ignored stream transition");
                false
            }
        }
    }

    fn report_error(&mut self, message: String) {
        self.context.notifier.error(&message);
        self.error = Some(message);
    }

    fn snapshot(&self) -> SessionResult<String> {
        SavePayload::new(
            &self.messages,
            &self.context.provider,
            self.context.model.as_deref(),
        )
        .to_json()
        .context(EncodeSnapshotSnafu {
            stage: "encode-chat-snapshot",
        })
    }

    /// Schedules a save for a bound, idle session that has messages.
    fn sync_autosave(&mut self) {
        let Some(chat_id) = self.identity.chat_id().cloned() else {
            return;
        };
        if self.is_loading() || self.messages.is_empty() {
            return;
        }

        let payload = match self.snapshot() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(chat_id = %chat_id, error = %error, "failed to snapshot chat");
                return;
            }
        };
        if self.autosave.schedule(chat_id.clone(), payload) == ScheduleOutcome::Scheduled {
            tracing::debug!(
                chat_id = %chat_id,
                delay_ms = self.autosave.delay().as_millis() as u64,
                "scheduled autosave"
            );
        }
    }
}
