use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use campus_protocol::{ChatDetail, ChatHistoryPage, ChatId, HistoryPageKey};
use campus_transport::{
    BoxFuture, ChatApi, ChatStreamRequest, OpenedChatStream, SessionBind, StreamEvent,
    StreamEventPayload, TransportError, TransportResult, make_event_stream,
};
use tokio::sync::mpsc;

use super::navigation::{Navigator, Notifier};

enum StreamScript {
    Events {
        bind: SessionBind,
        events: Vec<StreamEventPayload>,
    },
    Live {
        bind: SessionBind,
        feed: mpsc::UnboundedReceiver<StreamEventPayload>,
    },
    Reject {
        status: u16,
        body: String,
    },
}

#[derive(Default)]
struct FakeState {
    scripts: VecDeque<StreamScript>,
    stream_requests: Vec<ChatStreamRequest>,
    chats: HashMap<ChatId, ChatDetail>,
    saves: Vec<(ChatId, String)>,
    save_attempts: usize,
    fail_saves: bool,
    history: HashMap<String, ChatHistoryPage>,
    history_requests: Vec<String>,
    deletes: Vec<ChatId>,
    fail_deletes: bool,
}

/// In-memory `ChatApi` with scripted streams and recorded writes.
#[derive(Default)]
pub struct FakeChatApi {
    state: Mutex<FakeState>,
}

impl FakeChatApi {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    /// Queues a stream that replays `events` and then ends.
    pub fn script_stream(&self, bind: SessionBind, events: Vec<StreamEventPayload>) {
        self.state()
            .scripts
            .push_back(StreamScript::Events { bind, events });
    }

    /// Queues a stream fed by the returned sender; it stays open until cancelled or fed a terminal event.
    pub fn live_stream(&self, bind: SessionBind) -> mpsc::UnboundedSender<StreamEventPayload> {
        let (tx, feed) = mpsc::unbounded_channel();
        self.state()
            .scripts
            .push_back(StreamScript::Live { bind, feed });
        tx
    }

    pub fn reject_stream(&self, status: u16, body: &str) {
        self.state().scripts.push_back(StreamScript::Reject {
            status,
            body: body.to_string(),
        });
    }

    pub fn insert_chat(&self, detail: ChatDetail) {
        self.state().chats.insert(detail.id.clone(), detail);
    }

    pub fn set_history(&self, key: &HistoryPageKey, page: ChatHistoryPage) {
        self.state().history.insert(key.to_path(), page);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.state().fail_saves = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state().fail_deletes = fail;
    }

    pub fn stream_requests(&self) -> Vec<ChatStreamRequest> {
        self.state().stream_requests.clone()
    }

    pub fn saves(&self) -> Vec<(ChatId, String)> {
        self.state().saves.clone()
    }

    pub fn save_attempts(&self) -> usize {
        self.state().save_attempts
    }

    pub fn history_requests(&self) -> Vec<String> {
        self.state().history_requests.clone()
    }

    pub fn deletes(&self) -> Vec<ChatId> {
        self.state().deletes.clone()
    }
}

fn status_error(url: String, status: u16, body: &str) -> TransportError {
    TransportError::UnexpectedStatus {
        stage: "fake-chat-api",
        url,
        status,
        body: body.to_string(),
    }
}

impl ChatApi for FakeChatApi {
    fn open_chat_stream<'a>(
        &'a self,
        request: ChatStreamRequest,
    ) -> BoxFuture<'a, TransportResult<OpenedChatStream>> {
        Box::pin(async move {
            let session = request.session;
            let script = {
                let mut state = self.state();
                state.stream_requests.push(request);
                state.scripts.pop_front()
            };
            let (event_tx, stream, mut cancel_rx) = make_event_stream(session);

            match script {
                None => Err(status_error("/api/ai/chat".to_string(), 500, "no scripted stream")),
                Some(StreamScript::Reject { status, body }) => {
                    Err(status_error("/api/ai/chat".to_string(), status, &body))
                }
                Some(StreamScript::Events { bind, events }) => Ok(OpenedChatStream {
                    bind,
                    stream,
                    worker: Box::pin(async move {
                        for payload in events {
                            if event_tx.send(StreamEvent { session, payload }).is_err() {
                                break;
                            }
                        }
                    }),
                }),
                Some(StreamScript::Live { bind, mut feed }) => Ok(OpenedChatStream {
                    bind,
                    stream,
                    worker: Box::pin(async move {
                        loop {
                            tokio::select! {
                                _ = &mut cancel_rx => break,
                                payload = feed.recv() => {
                                    let Some(payload) = payload else { break };
                                    let terminal = payload.is_terminal();
                                    if event_tx.send(StreamEvent { session, payload }).is_err() || terminal {
                                        break;
                                    }
                                }
                            }
                        }
                    }),
                }),
            }
        })
    }

    fn fetch_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, TransportResult<ChatDetail>> {
        Box::pin(async move {
            self.state()
                .chats
                .get(chat_id)
                .cloned()
                .ok_or_else(|| status_error(format!("/api/ai/chat/{chat_id}"), 404, "Chat not found"))
        })
    }

    fn save_chat<'a>(
        &'a self,
        chat_id: &'a ChatId,
        body: String,
    ) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            let mut state = self.state();
            state.save_attempts += 1;
            if state.fail_saves {
                return Err(status_error(format!("/api/ai/chat/{chat_id}"), 500, ""));
            }
            state.saves.push((chat_id.clone(), body));
            Ok(())
        })
    }

    fn fetch_history<'a>(
        &'a self,
        key: &'a HistoryPageKey,
    ) -> BoxFuture<'a, TransportResult<ChatHistoryPage>> {
        Box::pin(async move {
            let path = key.to_path();
            let mut state = self.state();
            state.history_requests.push(path.clone());
            state
                .history
                .get(&path)
                .cloned()
                .ok_or_else(|| status_error(path, 404, "no scripted page"))
        })
    }

    fn delete_chat<'a>(&'a self, chat_id: &'a ChatId) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            let mut state = self.state();
            if state.fail_deletes {
                return Err(status_error(format!("/api/ai/chat/{chat_id}"), 500, ""));
            }
            state.deletes.push(chat_id.clone());
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationCall {
    Replace(String),
    Refresh,
}

#[derive(Default)]
pub struct RecordingNavigator {
    calls: Mutex<Vec<NavigationCall>>,
}

impl RecordingNavigator {
    pub fn calls(&self) -> Vec<NavigationCall> {
        self.calls.lock().expect("navigator lock").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, path: &str) {
        self.calls
            .lock()
            .expect("navigator lock")
            .push(NavigationCall::Replace(path.to_string()));
    }

    fn refresh(&self) {
        self.calls
            .lock()
            .expect("navigator lock")
            .push(NavigationCall::Refresh);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    successes: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("notifier lock").clone()
    }

    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().expect("notifier lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors
            .lock()
            .expect("notifier lock")
            .push(message.to_string());
    }

    fn success(&self, message: &str) {
        self.successes
            .lock()
            .expect("notifier lock")
            .push(message.to_string());
    }
}
