use campus_protocol::ProtocolError;
use campus_transport::TransportError;
use snafu::Snafu;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("message is empty on `{stage}`"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("a response is still streaming on `{stage}`"))]
    StreamInFlight { stage: &'static str },
    #[snafu(display("failed to open chat stream on `{stage}`: {source}"))]
    OpenStream {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("failed to load chat {chat_id} on `{stage}`: {source}"))]
    LoadChat {
        stage: &'static str,
        chat_id: String,
        source: TransportError,
    },
    #[snafu(display("failed to encode chat snapshot on `{stage}`: {source}"))]
    EncodeSnapshot {
        stage: &'static str,
        source: ProtocolError,
    },
    #[snafu(display("failed to load chat history on `{stage}`: {source}"))]
    LoadHistory {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("failed to delete chat {chat_id} on `{stage}`: {source}"))]
    DeleteChat {
        stage: &'static str,
        chat_id: String,
        source: TransportError,
    },
}

impl SessionError {
    /// Text for the inline error slot; transport failures keep their server message.
    pub fn user_message(&self) -> String {
        match self {
            Self::OpenStream { source, .. }
            | Self::LoadChat { source, .. }
            | Self::LoadHistory { source, .. }
            | Self::DeleteChat { source, .. } => source.user_message(),
            other => other.to_string(),
        }
    }
}
