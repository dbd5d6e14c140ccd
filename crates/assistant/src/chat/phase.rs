use campus_transport::StreamSessionId;

/// Public request status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatStatus {
    #[default]
    Idle,
    Submitted,
    Streaming,
}

impl ChatStatus {
    /// True from submission until the stream reaches a terminal event.
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Submitted | Self::Streaming)
    }
}

/// Lifecycle of the streaming exchange a session is waiting on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamPhase {
    #[default]
    Idle,
    Submitted(StreamSessionId),
    Streaming(StreamSessionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransition {
    Submit(StreamSessionId),
    /// First content for the session; later content keeps the phase as is.
    Receive(StreamSessionId),
    Complete(StreamSessionId),
    Fail {
        session: StreamSessionId,
        message: String,
    },
    Cancel(StreamSessionId),
}

/// Rejection reason for illegal stream transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyActive {
        active: StreamSessionId,
        attempted: StreamSessionId,
    },
    NoActiveStream,
    SessionMismatch {
        active: StreamSessionId,
        attempted: StreamSessionId,
    },
}

pub type StreamTransitionResult = Result<StreamPhase, StreamTransitionRejection>;

impl StreamPhase {
    pub fn status(&self) -> ChatStatus {
        match self {
            Self::Idle => ChatStatus::Idle,
            Self::Submitted(_) => ChatStatus::Submitted,
            Self::Streaming(_) => ChatStatus::Streaming,
        }
    }

    pub fn active_session(&self) -> Option<StreamSessionId> {
        match self {
            Self::Submitted(session) | Self::Streaming(session) => Some(*session),
            Self::Idle => None,
        }
    }

    /// Returns true when incoming stream data belongs to the active session.
    pub fn accepts(&self, session: StreamSessionId) -> bool {
        self.active_session() == Some(session)
    }

    /// Applies one transition deterministically.
    ///
    /// Only an idle phase may submit. Every other transition must name the
    /// active session exactly.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Submit(session) => self.apply_submit(session),
            StreamTransition::Receive(session) => {
                self.check_active(session)?;
                Ok(Self::Streaming(session))
            }
            StreamTransition::Complete(session)
            | StreamTransition::Fail { session, .. }
            | StreamTransition::Cancel(session) => {
                self.check_active(session)?;
                Ok(Self::Idle)
            }
        }
    }

    fn apply_submit(&self, session: StreamSessionId) -> StreamTransitionResult {
        match self.active_session() {
            Some(active) => Err(StreamTransitionRejection::AlreadyActive {
                active,
                attempted: session,
            }),
            None => Ok(Self::Submitted(session)),
        }
    }

    fn check_active(&self, session: StreamSessionId) -> Result<(), StreamTransitionRejection> {
        match self.active_session() {
            Some(active) if active == session => Ok(()),
            Some(active) => Err(StreamTransitionRejection::SessionMismatch {
                active,
                attempted: session,
            }),
            None => Err(StreamTransitionRejection::NoActiveStream),
        }
    }
}
