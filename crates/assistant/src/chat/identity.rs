use campus_protocol::ChatId;
use campus_transport::SessionBind;

/// Which persisted conversation this session writes to.
///
/// Starts unbound for a new chat and becomes bound at most once, either at
/// mount or from the first streaming response that names an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionIdentity {
    #[default]
    Unbound,
    Bound(ChatId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    Unchanged,
    /// The session just learned its id; navigation and history invalidation follow.
    Bound(ChatId),
}

impl SessionIdentity {
    pub fn mounted(chat_id: Option<ChatId>) -> Self {
        chat_id.map_or(Self::Unbound, Self::Bound)
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::Bound(chat_id) => Some(chat_id),
            Self::Unbound => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }

    /// Folds in the identity reported by a streaming response.
    pub fn observe(&mut self, bind: &SessionBind) -> IdentityChange {
        let SessionBind::Bound(incoming) = bind else {
            return IdentityChange::Unchanged;
        };

        if let Self::Bound(current) = self {
            if current != incoming {
                tracing::warn!(
                    current = %current,
                    incoming = %incoming,
                    "ignoring chat id that conflicts with the bound session"
                );
            }
            return IdentityChange::Unchanged;
        }

        *self = Self::Bound(incoming.clone());
        IdentityChange::Bound(incoming.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ChatId {
        ChatId::parse(raw).expect("valid chat id")
    }

    #[test]
    fn unbound_session_binds_on_first_reported_id() {
        let mut identity = SessionIdentity::default();
        assert_eq!(
            identity.observe(&SessionBind::Unbound),
            IdentityChange::Unchanged
        );
        assert_eq!(
            identity.observe(&SessionBind::Bound(id("abc123"))),
            IdentityChange::Bound(id("abc123"))
        );
        assert_eq!(identity.chat_id(), Some(&id("abc123")));
    }

    #[test]
    fn bound_session_never_rebinds() {
        let mut identity = SessionIdentity::mounted(Some(id("abc123")));
        assert_eq!(
            identity.observe(&SessionBind::Bound(id("abc123"))),
            IdentityChange::Unchanged
        );
        assert_eq!(
            identity.observe(&SessionBind::Bound(id("other"))),
            IdentityChange::Unchanged
        );
        assert_eq!(
            identity.observe(&SessionBind::Unbound),
            IdentityChange::Unchanged
        );
        assert_eq!(identity.chat_id(), Some(&id("abc123")));
    }
}
