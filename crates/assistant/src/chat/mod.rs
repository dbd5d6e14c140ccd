pub mod autosave;
pub mod cache;
pub mod identity;
pub mod navigation;
pub mod phase;
pub mod sidebar;
#[cfg(test)]
pub(crate) mod test_support;
pub mod view;

pub use autosave::{AutosaveWriter, DEFAULT_AUTOSAVE_DEBOUNCE, ScheduleOutcome};
pub use cache::HistoryCache;
pub use identity::{IdentityChange, SessionIdentity};
pub use navigation::{Navigator, Notifier};
pub use phase::{
    ChatStatus, StreamPhase, StreamTransition, StreamTransitionRejection, StreamTransitionResult,
};
pub use sidebar::ChatHistoryFeed;
pub use view::{ChatSession, SessionContext, SessionEvent, StopHandle};
