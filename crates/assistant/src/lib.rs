#![deny(unsafe_code)]

/// Chat session engine: streaming, identity, autosave and history.
pub mod chat;
pub mod error;
/// Settings persistence.
pub mod settings;

pub use error::{SessionError, SessionResult};
