/// Address bar of the host shell.
pub trait Navigator: Send + Sync {
    /// Replaces the current location without adding a history entry.
    fn replace(&self, path: &str);

    /// Re-renders the current location with fresh server data.
    fn refresh(&self);
}

/// Transient toasts.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
    fn success(&self, message: &str);
}
