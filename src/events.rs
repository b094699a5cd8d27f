//! Change notifications for presentation layers.
//!
//! The supervisor carries no global state, so anything that needs to react
//! to lifecycle changes (a window, a tray menu, a TUI) registers a sink on
//! its [`crate::manager::TunnelManager`] and re-renders when notified.

/// A notification emitted by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// The set of tunnels on disk changed: a start, a stop, or a stale
    /// entry purged during listing.
    TunnelsChanged,
    /// A human-readable progress line suitable for a log pane.
    Message(String),
}

/// Receiver of [`TunnelEvent`]s.
pub trait EventSink: Send {
    /// Called synchronously from whichever engine operation caused `event`.
    fn handle(&self, event: &TunnelEvent);
}

impl<F> EventSink for F
where
    F: Fn(&TunnelEvent) + Send,
{
    fn handle(&self, event: &TunnelEvent) {
        self(event)
    }
}
