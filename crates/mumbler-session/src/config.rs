//! Session configuration.

/// Settings for a [`ChatSession`](crate::ChatSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the [`SessionEvent`](crate::SessionEvent) broadcast
    /// channel. A subscriber that falls further behind than this skips
    /// the oldest events. Values below 1 are treated as 1.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}
