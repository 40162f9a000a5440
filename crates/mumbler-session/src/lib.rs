//! Client-side session engine for Mumbler.
//!
//! This crate owns everything the chat client knows about the server:
//!
//! 1. **Lifecycle**: connecting, logging in, noticing when the link drops
//!    ([`ChatSession::connect`], [`ConnectionState`])
//! 2. **Rosters**: groups, the groups we joined, connected users, all
//!    replaced wholesale from server snapshots
//! 3. **Whispers**: at most one [`PrivateChat`] per remote user
//! 4. **Chat logs**: two append-only [`ReplayLog`]s that hand their full
//!    history to every new subscriber
//!
//! # How it fits in the stack
//!
//! ```text
//! UI (above)  ← reads views, subscribes to events and logs, issues commands
//!     ↕
//! Session Layer (this crate)  ← owns local state, dispatches packets
//!     ↕
//! Protocol + Transport (below)  ← Packet encoding, byte delivery
//! ```

mod config;
mod error;
mod event;
mod model;
mod replay;
mod session;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::SessionConfig;
pub use error::SessionError;
pub use event::SessionEvent;
pub use model::{ChatEntry, Client, ConnectionState, Group, PrivateChat};
pub use replay::{ReplayCursor, ReplayLog};
pub use session::ChatSession;

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate leaves its collection valid
/// between statements, so a poisoned lock still guards usable data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
