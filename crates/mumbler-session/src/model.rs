//! Local entities: the session's view of the chat server.
//!
//! The protocol crate describes what travels on the wire
//! ([`GroupDescriptor`], [`UserDescriptor`]). The types here are what the
//! session keeps and hands out to the UI:
//!
//! - [`Client`]: someone connected to the server, including ourselves
//! - [`Group`]: a chat room, with its member set
//! - [`PrivateChat`]: an open whisper between us and one remote client
//! - [`ChatEntry`]: one delivered message in a chat log
//!
//! All of them are plain data. The session owns the live copies and
//! returns clones, so holding one never blocks the engine.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use mumbler_protocol::{
    ClientId, GroupDescriptor, GroupId, Permission, UserDescriptor,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the session is in its connection lifecycle.
///
/// ```text
///   Disconnected ──(connect)──→ Connecting ──(transport up)──→ Connected
///        ↑                           │                            │
///        └──────(connect failed)─────┘                            │
///        └──────────────(lost / disconnect)───────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link to the server.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is up. Commands are accepted.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A user connected to the server.
///
/// Our own `Client` has id [`ClientId::UNASSIGNED`] until the server's
/// `Connected` packet hands us a real one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
}

impl From<UserDescriptor> for Client {
    fn from(user: UserDescriptor) -> Self {
        Self {
            id: user.id,
            name: user.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A chat group as last described by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub owner_id: ClientId,
    pub name: String,
    pub permission: Permission,
    /// Inactivity timeout the server applies to members, in whole
    /// seconds on the wire.
    pub threshold: Duration,
    /// Member ids, ordered and free of duplicates.
    pub members: BTreeSet<ClientId>,
}

impl Group {
    /// Returns `true` if `client` is in the member set.
    pub fn has_member(&self, client: ClientId) -> bool {
        self.members.contains(&client)
    }

    /// Returns `true` if joining requires a password.
    pub fn is_protected(&self) -> bool {
        self.permission == Permission::Password
    }
}

impl From<GroupDescriptor> for Group {
    fn from(descriptor: GroupDescriptor) -> Self {
        Self {
            id: descriptor.id,
            owner_id: descriptor.owner_id,
            name: descriptor.name,
            permission: descriptor.permission,
            threshold: Duration::from_secs(u64::from(descriptor.threshold)),
            members: descriptor.members.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// PrivateChat
// ---------------------------------------------------------------------------

/// An open whisper conversation.
///
/// The session keeps at most one per remote client id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateChat {
    /// Ourselves, as known when the chat was opened.
    pub local: Client,
    pub remote: Client,
}

// ---------------------------------------------------------------------------
// ChatEntry
// ---------------------------------------------------------------------------

/// One message delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub sender_id: ClientId,
    pub sender_name: String,
    pub text: String,
    /// The group the message was posted to. `None` for whispers.
    pub group_id: Option<GroupId>,
    /// The addressee of a whisper. `None` for group messages.
    pub recipient_id: Option<ClientId>,
}

impl ChatEntry {
    /// Returns `true` for entries of the private message log.
    pub fn is_private(&self) -> bool {
        self.group_id.is_none()
    }
}
