//! Packet model for Mumbler's wire format.
//!
//! Every message that travels between a client and the chat server is one
//! [`Packet`]. This module only defines the data. How a packet becomes bytes
//! lives in [`crate::codec`].
//!
//! A packet is pure data: no behavior, no references into session state.
//! The session layer builds packets, hands them to the codec, and forgets
//! them.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The server-assigned identifier of a connected client.
///
/// Newtype over the 16-bit id used on the wire, so a `ClientId` can't be
/// passed where a [`GroupId`] is expected. `ClientId(0)` means "not yet
/// assigned"; the server hands out real ids in the `Connected` packet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u16);

impl ClientId {
    /// The placeholder id a client carries before the server assigns one.
    pub const UNASSIGNED: ClientId = ClientId(0);

    /// Returns `true` once the server has assigned this id.
    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

/// `tracing::info!(%client_id, "...")` prints "C-7".
impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// The server-assigned identifier of a chat group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub u16);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Permission
// ---------------------------------------------------------------------------

/// How a client is allowed to join a group.
///
/// Sent as a single byte. Unknown bytes are rejected by the decoder rather
/// than mapped to a default, so a newer server can't silently downgrade a
/// password-protected group to a free one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Permission {
    /// Anyone may join.
    #[default]
    Free = 0,
    /// Joining requires the group password.
    Password = 1,
}

impl Permission {
    /// Parses the wire byte. Returns `None` for unassigned values.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Free),
            1 => Some(Self::Password),
            _ => None,
        }
    }

    /// The wire byte for this permission.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Snapshot descriptors
// ---------------------------------------------------------------------------

/// One group as it appears inside a `SendGroups` snapshot.
///
/// This is the wire-level shape. The session layer converts it into its own
/// `Group` entity, which owns a proper member set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    /// The group's id.
    pub id: GroupId,
    /// The client that owns (and moderates) the group.
    pub owner_id: ClientId,
    /// Display name.
    pub name: String,
    /// How the group may be joined.
    pub permission: Permission,
    /// Inactivity timeout threshold, in seconds.
    pub threshold: u32,
    /// Ids of the clients currently in the group.
    pub members: Vec<ClientId>,
}

/// One online user as it appears inside a `SendUsers` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescriptor {
    /// The user's client id.
    pub id: ClientId,
    /// The user's display name.
    pub name: String,
}

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// The type tag written right after the header.
///
/// One value per [`Packet`] variant. The numbering is part of the wire
/// format: never reorder these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    Connection = 0,
    Connected = 1,
    Disconnection = 2,
    CreateGroup = 3,
    DeleteGroup = 4,
    ChangeGroupOwner = 5,
    JoinGroup = 6,
    JoinedGroup = 7,
    LeaveGroup = 8,
    LeftGroup = 9,
    Kick = 10,
    SendGroups = 11,
    SendUsers = 12,
    GroupMessage = 13,
    PrivateMessage = 14,
    SendKeystroke = 15,
    RequestGroups = 16,
    RequestUsers = 17,
}

impl PacketType {
    /// Every packet type, in tag order.
    pub const ALL: [PacketType; 18] = [
        Self::Connection,
        Self::Connected,
        Self::Disconnection,
        Self::CreateGroup,
        Self::DeleteGroup,
        Self::ChangeGroupOwner,
        Self::JoinGroup,
        Self::JoinedGroup,
        Self::LeaveGroup,
        Self::LeftGroup,
        Self::Kick,
        Self::SendGroups,
        Self::SendUsers,
        Self::GroupMessage,
        Self::PrivateMessage,
        Self::SendKeystroke,
        Self::RequestGroups,
        Self::RequestUsers,
    ];

    /// Maps a tag byte to its packet type. `None` for unassigned tags.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// The tag byte for this packet type.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One application-level message.
///
/// A closed set: the codec and the session's dispatch routine both `match`
/// on it exhaustively, so adding a variant is a compile error until every
/// place that handles packets knows about it.
///
/// Direction notes use "C→S" (client to server) and "S→C".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    // -- Connection lifecycle --

    /// C→S: first packet after the TCP connection opens.
    Connection { username: String },

    /// S→C: the server accepted us and assigned our id.
    Connected { client_id: ClientId },

    /// Either direction: the client is leaving.
    Disconnection { client_id: ClientId },

    // -- Group management --

    /// C→S: create a new group owned by `owner_id`.
    /// `password` is empty for [`Permission::Free`] groups.
    CreateGroup {
        owner_id: ClientId,
        name: String,
        permission: Permission,
        password: String,
        threshold: u32,
    },

    /// Either direction: the group is gone.
    DeleteGroup {
        client_id: ClientId,
        group_id: GroupId,
    },

    /// Either direction: hand the group over to another member.
    ChangeGroupOwner {
        group_id: GroupId,
        new_owner_id: ClientId,
    },

    /// C→S: request to join a group.
    JoinGroup {
        client_id: ClientId,
        group_id: GroupId,
        password: String,
    },

    /// S→C: confirmation that `client_id` is now in `group_id`.
    JoinedGroup {
        client_id: ClientId,
        group_id: GroupId,
    },

    /// C→S: leave a group.
    LeaveGroup {
        client_id: ClientId,
        group_id: GroupId,
    },

    /// S→C: `client_id` has left `group_id`.
    LeftGroup {
        client_id: ClientId,
        group_id: GroupId,
    },

    /// Either direction: `client_id` is removed from `group_id`.
    Kick {
        client_id: ClientId,
        group_id: GroupId,
    },

    // -- Snapshots --

    /// S→C: the full group roster. Replaces, never merges.
    SendGroups { groups: Vec<GroupDescriptor> },

    /// S→C: everyone currently online. Replaces, never merges.
    SendUsers { users: Vec<UserDescriptor> },

    /// C→S: please send a `SendGroups` snapshot.
    RequestGroups,

    /// C→S: please send a `SendUsers` snapshot.
    RequestUsers,

    // -- Chat traffic --

    /// Either direction: a message to every member of a group.
    GroupMessage {
        sender_id: ClientId,
        group_id: GroupId,
        sender_name: String,
        text: String,
    },

    /// Either direction: a whisper to one client.
    PrivateMessage {
        sender_id: ClientId,
        recipient_id: ClientId,
        sender_name: String,
        text: String,
    },

    /// Either direction: `client_id` is typing in `group_id`.
    SendKeystroke {
        client_id: ClientId,
        group_id: GroupId,
    },
}

impl Packet {
    /// Returns the type tag this packet is written with.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connection { .. } => PacketType::Connection,
            Self::Connected { .. } => PacketType::Connected,
            Self::Disconnection { .. } => PacketType::Disconnection,
            Self::CreateGroup { .. } => PacketType::CreateGroup,
            Self::DeleteGroup { .. } => PacketType::DeleteGroup,
            Self::ChangeGroupOwner { .. } => PacketType::ChangeGroupOwner,
            Self::JoinGroup { .. } => PacketType::JoinGroup,
            Self::JoinedGroup { .. } => PacketType::JoinedGroup,
            Self::LeaveGroup { .. } => PacketType::LeaveGroup,
            Self::LeftGroup { .. } => PacketType::LeftGroup,
            Self::Kick { .. } => PacketType::Kick,
            Self::SendGroups { .. } => PacketType::SendGroups,
            Self::SendUsers { .. } => PacketType::SendUsers,
            Self::RequestGroups => PacketType::RequestGroups,
            Self::RequestUsers => PacketType::RequestUsers,
            Self::GroupMessage { .. } => PacketType::GroupMessage,
            Self::PrivateMessage { .. } => PacketType::PrivateMessage,
            Self::SendKeystroke { .. } => PacketType::SendKeystroke,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
