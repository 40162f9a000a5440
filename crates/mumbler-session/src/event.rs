//! Notifications the session broadcasts to the UI.

use mumbler_protocol::{ClientId, GroupId};
use serde::{Deserialize, Serialize};

/// Something the UI may want to react to.
///
/// Collection events ("groups updated" and friends) carry no payload: the
/// receiver re-reads the view it cares about, which is always the latest
/// state even if several updates were coalesced.
///
/// Chat messages are not events. They go to the replayable logs, see
/// [`ChatSession::group_messages`](crate::ChatSession::group_messages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// The server assigned us an id. Snapshots have been requested.
    Ready { client_id: ClientId },

    /// The connection dropped without us asking for it.
    Disconnected,

    /// The connect attempt failed. `reason` is the transport error text.
    ConnectFailed { reason: String },

    /// The group roster changed.
    GroupsUpdated,

    /// The set of groups we belong to changed.
    JoinedGroupsUpdated,

    /// The list of connected users changed.
    UsersUpdated,

    /// A whisper was opened or closed.
    ChatsUpdated,

    /// We were removed from a group by its owner.
    Kicked { group_id: GroupId },

    /// Someone is typing in a group.
    Typing {
        client_id: ClientId,
        group_id: GroupId,
    },
}
