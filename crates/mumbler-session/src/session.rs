//! The chat session engine.
//!
//! [`ChatSession`] is the client's single source of truth. It sits between
//! a [`Transport`] (bytes in, bytes out) and the UI:
//!
//! ```text
//!   Transport ──TransportEvent──→ handle_transport_event ──→ dispatch(Packet)
//!       ↑                                                        │
//!       └────── send(encode(Packet)) ←── commands ←── UI         ▼
//!                                                    groups / users / chats
//!                                                    message logs, events
//! ```
//!
//! # Concurrency
//!
//! Transport events arrive on the runtime's tasks while the UI calls
//! commands from its own thread, so every method takes `&self`. Each
//! collection lives behind its own `std::sync::Mutex`, and each
//! read-modify-write happens in one critical section. Locks are never held
//! across an `.await` or a transport call.
//!
//! When two collections are needed at once they are locked in a fixed
//! order:
//!
//! - `groups` before `joined`
//! - `chats` before `users`
//! - `me` last, and never while waiting for anything else
//!
//! # What the session does NOT do
//!
//! - Echo outgoing messages. A message shows up in a log only once the
//!   server relays it back.
//! - Retry. A failed connect or a dropped link is reported and the caller
//!   decides what to do next.

use std::sync::Mutex;

use mumbler_protocol::{
    BinaryCodec, ClientId, GroupDescriptor, GroupId, Packet, PacketCodec,
    Permission, UserDescriptor,
};
use mumbler_transport::{
    EventReceiver, Transport, TransportError, TransportEvent,
};
use tokio::sync::{broadcast, watch};

use crate::replay::{ReplayCursor, ReplayLog};
use crate::{
    lock, ChatEntry, Client, ConnectionState, Group, PrivateChat,
    SessionConfig, SessionError, SessionEvent,
};

/// A client-side chat session over one transport.
///
/// Generic over the [`Transport`] so tests can drive it with
/// [`MemoryTransport`](mumbler_transport::MemoryTransport), and over the
/// [`PacketCodec`] so the wire format can be swapped.
///
/// ## Example
///
/// ```
/// use mumbler_protocol::{ClientId, Packet};
/// use mumbler_session::{ChatSession, SessionConfig};
/// use mumbler_transport::{MemoryTransport, TransportEvent};
///
/// let session =
///     ChatSession::new(MemoryTransport::new(), SessionConfig::default());
/// session.connect("127.0.0.1:6000", "ana");
/// session.handle_transport_event(TransportEvent::Connected);
/// session.dispatch(Packet::Connected { client_id: ClientId(7) });
///
/// assert!(session.is_connected());
/// assert_eq!(session.me().id, ClientId(7));
/// ```
pub struct ChatSession<T: Transport, C: PacketCodec = BinaryCodec> {
    transport: T,
    codec: C,

    state: Mutex<ConnectionState>,
    me: Mutex<Client>,

    /// The latest `SendGroups` snapshot, in server order.
    groups: Mutex<Vec<Group>>,
    /// Groups we belong to. Every entry's id is also in `groups`.
    joined: Mutex<Vec<Group>>,
    /// The latest `SendUsers` snapshot, in server order.
    users: Mutex<Vec<Client>>,
    /// Open whispers, at most one per remote id.
    chats: Mutex<Vec<PrivateChat>>,

    group_messages: ReplayLog<ChatEntry>,
    private_messages: ReplayLog<ChatEntry>,

    connectivity: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> ChatSession<T, BinaryCodec> {
    /// Creates a disconnected session speaking the binary wire format.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_codec(transport, BinaryCodec, config)
    }
}

impl<T: Transport, C: PacketCodec> ChatSession<T, C> {
    /// Creates a disconnected session with a custom codec.
    pub fn with_codec(transport: T, codec: C, config: SessionConfig) -> Self {
        let (connectivity, _) = watch::channel(false);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            transport,
            codec,
            state: Mutex::new(ConnectionState::Disconnected),
            me: Mutex::new(Client::default()),
            groups: Mutex::new(Vec::new()),
            joined: Mutex::new(Vec::new()),
            users: Mutex::new(Vec::new()),
            chats: Mutex::new(Vec::new()),
            group_messages: ReplayLog::new(),
            private_messages: ReplayLog::new(),
            connectivity,
            events,
        }
    }

    /// The transport this session drives.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts connecting to `endpoint` as `username`.
    ///
    /// Returns immediately. The outcome arrives later as a transport
    /// event: `Connected` moves the session on and sends the `Connection`
    /// packet, `ConnectFailed` sends it back to `Disconnected`.
    ///
    /// Calling it while connected replaces the current link, so the
    /// connectivity signal drops at once.
    pub fn connect(&self, endpoint: &str, username: &str) {
        lock(&self.me).name = username.to_string();
        let previous = std::mem::replace(
            &mut *lock(&self.state),
            ConnectionState::Connecting,
        );
        if previous == ConnectionState::Connected {
            self.connectivity.send_replace(false);
        }
        tracing::info!(%endpoint, %username, from = %previous, "connecting");
        self.transport.connect(endpoint);
    }

    /// Leaves the server on purpose.
    ///
    /// When connected, a `Disconnection` packet is sent first. The
    /// transport is then closed. No [`SessionEvent::Disconnected`] is
    /// emitted, since that event means the link was lost.
    pub fn disconnect(&self) {
        let previous = std::mem::replace(
            &mut *lock(&self.state),
            ConnectionState::Disconnected,
        );
        if previous == ConnectionState::Connected {
            let packet = Packet::Disconnection {
                client_id: self.me().id,
            };
            if let Err(e) = self.transmit(&packet) {
                tracing::warn!(error = %e, "could not announce disconnection");
            }
        }
        self.transport.disconnect();
        self.connectivity.send_replace(false);
        tracing::info!(from = %previous, "disconnected");
    }

    /// Feeds one transport notification into the session.
    pub fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_transport_connected(),
            TransportEvent::ConnectFailed(error) => {
                self.on_connect_failed(error)
            }
            TransportEvent::Disconnected => self.on_transport_disconnected(),
            TransportEvent::Data(bytes) => match self.codec.decode(&bytes) {
                Ok(packet) => self.dispatch(packet),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        len = bytes.len(),
                        "dropping undecodable frame"
                    );
                }
            },
        }
    }

    /// Consumes transport events until the channel closes.
    pub async fn run(&self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle_transport_event(event);
        }
        tracing::debug!("transport event channel closed");
    }

    fn on_transport_connected(&self) {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Connecting {
                tracing::debug!(
                    state = %*state,
                    "ignoring stale connect notification"
                );
                return;
            }
            *state = ConnectionState::Connected;
        }
        self.forget_previous_session();
        self.connectivity.send_replace(true);

        let username = self.me().name;
        tracing::info!(%username, "transport connected, logging in");
        if let Err(e) = self.transmit(&Packet::Connection { username }) {
            tracing::warn!(error = %e, "could not send connection packet");
        }
    }

    /// Drops everything the server granted on an earlier link. A new link
    /// starts with no id, no memberships and no open chats; the roster
    /// stays until the next `SendGroups` replaces it.
    fn forget_previous_session(&self) {
        lock(&self.me).id = ClientId::UNASSIGNED;
        let had_joined = !std::mem::take(&mut *lock(&self.joined)).is_empty();
        let had_chats = !std::mem::take(&mut *lock(&self.chats)).is_empty();
        let had_users = !std::mem::take(&mut *lock(&self.users)).is_empty();
        if had_joined || had_chats || had_users {
            tracing::debug!(
                had_joined,
                had_chats,
                had_users,
                "cleared state from previous connection"
            );
        }
        if had_joined {
            self.emit(SessionEvent::JoinedGroupsUpdated);
        }
        if had_chats {
            self.emit(SessionEvent::ChatsUpdated);
        }
        if had_users {
            self.emit(SessionEvent::UsersUpdated);
        }
    }

    fn on_connect_failed(&self, error: TransportError) {
        *lock(&self.state) = ConnectionState::Disconnected;
        self.connectivity.send_replace(false);
        tracing::error!(error = %error, "connect failed");
        self.emit(SessionEvent::ConnectFailed {
            reason: error.to_string(),
        });
    }

    fn on_transport_disconnected(&self) {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Connected {
                tracing::debug!(
                    state = %*state,
                    "ignoring disconnect notification"
                );
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        self.connectivity.send_replace(false);
        tracing::warn!("connection to server lost");
        self.emit(SessionEvent::Disconnected);
    }

    // -----------------------------------------------------------------------
    // Inbound packets
    // -----------------------------------------------------------------------

    /// Applies one decoded packet to the local state.
    ///
    /// Never fails: packets that don't fit the current state are logged
    /// and ignored.
    pub fn dispatch(&self, packet: Packet) {
        tracing::debug!(packet_type = %packet.packet_type(), "packet received");
        match packet {
            Packet::Connected { client_id } => self.on_connected(client_id),
            Packet::Disconnection { client_id } => {
                tracing::info!(%client_id, "server announced disconnection");
            }
            Packet::SendGroups { groups } => self.on_groups_snapshot(groups),
            Packet::SendUsers { users } => self.on_users_snapshot(users),
            Packet::JoinedGroup {
                client_id,
                group_id,
            } => self.on_joined_group(client_id, group_id),
            Packet::LeftGroup {
                client_id,
                group_id,
            } => self.on_left_group(client_id, group_id, false),
            Packet::Kick {
                client_id,
                group_id,
            } => self.on_left_group(client_id, group_id, true),
            Packet::DeleteGroup { group_id, .. } => {
                self.on_group_deleted(group_id)
            }
            Packet::ChangeGroupOwner {
                group_id,
                new_owner_id,
            } => {
                if self.update_group(group_id, |g| g.owner_id = new_owner_id) {
                    self.emit(SessionEvent::GroupsUpdated);
                } else {
                    tracing::warn!(%group_id, "owner change for unknown group");
                }
            }
            Packet::GroupMessage {
                sender_id,
                group_id,
                sender_name,
                text,
            } => self.group_messages.append(ChatEntry {
                sender_id,
                sender_name,
                text,
                group_id: Some(group_id),
                recipient_id: None,
            }),
            Packet::PrivateMessage {
                sender_id,
                recipient_id,
                sender_name,
                text,
            } => self.on_private_message(
                sender_id,
                recipient_id,
                sender_name,
                text,
            ),
            Packet::SendKeystroke {
                client_id,
                group_id,
            } => self.emit(SessionEvent::Typing {
                client_id,
                group_id,
            }),
            Packet::Connection { .. }
            | Packet::CreateGroup { .. }
            | Packet::JoinGroup { .. }
            | Packet::LeaveGroup { .. }
            | Packet::RequestGroups
            | Packet::RequestUsers => {
                tracing::debug!("ignoring client-originated packet");
            }
        }
    }

    fn on_connected(&self, client_id: ClientId) {
        lock(&self.me).id = client_id;
        tracing::info!(%client_id, "server assigned id");

        for packet in [Packet::RequestGroups, Packet::RequestUsers] {
            if let Err(e) = self.transmit(&packet) {
                tracing::warn!(error = %e, "could not request snapshot");
            }
        }
        self.emit(SessionEvent::Ready { client_id });
    }

    /// Replaces the roster and reconciles our memberships against it.
    fn on_groups_snapshot(&self, descriptors: Vec<GroupDescriptor>) {
        let snapshot: Vec<Group> =
            descriptors.into_iter().map(Group::from).collect();
        let dropped = {
            let mut groups = lock(&self.groups);
            let mut joined = lock(&self.joined);
            let before = joined.len();
            let refreshed: Vec<Group> = joined
                .iter()
                .filter_map(|j| snapshot.iter().find(|g| g.id == j.id).cloned())
                .collect();
            *joined = refreshed;
            *groups = snapshot;
            before - joined.len()
        };
        tracing::debug!(dropped, "group roster replaced");
        self.emit(SessionEvent::GroupsUpdated);
        if dropped > 0 {
            self.emit(SessionEvent::JoinedGroupsUpdated);
        }
    }

    fn on_users_snapshot(&self, descriptors: Vec<UserDescriptor>) {
        let count = descriptors.len();
        *lock(&self.users) =
            descriptors.into_iter().map(Client::from).collect();
        tracing::debug!(count, "user list replaced");
        self.emit(SessionEvent::UsersUpdated);
    }

    fn on_joined_group(&self, client_id: ClientId, group_id: GroupId) {
        if client_id != self.me().id {
            if self.update_group(group_id, |g| {
                g.members.insert(client_id);
            }) {
                self.emit(SessionEvent::GroupsUpdated);
            }
            return;
        }

        let mut groups = lock(&self.groups);
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            tracing::warn!(%group_id, "join confirmed for unknown group");
            return;
        };
        group.members.insert(client_id);
        let group = group.clone();

        let mut joined = lock(&self.joined);
        if joined.iter().any(|g| g.id == group_id) {
            tracing::debug!(%group_id, "already a member");
            return;
        }
        joined.push(group);
        drop(joined);
        drop(groups);

        tracing::info!(%group_id, "joined group");
        self.emit(SessionEvent::JoinedGroupsUpdated);
    }

    /// Handles both `LeftGroup` and `Kick`.
    fn on_left_group(
        &self,
        client_id: ClientId,
        group_id: GroupId,
        kicked: bool,
    ) {
        let known = self.update_group(group_id, |g| {
            g.members.remove(&client_id);
        });
        if client_id != self.me().id {
            if known {
                self.emit(SessionEvent::GroupsUpdated);
            }
            return;
        }

        let removed = {
            let mut joined = lock(&self.joined);
            let before = joined.len();
            joined.retain(|g| g.id != group_id);
            joined.len() < before
        };
        if !removed {
            tracing::debug!(%group_id, kicked, "not a member of that group");
            return;
        }
        if kicked {
            tracing::warn!(%group_id, "kicked from group");
            self.emit(SessionEvent::Kicked { group_id });
        } else {
            tracing::info!(%group_id, "left group");
        }
        self.emit(SessionEvent::JoinedGroupsUpdated);
    }

    fn on_group_deleted(&self, group_id: GroupId) {
        let (removed, was_joined) = {
            let mut groups = lock(&self.groups);
            let mut joined = lock(&self.joined);
            let before = (groups.len(), joined.len());
            groups.retain(|g| g.id != group_id);
            joined.retain(|g| g.id != group_id);
            (groups.len() < before.0, joined.len() < before.1)
        };
        if !removed {
            tracing::debug!(%group_id, "delete for unknown group");
            return;
        }
        tracing::info!(%group_id, "group deleted");
        self.emit(SessionEvent::GroupsUpdated);
        if was_joined {
            self.emit(SessionEvent::JoinedGroupsUpdated);
        }
    }

    fn on_private_message(
        &self,
        sender_id: ClientId,
        recipient_id: ClientId,
        sender_name: String,
        text: String,
    ) {
        // A whisper we sent, relayed back, belongs to the chat with its
        // recipient.
        let remote = if sender_id == self.me().id {
            recipient_id
        } else {
            sender_id
        };
        self.open_chat(remote);
        self.private_messages.append(ChatEntry {
            sender_id,
            sender_name,
            text,
            group_id: None,
            recipient_id: Some(recipient_id),
        });
    }

    /// Applies `change` to the group in both `groups` and `joined`.
    /// Returns `false` if the group isn't in the roster.
    fn update_group(
        &self,
        group_id: GroupId,
        change: impl Fn(&mut Group),
    ) -> bool {
        let mut groups = lock(&self.groups);
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            return false;
        };
        change(group);
        let mut joined = lock(&self.joined);
        if let Some(entry) = joined.iter_mut().find(|g| g.id == group_id) {
            change(entry);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Posts `text` to a group. The message appears in
    /// [`group_messages`](Self::group_messages) once the server relays it.
    pub fn send_group_message(
        &self,
        group_id: GroupId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let me = self.me();
        self.send(&Packet::GroupMessage {
            sender_id: me.id,
            group_id,
            sender_name: me.name,
            text: text.into(),
        })
    }

    /// Whispers `text` to one client.
    pub fn send_private_message(
        &self,
        recipient_id: ClientId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let me = self.me();
        self.send(&Packet::PrivateMessage {
            sender_id: me.id,
            recipient_id,
            sender_name: me.name,
            text: text.into(),
        })
    }

    /// Asks to join a free group.
    ///
    /// Local state is untouched until the server confirms with
    /// `JoinedGroup`.
    pub fn join_group(&self, group_id: GroupId) -> Result<(), SessionError> {
        self.join_group_with_password(group_id, "")
    }

    /// Asks to join a password-protected group.
    pub fn join_group_with_password(
        &self,
        group_id: GroupId,
        password: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.send(&Packet::JoinGroup {
            client_id: self.me().id,
            group_id,
            password: password.into(),
        })
    }

    /// Leaves a group. The group disappears from
    /// [`joined_groups`](Self::joined_groups) right away, before the
    /// server answers.
    pub fn leave_group(&self, group_id: GroupId) -> Result<(), SessionError> {
        let removed = {
            let mut joined = lock(&self.joined);
            let before = joined.len();
            joined.retain(|g| g.id != group_id);
            joined.len() < before
        };
        if removed {
            self.emit(SessionEvent::JoinedGroupsUpdated);
        }
        self.send(&Packet::LeaveGroup {
            client_id: self.me().id,
            group_id,
        })
    }

    /// Asks the server to create a group owned by us.
    pub fn create_group(
        &self,
        name: impl Into<String>,
        permission: Permission,
        password: impl Into<String>,
        threshold: u32,
    ) -> Result<(), SessionError> {
        self.send(&Packet::CreateGroup {
            owner_id: self.me().id,
            name: name.into(),
            permission,
            password: password.into(),
            threshold,
        })
    }

    /// Asks the server to delete a group. Only the owner may.
    pub fn delete_group(&self, group_id: GroupId) -> Result<(), SessionError> {
        self.send(&Packet::DeleteGroup {
            client_id: self.me().id,
            group_id,
        })
    }

    /// Asks the server to remove `client_id` from a group we own.
    pub fn kick(
        &self,
        client_id: ClientId,
        group_id: GroupId,
    ) -> Result<(), SessionError> {
        self.send(&Packet::Kick {
            client_id,
            group_id,
        })
    }

    /// Hands ownership of a group to another member.
    pub fn change_group_owner(
        &self,
        group_id: GroupId,
        new_owner_id: ClientId,
    ) -> Result<(), SessionError> {
        self.send(&Packet::ChangeGroupOwner {
            group_id,
            new_owner_id,
        })
    }

    /// Tells the group we are typing.
    pub fn send_keystroke(
        &self,
        group_id: GroupId,
    ) -> Result<(), SessionError> {
        self.send(&Packet::SendKeystroke {
            client_id: self.me().id,
            group_id,
        })
    }

    /// Asks for a fresh group roster.
    pub fn request_groups(&self) -> Result<(), SessionError> {
        self.send(&Packet::RequestGroups)
    }

    /// Asks for a fresh user list.
    pub fn request_users(&self) -> Result<(), SessionError> {
        self.send(&Packet::RequestUsers)
    }

    /// Opens (or returns the already open) whisper with `remote_id`.
    ///
    /// The remote must be in the latest user list. Otherwise a warning is
    /// logged and `None` returned. Nothing is sent either way.
    pub fn whisper(&self, remote_id: ClientId) -> Option<PrivateChat> {
        self.open_chat(remote_id)
    }

    /// Closes the whisper with `remote_id`. Returns `false` if none was open.
    pub fn close_whisper(&self, remote_id: ClientId) -> bool {
        let closed = {
            let mut chats = lock(&self.chats);
            let before = chats.len();
            chats.retain(|c| c.remote.id != remote_id);
            chats.len() < before
        };
        if closed {
            tracing::debug!(%remote_id, "whisper closed");
            self.emit(SessionEvent::ChatsUpdated);
        }
        closed
    }

    /// Shared by [`whisper`](Self::whisper) and inbound private messages.
    fn open_chat(&self, remote_id: ClientId) -> Option<PrivateChat> {
        let mut chats = lock(&self.chats);
        if let Some(existing) = chats.iter().find(|c| c.remote.id == remote_id)
        {
            return Some(existing.clone());
        }

        let remote =
            lock(&self.users).iter().find(|u| u.id == remote_id).cloned();
        let Some(remote) = remote else {
            tracing::warn!(%remote_id, "cannot whisper: user not connected");
            return None;
        };

        let chat = PrivateChat {
            local: self.me(),
            remote,
        };
        chats.push(chat.clone());
        drop(chats);

        tracing::debug!(%remote_id, "whisper opened");
        self.emit(SessionEvent::ChatsUpdated);
        Some(chat)
    }

    /// Encodes and sends one packet, refusing while not connected.
    fn send(&self, packet: &Packet) -> Result<(), SessionError> {
        let state = self.connection_state();
        if state != ConnectionState::Connected {
            return Err(SessionError::NotConnected(state));
        }
        self.transmit(packet)
    }

    fn transmit(&self, packet: &Packet) -> Result<(), SessionError> {
        let bytes = self.codec.encode(packet)?;
        self.transport.send(bytes)?;
        tracing::debug!(packet_type = %packet.packet_type(), "packet sent");
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Ourselves: the name given to `connect` and the server-assigned id.
    pub fn me(&self) -> Client {
        lock(&self.me).clone()
    }

    /// Current value of the connectivity signal.
    pub fn is_connected(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// A receiver that sees every change of the connectivity signal.
    pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// A cursor over every group message received, starting from the first.
    pub fn group_messages(&self) -> ReplayCursor<ChatEntry> {
        self.group_messages.subscribe()
    }

    /// A cursor over every whisper received, starting from the first.
    pub fn private_messages(&self) -> ReplayCursor<ChatEntry> {
        self.private_messages.subscribe()
    }

    pub fn groups(&self) -> Vec<Group> {
        lock(&self.groups).clone()
    }

    pub fn group(&self, group_id: GroupId) -> Option<Group> {
        lock(&self.groups).iter().find(|g| g.id == group_id).cloned()
    }

    pub fn joined_groups(&self) -> Vec<Group> {
        lock(&self.joined).clone()
    }

    pub fn connected_users(&self) -> Vec<Client> {
        lock(&self.users).clone()
    }

    pub fn private_chats(&self) -> Vec<PrivateChat> {
        lock(&self.chats).clone()
    }

    pub fn private_chat(&self, remote_id: ClientId) -> Option<PrivateChat> {
        lock(&self.chats).iter().find(|c| c.remote.id == remote_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use mumbler_transport::MemoryTransport;

    use super::*;

    // =======================================================================
    // Helpers
    // =======================================================================

    fn gid(n: u16) -> GroupId {
        GroupId(n)
    }

    fn cid(n: u16) -> ClientId {
        ClientId(n)
    }

    fn descriptor(id: u16, name: &str) -> GroupDescriptor {
        GroupDescriptor {
            id: gid(id),
            owner_id: cid(1),
            name: name.into(),
            permission: Permission::Free,
            threshold: 60,
            members: vec![cid(1)],
        }
    }

    fn user(id: u16, name: &str) -> UserDescriptor {
        UserDescriptor {
            id: cid(id),
            name: name.into(),
        }
    }

    fn fresh() -> ChatSession<MemoryTransport> {
        ChatSession::new(MemoryTransport::new(), SessionConfig::default())
    }

    /// A session that is connected, logged in as C-5 "me", with the
    /// outbound buffer cleared.
    fn session() -> ChatSession<MemoryTransport> {
        let session = fresh();
        session.connect("server:1", "me");
        session.handle_transport_event(TransportEvent::Connected);
        session.dispatch(Packet::Connected { client_id: cid(5) });
        session.transport().take_sent();
        session
    }

    fn sent(session: &ChatSession<MemoryTransport>) -> Vec<Packet> {
        session
            .transport()
            .take_sent()
            .iter()
            .map(|bytes| BinaryCodec.decode(bytes).unwrap())
            .collect()
    }

    fn ids(groups: &[Group]) -> Vec<GroupId> {
        groups.iter().map(|g| g.id).collect()
    }

    // =======================================================================
    // Lifecycle
    // =======================================================================

    #[test]
    fn test_connect_moves_to_connecting() {
        let session = fresh();
        session.connect("server:1", "ana");

        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert_eq!(session.me().name, "ana");
        assert_eq!(session.transport().endpoints(), vec!["server:1"]);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_transport_connected_sends_connection_packet() {
        let session = fresh();
        let mut events = session.subscribe_events();
        session.connect("server:1", "ana");
        session.handle_transport_event(TransportEvent::Connected);

        assert_eq!(session.connection_state(), ConnectionState::Connected);
        assert!(session.is_connected());
        assert_eq!(
            sent(&session),
            vec![Packet::Connection {
                username: "ana".into()
            }]
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_connected_packet_sets_id_requests_snapshots_emits_ready() {
        let session = fresh();
        let mut events = session.subscribe_events();
        session.connect("server:1", "ana");
        session.handle_transport_event(TransportEvent::Connected);
        session.transport().take_sent();

        session.dispatch(Packet::Connected { client_id: cid(12) });

        assert_eq!(session.me().id, cid(12));
        assert_eq!(
            sent(&session),
            vec![Packet::RequestGroups, Packet::RequestUsers]
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Ready { client_id: cid(12) }
        );
    }

    #[test]
    fn test_connect_failed_returns_to_disconnected_with_event() {
        let session = fresh();
        let mut events = session.subscribe_events();
        session.connect("server:1", "ana");
        session.handle_transport_event(TransportEvent::ConnectFailed(
            TransportError::NotConnected,
        ));

        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());
        assert!(matches!(
            events.try_recv().unwrap(),
            SessionEvent::ConnectFailed { .. }
        ));
    }

    #[test]
    fn test_transport_disconnected_while_connected_emits_event() {
        let session = session();
        let mut events = session.subscribe_events();
        session.handle_transport_event(TransportEvent::Disconnected);

        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Disconnected);
    }

    #[test]
    fn test_transport_disconnected_while_connecting_is_ignored() {
        let session = fresh();
        let mut events = session.subscribe_events();
        session.connect("server:1", "ana");
        session.handle_transport_event(TransportEvent::Disconnected);

        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_connect_while_connected_lowers_connectivity() {
        let session = session();
        let connectivity = session.subscribe_connectivity();
        assert!(*connectivity.borrow());

        session.connect("server:2", "me");

        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert!(!session.is_connected());
        assert!(!*connectivity.borrow());
    }

    #[test]
    fn test_disconnect_announces_and_closes_without_event() {
        let session = session();
        let mut events = session.subscribe_events();
        session.disconnect();

        // The packet went out before the link closed.
        assert_eq!(
            sent(&session),
            vec![Packet::Disconnection { client_id: cid(5) }]
        );
        assert!(!session.transport().is_open());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_undecodable_frame_is_dropped() {
        let session = session();
        session.handle_transport_event(TransportEvent::Data(vec![0xFF; 3]));
        assert!(session.is_connected());
        assert!(session.groups().is_empty());
    }

    #[test]
    fn test_data_frame_is_decoded_and_dispatched() {
        let session = session();
        let bytes = BinaryCodec
            .encode(&Packet::SendUsers {
                users: vec![user(7, "bob")],
            })
            .unwrap();
        session.handle_transport_event(TransportEvent::Data(bytes));
        assert_eq!(session.connected_users()[0].name, "bob");
    }

    // =======================================================================
    // Commands
    // =======================================================================

    #[test]
    fn test_command_before_connected_returns_not_connected() {
        let session = fresh();
        session.connect("server:1", "ana");

        let result = session.send_group_message(gid(1), "hi");
        assert!(matches!(
            result,
            Err(SessionError::NotConnected(ConnectionState::Connecting))
        ));
        assert!(session.transport().sent().is_empty());
    }

    #[test]
    fn test_send_group_message_uses_own_identity() {
        let session = session();
        session.send_group_message(gid(2), "hello").unwrap();

        assert_eq!(
            sent(&session),
            vec![Packet::GroupMessage {
                sender_id: cid(5),
                group_id: gid(2),
                sender_name: "me".into(),
                text: "hello".into(),
            }]
        );
        // No local echo.
        assert!(session.group_messages().try_next().is_none());
    }

    #[test]
    fn test_send_private_message_has_no_local_echo() {
        let session = session();
        session.send_private_message(cid(7), "psst").unwrap();

        assert!(matches!(
            sent(&session).as_slice(),
            [Packet::PrivateMessage { recipient_id, .. }]
                if *recipient_id == cid(7)
        ));
        assert!(session.private_messages().try_next().is_none());
    }

    #[test]
    fn test_join_group_with_password_sends_it() {
        let session = session();
        session.join_group_with_password(gid(3), "secret").unwrap();
        assert_eq!(
            sent(&session),
            vec![Packet::JoinGroup {
                client_id: cid(5),
                group_id: gid(3),
                password: "secret".into(),
            }]
        );
    }

    #[test]
    fn test_thin_commands_build_expected_packets() {
        let session = session();
        session
            .create_group("den", Permission::Password, "pw", 30)
            .unwrap();
        session.delete_group(gid(4)).unwrap();
        session.kick(cid(8), gid(4)).unwrap();
        session.change_group_owner(gid(4), cid(8)).unwrap();
        session.send_keystroke(gid(4)).unwrap();
        session.request_groups().unwrap();
        session.request_users().unwrap();

        assert_eq!(
            sent(&session),
            vec![
                Packet::CreateGroup {
                    owner_id: cid(5),
                    name: "den".into(),
                    permission: Permission::Password,
                    password: "pw".into(),
                    threshold: 30,
                },
                Packet::DeleteGroup {
                    client_id: cid(5),
                    group_id: gid(4)
                },
                Packet::Kick {
                    client_id: cid(8),
                    group_id: gid(4)
                },
                Packet::ChangeGroupOwner {
                    group_id: gid(4),
                    new_owner_id: cid(8)
                },
                Packet::SendKeystroke {
                    client_id: cid(5),
                    group_id: gid(4)
                },
                Packet::RequestGroups,
                Packet::RequestUsers,
            ]
        );
        // Server decides; nothing changed locally.
        assert!(session.groups().is_empty());
    }

    // =======================================================================
    // Inbound handling
    // =======================================================================

    #[test]
    fn test_joined_group_for_other_client_updates_members_only() {
        let session = session();
        session.dispatch(Packet::SendGroups {
            groups: vec![descriptor(1, "a")],
        });
        session.dispatch(Packet::JoinedGroup {
            client_id: cid(9),
            group_id: gid(1),
        });

        assert!(session.joined_groups().is_empty());
        assert!(session.group(gid(1)).unwrap().has_member(cid(9)));
    }

    #[test]
    fn test_joined_group_twice_is_not_duplicated() {
        let session = session();
        session.dispatch(Packet::SendGroups {
            groups: vec![descriptor(1, "a")],
        });
        for _ in 0..2 {
            session.dispatch(Packet::JoinedGroup {
                client_id: cid(5),
                group_id: gid(1),
            });
        }
        assert_eq!(ids(&session.joined_groups()), vec![gid(1)]);
        assert!(session.joined_groups()[0].has_member(cid(5)));
    }

    #[test]
    fn test_joined_group_unknown_is_ignored() {
        let session = session();
        session.dispatch(Packet::JoinedGroup {
            client_id: cid(5),
            group_id: gid(42),
        });
        assert!(session.joined_groups().is_empty());
    }

    #[test]
    fn test_kick_self_removes_membership_and_emits_kicked() {
        let session = session();
        session.dispatch(Packet::SendGroups {
            groups: vec![descriptor(1, "a")],
        });
        session.dispatch(Packet::JoinedGroup {
            client_id: cid(5),
            group_id: gid(1),
        });
        let mut events = session.subscribe_events();

        session.dispatch(Packet::Kick {
            client_id: cid(5),
            group_id: gid(1),
        });

        assert!(session.joined_groups().is_empty());
        assert!(!session.group(gid(1)).unwrap().has_member(cid(5)));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Kicked { group_id: gid(1) }
        );
    }

    #[test]
    fn test_kick_or_leave_for_unjoined_group_emits_nothing() {
        let session = session();
        session.dispatch(Packet::SendGroups {
            groups: vec![descriptor(1, "a")],
        });
        let mut events = session.subscribe_events();

        session.dispatch(Packet::Kick {
            client_id: cid(5),
            group_id: gid(1),
        });
        session.dispatch(Packet::LeftGroup {
            client_id: cid(5),
            group_id: gid(1),
        });

        assert!(session.joined_groups().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_left_group_other_client_keeps_membership() {
        let session = session();
        let mut group = descriptor(1, "a");
        group.members.push(cid(9));
        session.dispatch(Packet::SendGroups {
            groups: vec![group],
        });
        session.dispatch(Packet::JoinedGroup {
            client_id: cid(5),
            group_id: gid(1),
        });

        session.dispatch(Packet::LeftGroup {
            client_id: cid(9),
            group_id: gid(1),
        });

        assert_eq!(ids(&session.joined_groups()), vec![gid(1)]);
        assert!(!session.joined_groups()[0].has_member(cid(9)));
    }

    #[test]
    fn test_delete_group_removes_everywhere() {
        let session = session();
        session.dispatch(Packet::SendGroups {
            groups: vec![descriptor(1, "a"), descriptor(2, "b")],
        });
        session.dispatch(Packet::JoinedGroup {
            client_id: cid(5),
            group_id: gid(1),
        });

        session.dispatch(Packet::DeleteGroup {
            client_id: cid(1),
            group_id: gid(1),
        });

        assert_eq!(ids(&session.groups()), vec![gid(2)]);
        assert!(session.joined_groups().is_empty());
    }

    #[test]
    fn test_change_group_owner_updates_both_views() {
        let session = session();
        session.dispatch(Packet::SendGroups {
            groups: vec![descriptor(1, "a")],
        });
        session.dispatch(Packet::JoinedGroup {
            client_id: cid(5),
            group_id: gid(1),
        });

        session.dispatch(Packet::ChangeGroupOwner {
            group_id: gid(1),
            new_owner_id: cid(5),
        });

        assert_eq!(session.group(gid(1)).unwrap().owner_id, cid(5));
        assert_eq!(session.joined_groups()[0].owner_id, cid(5));
    }

    #[test]
    fn test_keystroke_emits_typing() {
        let session = session();
        let mut events = session.subscribe_events();
        session.dispatch(Packet::SendKeystroke {
            client_id: cid(9),
            group_id: gid(1),
        });
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Typing {
                client_id: cid(9),
                group_id: gid(1)
            }
        );
    }

    #[test]
    fn test_private_message_from_unknown_sender_still_logged() {
        let session = session();
        session.dispatch(Packet::PrivateMessage {
            sender_id: cid(9),
            recipient_id: cid(5),
            sender_name: "ghost".into(),
            text: "boo".into(),
        });

        assert!(session.private_chats().is_empty());
        let entry = session.private_messages().try_next().unwrap();
        assert_eq!(entry.sender_name, "ghost");
        assert!(entry.is_private());
    }

    #[test]
    fn test_relayed_own_whisper_opens_chat_with_recipient() {
        let session = session();
        session.dispatch(Packet::SendUsers {
            users: vec![user(5, "me"), user(7, "bob")],
        });
        session.dispatch(Packet::PrivateMessage {
            sender_id: cid(5),
            recipient_id: cid(7),
            sender_name: "me".into(),
            text: "hey".into(),
        });

        let chats = session.private_chats();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].remote.id, cid(7));
        assert_eq!(chats[0].local.id, cid(5));
    }

    #[test]
    fn test_client_originated_packet_is_ignored() {
        let session = session();
        session.dispatch(Packet::RequestGroups);
        session.dispatch(Packet::LeaveGroup {
            client_id: cid(5),
            group_id: gid(1),
        });
        assert!(sent(&session).is_empty());
    }

    #[test]
    fn test_close_whisper_unknown_returns_false() {
        let session = session();
        assert!(!session.close_whisper(cid(7)));
    }
}
