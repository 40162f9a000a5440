//! # Mumbler
//!
//! Client library for a group-and-whisper chat server speaking a compact
//! binary protocol.
//!
//! Applications build a [`MumblerClient`], log in, and then work with the
//! session it wraps: read the group roster and user list, join groups,
//! open whispers, and follow the two replayable message logs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mumbler::prelude::*;
//!
//! # async fn demo() -> Result<(), MumblerError> {
//! mumbler::init_tracing();
//!
//! let client = MumblerClient::builder().build()?;
//! client.login("127.0.0.1:6000", "ana").await?;
//!
//! let mut messages = client.group_messages();
//! loop {
//!     let entry = messages.next().await;
//!     println!("{}: {}", entry.sender_name, entry.text);
//! }
//! # }
//! ```

mod client;
mod error;

pub use client::{
    ClientConfig, MumblerClient, MumblerClientBuilder, TcpSession,
};
pub use error::MumblerError;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Everything a chat application usually needs, in one import.
pub mod prelude {
    pub use crate::{ClientConfig, MumblerClient, MumblerError, TcpSession};
    pub use mumbler_protocol::{
        BinaryCodec, ClientId, GroupDescriptor, GroupId, Packet,
        PacketCodec, PacketType, Permission, ProtocolError, UserDescriptor,
    };
    pub use mumbler_session::{
        ChatEntry, ChatSession, Client, ConnectionState, Group, PrivateChat,
        ReplayCursor, SessionConfig, SessionError, SessionEvent,
    };
    pub use mumbler_transport::{
        Transport, TransportConfig, TransportError, TransportEvent,
    };
}
