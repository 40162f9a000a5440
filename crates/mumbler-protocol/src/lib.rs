//! Wire protocol for Mumbler.
//!
//! This crate defines the "language" the chat client and server speak:
//!
//! - **Types** ([`Packet`], [`PacketType`], [`GroupDescriptor`], ...):
//!   one variant per message kind, pure data.
//! - **Codec** ([`PacketCodec`] trait, [`BinaryCodec`]): the versioned,
//!   type-tagged binary framing.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding
//!   or decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the
//! session engine (local chat state). It knows nothing about connections
//! or groups beyond their wire representation.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Session (groups, users, chats)
//! ```

mod codec;
mod error;
mod types;
mod wire;

pub use codec::{
    BinaryCodec, PacketCodec, APP_IDENTIFIER, HEADER_LEN, VERSION_MAJOR,
    VERSION_MINOR,
};
pub use error::ProtocolError;
pub use types::{
    ClientId, GroupDescriptor, GroupId, Packet, PacketType, Permission,
    UserDescriptor,
};
