//! Error types for the protocol layer.
//!
//! Every codec failure is local and synchronous: the caller gets a
//! `ProtocolError` back and decides what to do. The session layer logs and
//! drops bad inbound frames; it never tears the connection down over one.

use crate::PacketType;

/// Errors produced while encoding or decoding packets.
///
/// Decode errors are reported in a fixed priority order: identifier,
/// then version, then type tag, then payload. The header is validated
/// front to back before any payload byte is read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The first two bytes aren't the application identifier `"CM"`.
    /// Whatever sent this isn't speaking our protocol.
    #[error("bad application identifier {0:02x?}")]
    BadIdentifier([u8; 2]),

    /// The major/minor version bytes don't match ours exactly.
    /// There is no compatibility across versions in either direction.
    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// The type tag doesn't map to any known packet kind.
    #[error("unknown packet type tag {0}")]
    UnknownPacketType(u8),

    /// The codec has no serializer for this packet kind.
    ///
    /// [`BinaryCodec`](crate::BinaryCodec) serializes every kind, so it
    /// never returns this; codecs covering a subset of the protocol do.
    #[error("packet type {0} is not supported by this codec")]
    UnsupportedPacketType(PacketType),

    /// The header was fine but the payload is truncated, has trailing
    /// bytes, or contains an invalid field (bad UTF-8, unknown enum byte).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A string or list is too long for its length prefix.
    /// Raised on encode, before any bytes are returned.
    #[error("{field} too large to encode ({len} > {max})")]
    PayloadTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },
}
