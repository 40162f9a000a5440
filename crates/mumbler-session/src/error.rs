//! Error types for the session layer.

use mumbler_protocol::ProtocolError;
use mumbler_transport::TransportError;

use crate::ConnectionState;

/// Errors returned by the outbound commands of a
/// [`ChatSession`](crate::ChatSession).
///
/// Inbound problems (a malformed packet, a message for an unknown group)
/// never surface here. They are logged and the packet is dropped, so a
/// misbehaving server can't take the session down.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The packet could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport refused the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A command was issued before the server link came up.
    ///
    /// Commands are only accepted once the transport reports
    /// `Connected`, which keeps them from being queued ahead of the
    /// `Connection` packet.
    #[error("not connected (session is {0})")]
    NotConnected(ConnectionState),
}
