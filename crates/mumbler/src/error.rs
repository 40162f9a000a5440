//! Unified error type for the Mumbler client.

use mumbler_protocol::ProtocolError;
use mumbler_session::SessionError;
use mumbler_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `mumbler` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum MumblerError {
    /// A transport-level error (connect, send, frame size).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (command while disconnected, failed send).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server could not be reached.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The link dropped before the server assigned us an id.
    #[error("connection lost before login completed")]
    ConnectionLost,
}
