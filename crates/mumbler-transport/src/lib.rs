//! Transport abstraction layer for Mumbler.
//!
//! Provides the [`Transport`] trait the session engine drives, and the
//! [`TransportEvent`]s it reports back. The transport owns byte delivery
//! and framing; every [`TransportEvent::Data`] carries exactly one
//! already-delimited packet.
//!
//! # Implementations
//!
//! - [`TcpTransport`] (feature `tcp`, default): `tokio` TCP with `u32`
//!   length-prefixed frames.
//! - [`MemoryTransport`]: records outbound frames in memory. Used to
//!   drive the session engine without a socket.

mod config;
mod error;
mod memory;
#[cfg(feature = "tcp")]
mod tcp;

pub use config::TransportConfig;
pub use error::TransportError;
pub use memory::MemoryTransport;
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;

use tokio::sync::mpsc;

/// A connection-state change or an inbound frame.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connect attempt succeeded.
    Connected,
    /// The connect attempt failed. The transport is idle again.
    ConnectFailed(TransportError),
    /// An established connection was lost.
    Disconnected,
    /// One complete inbound frame.
    Data(Vec<u8>),
}

/// Sending half of the event channel a transport reports on.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of the event channel, consumed by the session engine.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates a fresh event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Client-side byte transport.
///
/// None of these methods block. Connection progress and inbound data are
/// reported on the transport's event channel.
pub trait Transport: Send + Sync + 'static {
    /// Starts connecting to `endpoint`, superseding any current connection.
    ///
    /// Resolves later as [`TransportEvent::Connected`] or
    /// [`TransportEvent::ConnectFailed`].
    fn connect(&self, endpoint: &str);

    /// Queues one framed packet for sending.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] when no connection is open, or
    /// [`TransportError::FrameTooLarge`] when `data` exceeds the frame
    /// limit.
    fn send(&self, data: Vec<u8>) -> Result<(), TransportError>;

    /// Closes the current connection, if any. Does not emit
    /// [`TransportEvent::Disconnected`].
    fn disconnect(&self);
}
