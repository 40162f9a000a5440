//! `MumblerClient` builder and background event loop.
//!
//! This is the entry point for a chat application. It ties the layers
//! together: TCP transport → binary codec → session engine, and keeps a
//! task running that feeds transport events into the session.

use std::ops::Deref;
use std::sync::Arc;

use mumbler_protocol::{BinaryCodec, ClientId};
use mumbler_session::{ChatSession, SessionConfig, SessionEvent};
use mumbler_transport::{TcpTransport, TransportConfig};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::MumblerError;

/// The session type a [`MumblerClient`] drives.
pub type TcpSession = ChatSession<TcpTransport, BinaryCodec>;

/// Everything needed to build a [`MumblerClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub session: SessionConfig,
}

/// Builder for configuring a [`MumblerClient`].
///
/// # Example
///
/// ```rust,no_run
/// use mumbler::prelude::*;
///
/// # async fn demo() -> Result<(), MumblerError> {
/// let client = MumblerClient::builder().build()?;
/// let me = client.login("127.0.0.1:6000", "ana").await?;
/// client.send_group_message(GroupId(1), format!("hello from {me}"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MumblerClientBuilder {
    config: ClientConfig,
}

impl MumblerClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the transport configuration.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config.transport = config;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Creates the transport and session and spawns the event loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<MumblerClient, MumblerError> {
        let (transport, events) = TcpTransport::new(self.config.transport)?;
        let session = Arc::new(ChatSession::new(transport, self.config.session));

        let pump = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run(events).await })
        };

        Ok(MumblerClient { session, pump })
    }
}

/// A chat client connected (or connectable) over TCP.
///
/// Derefs to [`ChatSession`], so every command and view of the session
/// is available directly on the client.
pub struct MumblerClient {
    session: Arc<TcpSession>,
    pump: JoinHandle<()>,
}

impl MumblerClient {
    /// Creates a new builder.
    pub fn builder() -> MumblerClientBuilder {
        MumblerClientBuilder::new()
    }

    /// A shared handle to the session, for tasks that outlive a borrow.
    pub fn session(&self) -> Arc<TcpSession> {
        Arc::clone(&self.session)
    }

    /// Connects and waits until the server assigns us an id.
    ///
    /// Combines [`ChatSession::connect`] with waiting for
    /// [`SessionEvent::Ready`]. The session keeps working the same way
    /// afterwards; this only saves the caller from watching events.
    pub async fn login(
        &self,
        endpoint: &str,
        username: &str,
    ) -> Result<ClientId, MumblerError> {
        let mut events = self.session.subscribe_events();
        self.session.connect(endpoint, username);

        loop {
            match events.recv().await {
                Ok(SessionEvent::Ready { client_id }) => return Ok(client_id),
                Ok(SessionEvent::ConnectFailed { reason }) => {
                    return Err(MumblerError::ConnectFailed(reason));
                }
                Ok(SessionEvent::Disconnected) | Err(RecvError::Closed) => {
                    return Err(MumblerError::ConnectionLost);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "login waiter lagged");
                }
            }
        }
    }
}

impl Deref for MumblerClient {
    type Target = TcpSession;

    fn deref(&self) -> &TcpSession {
        &self.session
    }
}

impl Drop for MumblerClient {
    fn drop(&mut self) {
        // The loop holds the session, which holds the event sender, so
        // the channel never closes on its own.
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_starts_disconnected() {
        let client = MumblerClient::builder().build().unwrap();
        assert!(!client.is_connected());
        assert!(client.groups().is_empty());
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = MumblerClient::builder().build();
        assert!(matches!(
            result,
            Err(MumblerError::Transport(
                mumbler_transport::TransportError::NoRuntime
            ))
        ));
    }

    #[test]
    fn test_builder_config_overrides() {
        let builder = MumblerClient::builder().session_config(SessionConfig {
            event_capacity: 8,
        });
        assert_eq!(builder.config.session.event_capacity, 8);
        assert!(builder.config.transport.nodelay);
    }
}
