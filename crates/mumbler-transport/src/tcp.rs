//! TCP transport implementation using `tokio`.
//!
//! Each frame on the byte stream is a big-endian `u32` length followed by
//! that many bytes. One frame carries one encoded packet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    event_channel, EventReceiver, EventSender, Transport, TransportConfig,
    TransportError, TransportEvent,
};

/// The live connection, if any.
struct Link {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

/// A [`Transport`] over a single outgoing TCP connection.
pub struct TcpTransport {
    config: TransportConfig,
    runtime: Handle,
    events: EventSender,
    link: Mutex<Option<Link>>,
    /// Bumped on every connect/disconnect so a superseded task can tell
    /// it is no longer current.
    generation: Arc<AtomicU64>,
}

impl TcpTransport {
    /// Creates an idle transport and the channel its events arrive on.
    ///
    /// Must be called from within a Tokio runtime; the connection tasks
    /// are spawned onto it, so `connect` itself may be called from any
    /// thread.
    pub fn new(
        config: TransportConfig,
    ) -> Result<(Self, EventReceiver), TransportError> {
        let runtime =
            Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (events, rx) = event_channel();
        let transport = Self {
            config,
            runtime,
            events,
            link: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        };
        Ok((transport, rx))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for TcpTransport {
    fn connect(&self, endpoint: &str) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let mut link = self.lock();
        if let Some(old) = link.take() {
            tracing::debug!("superseding previous connection");
            old.task.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let task = self.runtime.spawn(run_connection(
            endpoint.to_string(),
            self.config.clone(),
            self.events.clone(),
            outbound_rx,
            generation,
            Arc::clone(&self.generation),
        ));
        *link = Some(Link { outbound, task });
    }

    fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        let max = self.config.max_frame_len;
        if data.len() > max {
            return Err(TransportError::FrameTooLarge {
                len: data.len(),
                max,
            });
        }
        let link = self.lock();
        let link = link.as_ref().ok_or(TransportError::NotConnected)?;
        link.outbound.send(data).map_err(|_| {
            TransportError::ConnectionClosed("writer stopped".into())
        })
    }

    /// Closes the connection once every queued frame has been written.
    ///
    /// Dropping the outbound sender lets the writer drain and stop, which
    /// ends the task. The bumped generation keeps it from reporting
    /// anything on the way out.
    fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.lock().take().is_some() {
            tracing::debug!("connection closed locally");
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(link) = self.lock().take() {
            link.task.abort();
        }
    }
}

/// Connects, then pumps frames both ways until either side fails.
async fn run_connection(
    endpoint: String,
    config: TransportConfig,
    events: EventSender,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    generation: u64,
    current: Arc<AtomicU64>,
) {
    let is_current = || current.load(Ordering::SeqCst) == generation;

    let connected = TcpStream::connect(&endpoint).await;
    if !is_current() {
        tracing::debug!(%endpoint, "connect attempt superseded");
        return;
    }
    let stream = match connected {
        Ok(stream) => stream,
        Err(source) => {
            let _ = events.send(TransportEvent::ConnectFailed(
                TransportError::ConnectFailed { endpoint, source },
            ));
            return;
        }
    };
    if config.nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not set TCP_NODELAY");
        }
    }
    tracing::debug!(%endpoint, "TCP connection established");
    let _ = events.send(TransportEvent::Connected);

    let (rd, wr) = stream.into_split();
    let max = config.max_frame_len;
    let reason = tokio::select! {
        e = read_frames(rd, &events, max, is_current) => e,
        e = write_frames(wr, &mut outbound) => e,
    };

    if is_current() {
        tracing::info!(%endpoint, reason = %reason, "connection lost");
        let _ = events.send(TransportEvent::Disconnected);
    }
}

/// Reads frames until the stream ends. Always returns the reason it stopped.
///
/// Frames still arriving after a local disconnect are discarded.
async fn read_frames(
    mut rd: OwnedReadHalf,
    events: &EventSender,
    max: usize,
    is_current: impl Fn() -> bool,
) -> TransportError {
    loop {
        let len = match rd.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return TransportError::ConnectionClosed(
                    "closed by peer".into(),
                );
            }
            Err(e) => return TransportError::ReceiveFailed(e),
        };
        if len > max {
            return TransportError::FrameTooLarge { len, max };
        }
        let mut buf = vec![0u8; len];
        if let Err(e) = rd.read_exact(&mut buf).await {
            return TransportError::ReceiveFailed(e);
        }
        tracing::trace!(len, "frame received");
        if !is_current() {
            continue;
        }
        if events.send(TransportEvent::Data(buf)).is_err() {
            return TransportError::ConnectionClosed(
                "event receiver dropped".into(),
            );
        }
    }
}

/// Writes queued frames until the queue closes or a write fails.
async fn write_frames(
    mut wr: OwnedWriteHalf,
    outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
) -> TransportError {
    while let Some(frame) = outbound.recv().await {
        // `send` already rejected frames over the limit, which is far
        // below u32::MAX.
        let len = frame.len() as u32;
        if let Err(e) = wr.write_u32(len).await {
            return TransportError::SendFailed(e);
        }
        if let Err(e) = wr.write_all(&frame).await {
            return TransportError::SendFailed(e);
        }
    }
    if let Err(e) = wr.shutdown().await {
        return TransportError::SendFailed(e);
    }
    TransportError::ConnectionClosed("outbound queue closed".into())
}
