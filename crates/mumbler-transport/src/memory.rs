//! In-memory transport that records outbound frames.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{Transport, TransportError};

#[derive(Debug, Default)]
struct Recorded {
    open: bool,
    endpoints: Vec<String>,
    sent: Vec<Vec<u8>>,
}

/// A [`Transport`] with no network behind it.
///
/// `connect` opens the link immediately but emits nothing; whoever owns
/// the session feeds it [`TransportEvent`](crate::TransportEvent)s
/// directly. Every frame passed to `send` is kept for inspection.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inner: Mutex<Recorded>,
}

impl MemoryTransport {
    /// Creates a closed transport with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Endpoints passed to `connect`, oldest first.
    pub fn endpoints(&self) -> Vec<String> {
        self.lock().endpoints.clone()
    }

    /// Frames sent so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Drains and returns the frames sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Whether `connect` was called more recently than `disconnect`.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, endpoint: &str) {
        let mut inner = self.lock();
        inner.open = true;
        inner.endpoints.push(endpoint.to_string());
    }

    fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if !inner.open {
            return Err(TransportError::NotConnected);
        }
        inner.sent.push(data);
        Ok(())
    }

    fn disconnect(&self) {
        self.lock().open = false;
    }
}
