//! Transport configuration.

/// Settings for [`TcpTransport`](crate::TcpTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest frame accepted in either direction, in bytes.
    /// A peer announcing a bigger frame is disconnected.
    pub max_frame_len: usize,

    /// Disable Nagle's algorithm. Chat traffic is small and latency
    /// sensitive, so this defaults to `true`.
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 1024 * 1024,
            nodelay: true,
        }
    }
}
