use std::time::Duration;

/// Everything [`crate::client::Connection::connect`] needs to reach a server
/// and keep the connection healthy afterward.
///
/// There is no `use_tls` flag here: the transport (plain TCP vs. TLS) is
/// picked by which `Connection<T, H>` the caller instantiates, not by a
/// runtime switch — see [`crate::transport::TcpTransport`] and
/// [`crate::transport::TlsTransport`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub path: String,
    pub port: u16,
    pub extra_headers: String,
    pub connection_timeout: Duration,
    pub ping_frequency: Duration,
    pub ping_timeout: Duration,
    pub close_timeout: Duration,
    /// Initial capacity for the parser's and factory's scratch buffers.
    pub initial_buffer_capacity: usize,
    /// Frames whose declared payload length exceeds this are rejected
    /// rather than buffered — defends against a hostile or broken peer
    /// sending an oversized length prefix.
    pub max_frame_size: usize,
    /// Upper bound on how many complete frames a single `poll()` dispatches
    /// before returning, so one connection can't starve a caller's loop.
    pub max_reads: usize,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        ClientConfig {
            host: host.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_extra_headers(mut self, extra_headers: impl Into<String>) -> Self {
        self.extra_headers = extra_headers.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: String::new(),
            path: String::from("/"),
            port: 443,
            extra_headers: String::new(),
            connection_timeout: Duration::from_secs(10),
            ping_frequency: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
            initial_buffer_capacity: 4096,
            max_frame_size: 16 << 20,
            max_reads: 4,
        }
    }
}
