//! Configuration and limits for WebSocket connections.

use std::time::Duration;

/// Configuration limits for WebSocket connections.
///
/// These limits prevent resource exhaustion by a hostile peer and keep
/// memory usage bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// This applies to the total size after reassembling all fragments.
    /// RFC 6455 allows up to 2^63-1 bytes; the default keeps a single
    /// connection from buffering more than 64 MB.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the server's handshake response in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    /// - Max fragments: 16
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
        }
    }

    /// Create limits for unrestricted use.
    ///
    /// Warning: Use only with trusted peers.
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            max_frame_size: usize::MAX,
            max_message_size: usize::MAX,
            max_fragment_count: usize::MAX,
            max_handshake_size: 64 * 1024,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that a declared frame length is within limits.
    ///
    /// Takes the raw 64-bit wire length so oversized frames are rejected
    /// before any narrowing to `usize`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: u64) -> Result<(), crate::Error> {
        if size > self.max_frame_size as u64 {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Timeout configuration for WebSocket connections.
///
/// The engine itself never waits; these bound the waits performed by the
/// [`Client`](crate::Client) driver at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time from dialing to a validated handshake response.
    ///
    /// Default: 30 seconds
    pub handshake: Duration,

    /// Maximum time to wait for the peer's Close echo after sending Close.
    ///
    /// Default: 5 seconds
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(30),
            close: Duration::from_secs(5),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(handshake: Duration, close: Duration) -> Self {
        Self { handshake, close }
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Timeout configuration.
    pub timeouts: Timeouts,

    /// Mask frames when sending.
    ///
    /// RFC 6455 requires clients to mask all frames. Only an endpoint acting
    /// as a server may turn this off.
    ///
    /// Default: true
    pub mask_outgoing: bool,

    /// Accept unmasked frames from clients (server only).
    ///
    /// Default: false
    pub accept_unmasked_frames: bool,

    /// Split outgoing data messages into frames of at most this many bytes.
    ///
    /// Default: None (every message is sent as one final frame)
    pub fragment_size: Option<usize>,

    /// Read buffer size (in bytes) used by the client driver.
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,

    /// Subprotocol requested through `Sec-WebSocket-Protocol`.
    ///
    /// Default: None
    pub subprotocol: Option<String>,

    /// Extra headers appended to the upgrade request (e.g. `Origin`).
    ///
    /// Default: empty
    pub headers: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            mask_outgoing: true,
            accept_unmasked_frames: false,
            fragment_size: None,
            read_buffer_size: 8192,
            subprotocol: None,
            headers: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the maximum reassembled message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.limits.max_message_size = size;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Enable or disable masking of outgoing frames.
    #[must_use]
    pub const fn with_mask_outgoing(mut self, mask: bool) -> Self {
        self.mask_outgoing = mask;
        self
    }

    /// Set fragment size for outgoing messages.
    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = Some(size);
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Request a subprotocol during the handshake.
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    /// Append an extra header to the upgrade request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Configure for server role (no masking, reject unmasked client frames).
    #[must_use]
    pub fn server() -> Self {
        Self {
            mask_outgoing: false,
            accept_unmasked_frames: false,
            ..Default::default()
        }
    }

    /// Configure for client role (mask all frames).
    #[must_use]
    pub fn client() -> Self {
        Self {
            mask_outgoing: true,
            accept_unmasked_frames: false,
            ..Default::default()
        }
    }
}

/// Configuration for a [`Client`](crate::Client) connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Target `ws://` or `wss://` URL.
    pub url: String,

    /// Engine configuration.
    pub config: Config,

    /// Redial after an abnormal closure.
    ///
    /// Only applies to connections dialed by [`Client::connect`](crate::Client::connect).
    ///
    /// Default: false
    pub auto_reconnect: bool,

    /// Delay before each reconnect attempt.
    ///
    /// Default: 1 second
    pub reconnect_delay: Duration,

    /// Consecutive failed reconnect attempts before giving up.
    ///
    /// Default: 5
    pub max_reconnect_attempts: usize,
}

impl ClientConfig {
    /// Create a client configuration for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: Config::client(),
            auto_reconnect: false,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
        }
    }

    /// Replace the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum reassembled message size.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.limits.max_message_size = size;
        self
    }

    /// Enable or disable masking of outgoing frames.
    #[must_use]
    pub fn with_mask_outgoing(mut self, mask: bool) -> Self {
        self.config.mask_outgoing = mask;
        self
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the delay between reconnect attempts.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set how many consecutive reconnect attempts are made before giving up.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: usize) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.max_message_size, 64 * 1024 * 1024);
        assert_eq!(limits.max_fragment_count, 128);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_checks() {
        let limits = Limits::default();
        assert!(limits.check_message_size(1024).is_ok());
        assert!(limits.check_message_size(100 * 1024 * 1024).is_err());
        assert!(limits.check_frame_size(1024).is_ok());
        assert!(limits.check_frame_size(u64::MAX).is_err());
        assert!(limits.check_fragment_count(50).is_ok());
        assert!(limits.check_fragment_count(200).is_err());
        assert!(limits.check_handshake_size(1024).is_ok());
        assert!(limits.check_handshake_size(10000).is_err());
    }

    #[test]
    fn test_limits_unrestricted_accepts_large_frames() {
        let limits = Limits::unrestricted();
        assert!(limits.check_frame_size(u32::MAX as u64).is_ok());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.mask_outgoing);
        assert!(!config.accept_unmasked_frames);
        assert_eq!(config.fragment_size, None);
        assert_eq!(config.timeouts, Timeouts::default());
    }

    #[test]
    fn test_config_server() {
        let config = Config::server();
        assert!(!config.mask_outgoing);
        assert!(!config.accept_unmasked_frames);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_limits(Limits::embedded())
            .with_fragment_size(4096)
            .with_subprotocol("chat")
            .with_header("Origin", "http://example.com");

        assert_eq!(config.fragment_size, Some(4096));
        assert_eq!(config.limits.max_frame_size, 64 * 1024);
        assert_eq!(config.subprotocol.as_deref(), Some("chat"));
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_timeouts_default() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.handshake, Duration::from_secs(30));
        assert_eq!(timeouts.close, Duration::from_secs(5));
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new("ws://localhost:9001/chat");
        assert_eq!(config.url, "ws://localhost:9001/chat");
        assert!(!config.auto_reconnect);
        assert!(config.config.mask_outgoing);
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("ws://localhost/")
            .with_max_message_size(1024)
            .with_mask_outgoing(false)
            .with_auto_reconnect(true)
            .with_reconnect_delay(Duration::from_millis(10))
            .with_max_reconnect_attempts(2);

        assert_eq!(config.config.limits.max_message_size, 1024);
        assert_eq!(config.max_reconnect_attempts, 2);
        assert!(!config.config.mask_outgoing);
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_millis(10));
    }
}
