//! Connection lifecycle (RFC 6455 Sections 4 and 7).

/// WebSocket connection state.
///
/// The lifecycle is linear: `Connecting -> Open -> Closing -> Closed`.
/// `Open` and `Closing` may be skipped, but no state is ever re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionState {
    /// Opening handshake in progress.
    #[default]
    Connecting,
    /// Handshake complete; messages flow both ways.
    Open,
    /// A Close frame has been sent or received; waiting for the other half.
    Closing,
    /// Terminal. Inbound bytes are discarded and sends fail.
    Closed,
}

impl ConnectionState {
    /// Anything but `Closed`.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Application messages go out only while `Open`.
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Frames are still decoded while `Closing`.
    #[must_use]
    pub const fn can_receive(&self) -> bool {
        matches!(self, Self::Open | Self::Closing)
    }

    /// Whether moving to `next` keeps the lifecycle linear.
    #[must_use]
    pub fn can_advance_to(&self, next: ConnectionState) -> bool {
        next > *self
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        };
        f.pad(name)
    }
}
