//! Endpoint role (RFC 6455 Section 5.1).

/// Which end of the connection this endpoint is.
///
/// The role fixes the masking direction: clients mask every frame they send
/// and must never receive a masked frame; servers are the mirror image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Initiates the handshake and masks outgoing frames.
    Client,
    /// Accepts the handshake and sends unmasked frames.
    Server,
}

impl Role {
    /// Whether frames sent by this role must carry a mask.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether frames received by this role must carry a mask.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }

    /// The role of the other endpoint.
    #[inline]
    #[must_use]
    pub const fn peer(&self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_direction() {
        assert!(Role::Client.must_mask());
        assert!(!Role::Client.expects_masked());
        assert!(!Role::Server.must_mask());
        assert!(Role::Server.expects_masked());
    }

    #[test]
    fn test_peer_expectations_match() {
        for role in [Role::Client, Role::Server] {
            assert_eq!(role.must_mask(), role.peer().expects_masked());
            assert_eq!(role.peer().peer(), role);
        }
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Server.to_string(), "server");
    }
}
