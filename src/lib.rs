//! # ws13 - RFC 6455 WebSocket client engine
//!
//! `ws13` splits a WebSocket client into two layers:
//!
//! - a **sans-IO engine** ([`Connection`]) that performs the opening
//!   handshake, encodes and decodes frames, reassembles fragmented messages,
//!   answers pings and runs the close handshake, without ever touching a
//!   socket;
//! - a **tokio facade** ([`Client`], behind the default `async-tokio`
//!   feature) that dials, drives one engine per connection on its own task
//!   and reports to a [`Handler`].
//!
//! Every peer-triggered problem is a typed [`Error`], grouped by
//! [`ErrorKind`] into handshake, protocol, transport and closed-connection
//! failures.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ws13::{Client, ClientConfig, CloseCode, Handler, Message};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     fn on_message(&mut self, message: Message) {
//!         println!("{message:?}");
//!     }
//! }
//!
//! # async fn run() -> ws13::Result<()> {
//! let config = ClientConfig::new("ws://127.0.0.1:9001/echo").with_auto_reconnect(true);
//! let client = Client::connect(config, Echo).await?;
//! client.send_text("hello").await?;
//! client.close(CloseCode::Normal, "bye").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod client;

#[cfg(feature = "async-tokio")]
pub use client::{Client, Handler};
pub use config::{ClientConfig, Config, Limits, Timeouts};
pub use connection::{Connection, ConnectionState, Event, Role};
pub use error::{Error, ErrorKind, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{Frame, OpCode, WS_GUID, compute_accept_key};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<ClientConfig>();
        assert_send::<Message>();
        assert_send::<CloseFrame>();
        assert_send::<Event>();
        assert_send::<Connection>();
        #[cfg(feature = "async-tokio")]
        assert_send::<Client>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<ConnectionState>();
        assert_sync::<Role>();
        assert_sync::<Connection>();
        #[cfg(feature = "async-tokio")]
        assert_sync::<Client>();
    }
}
