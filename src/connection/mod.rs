//! Connection state machine.
//!
//! [`Connection`] is the sans-IO engine: it owns the handshake context, the
//! frame decoder, the message assembler and the close handshake, and talks
//! to the outside world only through byte buffers and [`Event`]s.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - upgrade request sent, waiting for `101`
//! 2. **Open** - messages flow both ways
//! 3. **Closing** - a Close frame was sent or received
//! 4. **Closed** - terminal; input is discarded and sends fail
//!
//! ## Example
//!
//! ```
//! use ws13::{Config, Connection, Event, Message, Role};
//!
//! let mut conn = Connection::open(Role::Client, Config::client());
//! conn.receive(&[0x81, 0x02, b'h', b'i']);
//! assert_eq!(conn.poll_event(), Some(Event::Message(Message::text("hi"))));
//!
//! conn.send_text("hello")?;
//! let wire = conn.take_outgoing().unwrap();
//! assert_eq!(wire[0], 0x81);
//! # Ok::<(), ws13::Error>(())
//! ```

mod fragmenter;
mod role;
mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, Event};
pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::ConnectionState;
