//! Tokio client facade.
//!
//! [`Client::connect`] dials, runs the opening handshake, and spawns one
//! driver task per connection. The task owns the [`Connection`] and the
//! stream; [`Client`] handles talk to it over a channel, so every frame of a
//! connection is processed by a single task. Callbacks on the [`Handler`] run
//! on that task.

use std::future::Future;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use url::{Host, Url};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState, Event};
use crate::error::{Error, ErrorKind, Result};
use crate::message::{CloseCode, CloseFrame, Message};

/// Pending requests per connection before senders wait.
const COMMAND_CAPACITY: usize = 32;

/// Application callbacks. Every method defaults to doing nothing.
pub trait Handler: Send + 'static {
    /// The handshake completed, including after a reconnect.
    fn on_open(&mut self, _protocol: Option<&str>) {}

    /// A complete Text or Binary message arrived.
    fn on_message(&mut self, _message: Message) {}

    /// A Ping arrived; the Pong has already been sent.
    fn on_ping(&mut self, _data: &[u8]) {}

    fn on_pong(&mut self, _data: &[u8]) {}

    /// The connection closed. Called once per connection.
    fn on_close(&mut self, _close: &CloseFrame) {}

    /// A handshake, protocol, or transport error ended the connection.
    fn on_error(&mut self, _kind: ErrorKind, _error: &Error) {}
}

type Reply = oneshot::Sender<Result<()>>;

#[derive(Debug)]
enum Command {
    Send(Message, Reply),
    Close(CloseCode, String, Reply),
}

impl Command {
    fn reject(self) {
        let reply = match self {
            Command::Send(_, reply) | Command::Close(_, _, reply) => reply,
        };
        let _ = reply.send(Err(Error::ConnectionClosed));
    }
}

/// Handle to a running WebSocket client connection.
///
/// Cloning is cheap; all clones address the same connection. When the last
/// handle is dropped the connection is closed with 1001 (going away).
///
/// ## Example
///
/// ```rust,no_run
/// use ws13::{Client, ClientConfig, Handler, Message};
///
/// struct Printer;
///
/// impl Handler for Printer {
///     fn on_message(&mut self, message: Message) {
///         println!("received {message:?}");
///     }
/// }
///
/// # async fn run() -> ws13::Result<()> {
/// let client = Client::connect(ClientConfig::new("ws://127.0.0.1:9001/"), Printer).await?;
/// client.send_text("hello").await?;
/// client.close(ws13::CloseCode::Normal, "done").await?;
/// client.closed().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl Client {
    /// Dial `config.url` over TCP and complete the handshake.
    ///
    /// Only `ws://` URLs are dialed; for `wss://` establish the TLS stream
    /// yourself and use [`connect_with`](Self::connect_with). Dialing and
    /// the handshake together are bounded by `Timeouts::handshake`.
    ///
    /// # Errors
    ///
    /// - handshake-kind errors for a bad URL or a rejected upgrade
    /// - `Error::Io` if the TCP connection fails
    /// - `Error::Timeout` if the handshake does not finish in time
    pub async fn connect<H: Handler>(config: ClientConfig, handler: H) -> Result<Self> {
        let (stream, conn) = open_tcp(&config).await?;
        let (client, commands, state) = Self::channels();
        tokio::spawn(supervise(conn, stream, handler, commands, state, config));
        Ok(client)
    }

    /// Run the handshake over an established stream (e.g. TLS).
    ///
    /// Connections created this way are never reconnected.
    ///
    /// # Errors
    ///
    /// As [`connect`](Self::connect), minus dialing.
    pub async fn connect_with<S, H>(mut stream: S, config: ClientConfig, handler: H) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: Handler,
    {
        let timeout = config.config.timeouts.handshake;
        let conn = with_timeout(timeout, "opening handshake", establish(&mut stream, &config)).await?;
        let (client, commands, state) = Self::channels();
        tokio::spawn(async move {
            let session = Session::new(conn, stream, handler, commands);
            session.run(&state).await;
            state.send_replace(ConnectionState::Closed);
        });
        Ok(client)
    }

    fn channels() -> (
        Self,
        mpsc::Receiver<Command>,
        watch::Sender<ConnectionState>,
    ) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Open);
        let client = Self {
            commands: commands_tx,
            state: state_rx,
        };
        (client, commands_rx, state_tx)
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        response.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Send any message.
    ///
    /// # Errors
    /// Fails fast with `Error::ConnectionClosed` unless the connection is
    /// `Open`; see [`Connection::send`] for the rest.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.request(|reply| Command::Send(message, reply)).await
    }

    /// Send a text message.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    /// Send a binary message.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    /// Send a ping.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn ping(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Ping(data.into())).await
    }

    /// Start the close handshake. Resolves once the Close frame is queued;
    /// use [`closed`](Self::closed) to wait for the end.
    ///
    /// # Errors
    /// See [`Connection::close`].
    pub async fn close(&self, code: CloseCode, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.request(|reply| Command::Close(code, reason, reply)).await
    }

    /// Current state as last published by the driver.
    ///
    /// While a reconnect is pending this reports `Connecting`.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection is `Closed` for good.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

/// One connection's driver: pumps bytes and commands through the engine.
///
/// Reads, writes, commands and the close deadline all race in one
/// `select!`, so a peer that stops reading cannot stall the close timeout.
struct Session<S, H> {
    conn: Connection,
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    /// Bytes taken from the engine and not yet accepted by the stream.
    pending: BytesMut,
    unflushed: bool,
    handler: H,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    user_closed: bool,
    failed: bool,
}

/// What a finished session hands back for a possible reconnect.
struct SessionEnd<H> {
    handler: H,
    commands: mpsc::Receiver<Command>,
    reconnect: bool,
}

impl<S, H> Session<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    fn new(conn: Connection, stream: S, handler: H, commands: mpsc::Receiver<Command>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            conn,
            reader,
            writer,
            pending: BytesMut::new(),
            unflushed: false,
            handler,
            commands,
            commands_open: true,
            user_closed: false,
            failed: false,
        }
    }

    async fn run(mut self, state: &watch::Sender<ConnectionState>) -> SessionEnd<H> {
        let mut buf = vec![0u8; self.conn.config().read_buffer_size.max(1)];
        let close_timeout = self.conn.config().timeouts.close;
        let mut close_deadline: Option<Instant> = None;

        loop {
            if let Some(bytes) = self.conn.take_outgoing() {
                self.pending.extend_from_slice(&bytes);
            }
            self.dispatch();

            let current = self.conn.state();
            if current == ConnectionState::Closed {
                break;
            }
            state.send_replace(current);
            if current == ConnectionState::Closing && close_deadline.is_none() {
                close_deadline = Some(Instant::now() + close_timeout);
            }

            let writing = !self.pending.is_empty() || self.unflushed;
            tokio::select! {
                read = self.reader.read(&mut buf) => match read {
                    Ok(0) => self.conn.transport_closed(),
                    Ok(n) => self.conn.receive(&buf[..n]),
                    Err(err) => self.conn.transport_error(err.into()),
                },
                written = write_some(&mut self.writer, &self.pending), if writing => match written {
                    Ok(0) => self.unflushed = false,
                    Ok(n) => {
                        self.pending.advance(n);
                        self.unflushed = true;
                    }
                    Err(err) => {
                        self.pending.clear();
                        self.conn.transport_error(err.into());
                    }
                },
                command = self.commands.recv(), if self.commands_open => {
                    self.handle_command(command);
                }
                () = sleep_until(close_deadline) => {
                    if !self.pending.is_empty() {
                        debug!("dropping {} unsent bytes at close timeout", self.pending.len());
                        self.pending.clear();
                    }
                    self.conn.close_timed_out();
                }
            }
        }

        // Whatever is left (typically our Close) gets one bounded attempt.
        if tokio::time::timeout(close_timeout, drain(&mut self.writer, &self.pending))
            .await
            .is_err()
        {
            debug!("gave up flushing {} bytes after close", self.pending.len());
        }
        SessionEnd {
            reconnect: self.failed && !self.user_closed && self.commands_open,
            handler: self.handler,
            commands: self.commands,
        }
    }

    fn handle_command(&mut self, command: Option<Command>) {
        match command {
            Some(Command::Send(message, reply)) => {
                let _ = reply.send(self.conn.send(message));
            }
            Some(Command::Close(code, reason, reply)) => {
                self.user_closed = true;
                let _ = reply.send(self.conn.close(code, &reason));
            }
            None => {
                debug!("all client handles dropped, closing");
                self.commands_open = false;
                let _ = self.conn.close(CloseCode::GoingAway, "");
            }
        }
    }

    fn dispatch(&mut self) {
        while let Some(event) = self.conn.poll_event() {
            match event {
                Event::Open { protocol } => self.handler.on_open(protocol.as_deref()),
                Event::Message(message) => self.handler.on_message(message),
                Event::Ping(data) => self.handler.on_ping(&data),
                Event::Pong(data) => self.handler.on_pong(&data),
                Event::Close(close) => {
                    debug!("connection closed: {} {:?}", close.code, close.reason);
                    if close.code == CloseCode::Abnormal {
                        self.failed = true;
                    }
                    self.handler.on_close(&close);
                }
                Event::Error(err) => {
                    self.failed = true;
                    self.handler.on_error(err.kind(), &err);
                }
            }
        }
    }
}

/// Driver for dialed connections: runs sessions and redials after
/// abnormal closures when enabled.
async fn supervise<H: Handler>(
    mut conn: Connection,
    mut stream: TcpStream,
    mut handler: H,
    mut commands: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
    config: ClientConfig,
) {
    'sessions: loop {
        let end = Session::new(conn, stream, handler, commands).run(&state).await;
        handler = end.handler;
        commands = end.commands;

        if !(config.auto_reconnect && end.reconnect) {
            break;
        }

        let mut attempt = 0;
        loop {
            if attempt >= config.max_reconnect_attempts {
                warn!(
                    "giving up on {} after {attempt} reconnect attempts",
                    config.url
                );
                break 'sessions;
            }
            attempt += 1;
            state.send_replace(ConnectionState::Connecting);

            if !reject_commands_for(&mut commands, config.reconnect_delay).await {
                debug!("all client handles dropped while reconnecting");
                break 'sessions;
            }

            debug!(
                "reconnecting to {} (attempt {attempt}/{})",
                config.url, config.max_reconnect_attempts
            );
            match open_tcp(&config).await {
                Ok((next_stream, next_conn)) => {
                    stream = next_stream;
                    conn = next_conn;
                    continue 'sessions;
                }
                Err(err) => {
                    warn!("reconnect attempt {attempt} failed: {err}");
                    handler.on_error(err.kind(), &err);
                }
            }
        }
    }

    state.send_replace(ConnectionState::Closed);
}

/// Answer commands with `ConnectionClosed` for `delay`.
///
/// Returns `false` if every handle was dropped in the meantime.
async fn reject_commands_for(commands: &mut mpsc::Receiver<Command>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            command = commands.recv() => match command {
                Some(command) => command.reject(),
                None => return false,
            },
        }
    }
}

async fn open_tcp(config: &ClientConfig) -> Result<(TcpStream, Connection)> {
    let timeout = config.config.timeouts.handshake;
    with_timeout(timeout, "opening handshake", async {
        let mut stream = dial(&config.url).await?;
        let conn = establish(&mut stream, config).await?;
        Ok((stream, conn))
    })
    .await
}

async fn dial(url: &str) -> Result<TcpStream> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "ws" => {}
        "wss" => {
            return Err(Error::InvalidUrl(
                "wss:// needs a TLS stream; use Client::connect_with".into(),
            ));
        }
        other => {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme {other:?}, expected ws or wss"
            )));
        }
    }
    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(Error::InvalidUrl(format!("missing host in {url}"))),
    };
    let port = parsed.port_or_known_default().unwrap_or(80);

    debug!("dialing {host}:{port}");
    let stream = TcpStream::connect((host.as_str(), port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Run the opening handshake to completion over `stream`.
async fn establish<S>(stream: &mut S, config: &ClientConfig) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::client(config)?;
    let mut buf = vec![0u8; conn.config().read_buffer_size.max(1)];

    while conn.state() == ConnectionState::Connecting {
        if let Some(request) = conn.take_outgoing() {
            write_flush(stream, &request).await?;
        }
        match stream.read(&mut buf).await? {
            0 => conn.transport_closed(),
            n => conn.receive(&buf[..n]),
        }
    }

    if conn.state() == ConnectionState::Closed {
        let err = std::iter::from_fn(|| conn.poll_event())
            .find_map(|event| match event {
                Event::Error(err) => Some(err),
                _ => None,
            })
            .unwrap_or(Error::ConnectionClosed);
        return Err(err);
    }
    Ok(conn)
}

async fn write_flush<S>(stream: &mut S, bytes: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Write part of `pending`, or flush once it is empty. Returns the number of
/// bytes accepted; zero means the flush completed.
async fn write_some<W>(writer: &mut W, pending: &[u8]) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    if pending.is_empty() {
        writer.flush().await?;
        return Ok(0);
    }
    match writer.write(pending).await? {
        0 => Err(std::io::ErrorKind::WriteZero.into()),
        n => Ok(n),
    }
}

async fn drain<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.shutdown().await
}

async fn with_timeout<T>(
    duration: Duration,
    what: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| Error::Timeout(format!("{what} exceeded {duration:?}")))?
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
