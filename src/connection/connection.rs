use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace, warn};

use crate::config::{ClientConfig, Config};
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, MAX_CLOSE_REASON, Message};
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;
use crate::protocol::handshake::{HandshakeContext, build_request, find_header_end, validate_response};
use crate::protocol::{Decoded, Frame, FrameDecoder, FrameValidator, MaskGenerator, MessageAssembler, OpCode};

/// Something the connection wants the application to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The opening handshake succeeded.
    Open {
        /// Subprotocol selected by the server.
        protocol: Option<String>,
    },
    /// A complete Text or Binary message.
    Message(Message),
    /// A Ping arrived. The Pong reply has already been queued.
    Ping(Vec<u8>),
    /// A Pong arrived.
    Pong(Vec<u8>),
    /// The connection reached `Closed`. Emitted exactly once.
    Close(CloseFrame),
    /// A handshake, protocol, or transport failure. Always followed by `Close`.
    Error(Error),
}

/// A WebSocket endpoint that performs no I/O.
///
/// Bytes read from the transport go in through [`receive`](Self::receive);
/// bytes to write come out of [`take_outgoing`](Self::take_outgoing); what
/// happened in between is drained with [`poll_event`](Self::poll_event).
/// Every call returns immediately, so one `Connection` can be driven by any
/// event loop, and independent connections share nothing.
///
/// ## Example
///
/// ```
/// use ws13::{ClientConfig, Connection, ConnectionState};
///
/// let mut conn = Connection::client(&ClientConfig::new("ws://example.com/chat"))?;
/// assert_eq!(conn.state(), ConnectionState::Connecting);
///
/// let request = conn.take_outgoing().expect("upgrade request");
/// assert!(request.starts_with(b"GET /chat HTTP/1.1\r\n"));
/// # Ok::<(), ws13::Error>(())
/// ```
#[derive(Debug)]
pub struct Connection {
    role: Role,
    config: Config,
    state: ConnectionState,
    handshake: Option<HandshakeContext>,
    protocol: Option<String>,
    decoder: FrameDecoder,
    assembler: MessageAssembler,
    masks: MaskGenerator,
    read_buf: BytesMut,
    outgoing: BytesMut,
    events: VecDeque<Event>,
    /// A Close frame is queued or written; nothing may follow it.
    close_sent: bool,
    /// The peer's Close has been processed; further input is ignored.
    close_received: bool,
    /// Close reported once our echo of an unsolicited Close is taken.
    pending_close: Option<CloseFrame>,
    close_frame: Option<CloseFrame>,
}

impl Connection {
    fn new(role: Role, config: Config, state: ConnectionState) -> Self {
        if role.must_mask() && !config.mask_outgoing {
            warn!("{role} connection configured without outgoing masking");
        }
        let validator = FrameValidator::new(role, config.limits.clone())
            .with_accept_unmasked(config.accept_unmasked_frames);
        Self {
            role,
            decoder: FrameDecoder::new(validator),
            assembler: MessageAssembler::new(config.limits.clone()),
            masks: MaskGenerator::new(),
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            outgoing: BytesMut::new(),
            events: VecDeque::new(),
            state,
            handshake: None,
            protocol: None,
            close_sent: false,
            close_received: false,
            pending_close: None,
            close_frame: None,
            config,
        }
    }

    /// Start a client connection to `config.url`.
    ///
    /// The upgrade request is queued immediately; write it to the transport
    /// via [`take_outgoing`](Self::take_outgoing).
    ///
    /// # Errors
    ///
    /// Returns a handshake-kind error if the URL or extra headers are unusable.
    pub fn client(config: &ClientConfig) -> Result<Self> {
        let (context, request) = build_request(&config.url, &config.config)?;
        debug!(
            "opening handshake to {}:{}{}",
            context.host, context.port, context.path
        );

        let mut conn = Self::new(Role::Client, config.config.clone(), ConnectionState::Connecting);
        conn.outgoing.extend_from_slice(&request);
        conn.handshake = Some(context);
        Ok(conn)
    }

    /// Create an endpoint over an already upgraded transport.
    ///
    /// Starts in `Open` without emitting [`Event::Open`].
    #[must_use]
    pub fn open(role: Role, config: Config) -> Self {
        Self::new(role, config, ConnectionState::Open)
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Subprotocol agreed during the handshake.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// How the connection ended, once it is `Closed`.
    #[must_use]
    pub const fn close_frame(&self) -> Option<&CloseFrame> {
        self.close_frame.as_ref()
    }

    /// Feed bytes read from the transport.
    ///
    /// Input may be split at any byte boundary. Once the peer's Close has
    /// been processed, or the connection is `Closed`, input is discarded.
    pub fn receive(&mut self, data: &[u8]) {
        if !self.state.is_active() || self.close_received {
            trace!("discarding {} bytes in state {}", data.len(), self.state);
            return;
        }
        self.read_buf.extend_from_slice(data);

        if self.state == ConnectionState::Connecting {
            self.process_handshake();
        }
        if self.state.can_receive() {
            self.process_frames();
        }
    }

    /// Next pending event, oldest first.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Whether [`take_outgoing`](Self::take_outgoing) has bytes to hand out.
    #[must_use]
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Take every byte queued for the transport.
    ///
    /// Taking the echo of an unsolicited Close completes the close handshake.
    pub fn take_outgoing(&mut self) -> Option<Bytes> {
        if self.outgoing.is_empty() {
            return None;
        }
        let bytes = self.outgoing.split().freeze();
        if let Some(close) = self.pending_close.take() {
            self.finish(close);
        }
        Some(bytes)
    }

    /// Queue an application message.
    ///
    /// Text and Binary are split per `Config::fragment_size`. A `Close`
    /// message behaves like [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` unless the connection is `Open`
    /// - `Error::MessageTooLarge` past `limits.max_message_size`
    /// - `Error::ControlFrameTooLarge` for a Ping/Pong over 125 bytes
    pub fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed);
        }

        match message {
            Message::Text(text) => self.send_data(OpCode::Text, Bytes::from(text.into_bytes())),
            Message::Binary(data) => self.send_data(OpCode::Binary, Bytes::from(data)),
            Message::Ping(data) => self.send_control(OpCode::Ping, data),
            Message::Pong(data) => self.send_control(OpCode::Pong, data),
            Message::Close(Some(frame)) => self.close(frame.code, &frame.reason),
            Message::Close(None) => {
                self.start_close(None);
                Ok(())
            }
        }
    }

    /// Queue a text message.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into()))
    }

    /// Queue a binary message.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub fn send_binary(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into()))
    }

    /// Queue a ping.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub fn ping(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Ping(data.into()))
    }

    /// Start the close handshake.
    ///
    /// From `Open` this queues a Close frame and moves to `Closing`; the
    /// connection becomes `Closed` when the peer echoes it, the transport
    /// ends, or [`close_timed_out`](Self::close_timed_out) is called. While
    /// `Closing` it does nothing. While `Connecting` it abandons the
    /// handshake and closes with 1006.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` once `Closed`
    /// - `Error::InvalidCloseCode` for a code that may not be sent
    /// - `Error::CloseReasonTooLong` for a reason over 123 bytes
    pub fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        match self.state {
            ConnectionState::Open => {
                if !code.is_valid() {
                    return Err(Error::InvalidCloseCode(code.as_u16()));
                }
                if reason.len() > MAX_CLOSE_REASON {
                    return Err(Error::CloseReasonTooLong(reason.len()));
                }
                self.start_close(Some(CloseFrame::new(code, reason)));
                Ok(())
            }
            ConnectionState::Closing => Ok(()),
            ConnectionState::Connecting => {
                debug!("close requested during handshake");
                self.outgoing.clear();
                self.finish(CloseFrame::new(CloseCode::Abnormal, "closed before open"));
                Ok(())
            }
            ConnectionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// The transport reached end of stream.
    pub fn transport_closed(&mut self) {
        match self.state {
            ConnectionState::Closed => {}
            ConnectionState::Closing => {
                let close = self
                    .pending_close
                    .take()
                    .unwrap_or_else(|| CloseFrame::new(CloseCode::Abnormal, ""));
                self.finish(close);
            }
            ConnectionState::Connecting | ConnectionState::Open => {
                self.abort(Error::Io("connection closed by peer".into()));
            }
        }
    }

    /// The transport failed while reading or writing.
    pub fn transport_error(&mut self, err: Error) {
        if self.state.is_active() {
            self.abort(err);
        }
    }

    /// The peer did not echo our Close in time.
    pub fn close_timed_out(&mut self) {
        if self.state == ConnectionState::Closing {
            self.abort(Error::Timeout("no close frame from peer".into()));
        }
    }

    fn process_handshake(&mut self) {
        let Some(end) = find_header_end(&self.read_buf) else {
            let buffered = self.read_buf.len();
            if let Err(err) = self.config.limits.check_handshake_size(buffered) {
                self.fail_handshake(err);
            }
            return;
        };
        if let Err(err) = self.config.limits.check_handshake_size(end) {
            self.fail_handshake(err);
            return;
        }

        let raw = self.read_buf.split_to(end);
        let Some(context) = self.handshake.take() else {
            self.fail_handshake(Error::InvalidHandshake("no handshake in progress".into()));
            return;
        };

        match validate_response(&raw, &context) {
            Ok(response) => {
                debug!(
                    "handshake with {}:{} complete (protocol: {:?})",
                    context.host, context.port, response.protocol
                );
                self.protocol = response.protocol.clone();
                self.set_state(ConnectionState::Open);
                self.events.push_back(Event::Open {
                    protocol: response.protocol,
                });
            }
            Err(err) => self.fail_handshake(err),
        }
    }

    fn process_frames(&mut self) {
        while self.state.can_receive() && !self.close_received {
            match self.decoder.decode(&self.read_buf) {
                Ok(Decoded::NeedMoreBytes { .. }) => break,
                Ok(Decoded::Frame { frame, consumed }) => {
                    self.read_buf.advance(consumed);
                    if let Err(err) = self.handle_frame(frame) {
                        self.fail(err);
                    }
                }
                Err(err) => self.fail(err),
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        trace!(
            "received {} frame: {} bytes, fin={}",
            frame.opcode,
            frame.payload().len(),
            frame.fin
        );

        match frame.opcode {
            OpCode::Ping => {
                let data = frame.payload().to_vec();
                if self.state == ConnectionState::Open {
                    self.queue_frame(&Frame::pong(frame.into_payload()));
                }
                self.events.push_back(Event::Ping(data));
            }
            OpCode::Pong => {
                self.events.push_back(Event::Pong(frame.payload().to_vec()));
            }
            OpCode::Close => self.handle_close(frame.payload())?,
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                if let Some(message) = self.assembler.push(frame)? {
                    self.events.push_back(Event::Message(message));
                }
            }
        }
        Ok(())
    }

    fn handle_close(&mut self, payload: &[u8]) -> Result<()> {
        let received = CloseFrame::parse(payload)?;
        self.close_received = true;
        self.read_buf.clear();
        let reported = received
            .clone()
            .unwrap_or_else(|| CloseFrame::new(CloseCode::NoStatusReceived, ""));
        debug!("received close {} {:?}", reported.code, reported.reason);

        if self.close_sent {
            self.finish(reported);
        } else {
            self.queue_frame(&Frame::close(received.as_ref()));
            self.close_sent = true;
            self.set_state(ConnectionState::Closing);
            self.pending_close = Some(reported);
        }
        Ok(())
    }

    fn send_data(&mut self, opcode: OpCode, payload: Bytes) -> Result<()> {
        self.config.limits.check_message_size(payload.len())?;
        for frame in MessageFragmenter::new(payload, opcode, self.config.fragment_size) {
            self.queue_frame(&frame);
        }
        Ok(())
    }

    fn send_control(&mut self, opcode: OpCode, data: Vec<u8>) -> Result<()> {
        if data.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(data.len()));
        }
        self.queue_frame(&Frame::new(true, opcode, data));
        Ok(())
    }

    fn start_close(&mut self, close: Option<CloseFrame>) {
        debug!("sending close {:?}", close);
        self.queue_frame(&Frame::close(close.as_ref()));
        self.close_sent = true;
        self.set_state(ConnectionState::Closing);
    }

    fn queue_frame(&mut self, frame: &Frame) {
        let key = self.config.mask_outgoing.then(|| self.masks.next_key());
        trace!(
            "queueing {} frame: {} bytes, fin={}",
            frame.opcode,
            frame.payload().len(),
            frame.fin
        );
        frame.write(&mut self.outgoing, key);
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state.can_advance_to(next) {
            debug!("{} connection: {} -> {}", self.role, self.state, next);
            self.state = next;
        }
    }

    /// Fail an open connection on a protocol error.
    fn fail(&mut self, err: Error) {
        warn!("protocol error: {err}");
        let code = err.close_code();
        if !self.close_sent {
            self.queue_frame(&Frame::close(Some(&CloseFrame::new(code, ""))));
            self.close_sent = true;
        }
        self.pending_close = None;
        self.events.push_back(Event::Error(err));
        self.finish(CloseFrame::new(code, ""));
    }

    fn fail_handshake(&mut self, err: Error) {
        warn!("handshake failed: {err}");
        self.handshake = None;
        self.outgoing.clear();
        self.events.push_back(Event::Error(err));
        self.finish(CloseFrame::new(CloseCode::Abnormal, ""));
    }

    /// End the connection without a close handshake.
    fn abort(&mut self, err: Error) {
        debug!("{} connection aborted: {err}", self.role);
        self.pending_close = None;
        self.events.push_back(Event::Error(err));
        self.finish(CloseFrame::new(CloseCode::Abnormal, ""));
    }

    fn finish(&mut self, close: CloseFrame) {
        if self.close_frame.is_some() {
            return;
        }
        self.set_state(ConnectionState::Closed);
        self.read_buf.clear();
        self.assembler.reset();
        self.close_frame = Some(close.clone());
        self.events.push_back(Event::Close(close));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::protocol::compute_accept_key;

    fn client() -> Connection {
        Connection::open(Role::Client, Config::client())
    }

    fn events(conn: &mut Connection) -> Vec<Event> {
        std::iter::from_fn(|| conn.poll_event()).collect()
    }

    /// Frames a client wrote, decoded the way a server would.
    fn sent_frames(conn: &mut Connection) -> Vec<Frame> {
        let decoder = FrameDecoder::for_role(Role::Server, Limits::default());
        let bytes = conn.take_outgoing().unwrap_or_default();
        let mut offset = 0;
        let mut frames = Vec::new();
        while offset < bytes.len() {
            match decoder.decode(&bytes[offset..]).unwrap() {
                Decoded::Frame { frame, consumed } => {
                    offset += consumed;
                    frames.push(frame);
                }
                Decoded::NeedMoreBytes { .. } => panic!("truncated outgoing frame"),
            }
        }
        frames
    }

    fn server_frame(fin: bool, opcode: OpCode, payload: &[u8]) -> Bytes {
        Frame::new(fin, opcode, payload.to_vec()).to_bytes(None)
    }

    fn upgrade_response(accept: &str) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept}\r\n\r\n"
        )
    }

    fn connecting() -> (Connection, String) {
        let mut conn = Connection::client(&ClientConfig::new("ws://localhost:9001/chat")).unwrap();
        let request = String::from_utf8(conn.take_outgoing().unwrap().to_vec()).unwrap();
        let key = request
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .to_string();
        (conn, compute_accept_key(&key))
    }

    #[test]
    fn test_client_queues_upgrade_request() {
        let (conn, _) = connecting();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.has_outgoing());

        let mut conn = Connection::client(&ClientConfig::new("ws://localhost:9001/chat")).unwrap();
        let request = conn.take_outgoing().unwrap();
        assert!(request.starts_with(b"GET /chat HTTP/1.1\r\nHost: localhost:9001\r\n"));
        assert!(request.ends_with(b"Sec-WebSocket-Version: 13\r\n\r\n"));
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let result = Connection::client(&ClientConfig::new("http://localhost/"));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_handshake_completes() {
        let (mut conn, accept) = connecting();
        conn.receive(upgrade_response(&accept).as_bytes());

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(events(&mut conn), vec![Event::Open { protocol: None }]);
        assert_eq!(conn.protocol(), None);
    }

    #[test]
    fn test_handshake_split_with_trailing_frame() {
        let (mut conn, accept) = connecting();
        let mut wire = upgrade_response(&accept).into_bytes();
        wire.extend_from_slice(&server_frame(true, OpCode::Text, b"early"));

        for chunk in wire.chunks(7) {
            conn.receive(chunk);
        }

        assert_eq!(
            events(&mut conn),
            vec![
                Event::Open { protocol: None },
                Event::Message(Message::Text("early".into())),
            ]
        );
    }

    #[test]
    fn test_handshake_accept_mismatch() {
        let (mut conn, _) = connecting();
        conn.receive(upgrade_response("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").as_bytes());

        let events = events(&mut conn);
        assert!(matches!(events[0], Event::Error(Error::AcceptMismatch { .. })));
        assert_eq!(
            events[1],
            Event::Close(CloseFrame::new(CloseCode::Abnormal, ""))
        );
        assert_eq!(events.len(), 2);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.take_outgoing().is_none());
    }

    #[test]
    fn test_handshake_too_large() {
        let (mut conn, _) = connecting();
        conn.receive(b"HTTP/1.1 101 Switching Protocols\r\n");
        conn.receive(&vec![b'x'; 9000]);

        let events = events(&mut conn);
        assert!(matches!(events[0], Event::Error(Error::HandshakeTooLarge { .. })));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_send_fails_while_connecting() {
        let (mut conn, _) = connecting();
        assert_eq!(conn.send_text("too soon"), Err(Error::ConnectionClosed));
    }

    #[test]
    fn test_close_while_connecting() {
        let (mut conn, _) = connecting();
        conn.close(CloseCode::Normal, "").unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(
            events(&mut conn).as_slice(),
            [Event::Close(CloseFrame { code: CloseCode::Abnormal, .. })]
        ));
    }

    #[test]
    fn test_receive_text_and_binary() {
        let mut conn = client();
        conn.receive(&server_frame(true, OpCode::Text, b"Hello"));
        conn.receive(&server_frame(true, OpCode::Binary, &[1, 2, 3]));

        assert_eq!(
            events(&mut conn),
            vec![
                Event::Message(Message::Text("Hello".into())),
                Event::Message(Message::Binary(vec![1, 2, 3])),
            ]
        );
    }

    #[test]
    fn test_receive_one_byte_at_a_time() {
        let mut conn = client();
        let wire = server_frame(true, OpCode::Text, &[b'a'; 300]);
        for byte in wire.iter() {
            assert!(conn.poll_event().is_none());
            conn.receive(std::slice::from_ref(byte));
        }
        assert_eq!(
            events(&mut conn),
            vec![Event::Message(Message::Text("a".repeat(300)))]
        );
    }

    #[test]
    fn test_fragmented_reassembly() {
        let mut conn = client();
        let mut wire = server_frame(false, OpCode::Text, b"he").to_vec();
        wire.extend_from_slice(&server_frame(false, OpCode::Continuation, b"ll"));
        wire.extend_from_slice(&server_frame(true, OpCode::Continuation, b"o"));
        conn.receive(&wire);

        assert_eq!(
            events(&mut conn),
            vec![Event::Message(Message::Text("hello".into()))]
        );
    }

    #[test]
    fn test_ping_mid_fragment() {
        let mut conn = client();
        conn.receive(&server_frame(false, OpCode::Text, b"he"));
        conn.receive(&server_frame(true, OpCode::Ping, b"abc"));

        let pongs = sent_frames(&mut conn);
        assert_eq!(pongs.len(), 1);
        assert_eq!(pongs[0].opcode, OpCode::Pong);
        assert_eq!(pongs[0].payload(), b"abc");
        assert!(pongs[0].is_masked());

        conn.receive(&server_frame(false, OpCode::Continuation, b"ll"));
        conn.receive(&server_frame(true, OpCode::Continuation, b"o"));

        assert_eq!(
            events(&mut conn),
            vec![
                Event::Ping(b"abc".to_vec()),
                Event::Message(Message::Text("hello".into())),
            ]
        );
    }

    #[test]
    fn test_pong_is_reported_without_reply() {
        let mut conn = client();
        conn.receive(&server_frame(true, OpCode::Pong, b"alive"));
        assert_eq!(events(&mut conn), vec![Event::Pong(b"alive".to_vec())]);
        assert!(!conn.has_outgoing());
    }

    #[test]
    fn test_initiated_close_handshake() {
        let mut conn = client();
        conn.close(CloseCode::Normal, "bye").unwrap();
        assert_eq!(conn.state(), ConnectionState::Closing);

        let sent = sent_frames(&mut conn);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, OpCode::Close);
        assert_eq!(sent[0].payload(), &[0x03, 0xe8, b'b', b'y', b'e']);

        // Sends fail fast while closing; closing again is a no-op.
        assert_eq!(conn.send_text("late"), Err(Error::ConnectionClosed));
        assert!(conn.close(CloseCode::Normal, "again").is_ok());
        assert!(!conn.has_outgoing());

        conn.receive(&server_frame(true, OpCode::Close, &[0x03, 0xe8]));
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.transport_closed();

        assert_eq!(
            events(&mut conn),
            vec![Event::Close(CloseFrame::new(CloseCode::Normal, ""))]
        );
        assert!(!conn.has_outgoing());
    }

    #[test]
    fn test_messages_still_delivered_while_closing() {
        let mut conn = client();
        conn.close(CloseCode::GoingAway, "").unwrap();
        conn.receive(&server_frame(true, OpCode::Text, b"in flight"));
        assert_eq!(
            events(&mut conn),
            vec![Event::Message(Message::Text("in flight".into()))]
        );
    }

    #[test]
    fn test_unsolicited_close_is_echoed() {
        let mut conn = client();
        conn.receive(&server_frame(true, OpCode::Close, &[0x03, 0xe9, b'b', b'y', b'e']));
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(events(&mut conn).is_empty());

        let echo = sent_frames(&mut conn);
        assert_eq!(echo.len(), 1);
        assert_eq!(echo[0].opcode, OpCode::Close);
        assert_eq!(&echo[0].payload()[..2], &[0x03, 0xe9]);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            events(&mut conn),
            vec![Event::Close(CloseFrame::new(CloseCode::GoingAway, "bye"))]
        );
        assert_eq!(conn.close_frame().map(|c| c.code), Some(CloseCode::GoingAway));
    }

    #[test]
    fn test_unsolicited_empty_close_reports_1005() {
        let mut conn = client();
        conn.receive(&server_frame(true, OpCode::Close, &[]));

        let echo = sent_frames(&mut conn);
        assert!(echo[0].payload().is_empty());
        assert_eq!(
            events(&mut conn),
            vec![Event::Close(CloseFrame::new(CloseCode::NoStatusReceived, ""))]
        );
    }

    #[test]
    fn test_input_after_peer_close_is_ignored() {
        let mut conn = client();
        let mut wire = server_frame(true, OpCode::Close, &[0x03, 0xe8]).to_vec();
        wire.extend_from_slice(&server_frame(true, OpCode::Text, b"ghost"));
        conn.receive(&wire);
        conn.receive(&server_frame(true, OpCode::Text, b"ghost"));
        conn.take_outgoing();

        assert_eq!(
            events(&mut conn),
            vec![Event::Close(CloseFrame::new(CloseCode::Normal, ""))]
        );
    }

    #[test]
    fn test_invalid_utf8_closes_with_1007() {
        let mut conn = client();
        conn.receive(&server_frame(true, OpCode::Text, &[0xff, 0xfe]));

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            events(&mut conn),
            vec![
                Event::Error(Error::InvalidUtf8),
                Event::Close(CloseFrame::new(CloseCode::InvalidPayload, "")),
            ]
        );

        let sent = sent_frames(&mut conn);
        assert_eq!(sent[0].opcode, OpCode::Close);
        assert_eq!(sent[0].payload(), &[0x03, 0xef]);
    }

    #[test]
    fn test_protocol_errors_close_with_1002() {
        let masked = Frame::text("x").to_bytes(Some([1, 2, 3, 4]));
        let violation = Error::ProtocolViolation(String::new());
        let cases = vec![
            (masked, Error::MaskedServerFrame),
            (Bytes::from_static(&[0x83, 0x00]), Error::ReservedOpcode(3)),
            (Bytes::from_static(&[0xc1, 0x00]), Error::ReservedBitsSet),
            (server_frame(true, OpCode::Continuation, b"x"), violation.clone()),
            (server_frame(true, OpCode::Close, &[0x03]), violation),
            (
                server_frame(true, OpCode::Close, &[0x03, 0xed]),
                Error::InvalidCloseCode(1005),
            ),
        ];

        for (wire, expected) in cases {
            let mut conn = client();
            conn.receive(&wire);
            let events = events(&mut conn);
            match &events[..] {
                [Event::Error(err), Event::Close(close)] => {
                    assert_eq!(
                        std::mem::discriminant(err),
                        std::mem::discriminant(&expected),
                        "unexpected error {err:?}"
                    );
                    assert_eq!(close.code, CloseCode::ProtocolError);
                }
                other => panic!("unexpected events {other:?}"),
            }
            assert_eq!(conn.state(), ConnectionState::Closed);
        }
    }

    #[test]
    fn test_oversized_message_closes_with_1009() {
        let config = Config::client().with_max_message_size(8);
        let mut conn = Connection::open(Role::Client, config);
        conn.receive(&server_frame(true, OpCode::Binary, &[0u8; 16]));

        let events = events(&mut conn);
        assert!(matches!(events[0], Event::Error(Error::MessageTooLarge { .. })));
        assert_eq!(
            events[1],
            Event::Close(CloseFrame::new(CloseCode::MessageTooBig, ""))
        );
    }

    #[test]
    fn test_oversized_frame_header_fails_before_payload() {
        let config = Config::client().with_max_message_size(1024);
        let mut conn = Connection::open(Role::Client, config);
        // Binary, FIN, 64-bit length of 10 MiB, no payload yet.
        conn.receive(&[0x82, 127, 0, 0, 0, 0, 0, 0xa0, 0, 0]);

        let events = events(&mut conn);
        assert_eq!(
            events[0],
            Event::Error(Error::MessageTooLarge {
                size: 10 * 1024 * 1024,
                max: 1024
            })
        );
        assert_eq!(
            events[1],
            Event::Close(CloseFrame::new(CloseCode::MessageTooBig, ""))
        );
        assert_eq!(conn.state(), ConnectionState::Closed);

        let sent = sent_frames(&mut conn);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, OpCode::Close);
        assert_eq!(&sent[0].payload()[..2], &1009u16.to_be_bytes());

        conn.receive(&vec![0u8; 64 * 1024]);
        assert!(conn.poll_event().is_none());
    }

    #[test]
    fn test_closed_connection_discards_input_and_rejects_sends() {
        let mut conn = client();
        conn.receive(&server_frame(true, OpCode::Text, &[0xff]));
        let _ = events(&mut conn);
        let _ = conn.take_outgoing();

        conn.receive(&server_frame(true, OpCode::Text, b"after"));
        assert!(conn.poll_event().is_none());
        assert_eq!(conn.send_binary(vec![1]), Err(Error::ConnectionClosed));
        assert_eq!(conn.ping(vec![]), Err(Error::ConnectionClosed));
        assert_eq!(
            conn.close(CloseCode::Normal, ""),
            Err(Error::ConnectionClosed)
        );
    }

    #[test]
    fn test_transport_closed_while_open() {
        let mut conn = client();
        conn.transport_closed();

        let events = events(&mut conn);
        assert!(matches!(&events[0], Event::Error(e) if e.kind() == crate::error::ErrorKind::Transport));
        assert_eq!(
            events[1],
            Event::Close(CloseFrame::new(CloseCode::Abnormal, ""))
        );
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_transport_error_reported_once() {
        let mut conn = client();
        conn.transport_error(Error::Io("reset".into()));
        conn.transport_error(Error::Io("reset again".into()));
        conn.transport_closed();

        assert_eq!(events(&mut conn).len(), 2);
    }

    #[test]
    fn test_close_timeout() {
        let mut conn = client();
        conn.close(CloseCode::Normal, "").unwrap();
        conn.close_timed_out();

        let events = events(&mut conn);
        assert!(matches!(events[0], Event::Error(Error::Timeout(_))));
        assert_eq!(
            events[1],
            Event::Close(CloseFrame::new(CloseCode::Abnormal, ""))
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_close_argument_validation() {
        let mut conn = client();
        assert_eq!(
            conn.close(CloseCode::NoStatusReceived, ""),
            Err(Error::InvalidCloseCode(1005))
        );
        assert_eq!(
            conn.close(CloseCode::Normal, &"x".repeat(124)),
            Err(Error::CloseReasonTooLong(124))
        );
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(conn.close(CloseCode::Normal, &"x".repeat(123)).is_ok());
    }

    #[test]
    fn test_outgoing_masking_by_config() {
        let mut conn = client();
        conn.send_text("masked").unwrap();
        let bytes = conn.take_outgoing().unwrap();
        assert_eq!(bytes[1] & 0x80, 0x80);

        let mut server = Connection::open(Role::Server, Config::server());
        server.send_text("plain").unwrap();
        assert_eq!(
            &server.take_outgoing().unwrap()[..],
            &[0x81, 0x05, b'p', b'l', b'a', b'i', b'n']
        );
    }

    #[test]
    fn test_outgoing_fragmentation() {
        let mut conn = Connection::open(Role::Client, Config::client().with_fragment_size(4));
        conn.send_binary(vec![7u8; 10]).unwrap();

        let frames = sent_frames(&mut conn);
        let shape: Vec<_> = frames
            .iter()
            .map(|f| (f.opcode, f.fin, f.payload().len()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (OpCode::Binary, false, 4),
                (OpCode::Continuation, false, 4),
                (OpCode::Continuation, true, 2),
            ]
        );
    }

    #[test]
    fn test_send_limits() {
        let mut conn = Connection::open(Role::Client, Config::client().with_max_message_size(4));
        assert_eq!(
            conn.send_binary(vec![0u8; 5]),
            Err(Error::MessageTooLarge { size: 5, max: 4 })
        );
        assert_eq!(
            conn.ping(vec![0u8; 126]),
            Err(Error::ControlFrameTooLarge(126))
        );
        assert!(!conn.has_outgoing());
    }

    #[test]
    fn test_server_role_accepts_masked_frames() {
        let mut server = Connection::open(Role::Server, Config::server());
        server.receive(&Frame::text("hi").to_bytes(Some([9, 9, 9, 9])));
        assert_eq!(
            events(&mut server),
            vec![Event::Message(Message::Text("hi".into()))]
        );

        server.receive(&server_frame(true, OpCode::Text, b"bare"));
        assert!(matches!(
            events(&mut server)[0],
            Event::Error(Error::UnmaskedClientFrame)
        ));
    }
}
