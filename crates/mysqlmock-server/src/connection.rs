//! Per-connection protocol driver.
//!
//! [`ConnectionMachine`] is the IO-free core: it produces the greeting and
//! maps every inbound frame to the frames to send back. [`serve_connection`]
//! wraps it around a blocking `TcpStream` with a [`FrameCodec`].
//!
//! One frame is fully answered before the next one is decoded, so sequence
//! ids never interleave.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use mysqlmock_core::{Backend, Error};
use tracing::{debug, info, warn};

use crate::auth::{generate_challenge, CHALLENGE_LEN};
use crate::command::{self, Reply};
use crate::config::ServerConfig;
use crate::handshake::{self, ClientHandshake, Greeting};
use crate::protocol::codec::{Frame, FrameCodec};
use crate::protocol::{ErrPacket, Expected, OkPacket, Packet};
use crate::session::{ConnectionSession, ConnectionState};

/// Frames produced for one inbound frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    /// Replies in send order
    pub frames: Vec<Frame>,
    /// Close the connection once `frames` are written
    pub close: bool,
}

impl Step {
    fn reply(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            close: false,
        }
    }

    fn close() -> Self {
        Self {
            frames: Vec::new(),
            close: true,
        }
    }
}

/// Protocol state of one connection, without any I/O.
pub struct ConnectionMachine {
    session: ConnectionSession,
    config: Arc<ServerConfig>,
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for ConnectionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMachine")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionMachine {
    /// New connection with a random challenge.
    pub fn new(connection_id: u32, config: Arc<ServerConfig>, backend: Arc<dyn Backend>) -> Self {
        Self::with_challenge(connection_id, generate_challenge(), config, backend)
    }

    /// New connection with a fixed challenge.
    pub fn with_challenge(
        connection_id: u32,
        challenge: [u8; CHALLENGE_LEN],
        config: Arc<ServerConfig>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            session: ConnectionSession::new(connection_id, challenge),
            config,
            backend,
        }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// The greeting, sent before any client input.
    pub fn start(&mut self) -> Frame {
        let frame = Greeting::for_session(&self.config, &self.session).to_frame();
        self.session.sequence_id = frame.sequence_id;
        frame
    }

    /// Answer one inbound frame.
    pub fn on_frame(&mut self, frame: Frame) -> Step {
        self.session.sequence_id = frame.sequence_id;

        let result = match self.session.state {
            ConnectionState::AwaitingAuth => self.on_handshake_response(&frame.payload),
            ConnectionState::Authenticated => {
                command::dispatch(&mut self.session, self.backend.as_ref(), &frame.payload)
                    .map(|reply| match reply {
                        Reply::Frames(frames) => Step::reply(frames),
                        Reply::Close => Step::close(),
                    })
            }
            ConnectionState::Closed => Ok(Step::close()),
        };

        let step = match result {
            Ok(step) => step,
            Err(err) => self.on_error(&err),
        };

        if let Some(last) = step.frames.last() {
            self.session.sequence_id = last.sequence_id;
        }
        if step.close {
            self.session.close();
        }
        step
    }

    fn on_handshake_response(&mut self, payload: &[u8]) -> Result<Step, Error> {
        let Packet::Handshake(handshake) = Packet::parse(payload, Expected::HandshakeResponse)?
        else {
            return Ok(Step::close());
        };
        let simple = matches!(handshake, ClientHandshake::Short);
        handshake::authenticate(&mut self.session, &self.config, handshake)?;

        let mut ok = OkPacket::default();
        if simple {
            ok.info = "Simple mode".to_string();
        }
        Ok(Step::reply(vec![
            ok.to_frame(self.session.next_sequence_id()),
        ]))
    }

    /// Render an error as ERR, or close for fatal ones.
    fn on_error(&mut self, err: &Error) -> Step {
        if err.is_fatal() {
            warn!(connection_id = self.session.connection_id, error = %err, "closing connection");
            return Step::close();
        }
        debug!(
            connection_id = self.session.connection_id,
            code = err.mysql_code(),
            error = %err,
            "replying with ERR"
        );
        Step::reply(vec![
            ErrPacket::from_error(err).to_frame(self.session.next_sequence_id()),
        ])
    }
}

/// Drive `machine` over `stream` until the client quits or the socket fails.
///
/// A clean client-side close is `Ok`. Framing errors, I/O failures and the
/// idle timeout end the connection with an error.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(connection_id = machine.session().connection_id)
)]
pub fn serve_connection(
    mut stream: TcpStream,
    mut machine: ConnectionMachine,
    config: &ServerConfig,
) -> Result<(), Error> {
    stream.set_read_timeout(config.idle_timeout)?;
    stream.set_nodelay(true)?;

    let codec = FrameCodec::new(config.max_packet_size);
    let mut out = Vec::new();
    codec.encode(&machine.start(), &mut out)?;
    stream.write_all(&out)?;

    let mut inbound = Vec::with_capacity(4096);
    let mut chunk = [0u8; 8192];

    loop {
        while let Some(frame) = codec.decode(&mut inbound)? {
            let step = machine.on_frame(frame);

            out.clear();
            for reply in &step.frames {
                codec.encode(reply, &mut out)?;
            }
            if !out.is_empty() {
                stream.write_all(&out)?;
                stream.flush()?;
            }
            if step.close {
                info!("connection closed by server");
                return Ok(());
            }
        }

        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                info!("idle timeout");
                return Err(Error::Timeout);
            }
            Err(e) => return Err(Error::Io(e)),
        };
        if n == 0 {
            info!("connection closed by client");
            return Ok(());
        }
        inbound.extend_from_slice(&chunk[..n]);
    }
}
