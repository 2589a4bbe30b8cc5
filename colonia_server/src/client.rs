// Blocking TCP client for the game server.
//
// Architecture:
// - `connect()` performs TCP connect + Hello handshake on the calling thread,
//   then spawns a background reader thread.
// - The reader thread decodes `ServerMessage`s in a loop and pushes them into
//   an `mpsc` channel.
// - The caller holds a `BufWriter<TcpStream>` for sending; `poll()` drains the
//   inbox without blocking and `recv_timeout()` waits for the next message.
//
// `send_rearrange` refuses an empty envelope before anything is written. The
// server would reject it too, but there is no point in the round trip.
//
// The colony snapshots from `Welcome` are handed to the caller in
// `WelcomeInfo`; keeping copies current from later `Update`s, and calling
// `request_resync` when one shows a revision gap, is up to the caller.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use colonia_protocol::delta::ColonySnapshot;
use colonia_protocol::framing::{FrameError, recv, send};
use colonia_protocol::message::{ClientMessage, PROTOCOL_VERSION, PlayerInfo, ServerMessage};
use colonia_protocol::rearrange::BatchEnvelope;
use colonia_protocol::types::{GameObjectId, PlayerId};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unexpected handshake response: {0}")]
    UnexpectedResponse(String),
    #[error("refusing to send an empty rearrangement for colony {0}")]
    EmptyBatch(GameObjectId),
}

/// Information returned by a successful `connect()` handshake.
#[derive(Clone, Debug)]
pub struct WelcomeInfo {
    pub player_id: PlayerId,
    pub session_name: String,
    pub players: Vec<PlayerInfo>,
    pub colonies: Vec<ColonySnapshot>,
}

pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
    pub player_id: PlayerId,
}

impl NetClient {
    /// Connect, log in as `player_name`, and start the reader thread.
    pub fn connect(
        addr: &str,
        player_name: &str,
        password: Option<String>,
    ) -> Result<(Self, WelcomeInfo), ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        send(
            &mut writer,
            &ClientMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
                player_name: player_name.into(),
                password,
            },
        )?;

        let welcome = match recv(&mut reader)? {
            ServerMessage::Welcome {
                player_id,
                session_name,
                players,
                colonies,
            } => WelcomeInfo {
                player_id,
                session_name,
                players,
                colonies,
            },
            ServerMessage::Rejected { reason } => return Err(ClientError::Rejected(reason)),
            other => return Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        };

        // The long-lived reader blocks indefinitely.
        reader.get_ref().set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok((
            Self {
                writer,
                inbox: rx,
                _reader_thread: Some(reader_thread),
                player_id: welcome.player_id,
            },
            welcome,
        ))
    }

    /// Send a rearrange request. Empty envelopes are refused locally.
    pub fn send_rearrange(&mut self, envelope: &BatchEnvelope) -> Result<(), ClientError> {
        if envelope.is_empty() {
            return Err(ClientError::EmptyBatch(envelope.colony.clone()));
        }
        send(
            &mut self.writer,
            &ClientMessage::RearrangeColony(envelope.clone()),
        )?;
        Ok(())
    }

    /// Ask for a fresh snapshot of `colony`; it arrives as
    /// `ServerMessage::Snapshot`.
    pub fn request_resync(&mut self, colony: &GameObjectId) -> Result<(), ClientError> {
        send(
            &mut self.writer,
            &ClientMessage::Resync {
                colony: colony.clone(),
            },
        )?;
        Ok(())
    }

    /// Send Goodbye. The server closes the connection.
    pub fn disconnect(&mut self) {
        let _ = send(&mut self.writer, &ClientMessage::Goodbye);
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next server message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ServerMessage> {
        self.inbox.recv_timeout(timeout).ok()
    }
}

fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    while let Ok(msg) = recv::<_, ServerMessage>(&mut reader) {
        if tx.send(msg).is_err() {
            break;
        }
    }
}
