// TCP server and main event loop for the authoritative game server.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (non-blocking `accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Main thread**: owns the `Session`. Performs the Hello handshake for new
//   connections, spawns their reader threads, and is the only writer to
//   client streams: it publishes deltas and sends errors as reader threads
//   report outcomes.
// - **Reader threads** (one per client): read and fully decode one
//   `ClientMessage` at a time and run rearrange requests against the shared
//   `World` themselves. `World::rearrange` locks only the target colony, so
//   requests for different colonies proceed in parallel; the lock is released
//   before the outcome is handed to the main thread for delivery.
//
// A new connection's `Welcome` carries snapshots taken on the main thread
// just before it is admitted. Any batch applied after that reaches the new
// connection as an `Update` with the next revision; one applied before it but
// still queued arrives as a stale `Update` the client drops. `Resync` is
// answered from the reader thread with a fresh snapshot, or with
// `UnknownAggregate` when the player cannot see the colony.
//
// A payload that does not decode (bad JSON, size mismatch, unknown role) is
// answered with an `ErrorKind::Decode` report and the connection stays open.
// Only framing-level failures (EOF, I/O error, oversized frame) end it.
//
// Shutdown: `ServerHandle::stop` clears `keep_running`; the main loop polls
// it between events.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use colonia_protocol::framing::{recv, send};
use colonia_protocol::message::{ClientMessage, ServerMessage};
use colonia_protocol::report::{ErrorKind, ErrorReport};
use colonia_protocol::delta::ColonySnapshot;
use colonia_protocol::types::{ConnectionId, PlayerId};
use colonia_sim::world::{Applied, World};
use tracing::{debug, info, warn};

use crate::session::{Broadcast, Session, Unicast};

/// How long a new connection has to send its Hello.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the main loop checks `keep_running` when idle.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    Applied {
        applied: Applied,
    },
    Refused {
        connection: ConnectionId,
        report: ErrorReport,
    },
    Resynced {
        connection: ConnectionId,
        snapshot: ColonySnapshot,
    },
    Disconnected {
        connection: ConnectionId,
    },
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a game server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub session_name: String,
    pub max_players: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7878,
            session_name: "colonia".into(),
            max_players: 8,
        }
    }
}

/// Start the server on a background thread. Returns a handle for stopping it
/// and the actual bound address (useful when port 0 lets the OS pick).
pub fn start_server(
    config: ServerConfig,
    world: Arc<World>,
) -> std::io::Result<(ServerHandle, SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    info!(%addr, session = %config.session_name, "server listening");
    let thread = thread::spawn(move || {
        run_server(listener, config, world, keep_running_clone);
    });

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main server loop. Runs until `keep_running` is set to false.
fn run_server(
    listener: TcpListener,
    config: ServerConfig,
    world: Arc<World>,
    keep_running: Arc<AtomicBool>,
) {
    let mut session = Session::new(config.session_name, config.max_players);
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking so the accept thread can check keep_running periodically.
    if let Err(err) = listener.set_nonblocking(true) {
        warn!(error = %err, "cannot make listener non-blocking");
    }

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => {
                    warn!(error = %err, "accept failed, listener stopping");
                    break;
                }
            }
        }
    });

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(event) => {
                handle_event(&mut session, &world, event, &tx, &keep_running);
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut session, &world, event, &tx, &keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("server stopped");
}

fn handle_event(
    session: &mut Session,
    world: &Arc<World>,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(session, world, stream, tx, keep_running);
        }
        InternalEvent::Applied { applied } => {
            session.publish(&applied.delta, &applied.observers);
        }
        InternalEvent::Refused { connection, report } => {
            session.send_error(connection, report);
        }
        InternalEvent::Resynced {
            connection,
            snapshot,
        } => {
            session.send_snapshot(connection, snapshot);
        }
        InternalEvent::Disconnected { connection } => {
            session.remove(connection);
        }
    }
}

/// Read the Hello handshake, admit the player to the session, and spawn a
/// reader thread. Any failure sends `Rejected` (when possible) and drops the
/// connection.
fn handle_new_connection(
    session: &mut Session,
    world: &Arc<World>,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();

    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(_) => return,
    };

    let (protocol_version, player_name, password) = match recv(&mut reader) {
        Ok(ClientMessage::Hello {
            protocol_version,
            player_name,
            password,
        }) => (protocol_version, player_name, password),
        Ok(other) => {
            debug!(?other, "expected Hello");
            reject(stream, "expected Hello".into());
            return;
        }
        Err(err) => {
            debug!(error = %err, "handshake failed");
            return;
        }
    };

    let Some(player) = world.player_by_name(&player_name) else {
        reject(stream, format!("no player named {player_name:?} in this game"));
        return;
    };
    let player_id = player.id;

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };
    let colonies = world.visible_snapshots(player_id);
    match session.admit(player, protocol_version, password, colonies, write_stream) {
        Ok(connection) => {
            stream.set_read_timeout(None).ok();
            let world = Arc::clone(world);
            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(
                    reader,
                    connection,
                    player_id,
                    world,
                    tx_reader,
                    keep_running_reader,
                );
            });
        }
        Err(reason) => reject(stream, reason),
    }
}

fn reject(stream: TcpStream, reason: String) {
    info!(%reason, "handshake rejected");
    let mut writer = BufWriter::new(stream);
    let _ = send(&mut writer, &ServerMessage::Rejected { reason });
}

/// Reader loop for one client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    connection: ConnectionId,
    player: PlayerId,
    world: Arc<World>,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        let event = match recv::<_, ClientMessage>(&mut reader) {
            Ok(ClientMessage::RearrangeColony(envelope)) => {
                match world.rearrange(player, &envelope) {
                    Ok(applied) => InternalEvent::Applied { applied },
                    Err(err) => InternalEvent::Refused {
                        connection,
                        report: err.report(),
                    },
                }
            }
            Ok(ClientMessage::Resync { colony }) => match world.snapshot_for(&colony, player) {
                Some(snapshot) => InternalEvent::Resynced {
                    connection,
                    snapshot,
                },
                None => InternalEvent::Refused {
                    connection,
                    report: ErrorReport::new(
                        ErrorKind::UnknownAggregate,
                        format!("colony {colony} not found"),
                    ),
                },
            },
            Ok(ClientMessage::Goodbye) => {
                let _ = tx.send(InternalEvent::Disconnected { connection });
                break;
            }
            Ok(ClientMessage::Hello { .. }) => InternalEvent::Refused {
                connection,
                report: ErrorReport::new(ErrorKind::Decode, "already logged in"),
            },
            Err(err) if err.is_recoverable() => {
                debug!(connection = connection.0, error = %err, "undecodable message");
                InternalEvent::Refused {
                    connection,
                    report: ErrorReport::new(ErrorKind::Decode, err.to_string()),
                }
            }
            Err(err) => {
                debug!(connection = connection.0, error = %err, "connection closed");
                let _ = tx.send(InternalEvent::Disconnected { connection });
                break;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}
