// Connection roster and outbound channels for the game server.
//
// `Session` is the data structure `server.rs` drives from its main loop. It
// tracks which connections are logged in as which player and owns the write
// half of every connection. All mutation happens on the server's main thread,
// so there is no internal locking, and the main thread is the only writer to
// client streams.
//
// Responsibilities:
// - Admission: check the Hello handshake (protocol version, password, one
//   connection per player, connection limit), assign a `ConnectionId`, send
//   `Welcome` with snapshots of the player's colonies, and announce the
//   player to everyone else.
// - Outbound channels: `Broadcast::publish` sends a `StateDelta` to every
//   connection whose player observes the colony; `Unicast::send_error` sends
//   an `ErrorReport` to one connection, and `send_snapshot` answers a
//   resync.
//
// A write error on one connection is logged and otherwise ignored; that
// connection's reader thread sees the broken stream and reports the
// disconnect.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::TcpStream;

use colonia_protocol::delta::{ColonySnapshot, StateDelta};
use colonia_protocol::framing::send;
use colonia_protocol::message::{PROTOCOL_VERSION, PlayerInfo, ServerMessage};
use colonia_protocol::report::ErrorReport;
use colonia_protocol::types::{ConnectionId, PlayerId};
use colonia_sim::model::Player;
use tracing::{debug, info, warn};

/// Sends authoritative state to the players observing it.
pub trait Broadcast {
    fn publish(&mut self, delta: &StateDelta, observers: &[PlayerId]);
}

/// Sends a refusal to the connection that made the request.
pub trait Unicast {
    fn send_error(&mut self, connection: ConnectionId, report: ErrorReport);
}

pub struct Session {
    pub name: String,
    connections: BTreeMap<ConnectionId, Connection>,
    next_connection_id: u32,
    max_players: u32,
}

struct Connection {
    player: PlayerId,
    name: String,
    writer: BufWriter<TcpStream>,
}

impl Session {
    pub fn new(name: String, max_players: u32) -> Self {
        Self {
            name,
            connections: BTreeMap::new(),
            next_connection_id: 0,
            max_players,
        }
    }

    /// Log `stream` in as `player`, seeding it with `colonies`. Returns the
    /// new connection's id, or the reason the handshake was rejected.
    pub fn admit(
        &mut self,
        player: &Player,
        protocol_version: u32,
        password: Option<String>,
        colonies: Vec<ColonySnapshot>,
        stream: TcpStream,
    ) -> Result<ConnectionId, String> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(format!(
                "protocol version {protocol_version} not supported (server speaks {PROTOCOL_VERSION})"
            ));
        }
        if player.password.is_some() && password != player.password {
            return Err("incorrect password".into());
        }
        if self.connections.values().any(|c| c.player == player.id) {
            return Err(format!("{} is already connected", player.name));
        }
        if self.connections.len() as u32 >= self.max_players {
            return Err("session is full".into());
        }

        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        let info = PlayerInfo {
            id: player.id,
            name: player.name.clone(),
        };
        let mut players = self.player_list();
        players.push(info.clone());
        self.broadcast(&ServerMessage::PlayerJoined { player: info });

        self.connections.insert(
            id,
            Connection {
                player: player.id,
                name: player.name.clone(),
                writer: BufWriter::new(stream),
            },
        );
        self.send_to(
            id,
            &ServerMessage::Welcome {
                player_id: player.id,
                session_name: self.name.clone(),
                players,
                colonies,
            },
        );
        info!(connection = id.0, player = %player.id, name = %player.name, "player joined");
        Ok(id)
    }

    /// Drop a connection and tell everyone else.
    pub fn remove(&mut self, connection: ConnectionId) {
        if let Some(conn) = self.connections.remove(&connection) {
            info!(connection = connection.0, player = %conn.player, "player left");
            self.broadcast(&ServerMessage::PlayerLeft {
                player_id: conn.player,
                name: conn.name,
            });
        }
    }

    pub fn player_count(&self) -> usize {
        self.connections.len()
    }

    pub fn player_list(&self) -> Vec<PlayerInfo> {
        self.connections
            .values()
            .map(|c| PlayerInfo {
                id: c.player,
                name: c.name.clone(),
            })
            .collect()
    }

    /// Answer a resync request from `connection`.
    pub fn send_snapshot(&mut self, connection: ConnectionId, snapshot: ColonySnapshot) {
        debug!(
            connection = connection.0,
            colony = %snapshot.colony.id,
            revision = snapshot.colony.revision,
            "snapshot sent"
        );
        self.send_to(connection, &ServerMessage::Snapshot(snapshot));
    }

    fn send_to(&mut self, connection: ConnectionId, msg: &ServerMessage) {
        if let Some(conn) = self.connections.get_mut(&connection) {
            write_to(connection, conn, msg);
        }
    }

    fn broadcast(&mut self, msg: &ServerMessage) {
        for (id, conn) in &mut self.connections {
            write_to(*id, conn, msg);
        }
    }
}

impl Broadcast for Session {
    fn publish(&mut self, delta: &StateDelta, observers: &[PlayerId]) {
        let msg = ServerMessage::Update {
            delta: delta.clone(),
        };
        for (id, conn) in &mut self.connections {
            if observers.contains(&conn.player) {
                write_to(*id, conn, &msg);
            }
        }
        debug!(
            colony = %delta.colony.id,
            revision = delta.colony.revision,
            units = delta.units.len(),
            "delta published"
        );
    }
}

impl Unicast for Session {
    fn send_error(&mut self, connection: ConnectionId, report: ErrorReport) {
        debug!(connection = connection.0, %report, "request refused");
        self.send_to(connection, &ServerMessage::Error(report));
    }
}

fn write_to(id: ConnectionId, conn: &mut Connection, msg: &ServerMessage) {
    if let Err(err) = send(&mut conn.writer, msg) {
        warn!(connection = id.0, player = %conn.player, error = %err, "write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonia_protocol::delta::ColonyState;
    use colonia_protocol::framing::recv;
    use colonia_protocol::report::ErrorKind;
    use colonia_protocol::types::GameObjectId;
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::time::Duration;

    /// Create a connected pair of TCP streams on localhost.
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        (server, client)
    }

    fn recv_msg(reader: &mut BufReader<TcpStream>) -> ServerMessage {
        recv(reader).unwrap()
    }

    fn player(id: u32, name: &str, password: Option<&str>) -> Player {
        Player {
            id: PlayerId(id),
            name: name.into(),
            password: password.map(Into::into),
        }
    }

    fn join(session: &mut Session, p: &Player) -> (ConnectionId, BufReader<TcpStream>) {
        let (server, client) = tcp_pair();
        let id = session
            .admit(p, PROTOCOL_VERSION, None, vec![], server)
            .unwrap();
        let mut reader = BufReader::new(client);
        assert!(matches!(recv_msg(&mut reader), ServerMessage::Welcome { .. }));
        (id, reader)
    }

    fn colony_state(revision: u64) -> ColonyState {
        ColonyState {
            id: GameObjectId::from("colony:amsterdam"),
            name: "Nieuw Amsterdam".into(),
            owner: PlayerId(0),
            revision,
            goods: Default::default(),
        }
    }

    fn delta() -> StateDelta {
        StateDelta {
            colony: colony_state(1),
            units: vec![],
        }
    }

    #[test]
    fn admit_sends_welcome_with_roster() {
        let mut session = Session::new("test".into(), 4);
        let (server, client) = tcp_pair();
        let seed = ColonySnapshot {
            colony: colony_state(7),
            units: vec![],
        };
        let id = session
            .admit(
                &player(3, "Dutch", None),
                PROTOCOL_VERSION,
                None,
                vec![seed.clone()],
                server,
            )
            .unwrap();
        assert_eq!(id, ConnectionId(0));

        let mut reader = BufReader::new(client);
        match recv_msg(&mut reader) {
            ServerMessage::Welcome {
                player_id,
                session_name,
                players,
                colonies,
            } => {
                assert_eq!(player_id, PlayerId(3));
                assert_eq!(session_name, "test");
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Dutch");
                assert_eq!(colonies, vec![seed]);
            }
            other => panic!("expected Welcome, got {other:?}"),
        }
    }

    #[test]
    fn wrong_password_rejected() {
        let mut session = Session::new("test".into(), 4);
        let (server, _client) = tcp_pair();
        let result = session.admit(
            &player(0, "Dutch", Some("orange")),
            PROTOCOL_VERSION,
            Some("tulip".into()),
            vec![],
            server,
        );
        assert_eq!(result, Err("incorrect password".into()));
        assert_eq!(session.player_count(), 0);
    }

    #[test]
    fn protocol_mismatch_rejected() {
        let mut session = Session::new("test".into(), 4);
        let (server, _client) = tcp_pair();
        let result = session.admit(
            &player(0, "Dutch", None),
            PROTOCOL_VERSION + 1,
            None,
            vec![],
            server,
        );
        assert!(result.unwrap_err().contains("protocol version"));
    }

    #[test]
    fn one_connection_per_player() {
        let mut session = Session::new("test".into(), 4);
        let dutch = player(0, "Dutch", None);
        let _first = join(&mut session, &dutch);
        let (server, _client) = tcp_pair();
        assert!(
            session
                .admit(&dutch, PROTOCOL_VERSION, None, vec![], server)
                .is_err()
        );
    }

    #[test]
    fn full_session_rejected() {
        let mut session = Session::new("test".into(), 1);
        let _first = join(&mut session, &player(0, "Dutch", None));
        let (server, _client) = tcp_pair();
        assert_eq!(
            session.admit(
                &player(1, "English", None),
                PROTOCOL_VERSION,
                None,
                vec![],
                server
            ),
            Err("session is full".into())
        );
    }

    #[test]
    fn join_and_leave_are_announced() {
        let mut session = Session::new("test".into(), 4);
        let (_, mut dutch) = join(&mut session, &player(0, "Dutch", None));
        let (english_id, _english) = join(&mut session, &player(1, "English", None));

        match recv_msg(&mut dutch) {
            ServerMessage::PlayerJoined { player } => assert_eq!(player.name, "English"),
            other => panic!("expected PlayerJoined, got {other:?}"),
        }

        session.remove(english_id);
        match recv_msg(&mut dutch) {
            ServerMessage::PlayerLeft { player_id, name } => {
                assert_eq!(player_id, PlayerId(1));
                assert_eq!(name, "English");
            }
            other => panic!("expected PlayerLeft, got {other:?}"),
        }
        assert_eq!(session.player_count(), 1);
    }

    #[test]
    fn publish_reaches_only_observers() {
        let mut session = Session::new("test".into(), 4);
        let (_, mut dutch) = join(&mut session, &player(0, "Dutch", None));
        let (_, mut english) = join(&mut session, &player(1, "English", None));
        let (_, mut french) = join(&mut session, &player(2, "French", None));
        // Drain join announcements.
        recv_msg(&mut dutch);
        recv_msg(&mut dutch);
        recv_msg(&mut english);

        session.publish(&delta(), &[PlayerId(0), PlayerId(1)]);
        session.send_error(
            ConnectionId(2),
            ErrorReport::new(ErrorKind::NotOwner, "marker"),
        );

        assert!(matches!(recv_msg(&mut dutch), ServerMessage::Update { .. }));
        assert!(matches!(recv_msg(&mut english), ServerMessage::Update { .. }));
        // The French connection gets the unicast marker and no Update first.
        match recv_msg(&mut french) {
            ServerMessage::Error(report) => assert_eq!(report.detail, "marker"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn send_error_reaches_only_target() {
        let mut session = Session::new("test".into(), 4);
        let (dutch_id, mut dutch) = join(&mut session, &player(0, "Dutch", None));
        let (english_id, mut english) = join(&mut session, &player(1, "English", None));
        recv_msg(&mut dutch);

        session.send_error(
            dutch_id,
            ErrorReport::new(ErrorKind::EmptyBatch, "nothing to do"),
        );
        session.send_error(english_id, ErrorReport::new(ErrorKind::NotOwner, "second"));

        match recv_msg(&mut dutch) {
            ServerMessage::Error(report) => assert_eq!(report.kind, ErrorKind::EmptyBatch),
            other => panic!("expected Error, got {other:?}"),
        }
        // English sees its own error first, proving the first went to Dutch only.
        match recv_msg(&mut english) {
            ServerMessage::Error(report) => assert_eq!(report.detail, "second"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_goes_only_to_requester() {
        let mut session = Session::new("test".into(), 4);
        let (dutch_id, mut dutch) = join(&mut session, &player(0, "Dutch", None));
        let (english_id, mut english) = join(&mut session, &player(1, "English", None));
        recv_msg(&mut dutch);

        let snapshot = ColonySnapshot {
            colony: colony_state(3),
            units: vec![],
        };
        session.send_snapshot(english_id, snapshot.clone());
        session.send_error(dutch_id, ErrorReport::new(ErrorKind::NotOwner, "marker"));

        match recv_msg(&mut english) {
            ServerMessage::Snapshot(received) => assert_eq!(received, snapshot),
            other => panic!("expected Snapshot, got {other:?}"),
        }
        match recv_msg(&mut dutch) {
            ServerMessage::Error(report) => assert_eq!(report.detail, "marker"),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
