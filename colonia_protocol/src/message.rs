// Protocol messages for client-server communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by game clients to the server.
// - `ServerMessage`: sent by the server to game clients.
//
// Game-affecting requests carry typed payloads (`BatchEnvelope`) rather than
// opaque bytes: the server is authoritative and must decode and check every
// request itself. Responses are either a `StateDelta` broadcast to every
// player who can see the affected colony, or an `ErrorReport` sent to the
// requesting connection alone.
//
// A client that logs in late, or that notices a gap in a colony's revisions,
// does not replay history: `Welcome` carries a snapshot of every colony the
// player can see, and `Resync` asks for a fresh one.

use serde::{Deserialize, Serialize};

use crate::delta::{ColonySnapshot, StateDelta};
use crate::rearrange::BatchEnvelope;
use crate::report::ErrorReport;
use crate::types::{GameObjectId, PlayerId};

/// Current protocol version, checked during the Hello handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Log in as one of the game's players (handshake).
    Hello {
        protocol_version: u32,
        player_name: String,
        password: Option<String>,
    },
    /// Reassign workers within one colony.
    RearrangeColony(BatchEnvelope),
    /// Ask for the current state of a colony this player can see.
    Resync { colony: GameObjectId },
    /// Player is leaving gracefully.
    Goodbye,
}

/// Messages sent by the server to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted.
    Welcome {
        player_id: PlayerId,
        session_name: String,
        players: Vec<PlayerInfo>,
        /// Current state of every colony the player owns or can see.
        colonies: Vec<ColonySnapshot>,
    },
    /// Handshake rejected.
    Rejected { reason: String },
    /// A player connected.
    PlayerJoined { player: PlayerInfo },
    /// A player disconnected.
    PlayerLeft { player_id: PlayerId, name: String },
    /// Authoritative state after an applied request.
    Update { delta: StateDelta },
    /// Answer to `Resync`.
    Snapshot(ColonySnapshot),
    /// A request from this connection was refused.
    Error(ErrorReport),
}

/// Public identity of a connected player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
}
