// colonia_protocol: wire protocol between Colonia game clients and server.
//
// This crate defines the message types, the rearrange request codec, and the
// framing used by the game server (`colonia_server`) and its clients. It is
// shared by both sides and has no dependency on the world model crate
// (`colonia_sim`): everything here is ids, enums, and plain data.
//
// Module overview:
// - `types.rs`:      `GameObjectId`, `PlayerId`, `ConnectionId`, the closed `Role` enum.
// - `rearrange.rs`:  `ChangeDescriptor` and `BatchEnvelope` with the JSON wire
//                    form and `DecodeError` / `MalformedDescriptor`.
// - `attributes.rs`: Positional attribute form (`x0unit`, `x0role`, ...) of
//                    the same envelope, for older clients.
// - `delta.rs`:      `StateDelta` broadcast after an applied batch, and the
//                    `ColonySnapshot` used to seed or resync a copy.
// - `report.rs`:     `ErrorReport` / `ErrorKind` sent to the requester on failure.
// - `message.rs`:    `ClientMessage` / `ServerMessage` enums.
// - `framing.rs`:    4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Human-readable on the wire and in logs; framing
//   is payload-agnostic so a binary codec can be swapped in later.
// - **Ids, not objects.** Requests only ever carry `GameObjectId`s. The
//   server resolves them against its own registry.
// - **No async runtime.** Framing uses `std::io::Read`/`Write`, compatible
//   with blocking TCP streams and buffered wrappers.

pub mod attributes;
pub mod delta;
pub mod framing;
pub mod message;
pub mod rearrange;
pub mod report;
pub mod types;

pub use attributes::{AttributeMessage, REARRANGE_TAG};
pub use delta::{ColonySnapshot, ColonyState, StateDelta, UnitState};
pub use framing::{FrameError, MAX_FRAME_SIZE, read_frame, recv, send, write_frame};
pub use message::{ClientMessage, PROTOCOL_VERSION, PlayerInfo, ServerMessage};
pub use rearrange::{BatchEnvelope, ChangeDescriptor, DecodeError, MalformedDescriptor};
pub use report::{ErrorCategory, ErrorKind, ErrorReport};
pub use types::{ConnectionId, GameObjectId, PlayerId, Role};
