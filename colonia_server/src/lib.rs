// colonia_server: authoritative TCP game server for Colonia.
//
// Clients connect, log in as one of the scenario's players, and send
// rearrange requests. The server validates and applies each request against
// its own `World` (from `colonia_sim`) and either publishes the resulting
// `StateDelta` to every player observing the colony or sends an
// `ErrorReport` back to the requesting connection.
//
// Module overview:
// - `server.rs`:  TCP listener, reader threads (one per client) that run
//                 requests against the shared `World`, and the main event
//                 loop that owns all client writes.
// - `session.rs`: Connection roster, Hello admission, and the `Broadcast` /
//                 `Unicast` channels.
// - `client.rs`:  Blocking `NetClient` used by game clients and integration
//                 tests.
//
// The server can run as a standalone binary (`main.rs`) or be embedded via
// the library API (`start_server`).

pub mod client;
pub mod server;
pub mod session;

pub use client::{ClientError, NetClient, WelcomeInfo};
pub use server::{ServerConfig, ServerHandle, start_server};
pub use session::{Broadcast, Session, Unicast};
