// Test-only game client for multiplayer integration tests.
//
// Wraps the real `NetClient` (from `colonia_server::client`) and a
// client-side copy of every colony the player can see. Location layout comes
// from the same scenario the server loaded; units and warehouse come from the
// snapshots in `Welcome`, and are kept current from `Update` deltas. A delta
// that skips revisions triggers a `Resync` round trip, as a real client
// would do. Requests
// are built from that copy with the real `RearrangeBuilder`, so the full
// pipeline is exercised:
// client copy -> builder -> server -> validate/apply -> delta -> client copy.
//
// The only test-specific code here is the synchronous polling wrappers
// (blocking loops around `NetClient::poll()`).
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use colonia_protocol::delta::StateDelta;
use colonia_protocol::message::ServerMessage;
use colonia_protocol::rearrange::BatchEnvelope;
use colonia_protocol::report::ErrorReport;
use colonia_protocol::types::{GameObjectId, PlayerId};
use colonia_server::client::{ClientError, NetClient};
use colonia_sim::model::Colony;
use colonia_sim::request::{Assignment, RearrangeBuilder};
use colonia_sim::scenario::Scenario;

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to listen before concluding that nothing is coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

pub struct TestGameClient {
    client: NetClient,
    pub player_id: PlayerId,
    colonies: BTreeMap<GameObjectId, Colony>,
    /// Messages seen while waiting for something else.
    pub backlog: Vec<ServerMessage>,
    /// Number of snapshots requested after a revision gap.
    pub resyncs: usize,
}

impl TestGameClient {
    /// Connect as `name` and seed the colony copies from `scenario`.
    pub fn connect(addr: SocketAddr, name: &str, scenario: Scenario) -> Self {
        let (client, info) = NetClient::connect(&addr.to_string(), name, None)
            .expect("TestGameClient::connect failed");
        let (_, _, _, colonies) = scenario.into_parts().expect("invalid scenario");
        let mut colonies: BTreeMap<_, _> = colonies
            .into_iter()
            .filter(|c| c.is_owned_by_or_visible_to(info.player_id))
            .map(|c| (c.id.clone(), c))
            .collect();
        for snapshot in &info.colonies {
            let colony = colonies
                .get_mut(&snapshot.colony.id)
                .expect("Welcome snapshot for a colony not in the scenario");
            colony.apply_snapshot(snapshot);
        }
        Self {
            client,
            player_id: info.player_id,
            colonies,
            backlog: Vec::new(),
            resyncs: 0,
        }
    }

    /// This client's copy of a colony.
    pub fn colony(&self, id: &str) -> &Colony {
        self.colonies
            .get(&GameObjectId::from(id))
            .unwrap_or_else(|| panic!("{id} not visible to {}", self.player_id))
    }

    /// Mutable access to a colony copy, for simulating a client that lost
    /// updates.
    pub fn colony_mut(&mut self, id: &str) -> &mut Colony {
        self.colonies
            .get_mut(&GameObjectId::from(id))
            .unwrap_or_else(|| panic!("{id} not visible"))
    }

    pub fn send(&mut self, envelope: &BatchEnvelope) -> Result<(), ClientError> {
        self.client.send_rearrange(envelope)
    }

    /// Plan the move from the local copy of `colony` to `target` and send it.
    pub fn send_plan(&mut self, colony: &str, target: &BTreeMap<GameObjectId, Assignment>) {
        let envelope = RearrangeBuilder::plan(self.colony(colony), target)
            .build()
            .expect("plan produced no changes");
        self.send(&envelope).expect("send_rearrange failed");
    }

    /// Blocking poll until an `Update` arrives. Applies it to the local copy,
    /// resyncing first when revisions are missing.
    pub fn poll_until_update(&mut self) -> StateDelta {
        let msg = self.poll_until("Update", |m| matches!(m, ServerMessage::Update { .. }));
        let ServerMessage::Update { delta } = msg else {
            unreachable!()
        };
        self.merge(&delta);
        delta
    }

    fn merge(&mut self, delta: &StateDelta) {
        let Some(colony) = self.colonies.get_mut(&delta.colony.id) else {
            return;
        };
        if !colony.apply_delta(delta).needs_resync() {
            return;
        }
        self.resyncs += 1;
        self.client
            .request_resync(&delta.colony.id)
            .expect("request_resync failed");
        let msg = self.poll_until("Snapshot", |m| matches!(m, ServerMessage::Snapshot(_)));
        let ServerMessage::Snapshot(snapshot) = msg else {
            unreachable!()
        };
        if let Some(colony) = self.colonies.get_mut(&delta.colony.id) {
            colony.apply_snapshot(&snapshot);
        }
    }

    /// Blocking poll until an `Error` arrives.
    pub fn poll_until_error(&mut self) -> ErrorReport {
        match self.poll_until("Error", |m| matches!(m, ServerMessage::Error(_))) {
            ServerMessage::Error(report) => report,
            _ => unreachable!(),
        }
    }

    /// Collect everything that arrives within `QUIET_PERIOD`.
    pub fn drain_quietly(&mut self) -> Vec<ServerMessage> {
        thread::sleep(QUIET_PERIOD);
        let mut messages = std::mem::take(&mut self.backlog);
        messages.extend(self.client.poll());
        messages
    }

    /// Send Goodbye and close the connection.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    fn poll_until(&mut self, what: &str, wanted: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        let start = Instant::now();
        loop {
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
            if let Some(pos) = self.backlog.iter().position(&wanted) {
                return self.backlog.remove(pos);
            }
            self.backlog.extend(self.client.poll());
            if self.backlog.iter().any(&wanted) {
                continue;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
