// The authoritative game world held by the server.
//
// `World` owns the players, the shared `Ruleset`, and every colony behind its
// own `Mutex`. The colony map is fixed once the world is built from a
// scenario, so request handling never takes a world-wide lock: a rearrange
// request locks only its target colony, validates and applies against it,
// and releases the lock before the caller does any network I/O. Requests on
// different colonies run in parallel; requests on the same colony serialize
// and each one sees the fully applied (or fully rolled back) result of the
// one before.
//
// A poisoned colony lock is recovered rather than propagated. The applier
// only ever swaps in a complete staging copy, so a panic while holding the
// lock cannot leave a half-applied colony behind.
//
// `World` is `Send + Sync` and is shared between server reader threads as
// `Arc<World>`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use colonia_protocol::delta::{ColonySnapshot, ColonyState, StateDelta};
use colonia_protocol::rearrange::BatchEnvelope;
use colonia_protocol::report::{ErrorKind, ErrorReport};
use colonia_protocol::types::{GameObjectId, PlayerId};
use tracing::{debug, info};

use crate::apply::{ApplyError, apply_batch};
use crate::model::{Colony, Player};
use crate::rules::{RulesEngine, StandardRules};
use crate::ruleset::Ruleset;
use crate::scenario::{Scenario, ScenarioError};
use crate::validate::{ValidationError, validate_batch};

/// Why a rearrange request was refused. Nothing was changed in either case.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RearrangeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl RearrangeError {
    /// The structured report sent back to the requester.
    pub fn report(&self) -> ErrorReport {
        match self {
            RearrangeError::Validation(err) => err.report(),
            RearrangeError::Apply(err) => {
                ErrorReport::new(ErrorKind::ConstraintViolation, err.to_string()).at(err.index())
            }
        }
    }
}

/// A successfully applied batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub delta: StateDelta,
    /// Players to publish the delta to, owner first.
    pub observers: Vec<PlayerId>,
}

pub struct World {
    name: String,
    players: BTreeMap<PlayerId, Player>,
    ruleset: Arc<Ruleset>,
    colonies: BTreeMap<GameObjectId, Mutex<Colony>>,
    rules: Arc<dyn RulesEngine>,
}

impl World {
    pub fn from_scenario(scenario: Scenario) -> Result<Self, ScenarioError> {
        let (name, ruleset, players, colonies) = scenario.into_parts()?;
        info!(
            scenario = %name,
            players = players.len(),
            colonies = colonies.len(),
            "world loaded"
        );
        Ok(Self {
            name,
            players,
            ruleset: Arc::new(ruleset),
            colonies: colonies
                .into_iter()
                .map(|c| (c.id.clone(), Mutex::new(c)))
                .collect(),
            rules: Arc::new(StandardRules),
        })
    }

    /// Replace the rules engine checked while applying batches.
    pub fn with_rules(mut self, rules: Arc<dyn RulesEngine>) -> Self {
        self.rules = rules;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.values().find(|p| p.name == name)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Snapshots of every colony `player` owns or can see, for seeding a
    /// client that just logged in.
    pub fn visible_snapshots(&self, player: PlayerId) -> Vec<ColonySnapshot> {
        self.colonies
            .values()
            .map(lock)
            .filter(|colony| colony.is_owned_by_or_visible_to(player))
            .map(|colony| colony.snapshot())
            .collect()
    }

    /// Snapshot of one colony, if `player` can see it.
    pub fn snapshot_for(&self, id: &GameObjectId, player: PlayerId) -> Option<ColonySnapshot> {
        let colony = lock(self.colonies.get(id)?);
        if colony.is_owned_by_or_visible_to(player) {
            Some(colony.snapshot())
        } else {
            None
        }
    }

    /// A copy of the colony's current state.
    pub fn colony_snapshot(&self, id: &GameObjectId) -> Option<Colony> {
        self.colonies.get(id).map(|cell| lock(cell).clone())
    }

    pub fn colony_state(&self, id: &GameObjectId) -> Option<ColonyState> {
        self.colonies.get(id).map(|cell| lock(cell).state())
    }

    pub fn is_owned_by_or_visible_to(&self, colony: &GameObjectId, player: PlayerId) -> bool {
        self.colonies
            .get(colony)
            .is_some_and(|cell| lock(cell).is_owned_by_or_visible_to(player))
    }

    /// Validate and apply `envelope` on behalf of `player`, all-or-nothing.
    pub fn rearrange(
        &self,
        player: PlayerId,
        envelope: &BatchEnvelope,
    ) -> Result<Applied, RearrangeError> {
        let Some(cell) = self.colonies.get(&envelope.colony) else {
            debug!(%player, colony = %envelope.colony, "rearrange of unknown colony");
            return Err(ValidationError::UnknownAggregate(envelope.colony.clone()).into());
        };

        let mut colony = lock(cell);
        let batch = validate_batch(envelope, player, Some(&*colony), &self.ruleset).inspect_err(
            |err| debug!(%player, colony = %envelope.colony, error = %err, "rearrange rejected"),
        )?;
        let delta = apply_batch(&mut colony, &batch, self.rules.as_ref(), &self.ruleset)
            .inspect_err(
                |err| debug!(%player, colony = %envelope.colony, error = %err, "rearrange rolled back"),
            )?;
        let observers = colony.observers();
        drop(colony);

        info!(
            %player,
            colony = %envelope.colony,
            changes = envelope.len(),
            revision = delta.colony.revision,
            "colony rearranged"
        );
        Ok(Applied { delta, observers })
    }
}

fn lock(cell: &Mutex<Colony>) -> MutexGuard<'_, Colony> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}
