// colonia_sim: authoritative colony world model and the rearrange pipeline.
//
// This crate holds the server's view of the game (players, colonies, units,
// work locations, warehouse goods) and everything that turns a decoded
// `BatchEnvelope` into either a `StateDelta` or a rejection. It has no
// networking; `colonia_server` drives it from reader threads and clients use
// `request.rs` to build envelopes from their own copy of the model.
//
// Module overview:
// - `model.rs`:    `Player`, `Unit`, `WorkLocation`, the `Colony` aggregate.
// - `ruleset.rs`:  Goods types and role equipment (`Ruleset`), serde-loadable.
// - `scenario.rs`: `Scenario` (initial world as JSON) and its consistency checks.
// - `registry.rs`: `Registry` trait and `ColonyScope`: id -> entity resolution.
// - `request.rs`:  Client side: `RearrangeBuilder`, planning from target assignments.
// - `validate.rs`: Structural validation -> `ValidatedBatch` or `ValidationError`.
// - `rules.rs`:    `RulesEngine` trait and `StandardRules` (capacity, roles, equipment).
// - `apply.rs`:    Copy-on-write, all-or-nothing application -> `StateDelta`.
// - `world.rs`:    `World`: per-colony locking around validate + apply.
//
// Pipeline for one request, all under the target colony's lock:
//   envelope -> validate_batch -> apply_batch (rules checked per change)
//            -> StateDelta + observers, or RearrangeError
//
// Maps are `BTreeMap` throughout so deltas, logs and test output are
// deterministic.

pub mod apply;
pub mod model;
pub mod registry;
pub mod request;
pub mod rules;
pub mod ruleset;
pub mod scenario;
pub mod validate;
pub mod world;

pub use apply::{ApplyError, apply_batch};
pub use model::{Colony, DeltaOutcome, LocationKind, Player, Unit, WorkLocation};
pub use registry::{ColonyScope, Entity, EntityKind, Registry};
pub use request::{Assignment, RearrangeBuilder, RequestError, change_for};
pub use rules::{ConstraintViolation, RulesEngine, StandardRules};
pub use ruleset::{RoleRule, Ruleset};
pub use scenario::{ColonySetup, Scenario, ScenarioError};
pub use validate::{ResolvedChange, ValidatedBatch, ValidationError, resolve_change, validate_batch};
pub use world::{Applied, RearrangeError, World};
