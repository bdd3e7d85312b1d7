//! Fixture declaration, dependency resolution, and scoped instantiation.
//!
//! [`graph`] holds the static side (definitions, validation, resolution
//! order); [`store`] holds the dynamic side (per-scope caches and teardown
//! obligations). The split mirrors the run lifecycle: the graph is sealed at
//! collection time, the store lives and dies with the session.

pub mod graph;
pub mod store;

pub use graph::{Built, Factory, FixtureDefinition, FixtureGraph, FixtureId, Teardown};
pub use store::{FixtureStore, ScopeInstance, SetupError, SharedScope};
