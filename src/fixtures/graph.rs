//! Fixture declarations and the static dependency graph over them.
//!
//! The graph is built once at collection time, validated once, and read-only
//! afterwards. Validation resolves every dependency name to a dense
//! [`FixtureId`] so that per-test resolution never touches names again: an
//! unknown name surfaces here, before any test runs, not in the middle of a
//! session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{EngineError, Failure};
use crate::model::{FixtureSet, FixtureValue, ScopeKind};

/// Dense index of a registered fixture. Assigned in declaration order, which
/// is also the tie-break order for [`FixtureGraph::resolution_order`].
pub type FixtureId = usize;

// ============================================================================
// DEFINITIONS
// ============================================================================

/// What a factory hands back: the instantiated value plus an optional
/// teardown obligation. The store tracks the obligation until the owning
/// scope closes.
pub struct Built {
    pub value: FixtureValue,
    pub teardown: Option<Teardown>,
}

/// A teardown action registered by a factory. Runs exactly once when the
/// owning scope instance closes.
pub type Teardown = Box<dyn FnOnce() -> Result<(), Failure> + Send>;

impl Built {
    /// A value with no teardown obligation.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            teardown: None,
        }
    }

    /// A value with a teardown action run at scope close.
    pub fn with_teardown<T: Send + Sync + 'static>(
        value: T,
        teardown: impl FnOnce() -> Result<(), Failure> + Send + 'static,
    ) -> Self {
        Self {
            value: Arc::new(value),
            teardown: Some(Box::new(teardown)),
        }
    }
}

/// Factory callable producing a fixture value. Receives the already-resolved
/// values of the fixture's declared dependencies.
pub type Factory = Arc<dyn Fn(&FixtureSet) -> Result<Built, Failure> + Send + Sync>;

/// A declared fixture: name, scope, dependency names, factory.
/// Immutable once registered.
#[derive(Clone)]
pub struct FixtureDefinition {
    pub name: String,
    pub scope: ScopeKind,
    /// Dependency fixture names, in declaration order.
    pub dependencies: Vec<String>,
    pub factory: Factory,
}

impl FixtureDefinition {
    pub fn new(
        name: impl Into<String>,
        scope: ScopeKind,
        dependencies: Vec<String>,
        factory: impl Fn(&FixtureSet) -> Result<Built, Failure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            dependencies,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for FixtureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

// ============================================================================
// GRAPH
// ============================================================================

/// The static fixture dependency graph: registration, validation, resolution
/// ordering. `validate()` must succeed before `resolution_order` is usable.
#[derive(Default)]
pub struct FixtureGraph {
    defs: Vec<FixtureDefinition>,
    by_name: HashMap<String, FixtureId>,
    /// Resolved dependency-id table, one row per fixture. Built by
    /// `validate()`; `None` means the graph is not yet validated.
    resolved: Option<Vec<Vec<FixtureId>>>,
}

impl FixtureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fixture definition. Fails if the name is already taken.
    /// Any prior validation is invalidated.
    pub fn register(&mut self, def: FixtureDefinition) -> Result<FixtureId, EngineError> {
        if self.by_name.contains_key(&def.name) {
            return Err(EngineError::DuplicateFixture { name: def.name });
        }
        let id = self.defs.len();
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(def);
        self.resolved = None;
        Ok(id)
    }

    /// Validates the whole graph: every dependency name must be registered,
    /// no dependency may have a narrower scope than its dependent, and the
    /// graph must be acyclic. On success the resolved dependency-id table is
    /// built and the graph becomes usable for resolution.
    pub fn validate(&mut self) -> Result<(), EngineError> {
        let mut table: Vec<Vec<FixtureId>> = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            let mut row = Vec::with_capacity(def.dependencies.len());
            for dep_name in &def.dependencies {
                let dep_id = *self.by_name.get(dep_name).ok_or_else(|| {
                    EngineError::UnknownFixture {
                        name: dep_name.clone(),
                        requested_by: def.name.clone(),
                    }
                })?;
                let dep = &self.defs[dep_id];
                if dep.scope.width() < def.scope.width() {
                    return Err(EngineError::ScopeMismatch {
                        name: def.name.clone(),
                        scope: def.scope.to_string(),
                        dependency: dep.name.clone(),
                        dependency_scope: dep.scope.to_string(),
                    });
                }
                row.push(dep_id);
            }
            table.push(row);
        }

        self.check_acyclic(&table)?;
        self.resolved = Some(table);
        Ok(())
    }

    /// Deterministic post-order resolution sequence satisfying `names` and
    /// all transitive dependencies. Ties are broken by declaration order:
    /// the requested names are visited in the order given, and each
    /// fixture's dependencies in their declared order. Stable across runs
    /// with identical inputs.
    ///
    /// `requested_by` is used only for error attribution when a requested
    /// name is unknown.
    pub fn resolution_order(
        &self,
        names: &[String],
        requested_by: &str,
    ) -> Result<Vec<FixtureId>, EngineError> {
        let table = self.resolved.as_ref().ok_or(EngineError::UnvalidatedGraph)?;

        let mut order = Vec::new();
        let mut done = vec![false; self.defs.len()];
        for name in names {
            let id = *self
                .by_name
                .get(name)
                .ok_or_else(|| EngineError::UnknownFixture {
                    name: name.clone(),
                    requested_by: requested_by.to_string(),
                })?;
            self.post_order(id, table, &mut done, &mut order);
        }
        Ok(order)
    }

    fn post_order(
        &self,
        start: FixtureId,
        table: &[Vec<FixtureId>],
        done: &mut [bool],
        order: &mut Vec<FixtureId>,
    ) {
        if done[start] {
            return;
        }
        done[start] = true;
        // Frame: (node, next dependency index to visit). Iterative so a deep
        // dependency chain cannot overflow the call stack.
        let mut stack: Vec<(FixtureId, usize)> = vec![(start, 0)];
        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if frame.1 < table[node].len() {
                let dep = table[node][frame.1];
                frame.1 += 1;
                if !done[dep] {
                    done[dep] = true;
                    stack.push((dep, 0));
                }
            } else {
                order.push(node);
                stack.pop();
            }
        }
    }

    /// Cycle check via three-color depth-first search. On failure the error
    /// names every fixture on one cycle, in edge order.
    fn check_acyclic(&self, table: &[Vec<FixtureId>]) -> Result<(), EngineError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color = vec![Color::White; self.defs.len()];
        let mut path: Vec<FixtureId> = Vec::new();

        for start in 0..self.defs.len() {
            if color[start] != Color::White {
                continue;
            }
            // Frame: (node, next dependency index to visit).
            let mut stack: Vec<(FixtureId, usize)> = vec![(start, 0)];
            color[start] = Color::Gray;
            path.push(start);

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                if frame.1 < table[node].len() {
                    let dep = table[node][frame.1];
                    frame.1 += 1;
                    match color[dep] {
                        Color::White => {
                            color[dep] = Color::Gray;
                            path.push(dep);
                            stack.push((dep, 0));
                        }
                        Color::Gray => {
                            let from = path.iter().position(|&n| n == dep).unwrap_or(0);
                            let mut names: Vec<&str> =
                                path[from..].iter().map(|&n| self.defs[n].name.as_str()).collect();
                            names.push(self.defs[dep].name.as_str());
                            return Err(EngineError::CyclicDependency {
                                cycle: names.join(" -> "),
                            });
                        }
                        Color::Black => {}
                    }
                } else {
                    color[node] = Color::Black;
                    path.pop();
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    pub fn def(&self, id: FixtureId) -> &FixtureDefinition {
        &self.defs[id]
    }

    pub fn id_of(&self, name: &str) -> Option<FixtureId> {
        self.by_name.get(name).copied()
    }

    /// Resolved dependency ids of a fixture. Only valid after `validate()`.
    pub fn dependencies_of(&self, id: FixtureId) -> &[FixtureId] {
        self.resolved
            .as_ref()
            .map(|table| table[id].as_slice())
            .unwrap_or(&[])
    }

    pub fn is_validated(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl fmt::Debug for FixtureGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureGraph")
            .field("fixtures", &self.defs.len())
            .field("validated", &self.is_validated())
            .finish()
    }
}
