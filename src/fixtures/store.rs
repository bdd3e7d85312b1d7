//! Fixture instantiation and caching per scope instance.
//!
//! The store owns every live [`ScopeInstance`] of a run. Construction is lazy
//! (first `resolve` that needs a value builds it), caching is per scope
//! activation, and every successful construction registers exactly one
//! teardown obligation that is discharged when the owning scope closes.
//!
//! The session scope is the only state shared between parallel workers; it
//! lives behind a mutex held only for the duration of get-or-construct, never
//! across a test body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::errors::{EngineError, Failure};
use crate::fixtures::graph::{FixtureGraph, FixtureId, Teardown};
use crate::model::{FixtureSet, FixtureValue, ResultEvent, ScopeId, ScopeKind, TestCase};

// ============================================================================
// SCOPE INSTANCES
// ============================================================================

/// A live activation of a scope: the cache of instantiated values plus the
/// pending teardown obligations, in construction order.
pub struct ScopeInstance {
    id: ScopeId,
    cache: HashMap<FixtureId, FixtureValue>,
    teardowns: Vec<(String, Teardown)>,
}

impl ScopeInstance {
    pub fn new(id: ScopeId) -> Self {
        Self {
            id,
            cache: HashMap::new(),
            teardowns: Vec::new(),
        }
    }

    pub fn cached(&self, id: FixtureId) -> Option<FixtureValue> {
        self.cache.get(&id).cloned()
    }

    fn store(&mut self, id: FixtureId, name: &str, value: FixtureValue, teardown: Option<Teardown>) {
        self.cache.insert(id, value);
        if let Some(action) = teardown {
            self.teardowns.push((name.to_string(), action));
        }
    }

    /// Runs all pending teardown actions in strict reverse construction
    /// order. Failures are collected, not short-circuited: every action runs
    /// regardless of earlier failures. The instance is empty afterwards.
    pub fn close(&mut self) -> Vec<ResultEvent> {
        let scope = self.id.kind().to_string();
        let mut events = Vec::new();
        self.cache.clear();
        while let Some((fixture, action)) = self.teardowns.pop() {
            if let Err(failure) = action() {
                events.push(ResultEvent::TeardownError {
                    fixture,
                    scope: scope.clone(),
                    message: failure.message,
                });
            }
        }
        events
    }

    pub fn is_open(&self) -> bool {
        !self.cache.is_empty() || !self.teardowns.is_empty()
    }
}

/// Handle to the session-wide scope instance. Shared across workers in
/// parallel mode; single construction is guaranteed by the mutex.
pub type SharedScope = Arc<Mutex<ScopeInstance>>;

pub fn shared_session_scope() -> SharedScope {
    Arc::new(Mutex::new(ScopeInstance::new(ScopeId::Session)))
}

// ============================================================================
// SETUP ERRORS
// ============================================================================

/// A fixture construction failure, attributed to the fixture whose factory
/// (or resolution) failed. Fails the requesting test only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupError {
    pub fixture: String,
    pub failure: Failure,
}

impl SetupError {
    pub fn message(&self) -> String {
        if self.fixture.is_empty() {
            self.failure.to_string()
        } else {
            format!("fixture `{}` failed during setup: {}", self.fixture, self.failure)
        }
    }
}

impl From<EngineError> for SetupError {
    fn from(err: EngineError) -> Self {
        Self {
            fixture: String::new(),
            failure: Failure::new(err.to_string()),
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Instantiates and caches fixture values for a run (or for one worker of a
/// parallel run), guaranteeing construction/teardown pairing.
pub struct FixtureStore {
    graph: Arc<FixtureGraph>,
    /// Worker-local activations: test, module, and custom scopes.
    scopes: HashMap<ScopeId, ScopeInstance>,
    session: SharedScope,
}

impl FixtureStore {
    pub fn new(graph: Arc<FixtureGraph>) -> Self {
        Self::with_shared_session(graph, shared_session_scope())
    }

    /// A store whose session scope is shared with other stores. Used by
    /// parallel workers so a session-scoped fixture is constructed at most
    /// once across the whole run.
    pub fn with_shared_session(graph: Arc<FixtureGraph>, session: SharedScope) -> Self {
        Self {
            graph,
            scopes: HashMap::new(),
            session,
        }
    }

    pub fn graph(&self) -> &FixtureGraph {
        &self.graph
    }

    /// Resolves every fixture the test declares, constructing unmet
    /// dependencies first in graph order. On factory failure, construction of
    /// fixtures still pending for this request is abandoned; values already
    /// cached in their scopes stay cached and keep their teardown
    /// obligations.
    pub fn resolve(&mut self, case: &TestCase) -> Result<FixtureSet, SetupError> {
        let order = self.graph.resolution_order(&case.fixtures, &case.id)?;
        let mut set = FixtureSet::default();
        for id in order {
            self.get(id, case, &mut set)?;
        }
        Ok(set)
    }

    /// Gets or constructs a single fixture in its owning scope instance and
    /// inserts the value into `set`. Dependencies must already be present in
    /// `set` (guaranteed by post-order resolution).
    fn get(&mut self, id: FixtureId, case: &TestCase, set: &mut FixtureSet) -> Result<(), SetupError> {
        let (name, scope, factory) = {
            let def = self.graph.def(id);
            (def.name.clone(), def.scope.clone(), Arc::clone(&def.factory))
        };
        let scope_id = scope_id_for(&scope, case);

        if matches!(scope_id, ScopeId::Session) {
            // Lock held only for get-or-construct, never across a test body.
            let mut guard = lock_scope(&self.session);
            if let Some(value) = guard.cached(id) {
                set.insert(name, value);
                return Ok(());
            }
            let built = factory(set).map_err(|failure| SetupError {
                fixture: name.clone(),
                failure,
            })?;
            debug!(fixture = %name, scope = "session", "constructed fixture");
            guard.store(id, &name, built.value.clone(), built.teardown);
            set.insert(name, built.value);
            return Ok(());
        }

        if let Some(value) = self.scopes.get(&scope_id).and_then(|i| i.cached(id)) {
            set.insert(name, value);
            return Ok(());
        }
        let built = factory(set).map_err(|failure| SetupError {
            fixture: name.clone(),
            failure,
        })?;
        debug!(fixture = %name, scope = %scope, "constructed fixture");
        let instance = self
            .scopes
            .entry(scope_id.clone())
            .or_insert_with(|| ScopeInstance::new(scope_id));
        instance.store(id, &name, built.value.clone(), built.teardown);
        set.insert(name, built.value);
        Ok(())
    }

    /// Closes one worker-local scope instance: runs its teardowns in reverse
    /// construction order and discards the instance. Closing a scope that was
    /// never opened is a no-op.
    pub fn close_scope(&mut self, id: &ScopeId) -> Vec<ResultEvent> {
        match self.scopes.remove(id) {
            Some(mut instance) => {
                debug!(scope = %id, "closing scope");
                instance.close()
            }
            None => Vec::new(),
        }
    }

    /// Closes every remaining worker-local scope: test scopes first, then
    /// module scopes, then custom scopes. Used during finalization and by
    /// workers shutting down.
    pub fn close_local_scopes(&mut self) -> Vec<ResultEvent> {
        let mut remaining: Vec<ScopeId> = self.scopes.keys().cloned().collect();
        remaining.sort_by_key(|id| (id.kind().width(), id.to_string()));
        let mut events = Vec::new();
        for id in remaining {
            events.extend(self.close_scope(&id));
        }
        events
    }

    /// Closes the session scope. In parallel mode only the owning runner may
    /// call this, after all workers have joined.
    pub fn close_session(&mut self) -> Vec<ResultEvent> {
        debug!("closing session scope");
        lock_scope(&self.session).close()
    }

    pub fn session_handle(&self) -> SharedScope {
        Arc::clone(&self.session)
    }
}

fn lock_scope(scope: &SharedScope) -> MutexGuard<'_, ScopeInstance> {
    // A worker that panicked mid-construction poisons the lock; the cached
    // values are still sound, so recover and continue tearing down.
    scope.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Maps a fixture's declared scope to the scope activation owning it for the
/// given test. Custom scopes have one activation per kind per store, so in
/// parallel mode each worker owns its own activation.
fn scope_id_for(scope: &ScopeKind, case: &TestCase) -> ScopeId {
    match scope {
        ScopeKind::Test => ScopeId::Test(case.id.clone()),
        ScopeKind::Module => ScopeId::Module(case.module.clone()),
        ScopeKind::Session => ScopeId::Session,
        ScopeKind::Custom(kind) => ScopeId::Custom {
            kind: kind.clone(),
            key: kind.clone(),
        },
    }
}
