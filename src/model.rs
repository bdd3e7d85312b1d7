//! Shared data model for the Trellis engine.
//!
//! Everything here is created at collection time or emitted as a result event;
//! none of it is mutated during a run except through [`Summary::record`]. The
//! executable payloads ([`TestBody`], fixture values) are opaque shared
//! closures and `Any` values so the engine stays polymorphic over whatever the
//! embedder registers.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::errors::Failure;

// ============================================================================
// SCOPES
// ============================================================================

/// The lifetime boundary governing how long a fixture's value is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ScopeKind {
    /// Torn down at the end of the requesting test.
    Test,
    /// Torn down when the session moves to the next module.
    Module,
    /// Torn down when the session finalizes.
    Session,
    /// Embedder-defined scope, one activation per kind per store. Closed at
    /// finalization unless the embedder closes it earlier. Wider than any
    /// module, narrower than the session: custom activations are torn down
    /// before the session scope, so session fixtures may not depend on them.
    Custom(String),
}

impl ScopeKind {
    /// Relative width used by the scope-mismatch check: a fixture may only
    /// depend on fixtures of equal or greater width.
    pub fn width(&self) -> u8 {
        match self {
            ScopeKind::Test => 0,
            ScopeKind::Module => 1,
            ScopeKind::Custom(_) => 2,
            ScopeKind::Session => 3,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Test => write!(f, "test"),
            ScopeKind::Module => write!(f, "module"),
            ScopeKind::Session => write!(f, "session"),
            ScopeKind::Custom(kind) => write!(f, "custom:{kind}"),
        }
    }
}

/// A live activation of a scope: `(scope kind, scope key)`.
///
/// There is exactly one `Session` activation per run, one `Module` activation
/// per module name, and one `Test` activation per test id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Session,
    Module(String),
    Test(String),
    Custom { kind: String, key: String },
}

impl ScopeId {
    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeId::Session => ScopeKind::Session,
            ScopeId::Module(_) => ScopeKind::Module,
            ScopeId::Test(_) => ScopeKind::Test,
            ScopeId::Custom { kind, .. } => ScopeKind::Custom(kind.clone()),
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Session => write!(f, "session"),
            ScopeId::Module(name) => write!(f, "module:{name}"),
            ScopeId::Test(id) => write!(f, "test:{id}"),
            ScopeId::Custom { kind, key } => write!(f, "custom:{kind}:{key}"),
        }
    }
}

// ============================================================================
// FIXTURE VALUES
// ============================================================================

/// An instantiated fixture value. Shared so a session-scoped value can be
/// handed to many tests (and many workers) without re-construction.
pub type FixtureValue = Arc<dyn Any + Send + Sync>;

/// The resolved fixture values handed to a factory or a test body.
///
/// Lookup is by fixture name with a typed downcast; a missing name or a type
/// mismatch is the embedder's bug and is reported as a boundary [`Failure`]
/// by [`FixtureSet::get`].
#[derive(Default, Clone)]
pub struct FixtureSet {
    values: HashMap<String, FixtureValue>,
}

impl FixtureSet {
    pub fn insert(&mut self, name: impl Into<String>, value: FixtureValue) {
        self.values.insert(name.into(), value);
    }

    /// Typed access to a resolved fixture value.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Failure> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| Failure::new(format!("fixture `{name}` was not resolved for this test")))?;
        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| Failure::new(format!("fixture `{name}` has a different type than requested")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for FixtureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureSet")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// TEST CASES
// ============================================================================

/// Stable test identity, as produced by the collector.
pub type TestId = String;

/// The executable body of a test. Receives the resolved fixture values; an
/// `Err` is the test's own assertion failure.
pub type TestBody = Arc<dyn Fn(&FixtureSet) -> Result<(), Failure> + Send + Sync>;

/// A collected test: identity, declared fixture requirements, executable body.
/// Immutable once collected.
#[derive(Clone)]
pub struct TestCase {
    pub id: TestId,
    /// Module the test belongs to; governs module-scope boundaries.
    pub module: String,
    /// Declared fixture requirements, in declaration order.
    pub fixtures: Vec<String>,
    pub body: TestBody,
    /// Skip reason from collection metadata, if any.
    pub skip: Option<String>,
}

impl TestCase {
    /// Builds a test case, deriving the module from the id's `::` prefix
    /// (`mod_a::test_x` belongs to `mod_a`; a bare id belongs to `root`).
    pub fn new(
        id: impl Into<String>,
        fixtures: Vec<String>,
        body: impl Fn(&FixtureSet) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> Self {
        let id = id.into();
        let module = id
            .rsplit_once("::")
            .map(|(module, _)| module.to_string())
            .unwrap_or_else(|| "root".to_string());
        Self {
            id,
            module,
            fixtures,
            body: Arc::new(body),
            skip: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("module", &self.module)
            .field("fixtures", &self.fixtures)
            .field("skip", &self.skip)
            .finish()
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome tag for a completed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    Error,
    Skipped,
    Interrupted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::Error => "error",
            Outcome::Skipped => "skipped",
            Outcome::Interrupted => "interrupted",
        };
        write!(f, "{text}")
    }
}

/// Which boundary a failure originated at. `Skip` is not a failure; it tags
/// the recorded reason of a skip decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    TestBody,
    FixtureSetup,
    FixtureTeardown,
    Hook,
    Skip,
}

/// Failure detail attached to a non-passed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub message: String,
    pub origin: FailureOrigin,
}

impl FailureDetail {
    pub fn new(failure: &Failure, origin: FailureOrigin) -> Self {
        Self {
            message: failure.message.clone(),
            origin,
        }
    }
}

/// The recorded result of one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub id: TestId,
    pub module: String,
    pub outcome: Outcome,
    pub detail: Option<FailureDetail>,
}

impl TestReport {
    pub fn passed(case: &TestCase) -> Self {
        Self {
            id: case.id.clone(),
            module: case.module.clone(),
            outcome: Outcome::Passed,
            detail: None,
        }
    }

    pub fn skipped(case: &TestCase, reason: impl Into<String>) -> Self {
        Self {
            id: case.id.clone(),
            module: case.module.clone(),
            outcome: Outcome::Skipped,
            detail: Some(FailureDetail {
                message: reason.into(),
                origin: FailureOrigin::Skip,
            }),
        }
    }

    pub fn interrupted(case: &TestCase) -> Self {
        Self {
            id: case.id.clone(),
            module: case.module.clone(),
            outcome: Outcome::Interrupted,
            detail: None,
        }
    }

    pub fn failure(case: &TestCase, failure: &Failure, origin: FailureOrigin) -> Self {
        let outcome = match origin {
            FailureOrigin::TestBody => Outcome::Failed,
            _ => Outcome::Error,
        };
        Self {
            id: case.id.clone(),
            module: case.module.clone(),
            outcome,
            detail: Some(FailureDetail::new(failure, origin)),
        }
    }
}

/// One entry in the result stream consumed by reporters, emitted in the order
/// events complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResultEvent {
    Test(TestReport),
    /// A teardown action failed. Attributed to the fixture, never to a test.
    TeardownError {
        fixture: String,
        scope: String,
        message: String,
    },
    /// A hook handler failed. Isolated from the test that triggered it.
    HookError {
        point: String,
        handler: String,
        message: String,
    },
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Session-level outcome counts, updated as results are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub interrupted: usize,
    pub teardown_errors: usize,
    pub hook_errors: usize,
}

impl Summary {
    pub fn record(&mut self, event: &ResultEvent) {
        match event {
            ResultEvent::Test(report) => match report.outcome {
                Outcome::Passed => self.passed += 1,
                Outcome::Failed => self.failed += 1,
                Outcome::Error => self.errors += 1,
                Outcome::Skipped => self.skipped += 1,
                Outcome::Interrupted => self.interrupted += 1,
            },
            ResultEvent::TeardownError { .. } => self.teardown_errors += 1,
            ResultEvent::HookError { .. } => self.hook_errors += 1,
        }
    }

    pub fn total_tests(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped + self.interrupted
    }

    /// True when nothing that should fail the process occurred. Hook errors
    /// are isolated by contract and do not flip this; teardown errors do,
    /// because a leaked resource is a real failure of the run.
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0 && self.interrupted == 0 && self.teardown_errors == 0
    }
}
