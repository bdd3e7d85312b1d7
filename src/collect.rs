//! The collection contract between the engine and whatever discovers tests.
//!
//! The engine never walks a filesystem or parses a layout convention; it
//! consumes an ordered sequence of collected test cases plus a fixture graph,
//! and treats any error in producing them as a collection-phase failure
//! (fatal, no tests run). [`SuiteBuilder`] is the programmatic collector used
//! by embedders and by the engine's own tests.

use std::sync::Arc;

use crate::errors::{EngineError, Failure};
use crate::fixtures::{FixtureDefinition, FixtureGraph};
use crate::model::{FixtureSet, ScopeKind, TestCase};

/// Produces the ordered set of tests for a session. Implementations are
/// external collaborators; the engine only consumes this output contract.
pub trait Collector {
    fn collect(&mut self) -> Result<Vec<TestCase>, EngineError>;
}

impl<F> Collector for F
where
    F: FnMut() -> Result<Vec<TestCase>, EngineError>,
{
    fn collect(&mut self) -> Result<Vec<TestCase>, EngineError> {
        self()
    }
}

/// A validated, ready-to-run suite: the sealed fixture graph plus the
/// collected tests in declaration order.
#[derive(Debug, Clone)]
pub struct Suite {
    pub graph: Arc<FixtureGraph>,
    pub tests: Vec<TestCase>,
}

impl Collector for Suite {
    fn collect(&mut self) -> Result<Vec<TestCase>, EngineError> {
        Ok(self.tests.clone())
    }
}

/// Builds a suite programmatically: declare fixtures, declare tests, then
/// `build()` to validate everything up front.
///
/// Registration errors are deferred to `build()` so declaration sites can
/// stay chainable; the first error wins.
#[derive(Default)]
pub struct SuiteBuilder {
    graph: FixtureGraph,
    tests: Vec<TestCase>,
    deferred: Option<EngineError>,
}

impl SuiteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a fixture. Dependency names may be declared in any order;
    /// they are resolved at `build()`.
    pub fn fixture(
        mut self,
        name: &str,
        scope: ScopeKind,
        dependencies: &[&str],
        factory: impl Fn(&FixtureSet) -> Result<crate::fixtures::Built, Failure> + Send + Sync + 'static,
    ) -> Self {
        let def = FixtureDefinition::new(
            name,
            scope,
            dependencies.iter().map(|d| d.to_string()).collect(),
            factory,
        );
        if self.deferred.is_none() {
            if let Err(err) = self.graph.register(def) {
                self.deferred = Some(err);
            }
        }
        self
    }

    /// Declares a test case in collection order.
    pub fn test(
        mut self,
        id: &str,
        fixtures: &[&str],
        body: impl Fn(&FixtureSet) -> Result<(), Failure> + Send + Sync + 'static,
    ) -> Self {
        self.tests.push(TestCase::new(
            id,
            fixtures.iter().map(|f| f.to_string()).collect(),
            body,
        ));
        self
    }

    /// Declares an already-built case (module overrides, skip metadata).
    pub fn case(mut self, case: TestCase) -> Self {
        self.tests.push(case);
        self
    }

    /// Validates the fixture graph and every test's declared requirements.
    /// All name resolution happens here, before any test runs.
    pub fn build(mut self) -> Result<Suite, EngineError> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        self.graph.validate()?;
        for case in &self.tests {
            for name in &case.fixtures {
                if self.graph.id_of(name).is_none() {
                    return Err(EngineError::UnknownFixture {
                        name: name.clone(),
                        requested_by: case.id.clone(),
                    });
                }
            }
        }
        Ok(Suite {
            graph: Arc::new(self.graph),
            tests: self.tests,
        })
    }
}
