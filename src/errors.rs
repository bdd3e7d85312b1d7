//! Trellis Error Handling - Unified Engine Error API
//!
//! Two tiers of failure exist in the engine and must never be conflated:
//!
//! - [`EngineError`]: fatal errors. Collection failed, or the fixture graph is
//!   invalid. No test runs after one of these surfaces; the process exits with
//!   a configuration-error status.
//! - [`Failure`]: boundary failures. A fixture factory, a test body, a
//!   teardown action, or a hook handler failed. These are caught at their
//!   originating boundary, converted into a result event, and the session
//!   continues.

use miette::Diagnostic;
use thiserror::Error;

// ============================================================================
// FATAL ERRORS - graph validation and collection
// ============================================================================

/// Fatal engine errors. Every variant is detected before any test executes.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// Test discovery failed. Fatal to the whole session.
    #[error("collection failed: {message}")]
    #[diagnostic(
        code(trellis::collect::failed),
        help("no tests were run; fix the collector input and re-run")
    )]
    Collection { message: String },

    /// A fixture name was registered twice in the same scope namespace.
    #[error("duplicate fixture `{name}`")]
    #[diagnostic(
        code(trellis::graph::duplicate_fixture),
        help("fixture names must be unique; rename one of the definitions")
    )]
    DuplicateFixture { name: String },

    /// A declared dependency does not name a registered fixture.
    #[error("fixture `{requested_by}` depends on unknown fixture `{name}`")]
    #[diagnostic(
        code(trellis::graph::unknown_fixture),
        help("register the dependency before validating, or remove the edge")
    )]
    UnknownFixture { name: String, requested_by: String },

    /// The dependency graph contains a cycle. The message names every fixture
    /// on one cycle, in edge order.
    #[error("cyclic fixture dependency: {cycle}")]
    #[diagnostic(
        code(trellis::graph::cyclic_dependency),
        help("break the cycle by removing one of the listed dependency edges")
    )]
    CyclicDependency { cycle: String },

    /// A fixture depends on a fixture with a narrower scope. A session-scoped
    /// value outlives every test, so it cannot hold a test-scoped one.
    #[error("fixture `{name}` ({scope}) depends on `{dependency}` ({dependency_scope}), which has a narrower scope")]
    #[diagnostic(
        code(trellis::graph::scope_mismatch),
        help("a fixture may only depend on fixtures of the same or wider scope")
    )]
    ScopeMismatch {
        name: String,
        scope: String,
        dependency: String,
        dependency_scope: String,
    },

    /// The graph was used before `validate()` succeeded. Indicates an engine
    /// embedding bug, not a user error.
    #[error("fixture graph used before validation")]
    #[diagnostic(
        code(trellis::graph::unvalidated),
        help("call FixtureGraph::validate() before resolving fixtures")
    )]
    UnvalidatedGraph,
}

/// Coarse error classification for test assertions and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Collection,
    Graph,
    Internal,
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Collection { .. } => ErrorCategory::Collection,
            Self::DuplicateFixture { .. }
            | Self::UnknownFixture { .. }
            | Self::CyclicDependency { .. }
            | Self::ScopeMismatch { .. } => ErrorCategory::Graph,
            Self::UnvalidatedGraph => ErrorCategory::Internal,
        }
    }

    pub fn collection(message: impl Into<String>) -> Self {
        Self::Collection {
            message: message.into(),
        }
    }
}

// ============================================================================
// BOUNDARY FAILURES - factories, bodies, teardowns, hooks
// ============================================================================

/// The failure payload produced at the engine's execution boundaries.
///
/// Factories, test bodies, teardown actions, and hook handlers all return
/// `Result<_, Failure>`. The engine converts these into result events at the
/// boundary where they occur; they never propagate as [`EngineError`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct Failure {
    pub message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Constructs a [`Failure`] with an optionally formatted message.
///
/// This is the boundary-failure counterpart of `format!`:
/// `fail!("expected {} rows, got {}", want, got)`.
#[macro_export]
macro_rules! fail {
    ($msg:expr) => {
        $crate::errors::Failure::new($msg)
    };
    ($msg:expr, $($arg:expr),+ $(,)?) => {
        $crate::errors::Failure::new(format!($msg, $($arg),+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_partition_the_taxonomy() {
        assert_eq!(
            EngineError::collection("boom").category(),
            ErrorCategory::Collection
        );
        assert_eq!(
            EngineError::DuplicateFixture { name: "db".into() }.category(),
            ErrorCategory::Graph
        );
        assert_eq!(
            EngineError::UnvalidatedGraph.category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn cycle_error_names_the_cycle() {
        let err = EngineError::CyclicDependency {
            cycle: "a -> b -> a".into(),
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn fail_macro_formats() {
        let f = fail!("expected {} rows, got {}", 3, 0);
        assert_eq!(f.message, "expected 3 rows, got 0");
        assert_eq!(fail!("plain"), Failure::new("plain"));
    }
}
