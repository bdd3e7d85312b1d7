pub use crate::collect::{Collector, Suite, SuiteBuilder};
pub use crate::errors::{EngineError, ErrorCategory, Failure};
pub use crate::fixtures::{Built, FixtureDefinition, FixtureGraph, FixtureStore};
pub use crate::hooks::{HookContext, HookDispatcher, HookFlow, HookPoint};
pub use crate::model::{
    FixtureSet, Outcome, ResultEvent, ScopeId, ScopeKind, Summary, TestCase, TestReport,
};
pub use crate::report::{ConsoleReporter, JsonReporter, NullReporter, RecordingReporter, Reporter};
pub use crate::session::{run_suite, AbortHandle, SessionConfig, SessionRunner};

pub mod cli;
pub mod collect;
pub mod errors;
pub mod fixtures;
pub mod hooks;
pub mod model;
pub mod report;
pub mod session;
