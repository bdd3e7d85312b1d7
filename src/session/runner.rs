//! The session orchestrator.
//!
//! `SessionRunner` drives the whole run: `Idle → Collecting → Running →
//! Finalizing → Closed`, with a per-test sub-machine `Pending → SettingUp →
//! Executing → TearingDown → Done`. Fatal errors (collection, invalid graph)
//! surface immediately with no tests run; every other failure is converted
//! into a result event at its boundary and the session continues.
//!
//! Hook ordering around a failing test is fixed as: test-scope teardown
//! attempts run first, then `after_test`, then the result is recorded, then
//! `on_error` fires with the already-recorded report.

use std::sync::Arc;

use tracing::debug;

use crate::collect::{Collector, Suite};
use crate::errors::{EngineError, Failure};
use crate::fixtures::{FixtureGraph, FixtureStore};
use crate::hooks::{HookContext, HookDispatcher, HookPoint};
use crate::model::{Outcome, ResultEvent, ScopeId, Summary, TestCase, TestReport};
use crate::model::FailureOrigin;
use crate::report::Reporter;
use crate::session::parallel;
use crate::session::state::{AbortHandle, SessionPhase, SessionState, TestPhase};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Execution settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Case-insensitive substring filter on test ids; non-matching tests are
    /// reported as skipped.
    pub filter: Option<String>,
    /// Worker count. `0` and `1` both mean the sequential scheduler.
    pub workers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            filter: None,
            workers: 1,
        }
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Owns a run from collection to close. All mutable run state lives in the
/// [`SessionState`] this runner creates; nothing is process-global.
pub struct SessionRunner {
    graph: Arc<FixtureGraph>,
    hooks: Arc<HookDispatcher>,
    config: SessionConfig,
    abort: AbortHandle,
}

impl SessionRunner {
    pub fn new(graph: Arc<FixtureGraph>, hooks: HookDispatcher, config: SessionConfig) -> Self {
        Self {
            graph,
            hooks: Arc::new(hooks),
            config,
            abort: AbortHandle::new(),
        }
    }

    /// Handle for signaling a cooperative abort from another thread or a
    /// hook. Observed between tests: at most the in-flight test completes.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Runs a full session over the collector's output, streaming result
    /// events to the reporter as they complete.
    ///
    /// Returns the session summary, or a fatal [`EngineError`] if collection
    /// failed or the graph was not validated - in which case no test ran.
    pub fn run(
        &mut self,
        collector: &mut dyn Collector,
        reporter: &mut dyn Reporter,
    ) -> Result<Summary, EngineError> {
        let mut state = SessionState::new(self.abort.clone());

        state.advance(SessionPhase::Collecting);
        if !self.graph.is_validated() {
            return Err(EngineError::UnvalidatedGraph);
        }
        let tests = collector.collect()?;
        debug!(count = tests.len(), "collection complete");
        state.tests = tests.clone();

        // Fatal checks are done; from here on session_start is always paired
        // with session_end.
        let start = self.hooks.invoke(HookPoint::SessionStart, &HookContext::empty());
        for event in start.events {
            emit(&mut state, reporter, event);
        }

        state.advance(SessionPhase::Running);
        if self.config.workers <= 1 {
            self.run_sequential(&tests, &mut state, reporter);
        } else {
            self.run_parallel(&tests, &mut state, reporter);
        }

        let end = self
            .hooks
            .invoke(HookPoint::SessionEnd, &HookContext::for_summary(&state.summary));
        for event in end.events {
            emit(&mut state, reporter, event);
        }
        state.advance(SessionPhase::Closed);

        reporter.summary(&state.summary);
        Ok(state.summary)
    }

    fn run_sequential(&self, tests: &[TestCase], state: &mut SessionState, reporter: &mut dyn Reporter) {
        let mut store = FixtureStore::new(Arc::clone(&self.graph));
        let abort = self.abort.clone();
        let filter = self.config.filter.clone();
        let hooks = Arc::clone(&self.hooks);

        run_span(tests, &mut store, &hooks, &abort, filter.as_deref(), &mut |event| {
            emit(state, reporter, event);
        });

        state.advance(SessionPhase::Finalizing);
        for event in store.close_local_scopes() {
            emit(state, reporter, event);
        }
        for event in store.close_session() {
            emit(state, reporter, event);
        }
    }

    fn run_parallel(&self, tests: &[TestCase], state: &mut SessionState, reporter: &mut dyn Reporter) {
        let session = crate::fixtures::store::shared_session_scope();
        parallel::execute(
            tests,
            Arc::clone(&self.graph),
            Arc::clone(&self.hooks),
            Arc::clone(&session),
            self.abort.clone(),
            self.config.filter.as_deref(),
            self.config.workers,
            &mut |event| emit(state, reporter, event),
        );

        state.advance(SessionPhase::Finalizing);
        let mut store = FixtureStore::with_shared_session(Arc::clone(&self.graph), session);
        for event in store.close_session() {
            emit(state, reporter, event);
        }
    }
}

/// Convenience entry point: run a validated suite with the given hooks and
/// configuration.
pub fn run_suite(
    mut suite: Suite,
    hooks: HookDispatcher,
    config: SessionConfig,
    reporter: &mut dyn Reporter,
) -> Result<Summary, EngineError> {
    let graph = Arc::clone(&suite.graph);
    SessionRunner::new(graph, hooks, config).run(&mut suite, reporter)
}

fn emit(state: &mut SessionState, reporter: &mut dyn Reporter, event: ResultEvent) {
    reporter.event(&event);
    state.record(event);
}

// ============================================================================
// TEST SPAN EXECUTION - shared by the sequential scheduler and by workers
// ============================================================================

/// Runs an ordered span of tests against one store, handling module-scope
/// boundaries, skip decisions, and the abort flag. Emits result events in
/// completion order. Remaining module/custom scopes are left open for the
/// caller to close.
pub(crate) fn run_span(
    tests: &[TestCase],
    store: &mut FixtureStore,
    hooks: &HookDispatcher,
    abort: &AbortHandle,
    filter: Option<&str>,
    emit: &mut dyn FnMut(ResultEvent),
) {
    let mut current_module: Option<String> = None;
    for case in tests {
        // Abort is observed between tests only; the in-flight test always
        // completes, remaining tests never set up fixtures.
        if abort.is_aborted() {
            finish(case, TestReport::interrupted(case), hooks, emit);
            continue;
        }

        if current_module.as_deref() != Some(case.module.as_str()) {
            if let Some(previous) = current_module.take() {
                for event in store.close_scope(&ScopeId::Module(previous)) {
                    emit(event);
                }
            }
            current_module = Some(case.module.clone());
        }

        execute_case(case, store, hooks, filter, emit);
    }
}

/// The per-test sub-machine: `Pending → SettingUp → Executing → TearingDown
/// → Done`, with the documented short-circuits for skip and setup failure.
pub(crate) fn execute_case(
    case: &TestCase,
    store: &mut FixtureStore,
    hooks: &HookDispatcher,
    filter: Option<&str>,
    emit: &mut dyn FnMut(ResultEvent),
) {
    let mut phase = TestPhase::Pending;

    // Skip decisions bypass fixture setup entirely: Pending → Done.
    if let Some(reason) = &case.skip {
        finish(case, TestReport::skipped(case, reason.clone()), hooks, emit);
        return;
    }
    if let Some(pattern) = filter {
        if !case.id.to_lowercase().contains(&pattern.to_lowercase()) {
            finish(
                case,
                TestReport::skipped(case, format!("filtered out by pattern `{pattern}`")),
                hooks,
                emit,
            );
            return;
        }
    }

    let before = hooks.invoke(HookPoint::BeforeTest, &HookContext::for_test(case));
    for event in before.events {
        emit(event);
    }
    if let Some(reason) = before.skip {
        finish(case, TestReport::skipped(case, reason), hooks, emit);
        return;
    }

    advance_test(case, &mut phase, TestPhase::SettingUp);
    let report = match store.resolve(case) {
        Err(setup) => {
            // The body never runs if its fixtures cannot be built.
            TestReport::failure(case, &Failure::new(setup.message()), FailureOrigin::FixtureSetup)
        }
        Ok(set) => {
            advance_test(case, &mut phase, TestPhase::Executing);
            // Assertion macros panic; a panicking body is the test's own
            // failure, not the engine's.
            let body = std::panic::AssertUnwindSafe(|| (case.body)(&set));
            match std::panic::catch_unwind(body) {
                Ok(Ok(())) => TestReport::passed(case),
                Ok(Err(failure)) => TestReport::failure(case, &failure, FailureOrigin::TestBody),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    TestReport::failure(
                        case,
                        &Failure::new(format!("test body panicked: {message}")),
                        FailureOrigin::TestBody,
                    )
                }
            }
        }
    };

    advance_test(case, &mut phase, TestPhase::TearingDown);
    for event in store.close_scope(&ScopeId::Test(case.id.clone())) {
        emit(event);
    }

    let after = hooks.invoke(HookPoint::AfterTest, &HookContext::for_report(case, &report));
    for event in after.events {
        emit(event);
    }

    advance_test(case, &mut phase, TestPhase::Done);
    finish(case, report, hooks, emit);
}

/// Records the result and fires `on_error` for any non-passed outcome, with
/// the already-recorded report (teardown attempts have already run).
fn finish(
    case: &TestCase,
    report: TestReport,
    hooks: &HookDispatcher,
    emit: &mut dyn FnMut(ResultEvent),
) {
    let errored = report.outcome != Outcome::Passed;
    emit(ResultEvent::Test(report.clone()));
    if errored {
        let dispatch = hooks.invoke(HookPoint::OnError, &HookContext::for_report(case, &report));
        for event in dispatch.events {
            emit(event);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn advance_test(case: &TestCase, phase: &mut TestPhase, to: TestPhase) {
    debug_assert!(to >= *phase);
    debug!(test = %case.id, from = ?phase, to = ?to, "test phase transition");
    *phase = to;
}
