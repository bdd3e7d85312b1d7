//! Session-run state: phases, the mutable aggregate, and the abort flag.
//!
//! `SessionState` is the only mutable aggregate in a run and is owned
//! exclusively by the `SessionRunner` that created it. Nothing here is
//! process-global; two sessions in one process never share state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::model::{ResultEvent, Summary, TestCase};

/// Top-level session phases, in order. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Idle,
    Collecting,
    Running,
    Finalizing,
    Closed,
}

/// Per-test sub-machine phases. `Executing` is skipped when setup fails and
/// everything between `Pending` and `Done` is skipped for skip/interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TestPhase {
    Pending,
    SettingUp,
    Executing,
    TearingDown,
    Done,
}

/// Cooperative abort signal. Cloneable; raising it from any thread marks the
/// session aborted, observed by the runner between tests.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The aggregate run state: collected tests, the result stream so far, the
/// running summary, and the abort flag. Created at session start, dropped at
/// session end.
pub struct SessionState {
    pub phase: SessionPhase,
    pub tests: Vec<TestCase>,
    pub events: Vec<ResultEvent>,
    pub summary: Summary,
    abort: AbortHandle,
}

impl SessionState {
    pub fn new(abort: AbortHandle) -> Self {
        Self {
            phase: SessionPhase::Idle,
            tests: Vec::new(),
            events: Vec::new(),
            summary: Summary::default(),
            abort,
        }
    }

    /// Advances the session phase. Phases only move forward.
    pub fn advance(&mut self, phase: SessionPhase) {
        debug_assert!(phase >= self.phase, "session phase moved backwards");
        if phase != self.phase {
            debug!(from = ?self.phase, to = ?phase, "session phase transition");
            self.phase = phase;
        }
    }

    /// Records a result event into the cumulative stream and summary.
    pub fn record(&mut self, event: ResultEvent) {
        self.summary.record(&event);
        self.events.push(event);
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, TestReport};

    #[test]
    fn abort_handle_is_shared() {
        let state = SessionState::new(AbortHandle::new());
        let handle = state.abort_handle();
        assert!(!state.is_aborted());
        handle.abort();
        assert!(state.is_aborted());
    }

    #[test]
    fn recording_updates_summary_and_stream() {
        let mut state = SessionState::new(AbortHandle::new());
        let case = TestCase::new("m::t", vec![], |_| Ok(()));
        state.record(ResultEvent::Test(TestReport::passed(&case)));
        assert_eq!(state.summary.passed, 1);
        assert_eq!(state.events.len(), 1);
        match &state.events[0] {
            ResultEvent::Test(report) => assert_eq!(report.outcome, Outcome::Passed),
            other => panic!("expected test event, got {other:?}"),
        }
    }

    #[test]
    fn phases_are_ordered() {
        assert!(SessionPhase::Idle < SessionPhase::Collecting);
        assert!(SessionPhase::Running < SessionPhase::Finalizing);
        assert!(TestPhase::Pending < TestPhase::Done);
    }
}
