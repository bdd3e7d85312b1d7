//! Lifecycle hook points and the dispatcher that drives them.
//!
//! This is the engine's extensibility seam. Plugins register opaque handler
//! closures against a fixed, enumerated set of [`HookPoint`]s; the dispatcher
//! invokes them in registration order, synchronously, and isolates every
//! handler failure. A failing handler is recorded as a hook-level error
//! event, never escalates to the triggering test, and never prevents
//! later-registered handlers from running.

use std::collections::HashMap;
use std::fmt;

use crate::errors::Failure;
use crate::model::{ResultEvent, Summary, TestCase, TestReport};

/// The fixed set of lifecycle moments handlers can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    SessionStart,
    BeforeTest,
    AfterTest,
    OnError,
    SessionEnd,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::SessionStart => "session_start",
            HookPoint::BeforeTest => "before_test",
            HookPoint::AfterTest => "after_test",
            HookPoint::OnError => "on_error",
            HookPoint::SessionEnd => "session_end",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a handler sees. Fields are populated per point: `test` at
/// `before_test`/`after_test`/`on_error`, `report` at `after_test`/`on_error`,
/// `summary` at `session_end`.
#[derive(Default)]
pub struct HookContext<'a> {
    pub test: Option<&'a TestCase>,
    pub report: Option<&'a TestReport>,
    pub summary: Option<&'a Summary>,
}

impl<'a> HookContext<'a> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_test(test: &'a TestCase) -> Self {
        Self {
            test: Some(test),
            ..Self::default()
        }
    }

    pub fn for_report(test: &'a TestCase, report: &'a TestReport) -> Self {
        Self {
            test: Some(test),
            report: Some(report),
            ..Self::default()
        }
    }

    pub fn for_summary(summary: &'a Summary) -> Self {
        Self {
            summary: Some(summary),
            ..Self::default()
        }
    }
}

/// A handler's answer. `Skip` is honored only at `before_test`, where it
/// moves the test straight to `Done` with a skipped result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    Skip(String),
}

type Handler = Box<dyn Fn(&HookContext<'_>) -> Result<HookFlow, Failure> + Send + Sync>;

/// The aggregate of one `invoke`: any skip directive plus the captured
/// handler failures, as reportable events.
#[derive(Default)]
pub struct Dispatch {
    /// First skip directive answered by a handler, if any.
    pub skip: Option<String>,
    pub events: Vec<ResultEvent>,
}

/// Ordered, multi-subscriber notification at the defined lifecycle points.
/// The dispatcher never learns handler identities beyond the name given at
/// registration.
#[derive(Default)]
pub struct HookDispatcher {
    handlers: HashMap<HookPoint, Vec<(String, Handler)>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a point. Any number of handlers may register
    /// per point; invocation order is registration order.
    pub fn register(
        &mut self,
        point: HookPoint,
        name: impl Into<String>,
        handler: impl Fn(&HookContext<'_>) -> Result<HookFlow, Failure> + Send + Sync + 'static,
    ) {
        self.handlers
            .entry(point)
            .or_default()
            .push((name.into(), Box::new(handler)));
    }

    /// Invokes every handler registered for `point`, in registration order.
    /// Handler failures are captured as events; the remaining handlers still
    /// run. The first skip directive wins but does not stop later handlers
    /// from observing the point.
    pub fn invoke(&self, point: HookPoint, ctx: &HookContext<'_>) -> Dispatch {
        let mut dispatch = Dispatch::default();
        let Some(handlers) = self.handlers.get(&point) else {
            return dispatch;
        };
        for (name, handler) in handlers {
            match handler(ctx) {
                Ok(HookFlow::Continue) => {}
                Ok(HookFlow::Skip(reason)) => {
                    if dispatch.skip.is_none() {
                        dispatch.skip = Some(reason);
                    }
                }
                Err(failure) => {
                    dispatch.events.push(ResultEvent::HookError {
                        point: point.to_string(),
                        handler: name.clone(),
                        message: failure.message,
                    });
                }
            }
        }
        dispatch
    }

    pub fn handler_count(&self, point: HookPoint) -> usize {
        self.handlers.get(&point).map_or(0, Vec::len)
    }
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(point, list)| (point.as_str(), list.len()))
            .collect();
        f.debug_struct("HookDispatcher").field("handlers", &counts).finish()
    }
}
