//! End-to-end session behavior: scoping, failure isolation, abort, and the
//! ordering guarantees around teardown and hooks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trellis::{
    Built, EngineError, Failure, HookDispatcher, HookFlow, HookPoint, Outcome, RecordingReporter,
    ResultEvent, ScopeKind, SessionConfig, SessionRunner, SuiteBuilder, TestCase,
};

type Log = Arc<Mutex<Vec<String>>>;

fn log_push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn run_default(suite: trellis::Suite) -> RecordingReporter {
    run_with_hooks(suite, HookDispatcher::new())
}

fn run_with_hooks(mut suite: trellis::Suite, hooks: HookDispatcher) -> RecordingReporter {
    let graph = Arc::clone(&suite.graph);
    let mut runner = SessionRunner::new(graph, hooks, SessionConfig::default());
    let mut reporter = RecordingReporter::default();
    runner.run(&mut suite, &mut reporter).unwrap();
    reporter
}

#[test]
fn session_fixture_is_built_once_across_three_tests_and_torn_down_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));

    let suite = {
        let builds = Arc::clone(&builds);
        let drops = Arc::clone(&drops);
        SuiteBuilder::new()
            .fixture("f", ScopeKind::Session, &[], move |_| {
                builds.fetch_add(1, Ordering::SeqCst);
                let drops = Arc::clone(&drops);
                Ok(Built::with_teardown(7_u64, move || {
                    drops.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            })
            .test("suite::t1", &["f"], |fx| {
                fx.get::<u64>("f").map(|_| ())
            })
            .test("suite::t2", &["f"], |fx| {
                fx.get::<u64>("f").map(|_| ())
            })
            .test("suite::t3", &["f"], |fx| {
                fx.get::<u64>("f").map(|_| ())
            })
            .build()
            .unwrap()
    };

    let reporter = run_default(suite);
    let summary = reporter.summary.unwrap();
    assert_eq!(summary.passed, 3);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn setup_failure_yields_error_and_never_invokes_the_body() {
    let body_ran = Arc::new(AtomicUsize::new(0));

    let suite = {
        let body_ran = Arc::clone(&body_ran);
        SuiteBuilder::new()
            .fixture("broken", ScopeKind::Test, &[], |_| {
                Err(Failure::new("refused to start"))
            })
            .test("suite::needs_broken", &["broken"], move |_| {
                body_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap()
    };

    let reporter = run_default(suite);
    let reports = reporter.test_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, Outcome::Error);
    let detail = reports[0].detail.as_ref().unwrap();
    assert!(detail.message.contains("broken"));
    assert!(detail.message.contains("refused to start"));
    assert_eq!(body_ran.load(Ordering::SeqCst), 0);
}

#[test]
fn body_failure_is_a_normal_failed_outcome() {
    let suite = SuiteBuilder::new()
        .test("suite::red", &[], |_| Err(Failure::new("1 != 2")))
        .test("suite::green", &[], |_| Ok(()))
        .build()
        .unwrap();

    let reporter = run_default(suite);
    let summary = reporter.summary.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.passed, 1);
}

#[test]
fn panicking_body_is_captured_as_its_own_failure() {
    let suite = SuiteBuilder::new()
        .test("suite::panics", &[], |_| panic!("assertion exploded"))
        .test("suite::after", &[], |_| Ok(()))
        .build()
        .unwrap();

    let reporter = run_default(suite);
    let reports = reporter.test_reports();
    assert_eq!(reports[0].outcome, Outcome::Failed);
    assert!(reports[0]
        .detail
        .as_ref()
        .unwrap()
        .message
        .contains("assertion exploded"));
    // The session survives the panic.
    assert_eq!(reports[1].outcome, Outcome::Passed);
}

#[test]
fn skip_metadata_bypasses_fixture_setup_entirely() {
    let builds = Arc::new(AtomicUsize::new(0));

    let suite = {
        let builds = Arc::clone(&builds);
        SuiteBuilder::new()
            .fixture("expensive", ScopeKind::Test, &[], move |_| {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(Built::value(()))
            })
            .case(
                TestCase::new("suite::slow", vec!["expensive".into()], |_| Ok(()))
                    .with_skip("needs real hardware"),
            )
            .build()
            .unwrap()
    };

    let reporter = run_default(suite);
    let reports = reporter.test_reports();
    assert_eq!(reports[0].outcome, Outcome::Skipped);
    assert!(reports[0].detail.as_ref().unwrap().message.contains("hardware"));
    assert_eq!(builds.load(Ordering::SeqCst), 0);
}

#[test]
fn module_scoped_fixture_closes_at_module_boundary() {
    let log: Log = Arc::default();

    let suite = {
        let log = Arc::clone(&log);
        SuiteBuilder::new()
            .fixture("workdir", ScopeKind::Module, &[], move |_| {
                let log = Arc::clone(&log);
                log_push(&log, "build");
                Ok(Built::with_teardown((), move || {
                    log_push(&log, "drop");
                    Ok(())
                }))
            })
            .test("mod_a::t1", &["workdir"], |_| Ok(()))
            .test("mod_a::t2", &["workdir"], |_| Ok(()))
            .test("mod_b::t1", &["workdir"], |_| Ok(()))
            .build()
            .unwrap()
    };

    run_default(suite);
    // mod_a builds once, closes before mod_b builds; mod_b closes at finalize.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["build", "drop", "build", "drop"]
    );
}

#[test]
fn abort_after_first_test_interrupts_the_rest_but_still_tears_down() {
    let drops = Arc::new(AtomicUsize::new(0));

    let mut hooks = HookDispatcher::new();
    let abort_slot: Arc<Mutex<Option<trellis::AbortHandle>>> = Arc::default();
    {
        let abort_slot = Arc::clone(&abort_slot);
        hooks.register(HookPoint::AfterTest, "aborter", move |ctx| {
            if ctx.test.map(|t| t.id.as_str()) == Some("suite::t1") {
                if let Some(handle) = abort_slot.lock().unwrap().as_ref() {
                    handle.abort();
                }
            }
            Ok(HookFlow::Continue)
        });
    }

    let mut suite = {
        let drops = Arc::clone(&drops);
        SuiteBuilder::new()
            .fixture("shared", ScopeKind::Session, &[], move |_| {
                let drops = Arc::clone(&drops);
                Ok(Built::with_teardown((), move || {
                    drops.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            })
            .test("suite::t1", &["shared"], |_| Ok(()))
            .test("suite::t2", &["shared"], |_| Ok(()))
            .test("suite::t3", &["shared"], |_| Ok(()))
            .build()
            .unwrap()
    };

    let graph = Arc::clone(&suite.graph);
    let mut runner = SessionRunner::new(graph, hooks, SessionConfig::default());
    *abort_slot.lock().unwrap() = Some(runner.abort_handle());
    let mut reporter = RecordingReporter::default();
    let summary = runner.run(&mut suite, &mut reporter).unwrap();

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.interrupted, 2);
    let reports = reporter.test_reports();
    assert_eq!(reports[1].outcome, Outcome::Interrupted);
    assert_eq!(reports[2].outcome, Outcome::Interrupted);
    // The session-scoped fixture was still torn down during finalization.
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn teardown_count_matches_successful_construction_count() {
    let builds = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));

    let suite = {
        let builds = Arc::clone(&builds);
        let drops = Arc::clone(&drops);
        SuiteBuilder::new()
            .fixture("tracked", ScopeKind::Test, &[], move |_| {
                builds.fetch_add(1, Ordering::SeqCst);
                let drops = Arc::clone(&drops);
                Ok(Built::with_teardown((), move || {
                    drops.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            })
            .fixture("flaky", ScopeKind::Test, &["tracked"], |_| {
                Err(Failure::new("no luck"))
            })
            .test("suite::uses_tracked", &["tracked"], |_| Ok(()))
            .test("suite::uses_flaky", &["flaky"], |_| Ok(()))
            .build()
            .unwrap()
    };

    run_default(suite);
    // "tracked" built for both tests ("flaky" fails after its dependency was
    // constructed); every successful construction tore down exactly once.
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn on_error_fires_after_the_failing_tests_teardown() {
    let log: Log = Arc::default();

    let mut hooks = HookDispatcher::new();
    {
        let log = Arc::clone(&log);
        hooks.register(HookPoint::OnError, "observer", move |_| {
            log_push(&log, "on_error");
            Ok(HookFlow::Continue)
        });
    }

    let suite = {
        let log = Arc::clone(&log);
        SuiteBuilder::new()
            .fixture("scratch", ScopeKind::Test, &[], move |_| {
                let log = Arc::clone(&log);
                Ok(Built::with_teardown((), move || {
                    log_push(&log, "teardown");
                    Ok(())
                }))
            })
            .test("suite::fails", &["scratch"], |_| Err(Failure::new("red")))
            .build()
            .unwrap()
    };

    run_with_hooks(suite, hooks);
    assert_eq!(*log.lock().unwrap(), vec!["teardown", "on_error"]);
}

#[test]
fn teardown_failures_surface_as_events_without_failing_the_test() {
    let suite = SuiteBuilder::new()
        .fixture("leaky", ScopeKind::Test, &[], |_| {
            Ok(Built::with_teardown((), || Err(Failure::new("close failed"))))
        })
        .test("suite::green_with_leak", &["leaky"], |_| Ok(()))
        .build()
        .unwrap();

    let reporter = run_default(suite);
    let reports = reporter.test_reports();
    assert_eq!(reports[0].outcome, Outcome::Passed);

    let teardown_events: Vec<_> = reporter
        .events
        .iter()
        .filter(|e| matches!(e, ResultEvent::TeardownError { .. }))
        .collect();
    assert_eq!(teardown_events.len(), 1);
    let summary = reporter.summary.unwrap();
    assert_eq!(summary.teardown_errors, 1);
    assert!(!summary.all_passed());
}

#[test]
fn session_end_fires_after_session_teardown() {
    let log: Log = Arc::default();

    let mut hooks = HookDispatcher::new();
    {
        let log = Arc::clone(&log);
        hooks.register(HookPoint::SessionEnd, "closer", move |ctx| {
            assert!(ctx.summary.is_some());
            log_push(&log, "session_end");
            Ok(HookFlow::Continue)
        });
    }

    let suite = {
        let log = Arc::clone(&log);
        SuiteBuilder::new()
            .fixture("global", ScopeKind::Session, &[], move |_| {
                let log = Arc::clone(&log);
                Ok(Built::with_teardown((), move || {
                    log_push(&log, "session_teardown");
                    Ok(())
                }))
            })
            .test("suite::t", &["global"], |_| Ok(()))
            .build()
            .unwrap()
    };

    run_with_hooks(suite, hooks);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["session_teardown", "session_end"]
    );
}

#[test]
fn custom_scope_closes_at_finalization_before_the_session_scope() {
    let log: Log = Arc::default();

    let suite = {
        let session_log = Arc::clone(&log);
        let custom_log = Arc::clone(&log);
        SuiteBuilder::new()
            .fixture("global", ScopeKind::Session, &[], move |_| {
                let log = Arc::clone(&session_log);
                Ok(Built::with_teardown((), move || {
                    log_push(&log, "session_drop");
                    Ok(())
                }))
            })
            .fixture("suite_dir", ScopeKind::Custom("suite".into()), &[], move |_| {
                log_push(&custom_log, "custom_build");
                let log = Arc::clone(&custom_log);
                Ok(Built::with_teardown((), move || {
                    log_push(&log, "custom_drop");
                    Ok(())
                }))
            })
            .test("alpha::t1", &["suite_dir", "global"], |_| Ok(()))
            .test("beta::t1", &["suite_dir"], |_| Ok(()))
            .build()
            .unwrap()
    };

    let reporter = run_default(suite);
    assert_eq!(reporter.summary.unwrap().passed, 2);
    // Built once across modules, torn down at finalization, strictly before
    // the session scope.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["custom_build", "custom_drop", "session_drop"]
    );
}

#[test]
fn collection_error_is_fatal_and_runs_nothing() {
    let mut hooks = HookDispatcher::new();
    let touched = Arc::new(AtomicUsize::new(0));
    for point in [HookPoint::SessionStart, HookPoint::AfterTest, HookPoint::SessionEnd] {
        let touched = Arc::clone(&touched);
        hooks.register(point, "counter", move |_| {
            touched.fetch_add(1, Ordering::SeqCst);
            Ok(HookFlow::Continue)
        });
    }

    let graph = {
        let mut graph = trellis::FixtureGraph::new();
        graph.validate().unwrap();
        Arc::new(graph)
    };
    let mut runner = SessionRunner::new(graph, hooks, SessionConfig::default());
    let mut collector =
        || -> Result<Vec<TestCase>, EngineError> { Err(EngineError::collection("bad layout")) };
    let mut reporter = RecordingReporter::default();

    let err = runner.run(&mut collector, &mut reporter).unwrap_err();
    assert!(matches!(err, EngineError::Collection { .. }));
    assert!(reporter.test_reports().is_empty());
    assert_eq!(touched.load(Ordering::SeqCst), 0);
}

#[test]
fn cyclic_graph_is_rejected_before_any_test_executes() {
    let body_ran = Arc::new(AtomicUsize::new(0));
    let result = {
        let body_ran = Arc::clone(&body_ran);
        SuiteBuilder::new()
            .fixture("a", ScopeKind::Test, &["b"], |_| Ok(Built::value(())))
            .fixture("b", ScopeKind::Test, &["a"], |_| Ok(Built::value(())))
            .test("suite::t", &["a"], move |_| {
                body_ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
    };
    assert!(matches!(result, Err(EngineError::CyclicDependency { .. })));
    assert_eq!(body_ran.load(Ordering::SeqCst), 0);
}

#[test]
fn filter_skips_non_matching_tests() {
    let mut suite = SuiteBuilder::new()
        .test("auth::login", &[], |_| Ok(()))
        .test("billing::invoice", &[], |_| Ok(()))
        .build()
        .unwrap();

    let graph = Arc::clone(&suite.graph);
    let config = SessionConfig {
        filter: Some("auth".into()),
        workers: 1,
    };
    let mut runner = SessionRunner::new(graph, HookDispatcher::new(), config);
    let mut reporter = RecordingReporter::default();
    let summary = runner.run(&mut suite, &mut reporter).unwrap();

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.skipped, 1);
    assert!(summary.all_passed());
}
