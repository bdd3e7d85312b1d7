//! Parallel scheduling: module-partitioned workers over a shared session
//! scope.
//!
//! Scope ownership is partitioned with the tests: a worker owns every test of
//! the modules assigned to it, so module- and test-scoped fixtures never
//! cross threads and need no synchronization. Only the session scope is
//! shared; its mutex guarantees a single construction and is held only for
//! get-or-construct. Result events are funneled over a channel and handed to
//! the caller in completion order.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::fixtures::{FixtureGraph, FixtureStore, SharedScope};
use crate::hooks::HookDispatcher;
use crate::model::{ResultEvent, TestCase};
use crate::session::runner::run_span;
use crate::session::state::AbortHandle;

/// Runs `tests` across up to `workers` threads. Emits every result event on
/// the calling thread, in the order events complete. The shared session
/// scope is left open; the caller closes it after this returns.
#[allow(clippy::too_many_arguments)]
pub(crate) fn execute(
    tests: &[TestCase],
    graph: Arc<FixtureGraph>,
    hooks: Arc<HookDispatcher>,
    session: SharedScope,
    abort: AbortHandle,
    filter: Option<&str>,
    workers: usize,
    emit: &mut dyn FnMut(ResultEvent),
) {
    let partitions = partition_by_module(tests, workers);
    debug!(
        workers = partitions.len(),
        tests = tests.len(),
        "starting parallel span"
    );

    let (tx, rx) = mpsc::channel::<ResultEvent>();
    thread::scope(|scope| {
        for partition in partitions {
            let tx = tx.clone();
            let graph = Arc::clone(&graph);
            let hooks = Arc::clone(&hooks);
            let session = Arc::clone(&session);
            let abort = abort.clone();
            let filter = filter.map(str::to_string);
            scope.spawn(move || {
                let mut store = FixtureStore::with_shared_session(graph, session);
                let mut send = |event: ResultEvent| {
                    // The receiver outlives the workers; a send can only fail
                    // after the scope is already unwinding.
                    let _ = tx.send(event);
                };
                run_span(&partition, &mut store, &hooks, &abort, filter.as_deref(), &mut send);
                for event in store.close_local_scopes() {
                    send(event);
                }
            });
        }
        drop(tx);
        for event in rx {
            emit(event);
        }
    });
}

/// Groups tests by module (first-appearance order) and deals whole modules
/// onto workers round-robin. A module is never split across workers, so
/// module-scope ownership stays single-threaded.
fn partition_by_module(tests: &[TestCase], workers: usize) -> Vec<Vec<TestCase>> {
    let workers = workers.max(1);
    let mut module_order: Vec<&str> = Vec::new();
    for case in tests {
        if !module_order.contains(&case.module.as_str()) {
            module_order.push(&case.module);
        }
    }

    let mut partitions: Vec<Vec<TestCase>> = vec![Vec::new(); workers.min(module_order.len().max(1))];
    for (index, module) in module_order.iter().enumerate() {
        let slot = index % partitions.len();
        partitions[slot].extend(tests.iter().filter(|c| c.module == *module).cloned());
    }
    partitions.retain(|p| !p.is_empty());
    partitions
}
