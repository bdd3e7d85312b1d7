//! The Trellis command-line surface.
//!
//! Embedders build a [`Suite`] and hand it to [`run`] from their binary's
//! `main`; this module owns argument parsing, reporter selection, and the
//! exit-code contract:
//!
//! - `0`: every test passed (skips allowed)
//! - `1`: at least one test failed, errored, or was interrupted, or a
//!   teardown leaked
//! - `2`: the run itself could not proceed (collection or fixture-graph
//!   error)

use clap::Parser;
use termcolor::ColorChoice;

use crate::cli::args::{OutputFormat, TrellisArgs};
use crate::collect::Suite;
use crate::errors::EngineError;
use crate::hooks::HookDispatcher;
use crate::report::{ConsoleReporter, JsonReporter, Reporter};
use crate::session::{run_suite, SessionConfig};

pub mod args;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURES: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Parses `std::env::args` and runs the suite. Returns the process exit
/// code; the caller passes it to `std::process::exit`.
pub fn run(suite: Result<Suite, EngineError>, hooks: HookDispatcher) -> i32 {
    run_with_args(TrellisArgs::parse(), suite, hooks)
}

/// Same as [`run`] with pre-parsed arguments, for tests and embedders that
/// layer their own argument handling on top.
pub fn run_with_args(
    args: TrellisArgs,
    suite: Result<Suite, EngineError>,
    hooks: HookDispatcher,
) -> i32 {
    let suite = match suite {
        Ok(suite) => suite,
        Err(err) => return report_fatal(err),
    };

    if args.list {
        for case in &suite.tests {
            println!("{}", case.id);
        }
        return EXIT_OK;
    }

    let config = SessionConfig {
        filter: args.pattern.clone(),
        workers: args.jobs,
    };
    let mut reporter: Box<dyn Reporter> = match args.format {
        OutputFormat::Json => Box::new(JsonReporter::stdout()),
        OutputFormat::Console => {
            if args.no_color {
                Box::new(ConsoleReporter::with_color(ColorChoice::Never))
            } else {
                Box::new(ConsoleReporter::auto())
            }
        }
    };

    match run_suite(suite, hooks, config, reporter.as_mut()) {
        Ok(summary) if summary.all_passed() => EXIT_OK,
        Ok(_) => EXIT_FAILURES,
        Err(err) => report_fatal(err),
    }
}

/// Prints a fatal engine error with full miette diagnostics.
fn report_fatal(err: EngineError) -> i32 {
    let report = miette::Report::new(err);
    eprintln!("{report:?}");
    EXIT_CONFIG
}
