// Demo runner binary: embeds a small sample suite so the CLI surface and
// exit-code contract can be exercised end to end.
// Usage: cargo run --bin demo_suite [pattern] [--jobs N] [--format json]

use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use trellis::{
    cli, fail, Built, Failure, HookDispatcher, HookFlow, HookPoint, ScopeKind, SuiteBuilder,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opened = Arc::new(AtomicUsize::new(0));
    let suite = {
        let opened = Arc::clone(&opened);
        SuiteBuilder::new()
            .fixture("config", ScopeKind::Session, &[], |_| {
                Ok(Built::value("demo.cfg".to_string()))
            })
            .fixture("db", ScopeKind::Session, &["config"], move |deps| {
                let config = deps.get::<String>("config")?;
                if config.is_empty() {
                    return Err(fail!("empty config path"));
                }
                opened.fetch_add(1, Ordering::SeqCst);
                Ok(Built::with_teardown(format!("db[{config}]"), || Ok(())))
            })
            .fixture("conn", ScopeKind::Test, &["db"], |deps| {
                let db = deps.get::<String>("db")?;
                Ok(Built::with_teardown(format!("conn->{db}"), || Ok(())))
            })
            .test("smoke::config_is_loaded", &["config"], |fx| {
                let config = fx.get::<String>("config")?;
                if config.ends_with(".cfg") {
                    Ok(())
                } else {
                    Err(fail!("unexpected config path: {}", config))
                }
            })
            .test("smoke::connection_reaches_db", &["conn"], |fx| {
                let conn = fx.get::<String>("conn")?;
                if conn.contains("db[") {
                    Ok(())
                } else {
                    Err(fail!("connection not backed by the db fixture"))
                }
            })
            .test("regress::always_fails", &[], |_| {
                Err(Failure::new("known breakage, kept red on purpose"))
            })
            .test("regress::windows_only_rename", &[], |_| Ok(()))
            .build()
    };

    let mut hooks = HookDispatcher::new();
    hooks.register(HookPoint::BeforeTest, "platform-gate", |ctx| {
        if let Some(test) = ctx.test {
            if test.id.contains("windows_only") {
                return Ok(HookFlow::Skip("not supported on this platform".into()));
            }
        }
        Ok(HookFlow::Continue)
    });
    hooks.register(HookPoint::SessionEnd, "summary-log", |ctx| {
        if let Some(summary) = ctx.summary {
            tracing::info!(passed = summary.passed, failed = summary.failed, "session closed");
        }
        Ok(HookFlow::Continue)
    });

    process::exit(cli::run(suite, hooks));
}
