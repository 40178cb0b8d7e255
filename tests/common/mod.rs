//! Shared setup for the integration suites.
//!
//! The list only emits events when built with the `tracing` feature:
//!
//! ```bash
//! RUST_LOG=skiplist=debug cargo test --features tracing --test stress_tests
//! ```
//!
//! `debug` shows head growth and reduction ("head grown", "head reduced") and
//! abandoned index insertions. `trace` adds every splice of a removed node,
//! helped splices and stale-index unlinks. Set `SKIPLIST_LOG_FILE` to also
//! write the events as NDJSON, e.g. to count head resizes during a churn run:
//!
//! ```bash
//! jq -r 'select(.fields.message == "head reduced") | .fields.from' logs/skiplist.jsonl | sort | uniq -c
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

#[expect(clippy::expect_used)]
fn setup_tracing() {
    let console = tracing_subscriber::fmt::layer()
        .with_thread_names(true)
        .with_test_writer()
        .compact()
        .with_filter(filter());

    // Appending: each test binary runs in its own process.
    let file = env::var("SKIPLIST_LOG_FILE").ok().map(|path| {
        if let Some(dir) = Path::new(&path).parent() {
            fs::create_dir_all(dir).expect("create log directory");
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .expect("open log file");
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_thread_ids(true)
            .json()
            .with_filter(filter())
    });

    let _ = Registry::default().with(console).with(file).try_init();
}

/// Print the debug counters accumulated since the last reset.
pub fn report_debug_counters(label: &str) {
    let c = skiplist::get_debug_counters();
    tracing::info!(
        label,
        retries = c.retries,
        helped_deletes = c.helped_deletes,
        index_unlinks = c.index_unlinks,
        head_grows = c.head_grows,
        head_reductions = c.head_reductions,
        index_aborts = c.index_aborts,
        "debug counters"
    );
    println!("[{label}] {c:?}");
}

/// Render a key for assertion messages.
pub fn show(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
