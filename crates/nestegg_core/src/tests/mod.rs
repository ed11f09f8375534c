//! Integration tests for the projection engine
//!
//! Tests are organized by topic:
//! - `scenarios` - Worked examples with hand-computed figures
//! - `lifecycle` - Accumulation, events, reserves and survivor handling
//! - `invariants` - Properties that hold for every month of every run
//! - `builder_dsl` - Builder DSL for fluent simulation setup

mod builder_dsl;
mod invariants;
mod scenarios;

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static LOGGING: Once = Once::new();

/// Route engine logs to the test harness. Filter with `RUST_LOG`.
pub(crate) fn init_logging() {
    LOGGING.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("nestegg_core=warn"));
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_test_writer().with_target(true))
            .try_init();
    });
}
