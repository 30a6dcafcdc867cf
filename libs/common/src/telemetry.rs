//! Telemetry and logging initialization
//!
//! Engine crates log at info by default, everything else at warn; RUST_LOG
//! overrides the whole filter. WEFT_LOG_FORMAT=json switches to structured
//! output for production collectors. Initialization is idempotent so test
//! harnesses hosting several engines in one process can call it freely.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter covering the weft crates
const DEFAULT_FILTER: &str = "warn,weft_broker=info,weft_config=info,weft_core=info,\
     weft_engine=info,weft_infra=info,weft_pipeline=info,weft_server=info,\
     weft_statemachine=info";

/// Initialize tracing/logging with the weft default filter
pub fn init_tracing() {
    init_tracing_with_filter(DEFAULT_FILTER);
}

/// Initialize tracing/logging with a caller-supplied fallback filter
///
/// RUST_LOG takes precedence over `fallback`. A second call is a no-op.
pub fn init_tracing_with_filter(fallback: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let fmt_layer = if std::env::var("WEFT_LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().compact().with_target(true).boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
