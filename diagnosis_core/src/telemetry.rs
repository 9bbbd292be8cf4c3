//! Tracing setup and span helpers for pipeline stages.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Span names. The span macros below read them, so filters and tests can too.
pub mod names {
    pub const RECORD: &str = "diagnosis.record";
    pub const EXTRACT: &str = "diagnosis.extract";
    pub const RESOLVE: &str = "diagnosis.resolve";
    pub const PROPAGATE: &str = "diagnosis.propagate";
    pub const SCHEDULE: &str = "diagnosis.schedule";
    pub const ASSEMBLE: &str = "diagnosis.assemble";
}

/// Create a span for one pipeline run.
#[macro_export]
macro_rules! record_span {
    ($student:expr, $artifact:expr) => {
        tracing::info_span!(
            $crate::telemetry::names::RECORD,
            student = %$student,
            artifact = %$artifact
        )
    };
}

/// Create a span for a pipeline stage named by one of the [`names`] constants.
#[macro_export]
macro_rules! stage_span {
    ($stage:ident, $student:expr) => {
        tracing::debug_span!($crate::telemetry::names::$stage, student = %$student)
    };
}

static INIT: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
///
/// Safe to call more than once; only the first call has an effect, and an
/// already-installed global subscriber is left in place.
pub fn init_tracing(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
