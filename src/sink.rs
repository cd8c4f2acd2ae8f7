//! Error sink: planning failures are degraded to defaults, not raised, so
//! the drop point is an injected trait rather than scattered log calls.

use std::fmt::Display;

/// Best-effort error reporting. Implementations must never propagate their
/// own failures back into the pipeline.
pub trait ErrorSink: Send + Sync {
    fn log_error(&self, error: &dyn Display, context: &str);
}

/// Default sink: structured tracing at WARN.
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn log_error(&self, error: &dyn Display, context: &str) {
        tracing::warn!(error = %error, context = context, "recovered_error");
    }
}
