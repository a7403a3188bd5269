/*!
 * Structured Tracing
 * Subscriber setup and lock operation spans using the tracing crate
 */

use crate::core::id::ClientHandle;
use crate::core::types::LockType;
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Operations slower than this are reported at warn level
const SLOW_OPERATION_MS: u128 = 10;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
///
/// `json` selects machine-readable output, normally taken from
/// `PowerConfig::trace_json`. Calling this twice keeps the first subscriber.
pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json, "Structured tracing initialized");
    }
}

/// Span covering one registry operation on a lock
pub struct LockSpan {
    span: tracing::Span,
    start: Instant,
    operation: &'static str,
    handle: ClientHandle,
}

impl LockSpan {
    pub fn new(operation: &'static str, handle: ClientHandle, lock_type: Option<LockType>) -> Self {
        let span = span!(
            Level::DEBUG,
            "runninglock",
            operation = operation,
            handle = handle.id(),
            lock_type = tracing::field::Empty,
            result = tracing::field::Empty,
        );
        if let Some(lock_type) = lock_type {
            span.record("lock_type", lock_type.as_str());
        }

        Self {
            span,
            start: Instant::now(),
            operation,
            handle,
        }
    }

    /// Record the operation outcome
    pub fn record_result(&self, success: bool) {
        self.span.record("result", if success { "success" } else { "error" });
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for LockSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_millis();
        let _entered = self.span.enter();
        if elapsed > SLOW_OPERATION_MS {
            warn!(
                operation = self.operation,
                handle = self.handle.id(),
                duration_ms = elapsed as u64,
                "slow running lock operation"
            );
        } else {
            debug!(operation = self.operation, handle = self.handle.id(), "operation completed");
        }
    }
}

/// Start a span for one lock operation
pub fn span_lock_operation(
    operation: &'static str,
    handle: ClientHandle,
    lock_type: Option<LockType>,
) -> LockSpan {
    LockSpan::new(operation, handle, lock_type)
}
