/*!
 * Monitoring
 * Tracing setup and running lock observability events
 */

mod events;
mod tracer;

pub use events::{ChannelSink, LockEvent, LockEventSink, LockEventTag, LogSink};
pub use tracer::{init_tracing, span_lock_operation, LockSpan};
