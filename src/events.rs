//! Lifecycle events for pipeline stages.
//!
//! Stages and composers emit [`Event`]s through an optional
//! [`EventHandler`] on the [`ExecCtx`](crate::exec_ctx::ExecCtx). The handler
//! observes a run; it never influences control flow. [`TracingEventHandler`]
//! forwards every event to `tracing` and is what the server installs.

use std::sync::Arc;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A stage or composer has started.
    StageStart {
        /// Instance name of the stage.
        name: String,
        /// Stable type identifier (e.g. `"agent"`, `"sequence"`, `"parallel"`).
        kind: &'static str,
    },
    /// A stage or composer has finished.
    StageEnd {
        name: String,
        /// Whether execution succeeded.
        ok: bool,
        /// Wall-clock time spent in the stage.
        elapsed_ms: u64,
    },
    /// A transport-level retry after an HTTP error.
    TransportRetry {
        name: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this retry attempt in milliseconds.
        delay_ms: u64,
        /// Error that triggered the retry.
        reason: String,
    },
    /// A structured reply could not be validated against its schema.
    SchemaRejected {
        name: String,
        reason: String,
    },
}

/// Handler for stage lifecycle events.
///
/// # Example
///
/// ```
/// use leftover_chef::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         if let Event::StageEnd { name, ok, .. } = event {
///             println!("[end] {} ok={}", name, ok);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

impl EventHandler for TracingEventHandler {
    fn on_event(&self, event: Event) {
        match event {
            Event::StageStart { name, kind } => {
                tracing::debug!(stage = %name, kind, "stage started");
            }
            Event::StageEnd {
                name,
                ok: true,
                elapsed_ms,
            } => {
                tracing::info!(stage = %name, elapsed_ms, "stage finished");
            }
            Event::StageEnd {
                name,
                ok: false,
                elapsed_ms,
            } => {
                tracing::warn!(stage = %name, elapsed_ms, "stage failed");
            }
            Event::TransportRetry {
                name,
                attempt,
                delay_ms,
                reason,
            } => {
                tracing::warn!(stage = %name, attempt, delay_ms, %reason, "transport retry");
            }
            Event::SchemaRejected { name, reason } => {
                tracing::error!(stage = %name, %reason, "structured output rejected");
            }
        }
    }
}
