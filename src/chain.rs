//! Sequential composition of payloads.
//!
//! [`Sequence`] runs its children in order. Each child sees the caller's
//! context plus everything produced by earlier children; the sequence returns
//! the union of what its children produced.

use crate::{
    context::NamedContext,
    error::Result,
    events::{emit, Event},
    exec_ctx::ExecCtx,
    payload::{BoxFut, Payload},
    PipelineError,
};
use std::collections::BTreeSet;
use std::time::Instant;

/// A sequential chain of payloads.
///
/// `Sequence` itself implements [`Payload`], so sequences can be nested
/// inside other sequences or [`Parallel`](crate::parallel::Parallel) branches.
///
/// # Example
///
/// ```
/// use leftover_chef::{Sequence, StageAgent};
///
/// let branch = Sequence::new("DietBranch")
///     .push(Box::new(
///         StageAgent::new("DietResearcher", "Research {recipe}.")
///             .reads(&["recipe"])
///             .output_key("raw_diet_text"),
///     ))
///     .push(Box::new(
///         StageAgent::new("DietFormatter", "Format {raw_diet_text}.")
///             .reads(&["raw_diet_text"])
///             .output_key("nutrient_data"),
///     ));
/// assert_eq!(branch.len(), 2);
/// ```
pub struct Sequence {
    name: String,
    payloads: Vec<Box<dyn Payload>>,
}

impl Sequence {
    /// Create a new empty sequence.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payloads: Vec::new(),
        }
    }

    /// Add a payload to the end of the sequence (builder style).
    pub fn push(mut self, payload: Box<dyn Payload>) -> Self {
        self.payloads.push(payload);
        self
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Run every child in order and return the entries they produced.
    ///
    /// Stops at the first failing child; its error is returned unchanged.
    pub async fn execute(
        &self,
        ctx: &ExecCtx,
        message: &str,
        context: &NamedContext,
    ) -> Result<NamedContext> {
        if self.payloads.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "sequence '{}' has no payloads",
                self.name
            )));
        }

        let mut running = context.clone();
        let mut produced = NamedContext::new();

        for payload in &self.payloads {
            let delta = payload.invoke(ctx, message, &running).await?;
            running.merge(delta.clone());
            produced.merge(delta);
        }

        Ok(produced)
    }
}

impl Payload for Sequence {
    fn kind(&self) -> &'static str {
        "sequence"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check_wiring(&self, available: &mut BTreeSet<String>) -> Result<()> {
        if self.payloads.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "sequence '{}' has no payloads",
                self.name
            )));
        }
        for payload in &self.payloads {
            payload.check_wiring(available)?;
        }
        Ok(())
    }

    fn invoke<'a>(
        &'a self,
        ctx: &'a ExecCtx,
        message: &'a str,
        context: &'a NamedContext,
    ) -> BoxFut<'a, Result<NamedContext>> {
        Box::pin(async move {
            emit(
                &ctx.event_handler,
                Event::StageStart {
                    name: self.name.clone(),
                    kind: self.kind(),
                },
            );
            let started = Instant::now();
            let result = self.execute(ctx, message, context).await;
            emit(
                &ctx.event_handler,
                Event::StageEnd {
                    name: self.name.clone(),
                    ok: result.is_ok(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
            );
            result
        })
    }
}
