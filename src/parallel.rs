//! Concurrent composition of payloads.
//!
//! Every branch of a [`Parallel`] receives the same snapshot of the context
//! taken when the group starts. Branches never observe each other's output;
//! their results are merged once all of them have finished.

use crate::{
    context::NamedContext,
    error::Result,
    events::{emit, Event},
    exec_ctx::ExecCtx,
    payload::{BoxFut, Payload},
    PipelineError,
};
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::time::Instant;

/// Runs its branches concurrently against a shared snapshot.
///
/// The first branch error aborts the group; the remaining branch futures are
/// dropped.
pub struct Parallel {
    name: String,
    branches: Vec<Box<dyn Payload>>,
}

impl Parallel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branches: Vec::new(),
        }
    }

    /// Add a branch (builder style).
    pub fn branch(mut self, payload: Box<dyn Payload>) -> Self {
        self.branches.push(payload);
        self
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Run all branches and return the merged entries they produced.
    pub async fn execute(
        &self,
        ctx: &ExecCtx,
        message: &str,
        context: &NamedContext,
    ) -> Result<NamedContext> {
        if self.branches.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "parallel group '{}' has no branches",
                self.name
            )));
        }

        let deltas = try_join_all(
            self.branches
                .iter()
                .map(|branch| branch.invoke(ctx, message, context)),
        )
        .await?;

        let mut produced = NamedContext::new();
        for delta in deltas {
            produced.merge(delta);
        }
        Ok(produced)
    }
}

impl Payload for Parallel {
    fn kind(&self) -> &'static str {
        "parallel"
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Each branch is checked against the keys available before the group;
    /// a branch reading a sibling's output is rejected, as are two branches
    /// writing the same key.
    fn check_wiring(&self, available: &mut BTreeSet<String>) -> Result<()> {
        if self.branches.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "parallel group '{}' has no branches",
                self.name
            )));
        }

        let mut produced: BTreeSet<String> = BTreeSet::new();
        for branch in &self.branches {
            let mut view = available.clone();
            branch.check_wiring(&mut view)?;
            for key in view.difference(available) {
                if !produced.insert(key.clone()) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "branches of '{}' both write '{}'",
                        self.name, key
                    )));
                }
            }
        }
        available.extend(produced);
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
