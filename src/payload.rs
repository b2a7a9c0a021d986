//! Core payload trait.
//!
//! A payload is anything that can run inside a pipeline: a single
//! [`StageAgent`](crate::agent::StageAgent) or a composer
//! ([`Sequence`](crate::chain::Sequence), [`Parallel`](crate::parallel::Parallel)).
//! Each invocation reads the named context built so far and returns only the
//! entries it produced; the caller decides how to merge them.

use crate::context::NamedContext;
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::PipelineError;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

/// A boxed, pinned, Send future -- the return type of [`Payload::invoke`].
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe trait for executable payloads.
///
/// The trait is object-safe so payloads can be stored as `Box<dyn Payload>`
/// and nested freely.
pub trait Payload: Send + Sync {
    /// Stable identifier for the payload type (e.g. `"agent"`, `"sequence"`).
    fn kind(&self) -> &'static str;

    /// Instance name (for logging and events).
    fn name(&self) -> &str;

    /// Check this payload's wiring against the keys available before it runs,
    /// then add the keys it produces to `available`.
    fn check_wiring(&self, available: &mut BTreeSet<String>) -> Result<()>;

    /// Execute the payload.
    ///
    /// `message` is the user message of the run; `context` holds every entry
    /// produced upstream. Returns the entries produced by this payload.
    fn invoke<'a>(
        &'a self,
        ctx: &'a ExecCtx,
        message: &'a str,
        context: &'a NamedContext,
    ) -> BoxFut<'a, Result<NamedContext>>;
}

/// Validate a whole composition before it serves any request.
///
/// `seeds` are keys present in the context before the root runs. Fails with
/// [`PipelineError::InvalidConfig`] when a stage reads a key nobody upstream
/// produces, or when two stages write the same key.
pub fn validate_composition(root: &dyn Payload, seeds: &[&str]) -> Result<BTreeSet<String>> {
    let mut available: BTreeSet<String> = seeds.iter().map(|s| s.to_string()).collect();
    root.check_wiring(&mut available)?;
    Ok(available)
}

/// Record `key` as produced by `stage`, rejecting duplicates.
pub(crate) fn claim_key(available: &mut BTreeSet<String>, stage: &str, key: &str) -> Result<()> {
    if !available.insert(key.to_string()) {
        return Err(PipelineError::InvalidConfig(format!(
            "stage '{}' writes '{}', which is already produced upstream",
            stage, key
        )));
    }
    Ok(())
}
