//! # Leftover Chef
//!
//! Turns a free-text list of leftovers into a recipe, a shopping list of the
//! missing ingredients and a nutrition table, by running a staged pipeline of
//! Gemini calls and merging the branch outputs into one response.
//!
//! ## Core Concepts
//!
//! - **[`Payload`]**: object-safe trait for anything that runs inside the
//!   pipeline. Reads the [`NamedContext`] built so far, returns the entries it
//!   produced.
//! - **[`StageAgent`]**: one model call with an instruction template,
//!   declared inputs, optional tools and an optional output schema that the
//!   reply is validated against as soon as it arrives.
//! - **[`Sequence`]** / **[`Parallel`]**: composers. A sequence feeds each
//!   stage's output to the stages after it; a parallel group runs its
//!   branches concurrently against one snapshot.
//! - **[`ExecCtx`]**: HTTP client, backend, retry policy and event handler,
//!   shared by every request.
//! - **[`Chef`]**: the assembled pipeline; [`transform`] merges its three
//!   branch outputs into a [`RecipeResponse`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use leftover_chef::{transform, Chef, ChefConfig, ExecCtx, GeminiBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = ExecCtx::builder(Arc::new(GeminiBackend::new("your-api-key"))).build()?;
//!     let chef = Chef::new(ChefConfig::default())?;
//!
//!     let outputs = chef.run(&ctx, "2 eggs, half a liter of milk, old bread").await?;
//!     let recipe = transform(
//!         outputs.diet.as_deref(),
//!         outputs.shopping.as_deref(),
//!         outputs.recipe.as_deref(),
//!     )?;
//!     println!("{}", recipe.recipe_name);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod backend;
pub mod chain;
pub mod chef;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod parallel;
pub mod parsing;
pub mod payload;
pub mod prompt;
pub mod schema;
pub mod server;
pub mod transform;

pub use agent::StageAgent;
pub use backend::{BackoffConfig, GeminiBackend, MockBackend};
pub use chain::Sequence;
pub use chef::{BranchOutputs, Chef, ChefConfig};
pub use context::{NamedContext, StageValue};
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, TracingEventHandler};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use parallel::Parallel;
pub use payload::{validate_composition, BoxFut, Payload};
pub use schema::{
    NutrientEntry, NutritionAnalysis, OutputSchema, RecipeDetails, ShoppingList, StructuredOutput,
};
pub use transform::{transform, RecipeResponse, TransformError};
