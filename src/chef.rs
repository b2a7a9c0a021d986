//! The leftover-chef pipeline.
//!
//! ```text
//! EcoChef (sequence)
//! ├── LeftoverParser                  -> leftover_list
//! ├── RecipeThinker   [search]        -> recipe
//! └── ParallelProcessing (parallel)
//!     ├── FoodShopping  [ShoppingList]      -> shopping_list
//!     ├── DietBranch (sequence)
//!     │   ├── DietResearcher [search]       -> raw_diet_text
//!     │   └── DietFormatter [NutritionAnalysis] -> nutrient_data
//!     └── RecipeParser  [RecipeDetails]     -> recipe_step
//! ```

use crate::{
    agent::{StageAgent, DEFAULT_MODEL},
    backend::{GenerationConfig, Tool},
    chain::Sequence,
    context::NamedContext,
    error::Result,
    exec_ctx::ExecCtx,
    parallel::Parallel,
    payload::{validate_composition, Payload},
    schema::OutputSchema,
};

/// Output key of the nutrition branch.
pub const NUTRIENT_DATA: &str = "nutrient_data";
/// Output key of the shopping branch.
pub const SHOPPING_LIST: &str = "shopping_list";
/// Output key of the recipe formatting branch.
pub const RECIPE_STEP: &str = "recipe_step";

const LEFTOVER_PARSER: &str =
    "Convert input to a dictionary of ingredients. Output must be ONLY JSON without markdown format";

const RECIPE_THINKER: &str = "Find a healthy recipe using {leftover_list}.";

const FOOD_SHOPPING: &str = "You are a back-end server that need to return a structured list.
Return a shopping list in the defined template format based on {leftover_list} and {recipe} to tell the user what are the missing ingredients.
Basic condiments such as salt, pepper and olive oil MUST NOT be included";

const RECIPE_PARSER: &str = "You are a data gathering agent that returns a JSON file of the provided output_schema
*CRITICAL* The steps must be very accurate and complete, containing Micro and Macro nutrients.
Steps:

1. Gather the name of the dish and the recipe steps in {recipe}
2. you MUST return the output as a JSON with the provided template";

const DIET_RESEARCHER: &str = "You are a data gathering agent that will provide raw data to a formatter agent.
*CRITICAL* The list of the nutrients must be very accurate and complete, containing Micro and Macro nutrients.
Steps:
1. Search for the macro/micro nutrients for ingredients in {recipe}, those value MUST be numbers.
2. Search for the daily nutrient needs for an average man.";

const DIET_FORMATTER: &str = "Analyze the {raw_diet_text}.
Calculate the totals and percentages. Every macro/micro nutrients MUST be taken into account
Format the output strictly according to the schema.";

/// Model settings shared by every stage.
#[derive(Debug, Clone)]
pub struct ChefConfig {
    pub model: String,
    pub generation: GenerationConfig,
}

impl Default for ChefConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Raw text of the three branch outputs, keyed by name rather than by the
/// order the stages happened to finish in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchOutputs {
    pub diet: Option<String>,
    pub shopping: Option<String>,
    pub recipe: Option<String>,
}

impl BranchOutputs {
    fn from_context(mut context: NamedContext) -> Self {
        let mut text = |key: &str| context.take(key).map(|v| v.as_prompt_text());
        Self {
            diet: text(NUTRIENT_DATA),
            shopping: text(SHOPPING_LIST),
            recipe: text(RECIPE_STEP),
        }
    }
}

/// The assembled pipeline. Build once, run per request.
pub struct Chef {
    root: Sequence,
}

impl Chef {
    /// Build and validate the pipeline.
    pub fn new(config: ChefConfig) -> Result<Self> {
        let stage = |name: &str, instruction: &str| {
            StageAgent::new(name, instruction)
                .with_model(config.model.clone())
                .with_config(config.generation.clone())
        };

        let leftover_parser = stage("LeftoverParser", LEFTOVER_PARSER).output_key("leftover_list");

        let recipe_thinker = stage("RecipeThinker", RECIPE_THINKER)
            .reads(&["leftover_list"])
            .with_tool(Tool::GoogleSearch)
            .output_key("recipe");

        let food_shopping = stage("FoodShopping", FOOD_SHOPPING)
            .reads(&["leftover_list", "recipe"])
            .with_schema(OutputSchema::ShoppingList)
            .output_key(SHOPPING_LIST);

        let recipe_parser = stage("RecipeParser", RECIPE_PARSER)
            .reads(&["recipe"])
            .with_schema(OutputSchema::RecipeDetails)
            .output_key(RECIPE_STEP);

        let diet_researcher = stage("DietResearcher", DIET_RESEARCHER)
            .reads(&["recipe"])
            .with_tool(Tool::GoogleSearch)
            .output_key("raw_diet_text");

        let diet_formatter = stage("DietFormatter", DIET_FORMATTER)
            .reads(&["raw_diet_text"])
            .with_schema(OutputSchema::NutritionAnalysis)
            .output_key(NUTRIENT_DATA);

        let diet_branch = Sequence::new("DietBranch")
            .push(Box::new(diet_researcher))
            .push(Box::new(diet_formatter));

        let fan_out = Parallel::new("ParallelProcessing")
            .branch(Box::new(food_shopping))
            .branch(Box::new(diet_branch))
            .branch(Box::new(recipe_parser));

        let root = Sequence::new("EcoChef")
            .push(Box::new(leftover_parser))
            .push(Box::new(recipe_thinker))
            .push(Box::new(fan_out));

        let produced = validate_composition(&root, &[])?;
        tracing::debug!(keys = ?produced, model = %config.model, "pipeline wiring validated");

        Ok(Self { root })
    }

    /// The user message sent to every stage.
    pub fn user_message(leftovers: &str) -> String {
        format!("Use this user input as a list of leftovers: {}", leftovers)
    }

    /// Run the whole pipeline for one request.
    pub async fn run(&self, ctx: &ExecCtx, leftovers: &str) -> Result<BranchOutputs> {
        let message = Self::user_message(leftovers);
        let produced = self.root.invoke(ctx, &message, &NamedContext::new()).await?;
        Ok(BranchOutputs::from_context(produced))
    }

    pub fn root(&self) -> &Sequence {
        &self.root
    }
}

impl std::fmt::Debug for Chef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chef")
            .field("root", &self.root.name())
            .field("stages", &self.root.len())
            .finish()
    }
}
