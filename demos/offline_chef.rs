//! Example: run the whole pipeline against canned replies.
//!
//! Run with: `cargo run --example offline_chef`

use leftover_chef::events::FnEventHandler;
use leftover_chef::{transform, BackoffConfig, Chef, ChefConfig, Event, ExecCtx, MockBackend};
use serde_json::Value;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // One canned reply per stage; replies may be fenced or chatty
    let mock = MockBackend::new()
        .reply("LeftoverParser", r#"{"eggs": 2, "milk": "0.5 l", "bread": "2 slices, stale"}"#)
        .reply(
            "RecipeThinker",
            "Healthy French toast: whisk eggs and milk, soak the bread, pan-fry with a little butter.",
        )
        .reply("FoodShopping", r#"{"items": ["butter", "cinnamon"]}"#)
        .reply(
            "DietResearcher",
            "Eggs: 12g protein, 140 kcal. Milk: 17g protein, 320 kcal. Bread: 8g protein, 160 kcal.",
        )
        .reply(
            "DietFormatter",
            r#"{
                "total_dish_nutrition": [
                    {"nutrient_name": "Protein", "nutrient_quantity": "37g"},
                    {"nutrient_name": "Calories", "nutrient_quantity": "620kcal"},
                    {"nutrient_name": "Fiber", "nutrient_quantity": "2g"}
                ],
                "daily_nutrient_needs_average_man": [
                    {"nutrient_name": "Protein", "nutrient_quantity": "56g"},
                    {"nutrient_name": "Calories", "nutrient_quantity": "2500kcal"}
                ],
                "percentage_of_daily_apport": [
                    {"nutrient_name": "Protein", "nutrient_quantity": "66%"},
                    {"nutrient_name": "Calories", "nutrient_quantity": "25%"}
                ]
            }"#,
        )
        .reply(
            "RecipeParser",
            "Here you go:\n```json\n{\"dish_name\": \"Healthy French Toast\", \"dish_steps\": [\"Whisk eggs and milk\", \"Soak the bread\", \"Pan-fry until golden\"]}\n```",
        );

    // Print each stage as it finishes
    let ctx = ExecCtx::builder(Arc::new(mock))
        .backoff(BackoffConfig::none())
        .event_handler(Arc::new(FnEventHandler(|event: Event| {
            if let Event::StageEnd { name, ok, elapsed_ms } = event {
                println!("[{}] ok={} ({} ms)", name, ok, elapsed_ms);
            }
        })))
        .build()?;

    let chef = Chef::new(ChefConfig::default())?;
    let outputs = chef.run(&ctx, "2 eggs, half a liter of milk, old bread").await?;

    let recipe = transform(
        outputs.diet.as_deref(),
        outputs.shopping.as_deref(),
        outputs.recipe.as_deref(),
    )?;

    println!("\n{}", recipe.recipe_name);
    println!("Buy: {}", recipe.missing_ingredients.join(", "));
    for (i, step) in recipe.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    for row in &recipe.nutrition {
        println!(
            "  {:<10} {:>8} {:>5}",
            row.name.as_deref().unwrap_or("?"),
            cell(row.amount.as_ref()),
            cell(Some(&row.daily_value))
        );
    }

    Ok(())
}

/// Quantities may be strings or numbers.
fn cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    }
}
