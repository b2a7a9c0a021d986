//! Structured output schemas for the stages that must return JSON.
//!
//! Each schema is a plain serde type plus a response schema in the subset of
//! OpenAPI that the Gemini API accepts. [`OutputSchema`] names a schema on a
//! stage; [`StructuredOutput`] is the typed value a stage produced once its
//! reply has been validated.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Missing food items the user has to buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingList {
    /// A list of missing food items to buy.
    pub items: Vec<String>,
}

/// One nutrient and its quantity, e.g. `("Protein", "20g")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutrientEntry {
    pub nutrient_name: String,
    pub nutrient_quantity: String,
}

/// Nutrition breakdown of a dish.
///
/// The three lists share nutrient names but nothing forces them to cover the
/// same nutrients, or to appear in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionAnalysis {
    /// Total macro/micro nutrients provided by the dish.
    pub total_dish_nutrition: Vec<NutrientEntry>,
    /// Recommended daily intake for an average man.
    pub daily_nutrient_needs_average_man: Vec<NutrientEntry>,
    /// Percentage of the daily need covered by the dish.
    pub percentage_of_daily_apport: Vec<NutrientEntry>,
}

/// Name and ordered preparation steps of a dish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDetails {
    pub dish_name: String,
    pub dish_steps: Vec<String>,
}

/// Which schema a structured stage must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    ShoppingList,
    NutritionAnalysis,
    RecipeDetails,
}

impl OutputSchema {
    /// Short identifier used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            OutputSchema::ShoppingList => "ShoppingList",
            OutputSchema::NutritionAnalysis => "NutritionAnalysis",
            OutputSchema::RecipeDetails => "RecipeDetails",
        }
    }

    /// Response schema sent to the model alongside the request.
    pub fn response_schema(&self) -> Value {
        match self {
            OutputSchema::ShoppingList => json!({
                "type": "OBJECT",
                "properties": {
                    "items": {
                        "type": "ARRAY",
                        "description": "A list of missing food items to buy.",
                        "items": { "type": "STRING" }
                    }
                },
                "required": ["items"]
            }),
            OutputSchema::NutritionAnalysis => {
                let list = |description: &str| {
                    json!({
                        "type": "ARRAY",
                        "description": description,
                        "items": nutrient_entry_schema()
                    })
                };
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "total_dish_nutrition": list(
                            "A list detailing the total macro/micro nutrients provided by the dish."
                        ),
                        "daily_nutrient_needs_average_man": list(
                            "A list detailing the recommended daily intake for an average man."
                        ),
                        "percentage_of_daily_apport": list(
                            "A list detailing the percentage of the daily need covered by the dish."
                        )
                    },
                    "required": [
                        "total_dish_nutrition",
                        "daily_nutrient_needs_average_man",
                        "percentage_of_daily_apport"
                    ]
                })
            }
            OutputSchema::RecipeDetails => json!({
                "type": "OBJECT",
                "properties": {
                    "dish_name": {
                        "type": "STRING",
                        "description": "The official name of the recipe (e.g., 'Healthy French Toast')."
                    },
                    "dish_steps": {
                        "type": "ARRAY",
                        "description": "An ordered list of steps required to prepare the dish.",
                        "items": { "type": "STRING" }
                    }
                },
                "required": ["dish_name", "dish_steps"]
            }),
        }
    }

    /// Deserialize an already-extracted JSON value into this schema's type.
    pub fn validate(&self, value: Value) -> std::result::Result<StructuredOutput, String> {
        let parsed = match self {
            OutputSchema::ShoppingList => {
                serde_json::from_value(value).map(StructuredOutput::ShoppingList)
            }
            OutputSchema::NutritionAnalysis => {
                serde_json::from_value(value).map(StructuredOutput::NutritionAnalysis)
            }
            OutputSchema::RecipeDetails => {
                serde_json::from_value(value).map(StructuredOutput::RecipeDetails)
            }
        };
        parsed.map_err(|e| format!("expected {}: {}", self.name(), e))
    }
}

fn nutrient_entry_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "nutrient_name": {
                "type": "STRING",
                "description": "The name of the nutrient (e.g., 'Protein', 'Calories')."
            },
            "nutrient_quantity": {
                "type": "STRING",
                "description": "The measured or calculated quantity of the nutrient in unit."
            }
        },
        "required": ["nutrient_name", "nutrient_quantity"]
    })
}

/// A validated structured stage output, tagged by schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema", content = "value")]
pub enum StructuredOutput {
    ShoppingList(ShoppingList),
    NutritionAnalysis(NutritionAnalysis),
    RecipeDetails(RecipeDetails),
}

impl StructuredOutput {
    pub fn schema(&self) -> OutputSchema {
        match self {
            StructuredOutput::ShoppingList(_) => OutputSchema::ShoppingList,
            StructuredOutput::NutritionAnalysis(_) => OutputSchema::NutritionAnalysis,
            StructuredOutput::RecipeDetails(_) => OutputSchema::RecipeDetails,
        }
    }

    /// The bare JSON object, without the schema tag.
    pub fn to_json(&self) -> Value {
        let value = match self {
            StructuredOutput::ShoppingList(v) => serde_json::to_value(v),
            StructuredOutput::NutritionAnalysis(v) => serde_json::to_value(v),
            StructuredOutput::RecipeDetails(v) => serde_json::to_value(v),
        };
        // Plain derive(Serialize) structs of strings cannot fail to serialize.
        value.unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_shopping_list() {
        let out = OutputSchema::ShoppingList
            .validate(json!({"items": ["butter", "eggs"]}))
            .unwrap();
        assert_eq!(
            out,
            StructuredOutput::ShoppingList(ShoppingList {
                items: vec!["butter".into(), "eggs".into()]
            })
        );
        assert_eq!(out.schema(), OutputSchema::ShoppingList);
    }

    #[test]
    fn test_validate_rejects_wrong_shape() {
        let err = OutputSchema::RecipeDetails
            .validate(json!({"dish_name": "Toast"}))
            .unwrap_err();
        assert!(err.contains("RecipeDetails"));
        assert!(err.contains("dish_steps"));
    }

    #[test]
    fn test_to_json_drops_tag() {
        let out = StructuredOutput::RecipeDetails(RecipeDetails {
            dish_name: "Toast".into(),
            dish_steps: vec!["Toast bread".into()],
        });
        assert_eq!(
            out.to_json(),
            json!({"dish_name": "Toast", "dish_steps": ["Toast bread"]})
        );
    }

    #[test]
    fn test_nutrition_schema_lists_all_three_fields() {
        let schema = OutputSchema::NutritionAnalysis.response_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(
            schema["properties"]["percentage_of_daily_apport"]["items"]["properties"]
                ["nutrient_quantity"]["type"],
            "STRING"
        );
    }
}
