//! Merge the three branch outputs into the response the web page renders.
//!
//! Input is raw JSON text. Missing or empty payloads count as `{}`, missing
//! fields take their defaults, and nutrient totals are left-joined against
//! daily percentages by nutrient name.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Name used when the recipe payload has no `dish_name`.
pub const MYSTERY_DISH: &str = "Mystery Dish";
/// `daily_value` of a nutrient with no matching percentage.
pub const NO_DAILY_VALUE: &str = "-";
/// Error text returned when a payload is not JSON.
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON format from agents";

/// The merged recipe returned by `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub recipe_name: String,
    pub missing_ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub nutrition: Vec<NutritionRow>,
}

/// One line of the nutrition table.
///
/// Quantities are passed through as the model wrote them, string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRow {
    pub name: Option<String>,
    pub amount: Option<Value>,
    pub daily_value: Value,
}

/// `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Why a set of payloads could not be merged.
#[derive(Error, Debug)]
pub enum TransformError {
    /// A payload is not JSON at all.
    #[error("Invalid JSON format from agents ({payload}: {source})")]
    InvalidJson {
        payload: &'static str,
        source: serde_json::Error,
    },

    /// A payload is JSON but not an object of the expected shape.
    #[error("{payload} payload has an unexpected shape: {source}")]
    Shape {
        payload: &'static str,
        source: serde_json::Error,
    },
}

impl TransformError {
    /// Body sent to the client for this error, if the error is one the client
    /// sees verbatim.
    pub fn client_body(&self) -> Option<ErrorBody> {
        match self {
            TransformError::InvalidJson { .. } => Some(ErrorBody::new(INVALID_JSON_MESSAGE)),
            TransformError::Shape { .. } => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DietPayload {
    #[serde(default)]
    total_dish_nutrition: Vec<RawNutrient>,
    #[serde(default)]
    percentage_of_daily_apport: Vec<RawNutrient>,
}

#[derive(Debug, Deserialize)]
struct RawNutrient {
    #[serde(default)]
    nutrient_name: Option<String>,
    #[serde(default)]
    nutrient_quantity: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ShoppingPayload {
    #[serde(default)]
    items: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RecipePayload {
    #[serde(default)]
    dish_name: Option<String>,
    #[serde(default)]
    dish_steps: Vec<String>,
}

fn parse_raw(payload: &'static str, raw: Option<&str>) -> Result<Value, TransformError> {
    match raw {
        None | Some("") => Ok(Value::Object(Default::default())),
        Some(text) => serde_json::from_str(text)
            .map_err(|source| TransformError::InvalidJson { payload, source }),
    }
}

/// Every payload must be a JSON object; serde alone would also accept a
/// list for a struct with defaulted fields.
fn shape<T: serde::de::DeserializeOwned>(
    payload: &'static str,
    value: Value,
) -> Result<T, TransformError> {
    if value.is_object() {
        return serde_json::from_value(value)
            .map_err(|source| TransformError::Shape { payload, source });
    }
    let found = match value {
        Value::Object(_) => "an object",
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
    };
    Err(TransformError::Shape {
        payload,
        source: serde_json::Error::custom(format!("expected an object, found {}", found)),
    })
}

/// Merge the diet, shopping and recipe payloads.
///
/// All three are checked for JSON syntax before any of them is interpreted,
/// so a syntax error anywhere always yields [`TransformError::InvalidJson`].
///
/// ```
/// use leftover_chef::transform::transform;
///
/// let response = transform(None, Some(r#"{"items": ["butter"]}"#), Some("")).unwrap();
/// assert_eq!(response.recipe_name, "Mystery Dish");
/// assert_eq!(response.missing_ingredients, vec!["butter"]);
/// assert!(response.nutrition.is_empty());
/// ```
pub fn transform(
    diet: Option<&str>,
    shopping: Option<&str>,
    recipe: Option<&str>,
) -> Result<RecipeResponse, TransformError> {
    let diet = parse_raw("diet", diet)?;
    let shopping = parse_raw("shopping", shopping)?;
    let recipe = parse_raw("recipe", recipe)?;

    let diet: DietPayload = shape("diet", diet)?;
    let shopping: ShoppingPayload = shape("shopping", shopping)?;
    let recipe: RecipePayload = shape("recipe", recipe)?;

    // Later duplicates overwrite earlier ones.
    let percentages: HashMap<String, Value> = diet
        .percentage_of_daily_apport
        .into_iter()
        .filter_map(|entry| Some((entry.nutrient_name?, entry.nutrient_quantity?)))
        .collect();

    let nutrition = diet
        .total_dish_nutrition
        .into_iter()
        .map(|entry| {
            let daily_value = entry
                .nutrient_name
                .as_ref()
                .and_then(|name| percentages.get(name))
                .cloned()
                .unwrap_or_else(|| Value::String(NO_DAILY_VALUE.to_string()));
            NutritionRow {
                name: entry.nutrient_name,
                amount: entry.nutrient_quantity,
                daily_value,
            }
        })
        .collect();

    Ok(RecipeResponse {
        recipe_name: recipe.dish_name.unwrap_or_else(|| MYSTERY_DISH.to_string()),
        missing_ingredients: shopping.items,
        steps: recipe.dish_steps,
        nutrition,
    })
}

/// Response returned when the pipeline itself fails.
pub fn fallback_response() -> RecipeResponse {
    RecipeResponse {
        recipe_name: "Error generating recipe".to_string(),
        missing_ingredients: Vec::new(),
        steps: vec!["Could not generate recipe. Please try again.".to_string()],
        nutrition: Vec::new(),
    }
}
