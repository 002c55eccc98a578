//! Turns untrusted model output into validated [`Recipe`] values.
//!
//! Validation is per recipe: a bad candidate is logged and dropped, and the batch
//! only fails when nothing survives.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Case-insensitive match against the closed set.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: u32,
    pub protein: String,
    pub carbs: String,
    pub fat: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub prep_time: String,
    pub cook_time: String,
    pub servings: u32,
    pub difficulty: Difficulty,
    pub nutrition: Nutrition,
    pub image_prompt: String,
}

/// Why a single candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    NotAnObject,
    Missing(&'static str),
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    Empty(&'static str),
    OutOfRange(&'static str),
    UnknownDifficulty(String),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::NotAnObject => write!(f, "candidate is not a JSON object"),
            FieldError::Missing(field) => write!(f, "missing field '{}'", field),
            FieldError::WrongType { field, expected } => {
                write!(f, "field '{}' should be {}", field, expected)
            }
            FieldError::Empty(field) => write!(f, "field '{}' is empty", field),
            FieldError::OutOfRange(field) => write!(f, "field '{}' is out of range", field),
            FieldError::UnknownDifficulty(value) => {
                write!(f, "unknown difficulty '{}'", value)
            }
        }
    }
}

/// Decode the raw text of a model reply into JSON.
///
/// Strips markdown code fences the model tends to add even when told not to.
pub fn parse_model_payload(text: &str) -> Result<Value, ValidationError> {
    let mut content = text.trim();
    if content.starts_with("```") && content.ends_with("```") && content.len() >= 6 {
        content = content
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
    }

    if content.is_empty() {
        return Err(ValidationError::MalformedPayload(
            "model returned empty content".to_string(),
        ));
    }

    serde_json::from_str(content).map_err(|e| {
        tracing::debug!(error = %e, content = content, "Model payload is not valid JSON");
        ValidationError::MalformedPayload(e.to_string())
    })
}

/// Validate every candidate in a multi-recipe reply, keeping the ones that pass
/// in their original order.
pub fn validate_batch(raw: &Value, generated_at_ms: u64) -> Result<Vec<Recipe>, ValidationError> {
    let candidates = match raw {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("recipes") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ValidationError::MalformedPayload(
                    "expected an array of recipes".to_string(),
                ))
            }
        },
        _ => {
            return Err(ValidationError::MalformedPayload(
                "expected an array of recipes".to_string(),
            ))
        }
    };

    let recipes: Vec<Recipe> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            match validate_recipe(candidate, index, generated_at_ms) {
                Ok(recipe) => Some(recipe),
                Err(reason) => {
                    tracing::warn!(index, %reason, "Dropping invalid recipe candidate");
                    None
                }
            }
        })
        .collect();

    if recipes.is_empty() {
        return Err(ValidationError::NoValidRecipes {
            candidates: candidates.len(),
        });
    }

    tracing::debug!(
        kept = recipes.len(),
        candidates = candidates.len(),
        "Validated recipe batch"
    );
    Ok(recipes)
}

/// Validate one candidate. `index` is its position in the model's reply and
/// becomes part of the generated id.
pub fn validate_recipe(
    raw: &Value,
    index: usize,
    generated_at_ms: u64,
) -> Result<Recipe, FieldError> {
    let obj = raw.as_object().ok_or(FieldError::NotAnObject)?;

    let title = required_text(obj, "title", &[])?;
    let description = optional_text(obj, "description")?;
    let ingredients = required_text_list(obj, "ingredients")?;
    let instructions = required_text_list(obj, "instructions")?;
    let prep_time = label_text(obj, "prepTime", &["prep_time"])?;
    let cook_time = label_text(obj, "cookTime", &["cook_time"])?;

    let servings = required_integer(obj, "servings", &[])?;
    if servings < 1 {
        return Err(FieldError::OutOfRange("servings"));
    }
    let servings = u32::try_from(servings).map_err(|_| FieldError::OutOfRange("servings"))?;

    let difficulty_raw = required_text(obj, "difficulty", &[])?;
    let difficulty = Difficulty::parse(&difficulty_raw)
        .ok_or(FieldError::UnknownDifficulty(difficulty_raw))?;

    let nutrition = match field(obj, "nutrition", &[]) {
        Some(Value::Object(n)) => validate_nutrition(n)?,
        Some(_) => {
            return Err(FieldError::WrongType {
                field: "nutrition",
                expected: "an object",
            })
        }
        None => return Err(FieldError::Missing("nutrition")),
    };

    let image_prompt = label_text(obj, "imagePrompt", &["image_prompt"])?;

    Ok(Recipe {
        id: format!("recipe-{}-{}", index, generated_at_ms),
        title,
        description,
        ingredients,
        instructions,
        prep_time,
        cook_time,
        servings,
        difficulty,
        nutrition,
        image_prompt,
    })
}

fn validate_nutrition(obj: &Map<String, Value>) -> Result<Nutrition, FieldError> {
    let calories = required_integer(obj, "calories", &[])?;
    if calories < 0 {
        return Err(FieldError::OutOfRange("calories"));
    }
    let calories = u32::try_from(calories).map_err(|_| FieldError::OutOfRange("calories"))?;

    Ok(Nutrition {
        calories,
        protein: magnitude(obj, "protein")?,
        carbs: magnitude(obj, "carbs")?,
        fat: magnitude(obj, "fat")?,
    })
}

fn field<'a>(
    obj: &'a Map<String, Value>,
    name: &'static str,
    aliases: &[&'static str],
) -> Option<&'a Value> {
    obj.get(name)
        .or_else(|| aliases.iter().find_map(|alias| obj.get(*alias)))
        .filter(|v| !v.is_null())
}

fn required_text(
    obj: &Map<String, Value>,
    name: &'static str,
    aliases: &[&'static str],
) -> Result<String, FieldError> {
    match field(obj, name, aliases) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(FieldError::Empty(name))
            } else {
                Ok(trimmed.to_string())
            }
        }
        Some(_) => Err(FieldError::WrongType {
            field: name,
            expected: "a string",
        }),
        None => Err(FieldError::Missing(name)),
    }
}

/// Must be present as a string; blank is allowed.
fn label_text(
    obj: &Map<String, Value>,
    name: &'static str,
    aliases: &[&'static str],
) -> Result<String, FieldError> {
    match field(obj, name, aliases) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(FieldError::WrongType {
            field: name,
            expected: "a string",
        }),
        None => Err(FieldError::Missing(name)),
    }
}

/// Missing becomes an empty string.
fn optional_text(obj: &Map<String, Value>, name: &'static str) -> Result<String, FieldError> {
    match field(obj, name, &[]) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(FieldError::WrongType {
            field: name,
            expected: "a string",
        }),
        None => Ok(String::new()),
    }
}

fn required_text_list(obj: &Map<String, Value>, name: &'static str) -> Result<Vec<String>, FieldError> {
    let items = match field(obj, name, &[]) {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(FieldError::WrongType {
                field: name,
                expected: "an array of strings",
            })
        }
        None => return Err(FieldError::Missing(name)),
    };

    if items.is_empty() {
        return Err(FieldError::Empty(name));
    }

    items
        .iter()
        .map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Value::String(_) => Err(FieldError::Empty(name)),
            _ => Err(FieldError::WrongType {
                field: name,
                expected: "an array of strings",
            }),
        })
        .collect()
}

/// Integers, integral floats and numeric strings (`"4"`, `" 250 "`).
fn required_integer(
    obj: &Map<String, Value>,
    name: &'static str,
    aliases: &[&'static str],
) -> Result<i64, FieldError> {
    let wrong_type = FieldError::WrongType {
        field: name,
        expected: "an integer",
    };
    match field(obj, name, aliases) {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Err(FieldError::OutOfRange(name))
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
                    .ok_or(wrong_type)
            }
        }
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| wrong_type),
        Some(_) => Err(wrong_type),
        None => Err(FieldError::Missing(name)),
    }
}

/// Free-text magnitudes like `"10g"`; bare numbers are kept as their text form.
fn magnitude(obj: &Map<String, Value>, name: &'static str) -> Result<String, FieldError> {
    match field(obj, name, &[]) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(FieldError::Empty(name)),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(FieldError::WrongType {
            field: name,
            expected: "a string",
        }),
        None => Err(FieldError::Missing(name)),
    }
}
