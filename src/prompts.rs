//! Prompt templates sent to the model provider.

use crate::ingredients::IngredientSet;

/// Number of recipes requested per generation call.
pub const RECIPES_PER_REQUEST: usize = 3;

pub const RECIPE_SYSTEM_PROMPT: &str = "/no_thinking
You are a recipe generation assistant. Respond ONLY with a JSON array of recipe objects.
Do not include any explanatory text, comments, or markdown formatting before or after the JSON.";

pub fn render_recipe_prompt(ingredients: &IngredientSet) -> String {
    format!(
        "Act as a Michelin star chef. Generate {} creative recipes using primarily these ingredients: {}.
You can include common pantry staples (salt, oil, pepper, water, flour).
Focus on diverse cuisines and healthy options.

Each recipe object must have these properties:
- \"title\": catchy recipe title
- \"description\": short appetizing summary
- \"ingredients\": array of ingredients with measurements
- \"instructions\": array of step-by-step cooking steps, in order
- \"prepTime\" and \"cookTime\": durations such as \"15 mins\"
- \"servings\": integer
- \"difficulty\": one of \"Easy\", \"Medium\" or \"Hard\"
- \"nutrition\": object with integer \"calories\" and string \"protein\", \"carbs\", \"fat\"
- \"imagePrompt\": a detailed descriptive prompt to generate a photo of this dish",
        RECIPES_PER_REQUEST,
        ingredients.display_names().join(", ")
    )
}

pub const IMAGE_EXTRACT_PROMPT: &str = "Identify all the food ingredients, fruits, vegetables, proteins, and pantry items visible in this image. List them as a simple comma-separated string of ingredient names only.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingredients::normalize;

    #[test]
    fn test_recipe_prompt_lists_display_names() {
        let prompt = render_recipe_prompt(&normalize(["Egg", "spinach", "egg"]));
        assert!(prompt.contains("these ingredients: Egg, spinach."));
        assert!(prompt.contains("Generate 3 creative recipes"));
    }
}
