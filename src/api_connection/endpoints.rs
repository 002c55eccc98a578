use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub enum Provider {
    OpenRouter {
        api_key: String,
        base_url: String,
        site_url: String,
        app_name: String,
        recipe_model: String,
        vision_model: String,
        client: reqwest::Client,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// User turn carrying an inline image, as a `data:` URL, followed by text.
    pub fn user_with_image(data_url: String, text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
                ContentPart::Text { text: text.into() },
            ]),
        }
    }
}

/// JSON schema node, recursive for object properties and array items.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct JsonSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "additionalProperties")]
    pub additional_properties: Option<bool>,
}

impl JsonSchema {
    pub fn primitive(schema_type: &str, description: Option<&str>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description: description.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn array_of(items: JsonSchema, description: &str) -> Self {
        Self {
            schema_type: "array".to_string(),
            description: Some(description.to_string()),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    /// Object whose properties are all required.
    pub fn strict_object(properties: Vec<(&str, JsonSchema)>) -> Self {
        let required = properties.iter().map(|(name, _)| name.to_string()).collect();
        Self {
            schema_type: "object".to_string(),
            properties: Some(
                properties
                    .into_iter()
                    .map(|(name, schema)| (name.to_string(), schema))
                    .collect(),
            ),
            required: Some(required),
            additional_properties: Some(false),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonSchemaDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    pub schema: JsonSchema,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaDefinition>,
}

/// Schema for the multi-recipe reply. Mirrors the fields `recipe_parser` checks.
pub fn recipe_list_json_schema() -> JsonSchemaDefinition {
    let text = |d: &str| JsonSchema::primitive("string", Some(d));

    let nutrition = JsonSchema::strict_object(vec![
        ("calories", JsonSchema::primitive("integer", None)),
        ("protein", JsonSchema::primitive("string", None)),
        ("carbs", JsonSchema::primitive("string", None)),
        ("fat", JsonSchema::primitive("string", None)),
    ]);

    let mut difficulty = text("Easy, Medium, or Hard");
    difficulty.r#enum = Some(vec![
        "Easy".to_string(),
        "Medium".to_string(),
        "Hard".to_string(),
    ]);

    let recipe = JsonSchema::strict_object(vec![
        ("title", text("Catchy recipe title")),
        ("description", text("Short appetizing summary")),
        (
            "ingredients",
            JsonSchema::array_of(
                JsonSchema::primitive("string", None),
                "List of ingredients with measurements",
            ),
        ),
        (
            "instructions",
            JsonSchema::array_of(
                JsonSchema::primitive("string", None),
                "Step-by-step cooking steps",
            ),
        ),
        ("prepTime", text("e.g., 15 mins")),
        ("cookTime", text("e.g., 30 mins")),
        ("servings", JsonSchema::primitive("integer", None)),
        ("difficulty", difficulty),
        ("nutrition", nutrition),
        (
            "imagePrompt",
            text("A detailed descriptive prompt to generate a photo of this dish"),
        ),
    ]);

    JsonSchemaDefinition {
        name: "recipe_list_schema".to_string(),
        strict: Some(true),
        schema: JsonSchema::array_of(recipe, "Generated recipes"),
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponseMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub index: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponse {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recipe_schema_requires_every_field() {
        let schema = serde_json::to_value(recipe_list_json_schema()).unwrap();
        let item = &schema["schema"]["items"];
        let required = item["required"].as_array().unwrap();
        assert_eq!(required.len(), 10);
        assert_eq!(item["properties"]["nutrition"]["required"].as_array().unwrap().len(), 4);
        assert_eq!(item["additionalProperties"], json!(false));
    }

    #[test]
    fn test_image_message_serializes_as_content_parts() {
        let message = ChatMessage::user_with_image(
            "data:image/png;base64,AAAA".to_string(),
            "what is this",
        );
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["content"][0]["type"], "image_url");
        assert_eq!(value["content"][0]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(value["content"][1], json!({"type": "text", "text": "what is this"}));
    }

    #[test]
    fn test_text_message_serializes_as_string() {
        let value = serde_json::to_value(ChatMessage::system("hi")).unwrap();
        assert_eq!(value, json!({"role": "system", "content": "hi"}));
    }

    #[test]
    fn test_response_tolerates_null_content() {
        let raw = json!({
            "id": "gen-1",
            "created": 1,
            "model": "m",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null}}]
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        assert!(response.choices[0].message.content.is_none());
    }
}
