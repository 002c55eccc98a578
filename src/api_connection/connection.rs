use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::endpoints::{
    recipe_list_json_schema, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Provider,
    ResponseFormat,
};
use crate::config::ProviderConfig;
use crate::error::GatewayError;
use crate::gateway::{GatewayRequest, GatewayResponse, ModelBackend, ResponseStatus};
use crate::prompts::{render_recipe_prompt, IMAGE_EXTRACT_PROMPT, RECIPE_SYSTEM_PROMPT};

#[derive(Error, Debug)]
pub enum ApiConnectionError {
    #[error("API key not configured: {0}")]
    MissingApiKey(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Map an HTTP status onto the gateway's retry classes.
pub fn classify_status(status: StatusCode) -> ResponseStatus {
    if status.is_success() {
        ResponseStatus::Ok
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ResponseStatus::RateLimited
    } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        ResponseStatus::TransientError
    } else {
        ResponseStatus::PermanentError
    }
}

/// MIME type from magic bytes; phone cameras default to JPEG.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Inline image as a `data:` URL. Input that already is a data URL (what a
/// browser file reader hands over) is passed through unchanged.
pub fn image_data_url(bytes: &[u8]) -> String {
    if bytes.starts_with(b"data:image/") {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if text.contains(";base64,") {
                return text.trim().to_string();
            }
        }
    }
    format!(
        "data:{};base64,{}",
        sniff_image_mime(bytes),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

impl Provider {
    pub fn openrouter(config: &ProviderConfig) -> Result<Self, ApiConnectionError> {
        if config.api_key.trim().is_empty() {
            return Err(ApiConnectionError::MissingApiKey(
                "OPENROUTER_API_KEY".to_string(),
            ));
        }

        let client = Client::builder().build()?;
        Ok(Self::OpenRouter {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            site_url: config.site_url.clone(),
            app_name: config.app_name.clone(),
            recipe_model: config.recipe_model.clone(),
            vision_model: config.vision_model.clone(),
            client,
        })
    }

    /// Chat request for a gateway call, without sending it.
    pub fn build_request(&self, request: &GatewayRequest) -> ChatCompletionRequest {
        let Provider::OpenRouter {
            recipe_model,
            vision_model,
            ..
        } = self;

        match request {
            GatewayRequest::TextPrompt { ingredients } => ChatCompletionRequest {
                model: recipe_model.clone(),
                messages: vec![
                    ChatMessage::system(RECIPE_SYSTEM_PROMPT),
                    ChatMessage::user(render_recipe_prompt(ingredients)),
                ],
                response_format: Some(ResponseFormat {
                    format_type: "json_schema".to_string(),
                    json_schema: Some(recipe_list_json_schema()),
                }),
                temperature: Some(0.7),
                max_tokens: Some(4096),
            },
            GatewayRequest::ImageExtract { image_bytes } => ChatCompletionRequest {
                model: vision_model.clone(),
                messages: vec![ChatMessage::user_with_image(
                    image_data_url(image_bytes),
                    IMAGE_EXTRACT_PROMPT,
                )],
                response_format: None,
                temperature: Some(0.1),
                max_tokens: Some(512),
            },
        }
    }

    pub async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let Provider::OpenRouter {
            api_key,
            base_url,
            site_url,
            app_name,
            client,
            ..
        } = self;

        let url = format!("{}/chat/completions", base_url);
        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", site_url)
            .header("X-Title", app_name)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transient(format!("failed to read response body: {}", e)))?;

        let class = classify_status(status);
        if class != ResponseStatus::Ok {
            tracing::debug!(status = status.as_u16(), body = %body, "OpenRouter returned an error status");
            return Ok(GatewayResponse::with_status(
                class,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        match serde_json::from_str::<ChatCompletionResponse>(&body) {
            Ok(chat_response) => {
                let content = chat_response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content);
                match content {
                    Some(content) => Ok(GatewayResponse::ok(content)),
                    None => Ok(GatewayResponse::with_status(
                        ResponseStatus::TransientError,
                        "no response choices received from API",
                    )),
                }
            }
            // A 2xx with an unreadable envelope is usually a truncated stream.
            Err(e) => Ok(GatewayResponse::with_status(
                ResponseStatus::TransientError,
                format!("unreadable completion envelope: {}", e),
            )),
        }
    }
}

#[async_trait]
impl ModelBackend for Provider {
    async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let chat_request = self.build_request(request);
        self.call_chat_completion(chat_request).await
    }

    fn backend_name(&self) -> &'static str {
        "openrouter"
    }
}
