//! Scripted model backend for tests and offline runs.
//!
//! Replies are consumed in order per request kind. When a script runs dry the
//! configured default body is returned, or a permanent error if there is none.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{GatewayRequest, GatewayResponse, ModelBackend, ResponseStatus};
use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct FakeReply {
    outcome: Result<GatewayResponse, GatewayError>,
    delay: Duration,
}

impl FakeReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(ResponseStatus::Ok, body)
    }

    pub fn status(status: ResponseStatus, body: impl Into<String>) -> Self {
        Self {
            outcome: Ok(GatewayResponse::with_status(status, body)),
            delay: Duration::ZERO,
        }
    }

    /// Transport-level failure: no response at all.
    pub fn fail(error: GatewayError) -> Self {
        Self {
            outcome: Err(error),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    recipe_script: Mutex<VecDeque<FakeReply>>,
    image_script: Mutex<VecDeque<FakeReply>>,
    default_recipe_body: Option<String>,
    default_image_body: Option<String>,
    latency: Duration,
    recipe_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that answers every request with a plausible canned reply.
    pub fn with_sample_responses() -> Self {
        Self::new()
            .with_default_recipe_body(SAMPLE_RECIPES)
            .with_default_image_body(SAMPLE_EXTRACTION)
    }

    pub fn with_default_recipe_body(mut self, body: &str) -> Self {
        self.default_recipe_body = Some(body.to_string());
        self
    }

    pub fn with_default_image_body(mut self, body: &str) -> Self {
        self.default_image_body = Some(body.to_string());
        self
    }

    /// Delay applied to every call on top of any per-reply delay.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_recipe_reply(&self, reply: FakeReply) {
        self.recipe_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    pub fn push_image_reply(&self, reply: FakeReply) {
        self.image_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    pub fn recipe_calls(&self) -> usize {
        self.recipe_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self, request: &GatewayRequest) -> FakeReply {
        let (script, default_body) = match request {
            GatewayRequest::TextPrompt { .. } => {
                self.recipe_calls.fetch_add(1, Ordering::SeqCst);
                (&self.recipe_script, &self.default_recipe_body)
            }
            GatewayRequest::ImageExtract { .. } => {
                self.image_calls.fetch_add(1, Ordering::SeqCst);
                (&self.image_script, &self.default_image_body)
            }
        };

        let scripted = script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        scripted.unwrap_or_else(|| match default_body {
            Some(body) => FakeReply::ok(body.clone()),
            None => FakeReply::status(
                ResponseStatus::PermanentError,
                format!("FakeBackend: no reply scripted for {}", request.kind()),
            ),
        })
    }
}

#[async_trait]
impl ModelBackend for FakeBackend {
    async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let reply = self.next_reply(request);
        let delay = self.latency + reply.delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.outcome
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

const SAMPLE_RECIPES: &str = r#"```json
[
  {
    "title": "Pantry Frittata",
    "description": "A quick oven-finished omelette that uses up whatever is on hand.",
    "ingredients": ["4 eggs", "1 cup chopped vegetables", "1 tbsp olive oil", "Salt and pepper"],
    "instructions": ["Whisk the eggs with salt and pepper.", "Soften the vegetables in oil.", "Pour in the eggs and cook until set."],
    "prepTime": "10 mins",
    "cookTime": "15 mins",
    "servings": 2,
    "difficulty": "easy",
    "nutrition": {"calories": 320, "protein": "20g", "carbs": "8g", "fat": "22g"},
    "imagePrompt": "A golden frittata in a cast iron pan, overhead shot, natural light"
  },
  {
    "title": "Rustic Flatbread",
    "description": "Soft skillet flatbreads ready in under half an hour.",
    "ingredients": ["2 cups flour", "3/4 cup water", "1 tsp salt", "2 tbsp oil"],
    "instructions": ["Mix flour, salt, water and oil into a dough.", "Rest for 10 minutes.", "Roll out and cook in a hot skillet."],
    "prepTime": "15 mins",
    "cookTime": "10 mins",
    "servings": "4",
    "difficulty": "Medium",
    "nutrition": {"calories": "260", "protein": "6g", "carbs": "45g", "fat": "7g"},
    "imagePrompt": "Charred flatbreads stacked on a wooden board"
  }
]
```"#;

const SAMPLE_EXTRACTION: &str = "eggs, spinach, Feta cheese, cherry tomatoes, olive oil";
