//! Orchestrates normalize → cache → gateway → validate.

use std::future::Future;
use std::sync::Arc;

use crate::api_connection::connection::ApiConnectionError;
use crate::api_connection::endpoints::Provider;
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::gateway::{FakeBackend, ModelBackend, ModelGateway};
use crate::ingredients::{normalize, split_extracted, IngredientSet};
use crate::recipe_parser::{parse_model_payload, validate_batch, Recipe};
use crate::request_cache::{CacheStats, RequestCache};

#[derive(Debug, Clone)]
pub struct RecipePipeline {
    gateway: Arc<ModelGateway>,
    cache: RequestCache,
    clock: Arc<dyn Clock>,
}

impl RecipePipeline {
    pub fn new(gateway: ModelGateway, cache: RequestCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            cache,
            clock,
        }
    }

    /// Build against OpenRouter, or the canned fake backend when offline.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ApiConnectionError> {
        let backend: Arc<dyn ModelBackend> = match &config.provider {
            Some(provider) => Arc::new(Provider::openrouter(provider)?),
            None => {
                tracing::info!("No provider configured, using offline sample responses");
                Arc::new(FakeBackend::with_sample_responses())
            }
        };

        Ok(Self::new(
            ModelGateway::new(backend, config.retry.clone()),
            RequestCache::new(config.cache.clone()),
            Arc::new(SystemClock),
        ))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Validated recipes for the given pantry items, in the order the model
    /// produced them. Identical ingredient sets share cached and in-flight work.
    pub async fn generate<S: AsRef<str>>(&self, raw_items: &[S]) -> Result<Vec<Recipe>, PipelineError> {
        let ingredients = normalize(raw_items);
        if ingredients.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let fingerprint = ingredients.fingerprint();
        let gateway = Arc::clone(&self.gateway);
        let clock = Arc::clone(&self.clock);

        let recipes = self
            .cache
            .get_or_compute(fingerprint, move || async move {
                let body = gateway.generate_recipes(&ingredients).await?;
                let payload = parse_model_payload(&body)?;
                let recipes = validate_batch(&payload, clock.now_millis())?;
                tracing::info!(
                    ingredients = ingredients.len(),
                    recipes = recipes.len(),
                    "Generated recipes"
                );
                Ok::<_, PipelineError>(recipes)
            })
            .await?;

        Ok(recipes.as_ref().clone())
    }

    /// [`RecipePipeline::generate`] that gives up with `Cancelled` once `cancel`
    /// completes. Only this caller stops waiting; a shared upstream call keeps
    /// running and still fills the cache.
    pub async fn generate_with_cancel<S, C>(
        &self,
        raw_items: &[S],
        cancel: C,
    ) -> Result<Vec<Recipe>, PipelineError>
    where
        S: AsRef<str>,
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.generate(raw_items) => result,
            _ = cancel => {
                tracing::debug!("Recipe request cancelled by caller");
                Err(PipelineError::Cancelled)
            }
        }
    }

    /// Ingredients visible in a photo. Not cached.
    pub async fn extract_from_image(&self, image_bytes: &[u8]) -> Result<IngredientSet, PipelineError> {
        if image_bytes.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let text = self.gateway.extract_ingredients(image_bytes).await?;
        let ingredients = normalize(split_extracted(&text));
        if ingredients.is_empty() {
            return Err(PipelineError::NoIngredientsDetected);
        }

        tracing::info!(found = ingredients.len(), "Extracted ingredients from image");
        Ok(ingredients)
    }
}
