//! Configuration from environment variables.
//!
//! - `OPENROUTER_API_KEY` (required unless offline)
//! - `PANTRY_CHEF_OFFLINE`: "true"/"1" answers from canned responses, no network
//! - `PANTRY_CHEF_BASE_URL`, `PANTRY_CHEF_RECIPE_MODEL`, `PANTRY_CHEF_VISION_MODEL`
//! - `PANTRY_CHEF_TIMEOUT_SECS`, `PANTRY_CHEF_MAX_RETRIES`, `PANTRY_CHEF_BACKOFF_MS`
//! - `PANTRY_CHEF_CACHE_CAPACITY`, `PANTRY_CHEF_CACHE_TTL_SECS`, `PANTRY_CHEF_FAILURE_TTL_SECS`
//! - `SITE_URL`, `APP_NAME`: attribution headers sent to OpenRouter

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::RetryPolicy;
use crate::request_cache::CacheConfig;

pub const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_RECIPE_MODEL: &str = "google/gemini-3-flash-preview";
pub const DEFAULT_VISION_MODEL: &str = "google/gemini-2.5-flash-image";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub recipe_model: String,
    pub vision_model: String,
    pub site_url: String,
    pub app_name: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            recipe_model: DEFAULT_RECIPE_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            site_url: "http://localhost:3000".to_string(),
            app_name: "PantryChef".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// `None` runs offline against the canned fake backend.
    pub provider: Option<ProviderConfig>,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
}

impl PipelineConfig {
    /// Reads the process environment. `.env` is loaded by the binary at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let offline = lookup("PANTRY_CHEF_OFFLINE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let provider = if offline {
            None
        } else {
            let defaults = ProviderConfig::default();
            let api_key = lookup(API_KEY_ENV_VAR)
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(API_KEY_ENV_VAR.to_string()))?;
            Some(ProviderConfig {
                api_key,
                base_url: lookup("PANTRY_CHEF_BASE_URL").unwrap_or(defaults.base_url),
                recipe_model: lookup("PANTRY_CHEF_RECIPE_MODEL").unwrap_or(defaults.recipe_model),
                vision_model: lookup("PANTRY_CHEF_VISION_MODEL").unwrap_or(defaults.vision_model),
                site_url: lookup("SITE_URL").unwrap_or(defaults.site_url),
                app_name: lookup("APP_NAME").unwrap_or(defaults.app_name),
            })
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            attempt_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PANTRY_CHEF_TIMEOUT_SECS",
                retry_defaults.attempt_timeout.as_secs(),
            )?),
            max_retries: parse_or(&lookup, "PANTRY_CHEF_MAX_RETRIES", retry_defaults.max_retries)?,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "PANTRY_CHEF_BACKOFF_MS",
                retry_defaults.base_delay.as_millis() as u64,
            )?),
            max_jitter: retry_defaults.max_jitter,
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            capacity: parse_or(&lookup, "PANTRY_CHEF_CACHE_CAPACITY", cache_defaults.capacity)?,
            success_ttl: Duration::from_secs(parse_or(
                &lookup,
                "PANTRY_CHEF_CACHE_TTL_SECS",
                cache_defaults.success_ttl.as_secs(),
            )?),
            failure_ttl: Duration::from_secs(parse_or(
                &lookup,
                "PANTRY_CHEF_FAILURE_TTL_SECS",
                cache_defaults.failure_ttl.as_secs(),
            )?),
        };

        Ok(Self {
            provider,
            retry,
            cache,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
