pub mod api_connection;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ingredients;
pub mod pipeline;
pub mod prompts;
pub mod recipe_parser;
pub mod request_cache;

pub use error::{GatewayError, PipelineError, ValidationError};
pub use ingredients::{normalize, Fingerprint, IngredientSet};
pub use pipeline::RecipePipeline;
pub use recipe_parser::{Difficulty, Nutrition, Recipe};
