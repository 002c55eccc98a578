use thiserror::Error;

/// Failures at the model provider boundary.
///
/// `Timeout`, `RateLimited` and `Transient` are retried inside the gateway and
/// only ever reach callers wrapped in `Exhausted`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Model request timed out")]
    Timeout,

    #[error("Model provider rate limited the request")]
    RateLimited,

    #[error("Transient upstream failure: {0}")]
    Transient(String),

    #[error("Upstream rejected the request: {0}")]
    Permanent(String),

    #[error("Gave up after {attempts} attempts, last error: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout | GatewayError::RateLimited | GatewayError::Transient(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Model payload is not in the expected shape: {0}")]
    MalformedPayload(String),

    #[error("None of the {candidates} candidate recipes passed validation")]
    NoValidRecipes { candidates: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No ingredients were provided")]
    EmptyInput,

    #[error("Upstream model call failed: {0}")]
    UpstreamFailed(GatewayError),

    #[error("Model returned no usable recipes: {0}")]
    NoUsableResult(ValidationError),

    #[error("Model returned a malformed response: {0}")]
    MalformedUpstream(ValidationError),

    #[error("No ingredients could be identified in the image")]
    NoIngredientsDetected,

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Recipe generation task stopped unexpectedly: {0}")]
    ComputeAborted(String),
}

impl PipelineError {
    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::EmptyInput => "Add at least one ingredient to get recipe ideas.",
            PipelineError::UpstreamFailed(GatewayError::Permanent(_)) => {
                "The recipe service refused this request. Try different ingredients."
            }
            PipelineError::UpstreamFailed(_) => {
                "The recipe service is unavailable right now, try again shortly."
            }
            PipelineError::NoUsableResult(_) => {
                "Failed to cook up some recipes. Please try again!"
            }
            PipelineError::MalformedUpstream(_) => {
                "The recipe service sent back something unreadable. Please try again!"
            }
            PipelineError::NoIngredientsDetected => {
                "Could not see any ingredients in the photo. Try typing them instead!"
            }
            PipelineError::Cancelled => "The request was cancelled.",
            PipelineError::ComputeAborted(_) => "Something went wrong in the kitchen. Please try again!",
        }
    }
}

impl From<GatewayError> for PipelineError {
    fn from(err: GatewayError) -> Self {
        PipelineError::UpstreamFailed(err)
    }
}

impl From<ValidationError> for PipelineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NoValidRecipes { .. } => PipelineError::NoUsableResult(err),
            ValidationError::MalformedPayload(_) => PipelineError::MalformedUpstream(err),
        }
    }
}
