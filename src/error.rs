use thiserror::Error;

/// Domain errors surfaced by the engine. HTTP handlers map these onto status
/// codes; the cleanup job logs them and decides whether to abort the run or
/// skip the offending item.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration missing required field: {0}")]
    ConfigMissing(String),

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("keep request already processed for this item")]
    RequestAlreadyProcessed,

    #[error("cache miss")]
    CacheMiss,

    #[error("no streaming history for item")]
    StatsItemNotFound,

    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Best-effort HTTP status this error should be reported under.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::ValidationFailed(_) => 400,
            EngineError::RequestAlreadyProcessed => 409,
            EngineError::UpstreamUnavailable(_) => 502,
            EngineError::CacheMiss | EngineError::StatsItemNotFound => 404,
            EngineError::ConfigMissing(_) | EngineError::Fatal(_) => 500,
        }
    }
}
