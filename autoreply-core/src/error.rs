use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Activity log error: {0}")]
    ActivityLog(#[from] ActivityLogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// The token endpoint answered with something other than a grant or a
    /// credential rejection.
    #[error("Token endpoint unavailable: {reason}")]
    TokenUnavailable { reason: String },

    /// Reddit refused the action with a `RATELIMIT` error; the message usually
    /// says how many minutes to wait.
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// HTTP 429 on a read; waited out by the caller's retry, not the loop's backoff.
    #[error("Too many requests to {resource}")]
    Throttled { resource: String },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Submission rejected ({code}): {message}")]
    SubmissionRejected { code: String, message: String },
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API key invalid or missing for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded for {provider}")]
    RateLimitExceeded { provider: String },

    #[error("Model not available: {model}")]
    ModelNotAvailable { model: String },

    #[error("Content filtered by provider: {reason}")]
    ContentFiltered { reason: String },

    #[error("Provider service unavailable: {provider}")]
    ServiceUnavailable { provider: String },

    #[error("Request timeout for {provider}")]
    RequestTimeout { provider: String },

    #[error("Insufficient credits for {provider}")]
    InsufficientCredits { provider: String },

    #[error("Invalid response format from {provider}")]
    InvalidResponseFormat { provider: String },

    #[error("Request rejected by {provider} ({status_code}): {message}")]
    RequestRejected {
        provider: String,
        status_code: u16,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variables not set: {}", .var_names.join(", "))]
    MissingEnvironmentVariables { var_names: Vec<String> },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Forum list is empty: {path}")]
    EmptyForumList { path: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum ActivityLogError {
    #[error("Failed to read activity log {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to activity log {path}: {source}")]
    Append {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create activity log {path}: {source}")]
    Initialize {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
