use crate::error::*;
use crate::error_recovery::{classify, FailureKind};
use tracing::error;

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl CoreError {
    pub fn failure_kind(&self) -> FailureKind {
        classify(self)
    }

    /// Message of a provider rate-limit failure, if this is one.
    pub fn rate_limit_message(&self) -> Option<String> {
        match self {
            CoreError::RedditApi(RedditApiError::RateLimited { message }) => Some(message.clone()),
            CoreError::RedditApi(e @ RedditApiError::RateLimitExceeded { .. }) => {
                Some(e.to_string())
            }
            _ => None,
        }
    }
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "{}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::Llm(e) => {
                error!("LLM error details: {:?}", e);
            }
            CoreError::ActivityLog(e) => {
                error!("Activity log error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::ActivityLog(e) => format!("Activity log unavailable: {}", e),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Llm(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::ActivityLog(_) => "ACTIVITY_LOG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            RedditApiError::RateLimited { message } => {
                format!("Reddit is rate limiting this account: {}", message)
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => format!(
                "Access denied to {}. The account may be banned or the subreddit private.",
                resource
            ),
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' not found or is private.", subreddit)
            }
            RedditApiError::TokenUnavailable { .. } | RedditApiError::Throttled { .. } => {
                "Reddit is temporarily unavailable. Retrying shortly.".to_string()
            }
            RedditApiError::InvalidToken => {
                "Reddit authentication token is invalid. Re-authenticating.".to_string()
            }
            RedditApiError::RequestTimeout => "Request to Reddit timed out.".to_string(),
            RedditApiError::SubmissionRejected { message, .. } => {
                format!("Reddit rejected the comment: {}", message)
            }
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED".to_string(),
            RedditApiError::RateLimited { .. } => "REDDIT_RATELIMIT".to_string(),
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT".to_string(),
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN".to_string(),
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND".to_string(),
            RedditApiError::NotFound { .. } => "REDDIT_NOT_FOUND".to_string(),
            RedditApiError::TokenUnavailable { .. } => "REDDIT_TOKEN_UNAVAILABLE".to_string(),
            RedditApiError::Throttled { .. } => "REDDIT_THROTTLED".to_string(),
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN".to_string(),
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR".to_string(),
            RedditApiError::SubmissionRejected { .. } => "REDDIT_SUBMISSION_REJECTED".to_string(),
        }
    }
}

impl ErrorExt for LlmError {
    fn log_error(&self) -> &Self {
        error!("LlmError: {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LlmError::InvalidApiKey { provider } => format!(
                "Invalid API key for {}. Please update your credentials.",
                provider
            ),
            LlmError::RateLimitExceeded { provider } => {
                format!("Rate limit exceeded for {}. Retrying shortly.", provider)
            }
            LlmError::ModelNotAvailable { model } => format!(
                "Model '{}' is not available. Please configure a different model.",
                model
            ),
            LlmError::ContentFiltered { .. } => {
                "Content was filtered by the AI provider's safety systems.".to_string()
            }
            LlmError::ServiceUnavailable { provider } => {
                format!("{} service is temporarily unavailable.", provider)
            }
            LlmError::InsufficientCredits { provider } => {
                format!("The {} account has run out of credits.", provider)
            }
            _ => "AI service error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            LlmError::InvalidApiKey { .. } => "LLM_INVALID_API_KEY".to_string(),
            LlmError::RateLimitExceeded { .. } => "LLM_RATE_LIMIT".to_string(),
            LlmError::ModelNotAvailable { .. } => "LLM_MODEL_NOT_AVAILABLE".to_string(),
            LlmError::ContentFiltered { .. } => "LLM_CONTENT_FILTERED".to_string(),
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE".to_string(),
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT".to_string(),
            LlmError::InsufficientCredits { .. } => "LLM_INSUFFICIENT_CREDITS".to_string(),
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE".to_string(),
            LlmError::RequestRejected { .. } => "LLM_REQUEST_REJECTED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Required file '{}' was not found.", path)
            }
            ConfigError::Unreadable { path, source } => {
                format!("Could not read '{}': {}", path, source)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariables { var_names } => format!(
                "Environment variables required but not set: {}",
                var_names.join(", ")
            ),
            ConfigError::EmptyForumList { path } => {
                format!("Add at least one subreddit to '{}'.", path)
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::Unreadable { .. } => "CONFIG_UNREADABLE".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariables { .. } => {
                "CONFIG_MISSING_ENV_VAR".to_string()
            }
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::EmptyForumList { .. } => "CONFIG_EMPTY_FORUM_LIST".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}
