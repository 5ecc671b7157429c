//! Classification of provider failures.
//!
//! Every error coming back from the forum or generation provider is sorted into
//! one of a few kinds, and the kind alone decides what the caller does next:
//! retry within the adapter, back off the whole loop, skip the unit of work, or
//! refuse to start.

use crate::{CoreError, LlmError, RedditApiError};
use std::fmt;

/// How a failure must be handled by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network or provider hiccup; retried by the adapter after a short pause.
    Transient,
    /// The provider asked us to slow down; handled by the loop's backoff.
    RateLimited,
    /// Retrying will not help; the caller skips the item or forum.
    Permanent,
    /// Invalid setup; fatal at startup.
    Configuration,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate-limited",
            FailureKind::Permanent => "permanent",
            FailureKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Determine the failure kind for a given error
pub fn classify(error: &CoreError) -> FailureKind {
    match error {
        CoreError::RedditApi(reddit_error) => match reddit_error {
            RedditApiError::RateLimited { .. } | RedditApiError::RateLimitExceeded { .. } => {
                FailureKind::RateLimited
            }
            RedditApiError::ServerError { status_code } if *status_code >= 500 => {
                FailureKind::Transient
            }
            RedditApiError::RequestTimeout
            | RedditApiError::Throttled { .. }
            | RedditApiError::TokenUnavailable { .. } => FailureKind::Transient,
            // An expired token is refreshed on the next attempt
            RedditApiError::InvalidToken => FailureKind::Transient,
            RedditApiError::AuthenticationFailed { .. } => FailureKind::Configuration,
            _ => FailureKind::Permanent,
        },

        // Generation has no loop-level backoff, so its rate limits are retried in place
        CoreError::Llm(llm_error) => match llm_error {
            LlmError::RateLimitExceeded { .. }
            | LlmError::ServiceUnavailable { .. }
            | LlmError::RequestTimeout { .. } => FailureKind::Transient,
            LlmError::InvalidApiKey { .. } => FailureKind::Configuration,
            _ => FailureKind::Permanent,
        },

        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() || reqwest_error.is_request()
            {
                FailureKind::Transient
            } else {
                FailureKind::Permanent
            }
        }
        CoreError::Config(_) => FailureKind::Configuration,

        CoreError::ActivityLog(_)
        | CoreError::Io(_)
        | CoreError::Serialization(_)
        | CoreError::Internal { .. } => FailureKind::Permanent,
    }
}
