use crate::{ConfigError, CoreError};
use serde::Deserialize;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LLM_MODEL: &str = "mistralai/mistral-7b-instruct:free";
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Tunables for the scheduler. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    pub max_comments_per_subreddit: u32,
    pub min_sleep_seconds: u64,
    pub max_sleep_seconds: u64,
    pub cycle_sleep_minutes: u64,
    /// Backoff used when a rate-limit message carries no wait hint.
    pub rate_limit_sleep_seconds: u64,
    pub max_retries: u32,
    pub min_post_score: i64,
    pub blacklisted_phrases: Vec<String>,
    pub max_title_length: usize,
    pub posts_per_request: u32,
    pub max_daily_comments: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_comments_per_subreddit: 1,
            min_sleep_seconds: 3600,
            max_sleep_seconds: 7200,
            cycle_sleep_minutes: 180,
            rate_limit_sleep_seconds: 3600,
            max_retries: 3,
            min_post_score: 10,
            blacklisted_phrases: [
                "[removed]",
                "[deleted]",
                "mod post",
                "moderator",
                "announcement",
                "sticky",
                "megathread",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_title_length: 300,
            posts_per_request: 10,
            max_daily_comments: 10,
        }
    }
}

impl BotConfig {
    /// Loads tunables from a TOML file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let config = match path {
            Some(path) => {
                let text = read_input_file(path)?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_sleep_seconds > self.max_sleep_seconds {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "min_sleep_seconds ({}) exceeds max_sleep_seconds ({})",
                    self.min_sleep_seconds, self.max_sleep_seconds
                ),
            });
        }
        let positive = [
            ("max_retries", u64::from(self.max_retries)),
            ("posts_per_request", u64::from(self.posts_per_request)),
            ("max_daily_comments", u64::from(self.max_daily_comments)),
            (
                "max_comments_per_subreddit",
                u64::from(self.max_comments_per_subreddit),
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn cycle_sleep(&self) -> Duration {
        Duration::from_secs(self.cycle_sleep_minutes * 60)
    }

    pub fn rate_limit_sleep(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sleep_seconds)
    }
}

/// Reads a whole input file. Only a missing file is `FileNotFound`; any other
/// I/O failure keeps its cause.
pub(crate) fn read_input_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| {
        let path = path.display().to_string();
        if source.kind() == ErrorKind::NotFound {
            ConfigError::FileNotFound { path }
        } else {
            ConfigError::Unreadable { path, source }
        }
    })
}

/// Secrets and identity read from the environment.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub reddit_username: String,
    pub reddit_password: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,
}

impl Credentials {
    pub const REQUIRED_VARS: [&'static str; 6] = [
        "REDDIT_USERNAME",
        "REDDIT_PASSWORD",
        "CLIENT_ID",
        "CLIENT_SECRET",
        "USER_AGENT",
        "OPENROUTER_API_KEY",
    ];

    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds credentials from any key/value source, reporting every missing
    /// required variable at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let missing: Vec<String> = Self::REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| read(*name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvironmentVariables { var_names: missing });
        }

        let required = |name: &str| read(name).unwrap_or_default();
        Ok(Self {
            reddit_username: required("REDDIT_USERNAME"),
            reddit_password: required("REDDIT_PASSWORD"),
            client_id: required("CLIENT_ID"),
            client_secret: required("CLIENT_SECRET"),
            user_agent: required("USER_AGENT"),
            openrouter_api_key: required("OPENROUTER_API_KEY"),
            llm_model: read("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_base_url: read("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
        })
    }

    /// Client id with everything past the first five characters hidden.
    pub fn masked_client_id(&self) -> String {
        mask(&self.client_id, 5)
    }
}

fn mask(value: &str, shown: usize) -> String {
    let visible: String = value.chars().take(shown).collect();
    format!("{}...", visible)
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("reddit_username", &self.reddit_username)
            .field("reddit_password", &"<redacted>")
            .field("client_id", &self.masked_client_id())
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("openrouter_api_key", &"<redacted>")
            .field("llm_model", &self.llm_model)
            .field("llm_base_url", &self.llm_base_url)
            .finish()
    }
}
