use autoreply_core::{CoreError, LlmError, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod types;

pub use types::{ChatRequest, ChatResponse, Message};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You're a friendly, knowledgeable person who enjoys \
helping others with their questions. Answer the question in the post title directly and \
accurately, in a conversational tone. Keep it short: two or three paragraphs at most. \
If you are not sure about something, say so instead of guessing.";

const DEFAULT_REFERER: &str = "http://localhost:5000";
const DEFAULT_TITLE: &str = "Autoreply";

/// A text-generation backend. An `Ok` with empty text means the provider had
/// nothing to say and the item should be skipped.
pub trait LlmProvider {
    async fn generate(&self, prompt: &str) -> Result<String, CoreError>;
}

/// OpenRouter, or any OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct OpenRouterProvider {
    http_client: Client,
    api_key: String,
    model: String,
    base_url: String,
    system_prompt: String,
    referer: String,
    title: String,
}

impl OpenRouterProvider {
    pub const NAME: &'static str = "openrouter";

    pub fn new(api_key: impl Into<String>) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            model: DEFAULT_LLM_MODEL.to_string(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the `HTTP-Referer` and `X-Title` attribution headers.
    pub fn with_attribution(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest::new(self.model.clone())
            .message(Message::system(self.system_prompt.clone()))
            .message(Message::user(prompt))
            .max_tokens(600)
    }

    fn status_error(&self, status: StatusCode, body: &str) -> LlmError {
        let provider = Self::NAME.to_string();
        match status {
            StatusCode::UNAUTHORIZED => LlmError::InvalidApiKey { provider },
            StatusCode::PAYMENT_REQUIRED => LlmError::InsufficientCredits { provider },
            StatusCode::FORBIDDEN => LlmError::ContentFiltered {
                reason: body.chars().take(200).collect(),
            },
            StatusCode::NOT_FOUND => LlmError::ModelNotAvailable {
                model: self.model.clone(),
            },
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded { provider },
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                LlmError::RequestTimeout { provider }
            }
            s if s.is_server_error() => LlmError::ServiceUnavailable { provider },
            s => LlmError::RequestRejected {
                provider,
                status_code: s.as_u16(),
                message: body.chars().take(200).collect(),
            },
        }
    }
}

impl LlmProvider for OpenRouterProvider {
    async fn generate(&self, prompt: &str) -> Result<String, CoreError> {
        let start = Instant::now();
        let request = self.build_request(prompt);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Generation request failed");
                if e.is_timeout() {
                    CoreError::Llm(LlmError::RequestTimeout {
                        provider: Self::NAME.to_string(),
                    })
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Generation API error");
            return Err(self.status_error(status, &error_text).into());
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Unreadable generation response");
            LlmError::InvalidResponseFormat {
                provider: Self::NAME.to_string(),
            }
        })?;

        let text = chat_response.first_text();
        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            chars = text.len(),
            "Chat completion finished"
        );
        Ok(text)
    }
}
