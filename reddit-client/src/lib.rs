use autoreply_core::{CandidateItem, CoreError, LookbackWindow, RedditApiError};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod api;

pub use api::{RedditApiClient, RedditPostData, RedditUserData, SubmittedReply};

const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const ACCESS_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before Reddit says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The forum-provider contract the scheduler drives.
///
/// Failures come back as [`CoreError`]; callers decide what is retryable via
/// `CoreError::failure_kind`.
pub trait ForumGateway {
    async fn list_top_items(
        &self,
        forum: &str,
        window: LookbackWindow,
        limit: u32,
    ) -> Result<Vec<CandidateItem>, CoreError>;

    async fn submit_reply(&self, item_id: &str, body: &str) -> Result<SubmittedReply, CoreError>;
}

#[derive(Debug, Clone)]
pub struct RedditOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl RedditOAuth2Config {
    pub fn new(
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
        user_agent: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            username,
            password,
            user_agent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
}

impl RedditToken {
    /// True once the token is inside the refresh margin.
    pub fn needs_refresh(&self) -> bool {
        SystemTime::now() + TOKEN_REFRESH_MARGIN >= self.expires_at
    }
}

/// Script-app Reddit client: password grant, cached bearer token, and the
/// listing/comment calls the scheduler needs.
pub struct RedditClient {
    config: RedditOAuth2Config,
    oauth_client: BasicClient,
    token_http: reqwest::Client,
    api: RedditApiClient,
    token: Mutex<Option<RedditToken>>,
}

impl RedditClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        let oauth_client = build_oauth_client(&config, ACCESS_TOKEN_URL)?;

        let token_http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()?;

        let api = RedditApiClient::new(&config.user_agent)?;

        Ok(Self {
            config,
            oauth_client,
            token_http,
            api,
            token: Mutex::new(None),
        })
    }

    /// Points the API calls (not the token exchange) at another host.
    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api = self.api.with_base_url(base_url);
        self
    }

    /// Sends the password grant to another token endpoint.
    pub fn with_token_url(mut self, token_url: &str) -> Result<Self, CoreError> {
        self.oauth_client = build_oauth_client(&self.config, token_url)?;
        Ok(self)
    }

    pub fn get_required_scopes() -> Vec<&'static str> {
        vec!["identity", "read", "submit"]
    }

    /// Drops the cached token so the next call re-authenticates.
    pub async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Returns a usable access token, running the password grant when the
    /// cached one is missing or about to expire.
    pub async fn ensure_token(&self) -> Result<String, CoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
            debug!("Access token is close to expiry, refreshing");
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<RedditToken, CoreError> {
        let username = ResourceOwnerUsername::new(self.config.username.clone());
        let password = ResourceOwnerPassword::new(self.config.password.clone());
        let http = self.token_http.clone();

        let mut request = self.oauth_client.exchange_password(&username, &password);
        for scope in Self::get_required_scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let response = request
            .request_async(|req| send_oauth_request(http, req))
            .await
            .map_err(token_error)?;

        let lifetime = response
            .expires_in()
            .unwrap_or_else(|| Duration::from_secs(3600));
        let scopes = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" "))
            .unwrap_or_default();

        info!(
            "Obtained Reddit access token for u/{} (valid {}s, scopes: {})",
            self.config.username,
            lifetime.as_secs(),
            scopes
        );

        Ok(RedditToken {
            access_token: response.access_token().secret().to_string(),
            expires_at: SystemTime::now() + lifetime,
        })
    }

    /// Runs `call` with a bearer token, dropping the token when Reddit
    /// rejects it so a retry starts from a fresh grant.
    async fn with_token<T, F, Fut>(&self, call: F) -> Result<T, CoreError>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let token = self.ensure_token().await?;
        let result = call(token).await;
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            warn!("Reddit rejected the access token, clearing it");
            self.invalidate_token().await;
        }
        result
    }

    /// Authenticates and fetches the account profile.
    pub async fn verify_account(&self) -> Result<RedditUserData, CoreError> {
        self.with_token(|token| async move { self.api.get_user_info(&token).await })
            .await
    }
}

impl ForumGateway for RedditClient {
    async fn list_top_items(
        &self,
        forum: &str,
        window: LookbackWindow,
        limit: u32,
    ) -> Result<Vec<CandidateItem>, CoreError> {
        let posts = self
            .with_token(|token| async move {
                self.api.get_top_posts(&token, forum, window, limit).await
            })
            .await?;
        Ok(posts.into_iter().map(CandidateItem::from).collect())
    }

    async fn submit_reply(&self, item_id: &str, body: &str) -> Result<SubmittedReply, CoreError> {
        self.with_token(|token| async move { self.api.submit_comment(&token, item_id, body).await })
            .await
    }
}

fn build_oauth_client(config: &RedditOAuth2Config, token_url: &str) -> Result<BasicClient, CoreError> {
    let invalid_url = |e: oauth2::url::ParseError| CoreError::Internal {
        message: format!("Invalid OAuth URL: {}", e),
    };
    Ok(BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(AUTHORIZE_URL.to_string()).map_err(invalid_url)?,
        Some(TokenUrl::new(token_url.to_string()).map_err(invalid_url)?),
    ))
}

/// Splits a failed password grant into a credential rejection or an endpoint outage.
fn token_error(error: RequestTokenError<reqwest::Error, BasicErrorResponse>) -> CoreError {
    match error {
        RequestTokenError::Request(err) => CoreError::Network(err),
        RequestTokenError::ServerResponse(response) => grant_rejection(&response),
        RequestTokenError::Parse(err, body) => parse_rejection(&body).unwrap_or_else(|| {
            RedditApiError::TokenUnavailable {
                reason: format!("unreadable token response: {}", err),
            }
            .into()
        }),
        RequestTokenError::Other(reason) => RedditApiError::TokenUnavailable { reason }.into(),
    }
}

fn grant_rejection(response: &BasicErrorResponse) -> CoreError {
    let reason = response.error().to_string();
    match response.error() {
        BasicErrorResponseType::InvalidGrant
        | BasicErrorResponseType::InvalidClient
        | BasicErrorResponseType::UnauthorizedClient => {
            RedditApiError::AuthenticationFailed { reason }.into()
        }
        _ => RedditApiError::TokenUnavailable { reason }.into(),
    }
}

/// Reddit answers a wrong password with HTTP 200 and `{"error": "invalid_grant"}`,
/// and wrong client credentials with `{"error": 401}`; neither parses as a token.
fn parse_rejection(body: &[u8]) -> Option<CoreError> {
    if let Ok(response) = serde_json::from_slice::<BasicErrorResponse>(body) {
        return Some(grant_rejection(&response));
    }
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    (value.get("error")?.as_u64()? == 401).then(|| {
        RedditApiError::AuthenticationFailed {
            reason: "client credentials rejected".to_string(),
        }
        .into()
    })
}

/// Bridges oauth2's request type onto our reqwest client so the token call
/// carries the configured User-Agent.
async fn send_oauth_request(
    client: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
