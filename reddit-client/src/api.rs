use autoreply_core::{CandidateItem, CoreError, LookbackWindow, RedditApiError};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
pub const REDDIT_WEB_BASE: &str = "https://reddit.com";

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// The subset of a post's fields the scheduler looks at. Anything missing
/// from the payload stays `None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: Option<String>,
    pub score: Option<i64>,
    pub locked: Option<bool>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditUserData {
    pub id: String,
    pub name: String,
    pub created_utc: f64,
    pub link_karma: i64,
    pub comment_karma: i64,
}

impl RedditUserData {
    pub fn total_karma(&self) -> i64 {
        self.link_karma + self.comment_karma
    }

    /// Whole days between account creation and `now_utc` (seconds since epoch).
    pub fn account_age_days(&self, now_utc: i64) -> i64 {
        ((now_utc as f64 - self.created_utc) / 86_400.0).floor() as i64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentResponse {
    pub json: CommentResponseBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentResponseBody {
    /// Each entry is `[code, message, field]`; `field` is often null.
    #[serde(default)]
    pub errors: Vec<Vec<serde_json::Value>>,
    pub data: Option<CommentResponseData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentResponseData {
    #[serde(default)]
    pub things: Vec<RedditListingChild<RedditCommentData>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: String,
    pub permalink: Option<String>,
}

/// A reply that Reddit accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedReply {
    pub link: String,
}

impl From<RedditPostData> for CandidateItem {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            score: post_data.score,
            locked: post_data.locked,
            archived: post_data.archived,
        }
    }
}

/// Turns the body of `/api/comment` into a reply link or a typed failure.
pub fn interpret_comment_response(
    response: CommentResponse,
    item_id: &str,
) -> Result<SubmittedReply, CoreError> {
    if let Some(entry) = response.json.errors.first() {
        let code = entry.first().and_then(|v| v.as_str()).unwrap_or("UNKNOWN");
        let message = entry
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        return Err(match code {
            "RATELIMIT" => RedditApiError::RateLimited { message },
            _ => RedditApiError::SubmissionRejected {
                code: code.to_string(),
                message,
            },
        }
        .into());
    }

    let comment = response
        .json
        .data
        .and_then(|data| data.things.into_iter().next())
        .map(|child| child.data)
        .ok_or_else(|| RedditApiError::InvalidResponse {
            details: format!("No comment returned for post {}", item_id),
        })?;

    let link = match comment.permalink {
        Some(permalink) if !permalink.is_empty() => format!("{}{}", REDDIT_WEB_BASE, permalink),
        _ => format!("{}/comments/{}/_/{}/", REDDIT_WEB_BASE, item_id, comment.id),
    };
    Ok(SubmittedReply { link })
}

/// Maps a non-success status to the error the rest of the system expects.
fn status_error(response: &Response, endpoint: &str) -> RedditApiError {
    let status = response.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<f64>().ok())
                .map(|seconds| seconds.ceil() as u64)
                .unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        StatusCode::UNAUTHORIZED => RedditApiError::InvalidToken,
        StatusCode::FORBIDDEN => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        StatusCode::NOT_FOUND => RedditApiError::NotFound {
            resource: endpoint.to_string(),
        },
        s if s.is_server_error() => RedditApiError::ServerError {
            status_code: s.as_u16(),
        },
        s => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", s, endpoint),
        },
    }
}

/// Listing reads are retried in place, so a 429 there is a transient
/// throttle rather than the posting limit the loop backs off from.
fn listing_error(error: CoreError, subreddit: &str, endpoint: &str) -> CoreError {
    match error {
        CoreError::RedditApi(RedditApiError::NotFound { .. }) => RedditApiError::SubredditNotFound {
            subreddit: subreddit.to_string(),
        }
        .into(),
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { .. }) => {
            RedditApiError::Throttled {
                resource: endpoint.to_string(),
            }
            .into()
        }
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(user_agent: &str) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            base_url: REDDIT_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
        form: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }
        if let Some(fields) = form {
            request_builder = request_builder.form(fields);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(RedditApiError::RequestTimeout.into());
                }
                return Err(CoreError::Network(e));
            }
        };

        if !response.status().is_success() {
            error!(
                "Request failed with status: {} for {}",
                response.status(),
                endpoint
            );
            return Err(status_error(&response, endpoint).into());
        }

        Ok(response)
    }

    pub async fn get_user_info(&self, access_token: &str) -> Result<RedditUserData, CoreError> {
        let response = self
            .make_request(Method::GET, "/api/v1/me", access_token, None, None)
            .await?;

        let user_data: RedditUserData = response.json().await.map_err(|e| {
            error!("Failed to parse user data: {}", e);
            RedditApiError::InvalidResponse {
                details: "Failed to parse user data".to_string(),
            }
        })?;

        debug!("Retrieved user info for: {}", user_data.name);
        Ok(user_data)
    }

    pub async fn get_top_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        window: LookbackWindow,
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/top", subreddit);
        let limit = limit.to_string();
        let params = [("t", window.as_str()), ("limit", limit.as_str()), ("raw_json", "1")];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, Some(&params[..]), None)
            .await
            .map_err(|e| listing_error(e, subreddit, &endpoint))?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            }
        })?;

        let posts: Vec<RedditPostData> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .filter(|post| !post.id.is_empty())
            .collect();

        info!(
            "Retrieved {} top posts ({}) from r/{}",
            posts.len(),
            window,
            subreddit
        );
        Ok(posts)
    }

    pub async fn submit_comment(
        &self,
        access_token: &str,
        post_id: &str,
        text: &str,
    ) -> Result<SubmittedReply, CoreError> {
        let thing_id = format!("t3_{}", post_id);
        let form = [("api_type", "json"), ("thing_id", thing_id.as_str()), ("text", text)];

        let response = self
            .make_request(Method::POST, "/api/comment", access_token, None, Some(&form[..]))
            .await?;

        let body: CommentResponse = response.json().await.map_err(|e| {
            error!("Failed to parse comment response: {}", e);
            RedditApiError::InvalidResponse {
                details: format!("Failed to parse comment response for post {}", post_id),
            }
        })?;

        interpret_comment_response(body, post_id)
    }
}
