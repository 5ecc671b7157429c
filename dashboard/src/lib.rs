//! Read-only reporting endpoint over the activity log.
//!
//! The scheduler writes the log; this crate only reads it, once per request,
//! so the numbers are always as fresh as the file.

use activity_log::{count_on_day, ActivityLog};
use autoreply_core::{load_forums, ActionRecord, CoreError, TIMESTAMP_FORMAT};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Records shown in `recent_comments` unless configured otherwise.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    log: ActivityLog,
    forums_path: PathBuf,
    started_at: Instant,
    recent_limit: usize,
}

impl AppState {
    pub fn new(log: ActivityLog, forums_path: impl Into<PathBuf>) -> Self {
        Self::with_recent_limit(log, forums_path, DEFAULT_RECENT_LIMIT)
    }

    pub fn with_recent_limit(
        log: ActivityLog,
        forums_path: impl Into<PathBuf>,
        recent_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                log,
                forums_path: forums_path.into(),
                started_at: Instant::now(),
                recent_limit,
            }),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentComment {
    pub time: String,
    pub subreddit: String,
    pub title: String,
    pub link: String,
}

impl From<&ActionRecord> for RecentComment {
    fn from(record: &ActionRecord) -> Self {
        Self {
            time: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            subreddit: record.forum.clone(),
            title: record.title.clone(),
            link: record.link.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsResponse {
    pub total_comments: usize,
    pub today_comments: usize,
    pub active_subreddits: usize,
    pub uptime: String,
    pub recent_comments: Vec<RecentComment>,
}

/// Builds the stats payload from parsed records. `recent_comments` holds the
/// last `recent_limit` records, oldest first.
pub fn build_stats(
    records: &[ActionRecord],
    active_subreddits: usize,
    today: NaiveDate,
    uptime: Duration,
    recent_limit: usize,
) -> StatsResponse {
    let recent_start = records.len().saturating_sub(recent_limit);
    StatsResponse {
        total_comments: records.len(),
        today_comments: count_on_day(records, today),
        active_subreddits,
        uptime: format_uptime(uptime),
        recent_comments: records[recent_start..].iter().map(RecentComment::from).collect(),
    }
}

/// Whole hours, e.g. `"5h"`.
pub fn format_uptime(uptime: Duration) -> String {
    format!("{}h", uptime.as_secs() / 3600)
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("failed to read activity log: {0}")]
    Log(#[from] CoreError),
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        error!("Stats request failed: {}", self);
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, DashboardError> {
    let records = state.inner.log.read_records().await?;
    let active_subreddits = match load_forums(&state.inner.forums_path) {
        Ok(forums) => forums.len(),
        Err(e) => {
            warn!("Could not read forum list: {}", e);
            0
        }
    };
    let today = chrono::Local::now().date_naive();

    debug!("Serving stats over {} record(s)", records.len());
    Ok(Json(build_stats(
        &records,
        active_subreddits,
        today,
        state.uptime(),
        state.inner.recent_limit,
    )))
}
