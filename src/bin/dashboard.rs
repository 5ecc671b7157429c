use activity_log::ActivityLog;
use anyhow::Context;
use clap::Parser;
use dashboard::{router, AppState, DEFAULT_RECENT_LIMIT};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Read-only stats page over the autoreply activity log.
#[derive(Parser, Debug)]
#[command(name = "dashboard", version, about)]
struct Cli {
    #[arg(long, env = "AUTOREPLY_HISTORY", default_value = "comment_history.txt")]
    history: PathBuf,

    #[arg(long, env = "AUTOREPLY_FORUMS", default_value = "subreddits.txt")]
    forums: PathBuf,

    #[arg(long, env = "DASHBOARD_BIND", default_value = "0.0.0.0:10000")]
    bind: String,

    /// Number of recent comments returned by /api/stats
    #[arg(long, default_value_t = DEFAULT_RECENT_LIMIT)]
    recent: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,dashboard=info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let state = AppState::with_recent_limit(ActivityLog::new(&cli.history), &cli.forums, cli.recent);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!(
        "Dashboard listening on http://{} (history: {})",
        listener.local_addr()?,
        cli.history.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
